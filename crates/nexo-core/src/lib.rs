//! Nexo Core - anchoring and retrieval orchestration
//!
//! Ties the record cipher, the on-chain envelope codec and the local index
//! to the external wallet and explorer. Frontends (the CLI today) build an
//! [`Orchestrator`] from a [`NexoConfig`] and call `register`, `lookup` or
//! `verify`.

pub mod case_id;
pub mod config;
pub mod error;
pub mod http;
pub mod observer;
pub mod orchestrator;
pub mod services;

pub use case_id::generate_case_id;
pub use config::{AnchorSettings, ConfigError, Network, NexoConfig, ValidationPolicy};
pub use error::{AnchorError, FailureKind, Result, ServiceError};
pub use http::{HttpWallet, WhatsOnChainExplorer};
pub use observer::{AnchorEvent, LookupStage, NoopObserver, Observer, RegistrationStage, TracingObserver};
pub use orchestrator::{LookupResult, Orchestrator, RegistrationReceipt, RegistrationRequest, VerificationReport};
pub use services::{CreateTransactionRequest, CreateTransactionResponse, Explorer, Wallet};
