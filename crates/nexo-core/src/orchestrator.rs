//! Anchoring and retrieval
//!
//! `register`: validate, encrypt, wrap, build the data-carrier script, have
//! the wallet submit it, then index the result. Once the wallet has returned
//! a transaction id the registration is a success; a failed index write only
//! downgrades it to [`RegistrationStage::PersistedOnChainOnly`] with a
//! warning.
//!
//! `lookup`: resolve the case in the index, fetch the transaction, decode the
//! envelope and decrypt it with the indexed key. Any stage failing fails the
//! lookup.

use chrono::DateTime;
use nexo_chain::{build_data_carrier_script, extract_envelope, Envelope, EnvelopeMetadata};
use nexo_crypto::PersonalRecord;
use nexo_index::{IndexRecord, NewIndexRecord, RecordIndex};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

use crate::config::{AnchorSettings, NexoConfig, ValidationPolicy};
use crate::error::{AnchorError, Result, ServiceError};
use crate::http::{HttpWallet, WhatsOnChainExplorer};
use crate::observer::{AnchorEvent, LookupStage, Observer, RegistrationStage, TracingObserver};
use crate::services::{ActionOptions, ActionOutput, CreateTransactionRequest, Explorer, Wallet};

/// Input to [`Orchestrator::register`]
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub record: PersonalRecord,
    pub symmetric_key: String,
    pub case_id: String,
    pub subject_id: String,
    /// Defaults to the configured issuer
    pub issuer: Option<String>,
    /// RFC 3339; defaults to now
    pub timestamp: Option<String>,
    /// Defaults to the wallet's identity key
    pub identity_key: Option<String>,
}

impl RegistrationRequest {
    pub fn new(
        record: PersonalRecord,
        symmetric_key: impl Into<String>,
        case_id: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> Self {
        Self {
            record,
            symmetric_key: symmetric_key.into(),
            case_id: case_id.into(),
            subject_id: subject_id.into(),
            issuer: None,
            timestamp: None,
            identity_key: None,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_identity_key(mut self, identity_key: impl Into<String>) -> Self {
        self.identity_key = Some(identity_key.into());
        self
    }
}

/// Outcome of a registration that reached the ledger
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationReceipt {
    pub transaction_id: String,
    pub record_id: String,
    pub case_id: String,
    pub envelope: EnvelopeMetadata,
    pub explorer_url: String,
    /// `Done`, or `PersistedOnChainOnly` when the index write failed
    pub stage: RegistrationStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl RegistrationReceipt {
    pub fn is_indexed(&self) -> bool {
        self.stage == RegistrationStage::Done
    }
}

/// A decrypted record and where it came from
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResult {
    pub case_id: String,
    pub transaction_id: String,
    pub record: PersonalRecord,
    pub envelope: EnvelopeMetadata,
    pub explorer_url: String,
}

/// Index entry checked against the on-chain envelope, without decrypting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub case_id: String,
    pub transaction_id: String,
    pub verified: bool,
    pub case_id_matches: bool,
    pub key_hash_matches: bool,
    pub ciphertext_matches: bool,
    /// The indexed key still hashes to the indexed key hash
    pub index_key_consistent: bool,
    pub issuer: String,
    pub timestamp: String,
    pub explorer_url: String,
}

/// Composes the codecs, the index and the external services
pub struct Orchestrator {
    wallet: Arc<dyn Wallet>,
    explorer: Arc<dyn Explorer>,
    index: Arc<dyn RecordIndex>,
    observer: Arc<dyn Observer>,
    settings: AnchorSettings,
}

impl Orchestrator {
    pub fn new(
        wallet: Arc<dyn Wallet>,
        explorer: Arc<dyn Explorer>,
        index: Arc<dyn RecordIndex>,
        settings: AnchorSettings,
    ) -> Self {
        Self {
            wallet,
            explorer,
            index,
            observer: Arc::new(TracingObserver),
            settings,
        }
    }

    /// Wired to the HTTP wallet, the WhatsOnChain explorer and the JSON
    /// file index named in `config`.
    pub fn from_config(config: &NexoConfig) -> Self {
        Self::new(
            Arc::new(HttpWallet::new(config.wallet_url.as_str())),
            Arc::new(WhatsOnChainExplorer::new(config.explorer_url.as_str(), config.network)),
            Arc::new(nexo_index::JsonFileIndex::open(&config.index_path)),
            config.anchor_settings(),
        )
    }

    pub fn with_validation(mut self, policy: ValidationPolicy) -> Self {
        self.settings.validation = policy;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn settings(&self) -> &AnchorSettings {
        &self.settings
    }

    pub fn index(&self) -> &Arc<dyn RecordIndex> {
        &self.index
    }

    /// Encrypt and anchor a record, then index it.
    pub async fn register(&self, request: RegistrationRequest) -> Result<RegistrationReceipt> {
        let case_id = request.case_id.clone();
        let result = self.run_registration(request).await;
        if let Err(e) = &result {
            self.fail("register", &case_id, e);
        }
        result
    }

    /// Fetch, decode and decrypt the record anchored for `case_id`.
    pub async fn lookup(&self, case_id: &str) -> Result<LookupResult> {
        let case_id = case_id.trim();
        let result = self.run_lookup(case_id).await;
        if let Err(e) = &result {
            self.fail("lookup", case_id, e);
        }
        result
    }

    /// Check the index entry for `case_id` against the chain.
    pub async fn verify(&self, case_id: &str) -> Result<VerificationReport> {
        let case_id = case_id.trim();
        let result = self.run_verification(case_id).await;
        match &result {
            Ok(report) => self.emit(AnchorEvent::Verified {
                case_id: report.case_id.clone(),
                txid: report.transaction_id.clone(),
                verified: report.verified,
            }),
            Err(e) => self.fail("verify", case_id, e),
        }
        result
    }

    async fn run_registration(&self, request: RegistrationRequest) -> Result<RegistrationReceipt> {
        let case_id = request.case_id.clone();

        self.registration_stage(&case_id, RegistrationStage::Validating);
        let problems = validate(&request, &self.settings.validation);
        if !problems.is_empty() {
            return Err(AnchorError::Validation(problems));
        }
        let RegistrationRequest {
            record,
            symmetric_key,
            subject_id,
            issuer,
            timestamp,
            identity_key,
            ..
        } = request;
        let issuer = non_blank(issuer).unwrap_or_else(|| self.settings.default_issuer.clone());
        let timestamp = non_blank(timestamp).unwrap_or_else(nexo_index::now_timestamp);
        let identity_key = match non_blank(identity_key) {
            Some(key) => key,
            None => self.call("wallet", self.wallet.identity_key()).await?,
        };

        self.registration_stage(&case_id, RegistrationStage::Encrypting);
        let ciphertext = nexo_crypto::encrypt(&record, &symmetric_key)?;
        let key_hash = nexo_crypto::key_hash(&symmetric_key);

        self.registration_stage(&case_id, RegistrationStage::Encoding);
        let metadata = EnvelopeMetadata::new(issuer.as_str(), timestamp.as_str(), case_id.as_str(), identity_key.as_str(), key_hash);
        let payload = nexo_chain::wrap(&ciphertext, &metadata)?;
        let script = build_data_carrier_script(&payload)?;

        self.registration_stage(&case_id, RegistrationStage::Submitting);
        let wallet_request = CreateTransactionRequest {
            description: format!("ONCE - Acreditación {case_id}"),
            outputs: vec![ActionOutput {
                locking_script: hex::encode(&script),
                satoshis: self.settings.output_satoshis,
                output_description: format!("Acreditación ONCE - Exp: {case_id}"),
            }],
            options: ActionOptions {
                randomize_outputs: false,
            },
        };
        let txid = self
            .call("wallet", self.wallet.create_transaction(&wallet_request))
            .await?
            .txid;
        if txid.trim().is_empty() {
            return Err(AnchorError::upstream("wallet", "transaction created without a txid"));
        }
        self.emit(AnchorEvent::Submitted {
            case_id: case_id.clone(),
            txid: txid.clone(),
            script_bytes: script.len(),
        });

        // From here on the registration has succeeded.
        self.registration_stage(&case_id, RegistrationStage::Persisting);
        let record_id = uuid::Uuid::new_v4().simple().to_string();
        let entry = IndexRecord::new(NewIndexRecord {
            record_id: record_id.clone(),
            transaction_id: txid.clone(),
            timestamp,
            case_id: case_id.clone(),
            identity_key,
            issuer,
            ciphertext,
            symmetric_key,
            subject_id,
        });

        let index = Arc::clone(&self.index);
        let persisted = match tokio::task::spawn_blocking(move || index.append(entry)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("index task failed: {e}")),
        };

        let (stage, warning) = match persisted {
            Ok(()) => (RegistrationStage::Done, None),
            Err(reason) => {
                self.emit(AnchorEvent::IndexWriteFailed {
                    case_id: case_id.clone(),
                    txid: txid.clone(),
                    reason: reason.clone(),
                });
                (
                    RegistrationStage::PersistedOnChainOnly,
                    Some(format!(
                        "transaction {txid} is on chain but was not saved to the local index: {reason}"
                    )),
                )
            }
        };
        self.registration_stage(&case_id, stage);

        Ok(RegistrationReceipt {
            explorer_url: self.settings.network.explorer_tx_url(&txid),
            transaction_id: txid,
            record_id,
            case_id,
            envelope: metadata,
            stage,
            warning,
        })
    }

    async fn run_lookup(&self, case_id: &str) -> Result<LookupResult> {
        let (entry, envelope) = self.resolve_and_decode(case_id).await?;

        self.lookup_stage(case_id, LookupStage::Decrypting);
        let record = nexo_crypto::decrypt(&envelope.ciphertext, &entry.symmetric_key)?;

        self.lookup_stage(case_id, LookupStage::Done);
        Ok(LookupResult {
            case_id: entry.case_id,
            explorer_url: self.settings.network.explorer_tx_url(&entry.transaction_id),
            transaction_id: entry.transaction_id,
            record,
            envelope: envelope.metadata(),
        })
    }

    async fn run_verification(&self, case_id: &str) -> Result<VerificationReport> {
        let (entry, envelope) = self.resolve_and_decode(case_id).await?;

        let case_id_matches = envelope.case_id == entry.case_id;
        let key_hash_matches = envelope.key_hash.eq_ignore_ascii_case(&entry.key_hash);
        let ciphertext_matches = envelope.ciphertext == entry.ciphertext;
        let index_key_consistent = entry.key_hash_matches();

        Ok(VerificationReport {
            verified: case_id_matches && key_hash_matches && ciphertext_matches && index_key_consistent,
            case_id_matches,
            key_hash_matches,
            ciphertext_matches,
            index_key_consistent,
            issuer: envelope.issuer,
            timestamp: envelope.timestamp,
            explorer_url: self.settings.network.explorer_tx_url(&entry.transaction_id),
            case_id: entry.case_id,
            transaction_id: entry.transaction_id,
        })
    }

    /// Index entry for `case_id` plus the envelope its transaction carries
    async fn resolve_and_decode(&self, case_id: &str) -> Result<(IndexRecord, Envelope)> {
        self.lookup_stage(case_id, LookupStage::ResolvingIndex);
        if case_id.is_empty() {
            return Err(AnchorError::Validation(vec!["case id is required".to_string()]));
        }
        let index = Arc::clone(&self.index);
        let wanted = case_id.to_string();
        let entry = tokio::task::spawn_blocking(move || index.find_by_case_id(&wanted))
            .await
            .map_err(|e| AnchorError::Internal(format!("index task failed: {e}")))?
            .ok_or_else(|| AnchorError::RecordNotFound {
                case_id: case_id.to_string(),
            })?;

        self.lookup_stage(case_id, LookupStage::FetchingTransaction);
        let tx = self
            .call("explorer", self.explorer.fetch_transaction(&entry.transaction_id))
            .await?;

        self.lookup_stage(case_id, LookupStage::Decoding);
        let envelope = extract_envelope(&tx)?;
        Ok((entry, envelope))
    }

    /// Bound an external call by the configured timeout.
    async fn call<T, F>(&self, service: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, ServiceError>>,
    {
        match tokio::time::timeout(self.settings.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AnchorError::upstream(service, e)),
            Err(_) => Err(AnchorError::upstream(
                service,
                format!("no response within {:?}", self.settings.timeout),
            )),
        }
    }

    fn emit(&self, event: AnchorEvent) {
        self.observer.on_event(&event);
    }

    fn registration_stage(&self, case_id: &str, stage: RegistrationStage) {
        self.emit(AnchorEvent::Registration {
            case_id: case_id.to_string(),
            stage,
        });
    }

    fn lookup_stage(&self, case_id: &str, stage: LookupStage) {
        self.emit(AnchorEvent::Lookup {
            case_id: case_id.to_string(),
            stage,
        });
    }

    fn fail(&self, operation: &'static str, case_id: &str, err: &AnchorError) {
        self.emit(AnchorEvent::Failed {
            operation,
            case_id: case_id.to_string(),
            kind: err.kind(),
            reason: err.to_string(),
        });
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Every problem with the request, empty when it is acceptable
fn validate(request: &RegistrationRequest, policy: &ValidationPolicy) -> Vec<String> {
    let mut problems = Vec::new();

    if request.symmetric_key.is_empty() {
        problems.push("symmetric key is required".to_string());
    }
    if request.case_id.trim().is_empty() {
        problems.push("case id is required".to_string());
    }
    if request.subject_id.trim().is_empty() {
        problems.push("subject id is required".to_string());
    }
    if request.record.is_empty() {
        problems.push("record has no fields".to_string());
    }
    if let Some(ts) = request.timestamp.as_deref().filter(|t| !t.trim().is_empty()) {
        if DateTime::parse_from_rfc3339(ts).is_err() {
            problems.push(format!("timestamp {ts:?} is not RFC 3339"));
        }
    }
    for field in policy.missing_fields(&request.record) {
        problems.push(format!("missing record field `{field}`"));
    }

    problems
}
