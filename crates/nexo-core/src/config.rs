//! Configuration
//!
//! Layered as defaults, then an optional JSON file, then `NEXO_*`
//! environment variables. The CLI applies its own flags last.

use nexo_crypto::PersonalRecord;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Record fields an accreditation must carry
pub const ACCREDITATION_FIELDS: [&str; 5] = [
    "nombre",
    "apellidos",
    "dni",
    "fechaNacimiento",
    "tipoDiscapacidad",
];

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

/// Ledger network the explorer queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Main,
    Test,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Test => "test",
        }
    }

    /// Human-facing explorer page for a transaction
    pub fn explorer_tx_url(&self, txid: &str) -> String {
        match self {
            Self::Main => format!("https://whatsonchain.com/tx/{txid}"),
            Self::Test => format!("https://test.whatsonchain.com/tx/{txid}"),
        }
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "main" | "mainnet" => Ok(Self::Main),
            "test" | "testnet" => Ok(Self::Test),
            _ => Err(ConfigError::InvalidValue {
                name: "network".to_string(),
                value: s.to_string(),
                reason: "expected `main` or `test`".to_string(),
            }),
        }
    }
}

/// Which record fields registration insists on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    pub required_fields: Vec<String>,
}

impl ValidationPolicy {
    /// Only the structural checks; any non-empty record is accepted.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn accreditation() -> Self {
        Self {
            required_fields: ACCREDITATION_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Required fields that are absent or blank, in policy order
    pub fn missing_fields<'a>(&'a self, record: &PersonalRecord) -> Vec<&'a str> {
        self.required_fields
            .iter()
            .map(String::as_str)
            .filter(|field| !record.has_value(field))
            .collect()
    }
}

/// Orchestrator-relevant slice of the configuration
#[derive(Debug, Clone)]
pub struct AnchorSettings {
    /// Applied to every wallet and explorer call
    pub timeout: Duration,
    pub default_issuer: String,
    pub output_satoshis: u64,
    pub network: Network,
    pub validation: ValidationPolicy,
}

impl Default for AnchorSettings {
    fn default() -> Self {
        NexoConfig::default().anchor_settings()
    }
}

/// Full configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NexoConfig {
    pub index_path: PathBuf,
    pub wallet_url: String,
    pub explorer_url: String,
    pub network: Network,
    pub timeout_secs: u64,
    pub issuer: String,
    pub output_satoshis: u64,
    pub case_prefix: String,
    pub validation: ValidationPolicy,
}

impl Default for NexoConfig {
    fn default() -> Self {
        Self {
            index_path: Self::default_index_path(),
            wallet_url: "http://localhost:3321".to_string(),
            explorer_url: "https://api.whatsonchain.com".to_string(),
            network: Network::Main,
            timeout_secs: 30,
            issuer: nexo_chain::envelope::DEFAULT_ISSUER.to_string(),
            output_satoshis: 1,
            case_prefix: "ONCE".to_string(),
            validation: ValidationPolicy::none(),
        }
    }
}

impl NexoConfig {
    /// `~/.nexo/identity-records.json`, or relative to the working directory
    /// when there is no home directory.
    pub fn default_index_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nexo")
            .join("identity-records.json")
    }

    /// Read a JSON config file; absent keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults, then `file` if given, then the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Override fields from `NEXO_*` variables using `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(path) = var("NEXO_INDEX_PATH") {
            self.index_path = PathBuf::from(path);
        }
        if let Some(url) = var("NEXO_WALLET_URL") {
            self.wallet_url = url;
        }
        if let Some(url) = var("NEXO_EXPLORER_URL") {
            self.explorer_url = url;
        }
        if let Some(network) = var("NEXO_NETWORK") {
            self.network = network.parse()?;
        }
        if let Some(secs) = var("NEXO_TIMEOUT_SECS") {
            self.timeout_secs = parse_timeout(&secs)?;
        }
        if let Some(issuer) = var("NEXO_ISSUER") {
            self.issuer = issuer;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn anchor_settings(&self) -> AnchorSettings {
        AnchorSettings {
            timeout: self.timeout(),
            default_issuer: self.issuer.clone(),
            output_satoshis: self.output_satoshis,
            network: self.network,
            validation: self.validation.clone(),
        }
    }
}

fn parse_timeout(value: &str) -> Result<u64, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        name: "NEXO_TIMEOUT_SECS".to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let secs: u64 = value.trim().parse().map_err(|_| invalid("expected whole seconds"))?;
    if secs == 0 {
        return Err(invalid("timeout must be at least one second"));
    }
    Ok(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = NexoConfig::default();
        assert_eq!(config.wallet_url, "http://localhost:3321");
        assert_eq!(config.explorer_url, "https://api.whatsonchain.com");
        assert_eq!(config.network, Network::Main);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.issuer, "ONCE");
        assert_eq!(config.output_satoshis, 1);
        assert!(config.index_path.ends_with(".nexo/identity-records.json"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nexo.json");
        std::fs::write(&path, r#"{"network": "test", "timeout_secs": 5}"#).unwrap();

        let config = NexoConfig::from_file(&path).unwrap();
        assert_eq!(config.network, Network::Test);
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.wallet_url, "http://localhost:3321");
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nexo.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(NexoConfig::from_file(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            NexoConfig::from_file(&dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = NexoConfig::default();
        config
            .apply_env(env(&[
                ("NEXO_INDEX_PATH", "/tmp/idx.json"),
                ("NEXO_NETWORK", "testnet"),
                ("NEXO_TIMEOUT_SECS", "12"),
                ("NEXO_ISSUER", "IMSERSO"),
                ("NEXO_WALLET_URL", ""),
            ]))
            .unwrap();

        assert_eq!(config.index_path, PathBuf::from("/tmp/idx.json"));
        assert_eq!(config.network, Network::Test);
        assert_eq!(config.timeout(), Duration::from_secs(12));
        assert_eq!(config.issuer, "IMSERSO");
        // blank values are ignored
        assert_eq!(config.wallet_url, "http://localhost:3321");
    }

    #[test]
    fn test_invalid_env_values_rejected() {
        let mut config = NexoConfig::default();
        assert!(config.apply_env(env(&[("NEXO_TIMEOUT_SECS", "soon")])).is_err());
        assert!(config.apply_env(env(&[("NEXO_TIMEOUT_SECS", "0")])).is_err());
        assert!(config.apply_env(env(&[("NEXO_NETWORK", "regtest")])).is_err());
    }

    #[test]
    fn test_accreditation_policy_reports_missing_fields() {
        let policy = ValidationPolicy::accreditation();
        let record = PersonalRecord::new()
            .with_field("nombre", "Ana")
            .with_field("dni", "111")
            .with_field("apellidos", "  ");

        assert_eq!(
            policy.missing_fields(&record),
            vec!["apellidos", "fechaNacimiento", "tipoDiscapacidad"]
        );
        assert!(ValidationPolicy::none().missing_fields(&record).is_empty());
    }

    #[test]
    fn test_explorer_urls() {
        assert_eq!(Network::Main.explorer_tx_url("ab"), "https://whatsonchain.com/tx/ab");
        assert_eq!(Network::Test.explorer_tx_url("ab"), "https://test.whatsonchain.com/tx/ab");
    }
}
