//! Configuration for the credits wallet.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ValidationError, WalletResult};
use crate::proof::DEFAULT_UNIT;
use crate::selection::{ExactMatchLimits, SelectionStrategy};
use crate::store::ProofStore;
use crate::wallet::{WalletCore, WalletSettings};

/// Largest exact-match target accepted; the DP table holds one slot per unit
const MAX_EXACT_MATCH_TARGET: u64 = 1_000_000;

/// Largest exact-match proof count accepted
const MAX_EXACT_MATCH_PROOFS: usize = 1_000;

/// Wallet configuration, usually read from `config.toml` in the data directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletConfig {
    /// Issuer the wallet's proofs are redeemable at
    #[serde(default = "default_issuer_url")]
    pub issuer_url: String,

    /// Denomination unit
    #[serde(default = "default_unit")]
    pub unit: String,

    /// Proof selection strategy for outgoing tokens
    #[serde(default)]
    pub strategy: SelectionStrategy,

    /// Bounds on the exact-match search
    #[serde(default)]
    pub exact_match: ExactMatchLimits,

    /// Directory holding the proof file (defaults to the platform data dir)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Timeout for issuer requests in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_issuer_url() -> String {
    "http://localhost:3338".to_string()
}

fn default_unit() -> String {
    DEFAULT_UNIT.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            issuer_url: default_issuer_url(),
            unit: default_unit(),
            strategy: SelectionStrategy::default(),
            exact_match: ExactMatchLimits::default(),
            data_dir: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl WalletConfig {
    /// Load configuration from a TOML file; a missing file yields defaults.
    pub fn from_file(path: &Path) -> WalletResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(crate::error::StoreError::Io(e).into()),
        };
        let config: WalletConfig = toml::from_str(&content)
            .map_err(|e| ValidationError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let url = url::Url::parse(&self.issuer_url).map_err(|e| {
            ValidationError::InvalidConfig(format!("issuer_url is not a valid URL: {}", e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidConfig(format!(
                "issuer_url must be http or https, got {}",
                url.scheme()
            )));
        }

        if self.unit.trim().is_empty() {
            return Err(ValidationError::InvalidConfig("unit must not be empty".to_string()));
        }

        if self.exact_match.max_proofs == 0 || self.exact_match.max_proofs > MAX_EXACT_MATCH_PROOFS
        {
            return Err(ValidationError::InvalidConfig(format!(
                "exact_match.max_proofs must be between 1 and {}",
                MAX_EXACT_MATCH_PROOFS
            )));
        }
        if self.exact_match.max_target == 0 || self.exact_match.max_target > MAX_EXACT_MATCH_TARGET
        {
            return Err(ValidationError::InvalidConfig(format!(
                "exact_match.max_target must be between 1 and {}",
                MAX_EXACT_MATCH_TARGET
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(ValidationError::InvalidConfig(
                "request_timeout_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Directory for wallet files
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("credits-wallet")))
            .unwrap_or_else(|| PathBuf::from(".credits-wallet"))
    }

    /// Encrypted proof file
    pub fn proof_file(&self) -> PathBuf {
        self.data_dir().join("proofs.json")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn wallet_settings(&self) -> WalletSettings {
        WalletSettings {
            issuer_url: self.issuer_url.clone(),
            unit: self.unit.clone(),
            strategy: self.strategy,
            limits: self.exact_match,
        }
    }

    /// Wallet over `store` with this configuration
    pub fn build_wallet(&self, store: std::sync::Arc<dyn ProofStore>) -> WalletCore {
        WalletCore::new(self.wallet_settings(), store)
    }
}

/// Default config file location
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("credits-wallet").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("credits-wallet.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = WalletConfig::default();
        assert_eq!(config.unit, "sat");
        assert_eq!(config.strategy, SelectionStrategy::ExactMatch);
        assert_eq!(config.exact_match.max_proofs, 50);
        assert_eq!(config.exact_match.max_target, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: WalletConfig = toml::from_str(
            r#"
            issuer_url = "https://issuer.example"
            strategy = "largest_first"

            [exact_match]
            max_proofs = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.issuer_url, "https://issuer.example");
        assert_eq!(config.strategy, SelectionStrategy::LargestFirst);
        assert_eq!(config.exact_match.max_proofs, 20);
        assert_eq!(config.exact_match.max_target, 10_000);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = WalletConfig {
            issuer_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = WalletConfig {
            unit: " ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = WalletConfig {
            exact_match: ExactMatchLimits {
                max_proofs: 50,
                max_target: 0,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = WalletConfig {
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_missing_is_default() {
        let dir = TempDir::new().unwrap();
        let config = WalletConfig::from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, WalletConfig::default());
    }

    #[test]
    fn test_from_file_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "unit = \"\"\n").unwrap();

        let err = WalletConfig::from_file(&path).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidConfig);
    }
}
