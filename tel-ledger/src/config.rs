//! Ledger configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tel_core::{CoreError, SecretKey};

use crate::error::{LedgerError, Result};

/// Environment variable the integrity secret is read from. There is no fallback.
pub const SECRET_ENV: &str = "TEL_INTEGRITY_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Storage configuration
    pub storage: StorageConfig,

    /// Integrity tagging configuration
    pub integrity: IntegrityConfig,

    /// Daily anchoring configuration
    pub anchoring: AnchoringConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Database directory (sled backend only)
    pub path: PathBuf,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct IntegrityConfig {
    /// HMAC secret, supplied via `TEL_INTEGRITY_SECRET` and never written to disk
    #[serde(skip)]
    pub secret: Option<String>,

    /// Largest accepted canonical text, in UTF-8 bytes
    pub max_text_bytes: usize,
}

impl fmt::Debug for IntegrityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrityConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("max_text_bytes", &self.max_text_bytes)
            .finish()
    }
}

/// Which records one anchor commits to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    /// One anchor per day across all owners
    Global,
    /// One anchor per owner per day
    PerOwner,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchoringConfig {
    pub scope: ScopeMode,

    /// How often the scheduler checks for a closed, unanchored day (seconds)
    pub interval_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::Sled,
                path: PathBuf::from(".tel"),
            },
            integrity: IntegrityConfig {
                secret: None,
                max_text_bytes: 65536,
            },
            anchoring: AnchoringConfig {
                scope: ScopeMode::Global,
                interval_secs: 3600,
            },
        }
    }
}

impl LedgerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("{}: {}", path.display(), e)))?;
        let mut config: LedgerConfig = toml::from_str(&contents)
            .map_err(|e| LedgerError::Config(format!("{}: {}", path.display(), e)))?;

        config.load_secret_from_env();
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| LedgerError::Config(e.to_string()))?;
        std::fs::write(path, contents)
            .map_err(|e| LedgerError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Fill the secret from `TEL_INTEGRITY_SECRET` if it is not already set
    pub fn load_secret_from_env(&mut self) {
        if self.integrity.secret.is_none() {
            self.integrity.secret = std::env::var(SECRET_ENV).ok();
        }
    }

    /// The integrity key, or a configuration error if no usable secret is set
    pub fn integrity_key(&self) -> std::result::Result<SecretKey, CoreError> {
        SecretKey::require(self.integrity.secret.as_deref()).map_err(|e| match e {
            CoreError::Configuration(msg) => {
                CoreError::Configuration(format!("{} (set {})", msg, SECRET_ENV))
            }
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_roundtrip_omits_secret() {
        let mut config = LedgerConfig::default();
        config.integrity.secret = Some("do-not-persist".to_string());
        config.anchoring.scope = ScopeMode::PerOwner;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tel.toml");
        config.to_file(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("do-not-persist"));
        assert!(written.contains("per_owner"));
        assert!(written.contains("sled"));

        let loaded: LedgerConfig = toml::from_str(&written).unwrap();
        assert_eq!(loaded.anchoring.scope, ScopeMode::PerOwner);
        assert_eq!(loaded.integrity.max_text_bytes, 65536);
        assert!(loaded.integrity.secret.is_none());
    }

    #[test]
    fn test_parse_explicit_file() {
        let toml = r#"
            [storage]
            backend = "memory"
            path = "/tmp/unused"

            [integrity]
            max_text_bytes = 128

            [anchoring]
            scope = "global"
            interval_secs = 60
        "#;
        let config: LedgerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.integrity.max_text_bytes, 128);
        assert_eq!(config.anchoring.interval_secs, 60);
    }

    #[test]
    fn test_missing_secret_is_configuration_error() {
        let mut config = LedgerConfig::default();
        config.integrity.secret = None;
        assert!(matches!(config.integrity_key(), Err(CoreError::Configuration(_))));

        config.integrity.secret = Some(String::new());
        assert!(matches!(config.integrity_key(), Err(CoreError::Configuration(_))));

        config.integrity.secret = Some("s3cret".to_string());
        assert!(config.integrity_key().is_ok());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let mut config = LedgerConfig::default();
        config.integrity.secret = Some("s3cret".to_string());
        assert!(!format!("{:?}", config).contains("s3cret"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = LedgerConfig::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }
}
