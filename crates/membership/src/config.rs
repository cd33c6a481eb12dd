use serde::{Deserialize, Serialize};
use std::path::Path;

use corelib::ServerId;

use crate::backoff::BackoffPolicy;
use crate::error::ConfigError;

/// Membership settings for one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipConfig {
    /// This node's own server identity; never logged as a remote server.
    pub local_server: Option<ServerId>,
    pub backoff: BackoffPolicy,
}

impl MembershipConfig {
    /// Load and validate configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: MembershipConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            initial_ms = config.backoff.initial_ms,
            max_ms = config.backoff.max_ms,
            "loaded membership config"
        );
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return Self::load(path);
        }
        tracing::info!(path = %path.display(), "no membership config found, using defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backoff.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_or_default_no_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = MembershipConfig::load_or_default(&temp_dir.path().join("membership.json"))
            .unwrap();
        assert_eq!(config, MembershipConfig::default());
        assert_eq!(config.backoff.initial_ms, 50);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("membership.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(
            br#"{
                "local_server": "0000000000000000000000000000002a",
                "backoff": { "max_ms": 2000 }
            }"#,
        )
        .unwrap();

        let config = MembershipConfig::load(&path).unwrap();
        assert_eq!(config.local_server, Some(ServerId(42)));
        assert_eq!(config.backoff.max_ms, 2000);
        assert_eq!(config.backoff.initial_ms, 50);
        assert_eq!(config.backoff.growth, 1.5);
    }

    #[test]
    fn test_load_invalid_json() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("membership.json");
        std::fs::write(&path, b"invalid json").unwrap();

        assert!(matches!(
            MembershipConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_rejects_invalid_policy() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("membership.json");
        std::fs::write(&path, br#"{ "backoff": { "growth": 0.5 } }"#).unwrap();

        assert!(matches!(
            MembershipConfig::load(&path),
            Err(ConfigError::InvalidBackoff(_))
        ));
    }
}
