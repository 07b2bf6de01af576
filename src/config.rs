use std::collections::HashSet;

use thiserror::Error;

use crate::status::StatusListKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub features: FeatureFlags,
    /// Base URL used to build absolute endpoint URLs (`uri` / `sub` claims).
    pub issuer: String,
    pub node: NodeConfig,
    pub signing: SigningConfig,
    pub status_list: StatusListConfig,
    /// Enables dangerous operations like purge. Must never be true in production.
    pub test_mode: bool,
    pub tokens: TokenConfig,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
    /// Node name; mapped to a stable integer by the cluster node registry.
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureFlag {
    SessionStatusList,
    StatusList,
}

impl FeatureFlag {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "STATUS_LIST" => Some(FeatureFlag::StatusList),
            "SESSION_STATUS_LIST" => Some(FeatureFlag::SessionStatusList),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureFlags(HashSet<FeatureFlag>);

impl FeatureFlags {
    pub fn new(flags: impl IntoIterator<Item = FeatureFlag>) -> Self {
        Self(flags.into_iter().collect())
    }

    pub fn none() -> Self {
        Self(HashSet::new())
    }

    pub fn is_enabled(&self, flag: FeatureFlag) -> bool {
        self.0.contains(&flag)
    }

    /// Whether status tracking is enabled for the given kind.
    pub fn status_enabled(&self, kind: StatusListKind) -> bool {
        self.is_enabled(kind.feature_flag())
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self::new([FeatureFlag::StatusList, FeatureFlag::SessionStatusList])
    }
}

#[derive(Debug, Clone)]
pub struct StatusListConfig {
    /// Bits per status entry: 1, 2, 4 or 8.
    pub bit_size: u8,
    /// Number of indexes reserved per pool.
    pub block_size: u32,
    /// Lifetime of the signed status list response, in seconds.
    pub jwt_lifetime_seconds: u64,
}

impl Default for StatusListConfig {
    fn default() -> Self {
        Self {
            bit_size: 2,
            block_size: 100,
            jwt_lifetime_seconds: 600,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SigningConfig {
    pub algorithm: String,
    pub key_id: Option<String>,
    pub key: SigningKeySource,
}

#[derive(Debug, Clone)]
pub enum SigningKeySource {
    /// Shared secret for HS* algorithms.
    Secret(String),
    /// Path to a PEM encoded private key for RS* / ES* algorithms.
    PemFile(String),
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "HS256".to_string(),
            key_id: None,
            key: SigningKeySource::Secret(String::new()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_token_ttl_seconds: u64,
    pub cleanup_interval_seconds: u64,
    pub session_ttl_seconds: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_ttl_seconds: 3600,
            cleanup_interval_seconds: 60,
            session_ttl_seconds: 86400, // 24 hours
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let node_id = std::env::var("NODE_ID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let issuer = std::env::var("ISSUER")
            .unwrap_or_else(|_| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();

        let features = match std::env::var("FEATURE_FLAGS") {
            Ok(raw) => {
                let mut flags = Vec::new();
                for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    match FeatureFlag::parse(name) {
                        Some(flag) => flags.push(flag),
                        None => tracing::warn!(flag = %name, "Ignoring unknown feature flag"),
                    }
                }
                FeatureFlags::new(flags)
            }
            Err(_) => FeatureFlags::default(),
        };

        let defaults = StatusListConfig::default();
        let status_list = StatusListConfig {
            bit_size: env_parse("STATUS_LIST_BIT_SIZE").unwrap_or(defaults.bit_size),
            block_size: env_parse("STATUS_LIST_BLOCK_SIZE").unwrap_or(defaults.block_size),
            jwt_lifetime_seconds: env_parse("STATUS_LIST_JWT_LIFETIME")
                .unwrap_or(defaults.jwt_lifetime_seconds),
        };

        let key = match std::env::var("SIGNING_KEY_PEM") {
            Ok(path) => SigningKeySource::PemFile(path),
            Err(_) => SigningKeySource::Secret(std::env::var("SIGNING_KEY").unwrap_or_default()),
        };
        let signing = SigningConfig {
            algorithm: std::env::var("STATUS_LIST_JWT_ALG").unwrap_or_else(|_| "HS256".to_string()),
            key_id: std::env::var("SIGNING_KEY_ID").ok(),
            key,
        };

        let token_defaults = TokenConfig::default();
        let tokens = TokenConfig {
            access_token_ttl_seconds: env_parse("ACCESS_TOKEN_TTL_SECONDS")
                .unwrap_or(token_defaults.access_token_ttl_seconds),
            cleanup_interval_seconds: env_parse("CLEANUP_INTERVAL_SECONDS")
                .unwrap_or(token_defaults.cleanup_interval_seconds),
            session_ttl_seconds: env_parse("SESSION_TTL_SECONDS")
                .unwrap_or(token_defaults.session_ttl_seconds),
        };

        let test_mode = std::env::var("TEST_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let config = Config {
            features,
            issuer,
            node: NodeConfig {
                id: node_id,
                bind_address,
                data_dir,
            },
            signing,
            status_list,
            test_mode,
            tokens,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.id.is_empty() {
            return Err(ConfigError::ValidationError(
                "NODE_ID cannot be empty".to_string(),
            ));
        }

        if !matches!(self.status_list.bit_size, 1 | 2 | 4 | 8) {
            return Err(ConfigError::ValidationError(format!(
                "STATUS_LIST_BIT_SIZE must be one of 1, 2, 4, 8 (got {})",
                self.status_list.bit_size
            )));
        }

        if self.status_list.block_size == 0 {
            return Err(ConfigError::ValidationError(
                "STATUS_LIST_BLOCK_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.status_list.jwt_lifetime_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "STATUS_LIST_JWT_LIFETIME must be greater than 0".to_string(),
            ));
        }

        if let SigningKeySource::Secret(secret) = &self.signing.key {
            if secret.is_empty() && self.signing.algorithm.starts_with("HS") {
                tracing::warn!(
                    "SIGNING_KEY is empty. Signed status lists and access tokens use an empty \
                     HMAC secret; set SIGNING_KEY or SIGNING_KEY_PEM in production."
                );
            }
        }

        Ok(())
    }

    /// Absolute URL of the status list endpoint for the given kind.
    ///
    /// This is both the `uri` embedded in issued credentials and the `sub`
    /// of the signed status list.
    pub fn status_list_uri(&self, kind: StatusListKind) -> String {
        format!("{}{}", self.issuer, kind.endpoint_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_config;

    #[test]
    fn test_default_config_is_valid() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_rejects_unsupported_bit_size() {
        let mut config = test_config();
        config.status_list.bit_size = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_block_size() {
        let mut config = test_config();
        config.status_list.block_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_feature_flag_parsing() {
        assert_eq!(FeatureFlag::parse("status_list"), Some(FeatureFlag::StatusList));
        assert_eq!(
            FeatureFlag::parse(" SESSION_STATUS_LIST "),
            Some(FeatureFlag::SessionStatusList)
        );
        assert_eq!(FeatureFlag::parse("fido2"), None);
    }

    #[test]
    fn test_status_list_uri() {
        let config = test_config();
        assert_eq!(
            config.status_list_uri(StatusListKind::Session),
            "https://as.example.com/session_status_list"
        );
        assert_eq!(
            config.status_list_uri(StatusListKind::Token),
            "https://as.example.com/status_list"
        );
    }
}
