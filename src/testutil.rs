//! Shared test helpers, available to all `#[cfg(test)]` modules in the crate.

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::Algorithm;
use tempfile::TempDir;

use crate::cluster::ClusterNodeManager;
use crate::config::{
    Config, FeatureFlags, NodeConfig, SigningConfig, SigningKeySource, StatusListConfig,
    TokenConfig,
};
use crate::signing::JwtSigner;
use crate::status::{IndexIssuanceService, PoolService, StatusClaimIssuer, StatusListKind};
use crate::storage::models::{DeviceInfo, SessionRecord, TokenRecord};
use crate::storage::Database;
use crate::AppState;

/// Open a fresh database in a temporary directory.
///
/// The caller must keep the returned `TempDir` alive for the duration of the
/// test.
pub fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path()).unwrap();
    (db, temp_dir)
}

/// A minimal `Config` suitable for unit tests.
pub fn test_config() -> Config {
    Config {
        features: FeatureFlags::default(),
        issuer: "https://as.example.com".to_string(),
        node: NodeConfig {
            bind_address: "127.0.0.1:8080".to_string(),
            data_dir: "/tmp/test".to_string(),
            id: "test-node".to_string(),
        },
        signing: SigningConfig {
            algorithm: "HS256".to_string(),
            key_id: None,
            key: SigningKeySource::Secret("test-secret".to_string()),
        },
        status_list: StatusListConfig::default(),
        test_mode: false,
        tokens: TokenConfig::default(),
    }
}

/// Two bits per entry with the given block size.
pub fn status_config(block_size: u32) -> StatusListConfig {
    StatusListConfig {
        bit_size: 2,
        block_size,
        ..StatusListConfig::default()
    }
}

/// Claim issuer with both kinds enabled, block size 10, node id 1.
pub fn test_claim_issuer(db: &Database) -> StatusClaimIssuer {
    let config = test_config();
    let service = |kind: StatusListKind| {
        Arc::new(IndexIssuanceService::new(
            PoolService::new(db.clone(), kind, &status_config(10)),
            1,
        ))
    };
    StatusClaimIssuer::new(db.clone(), config.features.clone())
        .with_kind(
            service(StatusListKind::Session),
            config.status_list_uri(StatusListKind::Session),
        )
        .with_kind(
            service(StatusListKind::Token),
            config.status_list_uri(StatusListKind::Token),
        )
}

/// Build a full `Arc<AppState>` around the given database.
pub fn test_state(db: Database) -> Arc<AppState> {
    let config = test_config();
    let node = ClusterNodeManager::register(&db, &config.node.id).unwrap();
    let signer = Arc::new(JwtSigner::hmac(Algorithm::HS256, b"test-secret"));
    Arc::new(AppState::new(config, db, node, signer))
}

/// Create a `SessionRecord` with the given id and subject.
pub fn make_session(id: &str, subject: &str) -> SessionRecord {
    let now = Utc::now();
    SessionRecord {
        created_at: now,
        device_info: DeviceInfo::default(),
        expires_at: now + chrono::Duration::hours(24),
        id: id.to_string(),
        status_list_index: None,
        subject_id: subject.to_string(),
        token: format!("tok_{id}"),
    }
}

/// Create a `TokenRecord` with the given `jti`, optionally bound to a session.
pub fn make_token(id: &str, session_id: Option<&str>) -> TokenRecord {
    let now = Utc::now();
    TokenRecord {
        created_at: now,
        expires_at: now + chrono::Duration::hours(1),
        id: id.to_string(),
        scopes: vec!["openid".to_string()],
        session_id: session_id.map(str::to_string),
        status_list_index: None,
        subject_id: "user-1".to_string(),
    }
}
