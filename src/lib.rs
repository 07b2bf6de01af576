//! status-manager - cluster-wide status list allocation and publication
//!
//! Every session and access token issued by this server is bound to an index
//! in an OAuth Token Status List. This crate provides:
//! - Collision-free index allocation across concurrently running nodes,
//!   using per-node pools of contiguous indexes
//! - Batched status updates (revocation, logout, expiration)
//! - Publication of the joined list as JSON or a signed `statuslist+jwt`
//! - redb embedded database (ACID, MVCC, crash-safe)
//! - REST API

pub mod api;
pub mod cluster;
pub mod config;
pub mod device;
pub mod expiration;
pub mod signing;
pub mod status;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod tokens;

use std::sync::Arc;

use cluster::ClusterNode;
use config::Config;
use signing::Signer;
use status::{
    IndexIssuanceService, PoolService, StatusClaimIssuer, StatusListKind, StatusListPublisher,
};
use storage::Database;

/// Shared application state
pub struct AppState {
    pub claims: StatusClaimIssuer,
    pub config: Config,
    pub db: Database,
    pub node: ClusterNode,
    pub session_list: StatusListPublisher,
    pub signer: Arc<dyn Signer>,
    pub token_list: StatusListPublisher,
}

impl AppState {
    /// Wire the per-kind issuance services and publishers for this node.
    pub fn new(config: Config, db: Database, node: ClusterNode, signer: Arc<dyn Signer>) -> Self {
        let pools = |kind: StatusListKind| PoolService::new(db.clone(), kind, &config.status_list);
        let issuance = |kind: StatusListKind| {
            Arc::new(IndexIssuanceService::new(pools(kind), node.node_id()))
        };
        let publisher = |kind: StatusListKind| {
            StatusListPublisher::new(
                pools(kind),
                config.status_list_uri(kind),
                config.status_list.jwt_lifetime_seconds,
                Arc::clone(&signer),
            )
        };

        let claims = StatusClaimIssuer::new(db.clone(), config.features.clone())
            .with_kind(
                issuance(StatusListKind::Session),
                config.status_list_uri(StatusListKind::Session),
            )
            .with_kind(
                issuance(StatusListKind::Token),
                config.status_list_uri(StatusListKind::Token),
            );
        let session_list = publisher(StatusListKind::Session);
        let token_list = publisher(StatusListKind::Token);

        Self {
            claims,
            config,
            db,
            node,
            session_list,
            signer,
            token_list,
        }
    }

    pub fn publisher(&self, kind: StatusListKind) -> &StatusListPublisher {
        match kind {
            StatusListKind::Session => &self.session_list,
            StatusListKind::Token => &self.token_list,
        }
    }
}
