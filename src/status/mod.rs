//! Status list index allocation and publication.
//!
//! Every issued session and access token is bound to an index in a
//! cluster-wide status list. Indexes are handed out from fixed-size pools,
//! each created by and owned by exactly one cluster node, so nodes never
//! coordinate on the hot path. The joined list is published as a compressed
//! bitmap that relying parties poll.

pub mod bits;
pub mod issuance;
pub mod issuer;
pub mod pool;
pub mod pool_service;
pub mod publisher;

pub use bits::{StatusBits, TokenStatus};
pub use issuance::{IndexIssuanceService, PoolUpdate, UpdateReport};
pub use issuer::{StatusClaimIssuer, StatusTracked};
pub use pool::ActivePool;
pub use pool_service::{PoolError, PoolService};
pub use publisher::{
    PublishError, StatusList, StatusListFormat, StatusListJson, StatusListPublisher,
};

use crate::config::FeatureFlag;

/// A status-tracked resource type. Each kind has its own index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusListKind {
    Session,
    Token,
}

impl StatusListKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusListKind::Session => "session",
            StatusListKind::Token => "token",
        }
    }

    /// Path of the publication endpoint, relative to the issuer.
    pub fn endpoint_path(self) -> &'static str {
        match self {
            StatusListKind::Session => "/session_status_list",
            StatusListKind::Token => "/status_list",
        }
    }

    pub fn feature_flag(self) -> FeatureFlag {
        match self {
            StatusListKind::Session => FeatureFlag::SessionStatusList,
            StatusListKind::Token => FeatureFlag::StatusList,
        }
    }
}

impl std::fmt::Display for StatusListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
