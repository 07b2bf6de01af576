use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::bits::TokenStatus;
use super::issuance::{IndexIssuanceService, UpdateReport};
use super::StatusListKind;
use crate::config::FeatureFlags;
use crate::storage::models::{SessionRecord, TokenRecord};
use crate::storage::{Database, DatabaseError};

/// A persisted record that carries a memoized status list index.
pub trait StatusTracked {
    const KIND: StatusListKind;

    fn record_id(&self) -> &str;

    fn status_list_index(&self) -> Option<i64>;

    fn set_status_list_index(&mut self, index: i64);

    /// Store `index` on the persisted record unless it already has one.
    /// Returns the index the record ends up with, or `None` if it is gone.
    fn persist_status_index(
        db: &Database,
        id: &str,
        index: i64,
    ) -> Result<Option<i64>, DatabaseError>;
}

impl StatusTracked for SessionRecord {
    const KIND: StatusListKind = StatusListKind::Session;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn status_list_index(&self) -> Option<i64> {
        self.status_list_index
    }

    fn set_status_list_index(&mut self, index: i64) {
        self.status_list_index = Some(index);
    }

    fn persist_status_index(
        db: &Database,
        id: &str,
        index: i64,
    ) -> Result<Option<i64>, DatabaseError> {
        db.set_session_status_index(id, index)
    }
}

impl StatusTracked for TokenRecord {
    const KIND: StatusListKind = StatusListKind::Token;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn status_list_index(&self) -> Option<i64> {
        self.status_list_index
    }

    fn set_status_list_index(&mut self, index: i64) {
        self.status_list_index = Some(index);
    }

    fn persist_status_index(
        db: &Database,
        id: &str,
        index: i64,
    ) -> Result<Option<i64>, DatabaseError> {
        db.set_token_status_index(id, index)
    }
}

struct TrackedKind {
    issuance: Arc<IndexIssuanceService>,
    uri: String,
}

/// Binds issued sessions and tokens to status list indexes and embeds the
/// `status` claim into their claim sets.
pub struct StatusClaimIssuer {
    db: Database,
    features: FeatureFlags,
    kinds: HashMap<StatusListKind, TrackedKind>,
}

impl StatusClaimIssuer {
    pub fn new(db: Database, features: FeatureFlags) -> Self {
        Self {
            db,
            features,
            kinds: HashMap::new(),
        }
    }

    /// Register the issuance service of one kind and the endpoint URL that
    /// claims of that kind point to.
    pub fn with_kind(mut self, issuance: Arc<IndexIssuanceService>, uri: String) -> Self {
        self.kinds
            .insert(issuance.kind(), TrackedKind { issuance, uri });
        self
    }

    pub fn is_enabled(&self, kind: StatusListKind) -> bool {
        self.features.status_enabled(kind) && self.kinds.contains_key(&kind)
    }

    pub fn issuance(&self, kind: StatusListKind) -> Option<&Arc<IndexIssuanceService>> {
        self.kinds.get(&kind).map(|k| &k.issuance)
    }

    /// Index bound to `record`, allocating and persisting one on first use.
    ///
    /// Returns `None` when the kind is disabled or allocation failed; a
    /// failed allocation is not memoized, so the next issuance tries again.
    pub fn ensure_index<R: StatusTracked>(&self, record: &mut R) -> Option<i64> {
        if !self.features.status_enabled(R::KIND) {
            return None;
        }
        if let Some(index) = record.status_list_index().filter(|i| *i >= 0) {
            return Some(index);
        }
        let tracked = self.kinds.get(&R::KIND)?;

        // Concurrent first issuances may both allocate; the store keeps the
        // first index written and the other stays unused (Valid).
        let index = tracked.issuance.next();
        if index < 0 {
            return None;
        }

        match R::persist_status_index(&self.db, record.record_id(), index) {
            Ok(Some(stored)) => {
                if stored != index {
                    tracing::debug!(
                        kind = %R::KIND,
                        id = %record.record_id(),
                        stored,
                        unused = index,
                        "Record already had a status list index"
                    );
                }
                record.set_status_list_index(stored);
                Some(stored)
            }
            Ok(None) => {
                tracing::warn!(kind = %R::KIND, id = %record.record_id(), index, "Record vanished before its status index was stored");
                None
            }
            Err(e) => {
                tracing::error!(kind = %R::KIND, id = %record.record_id(), error = %e, "Failed to store status list index");
                None
            }
        }
    }

    /// Add `"status": {"status_list": {"idx", "uri"}}` to `claims` when an
    /// index is available. Returns the embedded index.
    pub fn attach_status_claim<R: StatusTracked>(
        &self,
        record: &mut R,
        claims: &mut Map<String, Value>,
    ) -> Option<i64> {
        let index = self.ensure_index(record)?;
        let uri = &self.kinds.get(&R::KIND)?.uri;
        claims.insert("status".to_string(), status_claim(index, uri));
        Some(index)
    }

    /// Persist the allocation cursor of every kind's current pool.
    pub fn checkpoint_pools(&self) {
        for (kind, tracked) in &self.kinds {
            if let Err(e) = tracked.issuance.checkpoint() {
                tracing::warn!(%kind, error = %e, "Failed to checkpoint status pool cursor");
            }
        }
    }

    /// Mark the given indexes `Invalid` in the list of `kind`.
    ///
    /// Runs even when the kind's feature flag is off, so indexes issued
    /// before the flag was turned off still get revoked.
    pub fn invalidate(&self, kind: StatusListKind, indexes: &[i64]) -> Option<UpdateReport> {
        if indexes.is_empty() {
            return None;
        }
        let tracked = self.kinds.get(&kind)?;
        Some(
            tracked
                .issuance
                .update_status_at_indexes(indexes, TokenStatus::Invalid),
        )
    }
}

pub fn status_claim(index: i64, uri: &str) -> Value {
    json!({ "status_list": { "idx": index, "uri": uri } })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureFlag;
    use crate::status::PoolService;
    use crate::testutil::{make_session, make_token, setup_db, status_config};

    const SESSION_URI: &str = "https://as.example.com/session_status_list";
    const TOKEN_URI: &str = "https://as.example.com/status_list";

    fn claim_issuer(db: &Database, features: FeatureFlags) -> StatusClaimIssuer {
        let service = |kind: StatusListKind| {
            Arc::new(IndexIssuanceService::new(
                PoolService::new(db.clone(), kind, &status_config(10)),
                1,
            ))
        };
        StatusClaimIssuer::new(db.clone(), features)
            .with_kind(service(StatusListKind::Session), SESSION_URI.to_string())
            .with_kind(service(StatusListKind::Token), TOKEN_URI.to_string())
    }

    #[test]
    fn test_index_is_memoized_per_record() {
        let (db, _temp) = setup_db();
        let issuer = claim_issuer(&db, FeatureFlags::default());

        let mut session = make_session("s1", "user-1");
        db.put_session(&session).unwrap();

        let first = issuer.ensure_index(&mut session).unwrap();
        let mut reloaded = db.get_session("s1").unwrap().unwrap();
        assert_eq!(reloaded.status_list_index, Some(first));

        let second = issuer.ensure_index(&mut reloaded).unwrap();
        assert_eq!(first, second);

        let pools = issuer
            .issuance(StatusListKind::Session)
            .unwrap()
            .pool_service()
            .all_pools()
            .unwrap();
        assert_eq!(pools.len(), 1);
    }

    #[test]
    fn test_attach_status_claim_shape() {
        let (db, _temp) = setup_db();
        let issuer = claim_issuer(&db, FeatureFlags::default());

        let mut token = make_token("t1", None);
        db.put_token(&token).unwrap();

        let mut claims = Map::new();
        let index = issuer.attach_status_claim(&mut token, &mut claims).unwrap();
        assert_eq!(claims["status"]["status_list"]["idx"], index);
        assert_eq!(claims["status"]["status_list"]["uri"], TOKEN_URI);
    }

    #[test]
    fn test_disabled_kind_omits_claim() {
        let (db, _temp) = setup_db();
        let issuer = claim_issuer(&db, FeatureFlags::new([FeatureFlag::StatusList]));

        let mut session = make_session("s1", "user-1");
        db.put_session(&session).unwrap();

        let mut claims = Map::new();
        assert!(issuer.attach_status_claim(&mut session, &mut claims).is_none());
        assert!(!claims.contains_key("status"));
        assert!(db.get_all_pools(StatusListKind::Session).unwrap().is_empty());
        assert!(issuer.is_enabled(StatusListKind::Token));
    }

    #[test]
    fn test_invalidate_marks_indexes() {
        let (db, _temp) = setup_db();
        let issuer = claim_issuer(&db, FeatureFlags::default());

        let mut token = make_token("t1", None);
        db.put_token(&token).unwrap();
        let index = issuer.ensure_index(&mut token).unwrap();

        let report = issuer.invalidate(StatusListKind::Token, &[index]).unwrap();
        assert_eq!(report.updated(), 1);

        let pool = issuer
            .issuance(StatusListKind::Token)
            .unwrap()
            .pool_service()
            .get_pool_by_index(index as u64)
            .unwrap();
        assert_eq!(pool.bits.status(index as u64 % 10), Some(TokenStatus::Invalid));
        assert!(issuer.invalidate(StatusListKind::Token, &[]).is_none());
    }
}
