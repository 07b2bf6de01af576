use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::status::{StatusClaimIssuer, StatusListKind};
use crate::storage::models::{DeviceInfo, SessionRecord};
use crate::storage::Database;

use super::expiry_after;
use super::generator::{generate_id, generate_token};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Database error: {0}")]
    Database(#[from] crate::storage::DatabaseError),
    #[error("ttl_seconds {0} is out of range")]
    InvalidTtl(u64),
    #[error("Session not found")]
    NotFound,
}

/// A freshly created session and the claims describing it.
#[derive(Debug)]
pub struct IssuedSession {
    pub claims: Map<String, Value>,
    pub session: SessionRecord,
}

#[derive(Debug)]
pub struct RevokedSession {
    pub session: SessionRecord,
    pub tokens_revoked: usize,
}

/// Create a session and bind it to a session status list index.
pub fn create(
    db: &Database,
    claims_issuer: &StatusClaimIssuer,
    subject_id: &str,
    device_info: DeviceInfo,
    ttl_seconds: u64,
) -> Result<IssuedSession, SessionError> {
    let now = Utc::now();
    let expires_at =
        expiry_after(now, ttl_seconds).ok_or(SessionError::InvalidTtl(ttl_seconds))?;
    let mut session = SessionRecord {
        created_at: now,
        device_info,
        expires_at,
        id: generate_id(),
        status_list_index: None,
        subject_id: subject_id.to_string(),
        token: generate_token(),
    };
    db.put_session(&session)?;

    let mut claims = Map::new();
    claims.insert("sid".to_string(), Value::from(session.id.clone()));
    claims.insert("sub".to_string(), Value::from(session.subject_id.clone()));
    claims.insert("exp".to_string(), Value::from(session.expires_at.timestamp()));
    let index = claims_issuer.attach_status_claim(&mut session, &mut claims);

    tracing::debug!(
        session_id = %session.id,
        subject_id = %subject_id,
        status_index = ?index,
        "Created session"
    );
    Ok(IssuedSession { claims, session })
}

/// Fetch a live session. Expired sessions read as absent; the expiration
/// cleaner deletes them and revokes their indexes.
pub fn get(db: &Database, id: &str) -> Result<Option<SessionRecord>, SessionError> {
    Ok(db.get_session(id)?.filter(|s| s.expires_at > Utc::now()))
}

/// Delete a session and every access token issued within it, marking all of
/// their indexes `Invalid`.
pub fn revoke(
    db: &Database,
    claims_issuer: &StatusClaimIssuer,
    id: &str,
) -> Result<RevokedSession, SessionError> {
    let session = db.delete_session(id)?.ok_or(SessionError::NotFound)?;
    let tokens = db.delete_tokens_by_session(id)?;

    if let Some(index) = session.status_list_index {
        claims_issuer.invalidate(StatusListKind::Session, &[index]);
    }
    let token_indexes: Vec<i64> = tokens.iter().filter_map(|t| t.status_list_index).collect();
    claims_issuer.invalidate(StatusListKind::Token, &token_indexes);

    tracing::info!(
        session_id = %id,
        tokens_revoked = tokens.len(),
        "Revoked session"
    );
    Ok(RevokedSession {
        session,
        tokens_revoked: tokens.len(),
    })
}

/// Delete expired sessions and revoke their indexes (called by background task)
pub fn cleanup_expired(
    db: &Database,
    claims_issuer: &StatusClaimIssuer,
) -> Result<usize, SessionError> {
    let expired = db.delete_expired_sessions()?;
    let indexes: Vec<i64> = expired.iter().filter_map(|s| s.status_list_index).collect();
    claims_issuer.invalidate(StatusListKind::Session, &indexes);

    if !expired.is_empty() {
        tracing::info!(count = expired.len(), "Cleaned up expired sessions");
    }
    Ok(expired.len())
}
