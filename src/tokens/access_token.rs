use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::signing::{SignError, Signer};
use crate::status::{StatusClaimIssuer, StatusListKind};
use crate::storage::models::TokenRecord;
use crate::storage::Database;

use super::expiry_after;
use super::generator::generate_id;

/// Header `typ` of issued access tokens (RFC 9068).
pub const ACCESS_TOKEN_TYP: &str = "at+jwt";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Database error: {0}")]
    Database(#[from] crate::storage::DatabaseError),
    #[error("ttl_seconds {0} is out of range")]
    InvalidTtl(u64),
    #[error("Token not found")]
    NotFound,
    #[error("Session {0} not found or expired")]
    SessionNotFound(String),
    #[error("Session belongs to a different subject")]
    SubjectMismatch,
    #[error("Signing error: {0}")]
    Sign(#[from] SignError),
}

#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub scopes: Vec<String>,
    pub session_id: Option<String>,
    pub subject_id: String,
    pub ttl_seconds: u64,
}

#[derive(Debug)]
pub struct IssuedToken {
    /// Compact signed JWT handed to the client
    pub access_token: String,
    pub record: TokenRecord,
}

/// Issue a signed access token carrying the token status claim.
pub fn issue(
    db: &Database,
    claims_issuer: &StatusClaimIssuer,
    signer: &dyn Signer,
    issuer: &str,
    request: TokenRequest,
) -> Result<IssuedToken, TokenError> {
    let now = Utc::now();
    let expires_at = expiry_after(now, request.ttl_seconds)
        .ok_or(TokenError::InvalidTtl(request.ttl_seconds))?;

    if let Some(session_id) = request.session_id.as_deref() {
        let session = db
            .get_session(session_id)?
            .filter(|s| s.expires_at > now)
            .ok_or_else(|| TokenError::SessionNotFound(session_id.to_string()))?;
        if session.subject_id != request.subject_id {
            return Err(TokenError::SubjectMismatch);
        }
    }

    let mut record = TokenRecord {
        created_at: now,
        expires_at,
        id: generate_id(),
        scopes: request.scopes,
        session_id: request.session_id,
        status_list_index: None,
        subject_id: request.subject_id,
    };
    db.put_token(&record)?;

    let mut claims = Map::new();
    claims.insert("iss".to_string(), Value::from(issuer));
    claims.insert("sub".to_string(), Value::from(record.subject_id.clone()));
    claims.insert("jti".to_string(), Value::from(record.id.clone()));
    claims.insert("iat".to_string(), Value::from(record.created_at.timestamp()));
    claims.insert("exp".to_string(), Value::from(record.expires_at.timestamp()));
    claims.insert("scope".to_string(), Value::from(record.scopes.join(" ")));
    if let Some(sid) = &record.session_id {
        claims.insert("sid".to_string(), Value::from(sid.clone()));
    }
    let index = claims_issuer.attach_status_claim(&mut record, &mut claims);

    let access_token = signer.sign(ACCESS_TOKEN_TYP, &Value::Object(claims))?;

    tracing::debug!(
        jti = %record.id,
        subject_id = %record.subject_id,
        status_index = ?index,
        "Issued access token"
    );
    Ok(IssuedToken {
        access_token,
        record,
    })
}

/// Delete a token and mark its index `Invalid`.
pub fn revoke(
    db: &Database,
    claims_issuer: &StatusClaimIssuer,
    id: &str,
) -> Result<TokenRecord, TokenError> {
    let token = db.delete_token(id)?.ok_or(TokenError::NotFound)?;
    if let Some(index) = token.status_list_index {
        claims_issuer.invalidate(StatusListKind::Token, &[index]);
    }
    tracing::info!(jti = %id, "Revoked access token");
    Ok(token)
}

/// Delete expired tokens and revoke their indexes (called by background task)
pub fn cleanup_expired(
    db: &Database,
    claims_issuer: &StatusClaimIssuer,
) -> Result<usize, TokenError> {
    let expired = db.delete_expired_tokens()?;
    let indexes: Vec<i64> = expired.iter().filter_map(|t| t.status_list_index).collect();
    claims_issuer.invalidate(StatusListKind::Token, &indexes);

    if !expired.is_empty() {
        tracing::info!(count = expired.len(), "Cleaned up expired access tokens");
    }
    Ok(expired.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::signing::JwtSigner;
    use crate::status::TokenStatus;
    use crate::testutil::{make_session, make_token, setup_db, test_claim_issuer};
    use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};

    const ISSUER: &str = "https://as.example.com";

    fn request(session_id: Option<&str>) -> TokenRequest {
        TokenRequest {
            scopes: vec!["openid".to_string(), "profile".to_string()],
            session_id: session_id.map(str::to_string),
            subject_id: "user-1".to_string(),
            ttl_seconds: 300,
        }
    }

    #[test]
    fn test_issue_signed_token_with_status_claim() {
        let (db, _temp) = setup_db();
        let issuer = test_claim_issuer(&db);
        let signer = JwtSigner::hmac(Algorithm::HS256, b"secret");
        db.put_session(&make_session("s1", "user-1")).unwrap();

        let issued = issue(&db, &issuer, &signer, ISSUER, request(Some("s1"))).unwrap();

        let header = decode_header(&issued.access_token).unwrap();
        assert_eq!(header.typ.as_deref(), Some(ACCESS_TOKEN_TYP));

        let claims = decode::<Value>(
            &issued.access_token,
            &DecodingKey::from_secret(b"secret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap()
        .claims;
        assert_eq!(claims["iss"], ISSUER);
        assert_eq!(claims["jti"], issued.record.id.as_str());
        assert_eq!(claims["sid"], "s1");
        assert_eq!(claims["scope"], "openid profile");
        assert_eq!(
            claims["status"]["status_list"]["idx"],
            issued.record.status_list_index.unwrap()
        );
        assert_eq!(
            claims["status"]["status_list"]["uri"],
            "https://as.example.com/status_list"
        );
    }

    #[test]
    fn test_issue_rejects_unknown_session() {
        let (db, _temp) = setup_db();
        let issuer = test_claim_issuer(&db);
        let signer = JwtSigner::hmac(Algorithm::HS256, b"secret");

        assert!(matches!(
            issue(&db, &issuer, &signer, ISSUER, request(Some("nope"))),
            Err(TokenError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_issue_rejects_foreign_session() {
        let (db, _temp) = setup_db();
        let issuer = test_claim_issuer(&db);
        let signer = JwtSigner::hmac(Algorithm::HS256, b"secret");
        db.put_session(&make_session("s1", "someone-else")).unwrap();

        assert!(matches!(
            issue(&db, &issuer, &signer, ISSUER, request(Some("s1"))),
            Err(TokenError::SubjectMismatch)
        ));
    }

    #[test]
    fn test_issue_rejects_unrepresentable_ttl() {
        let (db, _temp) = setup_db();
        let issuer = test_claim_issuer(&db);
        let signer = JwtSigner::hmac(Algorithm::HS256, b"secret");

        let mut req = request(None);
        req.ttl_seconds = u64::MAX;
        assert!(matches!(
            issue(&db, &issuer, &signer, ISSUER, req),
            Err(TokenError::InvalidTtl(u64::MAX))
        ));
        assert!(db.get_all_pools(StatusListKind::Token).unwrap().is_empty());
    }

    #[test]
    fn test_revoke_marks_invalid() {
        let (db, _temp) = setup_db();
        let issuer = test_claim_issuer(&db);
        let signer = JwtSigner::hmac(Algorithm::HS256, b"secret");

        let issued = issue(&db, &issuer, &signer, ISSUER, request(None)).unwrap();
        let index = issued.record.status_list_index.unwrap();

        revoke(&db, &issuer, &issued.record.id).unwrap();
        assert!(db.get_token(&issued.record.id).unwrap().is_none());
        assert!(matches!(
            revoke(&db, &issuer, &issued.record.id),
            Err(TokenError::NotFound)
        ));

        let pool = issuer
            .issuance(StatusListKind::Token)
            .unwrap()
            .pool_service()
            .get_pool_by_index(index as u64)
            .unwrap();
        let offset = index as u64 % u64::from(pool.block_size);
        assert_eq!(pool.bits.status(offset), Some(TokenStatus::Invalid));
    }

    #[test]
    fn test_cleanup_expired_tokens() {
        let (db, _temp) = setup_db();
        let issuer = test_claim_issuer(&db);

        let mut expired = make_token("old", None);
        expired.expires_at = Utc::now() - Duration::seconds(1);
        db.put_token(&expired).unwrap();
        issuer.ensure_index(&mut expired).unwrap();
        db.put_token(&make_token("new", None)).unwrap();

        assert_eq!(cleanup_expired(&db, &issuer).unwrap(), 1);
        assert!(db.get_token("old").unwrap().is_none());
        assert!(db.get_token("new").unwrap().is_some());
    }
}
