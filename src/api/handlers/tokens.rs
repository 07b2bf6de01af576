use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::tokens::access_token::{self, TokenError, TokenRequest};
use crate::AppState;

#[derive(Debug, Deserialize, Serialize)]
pub struct IssueTokenRequest {
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub subject_id: String,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssueTokenResponse {
    pub access_token: String,
    pub expires_at: String,
    pub id: String,
    pub status_list_index: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RevokeTokenResponse {
    pub id: String,
}

pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<IssueTokenRequest>,
) -> Result<Json<JSend<IssueTokenResponse>>, ApiError> {
    if req.subject_id.trim().is_empty() {
        return Err(ApiError::bad_request("subject_id is required"));
    }
    if req.ttl_seconds == Some(0) {
        return Err(ApiError::bad_request("ttl_seconds must be greater than 0"));
    }

    let request = TokenRequest {
        scopes: req.scopes,
        session_id: req.session_id,
        subject_id: req.subject_id,
        ttl_seconds: req
            .ttl_seconds
            .unwrap_or(state.config.tokens.access_token_ttl_seconds),
    };

    let issued = access_token::issue(
        &state.db,
        &state.claims,
        state.signer.as_ref(),
        &state.config.issuer,
        request,
    )
    .map_err(|e| match e {
        TokenError::InvalidTtl(_)
        | TokenError::SessionNotFound(_)
        | TokenError::SubjectMismatch => {
            ApiError::bad_request(e.to_string())
        }
        e => {
            tracing::error!(error = %e, "Failed to issue access token");
            ApiError::internal("Failed to issue access token")
        }
    })?;

    Ok(JSend::success(IssueTokenResponse {
        access_token: issued.access_token,
        expires_at: issued.record.expires_at.to_rfc3339(),
        id: issued.record.id,
        status_list_index: issued.record.status_list_index,
    }))
}

pub async fn revoke_token(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<RevokeTokenResponse>>, ApiError> {
    match access_token::revoke(&state.db, &state.claims, &id) {
        Ok(token) => Ok(JSend::success(RevokeTokenResponse { id: token.id })),
        Err(TokenError::NotFound) => Err(ApiError::not_found("Token not found")),
        Err(e) => Err(ApiError::internal(format!("Failed to revoke token: {e}"))),
    }
}
