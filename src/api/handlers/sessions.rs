use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::device;
use crate::storage::models::SessionRecord;
use crate::tokens::session::{self, SessionError};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateSessionRequest {
    pub subject_id: String,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
    /// Overrides the request's own User-Agent header
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub claims: serde_json::Map<String, serde_json::Value>,
    pub expires_at: String,
    pub id: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub created_at: String,
    pub device_info: DeviceInfoResponse,
    pub expires_at: String,
    pub id: String,
    pub status_list_index: Option<i64>,
    pub subject_id: String,
}

#[derive(Debug, Serialize)]
pub struct DeviceInfoResponse {
    pub browser: Option<String>,
    pub kind: String,
    pub os: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RevokeSessionResponse {
    pub id: String,
    pub tokens_revoked: usize,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(req): AppJson<CreateSessionRequest>,
) -> Result<Json<JSend<CreateSessionResponse>>, ApiError> {
    if req.subject_id.trim().is_empty() {
        return Err(ApiError::bad_request("subject_id is required"));
    }
    if req.ttl_seconds == Some(0) {
        return Err(ApiError::bad_request("ttl_seconds must be greater than 0"));
    }

    let user_agent = req
        .user_agent
        .as_deref()
        .or_else(|| headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()));
    let ttl = req
        .ttl_seconds
        .unwrap_or(state.config.tokens.session_ttl_seconds);

    let issued = session::create(
        &state.db,
        &state.claims,
        &req.subject_id,
        device::detect(user_agent),
        ttl,
    )
    .map_err(|e| match e {
        SessionError::InvalidTtl(_) => ApiError::bad_request(e.to_string()),
        e => {
            tracing::error!(error = %e, "Failed to create session");
            ApiError::internal("Failed to create session")
        }
    })?;

    Ok(JSend::success(CreateSessionResponse {
        claims: issued.claims,
        expires_at: issued.session.expires_at.to_rfc3339(),
        id: issued.session.id,
        token: issued.session.token,
    }))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<SessionResponse>>, ApiError> {
    let session = session::get(&state.db, &id)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Session not found"))?;

    Ok(JSend::success(session_to_response(&session)))
}

pub async fn revoke_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<RevokeSessionResponse>>, ApiError> {
    match session::revoke(&state.db, &state.claims, &id) {
        Ok(revoked) => Ok(JSend::success(RevokeSessionResponse {
            id: revoked.session.id,
            tokens_revoked: revoked.tokens_revoked,
        })),
        Err(SessionError::NotFound) => Err(ApiError::not_found("Session not found")),
        Err(e) => Err(ApiError::internal(format!("Failed to revoke session: {e}"))),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn session_to_response(session: &SessionRecord) -> SessionResponse {
    SessionResponse {
        created_at: session.created_at.to_rfc3339(),
        device_info: DeviceInfoResponse {
            browser: session.device_info.browser.clone(),
            kind: format!("{:?}", session.device_info.kind),
            os: session.device_info.os.clone(),
        },
        expires_at: session.expires_at.to_rfc3339(),
        id: session.id.clone(),
        status_list_index: session.status_list_index,
        subject_id: session.subject_id.clone(),
    }
}
