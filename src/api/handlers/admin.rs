use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::status::StatusListKind;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub cluster_node_id: u32,
    pub node_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub sessions_deleted: u64,
    pub tokens_deleted: u64,
}

/// Subset of OpenID provider metadata describing the status list endpoints.
#[derive(Debug, Serialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_status_list_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_list_endpoint: Option<String>,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        cluster_node_id: state.node.node_id(),
        node_id: state.node.name().to_string(),
        status: "healthy".to_string(),
    })
}

pub async fn discovery(State(state): State<Arc<AppState>>) -> Json<DiscoveryDocument> {
    let endpoint = |kind: StatusListKind| {
        state
            .config
            .features
            .status_enabled(kind)
            .then(|| state.config.status_list_uri(kind))
    };

    Json(DiscoveryDocument {
        issuer: state.config.issuer.clone(),
        session_status_list_endpoint: endpoint(StatusListKind::Session),
        status_list_endpoint: endpoint(StatusListKind::Token),
    })
}

pub async fn admin_purge(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<PurgeResponse>>, ApiError> {
    match state.db.purge_all() {
        Ok(stats) => {
            tracing::warn!(
                sessions = stats.sessions,
                tokens = stats.tokens,
                "Purged all sessions and tokens"
            );
            Ok(JSend::success(PurgeResponse {
                sessions_deleted: stats.sessions,
                tokens_deleted: stats.tokens,
            }))
        }
        Err(e) => Err(ApiError::internal(format!("Failed to purge data: {e}"))),
    }
}
