use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use crate::api::response::ApiError;
use crate::status::{StatusListFormat, StatusListKind};
use crate::AppState;

pub async fn token_status_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    serve(&state, StatusListKind::Token, &headers)
}

pub async fn session_status_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    serve(&state, StatusListKind::Session, &headers)
}

fn serve(state: &AppState, kind: StatusListKind, headers: &HeaderMap) -> Result<Response, ApiError> {
    if !state.config.features.status_enabled(kind) {
        return Err(ApiError::forbidden(format!(
            "{} status list is disabled",
            kind
        )));
    }

    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    let format = StatusListFormat::from_accept(accept);

    let body = state.publisher(kind).publish(format).map_err(|e| {
        tracing::error!(%kind, ?format, error = %e, "Failed to publish status list");
        ApiError::internal("Failed to build status list")
    })?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, format.content_type()),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
        .into_response())
}
