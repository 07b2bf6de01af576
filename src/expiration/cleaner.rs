use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::tokens::{access_token, session};
use crate::AppState;

/// Start the background task that removes expired sessions and access tokens,
/// revokes their status list indexes and checkpoints pool cursors.
pub fn start_expiration_cleaner(state: Arc<AppState>) -> JoinHandle<()> {
    let interval = Duration::from_secs(state.config.tokens.cleanup_interval_seconds.max(1));

    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);

        loop {
            interval_timer.tick().await;
            run_cleanup(&state).await;
        }
    })
}

pub(crate) async fn run_cleanup(state: &Arc<AppState>) {
    debug!("Running expiration cleanup");

    let task_state = Arc::clone(state);
    let result = tokio::task::spawn_blocking(move || {
        let sessions = session::cleanup_expired(&task_state.db, &task_state.claims);
        let tokens = access_token::cleanup_expired(&task_state.db, &task_state.claims);
        task_state.claims.checkpoint_pools();
        (sessions, tokens)
    })
    .await;

    let (session_result, token_result) = match result {
        Ok(results) => results,
        Err(e) => {
            error!(error = %e, "Expiration cleanup task panicked");
            return;
        }
    };

    match session_result {
        Ok(count) if count > 0 => debug!(sessions_cleaned = count, "Expired sessions cleaned"),
        Err(e) => error!(error = %e, "Failed to clean up expired sessions"),
        _ => {}
    }

    match token_result {
        Ok(count) if count > 0 => debug!(tokens_cleaned = count, "Expired access tokens cleaned"),
        Err(e) => error!(error = %e, "Failed to clean up expired access tokens"),
        _ => {}
    }
}
