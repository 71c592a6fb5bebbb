use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use tracing::{error, info, warn};

use super::super::AppState;
use super::super::auth::bearer_token;
use crate::core::orchestrator::BuildRequest;

#[derive(Debug, Default, Deserialize)]
pub struct BuildQuery {
    #[serde(default)]
    uid: String,
    #[serde(default, rename = "taskId")]
    task_id: String,
}

/// Runs one build task.
///
/// The dispatcher retries anything that is not a 2xx, so every outcome is
/// answered with 200 and the message in the body.
pub async fn build_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BuildQuery>,
) -> (StatusCode, String) {
    info!(
        "Build requested: uid={} taskId={}",
        query.uid, query.task_id
    );
    // Closed only if the semaphore is dropped, which the state never does.
    let _permit = match state.build_permits.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            error!("Build permits are unavailable: {}", e);
            return (StatusCode::OK, e.to_string());
        }
    };
    let request = BuildRequest {
        uid: query.uid,
        task_id: query.task_id,
        bearer_token: bearer_token(&headers),
    };
    let outcome = state.orchestrator.run(request).await;
    if outcome.is_success() {
        info!("Build finished: {}", outcome.message());
    } else {
        warn!("Build did not succeed: {}", outcome.message());
    }
    (StatusCode::OK, outcome.message().to_string())
}
