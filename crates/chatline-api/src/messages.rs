use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use chatline_db::MessageStore;
use chatline_types::api::Claims;

use crate::auth::AppState;
use crate::join_error;

/// Public room history, oldest first.
pub async fn public_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    history(state, claims.sub, None).await
}

/// Direct messages between the caller and `peer_id`, oldest first.
pub async fn direct_history(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    history(state, claims.sub, Some(peer_id)).await
}

async fn history(
    state: AppState,
    me: Uuid,
    peer: Option<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    // Run blocking DB query off the async runtime
    let db = state.db.clone();
    let messages = tokio::task::spawn_blocking(move || db.query_conversation(me, peer))
        .await
        .map_err(join_error)?
        .map_err(|e| {
            error!("history query failed: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(messages))
}
