use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use chatline_db::UserDirectory;
use chatline_types::api::Claims;

use crate::auth::AppState;
use crate::join_error;

/// Everyone except the caller, with their persisted online flag.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let users = tokio::task::spawn_blocking(move || db.list_all_except(claims.sub))
        .await
        .map_err(join_error)?
        .map_err(|e| {
            error!("failed to list users: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(users))
}
