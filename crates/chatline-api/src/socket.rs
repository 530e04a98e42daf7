use axum::{
    extract::{Query, State, WebSocketUpgrade, ws::rejection::WebSocketUpgradeRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::warn;

use chatline_gateway::connection;

use crate::auth::AppState;

#[derive(Debug, Deserialize)]
pub struct SocketParams {
    pub token: Option<String>,
}

/// Realtime handshake. The bearer token travels as a query parameter and is
/// checked before the upgrade, so an unauthenticated client never joins.
pub async fn upgrade(
    State(state): State<AppState>,
    Query(params): Query<SocketParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let claims = match state.manager.authenticate(params.token.as_deref()) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("realtime handshake rejected: {}", e);
            return (StatusCode::UNAUTHORIZED, "Authentication error").into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let manager = state.manager.clone();
    ws.on_upgrade(move |socket| async move {
        let session = manager.join(claims).await;
        connection::handle_connection(socket, manager, session).await;
    })
}
