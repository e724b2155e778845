use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};
use serde::Deserialize;
use tracing::{info, warn};

use umbra_gateway::connection;

use crate::auth::{AppState, decode_token};
use crate::error::{ApiError, ApiQuery, ApiResult};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// Authenticates from the `token` query parameter before upgrading.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<WsQuery>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Token required"))?;

    let claims = decode_token(&state.jwt_secret, &token).map_err(|e| {
        warn!("Rejected gateway token: {}", e);
        ApiError::unauthorized("Invalid token")
    })?;

    state
        .activity
        .touch(claims.sub, &claims.username, claims.role)
        .await;
    info!("Gateway upgrade for {} ({})", claims.username, claims.sub);

    let dispatcher = state.dispatcher.clone();
    let is_admin = claims.is_admin();
    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, dispatcher, claims.sub, claims.username, is_admin)
    }))
}
