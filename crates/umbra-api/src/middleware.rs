use axum::{
    RequestPartsExt,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use tracing::warn;

use umbra_types::api::Claims;

use crate::auth::{AppState, decode_token};
use crate::error::ApiError;

/// Extract and validate the JWT from the Authorization header, then record
/// the caller as active.
pub async fn require_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = req.into_parts();

    let TypedHeader(Authorization(bearer)) = parts
        .extract::<TypedHeader<Authorization<Bearer>>>()
        .await
        .map_err(|_| ApiError::unauthorized("Unauthorized"))?;

    let claims = decode_token(&state.jwt_secret, bearer.token()).map_err(|e| {
        warn!("Rejected token on {}: {}", parts.uri.path(), e);
        ApiError::unauthorized("Invalid token")
    })?;

    state
        .activity
        .touch(claims.sub, &claims.username, claims.role)
        .await;

    let mut req = Request::from_parts(parts, body);
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Layered inside `require_auth`; the role is taken from the token.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;

    if !claims.is_admin() {
        warn!("{} ({}) denied admin route {}", claims.username, claims.sub, req.uri().path());
        return Err(ApiError::forbidden("Admin access required"));
    }

    Ok(next.run(req).await)
}
