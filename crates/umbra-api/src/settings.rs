use axum::{Extension, Json, extract::State};

use umbra_types::api::{
    CharacterOrderRequest, Claims, HighlightSettingsRequest, NarratorColorRequest, SuccessResponse,
};

use crate::auth::{AppState, with_db};
use crate::error::{ApiError, ApiJson, ApiResult, trimmed};

const DEFAULT_HIGHLIGHT_COLOR: &str = "yellow";

pub async fn character_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CharacterOrderRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let user_id = claims.sub;
    with_db(&state, move |db| db.update_character_order(user_id, &req.character_order))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(SuccessResponse { success: true }))
}

pub async fn highlight_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<HighlightSettingsRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let words = trimmed(&req.highlight_words).map(str::to_string);
    let color = trimmed(&req.highlight_color)
        .unwrap_or(DEFAULT_HIGHLIGHT_COLOR)
        .to_string();

    let user_id = claims.sub;
    with_db(&state, move |db| db.update_highlight_settings(user_id, words.as_deref(), &color))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(SuccessResponse { success: true }))
}

pub async fn narrator_color(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<NarratorColorRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let color = trimmed(&req.narrator_color)
        .ok_or_else(|| ApiError::bad_request("Narrator color is required"))?
        .to_string();

    let user_id = claims.sub;
    with_db(&state, move |db| db.update_narrator_color(user_id, &color))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(SuccessResponse { success: true }))
}
