use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use umbra_types::api::{Claims, JournalEntryInput, MessageResponse};
use umbra_types::models::JournalEntry;

use crate::auth::{AppState, with_db};
use crate::characters::{Access, load_character};
use crate::error::{ApiError, ApiJson, ApiPath, ApiResult, trimmed};

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(character_id): ApiPath<i64>,
) -> ApiResult<Json<Vec<JournalEntry>>> {
    load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;
    let entries = with_db(&state, move |db| db.list_journal(character_id)).await?;
    Ok(Json(entries))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(character_id): ApiPath<i64>,
    ApiJson(req): ApiJson<JournalEntryInput>,
) -> ApiResult<impl IntoResponse> {
    let content = trimmed(&req.content)
        .ok_or_else(|| ApiError::MissingFields(vec!["content"]))?
        .to_string();
    load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;

    let entry = with_db(&state, move |db| db.create_journal_entry(character_id, &content, &req)).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn load_entry(state: &AppState, claims: &Claims, id: i64) -> ApiResult<JournalEntry> {
    let entry = with_db(state, move |db| db.get_journal_entry(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Journal entry not found"))?;
    load_character(state, claims, entry.character_id, Access::OwnerOrAdmin).await?;
    Ok(entry)
}

pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<JournalEntryInput>,
) -> ApiResult<Json<JournalEntry>> {
    if req.content.is_some() && trimmed(&req.content).is_none() {
        return Err(ApiError::bad_request("Content cannot be empty"));
    }
    load_entry(&state, &claims, id).await?;

    let entry = with_db(&state, move |db| db.update_journal_entry(id, &req))
        .await?
        .ok_or_else(|| ApiError::not_found("Journal entry not found"))?;
    Ok(Json(entry))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<MessageResponse>> {
    load_entry(&state, &claims, id).await?;
    with_db(&state, move |db| db.delete_journal_entry(id)).await?;

    Ok(Json(MessageResponse {
        message: "Journal entry deleted".into(),
    }))
}
