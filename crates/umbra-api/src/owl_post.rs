use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};

use umbra_types::api::{
    Claims, CountResponse, MarkReadRequest, MessageResponse, NumberOrString, OwlPostCharacter, SendOwlPostRequest,
    SuccessResponse, UnreadTotalQuery,
};
use umbra_types::models::OwlPostMessage;

use crate::auth::{AppState, with_db};
use crate::characters::{Access, load_character};
use crate::error::{ApiError, ApiJson, ApiPath, ApiQuery, ApiResult, has_text, require_fields, trimmed};

pub async fn send(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<SendOwlPostRequest>,
) -> ApiResult<impl IntoResponse> {
    let present = |id: &Option<NumberOrString>| id.as_ref().is_some_and(|id| !id.is_blank());
    require_fields(&[
        ("senderCharacterId", present(&req.sender_character_id)),
        ("recipientCharacterId", present(&req.recipient_character_id)),
        ("subject", has_text(&req.subject)),
        ("content", has_text(&req.content)),
    ])?;

    let sender_id = positive_id(req.sender_character_id.as_ref())?;
    let recipient_id = positive_id(req.recipient_character_id.as_ref())?;

    let sender = load_character(&state, &claims, sender_id, Access::OwnerOrAdmin).await?;
    with_db(&state, move |db| db.get_character(recipient_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Recipient character not found"))?;

    let subject = trimmed(&req.subject).unwrap_or_default().to_string();
    let content = trimmed(&req.content).unwrap_or_default().to_string();
    let message = with_db(&state, move |db| db.send_owl_post(sender_id, recipient_id, &subject, &content)).await?;

    info!("{} sent owl post {} to character {}", sender.full_name(), message.id, recipient_id);
    Ok((StatusCode::CREATED, Json(message)))
}

fn positive_id(id: Option<&NumberOrString>) -> ApiResult<i64> {
    id.and_then(NumberOrString::as_i64)
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request("Invalid character id"))
}

pub async fn inbox(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(character_id): ApiPath<i64>,
) -> ApiResult<Json<Vec<OwlPostMessage>>> {
    load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;
    let messages = with_db(&state, move |db| db.owl_post_inbox(character_id)).await?;
    Ok(Json(messages))
}

pub async fn sent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(character_id): ApiPath<i64>,
) -> ApiResult<Json<Vec<OwlPostMessage>>> {
    load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;
    let messages = with_db(&state, move |db| db.owl_post_sent(character_id)).await?;
    Ok(Json(messages))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(character_id): ApiPath<i64>,
) -> ApiResult<Json<CountResponse>> {
    load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;
    let count = with_db(&state, move |db| db.owl_post_unread_count(character_id)).await?;
    Ok(Json(CountResponse { count }))
}

/// Unread post across all of the caller's characters, or for one of them.
pub async fn unread_total(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<UnreadTotalQuery>,
) -> ApiResult<Json<CountResponse>> {
    let count = match trimmed(&query.character_id) {
        Some(raw) => {
            let character_id: i64 = raw
                .parse()
                .map_err(|_| ApiError::bad_request("Invalid character id"))?;
            load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;
            with_db(&state, move |db| db.owl_post_unread_count(character_id)).await?
        }
        None => {
            let user_id = claims.sub;
            with_db(&state, move |db| db.owl_post_unread_total(user_id)).await?
        }
    };

    Ok(Json(CountResponse { count }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(message_id): ApiPath<i64>,
    ApiJson(req): ApiJson<MarkReadRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let character_id = req
        .character_id
        .ok_or_else(|| ApiError::MissingFields(vec!["characterId"]))?;
    load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;

    // Only the recipient can mark a message read
    if !with_db(&state, move |db| db.mark_owl_post_read(message_id, character_id)).await? {
        return Err(ApiError::not_found("Message not found"));
    }

    Ok(Json(SuccessResponse { success: true }))
}

/// Everyone a letter can be addressed to.
pub async fn characters(State(state): State<AppState>) -> ApiResult<Json<Vec<OwlPostCharacter>>> {
    let characters = with_db(&state, |db| db.list_playable_characters()).await?;

    Ok(Json(
        characters
            .into_iter()
            .map(|character| OwlPostCharacter {
                full_name: character.full_name(),
                character,
            })
            .collect(),
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(message_id): ApiPath<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let message = with_db(&state, move |db| db.get_owl_post(message_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;

    if !claims.is_admin() {
        let (sender_id, recipient_id) = (message.sender_character_id, message.recipient_character_id);
        let owners = with_db(&state, move |db| {
            let sender = db.get_character(sender_id)?;
            let recipient = db.get_character(recipient_id)?;
            Ok([sender, recipient].into_iter().flatten().map(|c| c.user_id).collect::<Vec<_>>())
        })
        .await?;

        if !owners.contains(&claims.sub) {
            warn!("{} ({}) denied deleting owl post {}", claims.username, claims.sub, message_id);
            return Err(ApiError::forbidden("Access denied"));
        }
    }

    with_db(&state, move |db| db.delete_owl_post(message_id)).await?;
    info!("{} deleted owl post {}", claims.username, message_id);

    Ok(Json(MessageResponse {
        message: "Message deleted".into(),
    }))
}
