use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use umbra_db::models::{NewCharacterRequest, ReviewOutcome};
use umbra_types::api::{Claims, CreateCharacterRequestInput, ReviewRequest};
use umbra_types::models::{Character, CharacterRequest};

use crate::auth::{AppState, with_db};
use crate::error::{ApiError, ApiJson, ApiPath, ApiResult, has_text, json_or_default, require_fields, trimmed};

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateCharacterRequestInput>,
) -> ApiResult<impl IntoResponse> {
    require_fields(&[
        ("firstName", has_text(&req.first_name)),
        ("lastName", has_text(&req.last_name)),
        ("birthDate", req.birth_date.is_some()),
        ("school", has_text(&req.school)),
        ("reason", has_text(&req.reason)),
    ])?;

    let user_id = claims.sub;
    let request = with_db(&state, move |db| {
        db.create_character_request(&NewCharacterRequest {
            user_id,
            first_name: trimmed(&req.first_name).unwrap_or_default(),
            middle_name: trimmed(&req.middle_name),
            last_name: trimmed(&req.last_name).unwrap_or_default(),
            birth_date: req.birth_date.unwrap_or_default(),
            school: trimmed(&req.school).unwrap_or_default(),
            description: trimmed(&req.description),
            reason: trimmed(&req.reason).unwrap_or_default(),
        })
    })
    .await?;

    info!("{} requested character {} {}", claims.username, request.first_name, request.last_name);
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<CharacterRequest>>> {
    let user_id = claims.sub;
    let requests = with_db(&state, move |db| db.list_character_requests_for_user(user_id)).await?;
    Ok(Json(requests))
}

pub async fn list_all(State(state): State<AppState>) -> ApiResult<Json<Vec<CharacterRequest>>> {
    let requests = with_db(&state, |db| db.list_character_requests()).await?;
    Ok(Json(requests))
}

/// Approving creates the character for the requesting user and returns it.
pub async fn approve(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    body: Bytes,
) -> ApiResult<Json<Character>> {
    let req: ReviewRequest = json_or_default(&body)?;
    let note = trimmed(&req.review_note).map(str::to_string);

    let admin_id = claims.sub;
    let outcome = with_db(&state, move |db| {
        let outcome = db.approve_character_request(id, admin_id, note.as_deref())?;
        if let ReviewOutcome::Done((request, character)) = &outcome {
            let details = format!("Approved character request for {}", character.full_name());
            db.log_admin_action(admin_id, "approve_character_request", Some(request.user_id), Some(&details))?;
        }
        Ok(outcome)
    })
    .await?;

    let (_, character) = settle(outcome)?;
    info!("{} approved character request {}", claims.username, id);
    Ok(Json(character))
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<ReviewRequest>,
) -> ApiResult<Json<CharacterRequest>> {
    let note = trimmed(&req.review_note)
        .ok_or_else(|| ApiError::bad_request("Review note is required"))?
        .to_string();

    let admin_id = claims.sub;
    let outcome = with_db(&state, move |db| {
        let outcome = db.reject_character_request(id, admin_id, &note)?;
        if let ReviewOutcome::Done(request) = &outcome {
            let details = format!("Rejected character request {}: {}", request.id, note);
            db.log_admin_action(admin_id, "reject_character_request", Some(request.user_id), Some(&details))?;
        }
        Ok(outcome)
    })
    .await?;

    let request = settle(outcome)?;
    info!("{} rejected character request {}", claims.username, id);
    Ok(Json(request))
}

fn settle<T>(outcome: ReviewOutcome<T>) -> ApiResult<T> {
    match outcome {
        ReviewOutcome::Done(value) => Ok(value),
        ReviewOutcome::NotFound => Err(ApiError::not_found("Character request not found")),
        ReviewOutcome::NotPending => Err(ApiError::bad_request("Request has already been reviewed")),
    }
}
