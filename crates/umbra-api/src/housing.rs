use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};

use umbra_db::Database;
use umbra_db::models::{HousingDecision, NewHousingRequest, NewRoom};
use umbra_types::api::{ApproveHousingRequest, Claims, CreateHousingRequest, MessageResponse, ReviewRequest};
use umbra_types::models::{HousingRequest, RequestStatus};

use crate::auth::{AppState, with_db};
use crate::characters::{Access, load_character};
use crate::error::{ApiError, ApiJson, ApiPath, ApiResult, has_text, require_fields, trimmed};

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateHousingRequest>,
) -> ApiResult<impl IntoResponse> {
    require_fields(&[
        ("characterId", req.character_id.is_some()),
        ("requestType", has_text(&req.request_type)),
        ("description", has_text(&req.description)),
    ])?;
    let Some(character_id) = req.character_id else {
        return Err(ApiError::MissingFields(vec!["characterId"]));
    };

    let character = load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;
    let owner_id = character.user_id;

    let request = with_db(&state, move |db| {
        db.create_housing_request(&NewHousingRequest {
            user_id: owner_id,
            character_id,
            request_type: trimmed(&req.request_type).unwrap_or_default(),
            size: trimmed(&req.size),
            location: trimmed(&req.location),
            selected_area: trimmed(&req.selected_area),
            housing_name: trimmed(&req.housing_name),
            housing_password: trimmed(&req.housing_password),
            description: trimmed(&req.description).unwrap_or_default(),
        })
    })
    .await?;

    info!("{} filed housing request {} for {}", claims.username, request.id, character.full_name());
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<HousingRequest>>> {
    let user_id = claims.sub;
    let requests = with_db(&state, move |db| db.list_housing_requests_for_user(user_id)).await?;
    Ok(Json(requests))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let request = with_db(&state, move |db| db.get_housing_request(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Housing request not found"))?;

    if request.user_id != claims.sub && !claims.is_admin() {
        warn!("{} ({}) denied deleting housing request {}", claims.username, claims.sub, id);
        return Err(ApiError::forbidden("Access denied"));
    }
    if request.status == RequestStatus::Approved {
        return Err(ApiError::bad_request("Approved requests cannot be deleted"));
    }

    with_db(&state, move |db| db.delete_housing_request(id)).await?;
    info!("{} deleted housing request {}", claims.username, id);

    Ok(Json(MessageResponse {
        message: "Housing request deleted".into(),
    }))
}

pub async fn list_all(State(state): State<AppState>) -> ApiResult<Json<Vec<HousingRequest>>> {
    let requests = with_db(&state, |db| db.list_housing_requests()).await?;
    Ok(Json(requests))
}

pub async fn approve(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<ApproveHousingRequest>,
) -> ApiResult<Json<HousingRequest>> {
    let address = trimmed(&req.assigned_address)
        .ok_or_else(|| ApiError::MissingFields(vec!["assignedAddress"]))?
        .to_string();
    let note = trimmed(&req.review_note).map(str::to_string);

    decide(&state, &claims, id, RequestStatus::Approved, Some(address), note).await
}

/// Sends the request back to the player for changes.
pub async fn return_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<ReviewRequest>,
) -> ApiResult<Json<HousingRequest>> {
    let note = required_note(&req)?;
    decide(&state, &claims, id, RequestStatus::Returned, None, Some(note)).await
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<ReviewRequest>,
) -> ApiResult<Json<HousingRequest>> {
    let note = required_note(&req)?;
    decide(&state, &claims, id, RequestStatus::Rejected, None, Some(note)).await
}

fn required_note(req: &ReviewRequest) -> ApiResult<String> {
    trimmed(&req.review_note)
        .map(str::to_string)
        .ok_or_else(|| ApiError::MissingFields(vec!["reviewNote"]))
}

async fn decide(
    state: &AppState,
    claims: &Claims,
    id: i64,
    status: RequestStatus,
    address: Option<String>,
    note: Option<String>,
) -> ApiResult<Json<HousingRequest>> {
    let existing = with_db(state, move |db| db.get_housing_request(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Housing request not found"))?;
    if existing.status != RequestStatus::Pending {
        return Err(ApiError::bad_request("Request has already been reviewed"));
    }

    let admin_id = claims.sub;
    let decided = with_db(state, move |db| {
        let Some(request) = db.decide_housing_request(
            id,
            &HousingDecision {
                status,
                reviewer_id: admin_id,
                assigned_address: address.as_deref(),
                review_note: note.as_deref(),
            },
        )?
        else {
            return Ok(None);
        };

        if status == RequestStatus::Approved {
            create_private_room(db, &request)?;
        }
        notify_requester(db, &request)?;

        let details = format!("Housing request {} {}", request.id, status.as_str());
        db.log_admin_action(admin_id, "housing_decision", Some(request.user_id), Some(&details))?;
        Ok(Some(request))
    })
    .await?
    .ok_or_else(|| ApiError::bad_request("Request has already been reviewed"))?;

    info!("{} marked housing request {} as {}", claims.username, id, status.as_str());
    Ok(Json(decided))
}

/// Opens a private room named after the housing in the requested area, unless
/// the area is unknown or the room already exists.
fn create_private_room(db: &Database, request: &HousingRequest) -> anyhow::Result<()> {
    let (Some(area), Some(name)) = (non_empty(&request.selected_area), non_empty(&request.housing_name)) else {
        return Ok(());
    };
    let Some(category) = db.find_category_by_name(area)? else {
        warn!("Housing area '{}' does not match any category", area);
        return Ok(());
    };
    if db.find_room_in_category(category.id, name)?.is_some() {
        return Ok(());
    }

    let description = request
        .assigned_address
        .as_deref()
        .map(|address| format!("Adresa: {address}"));
    let room = db.create_room(&NewRoom {
        name,
        description: description.as_deref(),
        long_description: Some(&request.description),
        category_id: category.id,
        password: non_empty(&request.housing_password),
        is_public: false,
        sort_order: None,
    })?;

    info!("Created private room {} ({}) in {}", room.name, room.id, category.name);
    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Letter from the housing administration to the requesting character.
fn notify_requester(db: &Database, request: &HousingRequest) -> anyhow::Result<()> {
    let Some(office) = db.system_character()? else {
        warn!("No system character to send housing post from");
        return Ok(());
    };

    let (subject, mut content) = match request.status {
        RequestStatus::Approved => (
            "Žádost o bydlení schválena",
            format!(
                "Vaše žádost o bydlení byla schválena.\nPřidělená adresa: {}",
                request.assigned_address.as_deref().unwrap_or("-")
            ),
        ),
        RequestStatus::Returned => (
            "Žádost o bydlení vrácena k úpravě",
            "Vaše žádost o bydlení byla vrácena k úpravě.".to_string(),
        ),
        RequestStatus::Rejected => (
            "Žádost o bydlení zamítnuta",
            "Vaše žádost o bydlení byla zamítnuta.".to_string(),
        ),
        RequestStatus::Pending => return Ok(()),
    };
    if let Some(note) = non_empty(&request.review_note) {
        content.push_str(&format!("\nPoznámka: {note}"));
    }

    db.send_owl_post(office.id, request.character_id, subject, &content)?;
    Ok(())
}
