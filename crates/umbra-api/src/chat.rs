use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, info, warn};

use umbra_db::models::{DeleteCategoryOutcome, NewRoom, UpdateCategoryOutcome};
use umbra_types::api::{
    BulkResult, CastSpellRequest, CastSpellResponse, ChatCategoryTree, Claims, CreateCategoryRequest,
    CreateRoomRequest, EnterRoomRequest, MessageQuery, MessageResponse, MoveRequest, NarratorMessageRequest,
    RoomPresenceRequest, SendChatMessageRequest, SortOrderRequest, SuccessResponse, UpdateCategoryRequest,
    UpdateRoomRequest,
};
use umbra_types::events::GatewayEvent;
use umbra_types::models::{ChatCategory, ChatMessage, ChatRoom, MessageType, RoomPresence};

use crate::auth::{AppState, with_db};
use crate::characters::{Access, load_character};
use crate::error::{ApiError, ApiJson, ApiPath, ApiQuery, ApiResult, json_or_default, require_fields, trimmed};

const MAX_MESSAGE_CHARS: usize = 5000;
const MAX_HISTORY: u32 = 500;
/// Areas nest inside categories; anything deeper than this is a parent cycle.
const MAX_CATEGORY_DEPTH: usize = 8;

// -- Structure --

pub async fn categories(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ChatCategoryTree>>> {
    let (categories, mut rooms) = with_db(&state, |db| Ok((db.list_categories()?, db.list_rooms()?))).await?;
    redact_passwords(&mut rooms, &claims);

    Ok(Json(build_tree(&categories, &rooms, None, 0)))
}

pub async fn rooms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ChatRoom>>> {
    let mut rooms = with_db(&state, |db| db.list_rooms()).await?;
    redact_passwords(&mut rooms, &claims);
    Ok(Json(rooms))
}

fn redact_passwords(rooms: &mut [ChatRoom], claims: &Claims) {
    if !claims.is_admin() {
        for room in rooms {
            room.password = None;
        }
    }
}

/// Nests categories under their parents, each with its own rooms. Input
/// order (sort order, then id) is preserved at every level.
fn build_tree(
    categories: &[ChatCategory],
    rooms: &[ChatRoom],
    parent_id: Option<i64>,
    depth: usize,
) -> Vec<ChatCategoryTree> {
    if depth > MAX_CATEGORY_DEPTH {
        return Vec::new();
    }

    categories
        .iter()
        .filter(|c| c.parent_id == parent_id)
        .map(|c| ChatCategoryTree {
            category: c.clone(),
            children: build_tree(categories, rooms, Some(c.id), depth + 1),
            rooms: rooms.iter().filter(|r| r.category_id == c.id).cloned().collect(),
        })
        .collect()
}

pub async fn enter_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(room_id): ApiPath<i64>,
    body: Bytes,
) -> ApiResult<Json<SuccessResponse>> {
    let req: EnterRoomRequest = json_or_default(&body)?;
    let room = load_room(&state, room_id).await?;

    if let Some(expected) = room.password.as_deref().filter(|p| !p.is_empty()) {
        if !claims.is_admin() && req.password.as_deref() != Some(expected) {
            warn!("{} gave a wrong password for room {}", claims.username, room_id);
            return Err(ApiError::forbidden("Incorrect room password"));
        }
    }

    state.dispatcher.grant_room(claims.sub, room_id).await;
    Ok(Json(SuccessResponse { success: true }))
}

async fn load_room(state: &AppState, room_id: i64) -> ApiResult<ChatRoom> {
    with_db(state, move |db| db.get_room(room_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))
}

// -- Messages --

pub async fn messages(
    State(state): State<AppState>,
    ApiPath(room_id): ApiPath<i64>,
    ApiQuery(query): ApiQuery<MessageQuery>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let limit = query.limit.min(MAX_HISTORY);
    let messages = with_db(&state, move |db| db.list_chat_messages(room_id, limit)).await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(room_id): ApiPath<i64>,
    ApiJson(req): ApiJson<SendChatMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let content = trimmed(&req.content).map(str::to_string);
    require_fields(&[("characterId", req.character_id.is_some()), ("content", content.is_some())])?;
    let (Some(character_id), Some(content)) = (req.character_id, content) else {
        return Err(ApiError::bad_request("Missing required fields"));
    };
    check_length(&content)?;

    let character = load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;
    if !character.is_alive() {
        return Err(ApiError::bad_request("Dead characters cannot speak"));
    }
    load_room(&state, room_id).await?;

    let user_id = claims.sub;
    let message = with_db(&state, move |db| {
        let message = db.insert_chat_message(room_id, Some(character_id), user_id, &content, MessageType::Text)?;
        db.join_room_presence(character_id, room_id)?;
        Ok(message)
    })
    .await?;

    debug!("{} posted message {} in room {}", claims.username, message.id, room_id);
    state.dispatcher.broadcast(GatewayEvent::MessageCreated {
        room_id,
        message: message.clone(),
    });

    Ok((StatusCode::CREATED, Json(message)))
}

fn check_length(content: &str) -> ApiResult<()> {
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::bad_request(format!(
            "Message is too long (max {MAX_MESSAGE_CHARS} characters)"
        )));
    }
    Ok(())
}

pub async fn narrator_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<NarratorMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let content = trimmed(&req.content).map(str::to_string);
    require_fields(&[("roomId", req.room_id.is_some()), ("content", content.is_some())])?;
    let (Some(room_id), Some(content)) = (req.room_id, content) else {
        return Err(ApiError::bad_request("Missing required fields"));
    };
    check_length(&content)?;

    if !claims.is_admin() {
        let user_id = claims.sub;
        let can_narrate = with_db(&state, move |db| db.get_user(user_id))
            .await?
            .is_some_and(|u| u.can_narrate);
        if !can_narrate {
            warn!("{} tried to narrate without permission", claims.username);
            return Err(ApiError::forbidden("Narrator permission required"));
        }
    }
    load_room(&state, room_id).await?;

    let user_id = claims.sub;
    let message = with_db(&state, move |db| {
        db.insert_chat_message(room_id, None, user_id, &content, MessageType::Narrator)
    })
    .await?;

    info!("{} narrated in room {}", claims.username, room_id);
    state.dispatcher.broadcast(GatewayEvent::MessageCreated {
        room_id,
        message: message.clone(),
    });

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn cast_spell(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CastSpellRequest>,
) -> ApiResult<impl IntoResponse> {
    require_fields(&[
        ("roomId", req.room_id.is_some()),
        ("characterId", req.character_id.is_some()),
        ("spellId", req.spell_id.is_some()),
    ])?;
    let (Some(room_id), Some(character_id), Some(spell_id)) = (req.room_id, req.character_id, req.spell_id) else {
        return Err(ApiError::bad_request("Missing required fields"));
    };

    let character = load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;
    if !character.is_alive() {
        return Err(ApiError::bad_request("Dead characters cannot cast spells"));
    }

    let (wand, spell) = with_db(&state, move |db| {
        Ok((db.get_wand(character_id)?, db.known_spell(character_id, spell_id)?))
    })
    .await?;
    if wand.is_none() {
        return Err(ApiError::bad_request("Character has no wand"));
    }
    let spell = spell.ok_or_else(|| ApiError::bad_request("Character does not know this spell"))?;
    load_room(&state, room_id).await?;

    let content = spell_message(&character.full_name(), &spell.name, trimmed(&req.message));
    check_length(&content)?;

    let user_id = claims.sub;
    let message = with_db(&state, move |db| {
        db.insert_chat_message(room_id, Some(character_id), user_id, &content, MessageType::Spell)
    })
    .await?;

    info!("{} cast {} in room {}", character.full_name(), spell.name, room_id);
    state.dispatcher.broadcast(GatewayEvent::MessageCreated {
        room_id,
        message: message.clone(),
    });

    Ok((StatusCode::CREATED, Json(CastSpellResponse { spell, message })))
}

fn spell_message(caster: &str, spell: &str, message: Option<&str>) -> String {
    match message {
        Some(message) => format!("✨ {caster} cast the spell \"{spell}\": {message}"),
        None => format!("✨ {caster} cast the spell \"{spell}\""),
    }
}

// -- Presence --

pub async fn join_presence(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<RoomPresenceRequest>,
) -> ApiResult<Json<RoomPresence>> {
    let (character_id, room_id) = presence_target(&req)?;
    load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;
    load_room(&state, room_id).await?;

    let presence = with_db(&state, move |db| db.join_room_presence(character_id, room_id)).await?;

    state.dispatcher.broadcast(GatewayEvent::PresenceUpdate {
        room_id,
        character_id,
        online: true,
    });
    Ok(Json(presence))
}

pub async fn leave_presence(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<RoomPresenceRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let (character_id, room_id) = presence_target(&req)?;
    load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;

    let left = with_db(&state, move |db| db.leave_room_presence(character_id, room_id)).await?;

    if left {
        state.dispatcher.broadcast(GatewayEvent::PresenceUpdate {
            room_id,
            character_id,
            online: false,
        });
    }
    Ok(Json(SuccessResponse { success: left }))
}

fn presence_target(req: &RoomPresenceRequest) -> ApiResult<(i64, i64)> {
    require_fields(&[("characterId", req.character_id.is_some()), ("roomId", req.room_id.is_some())])?;
    match (req.character_id, req.room_id) {
        (Some(character_id), Some(room_id)) => Ok((character_id, room_id)),
        _ => Err(ApiError::bad_request("Missing required fields")),
    }
}

pub async fn room_presence(
    State(state): State<AppState>,
    ApiPath(room_id): ApiPath<i64>,
) -> ApiResult<Json<Vec<RoomPresence>>> {
    let presence = with_db(&state, move |db| db.list_room_presence(room_id)).await?;
    Ok(Json(presence))
}

// -- Admin: message maintenance --

pub async fn archive_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(room_id): ApiPath<i64>,
) -> ApiResult<Json<BulkResult>> {
    let room = load_room(&state, room_id).await?;

    let admin_id = claims.sub;
    let count = with_db(&state, move |db| {
        let count = db.archive_room_messages(room_id)?;
        let details = format!("Archived {} messages in {}", count, room.name);
        db.log_admin_action(admin_id, "archive_room", None, Some(&details))?;
        Ok(count)
    })
    .await?;

    info!("{} archived {} messages in room {}", claims.username, count, room_id);
    state.dispatcher.broadcast(GatewayEvent::RoomCleared { room_id });

    Ok(Json(BulkResult {
        message: format!("Archived {count} messages"),
        count,
    }))
}

pub async fn clear_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(room_id): ApiPath<i64>,
) -> ApiResult<Json<BulkResult>> {
    let room = load_room(&state, room_id).await?;

    let admin_id = claims.sub;
    let count = with_db(&state, move |db| {
        let count = db.clear_room_messages(room_id)?;
        let details = format!("Cleared {} messages in {}", count, room.name);
        db.log_admin_action(admin_id, "clear_room", None, Some(&details))?;
        Ok(count)
    })
    .await?;

    info!("{} cleared {} messages in room {}", claims.username, count, room_id);
    state.dispatcher.broadcast(GatewayEvent::RoomCleared { room_id });

    Ok(Json(BulkResult {
        message: format!("Cleared {count} messages"),
        count,
    }))
}

// -- Admin: categories --

pub async fn admin_list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<ChatCategory>>> {
    let categories = with_db(&state, |db| db.list_categories()).await?;
    Ok(Json(categories))
}

pub async fn create_category(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateCategoryRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = trimmed(&req.name)
        .ok_or_else(|| ApiError::bad_request("Category name is required"))?
        .to_string();

    if let Some(parent_id) = req.parent_id {
        with_db(&state, move |db| db.get_category(parent_id))
            .await?
            .ok_or_else(|| ApiError::bad_request("Parent category does not exist"))?;
    }

    let category = with_db(&state, move |db| {
        db.create_category(&name, trimmed(&req.description), req.parent_id, req.sort_order)
    })
    .await?;

    info!("{} created category {} ({})", claims.username, category.name, category.id);
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateCategoryRequest>,
) -> ApiResult<Json<ChatCategory>> {
    if req.name.is_some() && trimmed(&req.name).is_none() {
        return Err(ApiError::bad_request("Category name cannot be empty"));
    }

    match with_db(&state, move |db| db.update_category(id, &req)).await? {
        UpdateCategoryOutcome::Updated(category) => {
            info!("{} updated category {}", claims.username, id);
            Ok(Json(category))
        }
        UpdateCategoryOutcome::NotFound => Err(ApiError::not_found("Category not found")),
        UpdateCategoryOutcome::UnknownParent => Err(ApiError::bad_request("Parent category does not exist")),
        UpdateCategoryOutcome::ParentCycle => {
            warn!("{} tried to nest category {} inside itself", claims.username, id);
            Err(ApiError::bad_request("A category cannot be nested inside itself"))
        }
    }
}

pub async fn delete_category(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<MessageResponse>> {
    match with_db(&state, move |db| db.delete_category(id)).await? {
        DeleteCategoryOutcome::Deleted => {
            info!("{} deleted category {}", claims.username, id);
            Ok(Json(MessageResponse {
                message: "Category deleted".into(),
            }))
        }
        DeleteCategoryOutcome::NotFound => Err(ApiError::not_found("Category not found")),
        DeleteCategoryOutcome::NotEmpty => Err(ApiError::bad_request(
            "Category still contains areas or rooms",
        )),
    }
}

pub async fn set_category_sort_order(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<SortOrderRequest>,
) -> ApiResult<Json<ChatCategory>> {
    let category = with_db(&state, move |db| db.set_category_sort_order(id, req.sort_order))
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;
    Ok(Json(category))
}

pub async fn move_category(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<MoveRequest>,
) -> ApiResult<Json<ChatCategory>> {
    let category = with_db(&state, move |db| db.move_category(id, req.direction))
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;
    Ok(Json(category))
}

// -- Admin: rooms --

/// Includes passwords.
pub async fn admin_list_rooms(State(state): State<AppState>) -> ApiResult<Json<Vec<ChatRoom>>> {
    let rooms = with_db(&state, |db| db.list_rooms()).await?;
    Ok(Json(rooms))
}

pub async fn create_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateRoomRequest>,
) -> ApiResult<impl IntoResponse> {
    require_fields(&[("name", trimmed(&req.name).is_some()), ("categoryId", req.category_id.is_some())])?;
    let (Some(name), Some(category_id)) = (trimmed(&req.name).map(str::to_string), req.category_id) else {
        return Err(ApiError::bad_request("Missing required fields"));
    };

    with_db(&state, move |db| db.get_category(category_id))
        .await?
        .ok_or_else(|| ApiError::bad_request("Category does not exist"))?;

    let room = with_db(&state, move |db| {
        db.create_room(&NewRoom {
            name: &name,
            description: trimmed(&req.description),
            long_description: trimmed(&req.long_description),
            category_id,
            password: trimmed(&req.password),
            is_public: req.is_public.unwrap_or(true),
            sort_order: req.sort_order,
        })
    })
    .await?;

    info!("{} created room {} ({})", claims.username, room.name, room.id);
    Ok((StatusCode::CREATED, Json(room)))
}

pub async fn update_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateRoomRequest>,
) -> ApiResult<Json<ChatRoom>> {
    if req.name.is_some() && trimmed(&req.name).is_none() {
        return Err(ApiError::bad_request("Room name cannot be empty"));
    }
    if let Some(category_id) = req.category_id {
        with_db(&state, move |db| db.get_category(category_id))
            .await?
            .ok_or_else(|| ApiError::bad_request("Category does not exist"))?;
    }

    let room = with_db(&state, move |db| db.update_room(id, &req))
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))?;

    info!("{} updated room {}", claims.username, id);
    Ok(Json(room))
}

pub async fn delete_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<MessageResponse>> {
    if !with_db(&state, move |db| db.delete_room(id)).await? {
        return Err(ApiError::not_found("Room not found"));
    }

    info!("{} deleted room {}", claims.username, id);
    Ok(Json(MessageResponse {
        message: "Room deleted".into(),
    }))
}

pub async fn set_room_sort_order(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<SortOrderRequest>,
) -> ApiResult<Json<ChatRoom>> {
    let room = with_db(&state, move |db| db.set_room_sort_order(id, req.sort_order))
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))?;
    Ok(Json(room))
}

pub async fn move_room(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<MoveRequest>,
) -> ApiResult<Json<ChatRoom>> {
    let room = with_db(&state, move |db| db.move_room(id, req.direction))
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))?;
    Ok(Json(room))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn category(id: i64, parent_id: Option<i64>) -> ChatCategory {
        ChatCategory {
            id,
            name: format!("c{id}"),
            description: None,
            parent_id,
            sort_order: 0,
            created_at: Utc::now(),
        }
    }

    fn room(id: i64, category_id: i64) -> ChatRoom {
        ChatRoom {
            id,
            name: format!("r{id}"),
            description: None,
            long_description: None,
            category_id,
            password: Some("secret".into()),
            has_password: true,
            is_public: true,
            sort_order: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tree_nests_areas_and_rooms() {
        let categories = vec![category(1, None), category(2, Some(1)), category(3, None)];
        let rooms = vec![room(10, 2), room(11, 3)];

        let tree = build_tree(&categories, &rooms, None, 0);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].rooms[0].id, 10);
        assert!(tree[0].rooms.is_empty());
        assert_eq!(tree[1].rooms[0].id, 11);
    }

    #[test]
    fn tree_survives_parent_cycles() {
        let categories = vec![category(1, None), category(2, Some(3)), category(3, Some(2))];
        let tree = build_tree(&categories, &[], None, 0);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn passwords_hidden_from_players() {
        let mut rooms = vec![room(1, 1)];
        let player = Claims {
            sub: 2,
            username: "newt".into(),
            role: umbra_types::models::Role::User,
            exp: 0,
        };

        redact_passwords(&mut rooms, &player);
        assert!(rooms[0].password.is_none());
        assert!(rooms[0].has_password);
    }

    #[test]
    fn spell_message_includes_optional_text() {
        assert_eq!(
            spell_message("Newt Scamander", "Lumos", None),
            "✨ Newt Scamander cast the spell \"Lumos\""
        );
        assert_eq!(
            spell_message("Newt Scamander", "Accio", Some("kufr")),
            "✨ Newt Scamander cast the spell \"Accio\": kufr"
        );
    }
}
