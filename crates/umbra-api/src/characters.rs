use axum::{
    Extension, Json,
    extract::State,
};
use tracing::{info, warn};

use umbra_types::api::{
    CharacterList, CharacterWithUser, Claims, KillCharacterRequest, LastChat, OnlineCharacter,
    UpdateCharacterRequest, UpdateHistoryRequest,
};
use umbra_types::models::Character;

use crate::auth::{AppState, with_db};
use crate::error::{ApiError, ApiJson, ApiPath, ApiResult, trimmed};

/// Who may act on a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    OwnerOrAdmin,
    /// Admins included only when they own the character.
    Owner,
}

pub fn check_access(claims: &Claims, character: &Character, access: Access) -> ApiResult<()> {
    let owner = character.user_id == claims.sub;
    let allowed = match access {
        Access::OwnerOrAdmin => owner || claims.is_admin(),
        Access::Owner => owner,
    };

    if allowed {
        Ok(())
    } else {
        warn!("{} ({}) denied access to character {}", claims.username, claims.sub, character.id);
        Err(ApiError::forbidden("Character does not belong to user"))
    }
}

/// Loads a character, 404 when missing and 403 when the caller may not use it.
pub async fn load_character(state: &AppState, claims: &Claims, id: i64, access: Access) -> ApiResult<Character> {
    let character = with_db(state, move |db| db.get_character(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Character not found"))?;
    check_access(claims, &character, access)?;
    Ok(character)
}

pub async fn list_own(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<CharacterList>> {
    let user_id = claims.sub;
    let characters = with_db(&state, move |db| db.list_playable_characters_for_user(user_id)).await?;
    Ok(Json(CharacterList { characters }))
}

/// Admins see every playable character, everyone else their own.
pub async fn list_all(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<CharacterList>> {
    let user_id = claims.sub;
    let is_admin = claims.is_admin();
    let characters = with_db(&state, move |db| {
        if is_admin {
            db.list_playable_characters()
        } else {
            db.list_playable_characters_for_user(user_id)
        }
    })
    .await?;
    Ok(Json(CharacterList { characters }))
}

pub async fn online(State(state): State<AppState>) -> ApiResult<Json<Vec<OnlineCharacter>>> {
    let present = with_db(&state, |db| db.list_present_characters()).await?;

    let characters = present
        .into_iter()
        .map(|p| OnlineCharacter {
            id: p.character.id,
            full_name: p.character.full_name(),
            first_name: p.character.first_name,
            middle_name: p.character.middle_name,
            last_name: p.character.last_name,
            location: p.room_name,
            room_id: p.room_id,
            avatar: p.character.avatar,
            user_id: p.character.user_id,
            is_online: true,
        })
        .collect();

    Ok(Json(characters))
}

pub async fn get_character(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<CharacterWithUser>> {
    let (character, owner) = with_db(&state, move |db| db.get_character_with_owner(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Character not found"))?;
    check_access(&claims, &character, Access::OwnerOrAdmin)?;

    Ok(Json(CharacterWithUser {
        character,
        user: Some(owner),
    }))
}

pub async fn update_character(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateCharacterRequest>,
) -> ApiResult<Json<Character>> {
    let blank_name = [&req.first_name, &req.last_name]
        .into_iter()
        .any(|name| name.is_some() && trimmed(name).is_none());
    if blank_name {
        return Err(ApiError::bad_request("First and last name cannot be empty"));
    }

    load_character(&state, &claims, id, Access::OwnerOrAdmin).await?;

    let character = with_db(&state, move |db| db.update_character(id, &req))
        .await?
        .ok_or_else(|| ApiError::not_found("Character not found"))?;
    info!("{} updated character {}", claims.username, id);

    Ok(Json(character))
}

pub async fn update_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateHistoryRequest>,
) -> ApiResult<Json<Character>> {
    load_character(&state, &claims, id, Access::OwnerOrAdmin).await?;

    let character = with_db(&state, move |db| {
        db.update_character_history(id, req.history.as_deref(), req.show_history_to_others)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Character not found"))?;

    Ok(Json(character))
}

/// The room of the character's latest message. Lookup failures read as
/// "no room" so the client can always render.
pub async fn last_chat(State(state): State<AppState>, ApiPath(id): ApiPath<i64>) -> Json<Option<LastChat>> {
    match with_db(&state, move |db| db.last_chat_room(id)).await {
        Ok(room) => Json(room.map(|room| LastChat { room })),
        Err(e) => {
            warn!("Last chat lookup for character {} failed: {}", id, e);
            Json(None)
        }
    }
}

pub async fn cemetery(State(state): State<AppState>) -> ApiResult<Json<Vec<Character>>> {
    let characters = with_db(&state, |db| db.list_dead_characters()).await?;
    Ok(Json(characters))
}

pub async fn kill_character(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<KillCharacterRequest>,
) -> ApiResult<Json<Character>> {
    let reason = trimmed(&req.death_reason)
        .ok_or_else(|| ApiError::bad_request("Death reason is required"))?
        .to_string();

    let admin_id = claims.sub;
    let character = with_db(&state, move |db| {
        let Some(character) = db.kill_character(id, &reason, admin_id)? else {
            return Ok(None);
        };
        let details = format!("Killed {}: {}", character.full_name(), reason);
        db.log_admin_action(admin_id, "kill_character", Some(character.user_id), Some(&details))?;
        Ok(Some(character))
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Character not found"))?;

    info!("{} killed character {} ({})", claims.username, character.full_name(), id);
    Ok(Json(character))
}

pub async fn revive_character(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Character>> {
    let admin_id = claims.sub;
    let character = with_db(&state, move |db| {
        let Some(character) = db.revive_character(id)? else {
            return Ok(None);
        };
        let details = format!("Revived {}", character.full_name());
        db.log_admin_action(admin_id, "revive_character", Some(character.user_id), Some(&details))?;
        Ok(Some(character))
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Character not found"))?;

    info!("{} revived character {} ({})", claims.username, character.full_name(), id);
    Ok(Json(character))
}
