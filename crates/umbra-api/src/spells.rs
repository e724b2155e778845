use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use umbra_types::api::{BulkResult, Claims, LearnSpellRequest, MessageResponse};
use umbra_types::models::{CharacterSpell, Spell};

use crate::auth::{AppState, with_db};
use crate::characters::{Access, load_character};
use crate::error::{ApiError, ApiJson, ApiPath, ApiResult};

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Spell>>> {
    let spells = with_db(&state, |db| db.list_spells()).await?;
    Ok(Json(spells))
}

pub async fn character_spells(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(character_id): ApiPath<i64>,
) -> ApiResult<Json<Vec<CharacterSpell>>> {
    load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;
    let spells = with_db(&state, move |db| db.character_spells(character_id)).await?;
    Ok(Json(spells))
}

pub async fn learn(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(character_id): ApiPath<i64>,
    ApiJson(req): ApiJson<LearnSpellRequest>,
) -> ApiResult<impl IntoResponse> {
    let spell_id = req
        .spell_id
        .ok_or_else(|| ApiError::MissingFields(vec!["spellId"]))?;
    let character = load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;

    with_db(&state, move |db| db.get_spell(spell_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Spell not found"))?;

    let learned = with_db(&state, move |db| db.learn_spell(character_id, spell_id))
        .await?
        .ok_or_else(|| ApiError::bad_request("Character already knows this spell"))?;

    info!("{} learned {}", character.full_name(), learned.spell.name);
    Ok((StatusCode::CREATED, Json(learned)))
}

pub async fn forget(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath((character_id, spell_id)): ApiPath<(i64, i64)>,
) -> ApiResult<Json<MessageResponse>> {
    load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;

    if !with_db(&state, move |db| db.forget_spell(character_id, spell_id)).await? {
        return Err(ApiError::not_found("Character does not know this spell"));
    }

    Ok(Json(MessageResponse {
        message: "Spell forgotten".into(),
    }))
}

/// Grants every default spell to every living player character.
pub async fn initialize_defaults(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<BulkResult>> {
    let admin_id = claims.sub;
    let count = with_db(&state, move |db| {
        let count = db.initialize_default_spells()?;
        let details = format!("Granted {count} default spells");
        db.log_admin_action(admin_id, "initialize_default_spells", None, Some(&details))?;
        Ok(count)
    })
    .await?;

    info!("{} granted {} default spells", claims.username, count);
    Ok(Json(BulkResult {
        message: format!("Granted {count} spells"),
        count,
    }))
}
