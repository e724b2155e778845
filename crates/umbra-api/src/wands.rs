use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use rand::seq::IndexedRandom;
use tracing::info;

use umbra_db::models::NewWand;
use umbra_types::api::{Claims, CustomWandRequest};
use umbra_types::models::{Wand, WandComponent, WandComponents};

use crate::auth::{AppState, with_db};
use crate::characters::{Access, load_character};
use crate::error::{ApiError, ApiJson, ApiPath, ApiResult, has_text, require_fields, trimmed};

pub async fn components(State(state): State<AppState>) -> ApiResult<Json<WandComponents>> {
    let components = with_db(&state, |db| db.get_wand_components()).await?;
    Ok(Json(components))
}

pub async fn update_components(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(components): ApiJson<WandComponents>,
) -> ApiResult<Json<WandComponents>> {
    let blank = [&components.woods, &components.cores, &components.lengths, &components.flexibilities]
        .into_iter()
        .flatten()
        .any(|c| c.name.trim().is_empty());
    if blank {
        return Err(ApiError::bad_request("Every wand component needs a name"));
    }

    let admin_id = claims.sub;
    let stored = with_db(&state, move |db| {
        db.set_wand_components(&components)?;
        db.log_admin_action(admin_id, "update_wand_components", None, None)?;
        Ok(components)
    })
    .await?;

    info!("{} updated wand components", claims.username);
    Ok(Json(stored))
}

pub async fn get_wand(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(character_id): ApiPath<i64>,
) -> ApiResult<Json<Wand>> {
    load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;

    let wand = with_db(&state, move |db| db.get_wand(character_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Character has no wand"))?;
    Ok(Json(wand))
}

/// The wand chooses the wizard: one random pick from each component list.
pub async fn visit_ollivanders(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(character_id): ApiPath<i64>,
) -> ApiResult<impl IntoResponse> {
    let character = load_character(&state, &claims, character_id, Access::Owner).await?;

    let components = with_db(&state, |db| db.get_wand_components()).await?;
    let [wood, core, length, flexibility] = choose_components(&components)
        .ok_or_else(|| ApiError::bad_request("Wand components are not configured"))?;

    let wand = store_wand(&state, character_id, wood, core, length, flexibility, None).await?;
    info!("{} received a {} and {} wand at Ollivanders", character.full_name(), wand.wood, wand.core);

    Ok((StatusCode::CREATED, Json(wand)))
}

fn choose_components(components: &WandComponents) -> Option<[String; 4]> {
    let mut rng = rand::rng();
    let mut pick = |list: &[WandComponent]| list.choose(&mut rng).map(|c| c.name.clone());

    Some([
        pick(&components.woods)?,
        pick(&components.cores)?,
        pick(&components.lengths)?,
        pick(&components.flexibilities)?,
    ])
}

pub async fn create_custom_wand(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(character_id): ApiPath<i64>,
    ApiJson(req): ApiJson<CustomWandRequest>,
) -> ApiResult<impl IntoResponse> {
    require_fields(&[
        ("wood", has_text(&req.wood)),
        ("core", has_text(&req.core)),
        ("length", has_text(&req.length)),
        ("flexibility", has_text(&req.flexibility)),
    ])?;
    let character = load_character(&state, &claims, character_id, Access::Owner).await?;

    let text = |value: &Option<String>| trimmed(value).unwrap_or_default().to_string();
    let wand = store_wand(
        &state,
        character_id,
        text(&req.wood),
        text(&req.core),
        text(&req.length),
        text(&req.flexibility),
        trimmed(&req.description).map(str::to_string),
    )
    .await?;
    info!("{} crafted a custom wand", character.full_name());

    Ok((StatusCode::CREATED, Json(wand)))
}

async fn store_wand(
    state: &AppState,
    character_id: i64,
    wood: String,
    core: String,
    length: String,
    flexibility: String,
    description: Option<String>,
) -> ApiResult<Wand> {
    let description = description.unwrap_or_else(|| describe_wand(&wood, &core, &length, &flexibility));

    with_db(state, move |db| {
        db.create_wand(&NewWand {
            character_id,
            wood: &wood,
            core: &core,
            length: &length,
            flexibility: &flexibility,
            description: &description,
        })
    })
    .await?
    .ok_or_else(|| ApiError::bad_request("Character already has a wand"))
}

fn describe_wand(wood: &str, core: &str, length: &str, flexibility: &str) -> String {
    format!("A {length} wand made of {wood} wood with a {core} core, {flexibility}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(name: &str) -> WandComponent {
        WandComponent {
            name: name.into(),
            description: None,
        }
    }

    #[test]
    fn picks_one_of_each_component() {
        let components = WandComponents {
            woods: vec![component("Jasan"), component("Tis")],
            cores: vec![component("Žíně z jednorožce")],
            lengths: vec![component("11 palců")],
            flexibilities: vec![component("pružná")],
        };

        let [wood, core, length, flexibility] = choose_components(&components).unwrap();
        assert!(wood == "Jasan" || wood == "Tis");
        assert_eq!(core, "Žíně z jednorožce");
        assert_eq!(length, "11 palců");
        assert_eq!(flexibility, "pružná");
    }

    #[test]
    fn empty_list_means_no_wand() {
        assert!(choose_components(&WandComponents::default()).is_none());
    }

    #[test]
    fn default_description_reads_naturally() {
        assert_eq!(
            describe_wand("holly", "phoenix feather", "11\"", "supple"),
            "A 11\" wand made of holly wood with a phoenix feather core, supple"
        );
    }
}
