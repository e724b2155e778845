use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};

use umbra_db::models::NewInventoryItem;
use umbra_types::api::{Claims, CreateInventoryItemRequest, MessageResponse, UpdateInventoryItemRequest};
use umbra_types::models::InventoryItem;

use crate::auth::{AppState, with_db};
use crate::characters::{Access, load_character};
use crate::error::{ApiError, ApiJson, ApiPath, ApiResult, has_text, require_fields, trimmed};

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(character_id): ApiPath<i64>,
) -> ApiResult<Json<Vec<InventoryItem>>> {
    load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;
    let items = with_db(&state, move |db| db.list_inventory(character_id)).await?;
    Ok(Json(items))
}

pub async fn add(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(character_id): ApiPath<i64>,
    ApiJson(req): ApiJson<CreateInventoryItemRequest>,
) -> ApiResult<impl IntoResponse> {
    require_fields(&[
        ("itemType", has_text(&req.item_type)),
        ("price", req.price.as_ref().is_some_and(|p| p.as_i64().is_some())),
        ("category", has_text(&req.category)),
    ])?;

    let item_type = trimmed(&req.item_type).unwrap_or_default().to_string();
    if item_type.eq_ignore_ascii_case("wand") {
        warn!("{} tried to buy a wand through the shop", claims.username);
        return Err(ApiError::forbidden("Wands can only be obtained at Ollivanders"));
    }

    let price = req.price.as_ref().and_then(|p| p.as_i64()).unwrap_or_default();
    let quantity = req.quantity.unwrap_or(1);
    validate_amounts(Some(price), Some(quantity))?;

    let character = load_character(&state, &claims, character_id, Access::OwnerOrAdmin).await?;

    let item = with_db(&state, move |db| {
        db.add_inventory_item(&NewInventoryItem {
            character_id,
            item_type: &item_type,
            item_id: req.item_id.unwrap_or_default(),
            item_name: trimmed(&req.item_name),
            price,
            quantity,
            rarity: trimmed(&req.rarity),
            description: trimmed(&req.description),
            notes: trimmed(&req.notes),
            category: trimmed(&req.category).unwrap_or_default(),
        })
    })
    .await?;

    info!("{} acquired inventory item {}", character.full_name(), item.id);
    Ok((StatusCode::CREATED, Json(item)))
}

fn validate_amounts(price: Option<i64>, quantity: Option<i64>) -> ApiResult<()> {
    if price.is_some_and(|p| p < 0) {
        return Err(ApiError::bad_request("Price cannot be negative"));
    }
    if quantity.is_some_and(|q| q < 1) {
        return Err(ApiError::bad_request("Quantity must be at least 1"));
    }
    Ok(())
}

/// Loads an item and checks the caller may manage its owner's inventory.
async fn load_item(state: &AppState, claims: &Claims, id: i64) -> ApiResult<InventoryItem> {
    let item = with_db(state, move |db| db.get_inventory_item(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Item not found"))?;
    load_character(state, claims, item.character_id, Access::OwnerOrAdmin).await?;
    Ok(item)
}

pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateInventoryItemRequest>,
) -> ApiResult<Json<InventoryItem>> {
    validate_amounts(req.price, req.quantity)?;
    load_item(&state, &claims, id).await?;

    let item = with_db(&state, move |db| db.update_inventory_item(id, &req))
        .await?
        .ok_or_else(|| ApiError::not_found("Item not found"))?;
    Ok(Json(item))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<MessageResponse>> {
    load_item(&state, &claims, id).await?;
    with_db(&state, move |db| db.delete_inventory_item(id)).await?;

    Ok(Json(MessageResponse {
        message: "Item removed".into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_must_be_sensible() {
        assert!(validate_amounts(Some(0), Some(1)).is_ok());
        assert!(validate_amounts(None, None).is_ok());
        assert!(validate_amounts(Some(-5), None).is_err());
        assert!(validate_amounts(None, Some(0)).is_err());
    }
}
