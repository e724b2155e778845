use axum::{
    Extension, Json,
    extract::State,
};
use tracing::info;

use umbra_types::api::{AdjustInfluenceRequest, Claims, InfluenceChange, ResetInfluenceRequest};
use umbra_types::models::{Faction, Influence, InfluenceHistoryEntry};

use crate::auth::{AppState, with_db};
use crate::error::{ApiError, ApiJson, ApiResult, has_text, require_fields, trimmed};

const HISTORY_LIMIT: u32 = 100;

pub async fn get(State(state): State<AppState>) -> ApiResult<Json<Influence>> {
    let influence = with_db(&state, |db| db.get_influence()).await?;
    Ok(Json(influence))
}

pub async fn history(State(state): State<AppState>) -> ApiResult<Json<Vec<InfluenceHistoryEntry>>> {
    let history = with_db(&state, |db| db.influence_history(HISTORY_LIMIT)).await?;
    Ok(Json(history))
}

pub async fn adjust(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<AdjustInfluenceRequest>,
) -> ApiResult<Json<InfluenceChange>> {
    let points = req.points.filter(|p| *p != 0);
    require_fields(&[
        ("changeType", has_text(&req.change_type)),
        ("points", points.is_some()),
        ("reason", has_text(&req.reason)),
    ])?;
    let side = trimmed(&req.change_type)
        .and_then(parse_faction)
        .ok_or_else(|| ApiError::bad_request("changeType must be 'grindelwald' or 'dumbledore'"))?;
    let points = points.unwrap_or_default();
    let reason = trimmed(&req.reason).unwrap_or_default().to_string();

    let admin_id = claims.sub;
    let (influence, history) = with_db(&state, move |db| {
        let change = db.adjust_influence(side, points, &reason, admin_id)?;
        let details = format!("{:?} {:+}: {}", side, points, reason);
        db.log_admin_action(admin_id, "adjust_influence", None, Some(&details))?;
        Ok(change)
    })
    .await?;

    info!(
        "{} moved {:?} by {} to {}",
        claims.username,
        side,
        points,
        influence.points(side)
    );
    Ok(Json(InfluenceChange { influence, history }))
}

fn parse_faction(value: &str) -> Option<Faction> {
    match value.to_ascii_lowercase().as_str() {
        "grindelwald" => Some(Faction::Grindelwald),
        "dumbledore" => Some(Faction::Dumbledore),
        _ => None,
    }
}

pub async fn reset(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<ResetInfluenceRequest>,
) -> ApiResult<Json<Influence>> {
    let points = match trimmed(&req.reset_type) {
        Some("0:0") => 0,
        Some("50:50") => 50,
        _ => return Err(ApiError::bad_request("type must be '0:0' or '50:50'")),
    };

    let admin_id = claims.sub;
    let influence = with_db(&state, move |db| {
        let influence = db.reset_influence(points, admin_id)?;
        let details = format!("Reset to {points}:{points}");
        db.log_admin_action(admin_id, "reset_influence", None, Some(&details))?;
        Ok(influence)
    })
    .await?;

    info!("{} reset the influence bar to {}:{}", claims.username, points, points);
    Ok(Json(influence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faction_names_are_case_insensitive() {
        assert_eq!(parse_faction("Grindelwald"), Some(Faction::Grindelwald));
        assert_eq!(parse_faction("dumbledore"), Some(Faction::Dumbledore));
        assert_eq!(parse_faction("reset"), None);
    }
}
