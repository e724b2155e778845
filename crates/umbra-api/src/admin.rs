use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use rand::{Rng, distr::Alphanumeric};
use tracing::{info, warn};

use umbra_types::api::{
    AdminStats, AdminUser, BanRequest, Claims, CreateInviteCodeRequest, OnlineUser, ResetPasswordResponse,
    UpdateNarratorRequest, UpdateRoleRequest, UsersQuery,
};
use umbra_types::models::{AdminActivity, InviteCode, Role, User};

use crate::auth::{AppState, hash_password, with_db};
use crate::error::{ApiError, ApiJson, ApiPath, ApiQuery, ApiResult, trimmed};

const ACTIVITY_LIMIT: u32 = 200;
const RESET_PASSWORD_LEN: usize = 10;

// -- Users --

pub async fn list_users(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UsersQuery>,
) -> ApiResult<Json<Vec<AdminUser>>> {
    let include_system = query.include_system.unwrap_or(false);
    let users = with_db(&state, move |db| {
        db.list_users(include_system)?
            .into_iter()
            .map(|user| {
                let characters = db.list_playable_characters_for_user(user.id)?;
                Ok(AdminUser { user, characters })
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;

    Ok(Json(users))
}

pub async fn update_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(user_id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateRoleRequest>,
) -> ApiResult<Json<User>> {
    let role: Role = trimmed(&req.role)
        .and_then(|r| r.parse().ok())
        .ok_or_else(|| ApiError::bad_request("Role must be 'admin' or 'user'"))?;

    let admin_id = claims.sub;
    let user = with_db(&state, move |db| {
        let Some(user) = db.set_user_role(user_id, role)? else {
            return Ok(None);
        };
        let details = format!("Role of {} set to {}", user.username, role);
        db.log_admin_action(admin_id, "update_role", Some(user_id), Some(&details))?;
        Ok(Some(user))
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!("{} set role of {} to {}", claims.username, user.username, role);
    Ok(Json(user))
}

pub async fn update_narrator(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(user_id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateNarratorRequest>,
) -> ApiResult<Json<User>> {
    let can_narrate = req
        .can_narrate
        .ok_or_else(|| ApiError::MissingFields(vec!["canNarrate"]))?;
    let reason = trimmed(&req.reason).map(str::to_string);

    let admin_id = claims.sub;
    let user = with_db(&state, move |db| {
        let Some(user) = db.set_narrator(user_id, can_narrate, reason.as_deref())? else {
            return Ok(None);
        };
        let action = if can_narrate { "grant_narrator" } else { "revoke_narrator" };
        db.log_admin_action(admin_id, action, Some(user_id), reason.as_deref())?;
        Ok(Some(user))
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!("{} set narrator={} for {}", claims.username, can_narrate, user.username);
    Ok(Json(user))
}

pub async fn ban(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(user_id): ApiPath<i64>,
    ApiJson(req): ApiJson<BanRequest>,
) -> ApiResult<Json<User>> {
    let reason = trimmed(&req.reason)
        .ok_or_else(|| ApiError::MissingFields(vec!["reason"]))?
        .to_string();
    if user_id == claims.sub {
        return Err(ApiError::bad_request("You cannot ban yourself"));
    }

    let admin_id = claims.sub;
    let user = with_db(&state, move |db| {
        let Some(user) = db.ban_user(user_id, &reason)? else {
            return Ok(None);
        };
        db.log_admin_action(admin_id, "ban_user", Some(user_id), Some(&reason))?;
        Ok(Some(user))
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    warn!("{} banned {}", claims.username, user.username);
    Ok(Json(user))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(user_id): ApiPath<i64>,
) -> ApiResult<Json<ResetPasswordResponse>> {
    let new_password = random_password();
    let password_hash = hash_password(&new_password)?;

    let admin_id = claims.sub;
    let updated = with_db(&state, move |db| {
        if !db.update_password(user_id, &password_hash)? {
            return Ok(false);
        }
        db.log_admin_action(admin_id, "reset_password", Some(user_id), None)?;
        Ok(true)
    })
    .await?;
    if !updated {
        return Err(ApiError::not_found("User not found"));
    }

    info!("{} reset the password of user {}", claims.username, user_id);
    Ok(Json(ResetPasswordResponse { new_password }))
}

fn random_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(RESET_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

// -- Invite codes --

pub async fn create_invite(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<CreateInviteCodeRequest>,
) -> ApiResult<impl IntoResponse> {
    let code = trimmed(&req.code)
        .ok_or_else(|| ApiError::MissingFields(vec!["code"]))?
        .to_string();

    let admin_id = claims.sub;
    let invite = with_db(&state, move |db| {
        let Some(invite) = db.create_invite(&code, Some(admin_id))? else {
            return Ok(None);
        };
        let details = format!("Created invite code {}", invite.code);
        db.log_admin_action(admin_id, "create_invite", None, Some(&details))?;
        Ok(Some(invite))
    })
    .await?
    .ok_or_else(|| ApiError::bad_request("Invite code already exists"))?;

    info!("{} created invite code {}", claims.username, invite.code);
    Ok((StatusCode::CREATED, Json(invite)))
}

pub async fn list_invites(State(state): State<AppState>) -> ApiResult<Json<Vec<InviteCode>>> {
    let invites = with_db(&state, |db| db.list_invites()).await?;
    Ok(Json(invites))
}

// -- Monitoring --

pub async fn activity_log(State(state): State<AppState>) -> ApiResult<Json<Vec<AdminActivity>>> {
    let entries = with_db(&state, |db| db.list_admin_activity(ACTIVITY_LIMIT)).await?;
    Ok(Json(entries))
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<AdminStats>> {
    let online_now = state.activity.online_count(state.online_window).await;
    let gateway_connections = state.dispatcher.connection_count().await;
    let stats = with_db(&state, move |db| db.admin_stats(online_now, gateway_connections)).await?;
    Ok(Json(stats))
}

/// Users with a request inside the online window, most recent first.
pub async fn online_users(State(state): State<AppState>) -> Json<Vec<OnlineUser>> {
    Json(state.activity.online(state.online_window).await)
}
