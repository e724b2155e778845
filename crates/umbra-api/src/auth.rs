use std::sync::Arc;
use std::time::Duration;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::NaiveDate;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand_core::OsRng;
use tracing::{error, info, warn};

use umbra_db::Database;
use umbra_db::models::{RegisterOutcome, Registration};
use umbra_gateway::activity::ActivityTracker;
use umbra_gateway::dispatcher::Dispatcher;
use umbra_types::api::{
    AuthResponse, AuthUser, ChangePasswordRequest, Claims, LoginRequest, MessageResponse, RegisterRequest,
    SuccessResponse, UserProfile,
};
use umbra_types::models::User;

use crate::error::{ApiError, ApiJson, ApiResult, require_fields};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub dispatcher: Dispatcher,
    pub activity: ActivityTracker,
    /// How long after the last request a user still counts as online.
    pub online_window: Duration,
}

/// Runs a blocking storage call off the async runtime.
pub async fn with_db<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("Internal server error".into())
        })?
        .map_err(ApiError::from)
}

const MIN_PASSWORD_LEN: usize = 6;

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let birth_date = validate_registration(&req).map_err(|problem| {
        warn!("Registration rejected for '{}': {}", req.username, problem);
        ApiError::bad_request(format!("Validation failed: {problem}"))
    })?;

    let password_hash = hash_password(&req.password)?;

    let username = req.username.trim().to_string();
    let email = req.email.trim().to_string();
    let invite_code = req.invite_code.trim().to_string();
    let first_name = req.first_name.trim().to_string();
    let middle_name = req
        .middle_name
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());
    let last_name = req.last_name.trim().to_string();

    let outcome = with_db(&state, move |db| {
        db.register_user(&Registration {
            username: &username,
            email: &email,
            password_hash: &password_hash,
            invite_code: &invite_code,
            first_name: &first_name,
            middle_name: middle_name.as_deref(),
            last_name: &last_name,
            birth_date,
        })
    })
    .await?;

    let (user, character) = match outcome {
        RegisterOutcome::Created { user, character } => (user, character),
        RegisterOutcome::InvalidInvite => {
            return Err(ApiError::bad_request("Invalid or already used invite code"));
        }
        RegisterOutcome::UserExists => return Err(ApiError::bad_request("User already exists")),
    };

    let token = create_token(&state.jwt_secret, &user, state.token_ttl)?;
    info!("Registered user {} ({})", user.username, user.id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: auth_user(user, vec![character]),
        }),
    ))
}

/// Returns the parsed birth date or the first validation problem.
fn validate_registration(req: &RegisterRequest) -> Result<NaiveDate, &'static str> {
    let username_len = req.username.trim().chars().count();
    if !(3..=50).contains(&username_len) {
        return Err("username must be 3-50 characters");
    }
    if !req.email.contains('@') {
        return Err("email is not valid");
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err("password must be at least 6 characters");
    }
    if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
        return Err("first and last name are required");
    }
    NaiveDate::parse_from_str(req.birth_date.trim(), "%Y-%m-%d").map_err(|_| "birthDate must be YYYY-MM-DD")
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Username and password are required"));
    }

    let username = req.username.trim().to_string();
    let row = with_db(&state, move |db| db.get_user_row_by_username(&username))
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !verify_password(&req.password, &row.password_hash) {
        warn!("Failed login for {}", row.user.username);
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    if row.user.is_banned {
        warn!("Banned user {} tried to log in", row.user.username);
        return Err(ApiError::forbidden("Account is banned"));
    }

    let user = row.user;
    let user_id = user.id;
    let characters = with_db(&state, move |db| {
        db.touch_last_login(user_id)?;
        db.list_playable_characters_for_user(user_id)
    })
    .await?;

    let token = create_token(&state.jwt_secret, &user, state.token_ttl)?;
    info!("{} logged in", user.username);

    Ok(Json(AuthResponse {
        token,
        user: auth_user(user, characters),
    }))
}

/// Tokens are stateless; the client drops its copy.
pub async fn logout(Extension(claims): Extension<Claims>) -> Json<MessageResponse> {
    info!("{} logged out", claims.username);
    Json(MessageResponse {
        message: "Logged out successfully".into(),
    })
}

pub async fn current_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<UserProfile>> {
    let user_id = claims.sub;
    let (user, characters) = with_db(&state, move |db| {
        let Some(user) = db.get_user(user_id)? else {
            return Ok(None);
        };
        let characters = db.list_playable_characters_for_user(user_id)?;
        Ok(Some((user, characters)))
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(UserProfile {
        id: user.id,
        username: user.username,
        email: user.email,
        role: user.role,
        can_narrate: user.can_narrate,
        character_order: user.character_order,
        highlight_words: user.highlight_words,
        highlight_color: user.highlight_color,
        narrator_color: user.narrator_color,
        characters,
    }))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let current = req.current_password.unwrap_or_default();
    let new = req.new_password.unwrap_or_default();
    require_fields(&[("currentPassword", !current.is_empty()), ("newPassword", !new.is_empty())])?;

    if new.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request("New password must be at least 6 characters"));
    }

    let user_id = claims.sub;
    let row = with_db(&state, move |db| db.get_user_row(user_id))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !verify_password(&current, &row.password_hash) {
        return Err(ApiError::unauthorized("Current password is incorrect"));
    }

    let password_hash = hash_password(&new)?;
    with_db(&state, move |db| db.update_password(user_id, &password_hash)).await?;
    info!("{} changed their password", claims.username);

    Ok(Json(SuccessResponse { success: true }))
}

fn auth_user(user: User, characters: Vec<umbra_types::models::Character>) -> AuthUser {
    AuthUser {
        id: user.id,
        username: user.username,
        email: user.email,
        role: user.role,
        characters,
    }
}

/// Hash a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// False for a wrong password and for hashes that cannot be parsed, such as
/// the system account's placeholder.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn create_token(secret: &str, user: &User, ttl: chrono::Duration) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        role: user.role,
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}
