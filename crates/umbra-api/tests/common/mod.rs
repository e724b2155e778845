#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use umbra_api::auth::{AppState, AppStateInner, create_token, hash_password};
use umbra_db::Database;
use umbra_db::models::NewUser;
use umbra_gateway::activity::ActivityTracker;
use umbra_gateway::dispatcher::Dispatcher;
use umbra_types::models::Role;

pub const SECRET: &str = "integration-test-secret";

pub fn test_state() -> AppState {
    Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        jwt_secret: SECRET.into(),
        token_ttl: chrono::Duration::days(1),
        dispatcher: Dispatcher::new(),
        activity: ActivityTracker::new(),
        online_window: Duration::from_secs(600),
    })
}

/// Inserts an admin account directly and returns its token.
pub fn admin_token(state: &AppState, username: &str) -> String {
    let password_hash = hash_password("admin-password").unwrap();
    let user = state
        .db
        .create_user(&NewUser {
            username,
            email: &format!("{username}@umbra.test"),
            password_hash: &password_hash,
            role: Role::Admin,
        })
        .unwrap();
    create_token(SECRET, &user, chrono::Duration::days(1)).unwrap()
}

pub struct Registered {
    pub token: String,
    pub user_id: i64,
    pub character_id: i64,
}

/// Registers a player through the API with a fresh invite code.
pub async fn register(app: &Router, state: &AppState, username: &str) -> Registered {
    let code = format!("INVITE-{username}");
    state.db.create_invite(&code, None).unwrap().unwrap();

    let (status, body) = send(app, "POST", "/api/auth/register", None, Some(registration(username, &code))).await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");

    Registered {
        token: body["token"].as_str().unwrap().to_string(),
        user_id: body["user"]["id"].as_i64().unwrap(),
        character_id: body["user"]["characters"][0]["id"].as_i64().unwrap(),
    }
}

pub fn registration(username: &str, code: &str) -> Value {
    json!({
        "username": username,
        "email": format!("{username}@umbra.test"),
        "password": "secret-password",
        "inviteCode": code,
        "firstName": "Tobias",
        "lastName": username,
        "birthDate": "1910-03-14",
    })
}

pub async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Creates a category and a room inside it through the admin API, returning
/// the room id.
pub async fn create_room(app: &Router, admin: &str, category: &str, room: &str, password: Option<&str>) -> i64 {
    let (status, body) = send(app, "POST", "/api/admin/chat-categories", Some(admin), Some(json!({ "name": category }))).await;
    assert_eq!(status, StatusCode::CREATED, "create category failed: {body}");

    let req = json!({ "name": room, "categoryId": body["id"], "password": password });
    let (status, body) = send(app, "POST", "/api/admin/chat-rooms", Some(admin), Some(req)).await;
    assert_eq!(status, StatusCode::CREATED, "create room failed: {body}");
    body["id"].as_i64().unwrap()
}
