mod common;

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::json;

use common::{admin_token, create_room, register, registration, send, test_state};
use umbra_api::routes::router;
use umbra_types::models::Role;

#[tokio::test]
async fn health_is_public() {
    let app = router(test_state());
    let (status, body) = send(&app, "GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let app = router(test_state());

    let (status, body) = send(&app, "GET", "/api/characters", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Unauthorized");

    let (status, body) = send(&app, "GET", "/api/characters", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid token");
}

#[tokio::test]
async fn admin_routes_reject_regular_users() {
    let state = test_state();
    let app = router(state.clone());
    let player = register(&app, &state, "harriet").await;

    let (status, body) = send(&app, "GET", "/api/admin/stats", Some(&player.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Admin access required");

    let admin = admin_token(&state, "headmaster");
    let (status, body) = send(&app, "GET", "/api/admin/stats", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalUsers"].as_i64().map(|n| n >= 2), Some(true));
}

#[tokio::test]
async fn characters_of_other_users_are_forbidden() {
    let state = test_state();
    let app = router(state.clone());
    let owner = register(&app, &state, "owner").await;
    let stranger = register(&app, &state, "stranger").await;

    let uri = format!("/api/characters/{}", owner.character_id);
    let (status, body) = send(&app, "GET", &uri, Some(&stranger.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Character does not belong to user");

    let (status, body) = send(&app, "GET", &uri, Some(&owner.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"].as_i64(), Some(owner.character_id));

    let admin = admin_token(&state, "headmaster");
    let (status, _) = send(&app, "GET", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "GET", "/api/characters/999999", Some(&owner.token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invite_codes_work_only_once() {
    let state = test_state();
    let app = router(state.clone());
    register(&app, &state, "first").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(registration("second", "INVITE-first")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid or already used invite code");
}

#[tokio::test]
async fn login_returns_token_and_rejects_bad_password() {
    let state = test_state();
    let app = router(state.clone());
    register(&app, &state, "minerva").await;

    let creds = json!({ "username": "minerva", "password": "secret-password" });
    let (status, body) = send(&app, "POST", "/api/auth/login", None, Some(creds)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].as_str().is_some());
    assert_eq!(body["user"]["characters"].as_array().map(Vec::len), Some(1));

    let creds = json!({ "username": "minerva", "password": "wrong-password" });
    let (status, body) = send(&app, "POST", "/api/auth/login", None, Some(creds)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");
}

#[tokio::test]
async fn owl_post_names_missing_fields() {
    let state = test_state();
    let app = router(state.clone());
    let player = register(&app, &state, "hedwig").await;

    let req = json!({ "senderCharacterId": player.character_id, "subject": "  " });
    let (status, body) = send(&app, "POST", "/api/owl-post", Some(&player.token), Some(req)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["missingFields"], json!(["recipientCharacterId", "subject", "content"]));
    assert_eq!(
        body["message"],
        "Missing required fields: recipientCharacterId, subject, content"
    );
}

#[tokio::test]
async fn owl_post_reaches_the_recipient_inbox() {
    let state = test_state();
    let app = router(state.clone());
    let sender = register(&app, &state, "sender").await;
    let recipient = register(&app, &state, "recipient").await;

    let req = json!({
        "senderCharacterId": sender.character_id,
        "recipientCharacterId": recipient.character_id.to_string(),
        "subject": "Greetings",
        "content": "Meet me at the Leaky Cauldron.",
    });
    let (status, _) = send(&app, "POST", "/api/owl-post", Some(&sender.token), Some(req)).await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/api/owl-post/inbox/{}", recipient.character_id);
    let (status, body) = send(&app, "GET", &uri, Some(&recipient.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (status, _) = send(&app, "GET", &uri, Some(&sender.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn online_users_exclude_stale_activity() {
    let state = test_state();
    let app = router(state.clone());
    let admin = admin_token(&state, "headmaster");

    let now = Utc::now();
    state
        .activity
        .touch_at(9001, "recent", Role::User, now - chrono::Duration::minutes(3))
        .await;
    state
        .activity
        .touch_at(9002, "stale", Role::User, now - chrono::Duration::minutes(11))
        .await;

    let (status, body) = send(&app, "GET", "/api/admin/online-users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);

    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|u| u["username"].as_str())
        .collect();
    assert!(names.contains(&"recent"));
    assert!(names.contains(&"headmaster"));
    assert!(!names.contains(&"stale"));
}

#[tokio::test]
async fn admin_invite_codes_reject_duplicates() {
    let state = test_state();
    let app = router(state.clone());
    let admin = admin_token(&state, "headmaster");

    let req = json!({ "code": "OWL-2024" });
    let (status, body) = send(&app, "POST", "/api/admin/invite-codes", Some(&admin), Some(req.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["code"], "OWL-2024");

    let (status, _) = send(&app, "POST", "/api/admin/invite-codes", Some(&admin), Some(req)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/api/admin/invite-codes", Some(&admin), Some(json!({ "code": " " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reset_password_allows_login_with_new_password() {
    let state = test_state();
    let app = router(state.clone());
    let player = register(&app, &state, "neville").await;
    let admin = admin_token(&state, "headmaster");

    let uri = format!("/api/admin/users/{}/reset-password", player.user_id);
    let (status, body) = send(&app, "POST", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let new_password = body["newPassword"].as_str().unwrap().to_string();
    assert_eq!(new_password.len(), 10);

    let creds = json!({ "username": "neville", "password": new_password });
    let (status, _) = send(&app, "POST", "/api/auth/login", None, Some(creds)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "POST", "/api/admin/users/424242/reset-password", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn banned_users_cannot_log_in() {
    let state = test_state();
    let app = router(state.clone());
    let player = register(&app, &state, "draco").await;
    let admin = admin_token(&state, "headmaster");

    let uri = format!("/api/admin/users/{}/ban", player.user_id);
    let (status, _) = send(&app, "POST", &uri, Some(&admin), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "POST", &uri, Some(&admin), Some(json!({ "reason": "Dark magic" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isBanned"], true);

    let creds = json!({ "username": "draco", "password": "secret-password" });
    let (status, body) = send(&app, "POST", "/api/auth/login", None, Some(creds)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Account is banned");
}

#[tokio::test]
async fn highlight_color_defaults_to_yellow() {
    let state = test_state();
    let app = router(state.clone());
    let player = register(&app, &state, "luna").await;

    let req = json!({ "highlightWords": "Nargles" });
    let (status, _) = send(&app, "POST", "/api/user/highlight-settings", Some(&player.token), Some(req)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "GET", "/api/auth/user", Some(&player.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["highlightColor"], "yellow");
    assert_eq!(body["highlightWords"], "Nargles");

    let (status, _) = send(&app, "POST", "/api/user/narrator-color", Some(&player.token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn shop_refuses_wands() {
    let state = test_state();
    let app = router(state.clone());
    let player = register(&app, &state, "ron").await;

    let uri = format!("/api/characters/{}/inventory", player.character_id);
    let req = json!({ "itemType": "wand", "price": 7, "category": "wands" });
    let (status, _) = send(&app, "POST", &uri, Some(&player.token), Some(req)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = json!({ "itemType": "potion", "price": 3, "category": "potions", "itemName": "Pepperup" });
    let (status, body) = send(&app, "POST", &uri, Some(&player.token), Some(req)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["quantity"], 1);
}

#[tokio::test]
async fn malformed_path_and_query_values_get_json_errors() {
    let state = test_state();
    let app = router(state.clone());
    let player = register(&app, &state, "percy").await;

    let (status, body) = send(&app, "GET", "/api/characters/abc", Some(&player.token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string(), "unexpected body: {body}");

    let (status, body) = send(&app, "GET", "/api/chat/1/messages?limit=-5", Some(&player.token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string(), "unexpected body: {body}");
}

#[tokio::test]
async fn category_parents_can_be_cleared_but_not_looped() {
    let state = test_state();
    let app = router(state.clone());
    let admin = admin_token(&state, "headmaster");

    let (_, outer) = send(&app, "POST", "/api/admin/chat-categories", Some(&admin), Some(json!({ "name": "Bradavice" }))).await;
    let req = json!({ "name": "Sklepení", "parentId": outer["id"] });
    let (status, inner) = send(&app, "POST", "/api/admin/chat-categories", Some(&admin), Some(req)).await;
    assert_eq!(status, StatusCode::CREATED);

    let outer_uri = format!("/api/admin/chat-categories/{}", outer["id"]);
    let inner_uri = format!("/api/admin/chat-categories/{}", inner["id"]);

    let (status, body) = send(&app, "PUT", &outer_uri, Some(&admin), Some(json!({ "parentId": inner["id"] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "A category cannot be nested inside itself");

    let (status, _) = send(&app, "PUT", &outer_uri, Some(&admin), Some(json!({ "parentId": outer["id"] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "PUT", &outer_uri, Some(&admin), Some(json!({ "parentId": 9999 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Parent category does not exist");

    // Renaming keeps the parent
    let (status, body) = send(&app, "PUT", &inner_uri, Some(&admin), Some(json!({ "name": "Žalář" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["parentId"], outer["id"]);

    let (status, body) = send(&app, "PUT", &inner_uri, Some(&admin), Some(json!({ "parentId": null }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["parentId"].is_null());
}

#[tokio::test]
async fn approved_housing_opens_one_private_room_and_sends_a_letter() {
    let state = test_state();
    let app = router(state.clone());
    let player = register(&app, &state, "arthur").await;
    let admin = admin_token(&state, "headmaster");

    let (status, _) = send(&app, "POST", "/api/admin/chat-categories", Some(&admin), Some(json!({ "name": "Příčná ulice" }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let housing = json!({
        "characterId": player.character_id,
        "requestType": "house",
        "selectedArea": "Příčná ulice",
        "housingName": "Doupě",
        "housingPassword": "kurnik",
        "description": "Křivý dům plný zrzků",
    });

    for _ in 0..2 {
        let (status, request) = send(&app, "POST", "/api/housing-requests", Some(&player.token), Some(housing.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/api/admin/housing-requests/{}/approve", request["id"]);
        let (status, body) = send(&app, "POST", &uri, Some(&admin), Some(json!({ "assignedAddress": "Vydrník 1" }))).await;
        assert_eq!(status, StatusCode::OK, "approve failed: {body}");
        assert_eq!(body["status"], "approved");

        let (status, _) = send(&app, "POST", &uri, Some(&admin), Some(json!({ "assignedAddress": "Vydrník 1" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, rooms) = send(&app, "GET", "/api/admin/chat-rooms", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let burrows: Vec<_> = rooms
        .as_array()
        .unwrap()
        .iter()
        .filter(|room| room["name"] == "Doupě")
        .collect();
    assert_eq!(burrows.len(), 1);
    assert_eq!(burrows[0]["isPublic"], false);
    assert_eq!(burrows[0]["hasPassword"], true);

    let uri = format!("/api/owl-post/inbox/{}", player.character_id);
    let (status, inbox) = send(&app, "GET", &uri, Some(&player.token), None).await;
    assert_eq!(status, StatusCode::OK);
    let letters = inbox.as_array().unwrap();
    assert_eq!(letters.len(), 2);
    assert!(letters.iter().all(|letter| letter["subject"] == "Žádost o bydlení schválena"));
}

#[tokio::test]
async fn sending_messages_checks_owner_length_and_life() {
    let state = test_state();
    let app = router(state.clone());
    let player = register(&app, &state, "molly").await;
    let other = register(&app, &state, "bellatrix").await;
    let admin = admin_token(&state, "headmaster");
    let room_id = create_room(&app, &admin, "Doupě", "Kuchyně", None).await;
    let uri = format!("/api/chat/{room_id}/messages");

    let req = json!({ "characterId": player.character_id, "content": "Not my daughter!" });
    let (status, body) = send(&app, "POST", &uri, Some(&other.token), Some(req)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Character does not belong to user");

    let req = json!({ "characterId": player.character_id, "content": "a".repeat(5001) });
    let (status, _) = send(&app, "POST", &uri, Some(&player.token), Some(req)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = json!({ "characterId": player.character_id, "content": "  Dinner is ready  " });
    let (status, body) = send(&app, "POST", &uri, Some(&player.token), Some(req)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["content"], "Dinner is ready");
    assert_eq!(body["roomId"], room_id);

    let kill = format!("/api/admin/characters/{}/kill", other.character_id);
    let (status, _) = send(&app, "POST", &kill, Some(&admin), Some(json!({ "deathReason": "Duel" }))).await;
    assert_eq!(status, StatusCode::OK);

    let req = json!({ "characterId": other.character_id, "content": "I am still here" });
    let (status, body) = send(&app, "POST", &uri, Some(&other.token), Some(req)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Dead characters cannot speak");

    let (status, history) = send(&app, "GET", &uri, Some(&player.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn room_passwords_bind_players_but_not_admins() {
    let state = test_state();
    let app = router(state.clone());
    let player = register(&app, &state, "neville").await;
    let admin = admin_token(&state, "headmaster");
    let room_id = create_room(&app, &admin, "Bradavice", "Komnata nejvyšší potřeby", Some("fidelius")).await;
    let uri = format!("/api/chat/rooms/{room_id}/enter");

    let (status, body) = send(&app, "POST", &uri, Some(&player.token), Some(json!({ "password": "alohomora" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Incorrect room password");

    let (status, _) = send(&app, "POST", &uri, Some(&player.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "POST", &uri, Some(&player.token), Some(json!({ "password": "fidelius" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = send(&app, "POST", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = send(&app, "POST", "/api/chat/rooms/9999/enter", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn approving_a_character_request_creates_the_character_once() {
    let state = test_state();
    let app = router(state.clone());
    let player = register(&app, &state, "fleur").await;
    let admin = admin_token(&state, "headmaster");

    let req = json!({
        "firstName": "Gabrielle",
        "lastName": "Delacour",
        "birthDate": "1986-05-02",
        "school": "Krásnohůlky",
        "reason": "Younger sister",
    });
    let (status, request) = send(&app, "POST", "/api/character-requests", Some(&player.token), Some(req)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["status"], "pending");

    let uri = format!("/api/admin/character-requests/{}/approve", request["id"]);
    let (status, character) = send(&app, "POST", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK, "approve failed: {character}");
    assert_eq!(character["firstName"], "Gabrielle");
    assert_eq!(character["userId"], player.user_id);

    let (status, body) = send(&app, "POST", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Request has already been reviewed");

    let (status, characters) = send(&app, "GET", "/api/characters", Some(&player.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(characters["characters"].as_array().unwrap().len(), 2);

    let (status, _) = send(&app, "POST", "/api/admin/character-requests/9999/approve", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn casting_needs_a_wand_and_a_known_spell() {
    let state = test_state();
    let app = router(state.clone());
    let player = register(&app, &state, "hermione").await;
    let admin = admin_token(&state, "headmaster");
    let room_id = create_room(&app, &admin, "Bradavice", "Knihovna", None).await;

    let (status, spells) = send(&app, "GET", "/api/spells", Some(&player.token), None).await;
    assert_eq!(status, StatusCode::OK);
    let spell_id = spells[0]["id"].as_i64().unwrap();

    let cast = json!({
        "roomId": room_id,
        "characterId": player.character_id,
        "spellId": spell_id,
        "message": "It's leviOsa",
    });
    let (status, body) = send(&app, "POST", "/api/game/cast-spell", Some(&player.token), Some(cast.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Character has no wand");

    let uri = format!("/api/characters/{}/visit-ollivanders", player.character_id);
    let (status, _) = send(&app, "POST", &uri, Some(&player.token), None).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, "POST", "/api/game/cast-spell", Some(&player.token), Some(cast.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Character does not know this spell");

    let uri = format!("/api/characters/{}/spells", player.character_id);
    let (status, _) = send(&app, "POST", &uri, Some(&player.token), Some(json!({ "spellId": spell_id }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, "POST", "/api/game/cast-spell", Some(&player.token), Some(cast)).await;
    assert_eq!(status, StatusCode::CREATED, "cast failed: {body}");
    assert_eq!(body["message"]["messageType"], "spell");
    assert!(body["message"]["content"].as_str().unwrap().ends_with(": It's leviOsa"));
}
