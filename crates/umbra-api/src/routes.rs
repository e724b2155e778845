use axum::{
    Json, Router, middleware,
    routing::{delete, get, patch, post, put},
};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState};
use crate::middleware::{require_admin, require_auth};
use crate::{
    admin, character_requests, characters, chat, gateway, housing, influence, inventory, journal, owl_post,
    settings, spells, wands,
};

/// Builds the full HTTP surface: public routes, authenticated routes and the
/// admin-only routes nested inside authentication.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/ws", get(gateway::ws_upgrade));

    let admin_routes = Router::new()
        // Users
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/users", get(admin::list_users))
        .route("/api/admin/users/{id}/role", patch(admin::update_role))
        .route("/api/admin/users/{id}/narrator", patch(admin::update_narrator))
        .route("/api/admin/users/{id}/ban", post(admin::ban))
        .route("/api/admin/users/{id}/reset-password", post(admin::reset_password))
        .route(
            "/api/admin/invite-codes",
            get(admin::list_invites).post(admin::create_invite),
        )
        .route("/api/admin/activity-log", get(admin::activity_log))
        .route("/api/admin/stats", get(admin::stats))
        .route("/api/admin/online-users", get(admin::online_users))
        // Characters
        .route("/api/admin/characters/{id}/kill", post(characters::kill_character))
        .route("/api/admin/characters/{id}/revive", post(characters::revive_character))
        .route("/api/admin/character-requests", get(character_requests::list_all))
        .route(
            "/api/admin/character-requests/{id}/approve",
            post(character_requests::approve),
        )
        .route(
            "/api/admin/character-requests/{id}/reject",
            post(character_requests::reject),
        )
        // Chat maintenance
        .route("/api/chat/rooms/{room_id}/archive", post(chat::archive_room))
        .route("/api/admin/rooms/{room_id}/clear", delete(chat::clear_room))
        .route(
            "/api/admin/chat-categories",
            get(chat::admin_list_categories).post(chat::create_category),
        )
        .route(
            "/api/admin/chat-categories/{id}",
            put(chat::update_category).delete(chat::delete_category),
        )
        .route(
            "/api/admin/chat-categories/{id}/sort-order",
            put(chat::set_category_sort_order),
        )
        .route("/api/admin/chat-categories/{id}/move", post(chat::move_category))
        .route(
            "/api/admin/chat-rooms",
            get(chat::admin_list_rooms).post(chat::create_room),
        )
        .route(
            "/api/admin/chat-rooms/{id}",
            put(chat::update_room).delete(chat::delete_room),
        )
        .route("/api/admin/chat-rooms/{id}/sort-order", put(chat::set_room_sort_order))
        .route("/api/admin/chat-rooms/{id}/move", post(chat::move_room))
        // Housing
        .route("/api/admin/housing-requests", get(housing::list_all))
        .route("/api/admin/housing-requests/{id}/approve", post(housing::approve))
        .route("/api/admin/housing-requests/{id}/return", post(housing::return_request))
        .route("/api/admin/housing-requests/{id}/reject", post(housing::reject))
        // Influence
        .route(
            "/api/admin/influence-bar/adjust-with-history",
            post(influence::adjust),
        )
        .route("/api/admin/influence-bar/reset", post(influence::reset))
        // Wands and spells
        .route(
            "/api/admin/wand-components",
            get(wands::components).put(wands::update_components),
        )
        .route(
            "/api/admin/initialize-default-spells",
            post(spells::initialize_defaults),
        )
        .route_layer(middleware::from_fn(require_admin));

    let protected_routes = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/user", get(auth::current_user))
        .route("/api/auth/change-password", post(auth::change_password))
        // Characters
        .route("/api/characters", get(characters::list_own))
        .route("/api/characters/all", get(characters::list_all))
        .route("/api/characters/online", get(characters::online))
        .route(
            "/api/characters/{id}",
            get(characters::get_character).put(characters::update_character),
        )
        .route("/api/characters/{id}/history", put(characters::update_history))
        .route("/api/characters/{id}/last-chat", get(characters::last_chat))
        .route("/api/cemetery", get(characters::cemetery))
        .route("/api/character-requests", post(character_requests::create))
        .route("/api/character-requests/my", get(character_requests::list_mine))
        // Chat
        .route("/api/chat/categories", get(chat::categories))
        .route("/api/chat/rooms", get(chat::rooms))
        .route("/api/chat/rooms/{room_id}/enter", post(chat::enter_room))
        .route("/api/chat/rooms/{room_id}/presence", get(chat::room_presence))
        .route(
            "/api/chat/{room_id}/messages",
            get(chat::messages).post(chat::send_message),
        )
        .route("/api/chat/narrator-message", post(chat::narrator_message))
        .route("/api/game/cast-spell", post(chat::cast_spell))
        .route("/api/room-presence/join", post(chat::join_presence))
        .route("/api/room-presence/leave", post(chat::leave_presence))
        // Owl post
        .route("/api/owl-post", post(owl_post::send))
        .route("/api/owl-post/inbox/{character_id}", get(owl_post::inbox))
        .route("/api/owl-post/sent/{character_id}", get(owl_post::sent))
        .route(
            "/api/owl-post/unread-count/{character_id}",
            get(owl_post::unread_count),
        )
        .route("/api/owl-post/unread-total", get(owl_post::unread_total))
        .route("/api/owl-post/{message_id}/read", post(owl_post::mark_read))
        .route("/api/owl-post/characters", get(owl_post::characters))
        .route("/api/owl-post/message/{message_id}", delete(owl_post::delete))
        // Housing
        .route("/api/housing-requests", post(housing::create))
        .route("/api/housing-requests/my", get(housing::list_mine))
        .route("/api/housing-requests/{id}", delete(housing::delete))
        // Influence
        .route("/api/influence-bar", get(influence::get))
        .route("/api/influence-history", get(influence::history))
        // Wands, spells, inventory, journal
        .route("/api/wand-components", get(wands::components))
        .route("/api/characters/{id}/wand", get(wands::get_wand))
        .route(
            "/api/characters/{id}/visit-ollivanders",
            post(wands::visit_ollivanders),
        )
        .route(
            "/api/characters/{id}/create-custom-wand",
            post(wands::create_custom_wand),
        )
        .route("/api/spells", get(spells::list))
        .route(
            "/api/characters/{id}/spells",
            get(spells::character_spells).post(spells::learn),
        )
        .route("/api/characters/{id}/spells/{spell_id}", delete(spells::forget))
        .route(
            "/api/characters/{id}/inventory",
            get(inventory::list).post(inventory::add),
        )
        .route(
            "/api/inventory/{id}",
            patch(inventory::update).delete(inventory::delete),
        )
        .route(
            "/api/characters/{id}/journal",
            get(journal::list).post(journal::create),
        )
        .route(
            "/api/journal/{id}",
            patch(journal::update).delete(journal::delete),
        )
        // User settings
        .route("/api/user/character-order", post(settings::character_order))
        .route("/api/user/highlight-settings", post(settings::highlight_settings))
        .route("/api/user/narrator-color", post(settings::narrator_color))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
