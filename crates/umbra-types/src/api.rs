use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{
    Character, ChatCategory, ChatMessage, ChatRoom, Influence, InfluenceHistoryEntry, Role, Spell, User,
};

// -- JWT Claims --

/// JWT claims shared across umbra-api (REST middleware) and the gateway
/// upgrade handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// An id that clients send either as a JSON number or as a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(i64),
    Text(String),
}

impl NumberOrString {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// `0` and the empty string count as absent, like a missing field.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Number(n) => *n == 0,
            Self::Text(s) => s.trim().is_empty(),
        }
    }
}

// -- Generic responses --

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkResult {
    pub message: String,
    pub count: usize,
}

// -- Auth --

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub invite_code: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub birth_date: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: AuthUser,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub characters: Vec<Character>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub can_narrate: bool,
    pub character_order: Option<Vec<i64>>,
    pub highlight_words: Option<String>,
    pub highlight_color: Option<String>,
    pub narrator_color: Option<String>,
    pub characters: Vec<Character>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

// -- User settings --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterOrderRequest {
    pub character_order: Vec<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HighlightSettingsRequest {
    pub highlight_words: Option<String>,
    pub highlight_color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NarratorColorRequest {
    pub narrator_color: Option<String>,
}

// -- Characters --

#[derive(Debug, Serialize, Deserialize)]
pub struct CharacterList {
    pub characters: Vec<Character>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterOwner {
    pub username: String,
    pub email: String,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CharacterWithUser {
    #[serde(flatten)]
    pub character: Character,
    pub user: Option<CharacterOwner>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateCharacterRequest {
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub school: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub residence: Option<String>,
    pub character_history: Option<String>,
    pub show_history_to_others: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateHistoryRequest {
    pub history: Option<String>,
    pub show_history_to_others: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LastChat {
    pub room: RoomRef,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineCharacter {
    pub id: i64,
    pub full_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub location: String,
    pub room_id: i64,
    pub avatar: Option<String>,
    pub user_id: i64,
    pub is_online: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KillCharacterRequest {
    pub death_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateCharacterRequestInput {
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub school: Option<String>,
    pub description: Option<String>,
    pub reason: Option<String>,
}

/// Review payload for request decisions; older clients send `reason`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReviewRequest {
    #[serde(alias = "reason")]
    pub review_note: Option<String>,
}

// -- Chat --

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCategoryTree {
    #[serde(flatten)]
    pub category: ChatCategory,
    pub children: Vec<ChatCategoryTree>,
    pub rooms: Vec<ChatRoom>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EnterRoomRequest {
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_message_limit")]
    pub limit: u32,
}

fn default_message_limit() -> u32 {
    100
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SendChatMessageRequest {
    pub character_id: Option<i64>,
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NarratorMessageRequest {
    pub room_id: Option<i64>,
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CastSpellRequest {
    pub room_id: Option<i64>,
    pub character_id: Option<i64>,
    pub spell_id: Option<i64>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CastSpellResponse {
    pub spell: Spell,
    pub message: ChatMessage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RoomPresenceRequest {
    pub character_id: Option<i64>,
    pub room_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Absent leaves the parent alone; `null` moves the category to the top level.
    #[serde(deserialize_with = "present_or_null")]
    pub parent_id: Option<Option<i64>>,
}

/// Distinguishes an explicit `null` from a missing field when combined with
/// `#[serde(default)]`.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub long_description: Option<String>,
    pub category_id: Option<i64>,
    pub password: Option<String>,
    pub is_public: Option<bool>,
    pub sort_order: Option<i64>,
}

/// An empty `password` clears the room password.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateRoomRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub long_description: Option<String>,
    pub category_id: Option<i64>,
    pub password: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortOrderRequest {
    pub sort_order: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub direction: MoveDirection,
}

// -- Owl post --

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SendOwlPostRequest {
    pub sender_character_id: Option<NumberOrString>,
    pub recipient_character_id: Option<NumberOrString>,
    pub subject: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub character_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UnreadTotalQuery {
    pub character_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwlPostCharacter {
    #[serde(flatten)]
    pub character: Character,
    pub full_name: String,
}

// -- Housing --

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateHousingRequest {
    pub character_id: Option<i64>,
    pub request_type: Option<String>,
    pub size: Option<String>,
    pub location: Option<String>,
    pub selected_area: Option<String>,
    pub housing_name: Option<String>,
    pub housing_password: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApproveHousingRequest {
    pub assigned_address: Option<String>,
    pub review_note: Option<String>,
}

// -- Influence --

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdjustInfluenceRequest {
    pub change_type: Option<String>,
    pub points: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InfluenceChange {
    pub influence: Influence,
    pub history: InfluenceHistoryEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResetInfluenceRequest {
    #[serde(rename = "type")]
    pub reset_type: Option<String>,
}

// -- Wands, spells, inventory, journal --

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CustomWandRequest {
    pub wood: Option<String>,
    pub core: Option<String>,
    pub length: Option<String>,
    pub flexibility: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LearnSpellRequest {
    pub spell_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateInventoryItemRequest {
    pub item_type: Option<String>,
    pub item_id: Option<i64>,
    pub price: Option<NumberOrString>,
    pub item_name: Option<String>,
    pub quantity: Option<i64>,
    pub rarity: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateInventoryItemRequest {
    pub item_name: Option<String>,
    pub price: Option<i64>,
    pub quantity: Option<i64>,
    pub rarity: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JournalEntryInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub entry_date: Option<NaiveDate>,
    pub is_private: Option<bool>,
}

// -- Admin --

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminUser {
    #[serde(flatten)]
    pub user: User,
    pub characters: Vec<Character>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UsersQuery {
    pub include_system: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateRoleRequest {
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateNarratorRequest {
    pub can_narrate: Option<bool>,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BanRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordResponse {
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateInviteCodeRequest {
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub last_active_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_users: i64,
    pub admin_users: i64,
    pub active_characters: i64,
    pub dead_characters: i64,
    pub online_now: usize,
    /// Open WebSocket gateway connections.
    pub gateway_connections: usize,
    pub pending_requests: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parent_distinguishes_null_from_absent() {
        let absent: UpdateCategoryRequest = serde_json::from_str(r#"{"name":"Hogsmeade"}"#).unwrap();
        assert_eq!(absent.parent_id, None);

        let cleared: UpdateCategoryRequest = serde_json::from_str(r#"{"parentId":null}"#).unwrap();
        assert_eq!(cleared.parent_id, Some(None));

        let moved: UpdateCategoryRequest = serde_json::from_str(r#"{"parentId":3}"#).unwrap();
        assert_eq!(moved.parent_id, Some(Some(3)));
    }

    #[test]
    fn number_or_string_accepts_numeric_strings() {
        let parsed: SendOwlPostRequest = serde_json::from_str(
            r#"{"senderCharacterId": "12", "recipientCharacterId": 7, "subject": "Hi"}"#,
        )
        .unwrap();

        assert_eq!(parsed.sender_character_id.unwrap().as_i64(), Some(12));
        assert_eq!(parsed.recipient_character_id.unwrap().as_i64(), Some(7));
        assert!(parsed.content.is_none());
        assert!(NumberOrString::Text("abc".into()).as_i64().is_none());
        assert!(NumberOrString::Number(0).is_blank());
    }

    #[test]
    fn review_request_accepts_legacy_reason_field() {
        let parsed: ReviewRequest = serde_json::from_str(r#"{"reason": "incomplete"}"#).unwrap();
        assert_eq!(parsed.review_note.as_deref(), Some("incomplete"));
    }
}
