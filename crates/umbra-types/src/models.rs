use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// -- Roles --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub can_narrate: bool,
    pub narrator_reason: Option<String>,
    pub is_banned: bool,
    pub ban_reason: Option<String>,
    pub banned_at: Option<DateTime<Utc>>,
    pub is_system: bool,
    pub character_order: Option<Vec<i64>>,
    pub highlight_words: Option<String>,
    pub highlight_color: Option<String>,
    pub narrator_color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Minimal user reference embedded in other payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
}

// -- Characters --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: i64,
    pub user_id: i64,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub school: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub residence: Option<String>,
    pub character_history: Option<String>,
    pub show_history_to_others: bool,
    pub is_active: bool,
    pub is_system: bool,
    pub death_date: Option<DateTime<Utc>>,
    pub death_reason: Option<String>,
    pub killed_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Character {
    pub fn full_name(&self) -> String {
        match self.middle_name.as_deref().filter(|m| !m.trim().is_empty()) {
            Some(middle) => format!("{} {} {}", self.first_name, middle, self.last_name),
            None => format!("{} {}", self.first_name, self.last_name),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.death_date.is_none()
    }

    /// Alive, not a system character, and both names present.
    pub fn is_playable(&self) -> bool {
        self.is_alive()
            && !self.is_system
            && !self.first_name.trim().is_empty()
            && !self.last_name.trim().is_empty()
    }

    pub fn summary(&self) -> CharacterSummary {
        CharacterSummary {
            id: self.id,
            first_name: self.first_name.clone(),
            middle_name: self.middle_name.clone(),
            last_name: self.last_name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSummary {
    pub id: i64,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub avatar: Option<String>,
}

// -- Chat --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCategory {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i64>,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub long_description: Option<String>,
    pub category_id: i64,
    /// Only populated for administrators.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub has_password: bool,
    pub is_public: bool,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Narrator,
    Spell,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Narrator => "narrator",
            Self::Spell => "spell",
        }
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "narrator" => Ok(Self::Narrator),
            "spell" => Ok(Self::Spell),
            other => Err(format!("unknown message type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub room_id: i64,
    pub character_id: Option<i64>,
    pub user_id: i64,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
    pub character: Option<CharacterSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPresence {
    pub character_id: i64,
    pub room_id: i64,
    pub is_online: bool,
    pub joined_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub character: CharacterSummary,
}

/// A character currently present in some chat room, joined with the room name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentCharacter {
    pub character: Character,
    pub room_id: i64,
    pub room_name: String,
}

// -- Owl post --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwlPostMessage {
    pub id: i64,
    pub sender_character_id: i64,
    pub recipient_character_id: i64,
    pub subject: String,
    pub content: String,
    pub is_read: bool,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub sender: Option<CharacterSummary>,
    pub recipient: Option<CharacterSummary>,
}

// -- Housing --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Returned,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Returned => "returned",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "returned" => Ok(Self::Returned),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown request status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HousingRequest {
    pub id: i64,
    pub user_id: i64,
    pub character_id: i64,
    pub request_type: String,
    pub size: Option<String>,
    pub location: Option<String>,
    pub selected_area: Option<String>,
    pub housing_name: Option<String>,
    pub housing_password: Option<String>,
    pub description: String,
    pub status: RequestStatus,
    pub assigned_address: Option<String>,
    pub review_note: Option<String>,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub character: Option<CharacterSummary>,
    pub user: Option<UserSummary>,
}

// -- Character requests --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterRequest {
    pub id: i64,
    pub user_id: i64,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub school: String,
    pub description: Option<String>,
    pub reason: String,
    pub status: RequestStatus,
    pub review_note: Option<String>,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub user: Option<UserSummary>,
}

// -- Invite codes --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteCode {
    pub id: i64,
    pub code: String,
    pub is_used: bool,
    pub used_by: Option<i64>,
    pub created_by: Option<i64>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// -- Influence --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Faction {
    Grindelwald,
    Dumbledore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Influence {
    pub grindelwald_points: i64,
    pub dumbledore_points: i64,
    pub updated_at: DateTime<Utc>,
}

impl Influence {
    pub fn points(&self, side: Faction) -> i64 {
        match side {
            Faction::Grindelwald => self.grindelwald_points,
            Faction::Dumbledore => self.dumbledore_points,
        }
    }

    /// Applies a signed change to one side, flooring that side at zero.
    /// Returns `(previous, new)` for the affected side.
    pub fn adjust(&mut self, side: Faction, delta: i64) -> (i64, i64) {
        let previous = self.points(side);
        let new = previous.saturating_add(delta).max(0);
        match side {
            Faction::Grindelwald => self.grindelwald_points = new,
            Faction::Dumbledore => self.dumbledore_points = new,
        }
        (previous, new)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluenceHistoryEntry {
    pub id: i64,
    /// `grindelwald`, `dumbledore` or `reset`.
    pub change_type: String,
    pub points_changed: i64,
    pub previous_total: i64,
    pub new_total: i64,
    pub reason: String,
    pub admin_user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

// -- Wands --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WandComponent {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WandComponents {
    #[serde(default)]
    pub woods: Vec<WandComponent>,
    #[serde(default)]
    pub cores: Vec<WandComponent>,
    #[serde(default)]
    pub lengths: Vec<WandComponent>,
    #[serde(default)]
    pub flexibilities: Vec<WandComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wand {
    pub id: i64,
    pub character_id: i64,
    pub wood: String,
    pub core: String,
    pub length: String,
    pub flexibility: String,
    pub description: String,
    pub acquired_at: DateTime<Utc>,
}

// -- Inventory and journal --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: i64,
    pub character_id: i64,
    pub item_type: String,
    pub item_id: i64,
    pub item_name: Option<String>,
    pub price: i64,
    pub quantity: i64,
    pub rarity: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub category: String,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: i64,
    pub character_id: i64,
    pub title: Option<String>,
    pub content: String,
    pub entry_date: Option<NaiveDate>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Spells --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spell {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub effect: String,
    pub category: String,
    pub spell_type: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSpell {
    pub id: i64,
    pub character_id: i64,
    pub spell_id: i64,
    pub learned_at: DateTime<Utc>,
    pub spell: Spell,
}

// -- Admin activity --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminActivity {
    pub id: i64,
    pub action: String,
    pub details: Option<String>,
    pub admin: UserSummary,
    pub target_user: Option<UserSummary>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character(first: &str, middle: Option<&str>, last: &str) -> Character {
        let now = Utc::now();
        Character {
            id: 1,
            user_id: 1,
            first_name: first.into(),
            middle_name: middle.map(Into::into),
            last_name: last.into(),
            birth_date: None,
            school: None,
            description: None,
            avatar: None,
            residence: None,
            character_history: None,
            show_history_to_others: true,
            is_active: true,
            is_system: false,
            death_date: None,
            death_reason: None,
            killed_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn full_name_skips_blank_middle_name() {
        assert_eq!(character("Albus", None, "Dumbledore").full_name(), "Albus Dumbledore");
        assert_eq!(character("Albus", Some(" "), "Dumbledore").full_name(), "Albus Dumbledore");
        assert_eq!(
            character("Albus", Some("Percival"), "Dumbledore").full_name(),
            "Albus Percival Dumbledore"
        );
    }

    #[test]
    fn dead_system_and_nameless_characters_are_not_playable() {
        assert!(character("Newt", None, "Scamander").is_playable());

        let mut dead = character("Newt", None, "Scamander");
        dead.death_date = Some(Utc::now());
        assert!(!dead.is_playable());

        let mut system = character("Správa", None, "ubytování");
        system.is_system = true;
        assert!(!system.is_playable());

        assert!(!character("  ", None, "Scamander").is_playable());
    }

    #[test]
    fn influence_adjust_floors_at_zero() {
        let mut influence = Influence {
            grindelwald_points: 10,
            dumbledore_points: 40,
            updated_at: Utc::now(),
        };

        assert_eq!(influence.adjust(Faction::Grindelwald, -25), (10, 0));
        assert_eq!(influence.adjust(Faction::Dumbledore, 5), (40, 45));
        assert_eq!(influence.grindelwald_points, 0);
        assert_eq!(influence.dumbledore_points, 45);
    }

    #[test]
    fn role_round_trips_through_strings() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(Role::User.to_string(), "user");
        assert!("owner".parse::<Role>().is_err());
    }
}
