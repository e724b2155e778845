//! Storage-side inputs and outcomes. Rows are mapped straight into the
//! umbra-types models; only what the API never sees lives here.

use chrono::NaiveDate;
use umbra_types::models::{Character, ChatCategory, RequestStatus, User};

/// A user together with the stored argon2 hash.
pub struct UserRow {
    pub user: User,
    pub password_hash: String,
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: umbra_types::models::Role,
}

pub struct NewCharacter<'a> {
    pub user_id: i64,
    pub first_name: &'a str,
    pub middle_name: Option<&'a str>,
    pub last_name: &'a str,
    pub birth_date: Option<NaiveDate>,
    pub school: Option<&'a str>,
    pub description: Option<&'a str>,
}

pub struct Registration<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub invite_code: &'a str,
    pub first_name: &'a str,
    pub middle_name: Option<&'a str>,
    pub last_name: &'a str,
    pub birth_date: NaiveDate,
}

pub enum RegisterOutcome {
    Created { user: User, character: Character },
    InvalidInvite,
    UserExists,
}

#[derive(Debug, PartialEq, Eq)]
pub enum UpdateCategoryOutcome {
    Updated(ChatCategory),
    NotFound,
    UnknownParent,
    /// The new parent is the category itself or one of its descendants.
    ParentCycle,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DeleteCategoryOutcome {
    Deleted,
    NotFound,
    NotEmpty,
}

pub struct NewRoom<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub long_description: Option<&'a str>,
    pub category_id: i64,
    pub password: Option<&'a str>,
    pub is_public: bool,
    pub sort_order: Option<i64>,
}

pub struct NewHousingRequest<'a> {
    pub user_id: i64,
    pub character_id: i64,
    pub request_type: &'a str,
    pub size: Option<&'a str>,
    pub location: Option<&'a str>,
    pub selected_area: Option<&'a str>,
    pub housing_name: Option<&'a str>,
    pub housing_password: Option<&'a str>,
    pub description: &'a str,
}

/// A decision on a pending housing request.
pub struct HousingDecision<'a> {
    pub status: RequestStatus,
    pub reviewer_id: i64,
    pub assigned_address: Option<&'a str>,
    pub review_note: Option<&'a str>,
}

/// Result of reviewing a character request.
pub enum ReviewOutcome<T> {
    Done(T),
    NotFound,
    NotPending,
}

pub struct NewCharacterRequest<'a> {
    pub user_id: i64,
    pub first_name: &'a str,
    pub middle_name: Option<&'a str>,
    pub last_name: &'a str,
    pub birth_date: NaiveDate,
    pub school: &'a str,
    pub description: Option<&'a str>,
    pub reason: &'a str,
}

pub struct NewInventoryItem<'a> {
    pub character_id: i64,
    pub item_type: &'a str,
    pub item_id: i64,
    pub item_name: Option<&'a str>,
    pub price: i64,
    pub quantity: i64,
    pub rarity: Option<&'a str>,
    pub description: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub category: &'a str,
}

pub struct NewWand<'a> {
    pub character_id: i64,
    pub wood: &'a str,
    pub core: &'a str,
    pub length: &'a str,
    pub flexibility: &'a str,
    pub description: &'a str,
}
