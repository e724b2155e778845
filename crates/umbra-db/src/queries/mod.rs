mod activity_log;
mod character_requests;
mod characters;
mod chat;
mod housing;
mod influence;
mod inventory;
mod invites;
mod journal;
mod owl_post;
mod presence;
mod spells;
mod stats;
mod users;
mod wands;

use std::str::FromStr;

use rusqlite::Row;
use rusqlite::types::Type;
use umbra_types::models::CharacterSummary;

/// Parses a TEXT column through `FromStr`, surfacing failures as a
/// column conversion error.
pub(crate) fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

/// Columns for a joined character summary; pair with `summary_from_row`.
pub(crate) fn summary_columns(alias: &str) -> String {
    format!(
        "{a}.id, {a}.first_name, {a}.middle_name, {a}.last_name, {a}.avatar",
        a = alias
    )
}

/// Reads five summary columns starting at `offset`. A NULL id means the
/// LEFT JOIN found nothing.
pub(crate) fn summary_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Option<CharacterSummary>> {
    let Some(id) = row.get::<_, Option<i64>>(offset)? else {
        return Ok(None);
    };

    Ok(Some(CharacterSummary {
        id,
        first_name: row.get(offset + 1)?,
        middle_name: row.get(offset + 2)?,
        last_name: row.get(offset + 3)?,
        avatar: row.get(offset + 4)?,
    }))
}

/// Trims and drops empty strings before they reach a nullable column.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::NaiveDate;
    use umbra_types::models::{Character, Role, User};

    use crate::Database;
    use crate::models::{NewCharacter, NewUser};

    pub fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    pub fn user(db: &Database, username: &str, role: Role) -> User {
        db.create_user(&NewUser {
            username,
            email: &format!("{username}@example.com"),
            password_hash: "hash",
            role,
        })
        .unwrap()
    }

    pub fn character(db: &Database, user_id: i64, first: &str, last: &str) -> Character {
        db.create_character(&NewCharacter {
            user_id,
            first_name: first,
            middle_name: None,
            last_name: last,
            birth_date: NaiveDate::from_ymd_opt(1900, 1, 1),
            school: Some("Bradavice"),
            description: None,
        })
        .unwrap()
    }
}
