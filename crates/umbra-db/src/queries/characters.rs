use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use umbra_types::api::{CharacterOwner, RoomRef, UpdateCharacterRequest};
use umbra_types::models::{Character, PresentCharacter};

use crate::Database;
use crate::models::NewCharacter;
use crate::queries::non_blank;

pub(crate) const CHARACTER_COLUMNS: &str = "c.id, c.user_id, c.first_name, c.middle_name, c.last_name, \
     c.birth_date, c.school, c.description, c.avatar, c.residence, c.character_history, \
     c.show_history_to_others, c.is_active, c.is_system, c.death_date, c.death_reason, c.killed_by, \
     c.created_at, c.updated_at";

const CHARACTER_COLUMN_COUNT: usize = 19;

/// Both names present, alive, not a system character.
const PLAYABLE: &str = "c.death_date IS NULL AND c.is_system = 0 \
     AND trim(c.first_name) != '' AND trim(c.last_name) != ''";

pub(crate) fn character_from_row(row: &Row<'_>) -> rusqlite::Result<Character> {
    Ok(Character {
        id: row.get(0)?,
        user_id: row.get(1)?,
        first_name: row.get(2)?,
        middle_name: row.get(3)?,
        last_name: row.get(4)?,
        birth_date: row.get(5)?,
        school: row.get(6)?,
        description: row.get(7)?,
        avatar: row.get(8)?,
        residence: row.get(9)?,
        character_history: row.get(10)?,
        show_history_to_others: row.get(11)?,
        is_active: row.get(12)?,
        is_system: row.get(13)?,
        death_date: row.get(14)?,
        death_reason: row.get(15)?,
        killed_by: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

impl Database {
    pub fn create_character(&self, new: &NewCharacter<'_>) -> Result<Character> {
        self.with_conn(|conn| insert_character(conn, new))
    }

    pub fn get_character(&self, id: i64) -> Result<Option<Character>> {
        self.with_conn(|conn| query_character(conn, id))
    }

    pub fn get_character_with_owner(&self, id: i64) -> Result<Option<(Character, CharacterOwner)>> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    &format!(
                        "SELECT {CHARACTER_COLUMNS}, u.username, u.email, u.last_login_at
                         FROM characters c JOIN users u ON u.id = c.user_id
                         WHERE c.id = ?1"
                    ),
                    [id],
                    |row| {
                        let owner = CharacterOwner {
                            username: row.get(CHARACTER_COLUMN_COUNT)?,
                            email: row.get(CHARACTER_COLUMN_COUNT + 1)?,
                            last_login_at: row.get(CHARACTER_COLUMN_COUNT + 2)?,
                        };
                        Ok((character_from_row(row)?, owner))
                    },
                )
                .optional()?;
            Ok(found)
        })
    }

    pub fn list_playable_characters_for_user(&self, user_id: i64) -> Result<Vec<Character>> {
        self.with_conn(|conn| {
            query_characters(
                conn,
                &format!("WHERE c.user_id = ?1 AND {PLAYABLE} ORDER BY c.created_at, c.id"),
                params![user_id],
            )
        })
    }

    pub fn list_playable_characters(&self) -> Result<Vec<Character>> {
        self.with_conn(|conn| {
            query_characters(
                conn,
                &format!("WHERE {PLAYABLE} ORDER BY c.first_name, c.last_name, c.id"),
                params![],
            )
        })
    }

    /// Dead characters, most recent death first.
    pub fn list_dead_characters(&self) -> Result<Vec<Character>> {
        self.with_conn(|conn| {
            query_characters(
                conn,
                "WHERE c.death_date IS NOT NULL ORDER BY c.death_date DESC, c.id DESC",
                params![],
            )
        })
    }

    pub fn system_character(&self) -> Result<Option<Character>> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    &format!(
                        "SELECT {CHARACTER_COLUMNS} FROM characters c
                         WHERE c.is_system = 1 ORDER BY c.id LIMIT 1"
                    ),
                    [],
                    character_from_row,
                )
                .optional()?;
            Ok(found)
        })
    }

    /// Applies the fields that are present; blank optional text clears the column.
    pub fn update_character(&self, id: i64, update: &UpdateCharacterRequest) -> Result<Option<Character>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE characters SET
                    first_name = COALESCE(?1, first_name),
                    middle_name = CASE WHEN ?2 IS NULL THEN middle_name ELSE NULLIF(trim(?2), '') END,
                    last_name = COALESCE(?3, last_name),
                    birth_date = COALESCE(?4, birth_date),
                    school = COALESCE(?5, school),
                    description = COALESCE(?6, description),
                    avatar = CASE WHEN ?7 IS NULL THEN avatar ELSE NULLIF(trim(?7), '') END,
                    residence = COALESCE(?8, residence),
                    character_history = COALESCE(?9, character_history),
                    show_history_to_others = COALESCE(?10, show_history_to_others),
                    updated_at = ?11
                 WHERE id = ?12",
                params![
                    non_blank(update.first_name.as_deref()),
                    update.middle_name,
                    non_blank(update.last_name.as_deref()),
                    update.birth_date,
                    update.school,
                    update.description,
                    update.avatar,
                    update.residence,
                    update.character_history,
                    update.show_history_to_others,
                    Utc::now(),
                    id,
                ],
            )?;
            query_character(conn, id)
        })
    }

    pub fn update_character_history(
        &self,
        id: i64,
        history: Option<&str>,
        show_to_others: Option<bool>,
    ) -> Result<Option<Character>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE characters SET
                    character_history = ?1,
                    show_history_to_others = COALESCE(?2, show_history_to_others),
                    updated_at = ?3
                 WHERE id = ?4",
                params![history, show_to_others, Utc::now(), id],
            )?;
            query_character(conn, id)
        })
    }

    pub fn kill_character(&self, id: i64, reason: &str, killed_by: i64) -> Result<Option<Character>> {
        self.with_conn(|conn| {
            let now = Utc::now();
            conn.execute(
                "UPDATE characters SET death_date = ?1, death_reason = ?2, killed_by = ?3,
                    is_active = 0, updated_at = ?1
                 WHERE id = ?4",
                params![now, reason, killed_by, id],
            )?;
            conn.execute(
                "UPDATE room_presence SET is_online = 0 WHERE character_id = ?1",
                [id],
            )?;
            query_character(conn, id)
        })
    }

    pub fn revive_character(&self, id: i64) -> Result<Option<Character>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE characters SET death_date = NULL, death_reason = NULL, killed_by = NULL,
                    is_active = 1, updated_at = ?1
                 WHERE id = ?2",
                params![Utc::now(), id],
            )?;
            query_character(conn, id)
        })
    }

    /// Room of the character's latest message, archived rooms excluded.
    pub fn last_chat_room(&self, character_id: i64) -> Result<Option<RoomRef>> {
        self.with_conn(|conn| {
            let room = conn
                .query_row(
                    "SELECT r.id, r.name
                     FROM chat_messages m JOIN chat_rooms r ON r.id = m.room_id
                     WHERE m.character_id = ?1
                     ORDER BY m.created_at DESC, m.id DESC
                     LIMIT 1",
                    [character_id],
                    |row| {
                        Ok(RoomRef {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(room)
        })
    }

    /// Living characters with an online room presence, most recently active first.
    pub fn list_present_characters(&self) -> Result<Vec<PresentCharacter>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHARACTER_COLUMNS}, r.id, r.name
                 FROM room_presence p
                 JOIN characters c ON c.id = p.character_id
                 JOIN chat_rooms r ON r.id = p.room_id
                 WHERE p.is_online = 1 AND c.death_date IS NULL
                 ORDER BY p.last_active_at DESC"
            ))?;
            let present = stmt
                .query_map([], |row| {
                    Ok(PresentCharacter {
                        character: character_from_row(row)?,
                        room_id: row.get(CHARACTER_COLUMN_COUNT)?,
                        room_name: row.get(CHARACTER_COLUMN_COUNT + 1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(present)
        })
    }
}

pub(crate) fn insert_character(conn: &Connection, new: &NewCharacter<'_>) -> Result<Character> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO characters
            (user_id, first_name, middle_name, last_name, birth_date, school, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            new.user_id,
            new.first_name.trim(),
            non_blank(new.middle_name),
            new.last_name.trim(),
            new.birth_date,
            new.school,
            new.description,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    query_character(conn, id)?.ok_or_else(|| anyhow::anyhow!("Character {} vanished after insert", id))
}

pub(crate) fn query_character(conn: &Connection, id: i64) -> Result<Option<Character>> {
    let found = conn
        .query_row(
            &format!("SELECT {CHARACTER_COLUMNS} FROM characters c WHERE c.id = ?1"),
            [id],
            character_from_row,
        )
        .optional()?;
    Ok(found)
}

fn query_characters(conn: &Connection, tail: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Character>> {
    let mut stmt = conn.prepare(&format!("SELECT {CHARACTER_COLUMNS} FROM characters c {tail}"))?;
    let characters = stmt
        .query_map(params, character_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(characters)
}
