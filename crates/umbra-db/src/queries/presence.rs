use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, Row, params};
use umbra_types::models::RoomPresence;

use crate::Database;
use crate::queries::{summary_columns, summary_from_row};

fn presence_from_row(row: &Row<'_>) -> rusqlite::Result<RoomPresence> {
    let character = summary_from_row(row, 5)?.ok_or(rusqlite::Error::InvalidColumnType(
        5,
        "character_id".into(),
        rusqlite::types::Type::Null,
    ))?;

    Ok(RoomPresence {
        character_id: row.get(0)?,
        room_id: row.get(1)?,
        is_online: row.get(2)?,
        joined_at: row.get(3)?,
        last_active_at: row.get(4)?,
        character,
    })
}

impl Database {
    /// Marks the character as present in the room, creating the row on first entry.
    pub fn join_room_presence(&self, character_id: i64, room_id: i64) -> Result<RoomPresence> {
        self.with_conn(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO room_presence (character_id, room_id, is_online, joined_at, last_active_at)
                 VALUES (?1, ?2, 1, ?3, ?3)
                 ON CONFLICT(character_id, room_id) DO UPDATE SET
                    is_online = 1,
                    joined_at = CASE WHEN is_online = 1 THEN joined_at ELSE excluded.joined_at END,
                    last_active_at = excluded.last_active_at",
                params![character_id, room_id, now],
            )?;
            query_presence(conn, "p.character_id = ?1 AND p.room_id = ?2", params![character_id, room_id])?
                .pop()
                .ok_or_else(|| anyhow::anyhow!("Presence for character {} vanished", character_id))
        })
    }

    /// Returns false when the character had no presence row in the room.
    pub fn leave_room_presence(&self, character_id: i64, room_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE room_presence SET is_online = 0, last_active_at = ?3
                 WHERE character_id = ?1 AND room_id = ?2",
                params![character_id, room_id, Utc::now()],
            )?;
            Ok(changed > 0)
        })
    }

    /// Characters currently online in the room, earliest arrival first.
    pub fn list_room_presence(&self, room_id: i64) -> Result<Vec<RoomPresence>> {
        self.with_conn(|conn| {
            query_presence(
                conn,
                "p.room_id = ?1 AND p.is_online = 1 AND c.death_date IS NULL",
                params![room_id],
            )
        })
    }
}

fn query_presence(conn: &Connection, filter: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<RoomPresence>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT p.character_id, p.room_id, p.is_online, p.joined_at, p.last_active_at, {}
         FROM room_presence p
         JOIN characters c ON c.id = p.character_id
         WHERE {filter}
         ORDER BY p.joined_at, p.character_id",
        summary_columns("c")
    ))?;
    let presence = stmt
        .query_map(params, presence_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(presence)
}

#[cfg(test)]
mod tests {
    use umbra_types::models::Role;

    use super::*;
    use crate::models::NewRoom;
    use crate::queries::test_support::{character, db, user};

    #[test]
    fn join_and_leave_toggle_online_flag() {
        let db = db();
        let u = user(&db, "newt", Role::User);
        let c = character(&db, u.id, "Newt", "Scamander");
        let area = db.create_category("Příčná ulice", None, None, None).unwrap();
        let room = db
            .create_room(&NewRoom {
                name: "Děravý kotel",
                description: None,
                long_description: None,
                category_id: area.id,
                password: None,
                is_public: true,
                sort_order: None,
            })
            .unwrap();

        let joined = db.join_room_presence(c.id, room.id).unwrap();
        assert!(joined.is_online);
        assert_eq!(joined.character.first_name, "Newt");
        // Joining twice keeps a single row
        db.join_room_presence(c.id, room.id).unwrap();
        assert_eq!(db.list_room_presence(room.id).unwrap().len(), 1);

        let present = db.list_present_characters().unwrap();
        assert_eq!(present[0].room_name, "Děravý kotel");

        assert!(db.leave_room_presence(c.id, room.id).unwrap());
        assert!(db.list_room_presence(room.id).unwrap().is_empty());
        assert!(!db.leave_room_presence(c.id, room.id + 1).unwrap());
    }
}
