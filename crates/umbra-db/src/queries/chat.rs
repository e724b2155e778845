use std::collections::HashSet;

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use umbra_types::api::{MoveDirection, UpdateCategoryRequest, UpdateRoomRequest};
use umbra_types::models::{ChatCategory, ChatMessage, ChatRoom, MessageType};

use crate::Database;
use crate::models::{DeleteCategoryOutcome, NewRoom, UpdateCategoryOutcome};
use crate::queries::{non_blank, parse_column, summary_columns, summary_from_row};

const CATEGORY_COLUMNS: &str = "id, name, description, parent_id, sort_order, created_at";

const ROOM_COLUMNS: &str =
    "id, name, description, long_description, category_id, password, is_public, sort_order, created_at";

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<ChatCategory> {
    Ok(ChatCategory {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        parent_id: row.get(3)?,
        sort_order: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRoom> {
    let password: Option<String> = row.get(5)?;
    Ok(ChatRoom {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        long_description: row.get(3)?,
        category_id: row.get(4)?,
        has_password: password.as_deref().is_some_and(|p| !p.is_empty()),
        password,
        is_public: row.get(6)?,
        sort_order: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        room_id: row.get(1)?,
        character_id: row.get(2)?,
        user_id: row.get(3)?,
        content: row.get(4)?,
        message_type: parse_column(row, 5)?,
        created_at: row.get(6)?,
        character: summary_from_row(row, 7)?,
    })
}

impl Database {
    // -- Categories --

    /// All categories ordered by sort order, then id.
    pub fn list_categories(&self) -> Result<Vec<ChatCategory>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CATEGORY_COLUMNS} FROM chat_categories ORDER BY sort_order, id"
            ))?;
            let categories = stmt
                .query_map([], category_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(categories)
        })
    }

    pub fn get_category(&self, id: i64) -> Result<Option<ChatCategory>> {
        self.with_conn(|conn| query_category(conn, id))
    }

    pub fn find_category_by_name(&self, name: &str) -> Result<Option<ChatCategory>> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    &format!(
                        "SELECT {CATEGORY_COLUMNS} FROM chat_categories
                         WHERE name = ?1 ORDER BY id LIMIT 1"
                    ),
                    [name],
                    category_from_row,
                )
                .optional()?;
            Ok(found)
        })
    }

    /// Without an explicit sort order the category goes after its last sibling.
    pub fn create_category(
        &self,
        name: &str,
        description: Option<&str>,
        parent_id: Option<i64>,
        sort_order: Option<i64>,
    ) -> Result<ChatCategory> {
        self.with_conn(|conn| {
            let sort_order = match sort_order {
                Some(order) => order,
                None => next_sort_order(conn, "chat_categories", "parent_id", parent_id)?,
            };
            conn.execute(
                "INSERT INTO chat_categories (name, description, parent_id, sort_order, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![name, non_blank(description), parent_id, sort_order, Utc::now()],
            )?;
            let id = conn.last_insert_rowid();
            query_category(conn, id)?.ok_or_else(|| anyhow::anyhow!("Category {} vanished after insert", id))
        })
    }

    /// Applies a partial update. A parent change is refused when the parent is
    /// unknown or when it would make the category its own ancestor.
    pub fn update_category(&self, id: i64, update: &UpdateCategoryRequest) -> Result<UpdateCategoryOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_category(&tx, id)?.is_none() {
                return Ok(UpdateCategoryOutcome::NotFound);
            }

            if let Some(Some(parent_id)) = update.parent_id {
                if query_category(&tx, parent_id)?.is_none() {
                    return Ok(UpdateCategoryOutcome::UnknownParent);
                }
                if is_ancestor_or_self(&tx, id, parent_id)? {
                    return Ok(UpdateCategoryOutcome::ParentCycle);
                }
            }

            tx.execute(
                "UPDATE chat_categories SET
                    name = COALESCE(?1, name),
                    description = COALESCE(?2, description),
                    parent_id = CASE WHEN ?3 THEN ?4 ELSE parent_id END
                 WHERE id = ?5",
                params![
                    non_blank(update.name.as_deref()),
                    update.description,
                    update.parent_id.is_some(),
                    update.parent_id.flatten(),
                    id
                ],
            )?;
            let category = query_category(&tx, id)?;
            tx.commit()?;

            Ok(category.map_or(UpdateCategoryOutcome::NotFound, UpdateCategoryOutcome::Updated))
        })
    }

    /// Refuses to delete a category that still holds areas or rooms.
    pub fn delete_category(&self, id: i64) -> Result<DeleteCategoryOutcome> {
        self.with_conn(|conn| {
            if query_category(conn, id)?.is_none() {
                return Ok(DeleteCategoryOutcome::NotFound);
            }

            let occupied: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM chat_categories WHERE parent_id = ?1)
                     OR EXISTS(SELECT 1 FROM chat_rooms WHERE category_id = ?1)",
                [id],
                |r| r.get(0),
            )?;
            if occupied {
                return Ok(DeleteCategoryOutcome::NotEmpty);
            }

            conn.execute("DELETE FROM chat_categories WHERE id = ?1", [id])?;
            Ok(DeleteCategoryOutcome::Deleted)
        })
    }

    pub fn set_category_sort_order(&self, id: i64, sort_order: i64) -> Result<Option<ChatCategory>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE chat_categories SET sort_order = ?1 WHERE id = ?2",
                params![sort_order, id],
            )?;
            query_category(conn, id)
        })
    }

    pub fn move_category(&self, id: i64, direction: MoveDirection) -> Result<Option<ChatCategory>> {
        self.with_conn_mut(|conn| {
            swap_with_sibling(conn, "chat_categories", "parent_id", id, direction)?;
            query_category(conn, id)
        })
    }

    // -- Rooms --

    pub fn list_rooms(&self) -> Result<Vec<ChatRoom>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ROOM_COLUMNS} FROM chat_rooms ORDER BY sort_order, id"
            ))?;
            let rooms = stmt
                .query_map([], room_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rooms)
        })
    }

    pub fn get_room(&self, id: i64) -> Result<Option<ChatRoom>> {
        self.with_conn(|conn| query_room(conn, id))
    }

    pub fn find_room_in_category(&self, category_id: i64, name: &str) -> Result<Option<ChatRoom>> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    &format!(
                        "SELECT {ROOM_COLUMNS} FROM chat_rooms
                         WHERE category_id = ?1 AND name = ?2 ORDER BY id LIMIT 1"
                    ),
                    params![category_id, name],
                    room_from_row,
                )
                .optional()?;
            Ok(found)
        })
    }

    pub fn create_room(&self, new: &NewRoom<'_>) -> Result<ChatRoom> {
        self.with_conn(|conn| {
            let sort_order = match new.sort_order {
                Some(order) => order,
                None => next_sort_order(conn, "chat_rooms", "category_id", Some(new.category_id))?,
            };
            conn.execute(
                "INSERT INTO chat_rooms
                    (name, description, long_description, category_id, password, is_public, sort_order, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    new.name,
                    non_blank(new.description),
                    non_blank(new.long_description),
                    new.category_id,
                    non_blank(new.password),
                    new.is_public,
                    sort_order,
                    Utc::now(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            query_room(conn, id)?.ok_or_else(|| anyhow::anyhow!("Room {} vanished after insert", id))
        })
    }

    /// An empty password clears it; an absent one leaves it unchanged.
    pub fn update_room(&self, id: i64, update: &UpdateRoomRequest) -> Result<Option<ChatRoom>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE chat_rooms SET
                    name = COALESCE(?1, name),
                    description = COALESCE(?2, description),
                    long_description = COALESCE(?3, long_description),
                    category_id = COALESCE(?4, category_id),
                    password = CASE WHEN ?5 IS NULL THEN password ELSE NULLIF(?5, '') END,
                    is_public = COALESCE(?6, is_public)
                 WHERE id = ?7",
                params![
                    non_blank(update.name.as_deref()),
                    update.description,
                    update.long_description,
                    update.category_id,
                    update.password,
                    update.is_public,
                    id
                ],
            )?;
            query_room(conn, id)
        })
    }

    pub fn delete_room(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            // Messages and presence go with the room; archives are kept
            tx.execute("DELETE FROM chat_messages WHERE room_id = ?1", [id])?;
            tx.execute("DELETE FROM room_presence WHERE room_id = ?1", [id])?;
            let deleted = tx.execute("DELETE FROM chat_rooms WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(deleted > 0)
        })
    }

    pub fn set_room_sort_order(&self, id: i64, sort_order: i64) -> Result<Option<ChatRoom>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE chat_rooms SET sort_order = ?1 WHERE id = ?2",
                params![sort_order, id],
            )?;
            query_room(conn, id)
        })
    }

    pub fn move_room(&self, id: i64, direction: MoveDirection) -> Result<Option<ChatRoom>> {
        self.with_conn_mut(|conn| {
            swap_with_sibling(conn, "chat_rooms", "category_id", id, direction)?;
            query_room(conn, id)
        })
    }

    // -- Messages --

    pub fn insert_chat_message(
        &self,
        room_id: i64,
        character_id: Option<i64>,
        user_id: i64,
        content: &str,
        message_type: MessageType,
    ) -> Result<ChatMessage> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_messages (room_id, character_id, user_id, content, message_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![room_id, character_id, user_id, content, message_type.as_str(), Utc::now()],
            )?;
            let id = conn.last_insert_rowid();
            let message = conn.query_row(
                &format!("{} WHERE m.id = ?1", message_select()),
                [id],
                message_from_row,
            )?;
            Ok(message)
        })
    }

    /// The latest `limit` messages of a room in chronological order.
    pub fn list_chat_messages(&self, room_id: i64, limit: u32) -> Result<Vec<ChatMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE m.room_id = ?1 ORDER BY m.created_at DESC, m.id DESC LIMIT ?2",
                message_select()
            ))?;
            let mut messages = stmt
                .query_map(params![room_id, limit], message_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            messages.reverse();
            Ok(messages)
        })
    }

    /// Moves every message of the room into the archive. Returns how many moved.
    pub fn archive_room_messages(&self, room_id: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO archived_messages
                    (original_id, room_id, character_id, user_id, content, message_type, created_at, archived_at)
                 SELECT id, room_id, character_id, user_id, content, message_type, created_at, ?2
                 FROM chat_messages WHERE room_id = ?1",
                params![room_id, Utc::now()],
            )?;
            let moved = tx.execute("DELETE FROM chat_messages WHERE room_id = ?1", [room_id])?;
            tx.commit()?;
            Ok(moved)
        })
    }

    pub fn clear_room_messages(&self, room_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM chat_messages WHERE room_id = ?1", [room_id])?;
            Ok(deleted)
        })
    }
}

fn message_select() -> String {
    format!(
        "SELECT m.id, m.room_id, m.character_id, m.user_id, m.content, m.message_type, m.created_at, {}
         FROM chat_messages m
         LEFT JOIN characters c ON c.id = m.character_id",
        summary_columns("c")
    )
}

fn query_category(conn: &Connection, id: i64) -> Result<Option<ChatCategory>> {
    let found = conn
        .query_row(
            &format!("SELECT {CATEGORY_COLUMNS} FROM chat_categories WHERE id = ?1"),
            [id],
            category_from_row,
        )
        .optional()?;
    Ok(found)
}

fn query_room(conn: &Connection, id: i64) -> Result<Option<ChatRoom>> {
    let found = conn
        .query_row(
            &format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE id = ?1"),
            [id],
            room_from_row,
        )
        .optional()?;
    Ok(found)
}

fn next_sort_order(conn: &Connection, table: &str, parent_column: &str, parent: Option<i64>) -> Result<i64> {
    let next = conn.query_row(
        &format!("SELECT COALESCE(MAX(sort_order), -1) + 1 FROM {table} WHERE {parent_column} IS ?1"),
        [parent],
        |r| r.get(0),
    )?;
    Ok(next)
}

/// Swaps sort orders with the neighbouring sibling in one transaction.
/// Does nothing at either edge or when the row does not exist.
fn swap_with_sibling(
    conn: &mut Connection,
    table: &str,
    parent_column: &str,
    id: i64,
    direction: MoveDirection,
) -> Result<()> {
    let tx = conn.transaction()?;

    let current: Option<(Option<i64>, i64)> = tx
        .query_row(
            &format!("SELECT {parent_column}, sort_order FROM {table} WHERE id = ?1"),
            [id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((parent, sort_order)) = current else {
        return Ok(());
    };

    let (cmp, order) = match direction {
        MoveDirection::Up => ("<", "DESC"),
        MoveDirection::Down => (">", "ASC"),
    };
    let neighbour: Option<(i64, i64)> = tx
        .query_row(
            &format!(
                "SELECT id, sort_order FROM {table}
                 WHERE {parent_column} IS ?1 AND id != ?2
                   AND (sort_order {cmp} ?3 OR (sort_order = ?3 AND id {cmp} ?2))
                 ORDER BY sort_order {order}, id {order}
                 LIMIT 1"
            ),
            params![parent, id, sort_order],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((neighbour_id, neighbour_order)) = neighbour else {
        return Ok(());
    };

    // Equal orders are separated so the swap is visible
    let (mine, theirs) = if neighbour_order == sort_order {
        match direction {
            MoveDirection::Up => (sort_order, sort_order + 1),
            MoveDirection::Down => (sort_order + 1, sort_order),
        }
    } else {
        (neighbour_order, sort_order)
    };

    let update = format!("UPDATE {table} SET sort_order = ?1 WHERE id = ?2");
    tx.execute(&update, params![mine, id])?;
    tx.execute(&update, params![theirs, neighbour_id])?;
    tx.commit()?;
    Ok(())
}

/// Walks up from `start` and reports whether `id` is on the chain.
fn is_ancestor_or_self(conn: &Connection, id: i64, start: i64) -> Result<bool> {
    let mut seen = HashSet::new();
    let mut current = Some(start);

    while let Some(category_id) = current {
        if category_id == id {
            return Ok(true);
        }
        if !seen.insert(category_id) {
            // Pre-existing loop that does not pass through `id`
            return Ok(false);
        }
        current = conn
            .query_row(
                "SELECT parent_id FROM chat_categories WHERE id = ?1",
                [category_id],
                |r| r.get::<_, Option<i64>>(0),
            )
            .optional()?
            .flatten();
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use umbra_types::models::Role;

    use super::*;
    use crate::queries::test_support::{character, db, user};

    fn room<'a>(category_id: i64, name: &'a str) -> NewRoom<'a> {
        NewRoom {
            name,
            description: None,
            long_description: None,
            category_id,
            password: None,
            is_public: true,
            sort_order: None,
        }
    }

    #[test]
    fn new_entries_go_after_their_siblings() {
        let db = db();
        let top = db.create_category("Londýn", None, None, None).unwrap();
        let second = db.create_category("Paříž", None, None, None).unwrap();
        assert_eq!(second.sort_order, top.sort_order + 1);

        let area = db.create_category("Příčná ulice", None, Some(top.id), None).unwrap();
        assert_eq!(area.sort_order, 0);

        let a = db.create_room(&room(area.id, "Děravý kotel")).unwrap();
        let b = db.create_room(&room(area.id, "Gringottovi")).unwrap();
        assert_eq!((a.sort_order, b.sort_order), (0, 1));
    }

    #[test]
    fn category_parent_changes_reject_cycles_and_unknown_parents() {
        let db = db();
        let london = db.create_category("Londýn", None, None, None).unwrap();
        let alley = db.create_category("Příčná ulice", None, Some(london.id), None).unwrap();
        let bank = db.create_category("Gringottovi", None, Some(alley.id), None).unwrap();

        let reparent = |parent: Option<Option<i64>>| UpdateCategoryRequest {
            parent_id: parent,
            ..Default::default()
        };

        assert!(matches!(
            db.update_category(london.id, &reparent(Some(Some(bank.id)))).unwrap(),
            UpdateCategoryOutcome::ParentCycle
        ));
        assert!(matches!(
            db.update_category(london.id, &reparent(Some(Some(london.id)))).unwrap(),
            UpdateCategoryOutcome::ParentCycle
        ));
        assert!(matches!(
            db.update_category(alley.id, &reparent(Some(Some(99_999)))).unwrap(),
            UpdateCategoryOutcome::UnknownParent
        ));
        assert!(matches!(
            db.update_category(99_999, &reparent(None)).unwrap(),
            UpdateCategoryOutcome::NotFound
        ));

        // Absent parent leaves it alone, explicit null clears it
        let UpdateCategoryOutcome::Updated(unchanged) = db.update_category(alley.id, &reparent(None)).unwrap() else {
            panic!("expected update");
        };
        assert_eq!(unchanged.parent_id, Some(london.id));

        let UpdateCategoryOutcome::Updated(top) = db.update_category(alley.id, &reparent(Some(None))).unwrap() else {
            panic!("expected update");
        };
        assert_eq!(top.parent_id, None);
    }

    #[test]
    fn move_swaps_with_neighbour_and_stops_at_edges() {
        let db = db();
        let area = db.create_category("Příčná ulice", None, None, None).unwrap();
        let a = db.create_room(&room(area.id, "A")).unwrap();
        let b = db.create_room(&room(area.id, "B")).unwrap();

        let moved = db.move_room(b.id, MoveDirection::Up).unwrap().unwrap();
        assert_eq!(moved.sort_order, a.sort_order);
        assert_eq!(db.get_room(a.id).unwrap().unwrap().sort_order, b.sort_order);

        // B is now first; moving it up again is a no-op
        let unchanged = db.move_room(b.id, MoveDirection::Up).unwrap().unwrap();
        assert_eq!(unchanged.sort_order, moved.sort_order);
    }

    #[test]
    fn non_empty_category_cannot_be_deleted() {
        let db = db();
        let top = db.create_category("Londýn", None, None, None).unwrap();
        let area = db.create_category("Příčná ulice", None, Some(top.id), None).unwrap();

        assert_eq!(db.delete_category(top.id).unwrap(), DeleteCategoryOutcome::NotEmpty);
        assert_eq!(db.delete_category(area.id).unwrap(), DeleteCategoryOutcome::Deleted);
        assert_eq!(db.delete_category(top.id).unwrap(), DeleteCategoryOutcome::Deleted);
        assert_eq!(db.delete_category(top.id).unwrap(), DeleteCategoryOutcome::NotFound);
    }

    #[test]
    fn messages_are_returned_oldest_first_and_archive_empties_room() {
        let db = db();
        let u = user(&db, "newt", Role::User);
        let c = character(&db, u.id, "Newt", "Scamander");
        let area = db.create_category("Příčná ulice", None, None, None).unwrap();
        let r = db.create_room(&room(area.id, "Děravý kotel")).unwrap();

        for text in ["one", "two", "three"] {
            db.insert_chat_message(r.id, Some(c.id), u.id, text, MessageType::Text).unwrap();
        }
        let narration = db.insert_chat_message(r.id, None, u.id, "mlha", MessageType::Narrator).unwrap();
        assert!(narration.character.is_none());

        let latest = db.list_chat_messages(r.id, 2).unwrap();
        assert_eq!(
            latest.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["three", "mlha"]
        );
        assert_eq!(latest[0].character.as_ref().unwrap().first_name, "Newt");

        assert_eq!(db.archive_room_messages(r.id).unwrap(), 4);
        assert!(db.list_chat_messages(r.id, 100).unwrap().is_empty());
    }

    #[test]
    fn room_password_can_be_cleared() {
        let db = db();
        let area = db.create_category("Obydlí", None, None, None).unwrap();
        let mut new = room(area.id, "Byt");
        new.password = Some("tajne");
        let r = db.create_room(&new).unwrap();
        assert!(r.has_password);

        let update = UpdateRoomRequest {
            password: Some(String::new()),
            ..Default::default()
        };
        let cleared = db.update_room(r.id, &update).unwrap().unwrap();
        assert!(!cleared.has_password);
        assert!(cleared.password.is_none());
    }
}
