use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use umbra_types::models::OwlPostMessage;

use crate::Database;
use crate::queries::{summary_columns, summary_from_row};

fn owl_post_from_row(row: &Row<'_>) -> rusqlite::Result<OwlPostMessage> {
    Ok(OwlPostMessage {
        id: row.get(0)?,
        sender_character_id: row.get(1)?,
        recipient_character_id: row.get(2)?,
        subject: row.get(3)?,
        content: row.get(4)?,
        is_read: row.get(5)?,
        sent_at: row.get(6)?,
        read_at: row.get(7)?,
        sender: summary_from_row(row, 8)?,
        recipient: summary_from_row(row, 13)?,
    })
}

fn owl_post_select() -> String {
    format!(
        "SELECT o.id, o.sender_character_id, o.recipient_character_id, o.subject, o.content,
                o.is_read, o.sent_at, o.read_at, {}, {}
         FROM owl_post_messages o
         LEFT JOIN characters s ON s.id = o.sender_character_id
         LEFT JOIN characters r ON r.id = o.recipient_character_id",
        summary_columns("s"),
        summary_columns("r")
    )
}

impl Database {
    pub fn send_owl_post(
        &self,
        sender_character_id: i64,
        recipient_character_id: i64,
        subject: &str,
        content: &str,
    ) -> Result<OwlPostMessage> {
        self.with_conn(|conn| insert_owl_post(conn, sender_character_id, recipient_character_id, subject, content))
    }

    pub fn get_owl_post(&self, id: i64) -> Result<Option<OwlPostMessage>> {
        self.with_conn(|conn| query_owl_post(conn, id))
    }

    /// Received messages, newest first.
    pub fn owl_post_inbox(&self, character_id: i64) -> Result<Vec<OwlPostMessage>> {
        self.with_conn(|conn| query_owl_posts(conn, "o.recipient_character_id = ?1", character_id))
    }

    /// Sent messages, newest first.
    pub fn owl_post_sent(&self, character_id: i64) -> Result<Vec<OwlPostMessage>> {
        self.with_conn(|conn| query_owl_posts(conn, "o.sender_character_id = ?1", character_id))
    }

    pub fn owl_post_unread_count(&self, character_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM owl_post_messages WHERE recipient_character_id = ?1 AND is_read = 0",
                [character_id],
                |r| r.get(0),
            )?;
            Ok(count)
        })
    }

    /// Unread messages across every character the user owns.
    pub fn owl_post_unread_total(&self, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM owl_post_messages o
                 JOIN characters c ON c.id = o.recipient_character_id
                 WHERE c.user_id = ?1 AND o.is_read = 0",
                [user_id],
                |r| r.get(0),
            )?;
            Ok(count)
        })
    }

    /// Only the recipient can mark a message read. Returns false otherwise.
    pub fn mark_owl_post_read(&self, id: i64, character_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE owl_post_messages
                 SET is_read = 1, read_at = COALESCE(read_at, ?3)
                 WHERE id = ?1 AND recipient_character_id = ?2",
                params![id, character_id, Utc::now()],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_owl_post(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM owl_post_messages WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }
}

pub(crate) fn insert_owl_post(
    conn: &Connection,
    sender_character_id: i64,
    recipient_character_id: i64,
    subject: &str,
    content: &str,
) -> Result<OwlPostMessage> {
    conn.execute(
        "INSERT INTO owl_post_messages (sender_character_id, recipient_character_id, subject, content, sent_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![sender_character_id, recipient_character_id, subject, content, Utc::now()],
    )?;
    let id = conn.last_insert_rowid();
    query_owl_post(conn, id)?.ok_or_else(|| anyhow::anyhow!("Owl post {} vanished after insert", id))
}

fn query_owl_post(conn: &Connection, id: i64) -> Result<Option<OwlPostMessage>> {
    let found = conn
        .query_row(&format!("{} WHERE o.id = ?1", owl_post_select()), [id], owl_post_from_row)
        .optional()?;
    Ok(found)
}

fn query_owl_posts(conn: &Connection, filter: &str, character_id: i64) -> Result<Vec<OwlPostMessage>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE {filter} ORDER BY o.sent_at DESC, o.id DESC",
        owl_post_select()
    ))?;
    let messages = stmt
        .query_map([character_id], owl_post_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use umbra_types::models::Role;

    use super::*;
    use crate::queries::test_support::{character, db, user};

    #[test]
    fn only_recipient_marks_read() {
        let db = db();
        let u = user(&db, "newt", Role::User);
        let newt = character(&db, u.id, "Newt", "Scamander");
        let tina = character(&db, u.id, "Tina", "Goldstein");

        let sent = db.send_owl_post(newt.id, tina.id, "Ahoj", "Sejdeme se v Londýně").unwrap();
        assert_eq!(sent.sender.as_ref().unwrap().first_name, "Newt");
        assert_eq!(sent.recipient.as_ref().unwrap().first_name, "Tina");

        assert_eq!(db.owl_post_unread_count(tina.id).unwrap(), 1);
        assert_eq!(db.owl_post_unread_total(u.id).unwrap(), 1);

        assert!(!db.mark_owl_post_read(sent.id, newt.id).unwrap());
        assert!(db.mark_owl_post_read(sent.id, tina.id).unwrap());
        assert_eq!(db.owl_post_unread_count(tina.id).unwrap(), 0);

        assert_eq!(db.owl_post_inbox(tina.id).unwrap().len(), 1);
        assert_eq!(db.owl_post_sent(newt.id).unwrap().len(), 1);
        assert!(db.owl_post_inbox(newt.id).unwrap().is_empty());

        assert!(db.delete_owl_post(sent.id).unwrap());
        assert!(db.get_owl_post(sent.id).unwrap().is_none());
    }
}
