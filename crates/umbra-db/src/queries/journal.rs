use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use umbra_types::api::JournalEntryInput;
use umbra_types::models::JournalEntry;

use crate::Database;

const ENTRY_COLUMNS: &str = "id, character_id, title, content, entry_date, is_private, created_at, updated_at";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<JournalEntry> {
    Ok(JournalEntry {
        id: row.get(0)?,
        character_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        entry_date: row.get(4)?,
        is_private: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl Database {
    /// Entries by in-game date, newest first; undated entries sort by creation.
    pub fn list_journal(&self, character_id: i64) -> Result<Vec<JournalEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM journal_entries
                 WHERE character_id = ?1
                 ORDER BY COALESCE(entry_date, created_at) DESC, id DESC"
            ))?;
            let entries = stmt
                .query_map([character_id], entry_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
    }

    /// `content` must already be validated as present.
    pub fn create_journal_entry(
        &self,
        character_id: i64,
        content: &str,
        input: &JournalEntryInput,
    ) -> Result<JournalEntry> {
        self.with_conn(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO journal_entries
                    (character_id, title, content, entry_date, is_private, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    character_id,
                    input.title,
                    content,
                    input.entry_date,
                    input.is_private.unwrap_or(true),
                    now,
                ],
            )?;
            let id = conn.last_insert_rowid();
            query_entry(conn, id)?.ok_or_else(|| anyhow::anyhow!("Journal entry {} vanished after insert", id))
        })
    }

    pub fn get_journal_entry(&self, id: i64) -> Result<Option<JournalEntry>> {
        self.with_conn(|conn| query_entry(conn, id))
    }

    pub fn update_journal_entry(&self, id: i64, input: &JournalEntryInput) -> Result<Option<JournalEntry>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE journal_entries SET
                    title = COALESCE(?1, title),
                    content = COALESCE(?2, content),
                    entry_date = COALESCE(?3, entry_date),
                    is_private = COALESCE(?4, is_private),
                    updated_at = ?5
                 WHERE id = ?6",
                params![
                    input.title,
                    input.content.as_deref().map(str::trim).filter(|c| !c.is_empty()),
                    input.entry_date,
                    input.is_private,
                    Utc::now(),
                    id
                ],
            )?;
            query_entry(conn, id)
        })
    }

    pub fn delete_journal_entry(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM journal_entries WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }
}

fn query_entry(conn: &Connection, id: i64) -> Result<Option<JournalEntry>> {
    let found = conn
        .query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE id = ?1"),
            [id],
            entry_from_row,
        )
        .optional()?;
    Ok(found)
}
