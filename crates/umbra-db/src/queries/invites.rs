use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use umbra_types::models::InviteCode;

use crate::Database;

const INVITE_COLUMNS: &str = "id, code, is_used, used_by, created_by, used_at, created_at";

fn invite_from_row(row: &Row<'_>) -> rusqlite::Result<InviteCode> {
    Ok(InviteCode {
        id: row.get(0)?,
        code: row.get(1)?,
        is_used: row.get(2)?,
        used_by: row.get(3)?,
        created_by: row.get(4)?,
        used_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl Database {
    pub fn get_invite(&self, code: &str) -> Result<Option<InviteCode>> {
        self.with_conn(|conn| query_invite(conn, code))
    }

    /// Returns `None` when the code already exists.
    pub fn create_invite(&self, code: &str, created_by: Option<i64>) -> Result<Option<InviteCode>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO invite_codes (code, created_by, created_at) VALUES (?1, ?2, ?3)",
                params![code, created_by, Utc::now()],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            query_invite(conn, code)
        })
    }

    pub fn list_invites(&self) -> Result<Vec<InviteCode>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INVITE_COLUMNS} FROM invite_codes ORDER BY created_at DESC, id DESC"
            ))?;
            let invites = stmt
                .query_map([], invite_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(invites)
        })
    }
}

fn query_invite(conn: &Connection, code: &str) -> Result<Option<InviteCode>> {
    let found = conn
        .query_row(
            &format!("SELECT {INVITE_COLUMNS} FROM invite_codes WHERE code = ?1"),
            [code],
            invite_from_row,
        )
        .optional()?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::db;

    #[test]
    fn duplicate_codes_are_refused() {
        let db = db();
        assert!(db.create_invite("OWL-2024", None).unwrap().is_some());
        assert!(db.create_invite("OWL-2024", None).unwrap().is_none());
        assert_eq!(db.list_invites().unwrap().len(), 1);
    }
}
