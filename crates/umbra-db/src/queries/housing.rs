use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use umbra_types::models::{HousingRequest, UserSummary};

use crate::Database;
use crate::models::{HousingDecision, NewHousingRequest};
use crate::queries::{parse_column, summary_columns, summary_from_row};

fn housing_from_row(row: &Row<'_>) -> rusqlite::Result<HousingRequest> {
    let username: Option<String> = row.get(21)?;
    let user_id: i64 = row.get(1)?;

    Ok(HousingRequest {
        id: row.get(0)?,
        user_id,
        character_id: row.get(2)?,
        request_type: row.get(3)?,
        size: row.get(4)?,
        location: row.get(5)?,
        selected_area: row.get(6)?,
        housing_name: row.get(7)?,
        housing_password: row.get(8)?,
        description: row.get(9)?,
        status: parse_column(row, 10)?,
        assigned_address: row.get(11)?,
        review_note: row.get(12)?,
        reviewed_by: row.get(13)?,
        reviewed_at: row.get(14)?,
        created_at: row.get(15)?,
        character: summary_from_row(row, 16)?,
        user: username.map(|username| UserSummary { id: user_id, username }),
    })
}

fn housing_select() -> String {
    format!(
        "SELECT h.id, h.user_id, h.character_id, h.request_type, h.size, h.location, h.selected_area,
                h.housing_name, h.housing_password, h.description, h.status, h.assigned_address,
                h.review_note, h.reviewed_by, h.reviewed_at, h.created_at, {}, u.username
         FROM housing_requests h
         LEFT JOIN characters c ON c.id = h.character_id
         LEFT JOIN users u ON u.id = h.user_id",
        summary_columns("c")
    )
}

impl Database {
    pub fn create_housing_request(&self, new: &NewHousingRequest<'_>) -> Result<HousingRequest> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO housing_requests
                    (user_id, character_id, request_type, size, location, selected_area,
                     housing_name, housing_password, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    new.user_id,
                    new.character_id,
                    new.request_type,
                    new.size,
                    new.location,
                    new.selected_area,
                    new.housing_name,
                    new.housing_password,
                    new.description,
                    Utc::now(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            query_housing(conn, id)?.ok_or_else(|| anyhow::anyhow!("Housing request {} vanished after insert", id))
        })
    }

    pub fn get_housing_request(&self, id: i64) -> Result<Option<HousingRequest>> {
        self.with_conn(|conn| query_housing(conn, id))
    }

    pub fn list_housing_requests_for_user(&self, user_id: i64) -> Result<Vec<HousingRequest>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE h.user_id = ?1 ORDER BY h.created_at DESC, h.id DESC",
                housing_select()
            ))?;
            let requests = stmt
                .query_map([user_id], housing_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(requests)
        })
    }

    pub fn list_housing_requests(&self) -> Result<Vec<HousingRequest>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} ORDER BY h.created_at DESC, h.id DESC",
                housing_select()
            ))?;
            let requests = stmt
                .query_map([], housing_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(requests)
        })
    }

    pub fn delete_housing_request(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM housing_requests WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    /// Records the decision only while the request is still pending.
    /// Returns `None` when it was already decided.
    pub fn decide_housing_request(
        &self,
        id: i64,
        decision: &HousingDecision<'_>,
    ) -> Result<Option<HousingRequest>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE housing_requests SET
                    status = ?1,
                    assigned_address = COALESCE(?2, assigned_address),
                    review_note = ?3,
                    reviewed_by = ?4,
                    reviewed_at = ?5
                 WHERE id = ?6 AND status = 'pending'",
                params![
                    decision.status.as_str(),
                    decision.assigned_address,
                    decision.review_note,
                    decision.reviewer_id,
                    Utc::now(),
                    id,
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_housing(conn, id)
        })
    }
}

fn query_housing(conn: &Connection, id: i64) -> Result<Option<HousingRequest>> {
    let found = conn
        .query_row(&format!("{} WHERE h.id = ?1", housing_select()), [id], housing_from_row)
        .optional()?;
    Ok(found)
}
