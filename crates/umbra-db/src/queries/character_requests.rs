use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use umbra_types::models::{Character, CharacterRequest, RequestStatus, UserSummary};

use crate::Database;
use crate::models::{NewCharacter, NewCharacterRequest, ReviewOutcome};
use crate::queries::{characters, non_blank, parse_column};

const REQUEST_SELECT: &str = "SELECT r.id, r.user_id, r.first_name, r.middle_name, r.last_name, r.birth_date,
        r.school, r.description, r.reason, r.status, r.review_note, r.reviewed_by, r.reviewed_at,
        r.created_at, u.username
     FROM character_requests r
     LEFT JOIN users u ON u.id = r.user_id";

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<CharacterRequest> {
    let user_id: i64 = row.get(1)?;
    let username: Option<String> = row.get(14)?;

    Ok(CharacterRequest {
        id: row.get(0)?,
        user_id,
        first_name: row.get(2)?,
        middle_name: row.get(3)?,
        last_name: row.get(4)?,
        birth_date: row.get(5)?,
        school: row.get(6)?,
        description: row.get(7)?,
        reason: row.get(8)?,
        status: parse_column(row, 9)?,
        review_note: row.get(10)?,
        reviewed_by: row.get(11)?,
        reviewed_at: row.get(12)?,
        created_at: row.get(13)?,
        user: username.map(|username| UserSummary { id: user_id, username }),
    })
}

impl Database {
    pub fn create_character_request(&self, new: &NewCharacterRequest<'_>) -> Result<CharacterRequest> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO character_requests
                    (user_id, first_name, middle_name, last_name, birth_date, school, description, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    new.user_id,
                    new.first_name.trim(),
                    non_blank(new.middle_name),
                    new.last_name.trim(),
                    new.birth_date,
                    new.school,
                    non_blank(new.description),
                    new.reason,
                    Utc::now(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            query_request(conn, id)?.ok_or_else(|| anyhow::anyhow!("Character request {} vanished after insert", id))
        })
    }

    pub fn list_character_requests_for_user(&self, user_id: i64) -> Result<Vec<CharacterRequest>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{REQUEST_SELECT} WHERE r.user_id = ?1 ORDER BY r.created_at DESC, r.id DESC"
            ))?;
            let requests = stmt
                .query_map([user_id], request_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(requests)
        })
    }

    pub fn list_character_requests(&self) -> Result<Vec<CharacterRequest>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{REQUEST_SELECT} ORDER BY r.created_at DESC, r.id DESC"
            ))?;
            let requests = stmt
                .query_map([], request_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(requests)
        })
    }

    /// Marks the request approved and creates the character for its owner.
    pub fn approve_character_request(
        &self,
        id: i64,
        reviewer_id: i64,
        review_note: Option<&str>,
    ) -> Result<ReviewOutcome<(CharacterRequest, Character)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(request) = query_request(&tx, id)? else {
                return Ok(ReviewOutcome::NotFound);
            };
            if request.status != RequestStatus::Pending {
                return Ok(ReviewOutcome::NotPending);
            }

            mark_reviewed(&tx, id, RequestStatus::Approved, reviewer_id, review_note)?;
            let character = characters::insert_character(
                &tx,
                &NewCharacter {
                    user_id: request.user_id,
                    first_name: &request.first_name,
                    middle_name: request.middle_name.as_deref(),
                    last_name: &request.last_name,
                    birth_date: Some(request.birth_date),
                    school: Some(&request.school),
                    description: request.description.as_deref(),
                },
            )?;
            let request = query_request(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("Character request {} vanished during review", id))?;

            tx.commit()?;
            Ok(ReviewOutcome::Done((request, character)))
        })
    }

    pub fn reject_character_request(
        &self,
        id: i64,
        reviewer_id: i64,
        review_note: &str,
    ) -> Result<ReviewOutcome<CharacterRequest>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(request) = query_request(&tx, id)? else {
                return Ok(ReviewOutcome::NotFound);
            };
            if request.status != RequestStatus::Pending {
                return Ok(ReviewOutcome::NotPending);
            }

            mark_reviewed(&tx, id, RequestStatus::Rejected, reviewer_id, Some(review_note))?;
            let request = query_request(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("Character request {} vanished during review", id))?;

            tx.commit()?;
            Ok(ReviewOutcome::Done(request))
        })
    }
}

fn mark_reviewed(
    conn: &Connection,
    id: i64,
    status: RequestStatus,
    reviewer_id: i64,
    review_note: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE character_requests
         SET status = ?1, reviewed_by = ?2, reviewed_at = ?3, review_note = ?4
         WHERE id = ?5",
        params![status.as_str(), reviewer_id, Utc::now(), review_note, id],
    )?;
    Ok(())
}

fn query_request(conn: &Connection, id: i64) -> Result<Option<CharacterRequest>> {
    let found = conn
        .query_row(&format!("{REQUEST_SELECT} WHERE r.id = ?1"), [id], request_from_row)
        .optional()?;
    Ok(found)
}
