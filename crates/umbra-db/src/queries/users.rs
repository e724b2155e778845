use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use umbra_types::models::{Role, User};

use crate::Database;
use crate::models::{NewCharacter, NewUser, RegisterOutcome, Registration, UserRow};
use crate::queries::{characters, parse_column};

pub(crate) const USER_COLUMNS: &str = "u.id, u.username, u.email, u.role, u.can_narrate, \
     u.narrator_reason, u.is_banned, u.ban_reason, u.banned_at, u.is_system, u.character_order, \
     u.highlight_words, u.highlight_color, u.narrator_color, u.created_at, u.last_login_at";

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let character_order: Option<String> = row.get(10)?;

    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        role: parse_column(row, 3)?,
        can_narrate: row.get(4)?,
        narrator_reason: row.get(5)?,
        is_banned: row.get(6)?,
        ban_reason: row.get(7)?,
        banned_at: row.get(8)?,
        is_system: row.get(9)?,
        // A malformed order is treated as unset rather than failing the whole row
        character_order: character_order.and_then(|raw| serde_json::from_str(&raw).ok()),
        highlight_words: row.get(11)?,
        highlight_color: row.get(12)?,
        narrator_color: row.get(13)?,
        created_at: row.get(14)?,
        last_login_at: row.get(15)?,
    })
}

impl Database {
    pub fn create_user(&self, new: &NewUser<'_>) -> Result<User> {
        self.with_conn(|conn| insert_user(conn, new.username, new.email, new.password_hash, new.role))
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    pub fn get_user_row(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_row(conn, "u.id = ?1", &id))
    }

    pub fn get_user_row_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_row(conn, "u.username = ?1", &username))
    }

    /// Creates the user, consumes the invite and creates the first character
    /// atomically. Nothing is written when the invite or the names are rejected.
    pub fn register_user(&self, reg: &Registration<'_>) -> Result<RegisterOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let invite_free: Option<bool> = tx
                .query_row(
                    "SELECT is_used = 0 FROM invite_codes WHERE code = ?1",
                    [reg.invite_code],
                    |r| r.get(0),
                )
                .optional()?;
            if invite_free != Some(true) {
                return Ok(RegisterOutcome::InvalidInvite);
            }

            if user_exists(&tx, reg.username, reg.email)? {
                return Ok(RegisterOutcome::UserExists);
            }

            let user = insert_user(&tx, reg.username, reg.email, reg.password_hash, Role::User)?;

            tx.execute(
                "UPDATE invite_codes SET is_used = 1, used_by = ?1, used_at = ?2 WHERE code = ?3",
                params![user.id, Utc::now(), reg.invite_code],
            )?;

            let character = characters::insert_character(
                &tx,
                &NewCharacter {
                    user_id: user.id,
                    first_name: reg.first_name,
                    middle_name: reg.middle_name,
                    last_name: reg.last_name,
                    birth_date: Some(reg.birth_date),
                    school: None,
                    description: None,
                },
            )?;

            tx.commit()?;
            Ok(RegisterOutcome::Created { user, character })
        })
    }

    pub fn touch_last_login(&self, id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_login_at = ?1 WHERE id = ?2",
                params![Utc::now(), id],
            )?;
            Ok(())
        })
    }

    pub fn update_password(&self, id: i64, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                params![password_hash, id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn list_users(&self, include_system: bool) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users u
                 WHERE ?1 OR u.is_system = 0
                 ORDER BY u.created_at DESC, u.id DESC"
            ))?;
            let users = stmt
                .query_map([include_system], user_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(users)
        })
    }

    pub fn set_user_role(&self, id: i64, role: Role) -> Result<Option<User>> {
        self.update_user(id, "role = ?1", &role.as_str())
    }

    pub fn set_narrator(&self, id: i64, can_narrate: bool, reason: Option<&str>) -> Result<Option<User>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET can_narrate = ?1, narrator_reason = ?2 WHERE id = ?3",
                params![can_narrate, reason, id],
            )?;
            query_user(conn, id)
        })
    }

    pub fn ban_user(&self, id: i64, reason: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET is_banned = 1, ban_reason = ?1, banned_at = ?2 WHERE id = ?3",
                params![reason, Utc::now(), id],
            )?;
            query_user(conn, id)
        })
    }

    pub fn update_character_order(&self, id: i64, order: &[i64]) -> Result<Option<User>> {
        let json = serde_json::to_string(order)?;
        self.update_user(id, "character_order = ?1", &json)
    }

    pub fn update_highlight_settings(
        &self,
        id: i64,
        words: Option<&str>,
        color: &str,
    ) -> Result<Option<User>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET highlight_words = ?1, highlight_color = ?2 WHERE id = ?3",
                params![words, color, id],
            )?;
            query_user(conn, id)
        })
    }

    pub fn update_narrator_color(&self, id: i64, color: &str) -> Result<Option<User>> {
        self.update_user(id, "narrator_color = ?1", &color)
    }

    fn update_user(&self, id: i64, assignment: &str, value: &dyn rusqlite::ToSql) -> Result<Option<User>> {
        self.with_conn(|conn| {
            conn.execute(
                &format!("UPDATE users SET {assignment} WHERE id = ?2"),
                params![value, id],
            )?;
            query_user(conn, id)
        })
    }
}

fn insert_user(
    conn: &Connection,
    username: &str,
    email: &str,
    password_hash: &str,
    role: Role,
) -> Result<User> {
    conn.execute(
        "INSERT INTO users (username, email, password_hash, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![username, email, password_hash, role.as_str(), Utc::now()],
    )?;
    let id = conn.last_insert_rowid();
    query_user(conn, id)?.ok_or_else(|| anyhow::anyhow!("User {} vanished after insert", id))
}

fn user_exists(conn: &Connection, username: &str, email: &str) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1 OR email = ?2)",
        [username, email],
        |r| r.get(0),
    )?;
    Ok(exists)
}

pub(crate) fn query_user(conn: &Connection, id: i64) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1"),
            [id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

fn query_user_row(conn: &Connection, filter: &str, value: &dyn rusqlite::ToSql) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS}, u.password_hash FROM users u WHERE {filter}"),
            [value],
            |row| {
                Ok(UserRow {
                    user: user_from_row(row)?,
                    password_hash: row.get(16)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::queries::test_support::{db, user};

    fn registration<'a>(username: &'a str, email: &'a str, invite: &'a str) -> Registration<'a> {
        Registration {
            username,
            email,
            password_hash: "hash",
            invite_code: invite,
            first_name: "Newt",
            middle_name: None,
            last_name: "Scamander",
            birth_date: NaiveDate::from_ymd_opt(1897, 2, 24).unwrap(),
        }
    }

    #[test]
    fn register_consumes_invite_once() {
        let db = db();
        db.create_invite("WELCOME", None).unwrap();

        let first = db.register_user(&registration("newt", "newt@example.com", "WELCOME")).unwrap();
        let RegisterOutcome::Created { user, character } = first else {
            panic!("first registration should succeed");
        };
        assert_eq!(character.user_id, user.id);
        assert_eq!(user.role, Role::User);

        let second = db.register_user(&registration("tina", "tina@example.com", "WELCOME")).unwrap();
        assert!(matches!(second, RegisterOutcome::InvalidInvite));
        assert!(db.get_user_row_by_username("tina").unwrap().is_none());
    }

    #[test]
    fn register_rejects_taken_email_and_keeps_invite() {
        let db = db();
        user(&db, "newt", Role::User);
        db.create_invite("WELCOME", None).unwrap();

        let outcome = db.register_user(&registration("other", "newt@example.com", "WELCOME")).unwrap();
        assert!(matches!(outcome, RegisterOutcome::UserExists));
        assert!(!db.get_invite("WELCOME").unwrap().unwrap().is_used);
    }

    #[test]
    fn settings_round_trip() {
        let db = db();
        let u = user(&db, "newt", Role::User);

        let updated = db.update_character_order(u.id, &[3, 1, 2]).unwrap().unwrap();
        assert_eq!(updated.character_order, Some(vec![3, 1, 2]));

        let updated = db.update_highlight_settings(u.id, Some("Newt"), "yellow").unwrap().unwrap();
        assert_eq!(updated.highlight_words.as_deref(), Some("Newt"));
        assert_eq!(updated.highlight_color.as_deref(), Some("yellow"));

        let banned = db.ban_user(u.id, "spam").unwrap().unwrap();
        assert!(banned.is_banned);
        assert!(banned.banned_at.is_some());
    }

    #[test]
    fn system_users_are_hidden_by_default() {
        let db = db();
        user(&db, "newt", Role::User);

        assert_eq!(db.list_users(false).unwrap().len(), 1);
        assert_eq!(db.list_users(true).unwrap().len(), 2);
    }
}
