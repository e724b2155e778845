use anyhow::Result;
use chrono::Utc;
use rusqlite::params;
use umbra_types::models::{AdminActivity, UserSummary};

use crate::Database;

impl Database {
    pub fn log_admin_action(
        &self,
        admin_id: i64,
        action: &str,
        target_user_id: Option<i64>,
        details: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO admin_activity_log (admin_id, action, target_user_id, details, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![admin_id, action, target_user_id, details, Utc::now()],
            )?;
            Ok(())
        })
    }

    /// Newest first.
    pub fn list_admin_activity(&self, limit: u32) -> Result<Vec<AdminActivity>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT l.id, l.action, l.details, l.created_at, a.id, a.username, t.id, t.username
                 FROM admin_activity_log l
                 JOIN users a ON a.id = l.admin_id
                 LEFT JOIN users t ON t.id = l.target_user_id
                 ORDER BY l.created_at DESC, l.id DESC
                 LIMIT ?1",
            )?;
            let entries = stmt
                .query_map([limit], |row| {
                    let target_id: Option<i64> = row.get(6)?;
                    let target_name: Option<String> = row.get(7)?;
                    Ok(AdminActivity {
                        id: row.get(0)?,
                        action: row.get(1)?,
                        details: row.get(2)?,
                        created_at: row.get(3)?,
                        admin: UserSummary {
                            id: row.get(4)?,
                            username: row.get(5)?,
                        },
                        target_user: target_id
                            .zip(target_name)
                            .map(|(id, username)| UserSummary { id, username }),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
    }
}

#[cfg(test)]
mod tests {
    use umbra_types::models::Role;

    use crate::queries::test_support::{db, user};

    #[test]
    fn log_joins_admin_and_target() {
        let db = db();
        let admin = user(&db, "albus", Role::Admin);
        let target = user(&db, "gellert", Role::User);

        db.log_admin_action(admin.id, "ban_user", Some(target.id), Some("Paříž")).unwrap();
        db.log_admin_action(admin.id, "reset_influence", None, None).unwrap();

        let log = db.list_admin_activity(10).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].action, "reset_influence");
        assert!(log[0].target_user.is_none());
        assert_eq!(log[1].target_user.as_ref().unwrap().username, "gellert");
        assert_eq!(log[1].admin.username, "albus");
    }
}
