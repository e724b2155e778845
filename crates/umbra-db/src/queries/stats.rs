use anyhow::Result;
use umbra_types::api::AdminStats;

use crate::Database;

impl Database {
    /// Counts for the admin dashboard. The live figures come from the
    /// in-memory tracker and the gateway.
    pub fn admin_stats(&self, online_now: usize, gateway_connections: usize) -> Result<AdminStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM users WHERE is_system = 0),
                    (SELECT COUNT(*) FROM users WHERE is_system = 0 AND role = 'admin'),
                    (SELECT COUNT(*) FROM characters WHERE is_system = 0 AND death_date IS NULL),
                    (SELECT COUNT(*) FROM characters WHERE is_system = 0 AND death_date IS NOT NULL),
                    (SELECT COUNT(*) FROM housing_requests WHERE status = 'pending')
                        + (SELECT COUNT(*) FROM character_requests WHERE status = 'pending')",
                [],
                |row| {
                    Ok(AdminStats {
                        total_users: row.get(0)?,
                        admin_users: row.get(1)?,
                        active_characters: row.get(2)?,
                        dead_characters: row.get(3)?,
                        online_now,
                        gateway_connections,
                        pending_requests: row.get(4)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }
}

#[cfg(test)]
mod tests {
    use umbra_types::models::Role;

    use crate::queries::test_support::{character, db, user};

    #[test]
    fn system_rows_are_not_counted() {
        let db = db();
        let admin = user(&db, "albus", Role::Admin);
        let u = user(&db, "newt", Role::User);
        character(&db, u.id, "Newt", "Scamander");
        let dead = character(&db, u.id, "Leta", "Lestrange");
        db.kill_character(dead.id, "Paříž", admin.id).unwrap();

        let stats = db.admin_stats(3, 2).unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.admin_users, 1);
        assert_eq!(stats.active_characters, 1);
        assert_eq!(stats.dead_characters, 1);
        assert_eq!(stats.online_now, 3);
        assert_eq!(stats.gateway_connections, 2);
        assert_eq!(stats.pending_requests, 0);
    }
}
