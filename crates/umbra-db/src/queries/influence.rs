use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, Row, params};
use umbra_types::models::{Faction, Influence, InfluenceHistoryEntry};

use crate::Database;

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<InfluenceHistoryEntry> {
    Ok(InfluenceHistoryEntry {
        id: row.get(0)?,
        change_type: row.get(1)?,
        points_changed: row.get(2)?,
        previous_total: row.get(3)?,
        new_total: row.get(4)?,
        reason: row.get(5)?,
        admin_user_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn faction_name(side: Faction) -> &'static str {
    match side {
        Faction::Grindelwald => "grindelwald",
        Faction::Dumbledore => "dumbledore",
    }
}

impl Database {
    pub fn get_influence(&self) -> Result<Influence> {
        self.with_conn(query_influence)
    }

    /// Newest entries first.
    pub fn influence_history(&self, limit: u32) -> Result<Vec<InfluenceHistoryEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, change_type, points_changed, previous_total, new_total, reason,
                        admin_user_id, created_at
                 FROM influence_history
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?1",
            )?;
            let entries = stmt
                .query_map([limit], history_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
    }

    /// Applies a signed change to one side (floored at zero) and records it.
    pub fn adjust_influence(
        &self,
        side: Faction,
        points: i64,
        reason: &str,
        admin_id: i64,
    ) -> Result<(Influence, InfluenceHistoryEntry)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let mut influence = query_influence(&tx)?;
            let (previous, new) = influence.adjust(side, points);
            influence.updated_at = Utc::now();

            store_influence(&tx, &influence)?;
            let entry = insert_history(&tx, faction_name(side), points, previous, new, reason, admin_id)?;

            tx.commit()?;
            Ok((influence, entry))
        })
    }

    /// Sets both sides to `points` and records a `reset` entry.
    pub fn reset_influence(&self, points: i64, admin_id: i64) -> Result<Influence> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let previous = query_influence(&tx)?;
            let influence = Influence {
                grindelwald_points: points,
                dumbledore_points: points,
                updated_at: Utc::now(),
            };
            store_influence(&tx, &influence)?;

            let previous_total = previous.grindelwald_points.saturating_add(previous.dumbledore_points);
            let new_total = points.saturating_mul(2);
            insert_history(
                &tx,
                "reset",
                new_total.saturating_sub(previous_total),
                previous_total,
                new_total,
                &format!("Reset to {points}:{points}"),
                admin_id,
            )?;

            tx.commit()?;
            Ok(influence)
        })
    }
}

fn query_influence(conn: &Connection) -> Result<Influence> {
    let influence = conn.query_row(
        "SELECT grindelwald_points, dumbledore_points, updated_at FROM influence_bar WHERE id = 1",
        [],
        |row| {
            Ok(Influence {
                grindelwald_points: row.get(0)?,
                dumbledore_points: row.get(1)?,
                updated_at: row.get(2)?,
            })
        },
    )?;
    Ok(influence)
}

fn store_influence(conn: &Connection, influence: &Influence) -> Result<()> {
    conn.execute(
        "UPDATE influence_bar SET grindelwald_points = ?1, dumbledore_points = ?2, updated_at = ?3 WHERE id = 1",
        params![influence.grindelwald_points, influence.dumbledore_points, influence.updated_at],
    )?;
    Ok(())
}

fn insert_history(
    conn: &Connection,
    change_type: &str,
    points_changed: i64,
    previous_total: i64,
    new_total: i64,
    reason: &str,
    admin_id: i64,
) -> Result<InfluenceHistoryEntry> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO influence_history
            (change_type, points_changed, previous_total, new_total, reason, admin_user_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![change_type, points_changed, previous_total, new_total, reason, admin_id, now],
    )?;

    Ok(InfluenceHistoryEntry {
        id: conn.last_insert_rowid(),
        change_type: change_type.to_string(),
        points_changed,
        previous_total,
        new_total,
        reason: reason.to_string(),
        admin_user_id: Some(admin_id),
        created_at: now,
    })
}

#[cfg(test)]
mod tests {
    use umbra_types::models::Role;

    use super::*;
    use crate::queries::test_support::{db, user};

    #[test]
    fn adjust_floors_at_zero_and_logs_history() {
        let db = db();
        let admin = user(&db, "albus", Role::Admin);

        let start = db.get_influence().unwrap();
        assert_eq!((start.grindelwald_points, start.dumbledore_points), (0, 0));

        db.adjust_influence(Faction::Dumbledore, 15, "Turnaj", admin.id).unwrap();
        let (after, entry) = db
            .adjust_influence(Faction::Dumbledore, -40, "Zrada", admin.id)
            .unwrap();

        assert_eq!(after.dumbledore_points, 0);
        assert_eq!((entry.previous_total, entry.new_total), (15, 0));
        assert_eq!(entry.change_type, "dumbledore");

        let history = db.influence_history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].reason, "Zrada");
    }

    #[test]
    fn reset_sets_both_sides() {
        let db = db();
        let admin = user(&db, "albus", Role::Admin);
        db.adjust_influence(Faction::Grindelwald, 30, "Paříž", admin.id).unwrap();

        let reset = db.reset_influence(50, admin.id).unwrap();
        assert_eq!((reset.grindelwald_points, reset.dumbledore_points), (50, 50));
        assert_eq!(db.influence_history(1).unwrap()[0].change_type, "reset");
    }

    #[test]
    fn reset_survives_saturated_sides() {
        let db = db();
        let admin = user(&db, "albus", Role::Admin);
        db.adjust_influence(Faction::Grindelwald, i64::MAX, "Nurmengard", admin.id).unwrap();
        db.adjust_influence(Faction::Dumbledore, i64::MAX, "Bradavice", admin.id).unwrap();

        let reset = db.reset_influence(0, admin.id).unwrap();
        assert_eq!((reset.grindelwald_points, reset.dumbledore_points), (0, 0));

        let entry = &db.influence_history(1).unwrap()[0];
        assert_eq!(entry.previous_total, i64::MAX);
        assert_eq!(entry.new_total, 0);
        assert_eq!(entry.points_changed, -i64::MAX);
    }
}
