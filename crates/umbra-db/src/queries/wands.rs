use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use umbra_types::models::{Wand, WandComponents};

use crate::Database;
use crate::models::NewWand;

fn wand_from_row(row: &Row<'_>) -> rusqlite::Result<Wand> {
    Ok(Wand {
        id: row.get(0)?,
        character_id: row.get(1)?,
        wood: row.get(2)?,
        core: row.get(3)?,
        length: row.get(4)?,
        flexibility: row.get(5)?,
        description: row.get(6)?,
        acquired_at: row.get(7)?,
    })
}

impl Database {
    pub fn get_wand_components(&self) -> Result<WandComponents> {
        self.with_conn(|conn| {
            let data: Option<String> = conn
                .query_row("SELECT data FROM wand_components WHERE id = 1", [], |r| r.get(0))
                .optional()?;
            match data {
                Some(json) => Ok(serde_json::from_str(&json)?),
                None => Ok(WandComponents::default()),
            }
        })
    }

    pub fn set_wand_components(&self, components: &WandComponents) -> Result<()> {
        let json = serde_json::to_string(components)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO wand_components (id, data) VALUES (1, ?1)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data",
                [json],
            )?;
            Ok(())
        })
    }

    pub fn get_wand(&self, character_id: i64) -> Result<Option<Wand>> {
        self.with_conn(|conn| query_wand(conn, character_id))
    }

    /// Returns `None` when the character already owns a wand.
    pub fn create_wand(&self, new: &NewWand<'_>) -> Result<Option<Wand>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO wands (character_id, wood, core, length, flexibility, description, acquired_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    new.character_id,
                    new.wood,
                    new.core,
                    new.length,
                    new.flexibility,
                    new.description,
                    Utc::now(),
                ],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            query_wand(conn, new.character_id)
        })
    }
}

fn query_wand(conn: &Connection, character_id: i64) -> Result<Option<Wand>> {
    let found = conn
        .query_row(
            "SELECT id, character_id, wood, core, length, flexibility, description, acquired_at
             FROM wands WHERE character_id = ?1",
            [character_id],
            wand_from_row,
        )
        .optional()?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use umbra_types::models::{Role, WandComponent};

    use super::*;
    use crate::queries::test_support::{character, db, user};

    #[test]
    fn seeded_components_can_be_replaced() {
        let db = db();
        let seeded = db.get_wand_components().unwrap();
        assert!(!seeded.woods.is_empty());
        assert!(!seeded.cores.is_empty());

        let replacement = WandComponents {
            woods: vec![WandComponent { name: "Bez".into(), description: None }],
            ..Default::default()
        };
        db.set_wand_components(&replacement).unwrap();
        assert_eq!(db.get_wand_components().unwrap(), replacement);
    }

    #[test]
    fn a_character_owns_at_most_one_wand() {
        let db = db();
        let u = user(&db, "newt", Role::User);
        let c = character(&db, u.id, "Newt", "Scamander");
        let new = NewWand {
            character_id: c.id,
            wood: "Buk",
            core: "Žíně z jednorožce",
            length: "11 palců",
            flexibility: "ohebná",
            description: "Stará hůlka",
        };

        assert!(db.create_wand(&new).unwrap().is_some());
        assert!(db.create_wand(&new).unwrap().is_none());
        assert_eq!(db.get_wand(c.id).unwrap().unwrap().wood, "Buk");
    }
}
