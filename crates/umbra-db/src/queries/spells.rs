use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use umbra_types::models::{CharacterSpell, Spell};

use crate::Database;

const SPELL_COLUMNS: &str = "s.id, s.name, s.description, s.effect, s.category, s.spell_type, s.is_default";

fn spell_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Spell> {
    Ok(Spell {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        description: row.get(offset + 2)?,
        effect: row.get(offset + 3)?,
        category: row.get(offset + 4)?,
        spell_type: row.get(offset + 5)?,
        is_default: row.get(offset + 6)?,
    })
}

fn character_spell_from_row(row: &Row<'_>) -> rusqlite::Result<CharacterSpell> {
    Ok(CharacterSpell {
        id: row.get(0)?,
        character_id: row.get(1)?,
        spell_id: row.get(2)?,
        learned_at: row.get(3)?,
        spell: spell_from_row(row, 4)?,
    })
}

impl Database {
    pub fn list_spells(&self) -> Result<Vec<Spell>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SPELL_COLUMNS} FROM spells s ORDER BY s.category, s.name"
            ))?;
            let spells = stmt
                .query_map([], |row| spell_from_row(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(spells)
        })
    }

    pub fn get_spell(&self, id: i64) -> Result<Option<Spell>> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    &format!("SELECT {SPELL_COLUMNS} FROM spells s WHERE s.id = ?1"),
                    [id],
                    |row| spell_from_row(row, 0),
                )
                .optional()?;
            Ok(found)
        })
    }

    pub fn character_spells(&self, character_id: i64) -> Result<Vec<CharacterSpell>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT cs.id, cs.character_id, cs.spell_id, cs.learned_at, {SPELL_COLUMNS}
                 FROM character_spells cs JOIN spells s ON s.id = cs.spell_id
                 WHERE cs.character_id = ?1
                 ORDER BY s.category, s.name"
            ))?;
            let spells = stmt
                .query_map([character_id], character_spell_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(spells)
        })
    }

    /// The spell, if the character has learned it.
    pub fn known_spell(&self, character_id: i64, spell_id: i64) -> Result<Option<Spell>> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    &format!(
                        "SELECT {SPELL_COLUMNS}
                         FROM character_spells cs JOIN spells s ON s.id = cs.spell_id
                         WHERE cs.character_id = ?1 AND cs.spell_id = ?2"
                    ),
                    params![character_id, spell_id],
                    |row| spell_from_row(row, 0),
                )
                .optional()?;
            Ok(found)
        })
    }

    /// Returns `None` when the spell was already known.
    pub fn learn_spell(&self, character_id: i64, spell_id: i64) -> Result<Option<CharacterSpell>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO character_spells (character_id, spell_id, learned_at) VALUES (?1, ?2, ?3)",
                params![character_id, spell_id, Utc::now()],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            query_character_spell(conn, character_id, spell_id)
        })
    }

    pub fn forget_spell(&self, character_id: i64, spell_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM character_spells WHERE character_id = ?1 AND spell_id = ?2",
                params![character_id, spell_id],
            )?;
            Ok(deleted > 0)
        })
    }

    /// Grants every default spell to every living non-system character.
    /// Returns the number of grants made.
    pub fn initialize_default_spells(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let granted = conn.execute(
                "INSERT OR IGNORE INTO character_spells (character_id, spell_id, learned_at)
                 SELECT c.id, s.id, ?1
                 FROM characters c CROSS JOIN spells s
                 WHERE s.is_default = 1 AND c.death_date IS NULL AND c.is_system = 0",
                [Utc::now()],
            )?;
            Ok(granted)
        })
    }
}

fn query_character_spell(conn: &Connection, character_id: i64, spell_id: i64) -> Result<Option<CharacterSpell>> {
    let found = conn
        .query_row(
            &format!(
                "SELECT cs.id, cs.character_id, cs.spell_id, cs.learned_at, {SPELL_COLUMNS}
                 FROM character_spells cs JOIN spells s ON s.id = cs.spell_id
                 WHERE cs.character_id = ?1 AND cs.spell_id = ?2"
            ),
            params![character_id, spell_id],
            character_spell_from_row,
        )
        .optional()?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use umbra_types::models::Role;

    use crate::queries::test_support::{character, db, user};

    #[test]
    fn default_spells_are_granted_once() {
        let db = db();
        let u = user(&db, "newt", Role::User);
        let c = character(&db, u.id, "Newt", "Scamander");

        let defaults = db.list_spells().unwrap().into_iter().filter(|s| s.is_default).count();
        assert!(defaults > 0);

        assert_eq!(db.initialize_default_spells().unwrap(), defaults);
        assert_eq!(db.initialize_default_spells().unwrap(), 0);
        assert_eq!(db.character_spells(c.id).unwrap().len(), defaults);
    }

    #[test]
    fn learn_and_forget() {
        let db = db();
        let u = user(&db, "newt", Role::User);
        let c = character(&db, u.id, "Newt", "Scamander");
        let spell = db.list_spells().unwrap().into_iter().find(|s| !s.is_default).unwrap();

        assert!(db.known_spell(c.id, spell.id).unwrap().is_none());
        let learned = db.learn_spell(c.id, spell.id).unwrap().unwrap();
        assert_eq!(learned.spell.name, spell.name);
        assert!(db.learn_spell(c.id, spell.id).unwrap().is_none());
        assert!(db.known_spell(c.id, spell.id).unwrap().is_some());

        assert!(db.forget_spell(c.id, spell.id).unwrap());
        assert!(!db.forget_spell(c.id, spell.id).unwrap());
    }
}
