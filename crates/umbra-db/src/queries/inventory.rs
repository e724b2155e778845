use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use umbra_types::api::UpdateInventoryItemRequest;
use umbra_types::models::InventoryItem;

use crate::Database;
use crate::models::NewInventoryItem;

const ITEM_COLUMNS: &str = "id, character_id, item_type, item_id, item_name, price, quantity, rarity, \
     description, notes, category, acquired_at";

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<InventoryItem> {
    Ok(InventoryItem {
        id: row.get(0)?,
        character_id: row.get(1)?,
        item_type: row.get(2)?,
        item_id: row.get(3)?,
        item_name: row.get(4)?,
        price: row.get(5)?,
        quantity: row.get(6)?,
        rarity: row.get(7)?,
        description: row.get(8)?,
        notes: row.get(9)?,
        category: row.get(10)?,
        acquired_at: row.get(11)?,
    })
}

impl Database {
    pub fn list_inventory(&self, character_id: i64) -> Result<Vec<InventoryItem>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM inventory_items
                 WHERE character_id = ?1 ORDER BY acquired_at DESC, id DESC"
            ))?;
            let items = stmt
                .query_map([character_id], item_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(items)
        })
    }

    pub fn add_inventory_item(&self, new: &NewInventoryItem<'_>) -> Result<InventoryItem> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO inventory_items
                    (character_id, item_type, item_id, item_name, price, quantity, rarity,
                     description, notes, category, acquired_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    new.character_id,
                    new.item_type,
                    new.item_id,
                    new.item_name,
                    new.price,
                    new.quantity,
                    new.rarity,
                    new.description,
                    new.notes,
                    new.category,
                    Utc::now(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            query_item(conn, id)?.ok_or_else(|| anyhow::anyhow!("Inventory item {} vanished after insert", id))
        })
    }

    pub fn get_inventory_item(&self, id: i64) -> Result<Option<InventoryItem>> {
        self.with_conn(|conn| query_item(conn, id))
    }

    pub fn update_inventory_item(
        &self,
        id: i64,
        update: &UpdateInventoryItemRequest,
    ) -> Result<Option<InventoryItem>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE inventory_items SET
                    item_name = COALESCE(?1, item_name),
                    price = COALESCE(?2, price),
                    quantity = COALESCE(?3, quantity),
                    rarity = COALESCE(?4, rarity),
                    description = COALESCE(?5, description),
                    notes = COALESCE(?6, notes),
                    category = COALESCE(?7, category)
                 WHERE id = ?8",
                params![
                    update.item_name,
                    update.price,
                    update.quantity,
                    update.rarity,
                    update.description,
                    update.notes,
                    update.category,
                    id
                ],
            )?;
            query_item(conn, id)
        })
    }

    pub fn delete_inventory_item(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM inventory_items WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }
}

fn query_item(conn: &Connection, id: i64) -> Result<Option<InventoryItem>> {
    let found = conn
        .query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM inventory_items WHERE id = ?1"),
            [id],
            item_from_row,
        )
        .optional()?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use umbra_types::models::Role;

    use super::*;
    use crate::queries::test_support::{character, db, user};

    #[test]
    fn items_can_be_updated_and_removed() {
        let db = db();
        let u = user(&db, "newt", Role::User);
        let c = character(&db, u.id, "Newt", "Scamander");

        let item = db
            .add_inventory_item(&NewInventoryItem {
                character_id: c.id,
                item_type: "potion",
                item_id: 4,
                item_name: Some("Felix Felicis"),
                price: 120,
                quantity: 1,
                rarity: Some("vzácné"),
                description: None,
                notes: None,
                category: "Lektvary",
            })
            .unwrap();

        let update = UpdateInventoryItemRequest {
            quantity: Some(3),
            notes: Some("z Prasinek".into()),
            ..Default::default()
        };
        let updated = db.update_inventory_item(item.id, &update).unwrap().unwrap();
        assert_eq!(updated.quantity, 3);
        assert_eq!(updated.price, 120);
        assert_eq!(updated.notes.as_deref(), Some("z Prasinek"));

        assert_eq!(db.list_inventory(c.id).unwrap().len(), 1);
        assert!(db.delete_inventory_item(item.id).unwrap());
        assert!(db.list_inventory(c.id).unwrap().is_empty());
    }
}
