use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(SCHEMA_V1)?;
    }

    if version < 2 {
        info!("Running migration v2 (seed data)");
        conn.execute_batch(SEED_V2)?;
    }

    info!("Database migrations complete");
    Ok(())
}

const SCHEMA_V1: &str = "
    BEGIN;

    CREATE TABLE users (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        username        TEXT NOT NULL UNIQUE,
        email           TEXT NOT NULL UNIQUE,
        password_hash   TEXT NOT NULL,
        role            TEXT NOT NULL DEFAULT 'user',
        can_narrate     INTEGER NOT NULL DEFAULT 0,
        narrator_reason TEXT,
        is_banned       INTEGER NOT NULL DEFAULT 0,
        ban_reason      TEXT,
        banned_at       TEXT,
        is_system       INTEGER NOT NULL DEFAULT 0,
        character_order TEXT,
        highlight_words TEXT,
        highlight_color TEXT,
        narrator_color  TEXT,
        created_at      TEXT NOT NULL DEFAULT (datetime('now')),
        last_login_at   TEXT
    );

    CREATE TABLE characters (
        id                      INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id                 INTEGER NOT NULL REFERENCES users(id),
        first_name              TEXT NOT NULL,
        middle_name             TEXT,
        last_name               TEXT NOT NULL,
        birth_date              TEXT,
        school                  TEXT,
        description             TEXT,
        avatar                  TEXT,
        residence               TEXT,
        character_history       TEXT,
        show_history_to_others  INTEGER NOT NULL DEFAULT 1,
        is_active               INTEGER NOT NULL DEFAULT 1,
        is_system               INTEGER NOT NULL DEFAULT 0,
        death_date              TEXT,
        death_reason            TEXT,
        killed_by               INTEGER REFERENCES users(id),
        created_at              TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at              TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE INDEX idx_characters_user ON characters(user_id);

    CREATE TABLE chat_categories (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL,
        description TEXT,
        parent_id   INTEGER REFERENCES chat_categories(id),
        sort_order  INTEGER NOT NULL DEFAULT 0,
        created_at  TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE chat_rooms (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        name             TEXT NOT NULL,
        description      TEXT,
        long_description TEXT,
        category_id      INTEGER NOT NULL REFERENCES chat_categories(id),
        password         TEXT,
        is_public        INTEGER NOT NULL DEFAULT 1,
        sort_order       INTEGER NOT NULL DEFAULT 0,
        created_at       TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE chat_messages (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        room_id      INTEGER NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
        character_id INTEGER REFERENCES characters(id),
        user_id      INTEGER NOT NULL REFERENCES users(id),
        content      TEXT NOT NULL,
        message_type TEXT NOT NULL DEFAULT 'text',
        created_at   TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE INDEX idx_chat_messages_room ON chat_messages(room_id, created_at);
    CREATE INDEX idx_chat_messages_character ON chat_messages(character_id, created_at);

    CREATE TABLE archived_messages (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        original_id  INTEGER NOT NULL,
        room_id      INTEGER NOT NULL,
        character_id INTEGER,
        user_id      INTEGER NOT NULL,
        content      TEXT NOT NULL,
        message_type TEXT NOT NULL,
        created_at   TEXT NOT NULL,
        archived_at  TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE room_presence (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        character_id   INTEGER NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
        room_id        INTEGER NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
        is_online      INTEGER NOT NULL DEFAULT 1,
        joined_at      TEXT NOT NULL DEFAULT (datetime('now')),
        last_active_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(character_id, room_id)
    );

    CREATE TABLE owl_post_messages (
        id                     INTEGER PRIMARY KEY AUTOINCREMENT,
        sender_character_id    INTEGER NOT NULL REFERENCES characters(id),
        recipient_character_id INTEGER NOT NULL REFERENCES characters(id),
        subject                TEXT NOT NULL,
        content                TEXT NOT NULL,
        is_read                INTEGER NOT NULL DEFAULT 0,
        sent_at                TEXT NOT NULL DEFAULT (datetime('now')),
        read_at                TEXT
    );

    CREATE INDEX idx_owl_post_recipient ON owl_post_messages(recipient_character_id, is_read);
    CREATE INDEX idx_owl_post_sender ON owl_post_messages(sender_character_id);

    CREATE TABLE housing_requests (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id          INTEGER NOT NULL REFERENCES users(id),
        character_id     INTEGER NOT NULL REFERENCES characters(id),
        request_type     TEXT NOT NULL,
        size             TEXT,
        location         TEXT,
        selected_area    TEXT,
        housing_name     TEXT,
        housing_password TEXT,
        description      TEXT NOT NULL,
        status           TEXT NOT NULL DEFAULT 'pending',
        assigned_address TEXT,
        review_note      TEXT,
        reviewed_by      INTEGER REFERENCES users(id),
        reviewed_at      TEXT,
        created_at       TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE character_requests (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id      INTEGER NOT NULL REFERENCES users(id),
        first_name   TEXT NOT NULL,
        middle_name  TEXT,
        last_name    TEXT NOT NULL,
        birth_date   TEXT NOT NULL,
        school       TEXT NOT NULL,
        description  TEXT,
        reason       TEXT NOT NULL,
        status       TEXT NOT NULL DEFAULT 'pending',
        review_note  TEXT,
        reviewed_by  INTEGER REFERENCES users(id),
        reviewed_at  TEXT,
        created_at   TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE invite_codes (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        code       TEXT NOT NULL UNIQUE,
        is_used    INTEGER NOT NULL DEFAULT 0,
        used_by    INTEGER REFERENCES users(id),
        created_by INTEGER REFERENCES users(id),
        used_at    TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE influence_bar (
        id                 INTEGER PRIMARY KEY CHECK (id = 1),
        grindelwald_points INTEGER NOT NULL DEFAULT 0,
        dumbledore_points  INTEGER NOT NULL DEFAULT 0,
        updated_at         TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE influence_history (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        change_type    TEXT NOT NULL,
        points_changed INTEGER NOT NULL,
        previous_total INTEGER NOT NULL,
        new_total      INTEGER NOT NULL,
        reason         TEXT NOT NULL,
        admin_user_id  INTEGER REFERENCES users(id),
        created_at     TEXT NOT NULL DEFAULT (datetime('now'))
    );

    -- Single row holding the component lists as JSON
    CREATE TABLE wand_components (
        id   INTEGER PRIMARY KEY CHECK (id = 1),
        data TEXT NOT NULL
    );

    CREATE TABLE wands (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        character_id INTEGER NOT NULL UNIQUE REFERENCES characters(id) ON DELETE CASCADE,
        wood         TEXT NOT NULL,
        core         TEXT NOT NULL,
        length       TEXT NOT NULL,
        flexibility  TEXT NOT NULL,
        description  TEXT NOT NULL,
        acquired_at  TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE inventory_items (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        character_id INTEGER NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
        item_type    TEXT NOT NULL,
        item_id      INTEGER NOT NULL DEFAULT 0,
        item_name    TEXT,
        price        INTEGER NOT NULL,
        quantity     INTEGER NOT NULL DEFAULT 1,
        rarity       TEXT,
        description  TEXT,
        notes        TEXT,
        category     TEXT NOT NULL,
        acquired_at  TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE journal_entries (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        character_id INTEGER NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
        title        TEXT,
        content      TEXT NOT NULL,
        entry_date   TEXT,
        is_private   INTEGER NOT NULL DEFAULT 1,
        created_at   TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at   TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE spells (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL,
        effect      TEXT NOT NULL,
        category    TEXT NOT NULL,
        spell_type  TEXT NOT NULL,
        is_default  INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE character_spells (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        character_id INTEGER NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
        spell_id     INTEGER NOT NULL REFERENCES spells(id) ON DELETE CASCADE,
        learned_at   TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(character_id, spell_id)
    );

    CREATE TABLE admin_activity_log (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        admin_id       INTEGER NOT NULL REFERENCES users(id),
        action         TEXT NOT NULL,
        target_user_id INTEGER REFERENCES users(id),
        details        TEXT,
        created_at     TEXT NOT NULL DEFAULT (datetime('now'))
    );

    INSERT INTO schema_version (version) VALUES (1);

    COMMIT;
";

const SEED_V2: &str = r#"
    BEGIN;

    -- System account; the password hash is not a valid PHC string so login always fails
    INSERT INTO users (username, email, password_hash, role, is_system)
        VALUES ('system', 'system@umbra.invalid', '!', 'user', 1);

    -- Sender of housing decisions
    INSERT INTO characters (user_id, first_name, last_name, is_system, show_history_to_others)
        VALUES ((SELECT id FROM users WHERE username = 'system'), 'Správa', 'ubytování', 1, 0);

    INSERT INTO influence_bar (id, grindelwald_points, dumbledore_points) VALUES (1, 0, 0);

    INSERT INTO spells (name, description, effect, category, spell_type, is_default) VALUES
        ('Lumos', 'Rozsvítí špičku hůlky.', 'Světlo', 'Kouzla', 'Základní', 1),
        ('Nox', 'Zhasne světlo vyvolané kouzlem Lumos.', 'Tma', 'Kouzla', 'Základní', 1),
        ('Alohomora', 'Odemkne jednoduchý zámek.', 'Odemčení', 'Kouzla', 'Základní', 1),
        ('Wingardium Leviosa', 'Zvedne předmět do vzduchu.', 'Levitace', 'Kouzla', 'Základní', 1),
        ('Reparo', 'Opraví rozbitý předmět.', 'Oprava', 'Kouzla', 'Základní', 1),
        ('Accio', 'Přivolá předmět k sesilateli.', 'Přivolání', 'Kouzla', 'Pokročilé', 0),
        ('Expelliarmus', 'Vyrazí protivníkovi hůlku z ruky.', 'Odzbrojení', 'Obrana', 'Souboj', 0),
        ('Protego', 'Vytvoří ochranný štít.', 'Štít', 'Obrana', 'Souboj', 0),
        ('Stupefy', 'Omráčí cíl.', 'Omráčení', 'Útok', 'Souboj', 0);

    INSERT INTO wand_components (id, data) VALUES (1, '{
        "woods": [
            {"name": "Akácie"}, {"name": "Buk"}, {"name": "Cesmína"}, {"name": "Dub"},
            {"name": "Eben"}, {"name": "Jasan"}, {"name": "Javor"}, {"name": "Jedle"},
            {"name": "Jilm"}, {"name": "Lípa"}, {"name": "Ořešák"}, {"name": "Tis"},
            {"name": "Vrba"}
        ],
        "cores": [
            {"name": "Blána z dračího srdce", "description": "Mocné a učenlivé jádro."},
            {"name": "Pero fénixe", "description": "Vzácné a vybíravé jádro."},
            {"name": "Žíně z jednorožce", "description": "Věrné a stálé jádro."}
        ],
        "lengths": [
            {"name": "9 palců"}, {"name": "10 palců"}, {"name": "10 a půl palce"},
            {"name": "11 palců"}, {"name": "12 palců"}, {"name": "13 palců"}, {"name": "14 palců"}
        ],
        "flexibilities": [
            {"name": "nepoddajná"}, {"name": "tuhá"}, {"name": "mírně ohebná"},
            {"name": "ohebná"}, {"name": "velmi pružná"}
        ]
    }');

    INSERT INTO schema_version (version) VALUES (2);

    COMMIT;
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 2);

        let system_characters: i64 = conn
            .query_row("SELECT COUNT(*) FROM characters WHERE is_system = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(system_characters, 1);
    }
}
