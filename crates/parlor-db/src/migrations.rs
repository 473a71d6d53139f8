use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                login_id        TEXT NOT NULL UNIQUE,
                nickname        TEXT NOT NULL,
                email           TEXT NOT NULL UNIQUE,
                profile_image   TEXT,
                password_hash   TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE chat_groups (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                description TEXT,
                owner_id    TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_groups_created
                ON chat_groups(created_at);

            -- One row per (group, user): joining twice cannot duplicate a member.
            CREATE TABLE group_members (
                group_id    TEXT NOT NULL REFERENCES chat_groups(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                joined_at   TEXT NOT NULL,
                PRIMARY KEY (group_id, user_id)
            );

            CREATE INDEX idx_group_members_user
                ON group_members(user_id);

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                group_id    TEXT NOT NULL REFERENCES chat_groups(id) ON DELETE CASCADE,
                sender_id   TEXT NOT NULL REFERENCES users(id),
                text        TEXT,
                image_path  TEXT,
                created_at  TEXT NOT NULL,
                CHECK (COALESCE(text, '') <> '' OR image_path IS NOT NULL)
            );

            CREATE INDEX idx_messages_group
                ON messages(group_id, created_at);

            CREATE TABLE sessions (
                token       TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                login_id    TEXT NOT NULL,
                nickname    TEXT NOT NULL,
                remember    INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL,
                expires_at  TEXT NOT NULL
            );

            CREATE INDEX idx_sessions_expires
                ON sessions(expires_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
