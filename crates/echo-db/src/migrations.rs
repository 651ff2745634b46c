use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS vaults (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            icon        TEXT NOT NULL DEFAULT 'default',
            description TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS confessions (
            id          TEXT PRIMARY KEY,
            vault_id    TEXT NOT NULL REFERENCES vaults(id),
            title       TEXT,
            content     TEXT NOT NULL,
            mood        TEXT NOT NULL,
            is_public   INTEGER NOT NULL DEFAULT 1,
            owner_id    TEXT,
            anon_hash   TEXT NOT NULL,
            is_explicit INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_confessions_vault
            ON confessions(vault_id, created_at);

        CREATE TABLE IF NOT EXISTS echo_threads (
            id               TEXT PRIMARY KEY,
            vault_id         TEXT NOT NULL REFERENCES vaults(id),
            title            TEXT NOT NULL,
            is_public        INTEGER NOT NULL DEFAULT 1,
            is_explicit      INTEGER NOT NULL DEFAULT 0,
            owner_id         TEXT,
            created_at       TEXT NOT NULL,
            last_activity_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_threads_vault_activity
            ON echo_threads(vault_id, last_activity_at);

        CREATE INDEX IF NOT EXISTS idx_threads_activity
            ON echo_threads(last_activity_at);

        CREATE TABLE IF NOT EXISTS thread_messages (
            id            TEXT PRIMARY KEY,
            thread_id     TEXT NOT NULL REFERENCES echo_threads(id),
            confession_id TEXT REFERENCES confessions(id),
            content       TEXT NOT NULL,
            anon_hash     TEXT NOT NULL,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_thread
            ON thread_messages(thread_id, created_at);

        -- One reaction per identity per message
        CREATE TABLE IF NOT EXISTS message_reactions (
            message_id  TEXT NOT NULL REFERENCES thread_messages(id),
            anon_hash   TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (message_id, anon_hash)
        );

        CREATE TABLE IF NOT EXISTS polls (
            id          TEXT PRIMARY KEY,
            thread_id   TEXT NOT NULL REFERENCES echo_threads(id),
            question    TEXT NOT NULL,
            options     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_polls_thread
            ON polls(thread_id);

        -- One active vote per identity per poll
        CREATE TABLE IF NOT EXISTS poll_votes (
            poll_id      TEXT NOT NULL REFERENCES polls(id),
            anon_hash    TEXT NOT NULL,
            option_index INTEGER NOT NULL,
            created_at   TEXT NOT NULL,
            PRIMARY KEY (poll_id, anon_hash)
        );

        -- Seed the default vaults
        INSERT OR IGNORE INTO vaults (id, name, icon, description) VALUES
            ('00000000-0000-0000-0000-000000000001', 'Love', 'default', 'Crushes, exes and everything in between'),
            ('00000000-0000-0000-0000-000000000002', 'Stress', 'default', 'Exams, jobs, deadlines'),
            ('00000000-0000-0000-0000-000000000003', 'Dreams', 'default', 'What keeps you up at night'),
            ('00000000-0000-0000-0000-000000000004', 'Secrets', 'default', 'Things nobody knows');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
