use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::util::now_utc_string;

mod bulk_session;

pub use bulk_session::BulkLoadSession;

pub const DB_SCHEMA_VERSION: &str = "1.0.0";

pub const MAX_STATEMENT_PARAMS: usize = 32_766;

pub fn open_catalogue(db_path: &Path) -> Result<Connection> {
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

pub fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign_keys")?;
    Ok(())
}

pub fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS authors (
          id INTEGER PRIMARY KEY,
          name TEXT NOT NULL UNIQUE,
          slug TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS genres (
          id INTEGER PRIMARY KEY,
          name TEXT NOT NULL,
          slug TEXT NOT NULL UNIQUE,
          parent_id INTEGER,
          FOREIGN KEY(parent_id) REFERENCES genres(id) ON DELETE SET NULL
        );

        CREATE TABLE IF NOT EXISTS audiobooks (
          id INTEGER PRIMARY KEY,
          external_id INTEGER NOT NULL UNIQUE,
          name TEXT NOT NULL,
          slug TEXT NOT NULL UNIQUE,
          description TEXT,
          price REAL NOT NULL,
          url TEXT NOT NULL,
          image_url TEXT,
          formats TEXT,
          fragment_url TEXT,
          normalized_key TEXT NOT NULL DEFAULT '',
          author_normalized TEXT NOT NULL DEFAULT '',
          is_top INTEGER NOT NULL DEFAULT 0,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS text_editions (
          id INTEGER PRIMARY KEY,
          external_id INTEGER NOT NULL UNIQUE,
          name TEXT NOT NULL,
          description TEXT,
          price REAL,
          url TEXT NOT NULL,
          image_url TEXT,
          formats TEXT,
          publisher TEXT,
          year INTEGER,
          normalized_key TEXT NOT NULL,
          author_normalized TEXT NOT NULL,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audiobook_authors (
          audiobook_id INTEGER NOT NULL,
          author_id INTEGER NOT NULL,
          PRIMARY KEY (audiobook_id, author_id),
          FOREIGN KEY(audiobook_id) REFERENCES audiobooks(id) ON DELETE CASCADE,
          FOREIGN KEY(author_id) REFERENCES authors(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS audiobook_genres (
          audiobook_id INTEGER NOT NULL,
          genre_id INTEGER NOT NULL,
          PRIMARY KEY (audiobook_id, genre_id),
          FOREIGN KEY(audiobook_id) REFERENCES audiobooks(id) ON DELETE CASCADE,
          FOREIGN KEY(genre_id) REFERENCES genres(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS audiobook_text_editions (
          audiobook_id INTEGER NOT NULL,
          text_edition_id INTEGER NOT NULL,
          created_at TEXT NOT NULL,
          PRIMARY KEY (audiobook_id, text_edition_id),
          FOREIGN KEY(audiobook_id) REFERENCES audiobooks(id) ON DELETE CASCADE,
          FOREIGN KEY(text_edition_id) REFERENCES text_editions(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_genres_name_parent ON genres(name, parent_id);
        CREATE INDEX IF NOT EXISTS idx_genres_parent ON genres(parent_id);
        CREATE INDEX IF NOT EXISTS idx_audiobooks_created_at ON audiobooks(created_at);
        CREATE INDEX IF NOT EXISTS idx_audiobooks_is_top ON audiobooks(is_top);
        CREATE INDEX IF NOT EXISTS idx_audiobooks_match ON audiobooks(normalized_key, author_normalized);
        CREATE INDEX IF NOT EXISTS idx_text_editions_match ON text_editions(normalized_key, author_normalized);
        CREATE INDEX IF NOT EXISTS idx_text_editions_year ON text_editions(year);
        CREATE INDEX IF NOT EXISTS idx_audiobook_authors_author ON audiobook_authors(author_id);
        CREATE INDEX IF NOT EXISTS idx_audiobook_genres_genre ON audiobook_genres(genre_id);
        ",
        )
        .context("failed to initialize catalogue schema")?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}

pub fn count_rows(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection
        .query_row(sql, [], |row| row.get(0))
        .with_context(|| format!("failed to count rows: {sql}"))?;
    Ok(count)
}

pub fn metadata_value(connection: &Connection, key: &str) -> Result<Option<String>> {
    connection
        .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()
        .with_context(|| format!("failed to read metadata key {key}"))
}

pub fn values_placeholders(rows: usize, columns: usize) -> String {
    let row = format!("({})", vec!["?"; columns].join(", "));
    vec![row; rows].join(", ")
}

pub fn list_placeholders(len: usize) -> String {
    vec!["?"; len].join(", ")
}

pub fn rows_per_statement(columns: usize) -> usize {
    (MAX_STATEMENT_PARAMS / columns.max(1)).max(1)
}

#[cfg(test)]
pub(crate) fn open_in_memory() -> Connection {
    let connection = Connection::open_in_memory().expect("in-memory database");
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .expect("enable foreign keys");
    ensure_schema(&connection).expect("schema");
    connection
}
