use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::db::{count_rows, metadata_value};

const CATALOGUE_TABLES: &[&str] = &[
    "authors",
    "genres",
    "audiobooks",
    "text_editions",
    "audiobook_authors",
    "audiobook_genres",
    "audiobook_text_editions",
];

pub fn run(args: StatusArgs) -> Result<()> {
    info!(db_path = %args.db_path.display(), "status requested");

    if !args.db_path.exists() {
        warn!(path = %args.db_path.display(), "database file missing");
        return Ok(());
    }

    let connection = Connection::open(&args.db_path)
        .with_context(|| format!("failed to open {}", args.db_path.display()))?;

    let status = catalogue_status(&connection)?;
    info!(
        schema_version = %status.schema_version.as_deref().unwrap_or_default(),
        updated_at = %status.updated_at.as_deref().unwrap_or_default(),
        top_audiobooks = status.top_audiobooks,
        "database status"
    );
    for (table, rows) in &status.tables {
        println!("{table:<24} {rows}");
    }
    println!("{:<24} {}", "top audiobooks", status.top_audiobooks);
    println!(
        "{:<24} {}",
        "schema version",
        status.schema_version.as_deref().unwrap_or("unknown")
    );
    println!(
        "{:<24} {}",
        "last updated",
        status.updated_at.as_deref().unwrap_or("unknown")
    );
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogueStatus {
    pub tables: Vec<(&'static str, i64)>,
    pub top_audiobooks: i64,
    pub schema_version: Option<String>,
    pub updated_at: Option<String>,
}

pub fn catalogue_status(connection: &Connection) -> Result<CatalogueStatus> {
    let mut tables = Vec::with_capacity(CATALOGUE_TABLES.len());
    for table in CATALOGUE_TABLES {
        let rows = count_rows(connection, &format!("SELECT COUNT(*) FROM {table}"))?;
        tables.push((*table, rows));
    }

    Ok(CatalogueStatus {
        tables,
        top_audiobooks: count_rows(connection, "SELECT COUNT(*) FROM audiobooks WHERE is_top = 1")?,
        schema_version: metadata_value(connection, "db_schema_version")?,
        updated_at: metadata_value(connection, "db_updated_at")?,
    })
}
