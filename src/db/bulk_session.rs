use std::ops::{Deref, DerefMut};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{info, warn};

const BULK_CACHE_SIZE_KIB: i64 = -524_288;
const TEMP_STORE_MEMORY: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SessionPragmas {
    foreign_keys: i64,
    ignore_check_constraints: i64,
    cache_size: i64,
    temp_store: i64,
}

impl SessionPragmas {
    fn read(connection: &Connection) -> Result<Self> {
        Ok(Self {
            foreign_keys: read_pragma(connection, "foreign_keys")?,
            ignore_check_constraints: read_pragma(connection, "ignore_check_constraints")?,
            cache_size: read_pragma(connection, "cache_size")?,
            temp_store: read_pragma(connection, "temp_store")?,
        })
    }

    fn relaxed() -> Self {
        Self {
            foreign_keys: 0,
            ignore_check_constraints: 1,
            cache_size: BULK_CACHE_SIZE_KIB,
            temp_store: TEMP_STORE_MEMORY,
        }
    }

    fn apply(&self, connection: &Connection) -> Result<()> {
        write_pragma(connection, "foreign_keys", self.foreign_keys)?;
        write_pragma(connection, "ignore_check_constraints", self.ignore_check_constraints)?;
        write_pragma(connection, "cache_size", self.cache_size)?;
        write_pragma(connection, "temp_store", self.temp_store)?;
        Ok(())
    }
}

fn read_pragma(connection: &Connection, name: &str) -> Result<i64> {
    connection
        .pragma_query_value(None, name, |row| row.get(0))
        .with_context(|| format!("failed to read pragma {name}"))
}

fn write_pragma(connection: &Connection, name: &str, value: i64) -> Result<()> {
    connection
        .pragma_update(None, name, value)
        .with_context(|| format!("failed to set pragma {name}={value}"))
}

// foreign_keys changes are ignored inside a transaction.
pub struct BulkLoadSession<'conn> {
    connection: &'conn mut Connection,
    saved: SessionPragmas,
    analyze_tables: &'static [&'static str],
    restored: bool,
}

impl<'conn> BulkLoadSession<'conn> {
    pub fn begin(
        connection: &'conn mut Connection,
        analyze_tables: &'static [&'static str],
    ) -> Result<Self> {
        Self::begin_with(connection, analyze_tables, |connection| {
            SessionPragmas::relaxed().apply(connection)
        })
    }

    fn begin_with(
        connection: &'conn mut Connection,
        analyze_tables: &'static [&'static str],
        relax: impl FnOnce(&Connection) -> Result<()>,
    ) -> Result<Self> {
        let saved = SessionPragmas::read(connection)?;
        let session = Self {
            connection,
            saved,
            analyze_tables,
            restored: false,
        };
        relax(&*session.connection)?;
        info!(tables = ?analyze_tables, "relaxed constraint checks for bulk load");
        Ok(session)
    }

    pub fn finish(mut self) -> Result<()> {
        self.restore()
    }

    fn restore(&mut self) -> Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;

        self.saved.apply(&*self.connection)?;
        for table in self.analyze_tables {
            self.connection
                .execute_batch(&format!("ANALYZE {table}"))
                .with_context(|| format!("failed to analyze {table}"))?;
        }
        info!(tables = ?self.analyze_tables, "restored constraint checks and refreshed statistics");
        Ok(())
    }
}

impl Deref for BulkLoadSession<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &*self.connection
    }
}

impl DerefMut for BulkLoadSession<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut *self.connection
    }
}

impl Drop for BulkLoadSession<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.restore() {
            warn!(error = %err, "failed to restore session after bulk load");
        }
    }
}
