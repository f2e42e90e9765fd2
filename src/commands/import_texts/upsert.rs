use anyhow::{Context, Result};
use indicatif::ProgressBar;
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use tracing::warn;

use super::record::TextEditionRecord;
use crate::commands::{RowErrorLog, last_per_key};
use crate::db::{rows_per_statement, values_placeholders};
use crate::util::truncate_chars;

const TEXT_EDITION_COLUMNS: usize = 13;
const BATCH_ERROR_MAX_CHARS: usize = 500;

impl TextEditionRecord {
    fn values(&self, now: &str) -> [Value; TEXT_EDITION_COLUMNS] {
        [
            Value::Integer(self.external_id),
            Value::Text(self.name.clone()),
            optional_text(&self.description),
            self.price.map_or(Value::Null, Value::Real),
            Value::Text(self.url.clone()),
            optional_text(&self.image_url),
            optional_text(&self.formats),
            optional_text(&self.publisher),
            self.year.map_or(Value::Null, |year| Value::Integer(i64::from(year))),
            Value::Text(self.normalized_key.clone()),
            Value::Text(self.author_normalized.clone()),
            Value::Text(now.to_string()),
            Value::Text(now.to_string()),
        ]
    }
}

fn optional_text(value: &Option<String>) -> Value {
    value.clone().map_or(Value::Null, Value::Text)
}

pub fn upsert_text_editions(
    connection: &Connection,
    records: &[&TextEditionRecord],
    now: &str,
) -> Result<()> {
    for chunk in records.chunks(rows_per_statement(TEXT_EDITION_COLUMNS)) {
        let sql = format!(
            "INSERT INTO text_editions(
               external_id, name, description, price, url, image_url, formats,
               publisher, year, normalized_key, author_normalized,
               created_at, updated_at
             ) VALUES {}
             ON CONFLICT(external_id) DO UPDATE SET
               name=excluded.name,
               description=excluded.description,
               price=excluded.price,
               url=excluded.url,
               image_url=excluded.image_url,
               formats=excluded.formats,
               publisher=excluded.publisher,
               year=excluded.year,
               normalized_key=excluded.normalized_key,
               author_normalized=excluded.author_normalized,
               updated_at=excluded.updated_at",
            values_placeholders(chunk.len(), TEXT_EDITION_COLUMNS)
        );
        let values = chunk.iter().flat_map(|record| record.values(now));
        connection
            .execute(&sql, params_from_iter(values))
            .with_context(|| format!("failed to upsert {} text editions", chunk.len()))?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub written: usize,
    pub failed: usize,
    pub fell_back: bool,
}

pub fn write_batch(
    connection: &mut Connection,
    batch: &[TextEditionRecord],
    now: &str,
    progress: &ProgressBar,
    row_errors: &mut RowErrorLog,
) -> Result<BatchOutcome> {
    let records = last_per_key(batch, |record| record.external_id);

    let tx = connection
        .transaction()
        .context("failed to start text edition batch transaction")?;
    let batch_error = match upsert_text_editions(&tx, &records, now) {
        Ok(()) => {
            tx.commit().context("failed to commit text edition batch")?;
            return Ok(BatchOutcome {
                written: records.len(),
                ..BatchOutcome::default()
            });
        }
        Err(err) => err,
    };
    drop(tx);

    let message = format!("{batch_error:#}");
    progress.suspend(|| {
        warn!(
            rows = records.len(),
            error = %truncate_chars(&message, BATCH_ERROR_MAX_CHARS),
            "batch upsert failed, retrying row by row"
        )
    });

    let mut tx = connection
        .transaction()
        .context("failed to start row-by-row transaction")?;
    let mut outcome = BatchOutcome {
        fell_back: true,
        ..BatchOutcome::default()
    };
    for record in records {
        let savepoint = tx.savepoint().context("failed to open row savepoint")?;
        match upsert_text_editions(&savepoint, &[record], now) {
            Ok(()) => {
                savepoint.commit().context("failed to release row savepoint")?;
                outcome.written += 1;
            }
            Err(err) => {
                drop(savepoint);
                outcome.failed += 1;
                row_errors.record(progress, format!("external_id {}", record.external_id), &err);
            }
        }
    }
    tx.commit().context("failed to commit row-by-row batch")?;

    Ok(outcome)
}
