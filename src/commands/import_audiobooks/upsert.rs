use std::collections::HashMap;

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Transaction, params_from_iter};

use crate::db::{MAX_STATEMENT_PARAMS, list_placeholders, rows_per_statement, values_placeholders};

const AUDIOBOOK_COLUMNS: usize = 13;

#[derive(Debug, Clone, PartialEq)]
pub struct AudiobookRecord {
    pub external_id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: f64,
    pub url: String,
    pub image_url: Option<String>,
    pub formats: Option<String>,
    pub fragment_url: Option<String>,
    pub normalized_key: String,
    pub author_normalized: String,
}

impl AudiobookRecord {
    fn values(&self, now: &str) -> [Value; AUDIOBOOK_COLUMNS] {
        [
            Value::Integer(self.external_id),
            Value::Text(self.name.clone()),
            Value::Text(self.slug.clone()),
            optional_text(&self.description),
            Value::Real(self.price),
            Value::Text(self.url.clone()),
            optional_text(&self.image_url),
            optional_text(&self.formats),
            optional_text(&self.fragment_url),
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

pub fn upsert_audiobooks(
    tx: &Transaction<'_>,
    records: &[AudiobookRecord],
    now: &str,
) -> Result<HashMap<i64, i64>> {
    for chunk in records.chunks(rows_per_statement(AUDIOBOOK_COLUMNS)) {
        let sql = format!(
            "INSERT INTO audiobooks(
               external_id, name, slug, description, price, url, image_url,
               formats, fragment_url, normalized_key, author_normalized,
               created_at, updated_at
             ) VALUES {}
             ON CONFLICT(external_id) DO UPDATE SET
               name=excluded.name,
               slug=excluded.slug,
               description=excluded.description,
               price=excluded.price,
               url=excluded.url,
               image_url=excluded.image_url,
               formats=excluded.formats,
               fragment_url=excluded.fragment_url,
               normalized_key=excluded.normalized_key,
               author_normalized=excluded.author_normalized,
               updated_at=excluded.updated_at",
            values_placeholders(chunk.len(), AUDIOBOOK_COLUMNS)
        );
        let values = chunk.iter().flat_map(|record| record.values(now));
        tx.execute(&sql, params_from_iter(values))
            .with_context(|| format!("failed to upsert {} audiobooks", chunk.len()))?;
    }

    let external_ids: Vec<i64> = records.iter().map(|record| record.external_id).collect();
    audiobook_ids(tx, &external_ids)
}

pub fn audiobook_ids(tx: &Transaction<'_>, external_ids: &[i64]) -> Result<HashMap<i64, i64>> {
    let mut ids = HashMap::with_capacity(external_ids.len());
    for chunk in external_ids.chunks(MAX_STATEMENT_PARAMS) {
        let sql = format!(
            "SELECT id, external_id FROM audiobooks WHERE external_id IN ({})",
            list_placeholders(chunk.len())
        );
        let mut statement = tx.prepare(&sql)?;
        let rows = statement.query_map(params_from_iter(chunk), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (id, external_id) = row.context("failed to read audiobook id")?;
            ids.insert(external_id, id);
        }
    }
    Ok(ids)
}
