use std::collections::BTreeSet;

use anyhow::{Context, Result};
use rusqlite::{Transaction, params_from_iter};

use crate::db::{MAX_STATEMENT_PARAMS, list_placeholders, rows_per_statement, values_placeholders};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowLinks {
    pub audiobook_id: i64,
    pub author_id: i64,
    pub genre_ids: Vec<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkCounts {
    pub author_links: usize,
    pub genre_links: usize,
}

pub fn relink(tx: &Transaction<'_>, links: &[RowLinks]) -> Result<LinkCounts> {
    let audiobook_ids: Vec<i64> = links
        .iter()
        .map(|row| row.audiobook_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    clear_links(tx, "audiobook_authors", &audiobook_ids)?;
    clear_links(tx, "audiobook_genres", &audiobook_ids)?;

    let author_pairs: BTreeSet<(i64, i64)> = links
        .iter()
        .map(|row| (row.audiobook_id, row.author_id))
        .collect();
    let genre_pairs: BTreeSet<(i64, i64)> = links
        .iter()
        .flat_map(|row| row.genre_ids.iter().map(|genre_id| (row.audiobook_id, *genre_id)))
        .collect();

    insert_pairs(tx, "audiobook_authors", "author_id", &author_pairs)?;
    insert_pairs(tx, "audiobook_genres", "genre_id", &genre_pairs)?;

    Ok(LinkCounts {
        author_links: author_pairs.len(),
        genre_links: genre_pairs.len(),
    })
}

fn clear_links(tx: &Transaction<'_>, table: &str, audiobook_ids: &[i64]) -> Result<()> {
    for chunk in audiobook_ids.chunks(MAX_STATEMENT_PARAMS) {
        let sql = format!(
            "DELETE FROM {table} WHERE audiobook_id IN ({})",
            list_placeholders(chunk.len())
        );
        tx.execute(&sql, params_from_iter(chunk))
            .with_context(|| format!("failed to clear {table}"))?;
    }
    Ok(())
}

fn insert_pairs(
    tx: &Transaction<'_>,
    table: &str,
    column: &str,
    pairs: &BTreeSet<(i64, i64)>,
) -> Result<()> {
    let pairs: Vec<(i64, i64)> = pairs.iter().copied().collect();
    for chunk in pairs.chunks(rows_per_statement(2)) {
        let sql = format!(
            "INSERT INTO {table}(audiobook_id, {column}) VALUES {}",
            values_placeholders(chunk.len(), 2)
        );
        let values = chunk.iter().flat_map(|(left, right)| [*left, *right]);
        tx.execute(&sql, params_from_iter(values))
            .with_context(|| format!("failed to insert into {table}"))?;
    }
    Ok(())
}
