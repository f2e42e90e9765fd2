use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use rusqlite::{Connection, params_from_iter};
use tracing::info;

use crate::cli::MarkTopArgs;
use crate::commands::RowErrorLog;
use crate::db::{MAX_STATEMENT_PARAMS, count_rows, list_placeholders, open_catalogue};
use crate::source::{SourceRow, read_all};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkTopReport {
    pub listed: usize,
    pub errors: usize,
    pub marked: usize,
    pub total_top: i64,
}

pub fn run(args: MarkTopArgs) -> Result<()> {
    info!(
        file = %args.file.display(),
        db_path = %args.db_path.display(),
        "marking top audiobooks"
    );

    let external_ids = read_top_ids(&args.file, &ProgressBar::hidden())?;
    let mut connection = open_catalogue(&args.db_path)?;
    let report = mark_top(&mut connection, &external_ids.ids)?;
    let report = MarkTopReport {
        listed: external_ids.ids.len(),
        errors: external_ids.errors,
        ..report
    };

    info!(
        listed = report.listed,
        marked = report.marked,
        total_top = report.total_top,
        "top audiobooks marked"
    );
    println!(
        "top audiobooks: listed {} | marked {} | flagged in total {} | errors {}",
        report.listed, report.marked, report.total_top, report.errors
    );
    Ok(())
}

#[derive(Debug, Default)]
pub struct TopIds {
    pub ids: BTreeSet<i64>,
    pub errors: usize,
}

pub fn read_top_ids(path: &Path, progress: &ProgressBar) -> Result<TopIds> {
    let mut row_errors = RowErrorLog::default();
    let mut ids = BTreeSet::new();
    for (index, row) in read_all(path)?.into_iter().enumerate() {
        let parsed = row
            .context("failed to decode row")
            .and_then(|row: SourceRow| row.external_id());
        match parsed {
            Ok(id) => {
                ids.insert(id);
            }
            Err(err) => row_errors.record(progress, index + 1, &err),
        }
    }
    Ok(TopIds {
        ids,
        errors: row_errors.count(),
    })
}

pub fn mark_top(connection: &mut Connection, external_ids: &BTreeSet<i64>) -> Result<MarkTopReport> {
    let ids: Vec<i64> = external_ids.iter().copied().collect();

    let tx = connection
        .transaction()
        .context("failed to start top marking transaction")?;
    let mut marked = 0;
    for chunk in ids.chunks(MAX_STATEMENT_PARAMS) {
        let sql = format!(
            "UPDATE audiobooks SET is_top = 1 WHERE external_id IN ({})",
            list_placeholders(chunk.len())
        );
        marked += tx
            .execute(&sql, params_from_iter(chunk))
            .context("failed to mark top audiobooks")?;
    }
    tx.commit().context("failed to commit top marking")?;

    let total_top = count_rows(connection, "SELECT COUNT(*) FROM audiobooks WHERE is_top = 1")?;
    Ok(MarkTopReport {
        marked,
        total_top,
        ..MarkTopReport::default()
    })
}
