use std::io::Read;

use anyhow::{Context, Result};
use csv::Reader;
use indicatif::ProgressBar;
use rusqlite::Connection;
use tracing::info;

use super::record::{TextEditionRecord, TextRow, TextRowConverter};
use super::upsert::write_batch;
use crate::cli::ImportTextsArgs;
use crate::commands::{RowErrorLog, RunContext, ensure_batch_size, make_spinner};
use crate::db::{BulkLoadSession, open_catalogue};
use crate::model::TextImportCounts;
use crate::source::{SourceColumns, open_source};
use crate::util::now_utc_string;

const TEXT_TABLES: &[&str] = &["text_editions"];

pub fn run(args: ImportTextsArgs) -> Result<()> {
    ensure_batch_size(args.batch_size)?;
    let context = RunContext::start("import-texts");

    info!(
        file = %args.file.display(),
        db_path = %args.db_path.display(),
        batch_size = args.batch_size,
        "starting text edition import"
    );

    let mut reader = open_source(&args.file)?;
    let mut connection = open_catalogue(&args.db_path)?;
    let progress = make_spinner("texts")?;
    let counts = import_reader(&mut connection, &mut reader, args.batch_size, &progress)?;
    progress.finish_and_clear();

    info!(
        processed = counts.processed,
        skipped_audio = counts.skipped_audio,
        errors = counts.errors,
        fallback_batches = counts.fallback_batches,
        "text edition import finished"
    );
    println!(
        "text editions: processed {} | skipped {} | errors {}",
        counts.processed, counts.skipped_audio, counts.errors
    );

    let records_read = counts.records_read;
    context.write_summary(
        args.summary_path.as_deref(),
        &args.file,
        records_read,
        &args.db_path,
        args.batch_size,
        counts,
    )
}

pub(crate) fn import_reader<R: Read>(
    connection: &mut Connection,
    reader: &mut Reader<R>,
    batch_size: usize,
    progress: &ProgressBar,
) -> Result<TextImportCounts> {
    ensure_batch_size(batch_size)?;

    let columns = SourceColumns::read(reader)?;
    let converter = TextRowConverter::new()?;
    let mut counts = TextImportCounts::default();
    let mut row_errors = RowErrorLog::default();
    let mut batch: Vec<TextEditionRecord> = Vec::with_capacity(batch_size);

    let mut session = BulkLoadSession::begin(connection, TEXT_TABLES)?;
    for (index, record) in reader.records().enumerate() {
        counts.records_read += 1;
        progress.inc(1);

        let converted = record
            .context("failed to decode row")
            .and_then(|record| converter.convert(&columns.row(&record)));
        match converted {
            Ok(TextRow::Audio) => counts.skipped_audio += 1,
            Ok(TextRow::Edition(record)) => {
                batch.push(record);
                if batch.len() >= batch_size {
                    flush(&mut session, &mut batch, &mut counts, progress, &mut row_errors)?;
                }
            }
            Err(err) => row_errors.record(progress, index + 1, &err),
        }
    }
    flush(&mut session, &mut batch, &mut counts, progress, &mut row_errors)?;
    session.finish()?;

    counts.errors = row_errors.count();
    Ok(counts)
}

fn flush(
    connection: &mut Connection,
    batch: &mut Vec<TextEditionRecord>,
    counts: &mut TextImportCounts,
    progress: &ProgressBar,
    row_errors: &mut RowErrorLog,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }

    let outcome = write_batch(connection, batch, &now_utc_string(), progress, row_errors)?;
    counts.batches += 1;
    counts.processed += outcome.written;
    counts.failed_rows += outcome.failed;
    if outcome.fell_back {
        counts.fallback_batches += 1;
    }
    progress.set_message(format!("written {}", counts.processed));
    batch.clear();
    Ok(())
}
