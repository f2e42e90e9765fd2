use std::collections::BTreeSet;

use anyhow::{Context, Result, bail};
use indicatif::ProgressBar;
use rusqlite::Connection;
use tracing::info;

use super::authors::AuthorResolver;
use super::genres::GenreResolver;
use super::relations::{RowLinks, relink};
use super::upsert::{AudiobookRecord, upsert_audiobooks};
use crate::cli::ImportAudiobooksArgs;
use crate::commands::{
    RowErrorLog, RunContext, ensure_batch_size, last_per_key, make_progress_bar,
};
use crate::db::{BulkLoadSession, open_catalogue};
use crate::model::AudiobookImportCounts;
use crate::normalize::TitleNormalizer;
use crate::slug::audiobook_slug;
use crate::source::{SourceRow, read_all};
use crate::util::{now_utc_string, truncate_chars};

const NORMALIZED_KEY_MAX_CHARS: usize = 500;
const AUTHOR_NORMALIZED_MAX_CHARS: usize = 255;
const REFERENCE_TABLES: &[&str] = &["authors", "genres"];

pub fn run(args: ImportAudiobooksArgs) -> Result<()> {
    ensure_batch_size(args.batch_size)?;
    let context = RunContext::start("import-audiobooks");

    info!(
        file = %args.file.display(),
        db_path = %args.db_path.display(),
        batch_size = args.batch_size,
        "starting audiobook import"
    );

    let rows = read_all(&args.file)?;
    let records_read = rows.len();
    info!(records = records_read, "loaded source rows into memory");

    let mut connection = open_catalogue(&args.db_path)?;
    let progress = make_progress_bar(records_read as u64, "audiobooks")?;
    let counts = import_rows(&mut connection, rows, args.batch_size, &progress)?;
    progress.finish_and_clear();

    info!(
        processed = counts.processed,
        errors = counts.errors,
        batches = counts.batches,
        authors_created = counts.authors_created,
        genres_created = counts.genres_created,
        "audiobook import finished"
    );
    println!(
        "audiobooks: processed {} | errors {}",
        counts.processed, counts.errors
    );

    context.write_summary(
        args.summary_path.as_deref(),
        &args.file,
        records_read,
        &args.db_path,
        args.batch_size,
        counts,
    )
}

#[derive(Debug, Clone)]
pub(crate) struct PreparedAudiobook {
    pub record: AudiobookRecord,
    pub author_key: String,
    pub category_key: String,
}

pub(crate) fn prepare_row(row: &SourceRow, normalizer: &TitleNormalizer) -> Result<PreparedAudiobook> {
    let external_id = row.external_id()?;
    let name = row.name.trim();
    if name.is_empty() {
        bail!("missing required field: name");
    }
    let url = row.url.trim();
    if url.is_empty() {
        bail!("missing required field: url");
    }

    let price = parse_price(&row.price)?;
    let fragments = row.fragments();
    let formats = fragments.format_list();
    let formats = if formats.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&formats).context("failed to encode formats")?)
    };

    let author_key = row.brand.trim().to_string();
    let normalized_key = normalizer.title(name);
    let author_normalized = normalizer.author(&author_key);

    Ok(PreparedAudiobook {
        record: AudiobookRecord {
            external_id,
            name: name.to_string(),
            slug: audiobook_slug(name, external_id),
            description: non_empty(&row.description),
            price,
            url: url.to_string(),
            image_url: non_empty(&row.image),
            formats,
            fragment_url: fragments.fragment_url,
            normalized_key: truncate_chars(&normalized_key, NORMALIZED_KEY_MAX_CHARS).to_string(),
            author_normalized: truncate_chars(&author_normalized, AUTHOR_NORMALIZED_MAX_CHARS)
                .to_string(),
        },
        author_key,
        category_key: row.category.trim().to_string(),
    })
}

fn parse_price(raw: &str) -> Result<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0.0);
    }
    let price = raw
        .parse::<f64>()
        .with_context(|| format!("invalid price: {raw:?}"))?;
    if !price.is_finite() {
        bail!("invalid price: {raw:?}");
    }
    Ok(price)
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub(crate) fn import_rows(
    connection: &mut Connection,
    rows: Vec<csv::Result<SourceRow>>,
    batch_size: usize,
    progress: &ProgressBar,
) -> Result<AudiobookImportCounts> {
    ensure_batch_size(batch_size)?;

    let mut counts = AudiobookImportCounts {
        records_read: rows.len(),
        ..AudiobookImportCounts::default()
    };
    let normalizer = TitleNormalizer::new()?;
    let mut row_errors = RowErrorLog::default();

    let mut prepared = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        let converted = row
            .context("failed to decode row")
            .and_then(|row| prepare_row(&row, &normalizer));
        match converted {
            Ok(row) => prepared.push(row),
            Err(err) => {
                row_errors.record(progress, index + 1, &err);
                progress.inc(1);
            }
        }
    }

    let author_keys: BTreeSet<String> = prepared.iter().map(|row| row.author_key.clone()).collect();
    let category_keys: BTreeSet<String> = prepared
        .iter()
        .map(|row| row.category_key.clone())
        .filter(|category| !category.is_empty())
        .collect();
    info!(
        authors = author_keys.len(),
        categories = category_keys.len(),
        "resolving reference tables"
    );

    let (authors, genres) = {
        let mut session = BulkLoadSession::begin(connection, REFERENCE_TABLES)?;
        let authors = AuthorResolver::load(&session)?.resolve(&mut session, &author_keys)?;
        let genres = GenreResolver::load(&session)?.resolve(&mut session, &category_keys)?;
        session.finish()?;
        (authors, genres)
    };
    counts.authors_resolved = authors.ids.len();
    counts.authors_created = authors.created;
    counts.genre_paths_resolved = genres.ids.len();
    counts.genres_created = genres.created;

    for chunk in prepared.chunks(batch_size) {
        let batch = last_per_key(chunk, |row| row.record.external_id);
        let now = now_utc_string();

        let tx = connection
            .transaction()
            .context("failed to start audiobook batch transaction")?;
        let records: Vec<AudiobookRecord> = batch.iter().map(|row| row.record.clone()).collect();
        let ids = upsert_audiobooks(&tx, &records, &now)?;

        let mut links = Vec::with_capacity(batch.len());
        for row in &batch {
            let external_id = row.record.external_id;
            let audiobook_id = ids
                .get(&external_id)
                .copied()
                .with_context(|| format!("audiobook {external_id} missing after upsert"))?;
            let author_id = authors
                .ids
                .get(&row.author_key)
                .copied()
                .with_context(|| format!("author {:?} was not resolved", row.author_key))?;
            let genre_ids = genres
                .ids
                .get(&row.category_key)
                .cloned()
                .unwrap_or_default();
            links.push(RowLinks {
                audiobook_id,
                author_id,
                genre_ids,
            });
        }

        let link_counts = relink(&tx, &links)?;
        tx.commit().context("failed to commit audiobook batch")?;

        counts.batches += 1;
        counts.processed += batch.len();
        counts.author_links += link_counts.author_links;
        counts.genre_links += link_counts.genre_links;
        progress.inc(chunk.len() as u64);
        progress.set_message(format!("errors {}", row_errors.count()));
    }

    counts.errors = row_errors.count();
    Ok(counts)
}
