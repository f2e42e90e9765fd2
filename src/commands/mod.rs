use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, warn};

use crate::model::{RunSummary, SourceFingerprint};
use crate::util::{now_utc_string, sha256_file, truncate_chars, utc_compact_string, write_json_pretty};

pub mod import_audiobooks;
pub mod import_texts;
pub mod link;
pub mod mark_top;
pub mod status;

const MAX_REPORTED_ROW_ERRORS: usize = 10;
const ROW_ERROR_MAX_CHARS: usize = 200;

#[derive(Debug, Default)]
pub(crate) struct RowErrorLog {
    count: usize,
}

impl RowErrorLog {
    pub(crate) fn record(&mut self, progress: &ProgressBar, row: impl Display, error: &anyhow::Error) {
        self.count += 1;
        if self.count > MAX_REPORTED_ROW_ERRORS {
            return;
        }

        let message = format!("{error:#}");
        let message = truncate_chars(&message, ROW_ERROR_MAX_CHARS);
        progress.suspend(|| warn!(row = %row, error = %message, "skipping row"));
        if self.count == MAX_REPORTED_ROW_ERRORS {
            progress.suspend(|| warn!("further row errors are counted but not logged"));
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }
}

pub(crate) fn make_progress_bar(total: u64, label: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.cyan}} {label:<10} [{{bar:30.cyan/blue}}] {{pos}}/{{len}} {{msg}}"
            ))
            .context("invalid progress bar template")?
            .progress_chars("=> "),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

pub(crate) fn make_spinner(label: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template(&format!("{{spinner:.cyan}} {label:<10} {{pos}} rows {{msg}}"))
            .context("invalid spinner template")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

pub(crate) struct RunContext {
    started: DateTime<Utc>,
    started_at: String,
    command: &'static str,
}

impl RunContext {
    pub(crate) fn start(command: &'static str) -> Self {
        Self {
            started: Utc::now(),
            started_at: now_utc_string(),
            command,
        }
    }

    pub(crate) fn run_id(&self) -> String {
        format!("run-{}", utc_compact_string(self.started))
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn write_summary<C: Serialize>(
        &self,
        summary_path: Option<&Path>,
        source_path: &Path,
        records: usize,
        db_path: &Path,
        batch_size: usize,
        counts: C,
    ) -> Result<()> {
        let Some(summary_path) = summary_path else {
            return Ok(());
        };

        let summary = RunSummary {
            manifest_version: 1,
            run_id: self.run_id(),
            command: self.command.to_string(),
            status: "completed".to_string(),
            started_at: self.started_at.clone(),
            finished_at: now_utc_string(),
            db_path: db_path.display().to_string(),
            batch_size,
            source: SourceFingerprint {
                path: source_path.display().to_string(),
                sha256: sha256_file(source_path)?,
                records,
            },
            counts,
        };

        write_json_pretty(summary_path, &summary)?;
        info!(path = %summary_path.display(), "wrote run summary");
        Ok(())
    }
}

pub(crate) fn last_per_key<T, K, F>(items: &[T], key: F) -> Vec<&T>
where
    K: Eq + Hash + Copy,
    F: Fn(&T) -> K,
{
    let mut last_index: HashMap<K, usize> = HashMap::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        last_index.insert(key(item), index);
    }

    let mut emitted = HashSet::with_capacity(last_index.len());
    let mut kept = Vec::with_capacity(last_index.len());
    for item in items {
        let item_key = key(item);
        if emitted.insert(item_key) {
            if let Some(&index) = last_index.get(&item_key) {
                kept.push(&items[index]);
            }
        }
    }
    kept
}

pub(crate) fn ensure_batch_size(batch_size: usize) -> Result<()> {
    anyhow::ensure!(batch_size > 0, "--batch-size must be at least 1");
    Ok(())
}
