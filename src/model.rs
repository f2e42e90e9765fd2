use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SourceFingerprint {
    pub path: String,
    pub sha256: String,
    pub records: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<C: Serialize> {
    pub manifest_version: u32,
    pub run_id: String,
    pub command: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: String,
    pub db_path: String,
    pub batch_size: usize,
    pub source: SourceFingerprint,
    pub counts: C,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AudiobookImportCounts {
    pub records_read: usize,
    pub processed: usize,
    pub errors: usize,
    pub batches: usize,
    pub authors_resolved: usize,
    pub authors_created: usize,
    pub genre_paths_resolved: usize,
    pub genres_created: usize,
    pub author_links: usize,
    pub genre_links: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TextImportCounts {
    pub records_read: usize,
    pub processed: usize,
    pub skipped_audio: usize,
    pub errors: usize,
    pub batches: usize,
    pub fallback_batches: usize,
    pub failed_rows: usize,
}
