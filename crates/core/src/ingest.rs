use crate::chunking::{chunk_text, ChunkPlan};
use crate::cleaner::clean_text;
use crate::embeddings::{embed_all, EmbeddingProvider};
use crate::error::IngestError;
use crate::extractor::{build_semantic_text, ExtractionSelector, SEMANTIC_TEXT_MAX_CHARS};
use crate::jobs::{FileOutcome, JobProgress, JobStatus, JobStore};
use crate::models::{ChunkRecord, IngestOutcome, IngestionOptions, UpsertReport};
use crate::profile::{OrganizationProfile, ProfileExtractor};
use crate::traits::SearchIndex;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Recursively collects ingestable documents under `folder`, sorted.
pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Sequences one document through extract → clean → profile → chunk →
/// embed → batched index upsert, and runs multi-document jobs with
/// partial-failure tracking.
pub struct IngestionPipeline<I, E>
where
    I: SearchIndex,
    E: EmbeddingProvider,
{
    index: I,
    embedder: E,
    profile_extractor: Option<Box<dyn ProfileExtractor + Send + Sync>>,
    selector: ExtractionSelector,
    options: IngestionOptions,
}

impl<I, E> IngestionPipeline<I, E>
where
    I: SearchIndex + Send + Sync,
    E: EmbeddingProvider + Send + Sync,
{
    pub fn new(
        index: I,
        embedder: E,
        profile_extractor: Option<Box<dyn ProfileExtractor + Send + Sync>>,
        selector: ExtractionSelector,
        options: IngestionOptions,
    ) -> Self {
        Self {
            index,
            embedder,
            profile_extractor,
            selector,
            options,
        }
    }

    pub fn options(&self) -> &IngestionOptions {
        &self.options
    }

    /// Ingests one document. Schema-extraction failures degrade to the
    /// empty profile; embedding and extraction failures are fatal for this
    /// document only.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestOutcome, IngestError> {
        self.validate_chunk_config()?;

        let source_id = Uuid::new_v4().to_string();
        let file = path.display().to_string();
        let checksum = digest_file(path)?;

        let extracted = self
            .selector
            .extract(
                path,
                self.options.extraction_method,
                self.options.extraction_fallback,
            )
            .await?;
        let text = clean_text(&extracted.text);
        let text_len = text.chars().count();

        let flat_profile = match &self.profile_extractor {
            Some(extractor) => {
                let semantic = extracted
                    .blocks
                    .as_deref()
                    .map(|blocks| build_semantic_text(blocks, SEMANTIC_TEXT_MAX_CHARS))
                    .filter(|semantic| !semantic.is_empty());
                let input = semantic.as_deref().unwrap_or(&text);

                let profile = match extractor.extract_raw(input).await {
                    Ok(raw) => OrganizationProfile::normalize(&raw),
                    Err(error) => {
                        warn!(file = %file, error = %error, "schema extraction failed, using empty profile");
                        OrganizationProfile::empty()
                    }
                };
                Some(profile.flatten())
            }
            None => None,
        };

        let plan = ChunkPlan::for_text(text_len, self.options.chunk_size, self.options.chunk_overlap);
        let chunks = chunk_text(&text, plan.size, plan.overlap);

        let vectors = embed_all(
            &self.embedder,
            &chunks,
            &self.options.embedding_model,
            self.options.embedding_dimensions,
        )
        .await
        .map_err(|error| IngestError::Embedding(error.to_string()))?;

        let filepath = fs::canonicalize(path)
            .map(|absolute| absolute.display().to_string())
            .unwrap_or_else(|_| file.clone());

        let chunk_count = chunks.len();
        let mut pending: Vec<ChunkRecord> = Vec::new();
        let mut report = UpsertReport::default();

        for (chunk_index, (content, embedding)) in chunks.into_iter().zip(vectors).enumerate() {
            let mut record = ChunkRecord::new(&source_id, chunk_index, content, filepath.clone());
            record.embedding = embedding;
            record.profile = flat_profile.clone();
            pending.push(record);

            if pending.len() >= self.options.batch_upload_size {
                report.merge(self.flush(&pending).await?);
                pending.clear();
            }
        }
        if !pending.is_empty() {
            report.merge(self.flush(&pending).await?);
        }

        for failure in &report.failures {
            warn!(key = %failure.key, message = %failure.message, "chunk upsert rejected");
        }

        info!(
            file = %file,
            source_id = %source_id,
            chunks = chunk_count,
            chunk_size = plan.size,
            overlap = plan.overlap,
            "document ingested"
        );

        Ok(IngestOutcome {
            file,
            source_id,
            checksum,
            chunk_count,
            chunk_size: plan.size,
            overlap: plan.overlap,
            text_len,
            upsert_failures: report.failures.len(),
        })
    }

    /// Runs a multi-document job: queued → per file extracting → indexing →
    /// done, or `error_partial` when any file failed. One file's failure is
    /// recorded and the job continues with the remaining files.
    pub async fn ingest_files(
        &self,
        paths: &[PathBuf],
        job_id: &str,
        jobs: &dyn JobStore,
    ) -> JobProgress {
        let mut progress = JobProgress::queued(paths.len());
        jobs.set(job_id, progress.clone()).await;

        let mut any_failed = false;

        for (position, path) in paths.iter().enumerate() {
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)
                .unwrap_or_else(|| path.display().to_string());

            progress.status = JobStatus::Extracting;
            progress.current_file = Some(name.clone());
            progress.current = position;
            jobs.set(job_id, progress.clone()).await;

            match self.ingest_file(path).await {
                Ok(outcome) => {
                    progress.status = JobStatus::Indexing;
                    progress.files.push(FileOutcome::success(
                        &name,
                        &outcome.source_id,
                        outcome.chunk_count,
                    ));
                }
                Err(error) => {
                    any_failed = true;
                    warn!(file = %name, error = %error, "document failed, job continues");
                    progress.status = JobStatus::ErrorPartial;
                    progress.files.push(FileOutcome::failure(&name, error.to_string()));
                    progress.errors.push(format!("{name}: {error}"));
                }
            }

            progress.current = position + 1;
            jobs.set(job_id, progress.clone()).await;
        }

        progress.current_file = None;
        progress.status = if any_failed {
            JobStatus::ErrorPartial
        } else {
            JobStatus::Done
        };
        progress.finished_at = Some(Utc::now());
        jobs.set(job_id, progress.clone()).await;

        progress
    }

    fn validate_chunk_config(&self) -> Result<(), IngestError> {
        if let (Some(size), Some(overlap)) = (self.options.chunk_size, self.options.chunk_overlap) {
            let effective = size.max(ChunkPlan::MIN_SIZE);
            if overlap >= effective {
                return Err(IngestError::InvalidChunkConfig(format!(
                    "overlap {overlap} must be smaller than chunk size {effective}"
                )));
            }
        }
        Ok(())
    }

    async fn flush(&self, batch: &[ChunkRecord]) -> Result<UpsertReport, IngestError> {
        self.index
            .upsert_chunks(batch)
            .await
            .map_err(|error| IngestError::IndexUpsert(error.to_string()))
    }
}
