use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Extracting,
    Indexing,
    ErrorPartial,
    Done,
    Unknown,
}

/// Outcome of one file within an ingestion job.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub file: String,
    pub ok: bool,
    pub source_id: Option<String>,
    pub chunks: Option<usize>,
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn success(file: impl Into<String>, source_id: impl Into<String>, chunks: usize) -> Self {
        Self {
            file: file.into(),
            ok: true,
            source_id: Some(source_id.into()),
            chunks: Some(chunks),
            error: None,
        }
    }

    pub fn failure(file: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ok: false,
            source_id: None,
            chunks: None,
            error: Some(error.into()),
        }
    }
}

/// Progress record for one ingestion job. Mutated only by the ingestion
/// pipeline, one write at a time; read-only to everyone else.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub status: JobStatus,
    pub current: usize,
    pub total: usize,
    pub current_file: Option<String>,
    pub files: Vec<FileOutcome>,
    pub errors: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobProgress {
    pub fn queued(total: usize) -> Self {
        Self {
            status: JobStatus::Queued,
            current: 0,
            total,
            current_file: None,
            files: Vec::new(),
            errors: Vec::new(),
            started_at: Some(Utc::now()),
            finished_at: None,
        }
    }

    /// The record returned for job ids nobody has seen.
    pub fn unknown() -> Self {
        Self {
            status: JobStatus::Unknown,
            current: 0,
            total: 0,
            current_file: None,
            files: Vec::new(),
            errors: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Narrow key-value store for job progress, injected into the ingestion
/// pipeline so it stays testable without a process-wide table.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, job_id: &str) -> Option<JobProgress>;
    async fn set(&self, job_id: &str, progress: JobProgress);

    /// Reader surface: unknown job ids yield a distinct `unknown` record
    /// instead of an error.
    async fn read(&self, job_id: &str) -> JobProgress {
        self.get(job_id).await.unwrap_or_else(JobProgress::unknown)
    }
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, JobProgress>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get(&self, job_id: &str) -> Option<JobProgress> {
        self.jobs.lock().await.get(job_id).cloned()
    }

    async fn set(&self, job_id: &str, progress: JobProgress) {
        self.jobs.lock().await.insert(job_id.to_string(), progress);
    }
}
