use crate::error::SearchError;
use crate::models::{ChunkRecord, RawHit, UpsertReport};
use async_trait::async_trait;

/// The remote search index consumed by both pipelines: merge-semantics
/// upserts keyed by chunk id, plus two independent top-k query modes over
/// the same documents.
#[async_trait]
pub trait SearchIndex {
    /// Upserts one batch. Per-item failures are surfaced in the report, not
    /// as an error; only a failed request is an `Err`.
    async fn upsert_chunks(&self, chunks: &[ChunkRecord]) -> Result<UpsertReport, SearchError>;

    /// Vector-only top-k against the embedding field.
    async fn vector_top_k(&self, vector: &[f32], k: usize) -> Result<Vec<RawHit>, SearchError>;

    /// Lexical-only top-k against the text field.
    async fn lexical_top_k(&self, text: &str, k: usize) -> Result<Vec<RawHit>, SearchError>;
}
