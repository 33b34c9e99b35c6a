use crate::profile::FlatProfile;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Extraction backend to run first for a document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Fast flat-text extraction straight from the file.
    DirectText,
    /// Layout-analysis service that also yields structural blocks.
    Layout,
}

impl ExtractionMethod {
    pub fn backup(self) -> Self {
        match self {
            Self::DirectText => Self::Layout,
            Self::Layout => Self::DirectText,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectText => "direct_text",
            Self::Layout => "layout",
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Table,
    KeyValue,
}

/// One typed fragment from the layout-aware extraction backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuralBlock {
    pub kind: BlockKind,
    pub content: String,
    pub page: Option<u32>,
}

/// The unit of indexing: one bounded slice of a document plus the flattened
/// organization profile shared by every chunk of that document.
///
/// `id` is deterministic (`{source_id}-{chunk_index}`), so re-ingesting the
/// same source id overwrites prior chunks instead of duplicating them.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkRecord {
    pub id: String,
    pub source_id: String,
    pub chunk_index: usize,
    pub content: String,
    pub filepath: String,
    pub page_from: Option<u32>,
    pub page_to: Option<u32>,
    #[serde(rename = "content_vector")]
    pub embedding: Vec<f32>,
    #[serde(flatten)]
    pub profile: Option<FlatProfile>,
}

impl ChunkRecord {
    pub fn new(source_id: &str, chunk_index: usize, content: String, filepath: String) -> Self {
        Self {
            id: format!("{source_id}-{chunk_index}"),
            source_id: source_id.to_string(),
            chunk_index,
            content,
            filepath,
            page_from: None,
            page_to: None,
            embedding: Vec::new(),
            profile: None,
        }
    }
}

/// One raw hit from a single retrieval method, before fusion.
#[derive(Debug, Clone)]
pub struct RawHit {
    pub id: String,
    pub score: Option<f64>,
    pub fields: Map<String, Value>,
}

/// One fused retrieval result.
#[derive(Debug, Clone, Serialize)]
pub struct QueryHit {
    pub id: String,
    pub vector_score_raw: Option<f64>,
    pub lexical_score_raw: Option<f64>,
    pub vector_score_norm: f64,
    pub lexical_score_norm: f64,
    pub combined_score: f64,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Weight of the vector signal; `1 - alpha` goes to the lexical signal.
    pub alpha: f64,
    pub k_vector: usize,
    pub k_lexical: usize,
    pub top_n: usize,
    /// Hits below this combined score are dropped before truncation.
    pub min_combined_score: Option<f64>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            k_vector: 10,
            k_lexical: 10,
            top_n: 3,
            min_combined_score: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    /// None picks a size from the text length.
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub extraction_method: ExtractionMethod,
    pub extraction_fallback: bool,
    pub batch_upload_size: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
            chunk_size: None,
            chunk_overlap: None,
            extraction_method: ExtractionMethod::DirectText,
            extraction_fallback: true,
            batch_upload_size: 64,
        }
    }
}

/// Per-item failure surfaced by a batched index upsert.
#[derive(Debug, Clone, Serialize)]
pub struct UpsertFailure {
    pub key: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpsertReport {
    pub succeeded: usize,
    pub failures: Vec<UpsertFailure>,
}

impl UpsertReport {
    pub fn merge(&mut self, other: UpsertReport) {
        self.succeeded += other.succeeded;
        self.failures.extend(other.failures);
    }
}

/// Result of ingesting one source document.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub file: String,
    pub source_id: String,
    pub checksum: String,
    pub chunk_count: usize,
    pub chunk_size: usize,
    pub overlap: usize,
    pub text_len: usize,
    pub upsert_failures: usize,
}
