pub mod chunking;
pub mod cleaner;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod jobs;
pub mod models;
pub mod orchestrator;
pub mod profile;
pub mod stores;
pub mod traits;

pub use chunking::{chunk_text, ChunkPlan};
pub use cleaner::clean_text;
pub use embeddings::{
    embed_all, embed_query, reconcile_dimension, EmbeddingProvider, RestEmbeddingProvider,
    DEFAULT_EMBEDDING_DIMENSIONS, EMBED_BATCH_SIZE,
};
pub use error::{ExtractionAttempt, ExtractionFailure, IngestError, SearchError};
pub use extractor::{
    build_semantic_text, DirectTextExtractor, DocumentExtractor, ExtractedDocument,
    ExtractionSelector, LayoutServiceExtractor, SEMANTIC_TEXT_MAX_CHARS,
};
pub use ingest::{digest_file, discover_documents, IngestionPipeline};
pub use jobs::{FileOutcome, InMemoryJobStore, JobProgress, JobStatus, JobStore};
pub use models::{
    BlockKind, ChunkRecord, ExtractionMethod, IngestOutcome, IngestionOptions, QueryHit,
    QueryOptions, RawHit, StructuralBlock, UpsertFailure, UpsertReport,
};
pub use orchestrator::{fuse, min_max_normalize, HybridSearchCoordinator};
pub use profile::{
    ChatProfileExtractor, Contact, Facility, FlatProfile, Member, OrganizationProfile,
    ProfileExtractor,
};
pub use stores::RestSearchIndex;
pub use traits::SearchIndex;
