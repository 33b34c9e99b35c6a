use thiserror::Error;

/// One failed attempt of an extraction backend.
#[derive(Debug, Clone)]
pub struct ExtractionAttempt {
    pub method: String,
    pub error: String,
}

/// Every backend that was tried for a document, with its error.
#[derive(Debug, Clone)]
pub struct ExtractionFailure {
    pub attempts: Vec<ExtractionAttempt>,
}

impl std::fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let detail = self
            .attempts
            .iter()
            .map(|attempt| format!("{}: {}", attempt.method, attempt.error))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{detail}")
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document parse error: {0}")]
    DocumentParse(String),

    #[error("extraction failed ({0})")]
    Extraction(ExtractionFailure),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding provider failed: {0}")]
    Embedding(String),

    #[error("index upsert failed: {0}")]
    IndexUpsert(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
