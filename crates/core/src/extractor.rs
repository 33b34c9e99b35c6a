use crate::error::{ExtractionAttempt, ExtractionFailure, IngestError};
use crate::models::{BlockKind, ExtractionMethod, StructuralBlock};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use tracing::warn;
use url::Url;

/// Raw output of one extraction backend: flat text, plus structural blocks
/// when the backend is layout-aware.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub blocks: Option<Vec<StructuralBlock>>,
}

#[async_trait]
pub trait DocumentExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument, IngestError>;
}

/// Fast direct-text backend reading page text straight from the file.
#[derive(Default)]
pub struct DirectTextExtractor;

#[async_trait]
impl DocumentExtractor for DirectTextExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::DocumentParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::DocumentParse(error.to_string()))?;
            if !text.trim().is_empty() {
                pages.push(text);
            }
        }

        if pages.is_empty() {
            return Err(IngestError::DocumentParse(format!(
                "document had no readable page text: {}",
                path.display()
            )));
        }

        Ok(ExtractedDocument {
            text: pages.join("\n"),
            blocks: None,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct LayoutRequest {
    document_base64: String,
    source_path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LayoutResponse {
    blocks: Option<Vec<LayoutBlock>>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LayoutBlock {
    #[serde(rename = "type")]
    kind: Option<String>,
    content: Option<String>,
    #[serde(default)]
    page: Option<u32>,
}

/// Layout-analysis backend: posts the base64-encoded document to a remote
/// service and yields paragraph/table/key-value blocks with page numbers.
pub struct LayoutServiceExtractor {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl LayoutServiceExtractor {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, IngestError> {
        Url::parse(endpoint)
            .map_err(|error| IngestError::InvalidArgument(format!("layout endpoint: {error}")))?;
        Ok(Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl DocumentExtractor for LayoutServiceExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument, IngestError> {
        let bytes = tokio::fs::read(path).await.map_err(IngestError::Io)?;
        let payload = LayoutRequest {
            document_base64: STANDARD.encode(bytes),
            source_path: path.to_string_lossy().to_string(),
        };

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(IngestError::DocumentParse(format!(
                "layout service at {} returned {}",
                self.endpoint,
                response.status()
            )));
        }

        let payload: LayoutResponse = response.json().await?;
        payload_to_document(payload, path)
    }
}

fn payload_to_document(
    payload: LayoutResponse,
    path: &Path,
) -> Result<ExtractedDocument, IngestError> {
    if let Some(listed) = payload.blocks {
        let blocks: Vec<StructuralBlock> = listed
            .into_iter()
            .filter_map(|block| {
                let content = block.kind.as_deref().and_then(|kind| {
                    let text = block.content.as_ref()?.trim();
                    if text.is_empty() {
                        return None;
                    }
                    Some((parse_block_kind(kind)?, text.to_string()))
                });
                content.map(|(kind, content)| StructuralBlock {
                    kind,
                    content,
                    page: block.page,
                })
            })
            .collect();

        if !blocks.is_empty() {
            let text = blocks
                .iter()
                .map(|block| block.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            return Ok(ExtractedDocument {
                text,
                blocks: Some(blocks),
            });
        }
    }

    if let Some(text) = payload.text {
        if !text.trim().is_empty() {
            return Ok(ExtractedDocument {
                text: text.trim().to_string(),
                blocks: None,
            });
        }
    }

    Err(IngestError::DocumentParse(format!(
        "layout response had no readable content: {}",
        path.display()
    )))
}

fn parse_block_kind(kind: &str) -> Option<BlockKind> {
    match kind {
        "paragraph" => Some(BlockKind::Paragraph),
        "table" => Some(BlockKind::Table),
        "kv" | "key_value" => Some(BlockKind::KeyValue),
        _ => None,
    }
}

/// Chooses and runs a primary extraction backend with at most one fallback
/// attempt: a two-state machine, never a retry loop.
pub struct ExtractionSelector {
    direct: Box<dyn DocumentExtractor + Send + Sync>,
    layout: Option<Box<dyn DocumentExtractor + Send + Sync>>,
}

impl ExtractionSelector {
    pub fn new(layout: Option<LayoutServiceExtractor>) -> Self {
        Self {
            direct: Box::new(DirectTextExtractor),
            layout: layout
                .map(|extractor| Box::new(extractor) as Box<dyn DocumentExtractor + Send + Sync>),
        }
    }

    pub fn with_backends(
        direct: Box<dyn DocumentExtractor + Send + Sync>,
        layout: Option<Box<dyn DocumentExtractor + Send + Sync>>,
    ) -> Self {
        Self { direct, layout }
    }

    pub async fn extract(
        &self,
        path: &Path,
        method: ExtractionMethod,
        allow_fallback: bool,
    ) -> Result<ExtractedDocument, IngestError> {
        let primary_error = match self.run(method, path).await {
            Ok(document) => return Ok(document),
            Err(error) => error,
        };

        if !allow_fallback {
            return Err(IngestError::Extraction(ExtractionFailure {
                attempts: vec![attempt(method, &primary_error)],
            }));
        }

        let backup = method.backup();
        match self.run(backup, path).await {
            Ok(document) => {
                warn!(
                    primary = %method,
                    fallback = %backup,
                    error = %primary_error,
                    "extraction backend failed, fallback succeeded"
                );
                Ok(document)
            }
            Err(backup_error) => Err(IngestError::Extraction(ExtractionFailure {
                attempts: vec![
                    attempt(method, &primary_error),
                    attempt(backup, &backup_error),
                ],
            })),
        }
    }

    async fn run(
        &self,
        method: ExtractionMethod,
        path: &Path,
    ) -> Result<ExtractedDocument, IngestError> {
        match method {
            ExtractionMethod::DirectText => self.direct.extract(path).await,
            ExtractionMethod::Layout => match &self.layout {
                Some(extractor) => extractor.extract(path).await,
                None => Err(IngestError::DocumentParse(
                    "layout extraction backend not configured".to_string(),
                )),
            },
        }
    }
}

/// Builds the language-model input from structural blocks, preferring
/// paragraphs, then a bounded number of tables and key-value lines.
pub fn build_semantic_text(blocks: &[StructuralBlock], max_chars: usize) -> String {
    static NOISE: OnceLock<Regex> = OnceLock::new();
    let noise = NOISE.get_or_init(|| {
        Regex::new(r"(?i)^(page \d+|\d+|contents|table of contents)$").expect("static pattern")
    });

    let paragraphs: Vec<&str> = blocks
        .iter()
        .filter(|block| block.kind == BlockKind::Paragraph)
        .map(|block| block.content.as_str())
        .filter(|content| !noise.is_match(content.trim()))
        .collect();
    let tables: Vec<&str> = blocks
        .iter()
        .filter(|block| block.kind == BlockKind::Table)
        .take(10)
        .map(|block| block.content.as_str())
        .collect();
    let key_values: Vec<&str> = blocks
        .iter()
        .filter(|block| block.kind == BlockKind::KeyValue)
        .take(100)
        .map(|block| block.content.as_str())
        .collect();

    let mut parts = Vec::new();
    if !paragraphs.is_empty() {
        parts.push(paragraphs.join("\n"));
    }
    if !tables.is_empty() {
        parts.push(tables.join("\n"));
    }
    if !key_values.is_empty() {
        parts.push(key_values.join("\n"));
    }

    let text = parts.join("\n\n");
    text.chars().take(max_chars).collect()
}

/// Default character budget for the semantic-extraction input.
pub const SEMANTIC_TEXT_MAX_CHARS: usize = 12_000;

fn attempt(method: ExtractionMethod, error: &IngestError) -> ExtractionAttempt {
    ExtractionAttempt {
        method: method.to_string(),
        error: error.to_string(),
    }
}
