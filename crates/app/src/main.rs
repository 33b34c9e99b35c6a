use clap::{Parser, Subcommand};
use org_index_core::{
    discover_documents, ChatProfileExtractor, ExtractionMethod, ExtractionSelector,
    HybridSearchCoordinator, InMemoryJobStore, IngestionOptions, IngestionPipeline, JobStore,
    LayoutServiceExtractor, ProfileExtractor, QueryOptions, RestEmbeddingProvider,
    RestSearchIndex,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "org-index", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Search index base URL
    #[arg(long, env = "ORG_INDEX_SEARCH_URL", default_value = "http://localhost:9200")]
    search_url: String,

    /// Search index API key
    #[arg(long, env = "ORG_INDEX_SEARCH_API_KEY", default_value = "")]
    search_api_key: String,

    /// Search index name
    #[arg(long, default_value = "org-chunks")]
    index_name: String,

    /// Search REST API version
    #[arg(long, default_value = "2024-07-01")]
    search_api_version: String,

    /// Embedding provider base URL (OpenAI-compatible)
    #[arg(long, env = "ORG_INDEX_EMBEDDING_URL", default_value = "http://localhost:8080/v1")]
    embedding_url: String,

    /// Embedding provider API key
    #[arg(long, env = "ORG_INDEX_EMBEDDING_API_KEY")]
    embedding_api_key: Option<String>,

    /// Embedding model / deployment name
    #[arg(long, default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Vector width of the index
    #[arg(long, default_value = "1536")]
    embedding_dimensions: usize,

    /// Chat-completions base URL for schema extraction; omit to skip profiles
    #[arg(long, env = "ORG_INDEX_CHAT_URL")]
    chat_url: Option<String>,

    /// Chat-completions API key
    #[arg(long, env = "ORG_INDEX_CHAT_API_KEY")]
    chat_api_key: Option<String>,

    /// Chat model used for schema extraction
    #[arg(long, default_value = "deepseek-chat")]
    chat_model: String,

    /// Layout-analysis service URL; omit to run direct text extraction only
    #[arg(long, env = "ORG_INDEX_LAYOUT_URL")]
    layout_url: Option<String>,

    /// Layout-analysis service API key
    #[arg(long, env = "ORG_INDEX_LAYOUT_API_KEY")]
    layout_api_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Create the search index with the chunk schema and vector profile.
    CreateIndex {
        /// Drop and recreate the index when it already exists.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Ingest documents from a folder (recursive) or an explicit file list.
    Ingest {
        /// Folder scanned recursively for documents.
        #[arg(long, conflicts_with = "files")]
        folder: Option<String>,
        /// Explicit document paths.
        #[arg(long, num_args = 1..)]
        files: Vec<PathBuf>,
        /// Chunk size override in characters.
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Chunk overlap override in characters.
        #[arg(long)]
        chunk_overlap: Option<usize>,
        /// Primary extraction backend.
        #[arg(long, value_parser = parse_method, default_value = "direct_text")]
        extraction_method: ExtractionMethod,
        /// Disable the one-shot fallback to the other backend.
        #[arg(long, default_value_t = false)]
        no_fallback: bool,
        /// Upsert batch size.
        #[arg(long, default_value = "64")]
        batch_size: usize,
    },
    /// Run a hybrid query and print the fused ranking.
    Query {
        /// Query text.
        #[arg(long)]
        text: String,
        /// Weight of the vector signal (0 lexical-only, 1 vector-only).
        #[arg(long, default_value = "0.5")]
        alpha: f64,
        /// Vector sub-query depth.
        #[arg(long, default_value = "10")]
        k_vector: usize,
        /// Lexical sub-query depth.
        #[arg(long, default_value = "10")]
        k_lexical: usize,
        /// Results returned after fusion.
        #[arg(long, default_value = "3")]
        top_n: usize,
        /// Drop hits below this combined score before truncation.
        #[arg(long)]
        min_score: Option<f64>,
        /// Print raw JSON instead of the human listing.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn parse_method(value: &str) -> Result<ExtractionMethod, String> {
    match value {
        "direct_text" => Ok(ExtractionMethod::DirectText),
        "layout" => Ok(ExtractionMethod::Layout),
        other => Err(format!(
            "unknown extraction method '{other}' (expected direct_text or layout)"
        )),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let app_version = env!("CARGO_PKG_VERSION");
    info!(
        version = app_version,
        started_at = %chrono::Utc::now().to_rfc3339(),
        "org-index boot"
    );

    let index = RestSearchIndex::new(
        &cli.search_url,
        &cli.index_name,
        &cli.search_api_key,
        &cli.search_api_version,
        cli.embedding_dimensions,
    )
    .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let embedder = RestEmbeddingProvider::new(&cli.embedding_url, cli.embedding_api_key.clone())
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    match cli.command {
        Command::CreateIndex { force } => {
            index
                .ensure_index(force)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("index '{}' is ready", cli.index_name);
        }
        Command::Ingest {
            folder,
            files,
            chunk_size,
            chunk_overlap,
            extraction_method,
            no_fallback,
            batch_size,
        } => {
            let paths = match folder {
                Some(folder) => discover_documents(std::path::Path::new(&folder)),
                None => files,
            };
            if paths.is_empty() {
                anyhow::bail!("no documents to ingest");
            }

            let layout = match &cli.layout_url {
                Some(endpoint) => Some(
                    LayoutServiceExtractor::new(endpoint, cli.layout_api_key.clone())
                        .map_err(|error| anyhow::anyhow!(error.to_string()))?,
                ),
                None => None,
            };

            let profile_extractor: Option<Box<dyn ProfileExtractor + Send + Sync>> =
                match &cli.chat_url {
                    Some(endpoint) => Some(Box::new(
                        ChatProfileExtractor::new(
                            endpoint,
                            cli.chat_api_key.clone(),
                            &cli.chat_model,
                        )
                        .map_err(|error| anyhow::anyhow!(error.to_string()))?,
                    )),
                    None => None,
                };

            let options = IngestionOptions {
                embedding_model: cli.embedding_model.clone(),
                embedding_dimensions: cli.embedding_dimensions,
                chunk_size,
                chunk_overlap,
                extraction_method,
                extraction_fallback: !no_fallback,
                batch_upload_size: batch_size,
            };

            let pipeline = IngestionPipeline::new(
                index,
                embedder,
                profile_extractor,
                ExtractionSelector::new(layout),
                options,
            );

            let jobs = InMemoryJobStore::new();
            let job_id = Uuid::new_v4().to_string();
            info!(job_id = %job_id, documents = paths.len(), "ingestion started");

            let progress = pipeline.ingest_files(&paths, &job_id, &jobs).await;

            for outcome in &progress.files {
                if outcome.ok {
                    println!(
                        "ok   {} source_id={} chunks={}",
                        outcome.file,
                        outcome.source_id.as_deref().unwrap_or("-"),
                        outcome.chunks.unwrap_or(0)
                    );
                } else {
                    warn!(file = %outcome.file, "document failed");
                    println!(
                        "fail {} error={}",
                        outcome.file,
                        outcome.error.as_deref().unwrap_or("unknown")
                    );
                }
            }

            let progress_json = serde_json::to_string_pretty(&jobs.read(&job_id).await)?;
            println!("job {job_id}:\n{progress_json}");
        }
        Command::Query {
            text,
            alpha,
            k_vector,
            k_lexical,
            top_n,
            min_score,
            json,
        } => {
            let coordinator = HybridSearchCoordinator::new(
                index,
                embedder,
                cli.embedding_model.clone(),
                cli.embedding_dimensions,
            );

            let options = QueryOptions {
                alpha,
                k_vector,
                k_lexical,
                top_n,
                min_combined_score: min_score,
            };

            let hits = coordinator
                .query(&text, &options)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                println!("query: {text}");
                for (rank, hit) in hits.iter().enumerate() {
                    println!(
                        "[{}] combined={:.4} vector_raw={:?} lexical_raw={:?} id={}",
                        rank + 1,
                        hit.combined_score,
                        hit.vector_score_raw,
                        hit.lexical_score_raw,
                        hit.id
                    );
                    if let Some(content) = hit.fields.get("content").and_then(|v| v.as_str()) {
                        let preview: String = content.chars().take(600).collect();
                        println!("  {preview}");
                    }
                    for field in ["org_name", "country", "industry", "contacts_email"] {
                        if let Some(value) = hit.fields.get(field) {
                            if !value.is_null() {
                                println!("  {field}: {value}");
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
