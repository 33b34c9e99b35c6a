use crate::error::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::cmp::Ordering;
use url::Url;

/// Texts per provider call; downstream providers reject oversized batches.
pub const EMBED_BATCH_SIZE: usize = 16;

/// Default vector width of the remote index.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

#[async_trait]
pub trait EmbeddingProvider {
    /// One vector per input text, order-preserving. Native dimension is not
    /// guaranteed to match the index; callers reconcile.
    async fn embed_batch(
        &self,
        texts: &[String],
        model: &str,
    ) -> Result<Vec<Vec<f32>>, SearchError>;
}

/// Pads with zeros or truncates so the vector is exactly `target_dim` wide.
/// Deterministic and silent: different embedding deployments emit different
/// native widths, but the index has one fixed vector width.
pub fn reconcile_dimension(mut vector: Vec<f32>, target_dim: usize) -> Vec<f32> {
    match vector.len().cmp(&target_dim) {
        Ordering::Equal => vector,
        Ordering::Greater => {
            vector.truncate(target_dim);
            vector
        }
        Ordering::Less => {
            vector.resize(target_dim, 0.0);
            vector
        }
    }
}

/// Embeds every text in batches of [`EMBED_BATCH_SIZE`], reconciling each
/// vector to `target_dim`. Fails if the provider returns a count mismatch.
pub async fn embed_all<E>(
    provider: &E,
    texts: &[String],
    model: &str,
    target_dim: usize,
) -> Result<Vec<Vec<f32>>, SearchError>
where
    E: EmbeddingProvider + ?Sized,
{
    let mut vectors = Vec::with_capacity(texts.len());

    for batch in texts.chunks(EMBED_BATCH_SIZE) {
        let embedded = provider.embed_batch(batch, model).await?;
        if embedded.len() != batch.len() {
            return Err(SearchError::BackendResponse {
                backend: "embeddings".to_string(),
                details: format!("{} vectors for {} inputs", embedded.len(), batch.len()),
            });
        }
        vectors.extend(
            embedded
                .into_iter()
                .map(|vector| reconcile_dimension(vector, target_dim)),
        );
    }

    Ok(vectors)
}

/// Embeds one query text. Empty or whitespace-only text short-circuits to a
/// zero vector without calling the provider.
pub async fn embed_query<E>(
    provider: &E,
    text: &str,
    model: &str,
    target_dim: usize,
) -> Result<Vec<f32>, SearchError>
where
    E: EmbeddingProvider + ?Sized,
{
    if text.trim().is_empty() {
        return Ok(vec![0.0; target_dim]);
    }

    let embedded = provider.embed_batch(&[text.to_string()], model).await?;
    let vector = embedded
        .into_iter()
        .next()
        .ok_or_else(|| SearchError::BackendResponse {
            backend: "embeddings".to_string(),
            details: "empty response for query embedding".to_string(),
        })?;

    Ok(reconcile_dimension(vector, target_dim))
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` client.
pub struct RestEmbeddingProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestEmbeddingProvider {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, SearchError> {
        Url::parse(base_url)?;
        Ok(Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for RestEmbeddingProvider {
    async fn embed_batch(
        &self,
        texts: &[String],
        model: &str,
    ) -> Result<Vec<Vec<f32>>, SearchError> {
        let body = json!({
            "model": model,
            "input": texts,
        });

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "embeddings".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: EmbeddingResponse = response.json().await?;
        Ok(payload.data.into_iter().map(|item| item.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeProvider {
        batch_sizes: Mutex<Vec<usize>>,
        native_dim: usize,
    }

    impl FakeProvider {
        fn new(native_dim: usize) -> Self {
            Self {
                batch_sizes: Mutex::new(Vec::new()),
                native_dim,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FakeProvider {
        async fn embed_batch(
            &self,
            texts: &[String],
            _model: &str,
        ) -> Result<Vec<Vec<f32>>, SearchError> {
            self.batch_sizes.lock().unwrap().push(texts.len());
            Ok(texts
                .iter()
                .enumerate()
                .map(|(index, _)| vec![index as f32; self.native_dim])
                .collect())
        }
    }

    struct RefusingProvider;

    #[async_trait]
    impl EmbeddingProvider for RefusingProvider {
        async fn embed_batch(
            &self,
            _texts: &[String],
            _model: &str,
        ) -> Result<Vec<Vec<f32>>, SearchError> {
            Err(SearchError::Request(
                "provider must not be called".to_string(),
            ))
        }
    }

    #[test]
    fn reconcile_is_identity_at_target() {
        let vector = vec![0.1, 0.2, 0.3];
        assert_eq!(reconcile_dimension(vector.clone(), 3), vector);
    }

    #[test]
    fn reconcile_truncates_and_pads() {
        assert_eq!(reconcile_dimension(vec![1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
        assert_eq!(reconcile_dimension(vec![1.0], 3), vec![1.0, 0.0, 0.0]);
        assert_eq!(reconcile_dimension(Vec::new(), 2), vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn embed_all_walks_texts_in_bounded_batches() {
        let provider = FakeProvider::new(4);
        let texts: Vec<String> = (0..40).map(|i| format!("text {i}")).collect();

        let vectors = embed_all(&provider, &texts, "embed-small", 6)
            .await
            .expect("embedding succeeds");

        assert_eq!(vectors.len(), 40);
        assert!(vectors.iter().all(|v| v.len() == 6));
        assert_eq!(*provider.batch_sizes.lock().unwrap(), vec![16, 16, 8]);
        // order is preserved within each batch
        assert_eq!(vectors[0][0], 0.0);
        assert_eq!(vectors[1][0], 1.0);
        assert_eq!(vectors[17][0], 1.0);
    }

    #[tokio::test]
    async fn degenerate_query_short_circuits_to_zero_vector() {
        let vector = embed_query(&RefusingProvider, "   \n ", "embed-small", 5)
            .await
            .expect("no provider call made");
        assert_eq!(vector, vec![0.0; 5]);
    }

    #[tokio::test]
    async fn query_embedding_is_reconciled() {
        let provider = FakeProvider::new(8);
        let vector = embed_query(&provider, "thermal testing", "embed-small", 4)
            .await
            .expect("embedding succeeds");
        assert_eq!(vector.len(), 4);
    }
}
