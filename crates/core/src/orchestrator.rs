use crate::embeddings::{embed_query, EmbeddingProvider};
use crate::error::SearchError;
use crate::models::{QueryHit, QueryOptions, RawHit};
use crate::traits::SearchIndex;
use std::collections::HashMap;
use tracing::debug;

/// Fuses a vector-only and a lexical-only ranking from the same index into
/// one result list. The two lookups are independent and run concurrently.
pub struct HybridSearchCoordinator<I, E>
where
    I: SearchIndex,
    E: EmbeddingProvider,
{
    index: I,
    embedder: E,
    embedding_model: String,
    embedding_dimensions: usize,
}

impl<I, E> HybridSearchCoordinator<I, E>
where
    I: SearchIndex + Send + Sync,
    E: EmbeddingProvider + Send + Sync,
{
    pub fn new(
        index: I,
        embedder: E,
        embedding_model: impl Into<String>,
        embedding_dimensions: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            embedding_model: embedding_model.into(),
            embedding_dimensions,
        }
    }

    pub async fn query(
        &self,
        text: &str,
        options: &QueryOptions,
    ) -> Result<Vec<QueryHit>, SearchError> {
        if text.trim().is_empty() {
            return Err(SearchError::Request("query text is empty".to_string()));
        }
        if !(0.0..=1.0).contains(&options.alpha) {
            return Err(SearchError::Request(format!(
                "alpha {} must be within [0, 1]",
                options.alpha
            )));
        }
        if options.top_n == 0 {
            return Err(SearchError::Request("top_n must be at least 1".to_string()));
        }

        let query_vector = embed_query(
            &self.embedder,
            text,
            &self.embedding_model,
            self.embedding_dimensions,
        )
        .await?;

        let (vector_hits, lexical_hits) = tokio::try_join!(
            self.index.vector_top_k(&query_vector, options.k_vector),
            self.index.lexical_top_k(text, options.k_lexical),
        )?;

        debug!(
            vector_hits = vector_hits.len(),
            lexical_hits = lexical_hits.len(),
            "fusing sub-query results"
        );

        let mut hits = fuse(&vector_hits, &lexical_hits, options.alpha);
        if let Some(min_score) = options.min_combined_score {
            hits.retain(|hit| hit.combined_score >= min_score);
        }
        hits.truncate(options.top_n);
        Ok(hits)
    }
}

/// Min-max rescaling over one method's raw scores. No numeric scores maps
/// everything to 0; a constant list maps every scored item to 1 so ties all
/// rank equally; an unscored item always normalizes to 0.
pub fn min_max_normalize(scores: &[Option<f64>]) -> Vec<f64> {
    let numeric: Vec<f64> = scores.iter().filter_map(|score| *score).collect();
    if numeric.is_empty() {
        return vec![0.0; scores.len()];
    }

    let min = numeric.iter().copied().fold(f64::INFINITY, f64::min);
    let max = numeric.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if max <= min {
        return scores
            .iter()
            .map(|score| if score.is_some() { 1.0 } else { 0.0 })
            .collect();
    }

    scores
        .iter()
        .map(|score| match score {
            Some(value) => (value - min) / (max - min),
            None => 0.0,
        })
        .collect()
}

/// Merges the two ranked lists by chunk id (vector list first, preserving
/// first-insertion order), zero-filling the method an id is missing from,
/// then orders by `alpha * vector_norm + (1 - alpha) * lexical_norm`.
/// The sort is stable, so tied scores keep their merge order.
pub fn fuse(vector_hits: &[RawHit], lexical_hits: &[RawHit], alpha: f64) -> Vec<QueryHit> {
    let vector_norms = min_max_normalize(&score_column(vector_hits));
    let lexical_norms = min_max_normalize(&score_column(lexical_hits));

    let mut merged: Vec<QueryHit> = Vec::new();
    let mut slot_by_id: HashMap<String, usize> = HashMap::new();

    for (hit, norm) in vector_hits.iter().zip(&vector_norms) {
        let slot = merge_slot(&mut merged, &mut slot_by_id, hit);
        merged[slot].vector_score_raw = hit.score;
        merged[slot].vector_score_norm = *norm;
    }

    for (hit, norm) in lexical_hits.iter().zip(&lexical_norms) {
        let slot = merge_slot(&mut merged, &mut slot_by_id, hit);
        merged[slot].lexical_score_raw = hit.score;
        merged[slot].lexical_score_norm = *norm;
        if merged[slot].fields.is_empty() {
            merged[slot].fields = hit.fields.clone();
        }
    }

    for hit in &mut merged {
        hit.combined_score =
            alpha * hit.vector_score_norm + (1.0 - alpha) * hit.lexical_score_norm;
    }

    merged.sort_by(|left, right| right.combined_score.total_cmp(&left.combined_score));
    merged
}

fn score_column(hits: &[RawHit]) -> Vec<Option<f64>> {
    hits.iter().map(|hit| hit.score).collect()
}

fn merge_slot(
    merged: &mut Vec<QueryHit>,
    slot_by_id: &mut HashMap<String, usize>,
    hit: &RawHit,
) -> usize {
    if let Some(slot) = slot_by_id.get(&hit.id) {
        return *slot;
    }

    merged.push(QueryHit {
        id: hit.id.clone(),
        vector_score_raw: None,
        lexical_score_raw: None,
        vector_score_norm: 0.0,
        lexical_score_norm: 0.0,
        combined_score: 0.0,
        fields: hit.fields.clone(),
    });
    let slot = merged.len() - 1;
    slot_by_id.insert(hit.id.clone(), slot);
    slot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkRecord, UpsertReport};
    use async_trait::async_trait;
    use serde_json::{json, Map};

    struct FakeIndex {
        vector: Vec<RawHit>,
        lexical: Vec<RawHit>,
    }

    #[async_trait]
    impl SearchIndex for FakeIndex {
        async fn upsert_chunks(&self, _: &[ChunkRecord]) -> Result<UpsertReport, SearchError> {
            Ok(UpsertReport::default())
        }

        async fn vector_top_k(&self, _: &[f32], _: usize) -> Result<Vec<RawHit>, SearchError> {
            Ok(self.vector.clone())
        }

        async fn lexical_top_k(&self, _: &str, _: usize) -> Result<Vec<RawHit>, SearchError> {
            Ok(self.lexical.clone())
        }
    }

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed_batch(
            &self,
            texts: &[String],
            _model: &str,
        ) -> Result<Vec<Vec<f32>>, SearchError> {
            Ok(texts.iter().map(|_| vec![0.1; 4]).collect())
        }
    }

    fn hit(id: &str, score: Option<f64>) -> RawHit {
        let mut fields = Map::new();
        fields.insert("content".to_string(), json!(format!("content of {id}")));
        RawHit {
            id: id.to_string(),
            score,
            fields,
        }
    }

    fn coordinator(
        vector: Vec<RawHit>,
        lexical: Vec<RawHit>,
    ) -> HybridSearchCoordinator<FakeIndex, FakeEmbedder> {
        HybridSearchCoordinator::new(FakeIndex { vector, lexical }, FakeEmbedder, "embed-small", 4)
    }

    #[test]
    fn constant_scores_normalize_to_one() {
        let norms = min_max_normalize(&[Some(7.0), Some(7.0), None]);
        assert_eq!(norms, vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn missing_scores_normalize_to_zero() {
        assert_eq!(min_max_normalize(&[None, None]), vec![0.0, 0.0]);
        assert!(min_max_normalize(&[]).is_empty());
    }

    #[test]
    fn minmax_spreads_scores_over_unit_interval() {
        let norms = min_max_normalize(&[Some(2.0), Some(6.0), Some(4.0)]);
        assert_eq!(norms, vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn alpha_one_reproduces_vector_order() {
        let vector = vec![hit("v1", Some(0.9)), hit("v2", Some(0.5)), hit("v3", Some(0.2))];
        let lexical = vec![hit("v3", Some(9.0)), hit("v2", Some(5.0)), hit("v1", Some(1.0))];

        let fused = fuse(&vector, &lexical, 1.0);
        let ids: Vec<&str> = fused.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v2", "v3"]);
    }

    #[test]
    fn alpha_zero_reproduces_lexical_order() {
        let vector = vec![hit("v1", Some(0.9)), hit("v2", Some(0.5)), hit("v3", Some(0.2))];
        let lexical = vec![hit("v3", Some(9.0)), hit("v2", Some(5.0)), hit("v1", Some(1.0))];

        let fused = fuse(&vector, &lexical, 0.0);
        let ids: Vec<&str> = fused.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["v3", "v2", "v1"]);
    }

    #[test]
    fn single_method_ids_zero_fill_the_missing_signal() {
        let vector = vec![hit("both", Some(0.8)), hit("vector-only", Some(0.4))];
        let lexical = vec![hit("both", Some(12.0)), hit("lexical-only", Some(3.0))];

        let fused = fuse(&vector, &lexical, 0.5);
        let by_id: HashMap<&str, &QueryHit> =
            fused.iter().map(|h| (h.id.as_str(), h)).collect();

        let vector_only = by_id["vector-only"];
        assert_eq!(vector_only.lexical_score_raw, None);
        assert_eq!(vector_only.lexical_score_norm, 0.0);

        let lexical_only = by_id["lexical-only"];
        assert_eq!(lexical_only.vector_score_raw, None);
        assert_eq!(lexical_only.vector_score_norm, 0.0);
        assert!(!lexical_only.fields.is_empty());

        let both = by_id["both"];
        assert_eq!(both.vector_score_norm, 1.0);
        assert_eq!(both.lexical_score_norm, 1.0);
        assert_eq!(both.combined_score, 1.0);
    }

    #[test]
    fn ties_keep_merge_insertion_order() {
        let vector = vec![hit("first", Some(0.5)), hit("second", Some(0.5))];
        let fused = fuse(&vector, &[], 1.0);
        assert_eq!(fused[0].id, "first");
        assert_eq!(fused[1].id, "second");
        assert_eq!(fused[0].combined_score, fused[1].combined_score);
    }

    #[tokio::test]
    async fn query_truncates_to_top_n() {
        let vector = vec![
            hit("a", Some(0.9)),
            hit("b", Some(0.8)),
            hit("c", Some(0.7)),
            hit("d", Some(0.6)),
        ];
        let engine = coordinator(vector, Vec::new());

        let hits = engine
            .query(
                "thermal testing services",
                &QueryOptions {
                    top_n: 2,
                    ..QueryOptions::default()
                },
            )
            .await
            .expect("query succeeds");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.combined_score)));
    }

    #[tokio::test]
    async fn min_combined_score_filters_before_truncation() {
        let vector = vec![hit("a", Some(0.9)), hit("b", Some(0.1))];
        let engine = coordinator(vector, Vec::new());

        let hits = engine
            .query(
                "thermal",
                &QueryOptions {
                    min_combined_score: Some(0.75),
                    ..QueryOptions::default()
                },
            )
            .await
            .expect("query succeeds");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn empty_sub_results_are_not_an_error() {
        let engine = coordinator(Vec::new(), Vec::new());
        let hits = engine
            .query("anything", &QueryOptions::default())
            .await
            .expect("empty result is fine");
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn validation_rejects_before_any_remote_call() {
        let engine = coordinator(Vec::new(), Vec::new());

        let empty = engine.query("   ", &QueryOptions::default()).await;
        assert!(matches!(empty, Err(SearchError::Request(_))));

        let bad_alpha = engine
            .query(
                "thermal",
                &QueryOptions {
                    alpha: 1.5,
                    ..QueryOptions::default()
                },
            )
            .await;
        assert!(matches!(bad_alpha, Err(SearchError::Request(_))));

        let zero_top = engine
            .query(
                "thermal",
                &QueryOptions {
                    top_n: 0,
                    ..QueryOptions::default()
                },
            )
            .await;
        assert!(matches!(zero_top, Err(SearchError::Request(_))));
    }
}
