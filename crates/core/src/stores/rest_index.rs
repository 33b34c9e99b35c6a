use crate::error::SearchError;
use crate::models::{ChunkRecord, RawHit, UpsertFailure, UpsertReport};
use crate::traits::SearchIndex;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use url::Url;

/// Fields requested back from the index on every query, aligned with the
/// flattened profile stored per chunk.
pub const SELECT_FIELDS: [&str; 29] = [
    "id",
    "chunk_index",
    "content",
    "filepath",
    "org_name",
    "country",
    "address",
    "founded_year",
    "size",
    "industry",
    "is_member",
    "website",
    "members_name",
    "members_title",
    "members_role",
    "facilities_name",
    "facilities_type",
    "facilities_usage",
    "capabilities",
    "projects",
    "awards",
    "services",
    "contacts_name",
    "contacts_email",
    "contacts_phone",
    "addresses",
    "notes",
    "page_from",
    "page_to",
];

const VECTOR_FIELD: &str = "content_vector";

/// Typed client for the remote search index REST surface. All request
/// construction, credentials, and response walking live here; callers only
/// see the [`SearchIndex`] trait.
pub struct RestSearchIndex {
    client: Client,
    endpoint: String,
    index_name: String,
    api_key: String,
    api_version: String,
    vector_dimensions: usize,
}

impl RestSearchIndex {
    pub fn new(
        endpoint: &str,
        index_name: impl Into<String>,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
        vector_dimensions: usize,
    ) -> Result<Self, SearchError> {
        Url::parse(endpoint)?;
        Ok(Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index_name: index_name.into(),
            api_key: api_key.into(),
            api_version: api_version.into(),
            vector_dimensions,
        })
    }

    fn search_url(&self) -> String {
        format!(
            "{}/indexes('{}')/docs/search?api-version={}",
            self.endpoint, self.index_name, self.api_version
        )
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/indexes('{}')/docs/index?api-version={}",
            self.endpoint, self.index_name, self.api_version
        )
    }

    fn definition_url(&self) -> String {
        format!(
            "{}/indexes('{}')?api-version={}",
            self.endpoint, self.index_name, self.api_version
        )
    }

    async fn run_search(&self, body: Value, backend: &str) -> Result<Vec<RawHit>, SearchError> {
        let response = self
            .client
            .post(self.search_url())
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: backend.to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: Value = response.json().await?;
        Ok(hits_from_response(&payload))
    }

    /// Creates the index with the chunk field schema and vector profile when
    /// it does not exist; with `force`, an existing index is dropped first.
    pub async fn ensure_index(&self, force: bool) -> Result<(), SearchError> {
        let existing = self
            .client
            .get(self.definition_url())
            .header("api-key", &self.api_key)
            .send()
            .await?;

        if existing.status() == StatusCode::OK {
            if !force {
                return Ok(());
            }
            let deleted = self
                .client
                .delete(self.definition_url())
                .header("api-key", &self.api_key)
                .send()
                .await?;
            if !deleted.status().is_success() {
                return Err(SearchError::BackendResponse {
                    backend: "search-index".to_string(),
                    details: format!("delete returned {}", deleted.status()),
                });
            }
        } else if !existing.status().is_client_error() {
            return Err(SearchError::BackendResponse {
                backend: "search-index".to_string(),
                details: existing.status().to_string(),
            });
        }

        let response = self
            .client
            .put(self.definition_url())
            .header("api-key", &self.api_key)
            .json(&index_definition(&self.index_name, self.vector_dimensions))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "search-index".to_string(),
                details: format!("index setup failed with {}", response.status()),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl SearchIndex for RestSearchIndex {
    async fn upsert_chunks(&self, chunks: &[ChunkRecord]) -> Result<UpsertReport, SearchError> {
        if chunks.is_empty() {
            return Ok(UpsertReport::default());
        }

        let mut actions = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let Value::Object(mut doc) = serde_json::to_value(chunk)? else {
                return Err(SearchError::Request(
                    "chunk did not serialize to an object".to_string(),
                ));
            };
            doc.insert(
                "@search.action".to_string(),
                Value::String("mergeOrUpload".to_string()),
            );
            actions.push(Value::Object(doc));
        }

        let response = self
            .client
            .post(self.upload_url())
            .header("api-key", &self.api_key)
            .json(&json!({ "value": actions }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::MULTI_STATUS {
            return Err(SearchError::BackendResponse {
                backend: "search-index".to_string(),
                details: status.to_string(),
            });
        }

        let payload: Value = response.json().await?;
        Ok(report_from_response(&payload))
    }

    async fn vector_top_k(&self, vector: &[f32], k: usize) -> Result<Vec<RawHit>, SearchError> {
        let body = json!({
            "select": SELECT_FIELDS.join(","),
            "top": k,
            "search": Value::Null,
            "vectorQueries": [
                {
                    "kind": "vector",
                    "vector": vector,
                    "k": k,
                    "fields": VECTOR_FIELD,
                }
            ],
        });

        self.run_search(body, "vector-search").await
    }

    async fn lexical_top_k(&self, text: &str, k: usize) -> Result<Vec<RawHit>, SearchError> {
        let body = json!({
            "select": SELECT_FIELDS.join(","),
            "top": k,
            "search": text,
        });

        self.run_search(body, "lexical-search").await
    }
}

fn hits_from_response(payload: &Value) -> Vec<RawHit> {
    let items = payload
        .pointer("/value")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut hits = Vec::with_capacity(items.len());
    for item in items {
        let id = item
            .pointer("/id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if id.is_empty() {
            continue;
        }

        let score = item.pointer("/@search.score").and_then(Value::as_f64);

        let mut fields = Map::new();
        for name in SELECT_FIELDS {
            fields.insert(
                name.to_string(),
                item.get(name).cloned().unwrap_or(Value::Null),
            );
        }

        hits.push(RawHit { id, score, fields });
    }

    hits
}

fn report_from_response(payload: &Value) -> UpsertReport {
    let items = payload
        .pointer("/value")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut report = UpsertReport::default();
    for item in items {
        let succeeded = item
            .pointer("/status")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if succeeded {
            report.succeeded += 1;
        } else {
            report.failures.push(UpsertFailure {
                key: item
                    .pointer("/key")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                message: item
                    .pointer("/errorMessage")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown upsert error")
                    .to_string(),
            });
        }
    }

    report
}

fn index_definition(index_name: &str, dimensions: usize) -> Value {
    let mut fields = vec![
        json!({"name": "id", "type": "Edm.String", "key": true, "filterable": true, "sortable": true}),
        json!({"name": "source_id", "type": "Edm.String", "filterable": true, "sortable": true}),
        json!({"name": "chunk_index", "type": "Edm.Int32", "filterable": true, "sortable": true}),
        json!({"name": "content", "type": "Edm.String", "searchable": true, "analyzer": "standard.lucene"}),
        json!({"name": "filepath", "type": "Edm.String", "filterable": true}),
        json!({"name": "page_from", "type": "Edm.Int32", "filterable": true, "sortable": true}),
        json!({"name": "page_to", "type": "Edm.Int32", "filterable": true, "sortable": true}),
        json!({
            "name": VECTOR_FIELD,
            "type": "Collection(Edm.Single)",
            "searchable": true,
            "filterable": false,
            "sortable": false,
            "facetable": false,
            "dimensions": dimensions,
            "vectorSearchProfile": "vector-profile",
        }),
        json!({"name": "org_name", "type": "Edm.String", "searchable": true, "filterable": true, "sortable": true, "facetable": true}),
        json!({"name": "country", "type": "Edm.String", "searchable": true, "filterable": true, "facetable": true}),
        json!({"name": "address", "type": "Edm.String", "searchable": true, "filterable": true}),
        json!({"name": "founded_year", "type": "Edm.Int32", "filterable": true, "sortable": true}),
        json!({"name": "size", "type": "Edm.String", "filterable": true, "facetable": true}),
        json!({"name": "industry", "type": "Edm.String", "searchable": true, "filterable": true, "facetable": true}),
        json!({"name": "is_member", "type": "Edm.Boolean", "filterable": true}),
        json!({"name": "website", "type": "Edm.String", "searchable": true, "filterable": true}),
        json!({"name": "notes", "type": "Edm.String", "searchable": true}),
    ];

    for name in [
        "members_name",
        "members_title",
        "members_role",
        "facilities_name",
        "facilities_type",
        "facilities_usage",
        "capabilities",
        "projects",
        "awards",
        "services",
        "contacts_name",
        "addresses",
    ] {
        fields.push(json!({
            "name": name,
            "type": "Collection(Edm.String)",
            "searchable": true,
            "filterable": true,
        }));
    }
    for name in ["contacts_email", "contacts_phone"] {
        fields.push(json!({
            "name": name,
            "type": "Collection(Edm.String)",
            "searchable": false,
            "filterable": true,
        }));
    }

    json!({
        "name": index_name,
        "fields": fields,
        "vectorSearch": {
            "algorithms": [
                {
                    "name": "hnsw-default",
                    "kind": "hnsw",
                    "hnswParameters": {"m": 4, "efConstruction": 400, "efSearch": 500, "metric": "cosine"},
                }
            ],
            "profiles": [
                {"name": "vector-profile", "algorithm": "hnsw-default"}
            ],
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_parse_scores_and_selected_fields() {
        let payload = json!({
            "value": [
                {
                    "id": "src-0",
                    "@search.score": 0.82,
                    "content": "thermal testing",
                    "org_name": "Acme",
                },
                {
                    "id": "src-1",
                    "content": "no score on this one",
                },
                {
                    "content": "missing id is dropped",
                },
            ]
        });

        let hits = hits_from_response(&payload);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "src-0");
        assert_eq!(hits[0].score, Some(0.82));
        assert_eq!(hits[0].fields["org_name"], json!("Acme"));
        assert_eq!(hits[0].fields["country"], Value::Null);
        assert_eq!(hits[1].score, None);
    }

    #[test]
    fn upsert_report_splits_successes_and_failures() {
        let payload = json!({
            "value": [
                {"key": "a-0", "status": true},
                {"key": "a-1", "status": false, "errorMessage": "too large"},
                {"key": "a-2", "status": true},
            ]
        });

        let report = report_from_response(&payload);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, "a-1");
        assert_eq!(report.failures[0].message, "too large");
    }

    #[test]
    fn index_definition_carries_vector_profile() {
        let definition = index_definition("org-chunks", 1536);
        assert_eq!(definition["name"], json!("org-chunks"));

        let fields = definition["fields"].as_array().expect("fields");
        let vector_field = fields
            .iter()
            .find(|field| field["name"] == json!(VECTOR_FIELD))
            .expect("vector field");
        assert_eq!(vector_field["dimensions"], json!(1536));
        assert_eq!(vector_field["vectorSearchProfile"], json!("vector-profile"));
        assert!(fields.iter().any(|field| field["name"] == json!("is_member")));
    }
}
