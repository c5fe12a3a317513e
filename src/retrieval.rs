//! Retrieval backends.
//!
//! Defines the [`Retriever`] trait and its two implementations:
//! - **[`UpstashRetriever`]** calls a hosted vector index over REST
//!   (`POST {url}/query-data`, the service embeds the raw query text).
//! - **[`LocalRetriever`]** ranks the in-memory knowledge chunks with the
//!   keyword [`Ranker`](crate::rank::Ranker). It never fails.
//!
//! # Provider Selection
//!
//! | Config Value | Primary retriever |
//! |-------------|-------------------|
//! | `"disabled"` | [`LocalRetriever`] |
//! | `"upstash"` | [`UpstashRetriever`] |
//!
//! The remote retriever makes a single attempt per query with the configured
//! timeout. Callers treat any [`BackendError`] as "no results" and fall back
//! to local ranking.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetrievalConfig;
use crate::error::BackendError;
use crate::knowledge::KnowledgeBase;
use crate::models::{ChunkKind, KnowledgeChunk, SearchResult};
use crate::rank::Ranker;

const UPSTASH: &str = "upstash";

/// One retrieval call.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalRequest<'a> {
    pub query: &'a str,
    pub top_k: usize,
    /// Category or topic terms that boost matching candidates.
    pub focus: &'a [&'a str],
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Short provider name, used in logs and the health report.
    fn name(&self) -> &str;

    /// Whether answers depend on state outside this process.
    fn is_remote(&self) -> bool;

    async fn retrieve(&self, request: &RetrievalRequest<'_>)
        -> Result<Vec<SearchResult>, BackendError>;
}

// ============ Local Retriever ============

/// Keyword ranking over the loaded knowledge chunks.
///
/// Scores are normalized against the best candidate so the top result is
/// `1.0` and the rest fall in `(0.0, 1.0]`.
pub struct LocalRetriever {
    knowledge: Arc<KnowledgeBase>,
    ranker: Ranker,
}

impl LocalRetriever {
    pub fn new(knowledge: Arc<KnowledgeBase>, ranker: Ranker) -> Self {
        Self { knowledge, ranker }
    }
}

#[async_trait]
impl Retriever for LocalRetriever {
    fn name(&self) -> &str {
        "local"
    }

    fn is_remote(&self) -> bool {
        false
    }

    async fn retrieve(
        &self,
        request: &RetrievalRequest<'_>,
    ) -> Result<Vec<SearchResult>, BackendError> {
        let ranker = self.ranker.with_cap(request.top_k.min(self.ranker.cap()));
        let ranked = ranker.rank(request.query, self.knowledge.chunks(), request.focus);

        let best = ranked.first().map(|c| c.score).unwrap_or(0).max(1) as f64;
        Ok(ranked
            .into_iter()
            .map(|c| SearchResult {
                chunk: c.item.clone(),
                score: c.score as f64 / best,
            })
            .collect())
    }
}

// ============ Upstash Retriever ============

/// Hosted vector index reached over the Upstash REST API.
///
/// The HTTP client is built once and reused for every query.
pub struct UpstashRetriever {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl UpstashRetriever {
    /// Build from config. The URL comes from `retrieval.url` or
    /// `UPSTASH_VECTOR_REST_URL`; the token from the environment.
    pub fn new(config: &RetrievalConfig) -> Result<Self, BackendError> {
        let url = config
            .resolved_url()
            .ok_or_else(|| BackendError::NotConfigured {
                backend: UPSTASH,
                reason: "UPSTASH_VECTOR_REST_URL not set".to_string(),
            })?;
        let token = config
            .resolved_token()
            .ok_or_else(|| BackendError::NotConfigured {
                backend: UPSTASH,
                reason: "UPSTASH_VECTOR_REST_READONLY_TOKEN or UPSTASH_VECTOR_REST_TOKEN not set"
                    .to_string(),
            })?;
        Self::with_endpoint(url, token, Duration::from_secs(config.timeout_secs))
    }

    pub fn with_endpoint(
        url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| BackendError::Http {
                backend: UPSTASH,
                source,
            })?;
        Ok(Self {
            client,
            url: url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    result: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: Value,
    score: f64,
    #[serde(default)]
    metadata: Option<Value>,
}

#[async_trait]
impl Retriever for UpstashRetriever {
    fn name(&self) -> &str {
        UPSTASH
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn retrieve(
        &self,
        request: &RetrievalRequest<'_>,
    ) -> Result<Vec<SearchResult>, BackendError> {
        let body = serde_json::json!({
            "data": request.query,
            "topK": request.top_k,
            "includeMetadata": true,
        });

        let response = self
            .client
            .post(format!("{}/query-data", self.url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|source| BackendError::Http {
                backend: UPSTASH,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                backend: UPSTASH,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: QueryResponse = response.json().await.map_err(|e| BackendError::Malformed {
            backend: UPSTASH,
            reason: e.to_string(),
        })?;

        Ok(parsed.result.into_iter().map(match_to_result).collect())
    }
}

/// Map one index match to a [`SearchResult`]. Missing metadata fields
/// degrade to empty values.
fn match_to_result(m: QueryMatch) -> SearchResult {
    let meta = m.metadata.unwrap_or(Value::Null);
    let text = |key: &str| meta.get(key).and_then(Value::as_str).unwrap_or("").to_string();
    let strings = |key: &str| -> Vec<String> {
        meta.get(key)
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    };

    let id = match &m.id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let content = Some(text("content"))
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| text("description"));
    let kind = meta
        .get("type")
        .and_then(Value::as_str)
        .map(ChunkKind::from_type)
        .unwrap_or_else(|| ChunkKind::Other("unknown".to_string()));

    let mut chunk = KnowledgeChunk::new(id, kind, text("title"), content);
    chunk.tags = strings("tags");
    chunk.examples = strings("examples");
    if let Some(importance) = meta.get("importance").and_then(Value::as_str) {
        chunk.importance = importance.to_string();
    }
    chunk.date_range = Some(text("date_range")).filter(|d| !d.is_empty());

    SearchResult {
        chunk,
        score: m.score,
    }
}

/// Create the primary retriever for `config`.
///
/// # Errors
///
/// Returns [`BackendError::NotConfigured`] when `upstash` is selected but
/// the URL or token is missing.
pub fn create_retriever(
    config: &RetrievalConfig,
    knowledge: Arc<KnowledgeBase>,
) -> Result<Arc<dyn Retriever>, BackendError> {
    match config.provider.as_str() {
        "upstash" => Ok(Arc::new(UpstashRetriever::new(config)?)),
        _ => Ok(Arc::new(LocalRetriever::new(
            knowledge,
            Ranker::from_config(config),
        ))),
    }
}
