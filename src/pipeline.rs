//! The answer pipeline.
//!
//! One [`TwinPipeline`] is built per process and shared behind an `Arc`. For
//! each query it runs:
//!
//! ```text
//! validate → cache lookup → exact Q&A match
//!          → classify ─┬─ stakeholder_management → soft-skill route
//!                      ├─ methodologies          → best Q&A answer
//!                      └─ everything else        → retrieval route
//! ```
//!
//! The retrieval route queries the primary [`Retriever`]; when it is remote
//! and fails or returns nothing at or above `similarity_threshold`, the local
//! keyword ranker over the knowledge base takes over. The results go to the
//! [`Generator`], and a failed remote generation falls back to the template
//! composer. No backend failure reaches the caller: the only error a query
//! can produce is a [`QueryError`].

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cache::AnswerCache;
use crate::classify::{detect_topic, Category, Classifier, Topic};
use crate::compose;
use crate::config::Config;
use crate::error::QueryError;
use crate::generation::{create_generator, ComposingGenerator, GenerationRequest, Generator};
use crate::knowledge::KnowledgeBase;
use crate::models::{ChunkKind, SearchResult};
use crate::rank::{QueryTerms, Ranker};
use crate::retrieval::{create_retriever, LocalRetriever, RetrievalRequest, Retriever};

/// Which route produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// Remote chat-completion output.
    Generated,
    /// Template composer over retrieved snippets.
    Composed,
    /// Soft-skill composition.
    SoftSkills,
    /// A curated interview answer.
    InterviewQa,
    /// A fixed sentence; nothing relevant was found.
    Fallback,
}

impl AnswerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerSource::Generated => "generated",
            AnswerSource::Composed => "composed",
            AnswerSource::SoftSkills => "soft_skills",
            AnswerSource::InterviewQa => "interview_qa",
            AnswerSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub content: String,
    pub category: Category,
    /// Remote retrieval results at or above the similarity threshold.
    pub vector_hits: usize,
    pub source: AnswerSource,
    pub cached: bool,
}

/// Which backends the pipeline ended up with.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub retriever: String,
    pub generator: String,
    pub remote_retrieval: bool,
    pub remote_generation: bool,
    pub cache_active: bool,
}

/// Response metadata shared by the HTTP handler and `twin ask --json`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryMetadata {
    pub timestamp: String,
    pub query_length: usize,
    pub response_length: usize,
    /// Seconds, rounded to milliseconds.
    pub response_time: f64,
    pub vector_hits: usize,
    pub category: Category,
    pub source: AnswerSource,
    pub cached: bool,
    pub logged: bool,
}

impl QueryMetadata {
    pub fn new(query: &str, answer: &Answer, elapsed: Duration, logged: bool) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            query_length: query.trim().chars().count(),
            response_length: answer.content.chars().count(),
            response_time: (elapsed.as_secs_f64() * 1000.0).round() / 1000.0,
            vector_hits: answer.vector_hits,
            category: answer.category,
            source: answer.source,
            cached: answer.cached,
            logged,
        }
    }
}

/// Trim and bound-check a raw query.
pub fn validate_query(raw: &str, max_chars: usize) -> Result<&str, QueryError> {
    let query = raw.trim();
    if query.is_empty() {
        return Err(QueryError::Empty);
    }
    let len = query.chars().count();
    if len > max_chars {
        return Err(QueryError::TooLong {
            len,
            max: max_chars,
        });
    }
    Ok(query)
}

pub struct TwinPipeline {
    knowledge: Arc<KnowledgeBase>,
    classifier: Classifier,
    ranker: Ranker,
    retriever: Arc<dyn Retriever>,
    local: LocalRetriever,
    generator: Arc<dyn Generator>,
    cache: AnswerCache,
    cache_active: bool,
    max_chars: usize,
    top_k: usize,
    similarity_threshold: f64,
}

impl TwinPipeline {
    /// Load the knowledge base and build backends from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let knowledge = KnowledgeBase::load(&config.knowledge.path)
            .with_context(|| "Failed to load knowledge base")?;
        Ok(Self::new(config, Arc::new(knowledge)))
    }

    /// Build backends from `config`. A remote backend that cannot be
    /// constructed is replaced by its local counterpart.
    pub fn new(config: &Config, knowledge: Arc<KnowledgeBase>) -> Self {
        let retriever: Arc<dyn Retriever> =
            match create_retriever(&config.retrieval, knowledge.clone()) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "vector retrieval unavailable; using local ranking");
                    Arc::new(LocalRetriever::new(
                        knowledge.clone(),
                        Ranker::from_config(&config.retrieval),
                    ))
                }
            };
        let generator: Arc<dyn Generator> = match create_generator(&config.generation) {
            Ok(g) => g,
            Err(e) => {
                warn!(error = %e, "text generation unavailable; using composer");
                Arc::new(ComposingGenerator)
            }
        };
        Self::with_backends(config, knowledge, retriever, generator)
    }

    pub fn with_backends(
        config: &Config,
        knowledge: Arc<KnowledgeBase>,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let ranker = Ranker::from_config(&config.retrieval);
        let cache = AnswerCache::new(config.cache.capacity);
        let all_local = !retriever.is_remote() && !generator.is_remote();
        let cache_active = cache.is_enabled() && (all_local || config.cache.include_remote);

        info!(
            retriever = retriever.name(),
            generator = generator.name(),
            cache = cache_active,
            "pipeline ready"
        );

        Self {
            local: LocalRetriever::new(knowledge.clone(), ranker.clone()),
            knowledge,
            classifier: Classifier::new(&config.classifier),
            ranker,
            retriever,
            generator,
            cache,
            cache_active,
            max_chars: config.query.max_chars,
            top_k: config.retrieval.top_k,
            similarity_threshold: config.retrieval.similarity_threshold,
        }
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn status(&self) -> BackendStatus {
        BackendStatus {
            retriever: self.retriever.name().to_string(),
            generator: self.generator.name().to_string(),
            remote_retrieval: self.retriever.is_remote(),
            remote_generation: self.generator.is_remote(),
            cache_active: self.cache_active,
        }
    }

    /// Answer one query. Fails only on validation.
    pub async fn answer(&self, raw_query: &str) -> Result<Answer, QueryError> {
        let query = validate_query(raw_query, self.max_chars)?;

        if self.cache_active {
            if let Some(mut hit) = self.cache.get(query) {
                debug!(query, "answer cache hit");
                hit.cached = true;
                return Ok(hit);
            }
        }

        let answer = self.compute(query).await;

        if self.cache_active {
            self.cache.insert(query, &answer);
        }
        Ok(answer)
    }

    async fn compute(&self, query: &str) -> Answer {
        let category = self.classifier.classify(query);
        let topic = detect_topic(query);
        debug!(query, category = %category, topic = ?topic, "classified");

        let terms = QueryTerms::parse(query);
        if let Some(qa) = self
            .knowledge
            .qa
            .iter()
            .find(|qa| terms.is_exact(&qa.entry.question))
        {
            return Answer {
                content: qa.entry.answer.clone(),
                category,
                vector_hits: 0,
                source: AnswerSource::InterviewQa,
                cached: false,
            };
        }

        let intro = compose::introduction(&self.knowledge.personal, query);
        if intro.is_none() {
            match category {
                Category::StakeholderManagement => {
                    return self.soft_skill_route(query, category, topic).await;
                }
                Category::Methodologies => {
                    if let Some(answer) = self.methodology_route(query, category) {
                        return answer;
                    }
                }
                _ => {}
            }
        }

        self.retrieval_route(query, category, intro).await
    }

    async fn soft_skill_route(
        &self,
        query: &str,
        category: Category,
        topic: Option<Topic>,
    ) -> Answer {
        let focus: Vec<&str> = match topic {
            Some(t) => t.terms().to_vec(),
            None => self.classifier.keywords(category),
        };
        let ranked = self.ranker.rank(query, &self.knowledge.soft_skills, &focus);
        let (results, vector_hits) = self.retrieve(query, &focus).await;

        let (content, source) = if let Some(text) = compose::compose_soft_skills(&ranked, topic) {
            let content = match results.iter().find(|r| r.chunk.kind == ChunkKind::Experience) {
                Some(example) => compose::with_illustration(&text, example),
                None => text,
            };
            (content, AnswerSource::SoftSkills)
        } else if !results.is_empty() {
            (compose::compose(&results, query), AnswerSource::Composed)
        } else {
            (
                compose::SOFT_SKILL_DEFAULT.to_string(),
                AnswerSource::Fallback,
            )
        };

        Answer {
            content,
            category,
            vector_hits,
            source,
            cached: false,
        }
    }

    fn methodology_route(&self, query: &str, category: Category) -> Option<Answer> {
        let focus = self.classifier.keywords(category);
        let best = self
            .ranker
            .rank(query, &self.knowledge.qa, &focus)
            .into_iter()
            .next()?;
        Some(Answer {
            content: best.item.entry.answer.clone(),
            category,
            vector_hits: 0,
            source: AnswerSource::InterviewQa,
            cached: false,
        })
    }

    async fn retrieval_route(
        &self,
        query: &str,
        category: Category,
        intro: Option<String>,
    ) -> Answer {
        let focus = self.classifier.keywords(category);
        let (results, vector_hits) = self.retrieve(query, &focus).await;

        let (body, source) = if results.is_empty() {
            (compose::NO_RESULTS.to_string(), AnswerSource::Fallback)
        } else {
            self.generate(query, &results).await
        };

        let (content, source) = match intro {
            Some(intro) if results.is_empty() => (intro, AnswerSource::Composed),
            Some(intro) => (format!("{}\n\n{}", intro, body), source),
            None => (body, source),
        };

        Answer {
            content,
            category,
            vector_hits,
            source,
            cached: false,
        }
    }

    async fn generate(&self, query: &str, results: &[SearchResult]) -> (String, AnswerSource) {
        let request = GenerationRequest {
            query,
            context: results,
            persona: &self.knowledge.personal,
        };
        match self.generator.generate(&request).await {
            Ok(text) if self.generator.is_remote() => (text, AnswerSource::Generated),
            Ok(text) => (text, AnswerSource::Composed),
            Err(e) => {
                warn!(
                    generator = self.generator.name(),
                    error = %e,
                    hint = e.hint().unwrap_or(""),
                    "generation failed; composing answer locally"
                );
                (compose::compose(results, query), AnswerSource::Composed)
            }
        }
    }

    /// Primary retrieval with threshold filtering and local fallback.
    /// Returns the results and the number of remote hits.
    async fn retrieve(&self, query: &str, focus: &[&str]) -> (Vec<SearchResult>, usize) {
        let request = RetrievalRequest {
            query,
            top_k: self.top_k,
            focus,
        };

        if self.retriever.is_remote() {
            match self.retriever.retrieve(&request).await {
                Ok(results) => {
                    let mut passing: Vec<SearchResult> = results
                        .into_iter()
                        .filter(|r| r.score >= self.similarity_threshold)
                        .collect();
                    if !passing.is_empty() {
                        let hits = passing.len();
                        passing.truncate(self.ranker.cap());
                        return (passing, hits);
                    }
                    debug!(
                        threshold = self.similarity_threshold,
                        "no vector results above threshold; using local ranking"
                    );
                }
                Err(e) => {
                    warn!(
                        retriever = self.retriever.name(),
                        error = %e,
                        hint = e.hint().unwrap_or(""),
                        "retrieval failed; using local ranking"
                    );
                }
            }
        }

        let local = self.local.retrieve(&request).await.unwrap_or_default();
        (local, 0)
    }
}

/// `twin ask`: answer one query and print it.
pub async fn run_ask(config: &Config, query: &str, json: bool) -> Result<()> {
    let pipeline = TwinPipeline::from_config(config)?;
    let started = Instant::now();
    let answer = pipeline.answer(query).await?;
    let elapsed = started.elapsed();

    if json {
        let metadata = QueryMetadata::new(query, &answer, elapsed, false);
        let out = serde_json::json!({
            "content": answer.content,
            "metadata": metadata,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", answer.content);
        println!();
        println!(
            "  [{} via {}, {:.3}s]",
            answer.category,
            answer.source.as_str(),
            elapsed.as_secs_f64()
        );
    }
    Ok(())
}
