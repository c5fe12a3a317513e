//! Core data models used throughout the digital twin.
//!
//! These types represent the knowledge chunks, search results, and chat logs
//! that flow through the answer pipeline.

use serde::Serialize;

/// Coarse kind of a knowledge chunk.
///
/// Parsed from the free-form `type` string carried by the knowledge document
/// and by vector index metadata. Unknown strings are kept as [`ChunkKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    Experience,
    Skill,
    SoftSkill,
    Project,
    Qa,
    PersonalInfo,
    Other(String),
}

impl ChunkKind {
    pub fn from_type(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "experience" | "professional_experience" => ChunkKind::Experience,
            "skill" | "skills" | "core_competency" => ChunkKind::Skill,
            "soft_skill" | "soft_skills" => ChunkKind::SoftSkill,
            "project" | "projects" => ChunkKind::Project,
            "qa" | "interview_qa" => ChunkKind::Qa,
            "personal_info" => ChunkKind::PersonalInfo,
            other => ChunkKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ChunkKind::Experience => "experience",
            ChunkKind::Skill => "skills",
            ChunkKind::SoftSkill => "soft_skills",
            ChunkKind::Project => "project",
            ChunkKind::Qa => "qa",
            ChunkKind::PersonalInfo => "personal_info",
            ChunkKind::Other(s) => s,
        }
    }
}

impl Serialize for ChunkKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A unit of stored knowledge about the subject person.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeChunk {
    pub id: String,
    pub kind: ChunkKind,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub importance: String,
    pub date_range: Option<String>,
    pub examples: Vec<String>,
    pub context: Option<String>,
}

impl KnowledgeChunk {
    pub fn new(
        id: impl Into<String>,
        kind: ChunkKind,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
            importance: "medium".to_string(),
            date_range: None,
            examples: Vec::new(),
            context: None,
        }
    }

    /// Question text for Q&A chunks; `None` for every other kind.
    pub fn question(&self) -> Option<&str> {
        match self.kind {
            ChunkKind::Qa => Some(&self.title),
            _ => None,
        }
    }
}

/// A knowledge chunk with a similarity score in `[0.0, 1.0]`.
///
/// Produced per query by a retriever; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk: KnowledgeChunk,
    pub score: f64,
}

impl SearchResult {
    /// Organization name, taken from a `"Org - Role"` style title.
    pub fn organization(&self) -> Option<&str> {
        let head = self.chunk.title.split(" - ").next()?.trim();
        if head.is_empty() {
            None
        } else {
            Some(head)
        }
    }

    /// Position, the part after the first `" - "` of the title.
    pub fn position(&self) -> Option<&str> {
        self.chunk
            .title
            .split_once(" - ")
            .map(|(_, role)| role.trim())
            .filter(|role| !role.is_empty())
    }
}

/// A ranked item: heuristic score plus the candidate it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate<T> {
    pub score: u32,
    pub item: T,
}

/// One served request, as appended to the analytics log.
#[derive(Debug, Clone)]
pub struct ChatLog {
    pub query: String,
    pub response: String,
    /// Seconds spent producing the response.
    pub response_time: f64,
    pub vector_hits: i64,
    pub category: String,
    pub created_at: i64,
    pub user_ip: Option<String>,
    pub user_agent: Option<String>,
}
