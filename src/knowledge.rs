//! In-memory knowledge store.
//!
//! The profile document is a JSON file describing one person: personal info
//! and core competencies, professional experience, soft skills with examples,
//! interview Q&A pairs grouped by category, and pre-written content chunks.
//! Every section is optional. Object key order is preserved so that ranking
//! ties resolve in document order.
//!
//! The whole document is loaded once per process and never mutated, which is
//! what makes answers computed from it safe to memoize.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

use crate::models::{ChunkKind, KnowledgeChunk};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonalInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub summary: String,
    /// `snake_case_key -> description`.
    #[serde(default)]
    pub core_competencies: Map<String, Value>,
}

impl PersonalInfo {
    /// Competencies as `(display name, description)` in document order.
    pub fn competencies(&self) -> Vec<(String, String)> {
        self.core_competencies
            .iter()
            .filter_map(|(key, value)| {
                let description = value.as_str()?;
                Some((title_case(key), description.to_string()))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Experience {
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub achievements: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SoftSkill {
    pub skill: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QaEntry {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Skills {
    #[serde(default)]
    soft_skills: Vec<SoftSkill>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawChunkMetadata {
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    importance: Option<String>,
    #[serde(default)]
    date_range: Option<String>,
    #[serde(default)]
    examples: Vec<String>,
    #[serde(default)]
    context: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawChunk {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    metadata: RawChunkMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileDocument {
    #[serde(default, rename = "personalInfo", alias = "personal_info")]
    personal: PersonalInfo,
    #[serde(default)]
    professional_experience: Vec<Experience>,
    #[serde(default)]
    skills: Skills,
    /// `category -> [QaEntry]`, kept as raw values to preserve key order.
    #[serde(default)]
    interview_qa: Map<String, Value>,
    #[serde(default)]
    content_chunks: Vec<RawChunk>,
}

/// A Q&A pair tagged with the category it was filed under.
#[derive(Debug, Clone)]
pub struct CategorizedQa {
    pub category: String,
    pub entry: QaEntry,
}

/// The loaded profile plus its flattened chunk list.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    pub personal: PersonalInfo,
    pub experience: Vec<Experience>,
    pub soft_skills: Vec<SoftSkill>,
    pub qa: Vec<CategorizedQa>,
    chunks: Vec<KnowledgeChunk>,
}

impl KnowledgeBase {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read knowledge file: {}", path.display()))?;
        let kb = Self::from_json(&content)
            .with_context(|| format!("Failed to parse knowledge file: {}", path.display()))?;
        info!(
            path = %path.display(),
            chunks = kb.chunks.len(),
            qa = kb.qa.len(),
            soft_skills = kb.soft_skills.len(),
            "knowledge base loaded"
        );
        Ok(kb)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let doc: ProfileDocument = serde_json::from_str(json)?;

        let mut qa = Vec::new();
        for (category, entries) in &doc.interview_qa {
            let entries: Vec<QaEntry> = serde_json::from_value(entries.clone())
                .with_context(|| format!("interview_qa.{} must be a list of Q&A pairs", category))?;
            qa.extend(entries.into_iter().map(|entry| CategorizedQa {
                category: category.clone(),
                entry,
            }));
        }

        let mut kb = KnowledgeBase {
            personal: doc.personal,
            experience: doc.professional_experience,
            soft_skills: doc.skills.soft_skills,
            qa,
            chunks: Vec::new(),
        };
        kb.chunks = kb.build_chunks(doc.content_chunks);
        Ok(kb)
    }

    pub fn chunks(&self) -> &[KnowledgeChunk] {
        &self.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.personal.name.is_empty()
    }

    fn build_chunks(&self, raw: Vec<RawChunk>) -> Vec<KnowledgeChunk> {
        let mut chunks: Vec<KnowledgeChunk> = raw
            .into_iter()
            .map(|r| KnowledgeChunk {
                id: r.id,
                kind: ChunkKind::from_type(&r.kind),
                title: r.title,
                content: r.content,
                tags: r.metadata.tags,
                importance: r.metadata.importance.unwrap_or_else(|| "medium".to_string()),
                date_range: r.metadata.date_range,
                examples: r.metadata.examples,
                context: r.metadata.context,
            })
            .collect();

        for skill in &self.soft_skills {
            let mut chunk = KnowledgeChunk::new(
                format!("chunk_soft_skill_{}", slug(&skill.skill)),
                ChunkKind::SoftSkill,
                format!("Soft Skill: {}", skill.skill),
                format!(
                    "{}: {} - {}",
                    skill.skill,
                    skill.examples.join(" "),
                    skill.context
                ),
            );
            chunk.tags = vec![
                "soft skills".to_string(),
                skill.skill.to_lowercase(),
                "interpersonal".to_string(),
            ];
            chunk.importance = "high".to_string();
            chunk.examples = skill.examples.clone();
            chunk.context = Some(skill.context.clone()).filter(|c| !c.is_empty());
            chunks.push(chunk);
        }

        if !chunks.iter().any(|c| c.kind == ChunkKind::Experience) {
            for exp in &self.experience {
                let mut content = format!("At {}, {}", exp.company, exp.description);
                if let Some(first) = exp.achievements.first() {
                    content.push_str(&format!(" Key achievement: {}", first));
                }
                let mut chunk = KnowledgeChunk::new(
                    format!("experience_{}", slug(&exp.company)),
                    ChunkKind::Experience,
                    format!("{} - {}", exp.company, exp.position),
                    content,
                );
                chunk.date_range = exp.duration.clone();
                chunks.push(chunk);
            }
        }

        if !chunks.iter().any(|c| c.kind == ChunkKind::Skill) {
            for (name, description) in self.personal.competencies() {
                chunks.push(KnowledgeChunk::new(
                    format!("competency_{}", slug(&name)),
                    ChunkKind::Skill,
                    format!("Core Competency: {}", name),
                    format!("{}: {}", name, description),
                ));
            }
        }

        for (i, qa) in self.qa.iter().enumerate() {
            let mut chunk = KnowledgeChunk::new(
                format!("qa_{}_{}", qa.category, i),
                ChunkKind::Qa,
                qa.entry.question.clone(),
                qa.entry.answer.clone(),
            );
            chunk.tags = qa.entry.keywords.clone();
            chunks.push(chunk);
        }

        debug!(count = chunks.len(), "built knowledge chunks");
        chunks
    }
}

/// `requirements_analysis` -> `Requirements Analysis`.
fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn slug(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_profile_sections() {
        let kb = KnowledgeBase::from_json(fixtures::PROFILE).unwrap();
        assert_eq!(kb.personal.name, "Jordan Reyes");
        assert_eq!(kb.experience.len(), 1);
        assert_eq!(kb.soft_skills.len(), 2);
        assert_eq!(kb.qa.len(), 2);
        assert_eq!(kb.qa[0].category, "methodology");
        assert_eq!(kb.qa[1].category, "behavioral");
    }

    #[test]
    fn test_competencies_preserve_order_and_title_case() {
        let kb = KnowledgeBase::from_json(fixtures::PROFILE).unwrap();
        let names: Vec<String> = kb
            .personal
            .competencies()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, vec!["Requirements Analysis", "Agile Delivery"]);
    }

    #[test]
    fn test_chunks_derived_from_sections() {
        let kb = KnowledgeBase::from_json(fixtures::PROFILE).unwrap();
        let kinds: Vec<&ChunkKind> = kb.chunks().iter().map(|c| &c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                &ChunkKind::SoftSkill,
                &ChunkKind::SoftSkill,
                &ChunkKind::Experience,
                &ChunkKind::Skill,
                &ChunkKind::Skill,
                &ChunkKind::Qa,
                &ChunkKind::Qa,
            ]
        );
        let exp = &kb.chunks()[2];
        assert_eq!(exp.title, "Etisalat - Senior Business Analyst");
        assert_eq!(exp.date_range.as_deref(), Some("2016 - 2020"));
        assert!(exp.content.contains("35% reduction"));
        assert_eq!(kb.chunks()[0].id, "chunk_soft_skill_conflict_resolution");
    }

    #[test]
    fn test_content_chunks_suppress_derived_experience() {
        let json = r#"{
          "professional_experience": [{"company": "Acme", "position": "BA", "description": "x"}],
          "content_chunks": [
            {"id": "c1", "type": "experience", "title": "Acme - BA", "content": "At Acme, I did things",
             "metadata": {"date_range": "2019 - 2021", "tags": ["acme"]}}
          ]
        }"#;
        let kb = KnowledgeBase::from_json(json).unwrap();
        let experience: Vec<&KnowledgeChunk> = kb
            .chunks()
            .iter()
            .filter(|c| c.kind == ChunkKind::Experience)
            .collect();
        assert_eq!(experience.len(), 1);
        assert_eq!(experience[0].id, "c1");
        assert_eq!(experience[0].importance, "medium");
        assert_eq!(experience[0].tags, vec!["acme"]);
    }

    #[test]
    fn test_empty_document() {
        let kb = KnowledgeBase::from_json("{}").unwrap();
        assert!(kb.is_empty());
        assert!(kb.chunks().is_empty());
    }

    #[test]
    fn test_malformed_qa_section_is_an_error() {
        let err = KnowledgeBase::from_json(r#"{"interview_qa": {"x": "not a list"}}"#).unwrap_err();
        assert!(format!("{:#}", err).contains("interview_qa.x"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = KnowledgeBase::load(Path::new("/nonexistent/profile.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read knowledge file"));
    }

    #[test]
    fn test_slug_and_title_case() {
        assert_eq!(slug("Help & Support"), "help_support");
        assert_eq!(title_case("stakeholder_management"), "Stakeholder Management");
    }
}
