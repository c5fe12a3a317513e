//! Response composition.
//!
//! Turns ranked snippets into the first-person answer shown to the user.
//! Separators (`"\n"` between parts, `"• "` bullets, blank-line paragraph
//! breaks) are part of the output contract: clients render the text verbatim.
//!
//! Composition never fails. A snippet with no content is skipped and a
//! missing date range or organization falls back to the generic prefix.

use crate::classify::Topic;
use crate::knowledge::{PersonalInfo, SoftSkill};
use crate::models::{ChunkKind, ScoredCandidate, SearchResult};

/// Answer when nothing survived ranking.
pub const NO_RESULTS: &str =
    "I don't have enough information to provide a specific answer to that question.";

/// Answer when results existed but none could be rendered.
pub const NO_EXAMPLES: &str = "I don't have specific examples to share for this question.";

/// Behavioral answer when neither soft skills nor retrieval produced anything.
pub const SOFT_SKILL_DEFAULT: &str = "I approach this through clear communication, active listening, and collaborative problem-solving, always focusing on achieving positive outcomes while maintaining strong professional relationships.";

const SOFT_SKILL_INTRO: &str = "In addressing this, I focus on";

/// Phrasing cues detected in the query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Intent {
    pub behavioral: bool,
    pub when: bool,
    pub location: bool,
    pub method: bool,
}

impl Intent {
    pub fn detect(query: &str) -> Self {
        let lower = query.to_lowercase();
        let any = |cues: &[&str]| cues.iter().any(|c| lower.contains(c));
        Self {
            behavioral: any(&["tell me about a time", "example of", "situation where"]),
            when: any(&["when", "what year", "what time", "how long"]),
            location: any(&["where", "which company", "location"]),
            method: any(&["how", "what approach", "what method"]),
        }
    }
}

/// Compose an answer from retrieval results, in the order given.
pub fn compose(results: &[SearchResult], query: &str) -> String {
    if results.is_empty() {
        return NO_RESULTS.to_string();
    }

    let intent = Intent::detect(query);
    let usable = results.iter().filter(|r| !r.chunk.content.trim().is_empty());

    let mut experience = Vec::new();
    let mut skills = Vec::new();
    let mut projects = Vec::new();
    let mut others = Vec::new();
    for r in usable {
        match r.chunk.kind {
            ChunkKind::Experience => experience.push(r),
            ChunkKind::Skill | ChunkKind::SoftSkill => skills.push(r),
            ChunkKind::Project => projects.push(r),
            _ => others.push(r),
        }
    }

    let mut parts: Vec<String> = Vec::new();

    if intent.behavioral && !experience.is_empty() {
        parts.push("Here's a relevant example from my experience:".to_string());
        for r in experience.iter().take(2) {
            parts.push(format!("\n• {}", r.chunk.content));
        }
    } else if intent.method && (!skills.is_empty() || !projects.is_empty()) {
        if !skills.is_empty() {
            parts.push("My approach involves:".to_string());
            for r in skills.iter().take(2) {
                parts.push(format!("\n• {}", r.chunk.content));
            }
        }
        if let Some(project) = projects.first() {
            let prefix = if parts.is_empty() {
                "Here's a practical example:"
            } else {
                "\nTo illustrate this:"
            };
            parts.push(format!("{}\n• {}", prefix, project.chunk.content));
        }
    } else {
        if let Some(lead) = experience.first() {
            parts.push(format!(
                "{}{}",
                lead_prefix(lead, intent),
                strip_lead_clause(&lead.chunk.content)
            ));
        }

        if !skills.is_empty() {
            if parts.is_empty() {
                parts.push("I apply these skills and competencies:".to_string());
            } else {
                parts.push("\n\nRelevant skills and competencies:".to_string());
            }
            for r in skills.iter().take(2) {
                parts.push(format!("• {}", r.chunk.content));
            }
        }

        for r in projects.iter().chain(others.iter()) {
            if r.chunk.kind == ChunkKind::Project {
                parts.push(format!("\n\nTo demonstrate this in practice: {}", r.chunk.content));
            } else {
                parts.push(format!("\n\n{}", r.chunk.content));
            }
        }
    }

    if parts.is_empty() {
        return NO_EXAMPLES.to_string();
    }
    parts.join("\n")
}

fn lead_prefix(lead: &SearchResult, intent: Intent) -> String {
    if intent.when {
        if let Some(range) = lead.chunk.date_range.as_deref().filter(|r| !r.trim().is_empty()) {
            return format!("During {}, ", range);
        }
    } else if intent.location {
        if let Some(org) = lead.organization() {
            return format!("At {}, ", org);
        }
    }
    "In my experience, ".to_string()
}

/// Drop a leading "At X, " / "In X, " / "During X, " clause so it is not
/// repeated after our own prefix.
fn strip_lead_clause(content: &str) -> &str {
    let lower = content.to_lowercase();
    if ["at ", "in ", "during "].iter().any(|p| lower.starts_with(p)) {
        if let Some((_, rest)) = content.split_once(", ") {
            return rest;
        }
    }
    content
}

/// Compose a soft-skill answer from ranked skills. `None` when nothing ranked.
pub fn compose_soft_skills(
    ranked: &[ScoredCandidate<&SoftSkill>],
    topic: Option<Topic>,
) -> Option<String> {
    if ranked.is_empty() {
        return None;
    }

    let mut parts: Vec<String> = vec![topic.map_or(SOFT_SKILL_INTRO, |t| t.intro()).to_string()];
    let mut used: Vec<&str> = Vec::new();

    for (i, candidate) in ranked.iter().take(2).enumerate() {
        let skill = candidate.item;
        let fresh: Vec<&str> = skill
            .examples
            .iter()
            .map(String::as_str)
            .filter(|ex| !used.contains(ex))
            .collect();
        let Some(first) = fresh.first() else {
            continue;
        };

        let mut line = format!("\n\n• {}: {}", skill.skill, first);
        if i == 0 {
            if let Some(second) = fresh.get(1) {
                line.push_str(&format!("\n  Additionally, {}", second));
            }
        }
        parts.push(line);
        used.extend(fresh.iter().take(2));
    }

    Some(parts.join(" "))
}

/// Append one experience snippet to a soft-skill answer.
pub fn with_illustration(answer: &str, example: &SearchResult) -> String {
    format!(
        "{}\n\nTo illustrate with a concrete example:\n• {}",
        answer, example.chunk.content
    )
}

/// First-person introduction for "who are you" / "about yourself" queries.
pub fn introduction(personal: &PersonalInfo, query: &str) -> Option<String> {
    if personal.name.trim().is_empty() {
        return None;
    }
    let lower = query.to_lowercase();
    let wants_name = ["who are you", "your name"].iter().any(|c| lower.contains(c));
    let wants_summary = ["about yourself", "introduce yourself", "summary"]
        .iter()
        .any(|c| lower.contains(c));
    if !wants_name && !wants_summary {
        return None;
    }

    let mut out = if personal.title.trim().is_empty() {
        format!("I'm {}.", personal.name)
    } else {
        format!("I'm {}, {}.", personal.name, personal.title)
    };
    if wants_summary && !personal.summary.trim().is_empty() {
        out.push_str("\n\n");
        out.push_str(&personal.summary);
    }
    Some(out)
}
