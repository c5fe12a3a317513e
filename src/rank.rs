//! Keyword-overlap relevance ranking.
//!
//! # Scoring
//!
//! Query terms are the lower-cased query split on whitespace (punctuation is
//! kept, duplicates removed). For each candidate:
//!
//! | Signal | Points |
//! |--------|--------|
//! | any query term is a substring of the label | +3 |
//! | any query term is a substring of the body | +2 |
//! | any focus term is a substring of the label | +2 |
//! | any focus term is a substring of the body | +1 |
//! | each query term found in the body | +1 |
//! | query equals the candidate's question text | +`exact_match_bonus` |
//!
//! Candidates scoring zero are dropped. The rest are stable-sorted by score
//! (descending), so equal scores keep the order of the source collection,
//! and truncated to the result cap.

use std::borrow::Cow;

use crate::config::RetrievalConfig;
use crate::knowledge::{CategorizedQa, QaEntry, SoftSkill};
use crate::models::{KnowledgeChunk, ScoredCandidate};

/// Anything the ranker can score.
pub trait Rankable {
    /// Primary label: skill name, question, or chunk title.
    fn label(&self) -> &str;
    /// Supporting text: examples, answer, or chunk content.
    fn body(&self) -> Cow<'_, str>;
    /// Question text, eligible for the exact-match bonus.
    fn question(&self) -> Option<&str> {
        None
    }
}

impl Rankable for KnowledgeChunk {
    fn label(&self) -> &str {
        &self.title
    }

    fn body(&self) -> Cow<'_, str> {
        if self.examples.is_empty() {
            Cow::Borrowed(&self.content)
        } else {
            Cow::Owned(format!("{} {}", self.content, self.examples.join(" ")))
        }
    }

    fn question(&self) -> Option<&str> {
        KnowledgeChunk::question(self)
    }
}

impl Rankable for SoftSkill {
    fn label(&self) -> &str {
        &self.skill
    }

    fn body(&self) -> Cow<'_, str> {
        Cow::Owned(self.examples.join(" "))
    }
}

impl Rankable for QaEntry {
    fn label(&self) -> &str {
        &self.question
    }

    fn body(&self) -> Cow<'_, str> {
        if self.keywords.is_empty() {
            Cow::Borrowed(&self.answer)
        } else {
            Cow::Owned(format!("{} {}", self.answer, self.keywords.join(" ")))
        }
    }

    fn question(&self) -> Option<&str> {
        Some(&self.question)
    }
}

impl Rankable for CategorizedQa {
    fn label(&self) -> &str {
        self.entry.label()
    }

    fn body(&self) -> Cow<'_, str> {
        self.entry.body()
    }

    fn question(&self) -> Option<&str> {
        self.entry.question()
    }
}

/// A query prepared for scoring.
#[derive(Debug, Clone)]
pub struct QueryTerms {
    terms: Vec<String>,
    normalized: String,
}

impl QueryTerms {
    pub fn parse(query: &str) -> Self {
        let lower = query.to_lowercase();
        let mut terms: Vec<String> = Vec::new();
        for word in lower.split_whitespace() {
            if !terms.iter().any(|t| t == word) {
                terms.push(word.to_string());
            }
        }
        Self {
            normalized: normalize(query),
            terms,
        }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Whether `text` is the same question, ignoring case and whitespace runs.
    pub fn is_exact(&self, text: &str) -> bool {
        !self.normalized.is_empty() && normalize(text) == self.normalized
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
pub struct Ranker {
    cap: usize,
    exact_match_bonus: u32,
}

impl Ranker {
    pub fn new(cap: usize, exact_match_bonus: u32) -> Self {
        Self {
            cap,
            exact_match_bonus,
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.max_results, config.exact_match_bonus)
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn with_cap(&self, cap: usize) -> Self {
        Self::new(cap, self.exact_match_bonus)
    }

    pub fn exact_match_bonus(&self) -> u32 {
        self.exact_match_bonus
    }

    pub fn score<C: Rankable + ?Sized>(
        &self,
        query: &QueryTerms,
        candidate: &C,
        focus: &[&str],
    ) -> u32 {
        let label = candidate.label().to_lowercase();
        let body = candidate.body().to_lowercase();
        let terms = query.terms();

        let mut score = 0;
        if terms.iter().any(|t| label.contains(t.as_str())) {
            score += 3;
        }
        if terms.iter().any(|t| body.contains(t.as_str())) {
            score += 2;
        }
        if focus.iter().any(|t| label.contains(t)) {
            score += 2;
        }
        if focus.iter().any(|t| body.contains(t)) {
            score += 1;
        }
        score += terms.iter().filter(|t| body.contains(t.as_str())).count() as u32;

        if candidate.question().is_some_and(|q| query.is_exact(q)) {
            score += self.exact_match_bonus;
        }
        score
    }

    /// Score, filter, stable-sort, and truncate `candidates`.
    pub fn rank<'a, C: Rankable>(
        &self,
        query: &str,
        candidates: &'a [C],
        focus: &[&str],
    ) -> Vec<ScoredCandidate<&'a C>> {
        let terms = QueryTerms::parse(query);
        let mut scored: Vec<ScoredCandidate<&'a C>> = candidates
            .iter()
            .filter_map(|item| {
                let score = self.score(&terms, item, focus);
                (score > 0).then_some(ScoredCandidate { score, item })
            })
            .collect();

        // `sort_by` is stable: ties keep source order.
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored.truncate(self.cap);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Topic;
    use crate::models::ChunkKind;

    fn skill(name: &str, examples: &[&str]) -> SoftSkill {
        SoftSkill {
            skill: name.to_string(),
            examples: examples.iter().map(|s| s.to_string()).collect(),
            context: String::new(),
        }
    }

    fn qa(question: &str, answer: &str) -> QaEntry {
        QaEntry {
            question: question.to_string(),
            answer: answer.to_string(),
            keywords: Vec::new(),
        }
    }

    fn chunk(id: &str, title: &str, content: &str) -> KnowledgeChunk {
        KnowledgeChunk::new(id, ChunkKind::Skill, title, content)
    }

    #[test]
    fn test_score_formula() {
        let ranker = Ranker::new(5, 10);
        let s = skill("Stakeholder Communication", &["wrote weekly updates"]);
        let terms = QueryTerms::parse("stakeholder updates");
        // label +3, body +2, focus label +2, one term in body +1.
        assert_eq!(ranker.score(&terms, &s, Topic::Stakeholder.terms()), 8);
        // Without focus: 3 + 2 + 1.
        assert_eq!(ranker.score(&terms, &s, &[]), 6);
    }

    #[test]
    fn test_focus_body_only_adds_one() {
        let ranker = Ranker::new(5, 10);
        let s = skill("Facilitation", &["kept the client informed"]);
        let terms = QueryTerms::parse("zzz");
        assert_eq!(ranker.score(&terms, &s, Topic::Stakeholder.terms()), 1);
    }

    #[test]
    fn test_term_frequency_counts_distinct_terms() {
        let ranker = Ranker::new(5, 10);
        let s = skill("X", &["agile agile scrum"]);
        // Duplicate query terms are counted once: body +2, two distinct terms +2.
        let terms = QueryTerms::parse("agile agile scrum");
        assert_eq!(ranker.score(&terms, &s, &[]), 4);
    }

    #[test]
    fn test_zero_scores_excluded() {
        let ranker = Ranker::new(5, 10);
        let chunks = vec![
            chunk("a", "Agile Delivery", "scrum ceremonies"),
            chunk("b", "Budgeting", "cost control"),
        ];
        let ranked = ranker.rank("scrum", &chunks, &[]);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].item.id, "a");
        assert!(ranked.iter().all(|c| c.score > 0));
    }

    #[test]
    fn test_ties_keep_source_order() {
        let ranker = Ranker::new(5, 10);
        let chunks = vec![
            chunk("first", "Mapping", "process maps"),
            chunk("second", "Modelling", "process models"),
            chunk("third", "Process Design", "process design"),
        ];
        let ranked = ranker.rank("process", &chunks, &[]);
        let ids: Vec<&str> = ranked.iter().map(|c| c.item.id.as_str()).collect();
        // "third" has a label hit (+3) and ranks first; the tie keeps order.
        assert_eq!(ids, vec!["third", "first", "second"]);
        assert_eq!(ranked[1].score, ranked[2].score);
    }

    #[test]
    fn test_sorted_and_capped() {
        let ranker = Ranker::new(2, 10);
        let chunks: Vec<KnowledgeChunk> = (0..6)
            .map(|i| chunk(&format!("c{}", i), "Data", &"report ".repeat(i + 1)))
            .collect();
        let ranked = ranker.rank("report data", &chunks, &[]);
        assert_eq!(ranked.len(), 2);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_exact_question_match_dominates() {
        let ranker = Ranker::new(3, 10);
        let entries = vec![
            qa(
                "What tools do you use with methodologies?",
                "what methodologies do you use? what methodologies do you use?",
            ),
            qa("What methodologies do you use?", "I mostly use Agile."),
        ];
        let ranked = ranker.rank("  what METHODOLOGIES do   you use? ", &entries, &[]);
        assert_eq!(ranked[0].item.question, "What methodologies do you use?");
        assert!(ranked[0].score >= 10);
    }

    #[test]
    fn test_exact_match_only_on_questions() {
        let ranker = Ranker::new(3, 10);
        let terms = QueryTerms::parse("Agile Delivery");
        let c = chunk("a", "Agile Delivery", "");
        // Label hit only; skill chunks carry no question.
        assert_eq!(ranker.score(&terms, &c, &[]), 3);
    }

    #[test]
    fn test_empty_query_ranks_nothing() {
        let ranker = Ranker::new(3, 10);
        let chunks = vec![chunk("a", "Anything", "anything")];
        assert!(ranker.rank("   ", &chunks, &[]).is_empty());
    }

    #[test]
    fn test_qa_keywords_count_as_body() {
        let ranker = Ranker::new(3, 10);
        let mut entry = qa("Tools?", "Mostly diagrams.");
        entry.keywords = vec!["bpmn".to_string()];
        let terms = QueryTerms::parse("bpmn");
        assert_eq!(ranker.score(&terms, &entry, &[]), 3);
    }
}
