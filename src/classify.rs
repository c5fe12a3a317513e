//! Query classification.
//!
//! A query is mapped to exactly one [`Category`] by checking category rules
//! in priority order: the first rule with a keyword or phrase occurring in the
//! lower-cased query wins. Behavioral (soft-skill) patterns are checked before
//! methodology patterns, so "how do you manage your agile team" is treated as
//! a behavioral question. A query that matches no rule but opens with a
//! generic interrogative ("how do you handle", "tell me about your", …) falls
//! into the behavioral category instead of [`Category::General`].
//!
//! Independently, [`detect_topic`] picks the soft-skill [`Topic`] with the
//! highest strength score. The topic narrows ranking focus and selects the
//! opening clause of soft-skill answers.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::config::ClassifierConfig;

/// Coarse topic label for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Competencies,
    Experience,
    StakeholderManagement,
    Methodologies,
    Achievements,
    General,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Competencies,
        Category::Experience,
        Category::StakeholderManagement,
        Category::Methodologies,
        Category::Achievements,
        Category::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Competencies => "competencies",
            Category::Experience => "experience",
            Category::StakeholderManagement => "stakeholder_management",
            Category::Methodologies => "methodologies",
            Category::Achievements => "achievements",
            Category::General => "general",
        }
    }

    /// The category used for behavioral and soft-skill questions.
    pub fn behavioral() -> Category {
        Category::StakeholderManagement
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword and phrase sets for one category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: Category,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub phrases: Vec<String>,
}

impl CategoryRule {
    fn new(category: Category, keywords: &[&str], phrases: &[&str]) -> Self {
        Self {
            category,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            phrases: phrases.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// `query_lower` must already be lower-cased.
    pub fn matches(&self, query_lower: &str) -> bool {
        self.keywords
            .iter()
            .chain(self.phrases.iter())
            .any(|term| query_lower.contains(term.as_str()))
    }
}

/// Soft-skill focus of a behavioral question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Communication,
    Leadership,
    Teamwork,
    Conflict,
    Stakeholder,
}

impl Topic {
    /// Declaration order; ties in [`detect_topic`] resolve to the earliest.
    pub const ALL: [Topic; 5] = [
        Topic::Communication,
        Topic::Leadership,
        Topic::Teamwork,
        Topic::Conflict,
        Topic::Stakeholder,
    ];

    pub fn terms(&self) -> &'static [&'static str] {
        match self {
            Topic::Communication => &["communication", "verbal", "written", "presentation"],
            Topic::Leadership => &["leadership", "lead", "guide", "direct", "manage"],
            Topic::Teamwork => &["team", "collaborate", "coordination", "group"],
            Topic::Conflict => &["conflict", "disagreement", "difficult", "challenge", "dispute"],
            Topic::Stakeholder => &["stakeholder", "client", "customer", "relationship"],
        }
    }

    pub fn patterns(&self) -> &'static [&'static str] {
        match self {
            Topic::Communication => &["communicate with", "express", "convey", "present to"],
            Topic::Leadership => &["lead a team", "manage people", "guide others"],
            Topic::Teamwork => &["work in team", "team environment", "collaborate with"],
            Topic::Conflict => &["handle conflict", "resolve", "deal with", "manage conflict"],
            Topic::Stakeholder => &["manage stakeholder", "work with client", "handle customer"],
        }
    }

    /// Opening clause for a soft-skill answer on this topic.
    pub fn intro(&self) -> &'static str {
        match self {
            Topic::Communication => "In my approach to communication, I consistently",
            Topic::Leadership => "My leadership philosophy focuses on",
            Topic::Teamwork => "When collaborating in team environments, I emphasize",
            Topic::Conflict => "My strategy for handling conflicts centers on",
            Topic::Stakeholder => "In managing stakeholder relationships, I prioritize",
        }
    }
}

/// Default category rules, in priority order.
pub fn canonical_rules() -> Vec<CategoryRule> {
    let behavioral_terms: Vec<&str> = Topic::ALL
        .iter()
        .flat_map(|t| t.terms().iter().copied())
        .collect();
    let behavioral_patterns: Vec<&str> = Topic::ALL
        .iter()
        .flat_map(|t| t.patterns().iter().copied())
        .collect();

    vec![
        CategoryRule::new(
            Category::Competencies,
            &["competenc", "skill", "abilit", "strength", "expertise"],
            &["good at", "tech stack"],
        ),
        CategoryRule::new(
            Category::StakeholderManagement,
            &behavioral_terms,
            &behavioral_patterns,
        ),
        CategoryRule::new(
            Category::Methodologies,
            &["methodolog", "agile", "scrum", "kanban", "waterfall", "framework", "process"],
            &["business analysis", "analysis technique"],
        ),
        CategoryRule::new(
            Category::Achievements,
            &["award", "achiev", "accomplish", "recognition", "proud"],
            &["biggest win", "key result"],
        ),
        CategoryRule::new(
            Category::Experience,
            &["experience", "work", "role", "job", "career", "company", "employ", "position"],
            &["worked at", "background"],
        ),
    ]
}

/// Interrogative openings that mark a behavioral question.
pub fn canonical_behavioral_prefixes() -> Vec<String> {
    [
        "how do you handle",
        "how do you manage",
        "tell me about your",
        "tell me about a time",
        "what is your approach to",
        "how would you describe",
        "how do you approach",
        "how do you deal with",
        "how do you work with",
        "how do you lead",
        "what is your style",
        "how do you interact",
        "how do you respond",
        "what do you do when",
        "how would you handle",
        "give me an example",
        "describe a situation",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Rule-driven classifier. Terms are lower-cased once at construction.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<CategoryRule>,
    behavioral_prefixes: Vec<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let lower = |v: &[String]| v.iter().map(|s| s.to_lowercase()).collect::<Vec<_>>();
        Self {
            rules: config
                .rules
                .iter()
                .map(|r| CategoryRule {
                    category: r.category,
                    keywords: lower(&r.keywords),
                    phrases: lower(&r.phrases),
                })
                .collect(),
            behavioral_prefixes: lower(&config.behavioral_prefixes),
        }
    }

    pub fn classify(&self, query: &str) -> Category {
        let lower = query.to_lowercase();

        if let Some(rule) = self.rules.iter().find(|r| r.matches(&lower)) {
            return rule.category;
        }

        if self
            .behavioral_prefixes
            .iter()
            .any(|p| lower.contains(p.as_str()))
        {
            return Category::behavioral();
        }

        Category::General
    }

    /// Keyword set of a category's rule, for ranking focus.
    pub fn keywords(&self, category: Category) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.category == category)
            .flat_map(|r| r.keywords.iter().map(String::as_str))
            .collect()
    }
}

/// `2 × (terms occurring as substrings) + (terms equal to a query token)`.
pub fn strength(terms: &[&str], query_lower: &str, tokens: &HashSet<&str>) -> usize {
    let substring_hits = terms.iter().filter(|t| query_lower.contains(**t)).count();
    let token_hits = terms.iter().filter(|t| tokens.contains(**t)).count();
    substring_hits * 2 + token_hits
}

/// Strongest soft-skill topic of a query, if any term matches.
pub fn detect_topic(query: &str) -> Option<Topic> {
    let lower = query.to_lowercase();
    let tokens: HashSet<&str> = lower.split_whitespace().collect();

    let mut best: Option<Topic> = None;
    let mut best_score = 0;
    for topic in Topic::ALL {
        let score = strength(topic.terms(), &lower, &tokens);
        if score > best_score {
            best_score = score;
            best = Some(topic);
        }
    }
    best
}
