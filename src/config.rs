use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::classify::{self, CategoryRule};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub analytics: Option<AnalyticsConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    /// Vector index REST URL. Falls back to `UPSTASH_VECTOR_REST_URL`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_exact_match_bonus")]
    pub exact_match_bonus: u32,
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            url: None,
            similarity_threshold: default_similarity_threshold(),
            top_k: default_top_k(),
            max_results: default_max_results(),
            exact_match_bonus: default_exact_match_bonus(),
            timeout_secs: default_retrieval_timeout(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_similarity_threshold() -> f64 {
    0.3
}
fn default_top_k() -> usize {
    5
}
fn default_max_results() -> usize {
    3
}
fn default_exact_match_bonus() -> u32 {
    10
}
fn default_retrieval_timeout() -> u64 {
    10
}

impl RetrievalConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Index URL from config, then from the environment.
    pub fn resolved_url(&self) -> Option<String> {
        self.url
            .clone()
            .or_else(|| std::env::var("UPSTASH_VECTOR_REST_URL").ok())
            .filter(|u| !u.trim().is_empty())
    }

    /// Query token; the read-only token is preferred when both are set.
    pub fn resolved_token(&self) -> Option<String> {
        std::env::var("UPSTASH_VECTOR_REST_READONLY_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| std::env::var("UPSTASH_VECTOR_REST_TOKEN").ok())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            base_url: default_base_url(),
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    500
}
fn default_generation_timeout() -> u64 {
    30
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    pub path: PathBuf,
    #[serde(default = "default_response_max_chars")]
    pub response_max_chars: usize,
}

fn default_response_max_chars() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    /// Also memoize answers that depended on a remote backend.
    #[serde(default)]
    pub include_remote: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            include_remote: false,
        }
    }
}

fn default_cache_capacity() -> usize {
    128
}

/// Category rules in priority order, plus the generic behavioral prefixes.
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "classify::canonical_rules")]
    pub rules: Vec<CategoryRule>,
    #[serde(default = "classify::canonical_behavioral_prefixes")]
    pub behavioral_prefixes: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rules: classify::canonical_rules(),
            behavioral_prefixes: classify::canonical_behavioral_prefixes(),
        }
    }
}

impl Config {
    /// A config with every optional backend disabled, for tests and
    /// one-off commands.
    pub fn minimal(knowledge_path: impl Into<PathBuf>) -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:8000".to_string(),
            },
            knowledge: KnowledgeConfig {
                path: knowledge_path.into(),
            },
            query: QueryConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            analytics: None,
            cache: CacheConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.query.max_chars == 0 {
        anyhow::bail!("query.max_chars must be > 0");
    }

    if config.retrieval.max_results < 1 {
        anyhow::bail!("retrieval.max_results must be >= 1");
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.retrieval.timeout_secs < 1 {
        anyhow::bail!("retrieval.timeout_secs must be >= 1");
    }

    if config.generation.timeout_secs < 1 {
        anyhow::bail!("generation.timeout_secs must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        anyhow::bail!("retrieval.similarity_threshold must be in [0.0, 1.0]");
    }

    match config.retrieval.provider.as_str() {
        "disabled" | "upstash" => {}
        other => anyhow::bail!(
            "Unknown retrieval provider: '{}'. Must be disabled or upstash.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "disabled" => {}
        "openai" => {
            if config.generation.model.is_none() {
                anyhow::bail!("generation.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.classifier.rules.is_empty() {
        anyhow::bail!("classifier.rules must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Category;

    fn parse(toml_src: &str) -> Config {
        toml::from_str(toml_src).unwrap()
    }

    const BASE: &str = r#"
[server]
bind = "127.0.0.1:8000"

[knowledge]
path = "./data/profile.json"
"#;

    #[test]
    fn test_defaults_applied() {
        let cfg = parse(BASE);
        assert_eq!(cfg.query.max_chars, 1000);
        assert_eq!(cfg.retrieval.provider, "disabled");
        assert!((cfg.retrieval.similarity_threshold - 0.3).abs() < 1e-9);
        assert_eq!(cfg.retrieval.max_results, 3);
        assert_eq!(cfg.cache.capacity, 128);
        assert!(!cfg.cache.include_remote);
        assert!(cfg.analytics.is_none());
        assert_eq!(cfg.classifier.rules[0].category, Category::Competencies);
        validate(&cfg).unwrap();
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let cfg = parse(&format!("{}\n[retrieval]\nsimilarity_threshold = 1.5\n", BASE));
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("similarity_threshold"));
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let cfg = parse(&format!("{}\n[retrieval]\ntop_k = 0\n", BASE));
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("retrieval.top_k"));

        let cfg = parse(&format!("{}\n[retrieval]\ntop_k = 1\n", BASE));
        validate(&cfg).unwrap();
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let cfg = parse(&format!("{}\n[retrieval]\ntimeout_secs = 0\n", BASE));
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("retrieval.timeout_secs"));

        let cfg = parse(&format!("{}\n[generation]\ntimeout_secs = 0\n", BASE));
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("generation.timeout_secs"));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let cfg = parse(&format!("{}\n[retrieval]\nprovider = \"pinecone\"\n", BASE));
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_openai_generation_requires_model() {
        let cfg = parse(&format!("{}\n[generation]\nprovider = \"openai\"\n", BASE));
        let err = validate(&cfg).unwrap_err().to_string();
        assert!(err.contains("generation.model"));
    }

    #[test]
    fn test_classifier_rules_override() {
        let cfg = parse(&format!(
            r#"{}
[[classifier.rules]]
category = "achievements"
keywords = ["award"]
"#,
            BASE
        ));
        assert_eq!(cfg.classifier.rules.len(), 1);
        assert!(cfg.classifier.rules[0].phrases.is_empty());
        assert!(!cfg.classifier.behavioral_prefixes.is_empty());
    }
}
