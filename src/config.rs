use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::index::SemanticPaths;
use crate::retrieval::{BudgetLimits, RetrievalOptions};
use crate::understand::{LlmBacked, RuleBased, Understanding};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TestimonyConfig {
    pub server: ServerConfig,
    pub chatlog: ChatlogConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalSettings,
    pub budget: BudgetConfig,
    pub understanding: UnderstandingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub log_level: String,
    pub http_addr: String,
}

/// Paths to the log snapshot and its derived index artifacts.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatlogConfig {
    pub log_path: String,
    pub metadata_index_path: String,
    pub embeddings_path: String,
    pub manifest_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalSettings {
    pub kw_weight: f32,
    pub sem_weight: f32,
    pub sem_top_k: usize,
    pub max_per_dimension: usize,
    pub context_before: u64,
    pub context_after: u64,
    pub density_bonus: f32,
    pub max_dimensions: usize,
    pub evidence_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_tool_calls: u64,
    pub max_loaded_messages: u64,
    pub max_result_chars: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UnderstandingConfig {
    /// "rule" or "llm".
    pub mode: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for TestimonyConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            chatlog: ChatlogConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalSettings::default(),
            budget: BudgetConfig::default(),
            understanding: UnderstandingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            log_level: "info".into(),
            http_addr: "127.0.0.1:8971".into(),
        }
    }
}

impl Default for ChatlogConfig {
    fn default() -> Self {
        let dir = default_testimony_dir();
        Self {
            log_path: dir.join("chatlog.jsonl").to_string_lossy().into_owned(),
            metadata_index_path: dir
                .join("index/metadata.json")
                .to_string_lossy()
                .into_owned(),
            embeddings_path: dir
                .join("index/embeddings.f32")
                .to_string_lossy()
                .into_owned(),
            manifest_path: dir
                .join("index/embeddings.manifest.json")
                .to_string_lossy()
                .into_owned(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_testimony_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        let opts = RetrievalOptions::default();
        Self {
            kw_weight: opts.kw_weight,
            sem_weight: opts.sem_weight,
            sem_top_k: opts.sem_top_k,
            max_per_dimension: opts.max_per_dimension,
            context_before: opts.context_before,
            context_after: opts.context_after,
            density_bonus: opts.density_bonus,
            max_dimensions: opts.max_dimensions,
            evidence_capacity: 32,
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        let limits = BudgetLimits::default();
        Self {
            max_tool_calls: limits.max_tool_calls,
            max_loaded_messages: limits.max_loaded_messages,
            max_result_chars: limits.max_result_chars,
        }
    }
}

impl Default for UnderstandingConfig {
    fn default() -> Self {
        Self {
            mode: "rule".into(),
            endpoint: "http://127.0.0.1:8970".into(),
            timeout_secs: 10,
        }
    }
}

/// Returns `~/.testimony/`
pub fn default_testimony_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".testimony")
}

/// Returns the default config file path: `~/.testimony/config.toml`
pub fn default_config_path() -> PathBuf {
    default_testimony_dir().join("config.toml")
}

impl TestimonyConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            TestimonyConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (TESTIMONY_LOG, TESTIMONY_LOG_LEVEL,
    /// TESTIMONY_KW_WEIGHT, TESTIMONY_SEM_WEIGHT, TESTIMONY_ENDPOINT).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TESTIMONY_LOG") {
            self.chatlog.log_path = val;
        }
        if let Ok(val) = std::env::var("TESTIMONY_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("TESTIMONY_KW_WEIGHT") {
            if let Ok(parsed) = val.parse() {
                self.retrieval.kw_weight = parsed;
            }
        }
        if let Ok(val) = std::env::var("TESTIMONY_SEM_WEIGHT") {
            if let Ok(parsed) = val.parse() {
                self.retrieval.sem_weight = parsed;
            }
        }
        if let Ok(val) = std::env::var("TESTIMONY_ENDPOINT") {
            self.understanding.endpoint = val;
        }
    }

    pub fn resolved_log_path(&self) -> PathBuf {
        expand_tilde(&self.chatlog.log_path)
    }

    pub fn resolved_metadata_index_path(&self) -> PathBuf {
        expand_tilde(&self.chatlog.metadata_index_path)
    }

    pub fn semantic_paths(&self) -> SemanticPaths {
        SemanticPaths::new(
            expand_tilde(&self.chatlog.embeddings_path),
            expand_tilde(&self.chatlog.manifest_path),
        )
    }

    pub fn retrieval_options(&self) -> RetrievalOptions {
        RetrievalOptions {
            kw_weight: self.retrieval.kw_weight,
            sem_weight: self.retrieval.sem_weight,
            sem_top_k: self.retrieval.sem_top_k,
            max_per_dimension: self.retrieval.max_per_dimension,
            context_before: self.retrieval.context_before,
            context_after: self.retrieval.context_after,
            density_bonus: self.retrieval.density_bonus,
            max_dimensions: self.retrieval.max_dimensions,
        }
    }

    pub fn budget_limits(&self) -> BudgetLimits {
        BudgetLimits {
            max_tool_calls: self.budget.max_tool_calls,
            max_loaded_messages: self.budget.max_loaded_messages,
            max_result_chars: self.budget.max_result_chars,
        }
    }

    pub fn understanding(&self) -> Understanding {
        match self.understanding.mode.as_str() {
            "llm" => Understanding::LlmBacked(LlmBacked::new(
                self.understanding.endpoint.clone(),
                Duration::from_secs(self.understanding.timeout_secs),
            )),
            _ => Understanding::RuleBased(RuleBased),
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TestimonyConfig::default();
        assert_eq!(config.server.transport, "stdio");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.budget.max_tool_calls, 3);
        assert_eq!(config.budget.max_loaded_messages, 40);
        assert!(config.chatlog.log_path.ends_with("chatlog.jsonl"));
        let sum = config.retrieval.kw_weight + config.retrieval.sem_weight;
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[chatlog]
log_path = "/tmp/chat.jsonl"

[retrieval]
max_per_dimension = 4

[budget]
max_tool_calls = 7
"#;
        let config: TestimonyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.chatlog.log_path, "/tmp/chat.jsonl");
        assert_eq!(config.retrieval.max_per_dimension, 4);
        assert_eq!(config.budget.max_tool_calls, 7);
        // defaults still apply for unset fields
        assert_eq!(config.budget.max_loaded_messages, 40);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = TestimonyConfig::default();
        std::env::set_var("TESTIMONY_LOG", "/tmp/override.jsonl");
        std::env::set_var("TESTIMONY_LOG_LEVEL", "trace");
        std::env::set_var("TESTIMONY_SEM_WEIGHT", "0.8");

        config.apply_env_overrides();

        assert_eq!(config.chatlog.log_path, "/tmp/override.jsonl");
        assert_eq!(config.server.log_level, "trace");
        assert!((config.retrieval.sem_weight - 0.8).abs() < 1e-6);

        // Clean up
        std::env::remove_var("TESTIMONY_LOG");
        std::env::remove_var("TESTIMONY_LOG_LEVEL");
        std::env::remove_var("TESTIMONY_SEM_WEIGHT");
    }

    #[test]
    fn understanding_mode_selects_variant() {
        let mut config = TestimonyConfig::default();
        assert!(matches!(
            config.understanding(),
            Understanding::RuleBased(_)
        ));
        config.understanding.mode = "llm".into();
        assert!(matches!(config.understanding(), Understanding::LlmBacked(_)));
    }
}
