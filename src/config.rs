use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::reasoner::ReasoningConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ctxgraph: CtxgraphConfig,
    #[serde(default)]
    pub reasoning: ReasoningSection,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Store and logging settings
#[derive(Debug, Clone, Deserialize)]
pub struct CtxgraphConfig {
    /// SQLite graph file. When absent the engine runs on an in-memory store.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CtxgraphConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            log_level: default_log_level(),
        }
    }
}

/// Reasoning loop settings
#[derive(Debug, Clone, Deserialize)]
pub struct ReasoningSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_beam_width")]
    pub beam_width: usize,
    #[serde(default)]
    pub use_oracle: bool,
    /// Wall-clock budget for one `reason()` call
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_sufficiency_min_facts")]
    pub sufficiency_min_facts: usize,
    #[serde(default)]
    pub oracle_rerank: bool,
}

impl Default for ReasoningSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            beam_width: default_beam_width(),
            use_oracle: false,
            timeout_ms: None,
            sufficiency_min_facts: default_sufficiency_min_facts(),
            oracle_rerank: false,
        }
    }
}

/// Judgment oracle settings
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// `heuristic` (offline, deterministic) or `openai` (chat-completions API)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// Retrieval settings
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_chunk_search_limit")]
    pub chunk_search_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_search_limit: default_chunk_search_limit(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_iterations() -> usize {
    3
}

fn default_beam_width() -> usize {
    1
}

fn default_sufficiency_min_facts() -> usize {
    3
}

fn default_provider() -> String {
    "heuristic".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    2
}

fn default_cache_capacity() -> usize {
    256
}

fn default_chunk_search_limit() -> usize {
    5
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in CTXGRAPH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = std::env::var("CTXGRAPH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml_str(&config_str)
    }

    /// Like [`Config::load`], but falls back to defaults when no config file
    /// is configured and `./config.toml` does not exist.
    pub fn load_or_default() -> Result<Self> {
        let _ = dotenv::dotenv();

        if std::env::var_os("CTXGRAPH_CONFIG").is_none() && !Path::new("config.toml").exists() {
            log::debug!("No config file found, using defaults");
            return Ok(Self::default());
        }
        Self::load()
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.reasoning.max_iterations == 0 {
            anyhow::bail!("reasoning.max_iterations must be greater than 0");
        }

        if self.reasoning.beam_width == 0 {
            anyhow::bail!("reasoning.beam_width must be greater than 0");
        }

        if self.reasoning.sufficiency_min_facts == 0 {
            anyhow::bail!("reasoning.sufficiency_min_facts must be greater than 0");
        }

        match self.oracle.provider.as_str() {
            "heuristic" => {}
            "openai" => {
                if self.reasoning.use_oracle {
                    std::env::var(&self.oracle.api_key_env).with_context(|| {
                        format!(
                            "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                            self.oracle.api_key_env
                        )
                    })?;
                }
            }
            other => anyhow::bail!("oracle.provider must be 'heuristic' or 'openai', got '{}'", other),
        }

        if self.oracle.timeout_secs == 0 {
            anyhow::bail!("oracle.timeout_secs must be greater than 0");
        }

        Ok(())
    }

    /// Get database path, if a persistent store is configured
    pub fn db_path(&self) -> Option<&Path> {
        self.ctxgraph.db_path.as_deref()
    }

    /// Engine-level settings for one `reason()` call
    pub fn reasoning_config(&self) -> ReasoningConfig {
        ReasoningConfig {
            max_iterations: self.reasoning.max_iterations,
            beam_width: self.reasoning.beam_width,
            use_oracle: self.reasoning.use_oracle,
            timeout: self.reasoning.timeout_ms.map(Duration::from_millis),
            sufficiency_min_facts: self.reasoning.sufficiency_min_facts,
            oracle_rerank: self.reasoning.oracle_rerank,
            chunk_search_limit: self.retrieval.chunk_search_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const FULL_CONFIG: &str = r#"
[ctxgraph]
db_path = "./graph.db"
log_level = "debug"

[reasoning]
max_iterations = 5
beam_width = 2
use_oracle = false
timeout_ms = 1500
sufficiency_min_facts = 4

[oracle]
provider = "heuristic"

[retrieval]
chunk_search_limit = 8
"#;

    #[test]
    fn test_config_parse_full() {
        let config = Config::from_toml_str(FULL_CONFIG).unwrap();
        assert_eq!(config.ctxgraph.log_level, "debug");
        assert_eq!(config.db_path(), Some(Path::new("./graph.db")));
        assert_eq!(config.reasoning.max_iterations, 5);
        assert_eq!(config.retrieval.chunk_search_limit, 8);

        let rc = config.reasoning_config();
        assert_eq!(rc.beam_width, 2);
        assert_eq!(rc.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(rc.sufficiency_min_facts, 4);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert!(config.db_path().is_none());
        assert_eq!(config.reasoning.max_iterations, 3);
        assert_eq!(config.reasoning.beam_width, 1);
        assert!(!config.reasoning.use_oracle);
        assert_eq!(config.oracle.provider, "heuristic");
        assert_eq!(config.oracle.cache_capacity, 256);
    }

    #[test]
    fn test_config_rejects_zero_iterations() {
        let err = Config::from_toml_str("[reasoning]\nmax_iterations = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
    }

    #[test]
    fn test_config_rejects_unknown_provider() {
        let err = Config::from_toml_str("[oracle]\nprovider = \"telepathy\"\n").unwrap_err();
        assert!(err.to_string().contains("oracle.provider"));
    }

    #[test]
    fn test_config_openai_requires_key_when_enabled() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let toml = r#"
[reasoning]
use_oracle = true

[oracle]
provider = "openai"
api_key_env = "CTXGRAPH_TEST_MISSING_KEY"
"#;
        std::env::remove_var("CTXGRAPH_TEST_MISSING_KEY");
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("CTXGRAPH_TEST_MISSING_KEY"));

        std::env::set_var("CTXGRAPH_TEST_MISSING_KEY", "test-key");
        assert!(Config::from_toml_str(toml).is_ok());
        std::env::remove_var("CTXGRAPH_TEST_MISSING_KEY");
    }

    #[test]
    fn test_config_load_from_env_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, FULL_CONFIG).unwrap();

        let original = std::env::var("CTXGRAPH_CONFIG").ok();
        std::env::set_var("CTXGRAPH_CONFIG", &config_path);
        let config = Config::load();
        std::env::remove_var("CTXGRAPH_CONFIG");
        if let Some(v) = original {
            std::env::set_var("CTXGRAPH_CONFIG", v);
        }

        let config = config.unwrap();
        assert_eq!(config.reasoning.max_iterations, 5);
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("CTXGRAPH_CONFIG").ok();
        std::env::set_var("CTXGRAPH_CONFIG", "nonexistent.toml");
        let config = Config::load();
        assert!(config.is_err());
        std::env::remove_var("CTXGRAPH_CONFIG");
        if let Some(v) = original {
            std::env::set_var("CTXGRAPH_CONFIG", v);
        }
    }
}
