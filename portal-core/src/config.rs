use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Environment variable holding the Gemini API key.
pub const GEMINI_API_KEY_VAR: &str = "GEMINI_API_KEY";
/// Environment variable holding the Pinecone API key.
pub const PINECONE_API_KEY_VAR: &str = "PINECONE_API_KEY";

/// Configuration for the whole portal.
///
/// Every section has defaults, so a partial `config.yaml` (or none at all) is
/// fine. API keys are never read from the file; [`Config::with_env`] fills them
/// from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub system_prompt: String,
    pub embedding: EmbeddingConfig,
    pub vector_db: VectorDbConfig,
    pub paths: PathsConfig,
    pub reports: ReportsConfig,
    pub server: ServerConfig,
}

/// Chat model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    /// Upper bound on model → tool → model round trips for one answer.
    pub max_tool_rounds: usize,

    #[serde(skip)]
    pub api_key: Option<String>,
}

/// Embedding model settings and batch pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    /// Pause after every embedding call, in milliseconds.
    pub request_delay_ms: u64,
}

/// Hosted vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorDbConfig {
    pub control_plane_url: String,
    pub api_version: String,
    pub index_name: String,
    pub namespace: String,
    pub dimension: u32,
    pub metric: String,
    pub cloud: String,
    pub region: String,
    pub batch_size: usize,
    pub top_k: usize,

    #[serde(skip)]
    pub api_key: Option<String>,
}

/// On-disk data layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub reports_dir: PathBuf,
    pub report_embeddings_dir: PathBuf,
    pub question_embeddings_dir: PathBuf,
    pub questions_path: PathBuf,
    pub static_dir: PathBuf,
}

/// Report access rules for the file-reading tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    /// When non-empty, only these file names may be read.
    pub allowed_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-preview-05-20".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            temperature: 0.7,
            max_output_tokens: 2048,
            max_tool_rounds: 5,
            api_key: None,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "gemini-embedding-exp-03-07".to_string(),
            request_delay_ms: 6000,
        }
    }
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            control_plane_url: "https://api.pinecone.io".to_string(),
            api_version: "2024-07".to_string(),
            index_name: "example-index".to_string(),
            namespace: "example-namespace".to_string(),
            dimension: 3072,
            metric: "cosine".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            batch_size: 100,
            top_k: 2,
            api_key: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from("./data/reports/JSON"),
            report_embeddings_dir: PathBuf::from("./data/embeddings/reports"),
            question_embeddings_dir: PathBuf::from("./data/embeddings/questions"),
            questions_path: PathBuf::from("./data/questions/questions_v0.json"),
            static_dir: PathBuf::from("./static"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            system_prompt: crate::chat::DEFAULT_SYSTEM_PROMPT.to_string(),
            embedding: EmbeddingConfig::default(),
            vector_db: VectorDbConfig::default(),
            paths: PathsConfig::default(),
            reports: ReportsConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from `config.yaml` if it exists, otherwise use defaults.
    pub fn load_or_default() -> Self {
        Self::load("config.yaml").unwrap_or_default()
    }

    /// Fill API keys from the process environment. Empty values count as unset.
    pub fn with_env(mut self) -> Self {
        self.llm.api_key = read_key(GEMINI_API_KEY_VAR);
        self.vector_db.api_key = read_key(PINECONE_API_KEY_VAR);
        self
    }
}

fn read_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_config_defaults() {
        let config = LlmConfig::default();
        assert_eq!(config.model, "gemini-2.5-flash-preview-05-20");
        assert_eq!(config.max_output_tokens, 2048);
        assert_eq!(config.max_tool_rounds, 5);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_vector_db_config_defaults() {
        let config = VectorDbConfig::default();
        assert_eq!(config.index_name, "example-index");
        assert_eq!(config.namespace, "example-namespace");
        assert_eq!(config.dimension, 3072);
        assert_eq!(config.metric, "cosine");
        assert_eq!(config.batch_size, 100);
    }

    #[test]
    fn test_embedding_config_defaults() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.model, "gemini-embedding-exp-03-07");
        assert_eq!(config.request_delay_ms, 6000);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = "llm:\n  model: gemini-2.0-flash-001\nvector_db:\n  batch_size: 50\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.model, "gemini-2.0-flash-001");
        assert_eq!(config.llm.max_output_tokens, 2048);
        assert_eq!(config.vector_db.batch_size, 50);
        assert_eq!(config.vector_db.index_name, "example-index");
        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert!(config.system_prompt.contains("financial analyst"));
    }

    #[test]
    fn example_config_matches_defaults() {
        let config: Config = serde_yaml::from_str(include_str!("../../config.example.yaml")).unwrap();
        let defaults = Config::default();

        assert_eq!(config.llm.model, defaults.llm.model);
        assert_eq!(config.embedding.request_delay_ms, defaults.embedding.request_delay_ms);
        assert_eq!(config.vector_db.top_k, defaults.vector_db.top_k);
        assert_eq!(config.server.bind, defaults.server.bind);
        assert!(config.reports.allowed_files.is_empty());
    }

    #[test]
    fn api_keys_are_not_read_from_file() {
        let yaml = "llm:\n  api_key: leaked\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "reports:\n  allowed_files:\n    - company_report_HPG.json\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.reports.allowed_files, vec!["company_report_HPG.json"]);
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let result = Config::load("/nonexistent/portal/config.yaml");
        assert!(matches!(result, Err(ConfigError::FileRead(_))));
    }
}
