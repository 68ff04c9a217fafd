use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    #[serde(default)]
    pub workers: WorkerConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub temporal: TemporalConfig,

    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for stored image blobs.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("homelens/objects")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelProviderType {
    /// Deterministic stub collaborator, no network.
    #[default]
    Stub,
    /// OpenAI-compatible HTTP endpoints.
    OpenAI,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ModelProviderType,

    #[serde(default = "default_model_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_model_endpoint() -> String {
    "http://127.0.0.1:1234/v1".to_string()
}

fn default_vision_model() -> String {
    "property-vision-v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProviderType::default(),
            endpoint: default_model_endpoint(),
            vision_model: default_vision_model(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Dimension of image embeddings produced by the vision collaborator.
    #[serde(default = "default_image_dim")]
    pub image_dim: usize,

    /// Dimension of text embeddings.
    #[serde(default = "default_text_dim")]
    pub text_dim: usize,
}

fn default_image_dim() -> usize {
    768
}

fn default_text_dim() -> usize {
    1536
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            image_dim: default_image_dim(),
            text_dim: default_text_dim(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of ingest worker threads.
    #[serde(default = "default_worker_count")]
    pub count: usize,
}

fn default_worker_count() -> usize {
    4
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Version string stamped on every recomputed rollup.
    #[serde(default = "default_calculation_version")]
    pub calculation_version: String,

    /// How many top features to keep in `common_features`.
    #[serde(default = "default_top_features")]
    pub top_features: usize,
}

fn default_calculation_version() -> String {
    "v1.0".to_string()
}

fn default_top_features() -> usize {
    10
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            calculation_version: default_calculation_version(),
            top_features: default_top_features(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalConfig {
    /// Change magnitude above which a change is flagged for review.
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
}

fn default_review_threshold() -> f64 {
    0.2
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            review_threshold: default_review_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// How many similar images to retrieve for grounding.
    #[serde(default = "default_image_k")]
    pub image_k: usize,

    /// How many similar prior messages to retrieve.
    #[serde(default = "default_message_k")]
    pub message_k: usize,

    /// How many retrieved messages make it into the prompt.
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,

    /// Character cap per quoted prior message.
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

fn default_image_k() -> usize {
    6
}

fn default_message_k() -> usize {
    5
}

fn default_context_messages() -> usize {
    3
}

fn default_snippet_chars() -> usize {
    200
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            image_k: default_image_k(),
            message_k: default_message_k(),
            context_messages: default_context_messages(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("homelens")
        .join("homelens.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            storage: StorageConfig::default(),
            model: ModelConfig::default(),
            embeddings: EmbeddingConfig::default(),
            workers: WorkerConfig::default(),
            aggregation: AggregationConfig::default(),
            temporal: TemporalConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Create default config
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("homelens")
            .join("config.toml")
    }
}
