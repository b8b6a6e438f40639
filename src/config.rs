use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the studio retrieval service.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection used for chunk storage.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Base URL of the embedding/rerank provider API.
    pub embedding_api_url: String,
    /// Optional API key for the embedding provider.
    pub embedding_api_key: Option<String>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Reranking model identifier passed to the provider.
    pub rerank_model: String,
    /// Whether retrieval applies the second-stage rerank pass.
    pub rerank_enabled: bool,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the LLM messages API.
    pub llm_api_url: String,
    /// Optional API key for the LLM provider.
    pub llm_api_key: Option<String>,
    /// Generation model identifier.
    pub llm_model: String,
    /// Maximum output tokens requested per generation.
    pub llm_max_tokens: u32,
    /// Input-token budget for a conversation before trimming.
    pub max_input_tokens: usize,
    /// Safety buffer subtracted from the budget to decide when to trim.
    pub token_buffer: usize,
    /// Optional override for the splitter chunk size (characters).
    pub chunk_size: Option<usize>,
    /// Optional override for the splitter chunk overlap (characters).
    pub chunk_overlap: Option<usize>,
    /// Divisor applied inside the priority weight exponent.
    pub priority_weight_factor: f32,
    /// Number of vectors sent per upsert segment.
    pub upsert_segment_size: usize,
    /// Delay between upsert segments, in milliseconds.
    pub upsert_segment_delay_ms: u64,
    /// Default number of candidates requested per search.
    pub search_default_limit: usize,
    /// Upper bound on candidates per search.
    pub search_max_limit: usize,
    /// Topic labels that route a query to the on-topic identity.
    pub topics: Vec<String>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env("QDRANT_COLLECTION_NAME")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_api_url: load_env("EMBEDDING_API_URL")?,
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY"),
            embedding_model: load_env("EMBEDDING_MODEL")?,
            rerank_model: load_env_optional("RERANK_MODEL")
                .unwrap_or_else(|| "rerank-2".to_string()),
            rerank_enabled: parse_or("RERANK_ENABLED", true)?,
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))?,
            llm_api_url: load_env("LLM_API_URL")?,
            llm_api_key: load_env_optional("LLM_API_KEY"),
            llm_model: load_env("LLM_MODEL")?,
            llm_max_tokens: parse_or("LLM_MAX_TOKENS", 1024)?,
            max_input_tokens: parse_or("MAX_INPUT_TOKENS", 40_000)?,
            token_buffer: parse_or("TOKEN_BUFFER", 4_000)?,
            chunk_size: parse_optional("CHUNK_SIZE")?,
            chunk_overlap: parse_optional("CHUNK_OVERLAP")?,
            priority_weight_factor: parse_or("PRIORITY_WEIGHT_FACTOR", 2.0)?,
            upsert_segment_size: parse_or("UPSERT_SEGMENT_SIZE", 100)?,
            upsert_segment_delay_ms: parse_or("UPSERT_SEGMENT_DELAY_MS", 1_000)?,
            search_default_limit: parse_or("SEARCH_DEFAULT_LIMIT", 8)?,
            search_max_limit: parse_or("SEARCH_MAX_LIMIT", 50)?,
            topics: load_env_optional("TOPICS")
                .map(|value| {
                    value
                        .split(',')
                        .map(|topic| topic.trim().to_string())
                        .filter(|topic| !topic.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            server_port: parse_optional("SERVER_PORT")?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    Ok(parse_optional(key)?.unwrap_or(default))
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        embedding_model = %config.embedding_model,
        llm_model = %config.llm_model,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
