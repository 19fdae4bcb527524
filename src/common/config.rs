//! Configuration for the assistant.
//!
//! Defaults are overridden from the environment by [`AgentConfig::from_env`].
//! The variable names are the ones the deployment already exports, including
//! the historical `MONDODB_REPLICA_SET_NAME` spelling.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::common::errors::{AgentError, AgentResult};

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Completion model settings.
    pub llm: LlmConfig,
    /// Document database settings.
    pub database: DatabaseConfig,
    /// Schema source settings.
    pub schema: SchemaConfig,
    /// Query pipeline tuning.
    pub pipeline: PipelineConfig,
    /// Session persistence settings.
    pub storage: StorageConfig,
    /// Remote tool delegate settings.
    pub tool: ToolConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
}

impl AgentConfig {
    /// Build a configuration from defaults and the process environment.
    ///
    /// # Errors
    /// Returns an error if an override cannot be parsed or validation fails.
    pub fn from_env() -> AgentResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from defaults and an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    /// Returns an error if an override cannot be parsed or validation fails.
    pub fn from_lookup<F>(lookup: F) -> AgentResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(provider) = var("QUADZ_LLM_PROVIDER") {
            config.llm.provider = match provider.to_ascii_lowercase().as_str() {
                "openai" | "openai_compatible" => LlmProvider::OpenAiCompatible,
                "ollama" => LlmProvider::Ollama,
                other => {
                    return Err(AgentError::InvalidConfig(format!(
                        "unknown llm provider: {other}"
                    )));
                }
            };
        }
        if let Some(model) = var("QUADZ_LLM_MODEL") {
            config.llm.model = model;
        }
        config.llm.base_url = var("QUADZ_LLM_BASE_URL");
        config.llm.api_key = var("OPENAI_API_KEY");

        config.database.uri = var("MONGODB_URI").or_else(|| {
            mongodb_uri_from_parts(&MongoUriParts {
                username: var("MONGODB_USERNAME"),
                password: var("MONGODB_PASSWORD"),
                host: var("MONGODB_HOST"),
                port: var("MONGODB_PORT"),
                database: var("MONGODB_DB"),
                replica_set: var("MONDODB_REPLICA_SET_NAME"),
            })
        });
        config.database.database = var("MONGODB_DB");

        config.schema.external_endpoint = var("EXTERNAL_SCHEMA_API_ENDPOINT");
        config.tool.delegate_endpoint = var("DB_TOOL_API");

        if let Some(dir) = var("QUADZ_SESSIONS_DIR") {
            config.storage.sessions_dir = PathBuf::from(dir);
        }
        if let Some(port) = var("QUADZ_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| AgentError::InvalidConfig(format!("invalid port: {port}")))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> AgentResult<()> {
        if self.pipeline.top_k == 0 {
            return Err(AgentError::InvalidConfig(
                "pipeline.top_k must be > 0".to_string(),
            ));
        }

        if self.pipeline.default_limit == 0 {
            return Err(AgentError::InvalidConfig(
                "pipeline.default_limit must be > 0".to_string(),
            ));
        }

        if !self.database.include_collections.is_empty()
            && !self.database.ignore_collections.is_empty()
        {
            return Err(AgentError::InvalidConfig(
                "cannot specify both include_collections and ignore_collections".to_string(),
            ));
        }

        if let Some(base_url) = &self.llm.base_url {
            Url::parse(base_url)?;
        }

        if let Some(endpoint) = &self.schema.external_endpoint {
            Url::parse(endpoint)?;
        }

        if let Some(endpoint) = &self.tool.delegate_endpoint {
            Url::parse(endpoint)?;
        }

        Ok(())
    }
}

/// Completion provider selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Any endpoint speaking the OpenAI chat-completions protocol.
    OpenAiCompatible,
    /// Local or remote Ollama through Rig.
    Ollama,
}

/// Completion model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Which provider to talk to.
    pub provider: LlmProvider,
    /// Model name.
    pub model: String,
    /// Optional custom base URL.
    pub base_url: Option<String>,
    /// API key for providers that need one.
    pub api_key: Option<String>,
    /// Temperature for generation.
    pub temperature: f64,
    /// Optional max tokens.
    pub max_tokens: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAiCompatible,
            model: "gpt-4-turbo".to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.0,
            max_tokens: None,
            timeout_seconds: 120,
        }
    }
}

/// Document database settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection string.
    pub uri: Option<String>,
    /// Database name; falls back to the URI's default database.
    pub database: Option<String>,
    /// Only these collections are usable when non-empty.
    pub include_collections: Vec<String>,
    /// These collections are hidden when non-empty.
    pub ignore_collections: Vec<String>,
    /// Sample documents shown per collection in the schema description.
    pub sample_documents: usize,
    /// Max characters per collection block in the schema description; 0 keeps
    /// blocks whole.
    pub max_string_length: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: None,
            database: None,
            include_collections: Vec::new(),
            ignore_collections: Vec::new(),
            sample_documents: 1,
            max_string_length: 30_000,
        }
    }
}

/// Schema source settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// When set, the schema is fetched from this endpoint instead of the database.
    pub external_endpoint: Option<String>,
}

/// Query pipeline tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Max collections the selector suggests.
    pub top_k: usize,
    /// Result cap the synthesizer adds when the user gives none.
    pub default_limit: usize,
    /// Whether to run the collection selector before synthesis.
    pub select_collections: bool,
    /// Extra instruction appended to the question before synthesis.
    pub question_suffix: Option<String>,
    /// Reject pipelines containing stages outside the read-only allow-list.
    pub enforce_read_only: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            default_limit: 10,
            select_collections: true,
            question_suffix: None,
            enforce_read_only: true,
        }
    }
}

/// Session persistence settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding one directory per session.
    pub sessions_dir: PathBuf,
    /// Assistant greeting seeded into empty conversations.
    pub greeting: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sessions_dir: PathBuf::from("sessions"),
            greeting: "How can I help you?".to_string(),
        }
    }
}

/// Remote tool delegate settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolConfig {
    /// When set, database lookups are delegated to this endpoint.
    pub delegate_endpoint: Option<String>,
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

/// Pieces a MongoDB connection string is assembled from.
#[derive(Clone, Debug, Default)]
pub struct MongoUriParts {
    /// User name, percent-encoded on assembly.
    pub username: Option<String>,
    /// Password, percent-encoded on assembly.
    pub password: Option<String>,
    /// Host (cluster address for SRV).
    pub host: Option<String>,
    /// Port; switches from SRV to a plain host:port URI.
    pub port: Option<String>,
    /// Database used for the path and `authSource`.
    pub database: Option<String>,
    /// Replica set name.
    pub replica_set: Option<String>,
}

/// Assemble a MongoDB URI, or `None` without a host.
#[must_use]
pub fn mongodb_uri_from_parts(parts: &MongoUriParts) -> Option<String> {
    let host = parts.host.as_deref()?;
    let credentials = match (&parts.username, &parts.password) {
        (Some(user), Some(pass)) => format!(
            "{}:{}@",
            urlencoding::encode(user),
            urlencoding::encode(pass)
        ),
        (Some(user), None) => format!("{}@", urlencoding::encode(user)),
        _ => String::new(),
    };
    let authority = match &parts.port {
        Some(port) => format!("mongodb://{credentials}{host}:{port}"),
        None => format!("mongodb+srv://{credentials}{host}"),
    };

    let mut uri = match &parts.database {
        Some(db) => format!("{authority}/{db}?authSource={db}"),
        None => format!("{authority}/"),
    };
    if let Some(replica_set) = &parts.replica_set {
        uri.push(if parts.database.is_some() { '&' } else { '?' });
        uri.push_str("replicaSet=");
        uri.push_str(replica_set);
    }
    Some(uri)
}
