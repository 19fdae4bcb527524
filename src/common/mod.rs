//! Configuration, errors, and identifiers shared by every module.

pub mod config;
pub mod errors;
pub mod ids;

pub use config::{
    AgentConfig, DatabaseConfig, LlmConfig, LlmProvider, PipelineConfig, SchemaConfig,
    ServerConfig, StorageConfig, ToolConfig,
};
pub use errors::{AgentError, AgentResult};
pub use ids::{PayloadId, SessionId};
