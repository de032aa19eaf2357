//! Error types for the deal analysis orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Run-aborting Errors
    // =============================

    #[error("Subject not found: {0}")]
    SubjectNotFound(String),

    #[error("Data flow blocked: {0}")]
    DataFlowBlocked(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported action '{0}', see migration guide")]
    UnsupportedAction(String),

    // =============================
    // Collaborator Errors (absorbed inside a run)
    // =============================

    #[error("Engine error: {0}")]
    EngineError(String),

    #[error("Engine timed out after {0} ms")]
    EngineTimeout(u64),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("State persistence error: {0}")]
    StateError(String),

    #[error("Memory store error: {0}")]
    MemoryStoreError(String),

    #[error("Policy check error: {0}")]
    PolicyError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Strategy file parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
