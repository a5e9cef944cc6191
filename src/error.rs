//! Crate-wide error type.
//!
//! Every service returns [`Result`]. Services log failures with `tracing::error!`
//! before handing them back to the caller, so the CLI only has to print the
//! top-level message.

use thiserror::Error;

use crate::{llm::LlmProvider, vector_store::VectorStoreProvider};

#[derive(Error, Debug)]
pub enum Error {
    #[error("LLM request failed: {0}")]
    OpenAi(#[from] async_openai::error::OpenAIError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("No client available for provider: {0}")]
    NoClient(LlmProvider),

    #[error("No vector store available for provider: {0}")]
    NoStore(VectorStoreProvider),

    #[error("{operation} is not supported by provider {provider}")]
    Unsupported { provider: String, operation: &'static str },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Vector store not initialized. Call initialize() first.")]
    NotInitialized,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
