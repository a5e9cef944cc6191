//! # LLM provider layer
//!
//! Provider-neutral request/response types, the [`LlmClient`] trait every
//! backend implements, and the [`LlmService`] that routes a request to the
//! client of the first model in its priority list.
//!
//! ```text
//!  TextRequest ──┐                       ┌── OpenAiClient (async-openai)
//!  Structured ───┼──> LlmService ──map──>┤
//!  Embedding ────┘   (priority[0] or     └── … other providers
//!                     registry default)
//! ```
//!
//! Model metadata and selection live in [`registry`].

pub mod openai;
pub mod registry;
pub(crate) mod service;

pub use service::LlmService;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Error, Result};

/// Vendors a model can be served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Vertex,
    Anthropic,
    Mistral,
    Cohere,
    /// Self-hosted / local.
    Ollama,
    /// Fine-tuned or user-defined endpoint.
    Custom,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Vertex => "vertex",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Mistral => "mistral",
            LlmProvider::Cohere => "cohere",
            LlmProvider::Ollama => "ollama",
            LlmProvider::Custom => "custom",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of input/output a model handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelCapability {
    /// Conversational, multi-turn.
    Chat,
    /// Single-turn prompt to text.
    Completion,
    /// Text to vector.
    Embedding,
    /// Text + image inputs.
    Vision,
}

/// Workloads a model is known to be good at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum LlmTask {
    #[serde(rename = "function_call")]
    FunctionCall,
    #[serde(rename = "tool_use")]
    ToolUse,
    #[serde(rename = "code_generation")]
    CodeGen,
    #[serde(rename = "sql_generation")]
    SqlGen,
    #[serde(rename = "retrieval_augmented_gen")]
    Rag,
    #[serde(rename = "metadata_search")]
    MetadataSearch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMessageRole {
    System,
    User,
    Assistant,
    Tool,
    Function,
}

/// Price in USD per 1K tokens.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelCost {
    pub input_token: f64,
    pub output_token: f64,
}

impl ModelCost {
    pub fn total(&self) -> f64 {
        self.input_token + self.output_token
    }
}

/// Static description of a model, as kept in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmModel {
    /// Provider-side model name, e.g. `gpt-4o`.
    pub id: String,
    /// Human readable name.
    pub name: String,
    pub provider: LlmProvider,
    pub capabilities: Vec<ModelCapability>,
    #[serde(default)]
    pub tasks: Vec<LlmTask>,
    pub cost: Option<ModelCost>,
    pub context_window: Option<u32>,
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub supports_streaming: bool,
    #[serde(default)]
    pub supports_vision: bool,
    #[serde(default)]
    pub supports_function_calling: bool,
}

impl LlmModel {
    /// Input + output price per 1K tokens; unknown cost counts as free.
    pub fn total_cost(&self) -> f64 {
        self.cost.map(|c| c.total()).unwrap_or(0.0)
    }

    pub fn has_capability(&self, capability: ModelCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn has_task(&self, task: LlmTask) -> bool {
        self.tasks.contains(&task)
    }
}

/// Per-call generation knobs. Unset fields use the provider's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_name: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop_sequences: Option<Vec<String>>,
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatMessageRole,
    pub content: String,
    /// Function/tool name, when the role needs one.
    pub name: Option<String>,
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn new(role: ChatMessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_call_id: None,
        }
    }
}

/// Free-form text generation.
#[derive(Debug, Clone, Default)]
pub struct TextRequest {
    pub prompt: String,
    /// Full chat history; when non-empty it is sent instead of `prompt`.
    pub messages: Vec<ChatMessage>,
    /// Candidate models, best first. Only the first one is used.
    pub priority: Vec<LlmModel>,
    pub config: ModelConfig,
}

/// A worked example shown to the model before the real input.
#[derive(Debug, Clone)]
pub struct ExtractionExample {
    pub input: String,
    pub output: Value,
}

/// Schema-constrained extraction.
#[derive(Debug, Clone, Default)]
pub struct StructuredOutputRequest {
    pub prompt: String,
    pub schema_name: String,
    /// JSON schema the answer must satisfy.
    pub schema: Value,
    pub examples: Vec<ExtractionExample>,
    pub priority: Vec<LlmModel>,
    pub config: ModelConfig,
}

#[derive(Debug, Clone, Default)]
pub struct EmbeddingRequest {
    pub input: Vec<String>,
    pub priority: Vec<LlmModel>,
    pub config: ModelConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResponse {
    /// One vector per input, in input order.
    pub embeddings: Vec<Vec<f32>>,
    /// Model id that produced the vectors.
    pub model: String,
}

/// A provider backend.
///
/// Every operation has a default body that reports it as unsupported, so a
/// backend only implements what its API offers.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> LlmProvider;

    async fn generate_text(&self, _req: &TextRequest, _config: &ModelConfig) -> Result<String> {
        Err(Error::Unsupported {
            provider: self.provider().to_string(),
            operation: "generate_text",
        })
    }

    async fn generate_structured_output(
        &self,
        _req: &StructuredOutputRequest,
        _config: &ModelConfig,
    ) -> Result<Value> {
        Err(Error::Unsupported {
            provider: self.provider().to_string(),
            operation: "generate_structured_output",
        })
    }

    async fn embed(&self, _input: &[String], _config: &ModelConfig) -> Result<Vec<Vec<f32>>> {
        Err(Error::Unsupported {
            provider: self.provider().to_string(),
            operation: "embed",
        })
    }
}

/// Render an extracted profile the way the model should echo it back.
///
/// Used for the assistant turn of few-shot extraction examples.
pub fn convert_to_plain_text(output: &Value) -> String {
    let Some(obj) = output.as_object() else {
        return "No relevant information found.".to_string();
    };

    let mut parts = Vec::new();
    for (key, label) in [
        ("name", "Name"),
        ("email", "Email"),
        ("role", "Role"),
        ("location", "Location"),
    ] {
        if let Some(s) = obj.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()) {
            parts.push(format!("{label}: {s}"));
        }
    }
    for (key, label) in [
        ("skills", "Skills"),
        ("previousCompanies", "Previous Companies"),
        ("interests", "Interests"),
    ] {
        if let Some(items) = obj.get(key).and_then(Value::as_array) {
            let items: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            if !items.is_empty() {
                parts.push(format!("{label}: {}", items.join(", ")));
            }
        }
    }
    if let Some(s) = obj
        .get("experience")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        parts.push(format!("Experience: {s}"));
    }

    if parts.is_empty() {
        return "No relevant user information found in the text.".to_string();
    }
    format!("Extracted information:\n{}", parts.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_text_lists_known_fields() {
        let out = convert_to_plain_text(&json!({
            "name": "Ada Lovelace",
            "role": "Engineer",
            "skills": ["Rust", "Math"],
            "interests": [],
            "experience": "10 years"
        }));
        assert_eq!(
            out,
            "Extracted information:\nName: Ada Lovelace\nRole: Engineer\nSkills: Rust, Math\nExperience: 10 years"
        );
    }

    #[test]
    fn plain_text_handles_empty_input() {
        assert_eq!(
            convert_to_plain_text(&json!(null)),
            "No relevant information found."
        );
        assert_eq!(
            convert_to_plain_text(&json!({"email": null})),
            "No relevant user information found in the text."
        );
    }

    #[test]
    fn task_serializes_with_wire_names() {
        assert_eq!(
            serde_json::to_string(&LlmTask::Rag).unwrap(),
            "\"retrieval_augmented_gen\""
        );
        assert_eq!(serde_json::to_string(&LlmProvider::OpenAi).unwrap(), "\"openai\"");
    }
}
