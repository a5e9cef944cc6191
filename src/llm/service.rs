use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};
use tiktoken_rs::{CoreBPE, cl100k_base};
use tracing::{debug, error, info};

use super::{
    EmbeddingRequest, EmbeddingResponse, LlmClient, LlmModel, LlmProvider, ModelConfig,
    StructuredOutputRequest, TextRequest, openai::OpenAiClient, registry::ModelRegistry,
};
use crate::{
    config::AppConfig,
    error::{Error, Result},
};

static BPE: Lazy<Option<CoreBPE>> = Lazy::new(|| cl100k_base().ok());

/// Routes LLM calls to the client registered for the chosen model's provider.
///
/// The model for a call is the first entry of the request's priority list;
/// when the list is empty the service falls back to its defaults (GPT-4o for
/// text, `text-embedding-3-small` for embeddings, or the configured models).
#[derive(Clone)]
pub struct LlmService {
    clients: HashMap<LlmProvider, Arc<dyn LlmClient>>,
    default_chat_model: LlmModel,
    default_embedding_model: LlmModel,
}

impl Default for LlmService {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmService {
    /// A service with no clients and the registry defaults.
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            default_chat_model: ModelRegistry::gpt_4o().clone(),
            default_embedding_model: ModelRegistry::embedding_small().clone(),
        }
    }

    /// Build the service used by the CLI: an OpenAI client pointed at the
    /// configured endpoint, with the configured default models.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = OpenAiClient::from_config(config)?;
        let mut service = Self::new().with_client(LlmProvider::OpenAi, Arc::new(client));
        service.default_chat_model = config.chat_model()?.clone();
        service.default_embedding_model = config.embedding_model()?.clone();
        Ok(service)
    }

    pub fn with_client(mut self, provider: LlmProvider, client: Arc<dyn LlmClient>) -> Self {
        self.clients.insert(provider, client);
        self
    }

    fn client_for(&self, model: &LlmModel) -> Result<&Arc<dyn LlmClient>> {
        self.clients
            .get(&model.provider)
            .ok_or(Error::NoClient(model.provider))
    }

    fn pick<'a>(priority: &'a [LlmModel], fallback: &'a LlmModel) -> &'a LlmModel {
        priority.first().unwrap_or(fallback)
    }

    fn with_model(config: &ModelConfig, model: &LlmModel) -> ModelConfig {
        ModelConfig {
            model_name: Some(model.id.clone()),
            ..config.clone()
        }
    }

    pub async fn generate_text(&self, req: &TextRequest) -> Result<String> {
        info!("LLMService | Generating text response...");

        if req.prompt.trim().is_empty() && req.messages.is_empty() {
            return Err(Error::InvalidRequest(
                "Prompt is required for text generation".into(),
            ));
        }

        let model = Self::pick(&req.priority, &self.default_chat_model);
        let client = self.client_for(model)?;
        info!(
            "LLMService | Using model: {} and provider: {}",
            model.name, model.provider
        );
        log_estimated_cost(model, &req.prompt);

        client
            .generate_text(req, &Self::with_model(&req.config, model))
            .await
            .inspect_err(|e| error!("LLMService | Text generation failed: {e}"))
    }

    pub async fn generate_structured_output(&self, req: &StructuredOutputRequest) -> Result<Value> {
        info!("LLMService | Generating structured output...");

        if req.prompt.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "Prompt is required for structured output generation".into(),
            ));
        }

        let model = Self::pick(&req.priority, &self.default_chat_model);
        let client = self.client_for(model)?;
        info!(
            "LLMService | Using model: {} and provider: {}",
            model.name, model.provider
        );
        log_estimated_cost(model, &req.prompt);

        client
            .generate_structured_output(req, &Self::with_model(&req.config, model))
            .await
            .inspect_err(|e| error!("LLMService | Structured output failed: {e}"))
    }

    /// [`generate_structured_output`](Self::generate_structured_output) decoded into `T`.
    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        req: &StructuredOutputRequest,
    ) -> Result<T> {
        let value = self.generate_structured_output(req).await?;
        serde_json::from_value(value).map_err(|e| Error::MalformedOutput(e.to_string()))
    }

    pub async fn execute_embedding(&self, req: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        if req.input.is_empty() {
            return Err(Error::InvalidRequest(
                "Embedding input cannot be empty".into(),
            ));
        }

        let model = Self::pick(&req.priority, &self.default_embedding_model);
        let client = self.client_for(model)?;
        debug!(
            "LLMService | Embedding {} input(s) with {}",
            req.input.len(),
            model.id
        );

        let embeddings = client
            .embed(&req.input, &Self::with_model(&req.config, model))
            .await
            .inspect_err(|e| error!("LLMService | Embedding failed: {e}"))?;

        if embeddings.len() != req.input.len() {
            return Err(Error::MalformedOutput(format!(
                "expected {} embeddings, got {}",
                req.input.len(),
                embeddings.len()
            )));
        }

        Ok(EmbeddingResponse {
            embeddings,
            model: model.id.clone(),
        })
    }
}

/// Prompt token count with the cl100k encoding; `None` if the encoder is unavailable.
pub fn count_tokens(text: &str) -> Option<usize> {
    BPE.as_ref()
        .map(|bpe| bpe.encode_with_special_tokens(text).len())
}

fn log_estimated_cost(model: &LlmModel, prompt: &str) {
    if let (Some(tokens), Some(cost)) = (count_tokens(prompt), model.cost) {
        debug!(
            "LLMService | ~{} prompt tokens, ~${:.6} input cost on {}",
            tokens,
            tokens as f64 / 1000.0 * cost.input_token,
            model.id
        );
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm::{ChatMessageRole, registry::ModelRegistry};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records the configs it was called with and answers from fixed values.
    pub(crate) struct RecordingClient {
        pub configs: Mutex<Vec<ModelConfig>>,
        pub text: String,
        pub structured: Value,
    }

    impl RecordingClient {
        pub fn new(text: &str, structured: Value) -> Self {
            Self {
                configs: Mutex::new(Vec::new()),
                text: text.to_string(),
                structured,
            }
        }

        fn record(&self, config: &ModelConfig) {
            self.configs.lock().unwrap().push(config.clone());
        }
    }

    #[async_trait]
    impl LlmClient for RecordingClient {
        fn provider(&self) -> LlmProvider {
            LlmProvider::OpenAi
        }

        async fn generate_text(&self, _req: &TextRequest, config: &ModelConfig) -> Result<String> {
            self.record(config);
            Ok(self.text.clone())
        }

        async fn generate_structured_output(
            &self,
            _req: &StructuredOutputRequest,
            config: &ModelConfig,
        ) -> Result<Value> {
            self.record(config);
            Ok(self.structured.clone())
        }

        async fn embed(&self, input: &[String], config: &ModelConfig) -> Result<Vec<Vec<f32>>> {
            self.record(config);
            Ok(input.iter().map(|s| vec![s.len() as f32, 1.0]).collect())
        }
    }

    fn service(client: Arc<RecordingClient>) -> LlmService {
        LlmService::new().with_client(LlmProvider::OpenAi, client)
    }

    #[tokio::test]
    async fn text_defaults_to_gpt_4o() {
        let client = Arc::new(RecordingClient::new("hello", Value::Null));
        let out = service(client.clone())
            .generate_text(&TextRequest {
                prompt: "hi".into(),
                config: ModelConfig {
                    temperature: Some(0.3),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(out, "hello");
        let configs = client.configs.lock().unwrap();
        assert_eq!(configs[0].model_name.as_deref(), Some("gpt-4o"));
        assert_eq!(configs[0].temperature, Some(0.3));
    }

    #[tokio::test]
    async fn first_priority_model_wins() {
        let client = Arc::new(RecordingClient::new("", serde_json::json!({"a": 1})));
        let req = StructuredOutputRequest {
            prompt: "extract".into(),
            priority: vec![ModelRegistry::gpt_4().clone(), ModelRegistry::gpt_4o().clone()],
            ..Default::default()
        };
        let out = service(client.clone())
            .generate_structured_output(&req)
            .await
            .unwrap();

        assert_eq!(out["a"], 1);
        assert_eq!(
            client.configs.lock().unwrap()[0].model_name.as_deref(),
            Some("gpt-4")
        );
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected() {
        let client = Arc::new(RecordingClient::new("", Value::Null));
        let err = service(client.clone())
            .generate_text(&TextRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(client.configs.lock().unwrap().is_empty());

        let with_messages = TextRequest {
            messages: vec![crate::llm::ChatMessage::new(ChatMessageRole::User, "hi")],
            ..Default::default()
        };
        assert!(service(client).generate_text(&with_messages).await.is_ok());
    }

    #[tokio::test]
    async fn missing_provider_client_errors() {
        let mut model = ModelRegistry::gpt_4o().clone();
        model.provider = LlmProvider::Anthropic;
        let err = LlmService::new()
            .generate_text(&TextRequest {
                prompt: "hi".into(),
                priority: vec![model],
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoClient(LlmProvider::Anthropic)));
    }

    #[tokio::test]
    async fn embedding_uses_default_model() {
        let client = Arc::new(RecordingClient::new("", Value::Null));
        let resp = service(client.clone())
            .execute_embedding(&EmbeddingRequest {
                input: vec!["abc".into(), "de".into()],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(resp.model, "text-embedding-3-small");
        assert_eq!(resp.embeddings, vec![vec![3.0, 1.0], vec![2.0, 1.0]]);
    }

    #[test]
    fn counts_tokens() {
        assert!(count_tokens("hello world").is_some_and(|n| n >= 2));
    }
}
