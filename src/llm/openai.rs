//! # OpenAI-compatible client
//!
//! [`OpenAiClient`] implements [`LlmClient`] on top of `async-openai`, so it
//! works against api.openai.com and any server that speaks the same REST
//! dialect (local inference servers, proxies, mocks in tests).
//!
//! - Text generation: `/chat/completions`, prompt sent as a single user turn
//!   unless a full message list is supplied.
//! - Structured output: `/chat/completions` with a `json_schema` response
//!   format, preceded by an extraction system prompt and optional few-shot
//!   examples.
//! - Embeddings: `/embeddings`, batched, returned in input order.

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{
    ChatMessage, ChatMessageRole, LlmClient, LlmProvider, ModelConfig, StructuredOutputRequest,
    TextRequest, convert_to_plain_text,
    registry::{GPT_4O, TEXT_EMBEDDING_3_SMALL},
};
use crate::{
    config::AppConfig,
    error::{Error, Result},
};

const EXTRACTION_SYSTEM_PROMPT: &str = "You are an expert extraction algorithm.
Only extract relevant information from the text.
If you do not know the value of an attribute asked to extract,
return null for the attribute's value.";

const EXTRACTION_WITH_EXAMPLES_SYSTEM_PROMPT: &str = "You are an expert extraction algorithm. I will provide you with reference examples to guide your extraction.
Learn from these examples to understand the expected extraction patterns and quality.
Only extract relevant information from the text.
If you do not know the value of an attribute asked to extract, return null for the attribute's value.
Follow the patterns demonstrated in the examples below.";

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").expect("valid fence regex")
});

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
}

impl OpenAiClient {
    /// Creates a client for `api_base` authenticated with `api_key`.
    pub fn new(api_base: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);
        debug!("Client created for {}", api_base);
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            &config.api_base,
            &config.api_key,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn chat_request(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        config: &ModelConfig,
        response_format: Option<ResponseFormat>,
    ) -> Result<CreateChatCompletionRequest> {
        let config = config.clone();

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(config.model_name.unwrap_or_else(|| GPT_4O.to_string()))
            .messages(messages)
            .temperature(config.temperature.unwrap_or(0.0));

        if let Some(top_p) = config.top_p {
            args.top_p(top_p);
        }
        if let Some(max_tokens) = config.max_tokens {
            args.max_completion_tokens(max_tokens);
        }
        if let Some(penalty) = config.frequency_penalty {
            args.frequency_penalty(penalty);
        }
        if let Some(penalty) = config.presence_penalty {
            args.presence_penalty(penalty);
        }
        if let Some(stop) = config.stop_sequences.filter(|s| !s.is_empty()) {
            args.stop(stop);
        }
        if let Some(format) = response_format {
            args.response_format(format);
        }

        Ok(args.build()?)
    }

    async fn complete(&self, request: CreateChatCompletionRequest) -> Result<String> {
        debug!("Sending request: {:?}", request);
        let response = self.client.chat().create(request).await?;

        let mut response_string = String::new();
        for choice in response.choices {
            if let Some(content) = choice.message.content {
                response_string.push_str(&content);
            }
        }
        Ok(response_string)
    }
}

fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
    let content = message.content.clone();
    let msg: ChatCompletionRequestMessage = match message.role {
        ChatMessageRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        ChatMessageRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        ChatMessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        ChatMessageRole::Tool | ChatMessageRole::Function => {
            let call_id = message
                .tool_call_id
                .clone()
                .or_else(|| message.name.clone())
                .unwrap_or_default();
            ChatCompletionRequestToolMessageArgs::default()
                .content(content)
                .tool_call_id(call_id)
                .build()?
                .into()
        }
    };
    Ok(msg)
}

/// Parse a model answer as JSON, tolerating a surrounding markdown fence.
fn parse_json_answer(answer: &str) -> Result<Value> {
    let trimmed = answer.trim();
    let body = CODE_FENCE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);
    serde_json::from_str(body).map_err(|e| Error::MalformedOutput(format!("{e}: {body}")))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn provider(&self) -> LlmProvider {
        LlmProvider::OpenAi
    }

    async fn generate_text(&self, req: &TextRequest, config: &ModelConfig) -> Result<String> {
        let messages = if req.messages.is_empty() {
            vec![
                ChatCompletionRequestUserMessageArgs::default()
                    .content(req.prompt.clone())
                    .build()?
                    .into(),
            ]
        } else {
            req.messages
                .iter()
                .map(to_request_message)
                .collect::<Result<Vec<_>>>()?
        };

        let request = self.chat_request(messages, config, None)?;
        self.complete(request).await
    }

    async fn generate_structured_output(
        &self,
        req: &StructuredOutputRequest,
        config: &ModelConfig,
    ) -> Result<Value> {
        let system_prompt = if req.examples.is_empty() {
            EXTRACTION_SYSTEM_PROMPT
        } else {
            EXTRACTION_WITH_EXAMPLES_SYSTEM_PROMPT
        };

        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()?
                .into(),
        ];
        for example in &req.examples {
            messages.push(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(example.input.clone())
                    .build()?
                    .into(),
            );
            messages.push(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(convert_to_plain_text(&example.output))
                    .build()?
                    .into(),
            );
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(req.prompt.clone())
                .build()?
                .into(),
        );

        let name = if req.schema_name.is_empty() {
            "extraction".to_string()
        } else {
            req.schema_name.clone()
        };
        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: None,
                name,
                schema: Some(req.schema.clone()),
                strict: Some(false),
            },
        };

        let request = self.chat_request(messages, config, Some(response_format))?;
        let answer = self.complete(request).await?;
        parse_json_answer(&answer)
    }

    async fn embed(&self, input: &[String], config: &ModelConfig) -> Result<Vec<Vec<f32>>> {
        let config = config.clone();
        let request = CreateEmbeddingRequestArgs::default()
            .model(
                config
                    .model_name
                    .unwrap_or_else(|| TEXT_EMBEDDING_3_SMALL.to_string()),
            )
            .input(input.to_vec())
            .build()?;

        let mut response = self.client.embeddings().create(request).await?;
        response.data.sort_by_key(|e| e.index);
        Ok(response.data.into_iter().map(|e| e.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ExtractionExample;
    use httpmock::prelude::*;
    use serde_json::json;

    fn chat_body(content: &str) -> Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop",
                "logprobs": null
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
    }

    fn client(server: &MockServer) -> OpenAiClient {
        OpenAiClient::new(&server.base_url(), "test-key", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn generates_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(chat_body("Ada is a match."));
            })
            .await;

        let req = TextRequest {
            prompt: "who matches?".into(),
            ..Default::default()
        };
        let out = client(&server)
            .generate_text(&req, &ModelConfig::default())
            .await
            .unwrap();

        assert_eq!(out, "Ada is a match.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn parses_structured_output() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(chat_body(
                        "```json\n{\"name\": \"Ada\", \"skills\": [\"Rust\"]}\n```",
                    ));
            })
            .await;

        let req = StructuredOutputRequest {
            prompt: "Ada writes Rust".into(),
            schema_name: "user".into(),
            schema: json!({"type": "object"}),
            examples: vec![ExtractionExample {
                input: "Bob, designer".into(),
                output: json!({"name": "Bob", "role": "designer"}),
            }],
            ..Default::default()
        };
        let out = client(&server)
            .generate_structured_output(&req, &ModelConfig::default())
            .await
            .unwrap();

        assert_eq!(out["name"], "Ada");
        assert_eq!(out["skills"][0], "Rust");
    }

    #[tokio::test]
    async fn rejects_non_json_structured_output() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(chat_body("I could not find anything."));
            })
            .await;

        let req = StructuredOutputRequest {
            prompt: "nothing".into(),
            schema: json!({"type": "object"}),
            ..Default::default()
        };
        let err = client(&server)
            .generate_structured_output(&req, &ModelConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn embeddings_come_back_in_input_order() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({
                        "object": "list",
                        "data": [
                            {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
                            {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
                        ],
                        "model": "text-embedding-3-small",
                        "usage": {"prompt_tokens": 4, "total_tokens": 4}
                    }));
            })
            .await;

        let out = client(&server)
            .embed(&["first".into(), "second".into()], &ModelConfig::default())
            .await
            .unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn api_errors_propagate() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(400)
                    .header("content-type", "application/json")
                    .json_body(json!({
                        "error": {
                            "message": "model not found",
                            "type": "invalid_request_error",
                            "param": null,
                            "code": null
                        }
                    }));
            })
            .await;

        let req = TextRequest {
            prompt: "hi".into(),
            ..Default::default()
        };
        let err = client(&server)
            .generate_text(&req, &ModelConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OpenAi(_)));
    }

    #[test]
    fn fenced_and_bare_json_both_parse() {
        assert_eq!(parse_json_answer("{\"a\":1}").unwrap()["a"], 1);
        assert_eq!(parse_json_answer("```\n{\"a\":2}\n```").unwrap()["a"], 2);
    }
}
