use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use casegraph_core::config::ModelConfig;
use casegraph_core::error::{CaseGraphError, Result};
use casegraph_core::traits::InferenceBackend;
use casegraph_core::types::ResponseShape;

use super::presets::{resolve_endpoint, Endpoint};
use super::{http_client, request_error, status_error};
use crate::json::extract_json_object;

const SYSTEM_PROMPT: &str = "You are a careful legal analysis assistant. Answer only from the material provided.";

/// OpenAI-compatible client. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter, etc.
///
/// Structured calls send a `json_schema` response format; providers that
/// ignore it still get their reply parsed leniently.
pub struct OpenAiClient {
    http: Client,
    config: ModelConfig,
    endpoint: Endpoint,
}

impl OpenAiClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let endpoint = resolve_endpoint(&config)?;
        Ok(Self {
            http: http_client(config.timeout_secs)?,
            config,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint.url
    }

    async fn send(&self, body: &ChatRequest) -> Result<String> {
        let service = self.config.provider.as_str();
        let mut req = self.http.post(&self.endpoint.url).json(body);
        if let Some(api_key) = &self.endpoint.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req.send().await.map_err(|e| request_error(service, e))?;
        if !response.status().is_success() {
            return Err(status_error(service, response).await);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CaseGraphError::invalid_response(service, e.to_string()))?;
        message_content(service, parsed)
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    r#type: &'static str,
    json_schema: JsonSchemaSpec,
}

#[derive(Serialize)]
struct JsonSchemaSpec {
    name: String,
    schema: serde_json::Value,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

fn build_request(config: &ModelConfig, prompt: String, shape: Option<ResponseShape>) -> ChatRequest {
    ChatRequest {
        model: config.model_id.clone(),
        messages: vec![
            OaiMessage {
                role: "system",
                content: SYSTEM_PROMPT.to_string(),
            },
            OaiMessage {
                role: "user",
                content: prompt,
            },
        ],
        max_tokens: config.max_tokens,
        temperature: Some(config.temperature),
        response_format: shape.map(|s| ResponseFormat {
            r#type: "json_schema",
            json_schema: JsonSchemaSpec {
                name: s.name,
                schema: s.schema,
            },
        }),
    }
}

fn message_content(service: &str, response: ChatResponse) -> Result<String> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CaseGraphError::invalid_response(service, "response has no choices"))?;

    if let Some(refusal) = choice.message.refusal {
        return Err(CaseGraphError::invalid_response(
            service,
            format!("model refused: {}", refusal),
        ));
    }
    if choice.finish_reason.as_deref() == Some("length") {
        return Err(CaseGraphError::invalid_response(
            service,
            "response truncated at max_tokens",
        ));
    }
    choice
        .message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| CaseGraphError::invalid_response(service, "empty message content"))
}

impl InferenceBackend for OpenAiClient {
    fn name(&self) -> &str {
        &self.config.provider
    }

    fn infer(
        &self,
        prompt: String,
        shape: ResponseShape,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            debug!(shape = %shape.name, model = %self.config.model_id, "Structured inference");
            let body = build_request(&self.config, prompt, Some(shape));
            let content = self.send(&body).await?;
            extract_json_object(self.name(), &content)
        })
    }

    fn complete(&self, prompt: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let body = build_request(&self.config, prompt, None);
            self.send(&body).await.map(|c| c.trim().to_string())
        })
    }
}
