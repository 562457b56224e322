use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use casegraph_core::config::ModelConfig;
use casegraph_core::error::{CaseGraphError, Result};
use casegraph_core::traits::InferenceBackend;
use casegraph_core::types::ResponseShape;

use super::{http_client, request_error, status_error};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client.
///
/// Structured output is obtained by forcing a single tool call whose input
/// schema is the requested shape.
pub struct AnthropicClient {
    http: Client,
    config: ModelConfig,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CaseGraphError::Config("provider 'anthropic' requires model.api_key".into()))?;
        Ok(Self {
            http: http_client(config.timeout_secs)?,
            config,
            api_key,
        })
    }

    async fn send(&self, body: &MessagesRequest) -> Result<MessagesResponse> {
        let url = self.config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL);
        let response = self
            .http
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error("anthropic", e))?;

        if !response.status().is_success() {
            return Err(status_error("anthropic", response).await);
        }
        response
            .json()
            .await
            .map_err(|e| CaseGraphError::invalid_response("anthropic", e.to_string()))
    }
}

// Anthropic API request types
#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Serialize)]
struct ToolChoice {
    r#type: &'static str,
    name: String,
}

// Anthropic API response types
#[derive(Deserialize, Debug)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

fn build_request(config: &ModelConfig, prompt: String, shape: Option<ResponseShape>) -> MessagesRequest {
    let (tools, tool_choice) = match shape {
        Some(shape) => (
            vec![ApiTool {
                name: shape.name.clone(),
                description: format!("Record the answer as a '{}' object.", shape.name),
                input_schema: shape.schema,
            }],
            Some(ToolChoice {
                r#type: "tool",
                name: shape.name,
            }),
        ),
        None => (vec![], None),
    };

    MessagesRequest {
        model: config.model_id.clone(),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        messages: vec![ApiMessage {
            role: "user",
            content: prompt,
        }],
        tools,
        tool_choice,
    }
}

fn tool_input(response: MessagesResponse, shape_name: &str) -> Result<serde_json::Value> {
    if response.stop_reason.as_deref() == Some("max_tokens") {
        return Err(CaseGraphError::invalid_response(
            "anthropic",
            "response truncated at max_tokens",
        ));
    }
    response
        .content
        .into_iter()
        .find_map(|block| match block {
            ContentBlock::ToolUse { name, input } if name == shape_name => Some(input),
            _ => None,
        })
        .filter(|v| v.is_object())
        .ok_or_else(|| {
            CaseGraphError::invalid_response(
                "anthropic",
                format!("no '{}' tool call in response", shape_name),
            )
        })
}

fn text_of(response: MessagesResponse) -> Result<String> {
    let text: String = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(CaseGraphError::invalid_response("anthropic", "empty text response"));
    }
    Ok(text)
}

impl InferenceBackend for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn infer(
        &self,
        prompt: String,
        shape: ResponseShape,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            debug!(shape = %shape.name, model = %self.config.model_id, "Structured inference");
            let shape_name = shape.name.clone();
            let body = build_request(&self.config, prompt, Some(shape));
            let response = self.send(&body).await?;
            tool_input(response, &shape_name)
        })
    }

    fn complete(&self, prompt: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let body = build_request(&self.config, prompt, None);
            text_of(self.send(&body).await?)
        })
    }
}
