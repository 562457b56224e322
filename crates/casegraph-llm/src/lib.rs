pub mod json;
pub mod providers;

use std::sync::Arc;

use casegraph_core::config::ModelConfig;
use casegraph_core::error::Result;
use casegraph_core::traits::InferenceBackend;

pub use providers::anthropic::AnthropicClient;
pub use providers::openai::OpenAiClient;

/// Create an inference backend based on the provider name.
pub fn create_client(config: &ModelConfig) -> Result<Arc<dyn InferenceBackend>> {
    match config.provider.as_str() {
        "anthropic" | "claude" => Ok(Arc::new(AnthropicClient::new(config.clone())?)),
        // Everything else uses the OpenAI-compatible client
        _ => Ok(Arc::new(OpenAiClient::new(config.clone())?)),
    }
}
