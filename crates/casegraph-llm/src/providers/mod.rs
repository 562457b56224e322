pub mod anthropic;
pub mod openai;
pub mod presets;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;

use std::time::Duration;

use casegraph_core::error::{CaseGraphError, Result};

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| CaseGraphError::Config(format!("failed to build HTTP client: {}", e)))
}

/// Connection resets, timeouts and body read failures are all worth another try.
pub(crate) fn request_error(service: &str, e: reqwest::Error) -> CaseGraphError {
    CaseGraphError::transient(service, e.to_string())
}

/// Read a failed response into a classified error.
pub(crate) async fn status_error(service: &str, response: reqwest::Response) -> CaseGraphError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown".to_string());
    CaseGraphError::from_status(service, status, &body)
}
