use std::sync::Arc;

use casegraph_core::config::GatewayConfig;
use casegraph_core::traits::ResultStore;
use casegraph_engine::Workflow;

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub workflow: Workflow,
    pub store: Arc<dyn ResultStore>,
}
