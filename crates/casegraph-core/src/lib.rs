pub mod config;
pub mod error;
pub mod event;
pub mod state;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{CaseGraphError, GraphError, Result};
pub use event::EventBus;
pub use state::{PartialUpdate, WorkflowState};
pub use types::*;
