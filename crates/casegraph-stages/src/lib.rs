//! Stages of the case-analysis workflow.
//!
//! Every stage is a [`casegraph_engine::Node`] whose collaborator calls go
//! through the shared retry policy in [`Services`].

pub mod facts;
pub mod guidance;
pub mod ingest;
pub mod investigation;
pub mod keys;
pub mod mapping;
pub mod pipeline;
pub mod precedents;
pub mod prompt;
pub mod records;
pub mod services;

pub use facts::CaseFacts;
pub use ingest::initial_state;
pub use pipeline::{build_case_graph, case_workflow};
pub use precedents::PrecedentCase;
pub use records::{ForensicGuideline, LegalSection};
pub use services::Services;
