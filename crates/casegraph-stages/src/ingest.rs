//! Document intake: the workflow's source stage and its translation step.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use tracing::info;

use casegraph_core::error::{CaseGraphError, Result};
use casegraph_core::state::{PartialUpdate, WorkflowState};
use casegraph_engine::{node_fn, retry, Node};

use crate::keys::{DOCUMENT_BYTES, DOCUMENT_FILENAME, DOCUMENT_TEXT, DOCUMENT_TEXT_EN};
use crate::services::Services;

pub const READ_DOCUMENT: &str = "read_document";
pub const TRANSLATE: &str = "translate_to_english";

/// Seed state for one run from an uploaded file.
pub fn initial_state(filename: &str, bytes: &[u8]) -> WorkflowState {
    let mut state = WorkflowState::new();
    state.set(DOCUMENT_FILENAME, json!(filename));
    state.set(DOCUMENT_BYTES, json!(STANDARD.encode(bytes)));
    state
}

pub fn read_document_node(services: Arc<Services>) -> Node {
    Node::new(
        READ_DOCUMENT,
        node_fn(move |input| {
            let services = services.clone();
            async move { read_document(&services, input).await }
        }),
    )
    .with_name("Read document")
    .with_inputs([DOCUMENT_BYTES, DOCUMENT_FILENAME])
    .with_outputs([DOCUMENT_TEXT])
}

async fn read_document(services: &Services, input: WorkflowState) -> Result<PartialUpdate> {
    let filename = input.require_str(READ_DOCUMENT, DOCUMENT_FILENAME)?.to_string();
    let bytes = STANDARD
        .decode(input.require_str(READ_DOCUMENT, DOCUMENT_BYTES)?)
        .map_err(|e| CaseGraphError::Fatal(format!("document bytes are not valid base64: {}", e)))?;

    let text = retry(&services.retry, READ_DOCUMENT, || {
        services.reader.read(filename.clone(), bytes.clone())
    })
    .await?;

    info!(filename = %filename, bytes = bytes.len(), chars = text.chars().count(), "Read document");
    PartialUpdate::new().with(DOCUMENT_TEXT, &text)
}

pub fn translate_node(services: Arc<Services>) -> Node {
    Node::new(
        TRANSLATE,
        node_fn(move |input| {
            let services = services.clone();
            async move { translate(&services, input).await }
        }),
    )
    .with_name("Translate to English")
    .with_inputs([DOCUMENT_TEXT])
    .with_outputs([DOCUMENT_TEXT_EN])
}

async fn translate(services: &Services, input: WorkflowState) -> Result<PartialUpdate> {
    let text = input.require_str(TRANSLATE, DOCUMENT_TEXT)?;

    let translated = retry(&services.retry, TRANSLATE, || async move {
        let out = services.translation.translate(text.to_string()).await?;
        if out.trim().is_empty() {
            return Err(CaseGraphError::invalid_response(
                "translation",
                "empty translation",
            ));
        }
        Ok(out)
    })
    .await?;

    info!(chars = translated.chars().count(), "Translated document");
    PartialUpdate::new().with(DOCUMENT_TEXT_EN, &translated)
}
