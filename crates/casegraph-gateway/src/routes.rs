use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use casegraph_core::types::{RunId, StoredResult};
use casegraph_services::is_accepted;
use casegraph_stages::initial_state;
use casegraph_stages::keys::{DOCUMENT_BYTES, DOCUMENT_FILENAME};

use crate::display::{format_for_display, WORKFLOW_ID};
use crate::pages;
use crate::state::AppState;

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(json!({ "success": false, "detail": detail.into() })))
}

fn html(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "text/html; charset=utf-8")], body).into_response()
}

// GET /api/health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// GET /
pub async fn index() -> Response {
    html(StatusCode::OK, pages::UPLOAD_FORM.to_string())
}

/// The `file` part of an upload form.
async fn read_upload(multipart: &mut Multipart) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Malformed upload: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Could not read upload: {e}")))?;
        return Ok((filename, bytes.to_vec()));
    }
    Err(api_error(StatusCode::BAD_REQUEST, "No file uploaded"))
}

// POST /upload
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let (filename, bytes) = read_upload(&mut multipart).await?;
    if !is_accepted(&filename) {
        warn!(filename = %filename, "Rejected upload");
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Only PDF and TXT files are supported",
        ));
    }

    let run_id = RunId::new();
    info!(run_id = %run_id, filename = %filename, bytes = bytes.len(), "Processing upload");

    let mut result = match state.workflow.invoke(initial_state(&filename, &bytes)).await {
        Ok(result) => result,
        Err(e) => {
            error!(run_id = %run_id, error = %e, "Workflow failed");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": format!("Error processing document: {e}"),
                })),
            ));
        }
    };

    result.remove(DOCUMENT_BYTES);
    result.set(WORKFLOW_ID, json!(run_id.as_str()));
    result.set(DOCUMENT_FILENAME, json!(filename));

    let stored = StoredResult {
        run_id: run_id.clone(),
        stored_at: chrono::Utc::now(),
        state: serde_json::to_value(result.data()).map_err(|e| {
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?,
    };
    state.store.put(stored).await.map_err(|e| {
        error!(run_id = %run_id, error = %e, "Could not store result");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(json!({
        "success": true,
        "workflow_id": run_id.as_str(),
        "redirect_url": format!("/results/{}", run_id),
    })))
}

async fn load(state: &AppState, id: &str) -> Result<StoredResult, ApiError> {
    match state.store.get(&RunId::from_string(id)).await {
        Ok(Some(result)) => Ok(result),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, "Workflow result not found")),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

// GET /api/results/{id}
pub async fn result_json(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(load(&state, &id).await?.state))
}

// GET /results/{id}
pub async fn result_page(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match load(&state, &id).await {
        Ok(result) => html(
            StatusCode::OK,
            pages::render_results(&format_for_display(&result.state)),
        ),
        Err((status, _)) => html(
            status,
            format!("<h1>{}</h1><p>Workflow result not found.</p>", status.as_u16()),
        ),
    }
}
