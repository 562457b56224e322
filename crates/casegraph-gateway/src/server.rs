use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use casegraph_core::config::GatewayConfig;
use casegraph_core::traits::ResultStore;
use casegraph_engine::Workflow;

use crate::routes;
use crate::state::AppState;

/// Every route, with the upload size limit from config.
pub fn router(state: Arc<AppState>) -> Router {
    let limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(routes::index))
        .route("/upload", post(routes::upload))
        .route("/results/{id}", get(routes::result_page))
        .route("/api/results/{id}", get(routes::result_json))
        .route("/api/health", get(routes::health))
        .layer(DefaultBodyLimit::max(limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP gateway built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    workflow: Workflow,
    store: Arc<dyn ResultStore>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, workflow: Workflow, store: Arc<dyn ResultStore>) -> Self {
        Self {
            config,
            workflow,
            store,
        }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let state = Arc::new(AppState {
            config: self.config.clone(),
            workflow: self.workflow.clone(),
            store: self.store.clone(),
        });
        let app = router(state);

        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(bind = %self.config.bind, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use casegraph_core::error::CaseGraphError;
    use casegraph_core::state::PartialUpdate;
    use casegraph_engine::{node_fn, GraphBuilder, Node};
    use casegraph_stages::keys::{DOCUMENT_BYTES, DOCUMENT_FILENAME, DOCUMENT_TEXT};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::store::InMemoryResultStore;

    const BOUNDARY: &str = "casegraph-boundary";

    /// A one-node workflow that echoes the file name, or fails on demand.
    fn workflow(fail: bool) -> Workflow {
        let node = Node::new(
            "read_document",
            node_fn(move |input| async move {
                if fail {
                    return Err(CaseGraphError::Fatal("reader offline".into()));
                }
                let name = input.require_str("read_document", DOCUMENT_FILENAME)?;
                Ok(PartialUpdate::new().set(DOCUMENT_TEXT, json!(format!("text of {}", name))))
            }),
        )
        .with_inputs([DOCUMENT_FILENAME, DOCUMENT_BYTES])
        .with_outputs([DOCUMENT_TEXT]);
        Workflow::new(GraphBuilder::new().node(node).build().unwrap())
    }

    fn app(fail: bool) -> (Router, Arc<InMemoryResultStore>) {
        let store = Arc::new(InMemoryResultStore::new());
        let state = Arc::new(AppState {
            config: GatewayConfig::default(),
            workflow: workflow(fail),
            store: store.clone(),
        });
        (router(state), store)
    }

    fn upload_request(filename: &str, contents: &str) -> Request<Body> {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: text/plain\r\n\r\n{c}\r\n--{b}--\r\n",
            b = BOUNDARY,
            f = filename,
            c = contents
        );
        Request::post("/upload")
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(false);
        let resp = app
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_upload_stores_result() {
        let (app, store) = app(false);
        let resp = app
            .clone()
            .oneshot(upload_request("fir.txt", "Ganja seized"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["success"], true);
        let id = body["workflow_id"].as_str().unwrap().to_string();
        assert_eq!(body["redirect_url"], format!("/results/{}", id));
        assert_eq!(store.len().await, 1);

        let resp = app
            .clone()
            .oneshot(Request::get(format!("/api/results/{}", id)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let stored = json_body(resp).await;
        assert_eq!(stored["workflow_id"], id.as_str());
        assert_eq!(stored["document_filename"], "fir.txt");
        assert_eq!(stored["document_text"], "text of fir.txt");
        assert!(stored.get("document_bytes").is_none());

        let resp = app
            .oneshot(Request::get(format!("/results/{}", id)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let page = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&page).contains("Results for fir.txt"));
    }

    #[tokio::test]
    async fn test_upload_rejects_other_types() {
        let (app, store) = app(false);
        let resp = app.oneshot(upload_request("fir.docx", "x")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_workflow_failure_is_reported() {
        let (app, store) = app(true);
        let resp = app.oneshot(upload_request("fir.pdf", "x")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Error processing document:"));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_result_is_404() {
        let (app, _) = app(false);
        let resp = app
            .clone()
            .oneshot(Request::get("/api/results/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(resp).await["detail"], "Workflow result not found");

        let resp = app
            .oneshot(Request::get("/results/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
