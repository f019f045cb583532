//! HTTP server exposing the annotation and history APIs.
//!
//! `POST /api/furigana` returns the raw model output. The history
//! endpoints pass submitted HTML through the sanitizer before storage.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::annotate::{AnnotateError, Annotator};
use crate::history::{HistoryEntry, HistoryStore};
use crate::sanitize::sanitize;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub annotator: Arc<Annotator>,
    pub history: Arc<dyn HistoryStore>,
}

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/furigana", post(annotate_text))
        .route("/api/history", get(list_history).post(append_history))
        .route(
            "/api/history/{id}",
            delete(remove_history).patch(rename_history),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the web server.
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Uniform `{"error": ...}` responses for everything a handler can fail with.
enum ApiError {
    Annotate(AnnotateError),
    Internal(anyhow::Error),
}

impl From<AnnotateError> for ApiError {
    fn from(err: AnnotateError) -> Self {
        ApiError::Annotate(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Annotate(err) => {
                let status = if err.is_client_error() {
                    StatusCode::BAD_REQUEST
                } else {
                    tracing::error!(error = %err, "annotation request failed");
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (status, err.to_string())
            }
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "history operation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Serialize)]
struct AnnotateResponse {
    html: String,
}

async fn annotate_text(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<AnnotateResponse>, ApiError> {
    // A missing or non-string `text` field is treated as empty input, not
    // as a deserialization failure.
    let text = body.get("text").and_then(|v| v.as_str()).unwrap_or("");

    let html = state.annotator.annotate(text).await?;
    Ok(Json(AnnotateResponse {
        html: html.into_string(),
    }))
}

async fn list_history(
    State(state): State<AppState>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    Ok(Json(state.history.list()?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendHistoryBody {
    #[serde(default)]
    id: Option<String>,
    original_text: String,
    html: String,
    #[serde(default)]
    name: Option<String>,
}

async fn append_history(
    State(state): State<AppState>,
    Json(body): Json<AppendHistoryBody>,
) -> Result<(StatusCode, Json<HistoryEntry>), ApiError> {
    let mut entry = HistoryEntry::new(body.original_text, sanitize(&body.html));
    if let Some(id) = body.id {
        entry.id = id;
    }
    entry.name = normalize_name(body.name);

    state.history.append(entry.clone())?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn remove_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.history.remove(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct RenameHistoryBody {
    #[serde(default)]
    name: Option<String>,
}

async fn rename_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RenameHistoryBody>,
) -> Result<StatusCode, ApiError> {
    state.history.rename(&id, normalize_name(body.name))?;
    Ok(StatusCode::NO_CONTENT)
}

/// An absent or blank name clears the custom name.
fn normalize_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::history::MemoryHistoryStore;

    fn test_app() -> Router {
        let state = AppState {
            annotator: Arc::new(Annotator::new(Config::default())),
            history: Arc::new(MemoryHistoryStore::new()),
        };
        create_router(state)
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_annotate_missing_text_is_bad_request() {
        let response = test_app()
            .oneshot(json_request("POST", "/api/furigana", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, json!({ "error": "Missing or empty text" }));
    }

    #[tokio::test]
    async fn test_annotate_non_string_text_is_bad_request() {
        let response = test_app()
            .oneshot(json_request("POST", "/api/furigana", r#"{"text": 42}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_annotate_whitespace_text_is_bad_request() {
        let response = test_app()
            .oneshot(json_request("POST", "/api/furigana", r#"{"text": "   "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, json!({ "error": "Missing or empty text" }));
    }

    #[tokio::test]
    async fn test_annotate_over_limit_names_the_cap() {
        let body = serde_json::to_string(&json!({ "text": "あ".repeat(10_001) })).unwrap();
        let response = test_app()
            .oneshot(json_request("POST", "/api/furigana", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error = body_json(response).await["error"].as_str().unwrap().to_string();
        assert!(error.contains("10000"), "{error}");
    }

    #[tokio::test]
    async fn test_annotate_without_provider_is_server_error() {
        let response = test_app()
            .oneshot(json_request("POST", "/api/furigana", r#"{"text": "日本語"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "LLM service not configured" })
        );
    }

    #[tokio::test]
    async fn test_history_append_sanitizes_html() {
        let app = test_app();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/history",
                r#"{"originalText": "攻撃", "html": "<script>alert(1)</script>"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let stored = body_json(response).await;
        assert_eq!(stored["html"], "&lt;script&gt;alert(1)&lt;/script&gt;");
        assert!(stored["id"].as_str().is_some_and(|id| !id.is_empty()));

        let response = app
            .oneshot(Request::builder().uri("/api/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let listed = body_json(response).await;
        assert_eq!(listed[0]["html"], "&lt;script&gt;alert(1)&lt;/script&gt;");
    }

    #[tokio::test]
    async fn test_history_append_keeps_caller_id_and_valid_ruby() {
        let response = test_app()
            .oneshot(json_request(
                "POST",
                "/api/history",
                r#"{"id": "fixed-id", "originalText": "本", "html": "<ruby>本<rt>ほん</rt></ruby>"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let stored = body_json(response).await;
        assert_eq!(stored["id"], "fixed-id");
        assert_eq!(stored["html"], "<ruby>本<rt>ほん</rt></ruby>");
    }

    #[tokio::test]
    async fn test_history_list_is_newest_first() {
        let app = test_app();
        for text in ["one", "two"] {
            let body = format!(r#"{{"originalText": "{text}", "html": "x"}}"#);
            app.clone()
                .oneshot(json_request("POST", "/api/history", &body))
                .await
                .unwrap();
        }

        let response = app
            .oneshot(Request::builder().uri("/api/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let listed = body_json(response).await;
        assert_eq!(listed[0]["originalText"], "two");
        assert_eq!(listed[1]["originalText"], "one");
    }

    #[tokio::test]
    async fn test_history_remove_and_rename() {
        let app = test_app();
        app.clone()
            .oneshot(json_request(
                "POST",
                "/api/history",
                r#"{"id": "entry-1", "originalText": "本", "html": "x"}"#,
            ))
            .await
            .unwrap();

        // Rename, then verify.
        let response = app
            .clone()
            .oneshot(json_request("PATCH", "/api/history/entry-1", r#"{"name": "My text"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await[0]["name"], "My text");

        // An empty name clears the custom name.
        app.clone()
            .oneshot(json_request("PATCH", "/api/history/entry-1", r#"{"name": ""}"#))
            .await
            .unwrap();
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await[0].get("name"), None);

        // Delete is idempotent.
        let response = app
            .clone()
            .oneshot(json_request("DELETE", "/api/history/entry-1", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = app
            .clone()
            .oneshot(json_request("DELETE", "/api/history/no-such-id", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(Request::builder().uri("/api/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await, json!([]));
    }
}
