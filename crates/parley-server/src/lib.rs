//! HTTP surface for the Parley agent
//!
//! Exposes the chat invocation boundary and document ingestion over JSON and
//! multipart endpoints. Handlers are thin: they translate HTTP input into
//! calls on the core services and map errors to status codes.

pub mod error;
pub mod state;

pub use error::{Result, ServerError};
pub use state::{AppState, Services};

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::{middleware, Router};
use parley_core::rag::{IngestionMetadata, IngestionRequest};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_input: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub response: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: String,
    pub message: String,
    pub data: IngestionMetadata,
}

/// Run one chat turn. The loop runs on its own task so that a client
/// disconnect cancels it between phases instead of mid-write.
pub async fn invoke_handler(
    State(state): State<AppState>,
    Json(request): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>> {
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let chat = state.chat.clone();
    let task = tokio::spawn(async move {
        chat.invoke_with_cancel(&request.session_id, &request.user_input, &cancel)
            .await
    });

    let reply = task
        .await
        .map_err(|e| ServerError::Internal(format!("chat task failed: {}", e)))??;

    Ok(Json(InvokeResponse {
        response: reply.response,
        warnings: reply.warnings,
    }))
}

pub async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut chunking_strategy = None;
    let mut embedding_model = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::invalid_request(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ServerError::invalid_request("file field has no file name"))?;
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::invalid_request(format!("failed to read file: {}", e)))?;
                file = Some((file_name, content_type, bytes.to_vec()));
            }
            "chunking_strategy" | "embedding_model" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ServerError::invalid_request(format!("failed to read {}: {}", name, e)))?;
                if name == "chunking_strategy" {
                    chunking_strategy = Some(value);
                } else {
                    embedding_model = Some(value);
                }
            }
            other => log::debug!("Ignoring unexpected multipart field '{}'", other),
        }
    }

    let (file_name, content_type, bytes) = file.ok_or_else(|| ServerError::missing_field("file"))?;
    let request = IngestionRequest {
        file_name,
        bytes,
        content_type,
        chunking_strategy: chunking_strategy.ok_or_else(|| ServerError::missing_field("chunking_strategy"))?,
        embedding_model: embedding_model.ok_or_else(|| ServerError::missing_field("embedding_model"))?,
    };

    let metadata = state.ingestion.ingest(request).await?;
    Ok(Json(UploadResponse {
        status: "success".to_string(),
        message: format!(
            "Ingested '{}' into {} chunks",
            metadata.file_name, metadata.chunk_count
        ),
        data: metadata,
    }))
}

pub async fn tools_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "tools": state.tools.as_slice() }))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/tools", get(tools_handler))
        .route("/api/v1/chat/invoke", post(invoke_handler))
        .route(
            "/api/v1/documents/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .fallback(|| async {
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({
                    "error": "not_found",
                    "timestamp": chrono::Utc::now()
                })),
            )
        })
        .with_state(state)
        .layer(middleware::from_fn(
            |request: axum::http::Request<axum::body::Body>, next: axum::middleware::Next| async move {
                let request_id = uuid::Uuid::new_v4().to_string();
                let method = request.method().clone();
                let uri = request.uri().clone();

                if uri.path() == "/health" {
                    log::debug!("Request {} {} {}", request_id, method, uri);
                } else {
                    log::info!("Request {} {} {}", request_id, method, uri);
                }

                let start = std::time::Instant::now();
                let response = next.run(request).await;
                log::info!(
                    "Response {} {} in {:?}",
                    request_id,
                    response.status(),
                    start.elapsed()
                );
                response
            },
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
