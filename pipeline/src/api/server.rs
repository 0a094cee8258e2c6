//! HTTP server for the playlog API.
//!
//! Lets a client upload an extracted event file and get the star schema
//! back, while following the pipeline log live.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | POST   | `/api/transform`  | Upload raw events, get five tables   |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |

use axum::{
    extract::{DefaultBodyLimit, Multipart},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::path::Path;
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, TransformResponse};
use crate::config::{InputFormat, MAX_UPLOAD_SIZE};
use crate::error::{ServerError, ServerResult};
use crate::transform::pipeline::transform_bytes;

/// Build the router (separate from `start_server` for tests)
pub fn router() -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/transform", post(upload_events))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(cors)
}

/// Start the HTTP server
pub async fn start_server(port: u16) -> ServerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    log_info(format!("🚀 playlog server running on http://localhost:{}", port));
    log_info("   POST /api/transform - Upload raw events");
    log_info("   GET  /api/logs      - SSE log stream");
    log_info("   GET  /health        - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router()).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "playlog",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "transform": "POST /api/transform",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Upload endpoint: multipart `file`, optional `format` field
async fn upload_events(
    mut multipart: Multipart,
) -> Result<Json<TransformResponse>, (StatusCode, Json<Value>)> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut format_field: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(&format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                file_data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| bad_request(&format!("Read error: {}", e)))?
                        .to_vec(),
                );
            }
            "format" => {
                format_field = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(&format!("Read error: {}", e)))?,
                );
            }
            _ => {}
        }
    }

    let bytes = file_data.ok_or_else(|| bad_request("No file provided"))?;
    let format = resolve_format(format_field.as_deref(), file_name.as_deref())
        .map_err(|e| bad_request(&e.to_string()))?;

    log_info(format!(
        "📄 New upload: {} ({} bytes)",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let (input, output) = tokio::task::spawn_blocking(move || transform_bytes(&bytes, format))
        .await
        .map_err(|e| internal_error(&e.to_string()))?
        .map_err(|e| {
            log_error(format!("Transform error: {}", e));
            (StatusCode::UNPROCESSABLE_ENTITY, Json(error_response(&e.to_string())))
        })?;

    Ok(Json(TransformResponse::new(input, output)))
}

/// Explicit `format` field first, then the file extension, then CSV.
fn resolve_format(explicit: Option<&str>, file_name: Option<&str>) -> ServerResult<InputFormat> {
    match explicit {
        Some(raw) => InputFormat::parse(raw)
            .ok_or_else(|| ServerError::BadRequest(format!("unknown format '{}'", raw))),
        None => Ok(file_name
            .map(|name| InputFormat::from_path(Path::new(name)))
            .unwrap_or(InputFormat::Csv)),
    }
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(error_response(message)))
}

fn internal_error(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(error_response(message)))
}
