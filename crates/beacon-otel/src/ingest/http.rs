//! axum OTLP/HTTP receivers.
//!
//! `POST /v1/traces` and `POST /v1/logs` accept gzip-compressed export
//! requests, protobuf (`application/x-protobuf`, the default) or JSON
//! (`application/json`). Each request is decoded, classified and routed to
//! the queues before the response is sent, so a 200 means every resulting
//! message was accepted downstream.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use super::decode::{decode_batch, BatchKind, ContentType, ExportBatch};
use crate::classify::{classify_logs, classify_traces, Buckets};
use crate::config::ServerConfig;
use crate::error::DecodeError;
use crate::project_id::VerboseIdCodec;
use crate::router::{submit_buckets, Sinks};
use crate::IntakeError;

/// Shared state for HTTP handlers.
#[derive(Debug, Clone)]
pub struct OtlpHttpState {
    pub sinks: Sinks,
    pub codec: Arc<VerboseIdCodec>,
    /// Maximum compressed body in bytes.
    pub max_body_size: usize,
    /// Maximum decompressed payload in bytes.
    pub max_decompressed_size: usize,
}

impl OtlpHttpState {
    pub fn new(sinks: Sinks, codec: Arc<VerboseIdCodec>, server: &ServerConfig) -> Self {
        Self {
            sinks,
            codec,
            max_body_size: server.max_body_size,
            max_decompressed_size: server.max_decompressed_size,
        }
    }
}

/// Create the OTLP HTTP router.
pub fn otlp_http_router(state: OtlpHttpState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/v1/traces", post(handle_traces))
        .route("/v1/logs", post(handle_logs))
        .with_state(state)
}

/// Handle GET /health
#[tracing::instrument]
async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Handle POST /v1/traces
#[tracing::instrument(skip(state, headers, body), fields(signal = "traces"))]
async fn handle_traces(
    State(state): State<OtlpHttpState>,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, HttpError> {
    ingest(&state, BatchKind::Traces, &headers, body).await
}

/// Handle POST /v1/logs
#[tracing::instrument(skip(state, headers, body), fields(signal = "logs"))]
async fn handle_logs(
    State(state): State<OtlpHttpState>,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, HttpError> {
    ingest(&state, BatchKind::Logs, &headers, body).await
}

async fn ingest(
    state: &OtlpHttpState,
    kind: BatchKind,
    headers: &HeaderMap,
    body: Body,
) -> Result<StatusCode, HttpError> {
    let content_type = ContentType::from_headers(headers)?;
    let batch = read_batch(state, kind, content_type, body)
        .await
        .inspect_err(|e| {
            tracing::warn!(stage = e.stage(), error = %e, "Rejecting export request");
        })?;

    let signal = kind.as_str();
    let buckets = match &batch {
        ExportBatch::Traces(request) => {
            Buckets::collect(classify_traces(request, &state.codec), signal)
        }
        ExportBatch::Logs(request) => Buckets::collect(classify_logs(request, &state.codec), signal),
    };

    let submitted = submit_buckets(&buckets, &state.sinks).await?;
    tracing::debug!(
        records = buckets.record_count(),
        dropped = buckets.dropped,
        submitted,
        "Export request processed"
    );
    Ok(StatusCode::OK)
}

async fn read_batch(
    state: &OtlpHttpState,
    kind: BatchKind,
    content_type: ContentType,
    body: Body,
) -> Result<ExportBatch, DecodeError> {
    let bytes = to_bytes(body, state.max_body_size)
        .await
        .map_err(|e| DecodeError::BodyRead(e.to_string()))?;
    decode_batch(kind, content_type, &bytes, state.max_decompressed_size)
}

/// HTTP error response wrapper.
#[derive(Debug)]
pub struct HttpError(IntakeError);

impl From<IntakeError> for HttpError {
    fn from(err: IntakeError) -> Self {
        Self(err)
    }
}

impl From<DecodeError> for HttpError {
    fn from(err: DecodeError) -> Self {
        Self(IntakeError::Decode(err))
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            IntakeError::Decode(_) => StatusCode::BAD_REQUEST,
            IntakeError::InvalidContentType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            IntakeError::Submit { .. } => StatusCode::SERVICE_UNAVAILABLE,
            IntakeError::Config(_) | IntakeError::Encode { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, self.0.to_string()).into_response()
    }
}
