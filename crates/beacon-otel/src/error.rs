//! Error types for the intake crate.

use std::io;

use beacon_queue::QueueError;

/// Errors that abort an intake request.
///
/// Per-record problems never show up here; those are reported as
/// [`crate::classify::Dropped`] diagnostics and the batch carries on.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The request body could not be turned into an export batch.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Invalid content type in HTTP request.
    #[error("unsupported content type: {content_type}")]
    InvalidContentType { content_type: String },

    /// A queue message could not be serialised.
    #[error("failed to encode {kind} message for {key}: {source}")]
    Encode {
        kind: &'static str,
        key: String,
        source: serde_json::Error,
    },

    /// A downstream queue refused a message. Earlier messages from the same
    /// request may already have been delivered.
    #[error("failed to submit {kind} for {key}: {source}")]
    Submit {
        kind: &'static str,
        key: String,
        source: QueueError,
    },
}

/// Failures turning a raw request body into an export batch.
///
/// All of these are attributable to the client.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The body could not be read off the connection.
    #[error("failed to read request body: {0}")]
    BodyRead(String),

    /// The payload is not a gzip stream.
    #[error("invalid gzip format: {0}")]
    GzipFormat(io::Error),

    /// The gzip header was valid but the compressed stream was not.
    #[error("invalid gzip stream: {0}")]
    GzipStream(io::Error),

    /// Protobuf decoding error.
    #[error("protobuf decode error: {source}")]
    Protobuf { source: prost::DecodeError },

    /// JSON decoding error.
    #[error("JSON decode error: {source}")]
    Json { source: serde_json::Error },
}

impl DecodeError {
    /// Short label used in log events.
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::BodyRead(_) => "body",
            Self::GzipFormat(_) => "gzip_format",
            Self::GzipStream(_) => "gzip_stream",
            Self::Protobuf { .. } | Self::Json { .. } => "envelope",
        }
    }
}
