//! Request body decoding.
//!
//! Bodies are always gzip-compressed. The decompressed payload is an OTLP
//! export request, protobuf by default or JSON when the client says so.

use std::io::Read;

use axum::http::{header::CONTENT_TYPE, HeaderMap};
use flate2::bufread::GzDecoder;
use opentelemetry_proto::tonic::collector::{
    logs::v1::ExportLogsServiceRequest, trace::v1::ExportTraceServiceRequest,
};
use prost::Message;

use crate::error::DecodeError;
use crate::IntakeError;

/// First two bytes of every gzip member.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Which export request a body carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Traces,
    Logs,
}

impl BatchKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Traces => "traces",
            Self::Logs => "logs",
        }
    }
}

/// Envelope encoding of the decompressed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Protobuf,
    Json,
}

impl ContentType {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, IntakeError> {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/x-protobuf");

        if content_type.starts_with("application/x-protobuf") {
            Ok(Self::Protobuf)
        } else if content_type.starts_with("application/json") {
            Ok(Self::Json)
        } else {
            Err(IntakeError::InvalidContentType {
                content_type: content_type.to_owned(),
            })
        }
    }
}

/// A decoded export request.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportBatch {
    Traces(ExportTraceServiceRequest),
    Logs(ExportLogsServiceRequest),
}

/// Decompress and decode a request body.
///
/// `max_decompressed` bounds the inflated payload; anything larger is
/// rejected as a broken stream.
pub fn decode_batch(
    kind: BatchKind,
    content_type: ContentType,
    body: &[u8],
    max_decompressed: usize,
) -> Result<ExportBatch, DecodeError> {
    let payload = gunzip(body, max_decompressed)?;
    Ok(match kind {
        BatchKind::Traces => ExportBatch::Traces(decode_envelope(content_type, &payload)?),
        BatchKind::Logs => ExportBatch::Logs(decode_envelope(content_type, &payload)?),
    })
}

/// Inflate a gzip body of at most `limit` bytes.
///
/// Concatenated members are decoded in sequence; bytes after the last member
/// that do not form another member are an error.
pub fn gunzip(body: &[u8], limit: usize) -> Result<Vec<u8>, DecodeError> {
    if !body.starts_with(&GZIP_MAGIC) {
        return Err(DecodeError::GzipFormat(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "missing gzip header",
        )));
    }

    let mut payload = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        let budget = limit.saturating_sub(payload.len()).saturating_add(1);
        let mut member = GzDecoder::new(rest);
        if let Err(e) = member
            .by_ref()
            .take(u64::try_from(budget).unwrap_or(u64::MAX))
            .read_to_end(&mut payload)
        {
            // A header that never parsed is a format problem, anything later is the stream.
            return Err(if member.header().is_none() {
                DecodeError::GzipFormat(e)
            } else {
                DecodeError::GzipStream(e)
            });
        }
        if payload.len() > limit {
            return Err(DecodeError::GzipStream(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("decompressed payload exceeds {limit} bytes"),
            )));
        }
        rest = member.into_inner();
    }
    Ok(payload)
}

fn decode_envelope<T>(content_type: ContentType, payload: &[u8]) -> Result<T, DecodeError>
where
    T: Message + Default + serde::de::DeserializeOwned,
{
    match content_type {
        ContentType::Protobuf => {
            T::decode(payload).map_err(|source| DecodeError::Protobuf { source })
        }
        ContentType::Json => {
            serde_json::from_slice(payload).map_err(|source| DecodeError::Json { source })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
    use std::io::Write;

    const LIMIT: usize = 1024 * 1024;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn sample_logs() -> ExportLogsServiceRequest {
        ExportLogsServiceRequest {
            resource_logs: vec![ResourceLogs {
                scope_logs: vec![ScopeLogs {
                    log_records: vec![LogRecord {
                        severity_text: "INFO".to_string(),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        }
    }

    #[test]
    fn protobuf_logs_decode() {
        let body = gzip(&sample_logs().encode_to_vec());

        let batch = decode_batch(BatchKind::Logs, ContentType::Protobuf, &body, LIMIT).unwrap();

        assert_eq!(batch, ExportBatch::Logs(sample_logs()));
    }

    #[test]
    fn json_logs_decode() {
        let body = gzip(&serde_json::to_vec(&sample_logs()).unwrap());

        let batch = decode_batch(BatchKind::Logs, ContentType::Json, &body, LIMIT).unwrap();

        assert_eq!(batch, ExportBatch::Logs(sample_logs()));
    }

    #[test]
    fn empty_payload_is_an_empty_batch() {
        let body = gzip(&[]);

        let batch = decode_batch(BatchKind::Traces, ContentType::Protobuf, &body, LIMIT).unwrap();

        assert_eq!(batch, ExportBatch::Traces(ExportTraceServiceRequest::default()));
    }

    #[test]
    fn uncompressed_body_is_a_format_error() {
        let body = sample_logs().encode_to_vec();

        let err = decode_batch(BatchKind::Logs, ContentType::Protobuf, &body, LIMIT).unwrap_err();

        assert!(matches!(err, DecodeError::GzipFormat(_)));
        assert_eq!(err.stage(), "gzip_format");
    }

    #[test]
    fn truncated_header_is_a_format_error() {
        let body = gzip(b"payload");

        let err = gunzip(&body[..4], LIMIT).unwrap_err();

        assert!(matches!(err, DecodeError::GzipFormat(_)));
    }

    #[test]
    fn truncated_stream_is_a_stream_error() {
        let body = gzip(&sample_logs().encode_to_vec());
        let truncated = &body[..body.len() - 6];

        let err = gunzip(truncated, LIMIT).unwrap_err();

        assert!(matches!(err, DecodeError::GzipStream(_)));
    }

    #[test]
    fn concatenated_members_are_all_decoded() {
        let mut body = gzip(b"hello ");
        body.extend(gzip(b"world"));

        assert_eq!(gunzip(&body, LIMIT).unwrap(), b"hello world");
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let mut body = gzip(b"hello");
        body.extend_from_slice(b"GARBAGE");

        assert!(matches!(gunzip(&body, LIMIT), Err(DecodeError::GzipFormat(_))));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let body = gzip(&vec![0u8; 4096]);

        assert!(gunzip(&body, 4096).is_ok());
        assert!(matches!(gunzip(&body, 4095), Err(DecodeError::GzipStream(_))));
    }

    #[test]
    fn malformed_protobuf_is_an_envelope_error() {
        let body = gzip(&[0xFF, 0xFF, 0xFF]);

        let err = decode_batch(BatchKind::Traces, ContentType::Protobuf, &body, LIMIT).unwrap_err();

        assert!(matches!(err, DecodeError::Protobuf { .. }));
        assert_eq!(err.stage(), "envelope");
    }

    #[test]
    fn content_type_selection() {
        let mut headers = HeaderMap::new();
        assert_eq!(ContentType::from_headers(&headers).unwrap(), ContentType::Protobuf);

        headers.insert(CONTENT_TYPE, "application/json; charset=utf-8".parse().unwrap());
        assert_eq!(ContentType::from_headers(&headers).unwrap(), ContentType::Json);

        headers.insert(CONTENT_TYPE, "text/plain".parse().unwrap());
        assert!(matches!(
            ContentType::from_headers(&headers),
            Err(IntakeError::InvalidContentType { .. })
        ));
    }
}
