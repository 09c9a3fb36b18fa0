//! Records produced by classification.
//!
//! These are the payloads downstream workers receive: [`ErrorObject`]s for
//! exceptions and [`LogRow`]s for log lines. Both are transient; they live for
//! one request and are either published or discarded.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use opentelemetry_proto::tonic::logs::v1::SeverityNumber;
use serde::{Deserialize, Serialize};

/// Error type used when an exception carries a message but no type.
pub const DEFAULT_ERROR_TYPE: &str = "BACKEND";

/// Severity text used when a log event does not carry one.
pub const UNKNOWN_SEVERITY: &str = "unknown";

/// Separator between the parts of [`ErrorObject::source`].
const SOURCE_SEPARATOR: &str = "-";

/// An exception raised inside a traced operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub session_secure_id: Option<String>,
    pub request_id: Option<String>,
    pub trace_id: String,
    pub span_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub error_type: String,
    /// The exception message.
    pub event: String,
    /// Language, service and instrumentation scope that reported the error.
    pub source: String,
    /// Structured frames as JSON, or the raw trace when unrecognised.
    pub stack_trace: String,
    /// The enclosing span's attributes as a JSON object.
    pub payload: String,
    pub url: Option<String>,
}

/// A single log line bound for a project's log table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRow {
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub span_id: String,
    pub severity_text: String,
    pub severity_number: i32,
    pub service_name: String,
    pub body: String,
    pub resource_attributes: BTreeMap<String, String>,
    pub log_attributes: BTreeMap<String, String>,
    pub project_id: u32,
    pub secure_session_id: String,
}

/// Join the non-empty parts of an error source.
pub fn error_source(sdk_language: &str, service_name: &str, scope_name: &str) -> String {
    [sdk_language, service_name, scope_name]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(SOURCE_SEPARATOR)
}

/// Map free-form severity text to an OTLP severity number.
///
/// Unrecognised text maps to `SEVERITY_NUMBER_UNSPECIFIED` (0).
pub fn severity_number(text: &str) -> i32 {
    let severity = match text.trim().to_ascii_lowercase().as_str() {
        "trace" => SeverityNumber::Trace,
        "debug" => SeverityNumber::Debug,
        "info" | "information" => SeverityNumber::Info,
        "warn" | "warning" => SeverityNumber::Warn,
        "error" => SeverityNumber::Error,
        "fatal" | "panic" | "critical" => SeverityNumber::Fatal,
        _ => SeverityNumber::Unspecified,
    };
    severity as i32
}

/// Convert OTLP nanoseconds since the epoch to a UTC timestamp.
pub fn timestamp_from_nanos(nanos: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(i64::try_from(nanos).unwrap_or(i64::MAX))
}

/// Hex-encode an OTLP trace or span id; empty ids stay empty.
pub fn id_to_hex(id: &[u8]) -> String {
    hex::encode(id)
}
