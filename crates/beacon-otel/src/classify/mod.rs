//! Classification of export batches into error and log records.
//!
//! Both classifiers walk their batch lazily and yield one [`Outcome`] per
//! record of interest: either a [`Classified`] record tagged with its
//! destination, or a [`Dropped`] diagnostic explaining why it was skipped.
//! [`Buckets::collect`] consumes the stream, groups the records by
//! destination and hands diagnostics to `tracing`.
//!
//! ```text
//! ExportTraceServiceRequest ──> classify_traces ──┐
//!                                                 ├──> Outcome* ──> Buckets
//! ExportLogsServiceRequest ───> classify_logs ────┘
//! ```

mod logs;
mod traces;

use std::collections::BTreeMap;

pub use logs::classify_logs;
pub use traces::classify_traces;

use opentelemetry_proto::tonic::common::v1::InstrumentationScope;
use opentelemetry_proto::tonic::resource::v1::Resource;

use crate::attributes::{semconv, Attributes, CorrelationIds};
use crate::records::{id_to_hex, ErrorObject, LogRow};

/// Result of classifying a single record.
pub type Outcome = Result<Classified, Dropped>;

/// Where an error record is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKey {
    /// Errors raised during a known user session.
    Session(String),
    /// Errors with no session, attributed to the project only.
    Project(String),
}

/// A record ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Error { key: ErrorKey, record: ErrorObject },
    Log { project: String, row: LogRow },
}

/// Why a record was not classified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DropReason {
    #[error("failed to serialise span attributes: {0}")]
    AttributeEncoding(String),

    #[error("exception with no stacktrace")]
    MissingStackTrace,

    #[error("exception with no type and no message")]
    MissingTypeAndMessage,

    #[error("error with no session and no project")]
    Unaddressable,

    #[error("log with no message")]
    MissingMessage,

    #[error("log with no project")]
    MissingProject,

    #[error(transparent)]
    InvalidProject(#[from] crate::project_id::ProjectIdError),
}

/// A skipped record and enough context to find it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dropped {
    pub reason: DropReason,
    pub trace_id: String,
    pub span_id: String,
    pub ids: CorrelationIds,
}

impl Dropped {
    pub(crate) fn new(
        reason: DropReason,
        trace_id: &[u8],
        span_id: &[u8],
        ids: &CorrelationIds,
    ) -> Self {
        Self {
            reason,
            trace_id: id_to_hex(trace_id),
            span_id: id_to_hex(span_id),
            ids: ids.clone(),
        }
    }

    /// Emit this diagnostic. Records the SDK should never have produced are
    /// errors; incomplete ones are warnings.
    pub fn report(&self, signal: &'static str) {
        let Self {
            reason,
            trace_id,
            span_id,
            ids,
        } = self;
        match reason {
            DropReason::AttributeEncoding(_)
            | DropReason::Unaddressable
            | DropReason::MissingProject
            | DropReason::InvalidProject(_) => tracing::error!(
                signal,
                reason = %reason,
                trace_id = %trace_id,
                span_id = %span_id,
                project_id = ids.project_id(),
                session_id = ids.session_id(),
                "Dropping record"
            ),
            DropReason::MissingStackTrace
            | DropReason::MissingTypeAndMessage
            | DropReason::MissingMessage => tracing::warn!(
                signal,
                reason = %reason,
                trace_id = %trace_id,
                span_id = %span_id,
                "Dropping record"
            ),
        }
    }
}

/// Resource-level facts shared by every record under one resource.
#[derive(Debug)]
pub(crate) struct ResourceContext<'a> {
    pub attributes: Attributes<'a>,
    pub sdk_language: &'a str,
    pub service_name: &'a str,
    pub ids: CorrelationIds,
}

impl<'a> ResourceContext<'a> {
    pub fn new(resource: Option<&'a Resource>) -> Self {
        let attributes = resource.map_or_else(Attributes::default, |r| Attributes::new(&r.attributes));
        Self {
            sdk_language: attributes.str_or_empty(semconv::TELEMETRY_SDK_LANGUAGE),
            service_name: attributes.str_or_empty(semconv::SERVICE_NAME),
            ids: CorrelationIds::default().overlay(&attributes),
            attributes,
        }
    }

    /// Identifiers in effect inside an instrumentation scope.
    pub fn scope_ids(&self, scope: Option<&InstrumentationScope>) -> CorrelationIds {
        match scope {
            Some(scope) => self.ids.overlay(&Attributes::new(&scope.attributes)),
            None => self.ids.clone(),
        }
    }
}

/// Records grouped by destination key, each group in traversal order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Buckets {
    pub session_errors: BTreeMap<String, Vec<ErrorObject>>,
    pub project_errors: BTreeMap<String, Vec<ErrorObject>>,
    pub project_logs: BTreeMap<String, Vec<LogRow>>,
    /// Number of diagnostics seen while collecting.
    pub dropped: usize,
}

impl Buckets {
    /// Group classified records, reporting every dropped one.
    pub fn collect<I>(outcomes: I, signal: &'static str) -> Self
    where
        I: IntoIterator<Item = Outcome>,
    {
        let mut buckets = Self::default();
        for outcome in outcomes {
            match outcome {
                Ok(classified) => buckets.insert(classified),
                Err(dropped) => {
                    dropped.report(signal);
                    buckets.dropped += 1;
                }
            }
        }
        buckets
    }

    pub fn insert(&mut self, classified: Classified) {
        match classified {
            Classified::Error {
                key: ErrorKey::Session(session),
                record,
            } => self.session_errors.entry(session).or_default().push(record),
            Classified::Error {
                key: ErrorKey::Project(project),
                record,
            } => self.project_errors.entry(project).or_default().push(record),
            Classified::Log { project, row } => {
                self.project_logs.entry(project).or_default().push(row);
            }
        }
    }

    /// Total classified records across all buckets.
    pub fn record_count(&self) -> usize {
        self.session_errors.values().map(Vec::len).sum::<usize>()
            + self.project_errors.values().map(Vec::len).sum::<usize>()
            + self.project_logs.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.session_errors.is_empty()
            && self.project_errors.is_empty()
            && self.project_logs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::timestamp_from_nanos;

    fn error(event: &str) -> ErrorObject {
        ErrorObject {
            session_secure_id: None,
            request_id: None,
            trace_id: String::new(),
            span_id: String::new(),
            timestamp: timestamp_from_nanos(0),
            error_type: "E".to_string(),
            event: event.to_string(),
            source: String::new(),
            stack_trace: "stack".to_string(),
            payload: "{}".to_string(),
            url: None,
        }
    }

    fn session_error(session: &str, event: &str) -> Outcome {
        Ok(Classified::Error {
            key: ErrorKey::Session(session.to_string()),
            record: error(event),
        })
    }

    #[test]
    fn collect_groups_by_key_in_order() {
        let outcomes = vec![
            session_error("b", "1"),
            Err(Dropped::new(
                DropReason::MissingStackTrace,
                &[],
                &[],
                &CorrelationIds::default(),
            )),
            session_error("a", "2"),
            session_error("b", "3"),
            Ok(Classified::Error {
                key: ErrorKey::Project("7".to_string()),
                record: error("4"),
            }),
        ];

        let buckets = Buckets::collect(outcomes, "traces");

        assert_eq!(buckets.dropped, 1);
        assert_eq!(buckets.record_count(), 4);
        let keys: Vec<_> = buckets.session_errors.keys().map(String::as_str).collect();
        assert_eq!(keys, ["a", "b"]);
        let b: Vec<_> = buckets.session_errors["b"].iter().map(|e| e.event.as_str()).collect();
        assert_eq!(b, ["1", "3"]);
        assert_eq!(buckets.project_errors["7"].len(), 1);
        assert!(buckets.project_logs.is_empty());
    }

    #[test]
    fn only_drops_leave_buckets_empty() {
        let outcomes = vec![Err(Dropped::new(
            DropReason::Unaddressable,
            &[1],
            &[2],
            &CorrelationIds::default(),
        ))];

        let buckets = Buckets::collect(outcomes, "traces");

        assert!(buckets.is_empty());
        assert_eq!(buckets.dropped, 1);
    }

    #[test]
    fn resource_context_reads_source_and_ids() {
        use opentelemetry_proto::tonic::common::v1::{any_value::Value, AnyValue, KeyValue};

        let kv = |key: &str, value: &str| KeyValue {
            key: key.to_string(),
            value: Some(AnyValue {
                value: Some(Value::StringValue(value.to_string())),
            }),
        };
        let resource = Resource {
            attributes: vec![
                kv(semconv::SERVICE_NAME, "api"),
                kv(semconv::TELEMETRY_SDK_LANGUAGE, "rust"),
                kv(semconv::PROJECT_ID, "9"),
            ],
            ..Default::default()
        };
        let scope = InstrumentationScope {
            attributes: vec![kv(semconv::SESSION_ID, "s")],
            ..Default::default()
        };

        let context = ResourceContext::new(Some(&resource));
        let ids = context.scope_ids(Some(&scope));

        assert_eq!(context.service_name, "api");
        assert_eq!(context.sdk_language, "rust");
        assert_eq!(ids.project_id(), "9");
        assert_eq!(ids.session_id(), "s");
        assert_eq!(context.ids.session_id, None);
    }
}
