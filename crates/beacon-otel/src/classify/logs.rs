//! Log batch classification.

use std::sync::Arc;

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::common::v1::{any_value::Value as AnyValueKind, AnyValue};
use opentelemetry_proto::tonic::logs::v1::LogRecord;

use super::{Classified, DropReason, Dropped, Outcome, ResourceContext};
use crate::attributes::{any_value_to_json, semconv, Attributes, CorrelationIds};
use crate::project_id::{normalize, VerboseIdCodec};
use crate::records::{id_to_hex, timestamp_from_nanos, LogRow};

/// Classify every log record in a logs batch, in traversal order.
pub fn classify_logs<'a>(
    request: &'a ExportLogsServiceRequest,
    codec: &'a VerboseIdCodec,
) -> impl Iterator<Item = Outcome> + 'a {
    request.resource_logs.iter().flat_map(move |resource_logs| {
        let resource = Arc::new(ResourceContext::new(resource_logs.resource.as_ref()));
        resource_logs.scope_logs.iter().flat_map(move |scope_logs| {
            let ids = resource.scope_ids(scope_logs.scope.as_ref());
            let resource = Arc::clone(&resource);
            scope_logs
                .log_records
                .iter()
                .map(move |record| classify_record(&resource, &ids, record, codec))
        })
    })
}

fn classify_record(
    resource: &ResourceContext<'_>,
    scope_ids: &CorrelationIds,
    record: &LogRecord,
    codec: &VerboseIdCodec,
) -> Outcome {
    let attrs = Attributes::new(&record.attributes);
    let ids = scope_ids.overlay(&attrs);
    let dropped = |reason| Dropped::new(reason, &record.trace_id, &record.span_id, &ids);

    let body = record.body.as_ref().map(body_text).unwrap_or_default();
    if body.is_empty() {
        return Err(dropped(DropReason::MissingMessage));
    }
    let Some(project) = ids.project_id.clone() else {
        return Err(dropped(DropReason::MissingProject));
    };
    let project_id = normalize(&project, codec).map_err(|e| dropped(e.into()))?;

    // Some SDKs only set the observed time.
    let nanos = if record.time_unix_nano == 0 {
        record.observed_time_unix_nano
    } else {
        record.time_unix_nano
    };

    let row = LogRow {
        timestamp: timestamp_from_nanos(nanos),
        trace_id: id_to_hex(&record.trace_id),
        span_id: id_to_hex(&record.span_id),
        severity_text: record.severity_text.clone(),
        severity_number: record.severity_number,
        service_name: resource.service_name.to_owned(),
        body,
        resource_attributes: resource.attributes.string_map(&[]),
        log_attributes: attrs.string_map(&[semconv::LOG_SEVERITY, semconv::LOG_MESSAGE]),
        project_id,
        secure_session_id: ids.session_id().to_owned(),
    };
    Ok(Classified::Log { project, row })
}

/// Render a log body as text. Structured bodies become compact JSON.
fn body_text(body: &AnyValue) -> String {
    match &body.value {
        Some(AnyValueKind::StringValue(s)) => s.clone(),
        Some(AnyValueKind::BoolValue(b)) => b.to_string(),
        Some(AnyValueKind::IntValue(i)) => i.to_string(),
        Some(AnyValueKind::DoubleValue(d)) => d.to_string(),
        Some(_) => any_value_to_json(body).to_string(),
        None => String::new(),
    }
}
