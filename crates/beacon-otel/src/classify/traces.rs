//! Trace batch classification.
//!
//! Only span events matter here: `exception` events become error records and
//! `log` events become log rows. Spans themselves are not kept, but their
//! attributes ride along with every error raised inside them.

use std::sync::Arc;

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::trace::v1::span::Event;
use opentelemetry_proto::tonic::trace::v1::Span;

use super::{Classified, DropReason, Dropped, ErrorKey, Outcome, ResourceContext};
use crate::attributes::{attributes_to_json, semconv, Attributes, CorrelationIds};
use crate::project_id::{normalize, VerboseIdCodec};
use crate::records::{
    error_source, id_to_hex, severity_number, timestamp_from_nanos, ErrorObject, LogRow,
    DEFAULT_ERROR_TYPE, UNKNOWN_SEVERITY,
};
use crate::stacktrace::structure_stack_trace;

/// Classify every span event in a trace batch.
///
/// The returned iterator borrows the request and yields outcomes in traversal
/// order: resource, scope, span, event.
pub fn classify_traces<'a>(
    request: &'a ExportTraceServiceRequest,
    codec: &'a VerboseIdCodec,
) -> impl Iterator<Item = Outcome> + 'a {
    request.resource_spans.iter().flat_map(move |resource_spans| {
        let resource = Arc::new(ResourceContext::new(resource_spans.resource.as_ref()));
        resource_spans.scope_spans.iter().flat_map(move |scope_spans| {
            let scope = Arc::new(ScopeContext {
                ids: resource.scope_ids(scope_spans.scope.as_ref()),
                name: scope_spans.scope.as_ref().map_or("", |s| s.name.as_str()),
                resource: Arc::clone(&resource),
            });
            scope_spans
                .spans
                .iter()
                .flat_map(move |span| classify_span(Arc::clone(&scope), span, codec))
        })
    })
}

#[derive(Debug)]
struct ScopeContext<'a> {
    resource: Arc<ResourceContext<'a>>,
    name: &'a str,
    ids: CorrelationIds,
}

#[derive(Debug)]
struct SpanContext<'a> {
    scope: Arc<ScopeContext<'a>>,
    span: &'a Span,
    ids: CorrelationIds,
    /// Span attributes as a JSON object, attached to every error in the span.
    payload: String,
}

fn classify_span<'a>(
    scope: Arc<ScopeContext<'a>>,
    span: &'a Span,
    codec: &'a VerboseIdCodec,
) -> impl Iterator<Item = Outcome> + 'a {
    let (context, failure) = match SpanContext::new(scope, span) {
        Ok(context) => (Some(context), None),
        Err(dropped) => (None, Some(Err(dropped))),
    };
    let events = context.into_iter().flat_map(move |context| {
        span.events
            .iter()
            .filter_map(move |event| context.classify_event(event, codec))
    });
    failure.into_iter().chain(events)
}

impl<'a> SpanContext<'a> {
    fn new(scope: Arc<ScopeContext<'a>>, span: &'a Span) -> Result<Self, Dropped> {
        let payload = serde_json::to_string(&attributes_to_json(&span.attributes)).map_err(|e| {
            Dropped::new(
                DropReason::AttributeEncoding(e.to_string()),
                &span.trace_id,
                &span.span_id,
                &scope.ids,
            )
        })?;
        let ids = scope.ids.overlay(&Attributes::new(&span.attributes));
        Ok(Self {
            scope,
            span,
            ids,
            payload,
        })
    }

    fn dropped(&self, reason: DropReason, ids: &CorrelationIds) -> Dropped {
        Dropped::new(reason, &self.span.trace_id, &self.span.span_id, ids)
    }

    /// Events other than exceptions and logs are ignored.
    fn classify_event(&self, event: &'a Event, codec: &VerboseIdCodec) -> Option<Outcome> {
        let attrs = Attributes::new(&event.attributes);
        let ids = self.ids.overlay(&attrs);
        match event.name.as_str() {
            semconv::EXCEPTION_EVENT_NAME => Some(self.classify_exception(event, &attrs, ids)),
            semconv::LOG_EVENT_NAME => Some(self.classify_log(event, &attrs, ids, codec)),
            _ => None,
        }
    }

    fn classify_exception(
        &self,
        event: &Event,
        attrs: &Attributes<'a>,
        ids: CorrelationIds,
    ) -> Outcome {
        let error_type = attrs.str_or_empty(semconv::EXCEPTION_TYPE);
        let message = attrs.str_or_empty(semconv::EXCEPTION_MESSAGE);
        let stack_trace = attrs.str_or_empty(semconv::EXCEPTION_STACKTRACE);

        if stack_trace.is_empty() {
            return Err(self.dropped(DropReason::MissingStackTrace, &ids));
        }
        if error_type.is_empty() && message.is_empty() {
            return Err(self.dropped(DropReason::MissingTypeAndMessage, &ids));
        }

        let key = match (&ids.session_id, &ids.project_id) {
            (Some(session), _) => ErrorKey::Session(session.clone()),
            (None, Some(project)) => ErrorKey::Project(project.clone()),
            (None, None) => return Err(self.dropped(DropReason::Unaddressable, &ids)),
        };

        let resource = &self.scope.resource;
        let record = ErrorObject {
            session_secure_id: ids.session_id,
            request_id: ids.request_id,
            trace_id: id_to_hex(&self.span.trace_id),
            span_id: id_to_hex(&self.span.span_id),
            timestamp: timestamp_from_nanos(event.time_unix_nano),
            error_type: if error_type.is_empty() {
                DEFAULT_ERROR_TYPE
            } else {
                error_type
            }
            .to_owned(),
            event: message.to_owned(),
            source: error_source(resource.sdk_language, resource.service_name, self.scope.name),
            stack_trace: structure_stack_trace(stack_trace),
            payload: self.payload.clone(),
            url: attrs.str(semconv::ERROR_URL).map(str::to_owned),
        };
        Ok(Classified::Error { key, record })
    }

    fn classify_log(
        &self,
        event: &Event,
        attrs: &Attributes<'a>,
        ids: CorrelationIds,
        codec: &VerboseIdCodec,
    ) -> Outcome {
        let message = attrs.str_or_empty(semconv::LOG_MESSAGE);
        if message.is_empty() {
            return Err(self.dropped(DropReason::MissingMessage, &ids));
        }
        let Some(project) = ids.project_id.clone() else {
            return Err(self.dropped(DropReason::MissingProject, &ids));
        };
        let project_id =
            normalize(&project, codec).map_err(|e| self.dropped(e.into(), &ids))?;

        let severity_text = attrs.str(semconv::LOG_SEVERITY).unwrap_or(UNKNOWN_SEVERITY);
        let resource = &self.scope.resource;
        let row = LogRow {
            timestamp: timestamp_from_nanos(event.time_unix_nano),
            trace_id: id_to_hex(&self.span.trace_id),
            span_id: id_to_hex(&self.span.span_id),
            severity_text: severity_text.to_owned(),
            severity_number: severity_number(severity_text),
            service_name: resource.service_name.to_owned(),
            body: message.to_owned(),
            resource_attributes: resource.attributes.string_map(&[]),
            log_attributes: attrs.string_map(&[semconv::LOG_SEVERITY, semconv::LOG_MESSAGE]),
            project_id,
            secure_session_id: ids.session_id().to_owned(),
        };
        Ok(Classified::Log { project, row })
    }
}
