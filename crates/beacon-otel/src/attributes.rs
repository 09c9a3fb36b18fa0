//! Attribute access and correlation identifier resolution.
//!
//! OTLP attributes arrive as lists of `KeyValue` at every level of a batch:
//! resource, instrumentation scope, span, span event and log record. The SDKs
//! stamp three correlation identifiers (project, session, request) onto
//! whichever of those levels they have them at, so a record's identifiers
//! are found by layering the maps of its ancestors from the outside in.

use std::collections::{BTreeMap, HashMap};

use opentelemetry_proto::tonic::common::v1::{any_value::Value as AnyValueKind, AnyValue, KeyValue};

/// Reserved attribute keys and event names.
pub mod semconv {
    // Correlation identifiers, honoured at any scope
    pub const PROJECT_ID: &str = "beacon.project_id";
    pub const SESSION_ID: &str = "beacon.session_id";
    pub const REQUEST_ID: &str = "beacon.request_id";

    /// URL the error was raised on, when the SDK knows it.
    pub const ERROR_URL: &str = "beacon.error_url";

    // Resource attributes
    pub const SERVICE_NAME: &str = "service.name";
    pub const TELEMETRY_SDK_LANGUAGE: &str = "telemetry.sdk.language";

    // Exception events
    pub const EXCEPTION_EVENT_NAME: &str = "exception";
    pub const EXCEPTION_TYPE: &str = "exception.type";
    pub const EXCEPTION_MESSAGE: &str = "exception.message";
    pub const EXCEPTION_STACKTRACE: &str = "exception.stacktrace";

    // Log events attached to spans
    pub const LOG_EVENT_NAME: &str = "log";
    pub const LOG_SEVERITY: &str = "log.severity";
    pub const LOG_MESSAGE: &str = "log.message";
}

/// A resolved attribute value.
///
/// Only strings ever feed identifiers or string maps; everything else is
/// carried so callers can tell "absent" from "present but not a string".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttrValue<'a> {
    String(&'a str),
    Bool(bool),
    Int(i64),
    Double(f64),
    /// Arrays, key/value lists, bytes and empty values.
    Unsupported,
}

impl<'a> AttrValue<'a> {
    /// The string payload, if this is a non-empty string.
    pub fn non_empty_str(&self) -> Option<&'a str> {
        match *self {
            Self::String(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }
}

impl<'a> From<&'a AnyValue> for AttrValue<'a> {
    fn from(value: &'a AnyValue) -> Self {
        match &value.value {
            Some(AnyValueKind::StringValue(s)) => Self::String(s),
            Some(AnyValueKind::BoolValue(b)) => Self::Bool(*b),
            Some(AnyValueKind::IntValue(i)) => Self::Int(*i),
            Some(AnyValueKind::DoubleValue(d)) => Self::Double(*d),
            _ => Self::Unsupported,
        }
    }
}

/// Borrowed lookup view over one level's attributes.
///
/// Duplicate keys resolve to the last occurrence.
#[derive(Debug, Clone, Default)]
pub struct Attributes<'a> {
    map: HashMap<&'a str, AttrValue<'a>>,
}

impl<'a> Attributes<'a> {
    pub fn new(attrs: &'a [KeyValue]) -> Self {
        let mut map = HashMap::with_capacity(attrs.len());
        for kv in attrs {
            let value = kv.value.as_ref().map_or(AttrValue::Unsupported, AttrValue::from);
            map.insert(kv.key.as_str(), value);
        }
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<AttrValue<'a>> {
        self.map.get(key).copied()
    }

    /// Non-empty string value of `key`; empty and non-string values read as absent.
    pub fn str(&self, key: &str) -> Option<&'a str> {
        self.get(key).and_then(|v| v.non_empty_str())
    }

    /// Like [`Self::str`] but yields `""` when absent.
    pub fn str_or_empty(&self, key: &str) -> &'a str {
        self.str(key).unwrap_or_default()
    }

    /// Copy every non-empty string attribute, skipping `excluded` keys.
    pub fn string_map(&self, excluded: &[&str]) -> BTreeMap<String, String> {
        self.map
            .iter()
            .filter(|(k, _)| !excluded.contains(*k))
            .filter_map(|(k, v)| v.non_empty_str().map(|s| ((*k).to_owned(), s.to_owned())))
            .collect()
    }
}

/// The three correlation identifiers attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationIds {
    pub project_id: Option<String>,
    pub session_id: Option<String>,
    pub request_id: Option<String>,
}

impl CorrelationIds {
    /// Resolve identifiers from maps ordered from the outermost scope inwards.
    pub fn resolve<'m, 'a: 'm, I>(maps: I) -> Self
    where
        I: IntoIterator<Item = &'m Attributes<'a>>,
    {
        maps.into_iter()
            .fold(Self::default(), |ids, attrs| ids.overlay(attrs))
    }

    /// Identifiers as seen one scope further in.
    ///
    /// A non-empty string at the inner scope replaces the inherited value;
    /// empty strings and non-string values leave it untouched.
    #[must_use]
    pub fn overlay(&self, attrs: &Attributes<'_>) -> Self {
        let pick = |key: &str, inherited: &Option<String>| {
            attrs
                .str(key)
                .map(str::to_owned)
                .or_else(|| inherited.clone())
        };
        Self {
            project_id: pick(semconv::PROJECT_ID, &self.project_id),
            session_id: pick(semconv::SESSION_ID, &self.session_id),
            request_id: pick(semconv::REQUEST_ID, &self.request_id),
        }
    }

    pub fn project_id(&self) -> &str {
        self.project_id.as_deref().unwrap_or_default()
    }

    pub fn session_id(&self) -> &str {
        self.session_id.as_deref().unwrap_or_default()
    }
}

/// Render attributes as a JSON object, nested values included.
pub fn attributes_to_json(attrs: &[KeyValue]) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = attrs
        .iter()
        .map(|kv| {
            let value = kv
                .value
                .as_ref()
                .map_or(serde_json::Value::Null, any_value_to_json);
            (kv.key.clone(), value)
        })
        .collect();
    serde_json::Value::Object(map)
}

/// Convert an `AnyValue` to the equivalent JSON value.
pub fn any_value_to_json(value: &AnyValue) -> serde_json::Value {
    match &value.value {
        Some(AnyValueKind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(AnyValueKind::IntValue(i)) => serde_json::json!(*i),
        Some(AnyValueKind::DoubleValue(d)) => serde_json::json!(*d),
        Some(AnyValueKind::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(AnyValueKind::ArrayValue(arr)) => {
            serde_json::Value::Array(arr.values.iter().map(any_value_to_json).collect())
        }
        Some(AnyValueKind::KvlistValue(kvlist)) => attributes_to_json(&kvlist.values),
        Some(AnyValueKind::BytesValue(b)) => serde_json::Value::String(hex::encode(b)),
        None => serde_json::Value::Null,
    }
}
