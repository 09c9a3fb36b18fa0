//! Delivery of grouped records to downstream queues.
//!
//! Every bucket entry becomes one queue message. Error buckets go to the
//! errors topic, log buckets to the logs topic, each keyed by the bucket key
//! so one session's or project's messages stay in order.

use std::sync::Arc;

use beacon_queue::QueueBackend;
use serde::{Deserialize, Serialize};

use crate::classify::Buckets;
use crate::config::SinkConfig;
use crate::records::{ErrorObject, LogRow};
use crate::IntakeError;

/// Message envelope consumed by the downstream workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueueMessage {
    /// A batch of errors for one session, or for one project when the
    /// errors have no session.
    PushBackendPayload {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        session_secure_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        project_verbose_id: Option<String>,
        errors: Vec<ErrorObject>,
    },
    /// A batch of log rows for one project.
    PushLogs { log_rows: Vec<LogRow> },
}

impl QueueMessage {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PushBackendPayload { .. } => "errors",
            Self::PushLogs { .. } => "logs",
        }
    }
}

/// One topic on a queue backend.
#[derive(Clone)]
pub struct QueueSink {
    backend: Arc<dyn QueueBackend>,
    topic: String,
}

impl std::fmt::Debug for QueueSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSink")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl QueueSink {
    pub fn new(backend: Arc<dyn QueueBackend>, topic: impl Into<String>) -> Self {
        Self {
            backend,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Encode and publish one message under `key`.
    pub async fn submit(&self, key: &str, message: &QueueMessage) -> Result<(), IntakeError> {
        let kind = message.kind();
        let payload = serde_json::to_vec(message).map_err(|source| IntakeError::Encode {
            kind,
            key: key.to_owned(),
            source,
        })?;
        let id = self
            .backend
            .publish(&self.topic, key, &payload)
            .await
            .map_err(|source| IntakeError::Submit {
                kind,
                key: key.to_owned(),
                source,
            })?;
        tracing::debug!(topic = %self.topic, key, kind, message_id = %id, "Submitted batch");
        Ok(())
    }
}

/// The error and log sinks.
#[derive(Debug, Clone)]
pub struct Sinks {
    pub errors: QueueSink,
    pub logs: QueueSink,
}

impl Sinks {
    /// Both sinks on a single backend.
    pub fn new(backend: Arc<dyn QueueBackend>, config: &SinkConfig) -> Self {
        Self {
            errors: QueueSink::new(Arc::clone(&backend), config.errors_topic.as_str()),
            logs: QueueSink::new(backend, config.logs_topic.as_str()),
        }
    }

    /// Build the configured backend and wrap it.
    pub fn from_config(config: &SinkConfig) -> Self {
        Self::new(config.backend.build(), config)
    }
}

/// Submit every bucket entry: session errors, then project errors, then
/// project logs, each in key order.
///
/// Stops at the first failure. Messages already submitted stay submitted.
/// Returns the number of messages delivered.
pub async fn submit_buckets(buckets: &Buckets, sinks: &Sinks) -> Result<usize, IntakeError> {
    let mut submitted = 0;

    for (session, errors) in &buckets.session_errors {
        let message = QueueMessage::PushBackendPayload {
            session_secure_id: Some(session.clone()),
            project_verbose_id: None,
            errors: errors.clone(),
        };
        deliver(&sinks.errors, session, &message, submitted).await?;
        submitted += 1;
    }

    for (project, errors) in &buckets.project_errors {
        let message = QueueMessage::PushBackendPayload {
            session_secure_id: None,
            project_verbose_id: Some(project.clone()),
            errors: errors.clone(),
        };
        deliver(&sinks.errors, project, &message, submitted).await?;
        submitted += 1;
    }

    for (project, rows) in &buckets.project_logs {
        let message = QueueMessage::PushLogs {
            log_rows: rows.clone(),
        };
        deliver(&sinks.logs, project, &message, submitted).await?;
        submitted += 1;
    }

    Ok(submitted)
}

async fn deliver(
    sink: &QueueSink,
    key: &str,
    message: &QueueMessage,
    already_submitted: usize,
) -> Result<(), IntakeError> {
    sink.submit(key, message).await.inspect_err(|e| {
        tracing::error!(
            error = %e,
            topic = sink.topic(),
            already_submitted,
            "Batch submission failed, earlier messages were delivered"
        );
    })
}
