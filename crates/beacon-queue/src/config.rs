use std::sync::Arc;

use serde::Deserialize;

use crate::memory::MemoryQueue;
use crate::traits::QueueBackend;

/// Queue backend selection.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum QueueConfig {
    /// In-process queue; `capacity` bounds each topic when set.
    Memory {
        #[serde(default)]
        capacity: Option<usize>,
    },
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::Memory { capacity: None }
    }
}

impl QueueConfig {
    /// Build the configured backend.
    pub fn build(&self) -> Arc<dyn QueueBackend> {
        match self {
            Self::Memory { capacity } => {
                tracing::info!(?capacity, "Using in-memory queue backend");
                let queue = match capacity {
                    Some(capacity) => MemoryQueue::with_capacity(*capacity),
                    None => MemoryQueue::new(),
                };
                Arc::new(queue)
            }
        }
    }
}
