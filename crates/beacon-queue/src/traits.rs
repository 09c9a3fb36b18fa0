use async_trait::async_trait;

use crate::error::QueueError;
use crate::types::MessageId;

/// Producer side of a message queue.
///
/// Implementations must be safe to share between concurrently running
/// requests. A successful return means the backend has accepted the
/// message; there is no way to retract it afterwards.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Publish `payload` to `topic`. Messages sharing a `key` are kept in
    /// publish order relative to each other.
    async fn publish(&self, topic: &str, key: &str, payload: &[u8])
        -> Result<MessageId, QueueError>;
}
