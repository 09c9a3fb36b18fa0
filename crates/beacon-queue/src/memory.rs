use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::QueueError;
use crate::traits::QueueBackend;
use crate::types::{Message, MessageId};

/// In-process queue keyed by topic.
///
/// Useful for tests and single-node deployments. When built with a capacity,
/// each topic holds at most that many undelivered messages and further
/// publishes fail with [`QueueError::Full`].
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    topics: Arc<Mutex<HashMap<String, VecDeque<Message>>>>,
    capacity: Option<usize>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Arc::default(),
            capacity: Some(capacity),
        }
    }

    /// Pop the oldest message on `topic`.
    pub async fn receive(&self, topic: &str) -> Option<Message> {
        let mut topics = self.topics.lock().await;
        topics.get_mut(topic).and_then(VecDeque::pop_front)
    }

    /// Snapshot of every message currently queued on `topic`, oldest first.
    pub async fn messages(&self, topic: &str) -> Vec<Message> {
        let topics = self.topics.lock().await;
        topics
            .get(topic)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn len(&self, topic: &str) -> usize {
        let topics = self.topics.lock().await;
        topics.get(topic).map_or(0, VecDeque::len)
    }

    pub async fn is_empty(&self, topic: &str) -> bool {
        self.len(topic).await == 0
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<MessageId, QueueError> {
        let mut topics = self.topics.lock().await;
        let queue = topics.entry(topic.to_string()).or_default();

        if let Some(capacity) = self.capacity {
            if queue.len() >= capacity {
                tracing::debug!(topic, capacity, "memory queue full, rejecting publish");
                return Err(QueueError::Full {
                    topic: topic.to_string(),
                    capacity,
                });
            }
        }

        let message = Message::new(Uuid::new_v4().to_string(), key, payload.to_vec());
        let id = message.id.clone();
        queue.push_back(message);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive() {
        let queue = MemoryQueue::new();

        let id = queue.publish("errors", "sess-1", b"message1").await.unwrap();
        let msg = queue.receive("errors").await.unwrap();

        assert_eq!(msg.id, id);
        assert_eq!(msg.key, "sess-1");
        assert_eq!(msg.payload, b"message1");
        assert!(queue.receive("errors").await.is_none());
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let queue = MemoryQueue::new();

        queue.publish("errors", "1", b"a").await.unwrap();
        queue.publish("logs", "1", b"b").await.unwrap();
        queue.publish("logs", "2", b"c").await.unwrap();

        assert_eq!(queue.len("errors").await, 1);
        assert_eq!(queue.len("logs").await, 2);
        assert!(queue.is_empty("unknown").await);
    }

    #[tokio::test]
    async fn messages_keep_publish_order() {
        let queue = MemoryQueue::new();

        for i in 0..5 {
            queue
                .publish("logs", "project", format!("m{i}").as_bytes())
                .await
                .unwrap();
        }

        let payloads: Vec<_> = queue
            .messages("logs")
            .await
            .into_iter()
            .map(|m| String::from_utf8(m.payload).unwrap())
            .collect();
        assert_eq!(payloads, ["m0", "m1", "m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn capacity_applies_backpressure() {
        let queue = MemoryQueue::with_capacity(2);

        queue.publish("errors", "a", b"1").await.unwrap();
        queue.publish("errors", "a", b"2").await.unwrap();
        let err = queue.publish("errors", "a", b"3").await.unwrap_err();
        assert!(matches!(err, QueueError::Full { capacity: 2, .. }));

        // Draining frees a slot.
        queue.receive("errors").await.unwrap();
        queue.publish("errors", "a", b"3").await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_publishers() {
        let queue = MemoryQueue::new();
        let mut handles = Vec::new();

        for i in 0..8 {
            let q = queue.clone();
            handles.push(tokio::spawn(async move {
                q.publish("logs", &i.to_string(), b"x").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(queue.len("logs").await, 8);
    }
}
