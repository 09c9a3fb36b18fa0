use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue full: {topic} holds {capacity} messages")]
    Full { topic: String, capacity: usize },
}
