use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A published message as stored by a backend.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    /// Partitioning key supplied by the producer.
    pub key: String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(id: impl Into<String>, key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: MessageId::new(id),
            key: key.into(),
            payload,
        }
    }
}
