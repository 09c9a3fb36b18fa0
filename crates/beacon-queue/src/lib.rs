//! Queue backends for delivering classified telemetry to downstream workers.
//!
//! The intake service never persists data itself. Every batch of records it
//! produces is published to a [`QueueBackend`] under a topic and a
//! partitioning key, and the consumers on the other side of the queue take
//! it from there.

mod error;
mod traits;
mod types;

#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "config")]
mod config;

pub use error::QueueError;
pub use traits::QueueBackend;
pub use types::{Message, MessageId};

#[cfg(feature = "memory")]
pub use memory::MemoryQueue;

#[cfg(feature = "config")]
pub use config::QueueConfig;
