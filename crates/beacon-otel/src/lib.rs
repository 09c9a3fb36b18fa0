//! Beacon OTLP intake.
//!
//! Receives OTLP trace and log export requests from instrumented
//! applications, pulls out the project, session and request identifiers the
//! Beacon SDKs attach as attributes, and turns exception and log events into
//! error and log records for the downstream workers.
//!
//! ## Architecture
//!
//! ```text
//! gzip(OTLP) ─> decode ─> classify ─> Buckets ─> router ─> QueueBackend
//!                            │
//!                            └─> dropped records ─> tracing
//! ```

pub mod attributes;
pub mod classify;
pub mod config;
pub mod error;
pub mod ingest;
pub mod project_id;
pub mod records;
pub mod router;
pub mod stacktrace;

pub use config::IntakeConfig;
pub use error::IntakeError;
