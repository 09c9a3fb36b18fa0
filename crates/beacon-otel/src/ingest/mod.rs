//! OTLP/HTTP intake.

pub mod decode;
pub mod http;

pub use decode::{decode_batch, BatchKind, ContentType, ExportBatch};
pub use http::{otlp_http_router, OtlpHttpState};
