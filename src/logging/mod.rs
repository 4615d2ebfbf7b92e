//! Structured logging: tracing subscriber setup and NDJSON report lines.

mod format;

pub use format::{ReportLine, StructuredLogger};
