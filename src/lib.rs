//! MineWatch Agent: slope-stability risk scoring and alert dispatch for open-pit mines.
//!
//! Modular structure:
//! - [`features`]: Sensor readings, CSV/JSON feature source, normalization, staleness
//! - [`risk`]: Weighted risk scorer and threshold classifier
//! - [`alert`]: Policy gate, message composition, ordered backend fallback
//! - [`storage`]: Encrypted local assessment / alert log
//! - [`pipeline`]: One monitoring pass over the feature store
//! - [`logging`]: Structured JSON logging

pub mod alert;
pub mod config;
pub mod error;
pub mod features;
pub mod logging;
pub mod pipeline;
pub mod risk;
pub mod storage;

pub use alert::{AlertDispatcher, AlertOutcome, AlertRequest, NotificationBackend};
pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use features::{FeatureStore, FeatureVector, SensorReading};
pub use logging::StructuredLogger;
pub use pipeline::{MonitorPipeline, PipelineReport};
pub use risk::{classify, score, RiskAssessment, RiskEngine, RiskLevel};
pub use storage::{EventSink, SecureStore};
