//! Alert dispatch: policy gate, message composition, ordered backend fallback.

mod backend;
mod dispatcher;
mod message;

pub use backend::{build_backends, EmailApiBackend, NotificationBackend, OutboxBackend, WebhookBackend};
pub use dispatcher::{AlertDispatcher, AlertDispatcherBuilder};
pub use message::{compose, OutboundMessage};

use crate::config::MineSite;
use crate::features::Feature;
use crate::risk::{RiskAssessment, RiskLevel};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One notification to one recipient about one assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub mine_id: String,
    pub mine_name: String,
    pub location: String,
    pub recipient_email: String,
    pub probability: f64,
    pub level: RiskLevel,
    /// Dominant features, largest contribution first
    #[serde(default)]
    pub drivers: Vec<(Feature, f64)>,
    /// Set when the underlying reading was older than the freshness limit
    #[serde(default)]
    pub stale_reading: bool,
}

impl AlertRequest {
    /// Build a request from an assessment. Unregistered mines use their id as name.
    pub fn from_assessment(
        assessment: &RiskAssessment,
        site: Option<&MineSite>,
        recipient_email: impl Into<String>,
    ) -> Self {
        let (mine_name, location) = match site {
            Some(s) => (s.name.clone(), s.location.clone()),
            None => (assessment.mine_id.clone(), String::new()),
        };
        Self {
            mine_id: assessment.mine_id.clone(),
            mine_name,
            location,
            recipient_email: recipient_email.into(),
            probability: assessment.probability,
            level: assessment.level,
            drivers: assessment.drivers(),
            stale_reading: false,
        }
    }
}

/// Errors from a single delivery attempt. Never fatal to the caller.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DeliveryError::Transport(format!("request timed out: {}", err))
        } else {
            DeliveryError::Transport(err.to_string())
        }
    }
}

/// Record of one backend attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub backend: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Result of dispatching one request. Independent of the assessment it came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertOutcome {
    pub delivered: bool,
    pub channel_used: Option<String>,
    pub attempts: Vec<AttemptRecord>,
    /// The policy declined to notify; no backend was tried
    #[serde(default)]
    pub suppressed: bool,
}

impl AlertOutcome {
    pub fn suppressed() -> Self {
        Self {
            suppressed: true,
            ..Self::default()
        }
    }
}
