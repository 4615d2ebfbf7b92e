//! One monitoring pass: reading → assessment → alerts, with best-effort persistence.
//!
//! The assessment and the notification outcomes are reported separately; a
//! failed notification never changes or hides the assessment.

use crate::alert::{AlertDispatcher, AlertOutcome, AlertRequest};
use crate::config::AgentConfig;
use crate::features::{is_stale_at, FeatureStore, SensorReading};
use crate::risk::{RiskAssessment, RiskEngine, RiskLevel};
use crate::storage::{write_blocking, EventSink};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of evaluating one reading
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub assessment: RiskAssessment,
    pub stale: bool,
    /// One entry per recipient, in recipient order
    pub notifications: Vec<AlertOutcome>,
}

impl PipelineReport {
    pub fn any_delivered(&self) -> bool {
        self.notifications.iter().any(|n| n.delivered)
    }
}

pub struct MonitorPipeline {
    config: AgentConfig,
    engine: RiskEngine,
    dispatcher: AlertDispatcher,
    sink: Arc<dyn EventSink>,
    /// Timestamp of the last reading `run_cycle` evaluated, per mine
    evaluated: HashMap<String, DateTime<Utc>>,
}

impl MonitorPipeline {
    pub fn new(config: AgentConfig, dispatcher: AlertDispatcher, sink: Arc<dyn EventSink>) -> Self {
        let engine = RiskEngine::new(config.risk);
        Self {
            config,
            engine,
            dispatcher,
            sink,
            evaluated: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &RiskEngine {
        &self.engine
    }

    pub async fn evaluate(&self, reading: &SensorReading) -> PipelineReport {
        self.evaluate_at(reading, Utc::now()).await
    }

    pub async fn evaluate_at(&self, reading: &SensorReading, now: DateTime<Utc>) -> PipelineReport {
        let assessment = self.engine.assess_at(reading, now);
        let max_age = self.config.max_reading_age_minutes;
        let stale = max_age > 0 && is_stale_at(reading, max_age, now);
        if stale {
            warn!(
                mine_id = %reading.mine_id,
                reading_ts = %reading.timestamp,
                max_age_minutes = max_age,
                "scoring a stale reading"
            );
        }

        let sink = Arc::clone(&self.sink);
        let record = assessment.clone();
        if let Err(e) = write_blocking(move || sink.record_assessment(&record)).await {
            warn!(mine_id = %assessment.mine_id, error = %e, "assessment log write failed");
        }

        if assessment.level >= RiskLevel::High {
            warn!(
                mine_id = %assessment.mine_id,
                probability = assessment.probability,
                level = %assessment.level,
                "elevated risk"
            );
        } else {
            info!(
                mine_id = %assessment.mine_id,
                probability = assessment.probability,
                level = %assessment.level,
                "risk assessed"
            );
        }

        let recipients = self.config.recipients_for(&assessment.mine_id);
        if recipients.is_empty() && self.dispatcher.should_send(assessment.level) {
            warn!(mine_id = %assessment.mine_id, "no alert recipients configured for mine");
        }

        let site = self.config.mine(&assessment.mine_id);
        let mut notifications = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let mut request = AlertRequest::from_assessment(&assessment, site, recipient);
            request.stale_reading = stale;
            notifications.push(self.dispatcher.dispatch(request).await);
        }

        PipelineReport {
            assessment,
            stale,
            notifications,
        }
    }

    /// Evaluate the latest reading of every mine in the store, in mine-id order.
    /// A mine whose latest reading was already evaluated by an earlier cycle is
    /// skipped, so an unchanged readings file raises each alert once.
    pub async fn run_cycle(&mut self, store: &FeatureStore) -> Vec<PipelineReport> {
        let now = Utc::now();
        let mut reports = Vec::new();
        for reading in store.latest_per_mine() {
            if self
                .evaluated
                .get(&reading.mine_id)
                .is_some_and(|last| *last >= reading.timestamp)
            {
                debug!(mine_id = %reading.mine_id, "no new reading since last cycle");
                continue;
            }
            reports.push(self.evaluate_at(reading, now).await);
            self.evaluated.insert(reading.mine_id.clone(), reading.timestamp);
        }
        reports
    }
}
