//! In-process sinks.

use super::EventSink;
use crate::alert::{AlertOutcome, AlertRequest};
use crate::error::Result;
use crate::risk::RiskAssessment;
use std::sync::Mutex;

/// Discards everything. Used when the local store is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record_assessment(&self, _assessment: &RiskAssessment) -> Result<()> {
        Ok(())
    }

    fn record_alert(&self, _request: &AlertRequest, _outcome: &AlertOutcome) -> Result<()> {
        Ok(())
    }
}

/// Keeps records in memory; handy for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    assessments: Mutex<Vec<RiskAssessment>>,
    alerts: Mutex<Vec<(AlertRequest, AlertOutcome)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assessments(&self) -> Vec<RiskAssessment> {
        self.assessments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn alerts(&self) -> Vec<(AlertRequest, AlertOutcome)> {
        self.alerts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl EventSink for MemorySink {
    fn record_assessment(&self, assessment: &RiskAssessment) -> Result<()> {
        self.assessments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(assessment.clone());
        Ok(())
    }

    fn record_alert(&self, request: &AlertRequest, outcome: &AlertOutcome) -> Result<()> {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((request.clone(), outcome.clone()));
        Ok(())
    }
}
