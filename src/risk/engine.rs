//! Maps a risk probability to a level using configurable thresholds; produces assessments.

use super::score::{contributions, score_vector};
use crate::config::RiskConfig;
use crate::features::{normalize, Feature, SensorReading, FEATURE_COUNT};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Lower bounds are inclusive: `p >= critical_threshold` is critical.
    /// NaN classifies as low; infinities clamp to the nearest bound.
    pub fn from_probability(probability: f64, config: &RiskConfig) -> Self {
        let p = clamp_probability(probability);
        if p >= config.critical_threshold {
            RiskLevel::Critical
        } else if p >= config.high_threshold {
            RiskLevel::High
        } else if p >= config.medium_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(format!("unknown risk level: {}", other)),
        }
    }
}

/// Classify with the default threshold table (0.4 / 0.6 / 0.8).
pub fn classify(probability: f64) -> RiskLevel {
    RiskLevel::from_probability(probability, &RiskConfig::default())
}

fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

/// Risk assessment for one reading. Created fresh per call, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub mine_id: String,
    pub probability: f64,
    pub level: RiskLevel,
    pub computed_at: DateTime<Utc>,
    /// Timestamp of the reading this was computed from
    pub reading_ts: DateTime<Utc>,
    /// Weighted per-feature terms; they sum to `probability`
    pub contributions: [f64; FEATURE_COUNT],
}

impl RiskAssessment {
    /// Features ordered by their share of the probability, largest first; zero terms omitted.
    pub fn drivers(&self) -> Vec<(Feature, f64)> {
        let mut out: Vec<(Feature, f64)> = Feature::ALL
            .iter()
            .map(|f| (*f, self.contributions[f.index()]))
            .filter(|(_, c)| *c > 0.0)
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1));
        out
    }
}

pub struct RiskEngine {
    config: RiskConfig,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn assess(&self, reading: &SensorReading) -> RiskAssessment {
        self.assess_at(reading, Utc::now())
    }

    pub fn assess_at(&self, reading: &SensorReading, now: DateTime<Utc>) -> RiskAssessment {
        let fv = normalize(reading);
        let probability = score_vector(&fv);
        RiskAssessment {
            mine_id: reading.mine_id.clone(),
            probability,
            level: self.classify(probability),
            computed_at: now,
            reading_ts: reading.timestamp,
            contributions: contributions(&fv),
        }
    }

    pub fn classify(&self, probability: f64) -> RiskLevel {
        RiskLevel::from_probability(probability, &self.config)
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_are_inclusive() {
        assert_eq!(classify(0.8), RiskLevel::Critical);
        assert_eq!(classify(0.7999), RiskLevel::High);
        assert_eq!(classify(0.6), RiskLevel::High);
        assert_eq!(classify(0.5999), RiskLevel::Medium);
        assert_eq!(classify(0.4), RiskLevel::Medium);
        assert_eq!(classify(0.3999), RiskLevel::Low);
        assert_eq!(classify(0.0), RiskLevel::Low);
        assert_eq!(classify(1.0), RiskLevel::Critical);
    }

    #[test]
    fn classification_is_total_and_ordered() {
        let mut previous = RiskLevel::Low;
        for i in 0..=10_000 {
            let level = classify(i as f64 / 10_000.0);
            assert!(level >= previous, "level dropped at {}", i);
            previous = level;
        }
        assert_eq!(previous, RiskLevel::Critical);
    }

    #[test]
    fn out_of_range_probabilities_are_clamped() {
        assert_eq!(classify(-3.0), RiskLevel::Low);
        assert_eq!(classify(7.5), RiskLevel::Critical);
        assert_eq!(classify(f64::NAN), RiskLevel::Low);
        assert_eq!(classify(f64::INFINITY), RiskLevel::Critical);
    }

    #[test]
    fn custom_thresholds_respected() {
        let engine = RiskEngine::new(RiskConfig {
            medium_threshold: 0.2,
            high_threshold: 0.3,
            critical_threshold: 0.5,
        });
        assert_eq!(engine.classify(0.25), RiskLevel::Medium);
        assert_eq!(engine.classify(0.5), RiskLevel::Critical);
    }

    #[test]
    fn assessment_drivers_sorted_by_share() {
        let engine = RiskEngine::new(RiskConfig::default());
        let reading = SensorReading::zeroed("M7", Utc::now())
            .with(Feature::Rainfall, 100.0)
            .with(Feature::Displacement, 4.0);
        let a = engine.assess(&reading);
        let drivers = a.drivers();
        assert_eq!(drivers.len(), 2);
        assert_eq!(drivers[0].0, Feature::Rainfall);
        assert!((drivers[0].1 - 0.15).abs() < 1e-12);
        assert_eq!(a.level, RiskLevel::Low);
        assert_eq!(a.mine_id, "M7");
    }
}
