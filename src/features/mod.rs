//! Sensor readings, the fixed seven-feature layout, and normalization into a model-free feature vector.

mod normalize;
mod source;
mod staleness;

pub use normalize::normalize;
pub use source::{
    load_readings, parse_csv, parse_json_rows, FeatureStore, ParsedReadings, DEFAULT_HISTORY_LIMIT,
};
pub use staleness::{is_stale, is_stale_at};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const FEATURE_COUNT: usize = 7;

/// The seven monitored quantities, in scoring order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Displacement,
    Strain,
    PorePressure,
    Rainfall,
    Temperature,
    Slope,
    CrackScore,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::Displacement,
        Feature::Strain,
        Feature::PorePressure,
        Feature::Rainfall,
        Feature::Temperature,
        Feature::Slope,
        Feature::CrackScore,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Feature::Displacement => "displacement",
            Feature::Strain => "strain",
            Feature::PorePressure => "pore_pressure",
            Feature::Rainfall => "rainfall",
            Feature::Temperature => "temperature",
            Feature::Slope => "slope",
            Feature::CrackScore => "crack_score",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Feature::Displacement => "mm",
            Feature::Strain => "µε",
            Feature::PorePressure => "kPa",
            Feature::Rainfall => "mm",
            Feature::Temperature => "°C",
            Feature::Slope => "°",
            Feature::CrackScore => "/10",
        }
    }

    /// Domain ceiling used as the min-max divisor. Readings at or above it normalize to 1.
    pub fn ceiling(self) -> f64 {
        match self {
            Feature::Displacement => 20.0,
            Feature::Strain => 500.0,
            Feature::PorePressure => 100.0,
            Feature::Rainfall => 100.0,
            Feature::Temperature => 50.0,
            Feature::Slope => 90.0,
            Feature::CrackScore => 10.0,
        }
    }
}

/// One timestamped observation for one mine. Identity is `(mine_id, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub mine_id: String,
    pub displacement_mm: f64,
    pub strain_microstrain: f64,
    pub pore_pressure_kpa: f64,
    pub rainfall_mm: f64,
    pub temperature_c: f64,
    pub slope_deg: f64,
    /// 0..10 visual crack severity
    pub crack_score: f64,
    pub timestamp: DateTime<Utc>,
}

impl SensorReading {
    /// All-zero reading; the convention for a mine with no usable data.
    pub fn zeroed(mine_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            mine_id: mine_id.into(),
            displacement_mm: 0.0,
            strain_microstrain: 0.0,
            pore_pressure_kpa: 0.0,
            rainfall_mm: 0.0,
            temperature_c: 0.0,
            slope_deg: 0.0,
            crack_score: 0.0,
            timestamp,
        }
    }

    pub fn value(&self, feature: Feature) -> f64 {
        match feature {
            Feature::Displacement => self.displacement_mm,
            Feature::Strain => self.strain_microstrain,
            Feature::PorePressure => self.pore_pressure_kpa,
            Feature::Rainfall => self.rainfall_mm,
            Feature::Temperature => self.temperature_c,
            Feature::Slope => self.slope_deg,
            Feature::CrackScore => self.crack_score,
        }
    }

    fn slot(&mut self, feature: Feature) -> &mut f64 {
        match feature {
            Feature::Displacement => &mut self.displacement_mm,
            Feature::Strain => &mut self.strain_microstrain,
            Feature::PorePressure => &mut self.pore_pressure_kpa,
            Feature::Rainfall => &mut self.rainfall_mm,
            Feature::Temperature => &mut self.temperature_c,
            Feature::Slope => &mut self.slope_deg,
            Feature::CrackScore => &mut self.crack_score,
        }
    }

    pub fn with(mut self, feature: Feature, value: f64) -> Self {
        *self.slot(feature) = value;
        self
    }
}

/// Normalized features in [0, 1], indexed by [`Feature::index`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: [f64; FEATURE_COUNT],
    pub mine_id: String,
    pub ts: DateTime<Utc>,
}

impl FeatureVector {
    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}
