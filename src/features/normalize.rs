//! Min-max normalization of raw readings against fixed domain ceilings.

use super::{Feature, FeatureVector, SensorReading, FEATURE_COUNT};

/// Scale a single raw value into [0, 1]. `+inf` saturates like any value past
/// the ceiling; NaN and `-inf` count as zero.
fn unit_interval(raw: f64, ceiling: f64) -> f64 {
    if raw.is_nan() {
        return 0.0;
    }
    (raw / ceiling).clamp(0.0, 1.0)
}

pub fn normalize(reading: &SensorReading) -> FeatureVector {
    let mut values = [0.0f64; FEATURE_COUNT];
    for feature in Feature::ALL {
        values[feature.index()] = unit_interval(reading.value(feature), feature.ceiling());
    }
    FeatureVector {
        values,
        mine_id: reading.mine_id.clone(),
        ts: reading.timestamp,
    }
}
