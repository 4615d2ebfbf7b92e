//! Weighted sum of normalized sensor features → risk probability in [0, 1].

use crate::features::{normalize, Feature, FeatureVector, SensorReading, FEATURE_COUNT};

/// Fixed feature weights. They sum to 1.0, so a fully saturated reading scores 1.0.
pub fn weight(feature: Feature) -> f64 {
    match feature {
        Feature::Displacement => 0.25,
        Feature::Strain => 0.20,
        Feature::PorePressure => 0.15,
        Feature::Rainfall => 0.15,
        Feature::Temperature => 0.10,
        Feature::Slope => 0.10,
        Feature::CrackScore => 0.05,
    }
}

/// Per-feature weighted terms of the score, indexed by [`Feature::index`].
pub fn contributions(fv: &FeatureVector) -> [f64; FEATURE_COUNT] {
    let mut out = [0.0; FEATURE_COUNT];
    for feature in Feature::ALL {
        out[feature.index()] = weight(feature) * fv.get(feature);
    }
    out
}

pub fn score_vector(fv: &FeatureVector) -> f64 {
    contributions(fv).iter().sum::<f64>().clamp(0.0, 1.0)
}

/// Risk probability of a reading. Pure; never fails.
pub fn score(reading: &SensorReading) -> f64 {
    score_vector(&normalize(reading))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn zero() -> SensorReading {
        SensorReading::zeroed("M1", Utc::now())
    }

    fn at_ceiling() -> SensorReading {
        Feature::ALL
            .iter()
            .fold(zero(), |r, f| r.with(*f, f.ceiling()))
    }

    #[test]
    fn weights_sum_to_one() {
        let total: f64 = Feature::ALL.iter().map(|f| weight(*f)).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_reading_scores_zero() {
        assert_eq!(score(&zero()), 0.0);
    }

    #[test]
    fn ceiling_reading_scores_one() {
        assert!((score(&at_ceiling()) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn reference_reading() {
        let r = zero()
            .with(Feature::Displacement, 15.0)
            .with(Feature::Strain, 400.0)
            .with(Feature::PorePressure, 80.0)
            .with(Feature::Rainfall, 90.0)
            .with(Feature::Temperature, 38.0)
            .with(Feature::Slope, 70.0)
            .with(Feature::CrackScore, 8.0);
        let expected = 0.25 * 0.75
            + 0.20 * 0.80
            + 0.15 * 0.80
            + 0.15 * 0.90
            + 0.10 * 0.76
            + 0.10 * (70.0 / 90.0)
            + 0.05 * 0.8;
        assert!((score(&r) - expected).abs() < 1e-12);
        assert!((score(&r) - 0.7963).abs() < 1e-3);
    }

    #[test]
    fn score_stays_in_unit_interval_for_extreme_inputs() {
        let values = [-1e9, -1.0, 0.0, 0.5, 7.0, 1e3, 1e12, f64::NAN, f64::INFINITY, f64::NEG_INFINITY];
        for feature in Feature::ALL {
            for v in values {
                let p = score(&at_ceiling().with(feature, v));
                assert!((0.0..=1.0).contains(&p), "{feature:?}={v} gave {p}");
                let p = score(&zero().with(feature, v));
                assert!((0.0..=1.0).contains(&p), "{feature:?}={v} gave {p}");
            }
        }
    }

    #[test]
    fn score_is_monotone_in_each_feature() {
        let base = zero()
            .with(Feature::Displacement, 5.0)
            .with(Feature::Strain, 100.0)
            .with(Feature::Rainfall, 30.0);
        for feature in Feature::ALL {
            let ceiling = feature.ceiling();
            let mut previous = f64::NEG_INFINITY;
            for step in 0..=30 {
                let v = -0.2 * ceiling + step as f64 * (ceiling * 1.5 / 30.0);
                let p = score(&base.clone().with(feature, v));
                assert!(p >= previous, "{feature:?} decreased at {v}");
                previous = p;
            }
        }
    }

    #[test]
    fn contributions_add_up_to_score() {
        let r = zero().with(Feature::Slope, 45.0).with(Feature::CrackScore, 3.0);
        let fv = normalize(&r);
        let sum: f64 = contributions(&fv).iter().sum();
        assert!((sum - score(&r)).abs() < 1e-12);
        assert!((contributions(&fv)[Feature::Slope.index()] - 0.05).abs() < 1e-12);
    }
}
