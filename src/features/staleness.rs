//! Reading staleness detection.
//!
//! A sensor outage is not obvious from the readings themselves; the last
//! value simply stops changing. Scoring a stale reading is still allowed, but
//! the report flags it.
//!
//! Functions take `now` explicitly so tests stay deterministic.

use super::SensorReading;
use chrono::{DateTime, Utc};

/// Returns `true` if the reading is older than `max_age_minutes` relative to `now`.
///
/// Strictly greater than the threshold:
///   age > max_age_minutes  →  stale
///   age == max_age_minutes →  not stale
///
/// Age is compared at millisecond precision, so 15m59s is stale under a
/// 15-minute limit. Readings stamped in the future are never stale.
pub fn is_stale_at(reading: &SensorReading, max_age_minutes: u64, now: DateTime<Utc>) -> bool {
    let age_ms = (now - reading.timestamp).num_milliseconds();
    age_ms > 0 && age_ms as u64 > max_age_minutes.saturating_mul(60_000)
}

/// Convenience wrapper that uses the real current time.
pub fn is_stale(reading: &SensorReading, max_age_minutes: u64) -> bool {
    is_stale_at(reading, max_age_minutes, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
    }

    fn reading_at(h: u32, m: u32) -> SensorReading {
        SensorReading::zeroed("M1", Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap())
    }

    #[test]
    fn reading_within_threshold_is_fresh() {
        assert!(!is_stale_at(&reading_at(12, 55), 15, fixed_now()));
    }

    #[test]
    fn reading_exactly_at_threshold_is_fresh() {
        assert!(!is_stale_at(&reading_at(12, 45), 15, fixed_now()));
    }

    #[test]
    fn reading_one_minute_past_threshold_is_stale() {
        assert!(is_stale_at(&reading_at(12, 44), 15, fixed_now()));
    }

    #[test]
    fn partial_minute_past_threshold_is_stale() {
        let r = SensorReading::zeroed("M1", Utc.with_ymd_and_hms(2024, 5, 1, 12, 44, 1).unwrap());
        assert!(is_stale_at(&r, 15, fixed_now()));
        assert!(!is_stale_at(&r, u64::MAX, fixed_now()));
    }

    #[test]
    fn future_reading_is_fresh() {
        assert!(!is_stale_at(&reading_at(14, 0), 0, fixed_now()));
    }
}
