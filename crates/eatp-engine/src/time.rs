//! Time utilities for the EATP engine.
//!
//! All timestamps are Unix epoch microseconds (u64). Expiry is always
//! evaluated lazily against the caller-supplied "now", never precomputed.

/// Return the current time as microseconds since Unix epoch.
pub fn now_micros() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_micros() as u64
}

/// Convert microseconds to an RFC 3339 string.
pub fn micros_to_rfc3339(micros: u64) -> String {
    let secs = (micros / 1_000_000) as i64;
    let nsecs = ((micros % 1_000_000) * 1000) as u32;
    let dt = chrono::DateTime::from_timestamp(secs, nsecs).unwrap_or(chrono::DateTime::UNIX_EPOCH);
    dt.to_rfc3339()
}

/// UTC hour-of-day (0..=23) for a microsecond timestamp.
pub fn utc_hour(micros: u64) -> u8 {
    use chrono::Timelike;
    let secs = (micros / 1_000_000) as i64;
    let dt = chrono::DateTime::from_timestamp(secs, 0).unwrap_or(chrono::DateTime::UNIX_EPOCH);
    dt.hour() as u8
}

/// Minimum of two optional expiries, treating `None` as unbounded.
pub fn min_expiry(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(y),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_micros_monotonic_enough() {
        let a = now_micros();
        let b = now_micros();
        assert!(b >= a);
    }

    #[test]
    fn test_micros_to_rfc3339() {
        // 2021-01-01T00:00:00Z
        let s = micros_to_rfc3339(1_609_459_200_000_000);
        assert!(s.starts_with("2021-01-01T00:00:00"));
    }

    #[test]
    fn test_utc_hour() {
        // 2021-01-01T13:30:00Z
        let micros = (1_609_459_200 + 13 * 3600 + 30 * 60) as u64 * 1_000_000;
        assert_eq!(utc_hour(micros), 13);
    }

    #[test]
    fn test_min_expiry() {
        assert_eq!(min_expiry(Some(5), Some(3)), Some(3));
        assert_eq!(min_expiry(Some(5), None), Some(5));
        assert_eq!(min_expiry(None, Some(7)), Some(7));
        assert_eq!(min_expiry(None, None), None);
    }
}
