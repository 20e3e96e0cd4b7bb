//! Time types for Quarry.
//!
//! Wall clock time is only used for audit metadata, never for execution logic.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Format of audit-trail timestamps
pub const AUDIT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Wall clock timestamp in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Get current timestamp
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wrap an existing UTC time
    #[must_use]
    pub const fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Get as chrono value
    #[must_use]
    pub const fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Time elapsed since an earlier timestamp
    #[must_use]
    pub fn duration_since(&self, earlier: &Timestamp) -> TimeDelta {
        self.0 - earlier.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(AUDIT_TIME_FORMAT))
    }
}

/// Render a duration as `H:MM:SS.micros`
#[must_use]
pub fn format_elapsed(elapsed: TimeDelta) -> String {
    let micros = elapsed.num_microseconds().unwrap_or(i64::MAX).max(0);
    let secs = micros / 1_000_000;
    format!(
        "{}:{:02}:{:02}.{:06}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        micros % 1_000_000
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_display() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(Timestamp::from_datetime(at).to_string(), "2024-03-09T07:05:01Z");
    }

    #[test]
    fn test_duration_since() {
        let a = Timestamp::from_datetime(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let b = Timestamp::from_datetime(Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 30).unwrap());
        assert_eq!(b.duration_since(&a), TimeDelta::seconds(90));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(TimeDelta::milliseconds(1500)), "0:00:01.500000");
        assert_eq!(format_elapsed(TimeDelta::seconds(3725)), "1:02:05.000000");
        assert_eq!(format_elapsed(TimeDelta::seconds(-3)), "0:00:00.000000");
    }
}
