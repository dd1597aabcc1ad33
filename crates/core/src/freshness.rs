//! Stateful freshness filter for received samples (subscriber only).

use chrono::{DateTime, Duration, Utc};

/// Why a sample was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The sample timestamp is not strictly newer than the last accepted
    /// one.
    OutOfOrder {
        last_accepted: DateTime<Utc>,
    },
    /// The sample is older than the freshness window relative to receipt.
    Expired,
}

/// Rejects stale and out-of-order samples.
///
/// Rejected samples are dropped silently by the session controller and only
/// logged; no error event is surfaced.
#[derive(Debug)]
pub struct FreshnessValidator {
    window: Duration,
    last_accepted: Option<DateTime<Utc>>,
}

impl FreshnessValidator {
    /// Creates a validator with the default 5-minute freshness window.
    pub fn new() -> Self {
        Self::with_window(Duration::minutes(5))
    }

    /// Creates a validator with a custom freshness window.
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    /// Checks a sample timestamp against ordering and the freshness window,
    /// recording it as the new high-water mark when accepted.
    pub fn check(
        &mut self,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), Rejection> {
        if let Some(last_accepted) = self.last_accepted {
            if timestamp <= last_accepted {
                return Err(Rejection::OutOfOrder { last_accepted });
            }
        }
        if now - timestamp > self.window {
            return Err(Rejection::Expired);
        }

        self.last_accepted = Some(timestamp);
        Ok(())
    }

    /// Clears the high-water mark for a fresh session.
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }

    /// Timestamp of the most recently accepted sample, if any.
    pub fn last_accepted(&self) -> Option<DateTime<Utc>> {
        self.last_accepted
    }
}

impl Default for FreshnessValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_samples_at_or_before_the_high_water_mark() {
        let now = Utc::now();
        let t0 = now - Duration::seconds(30);

        let mut validator = FreshnessValidator::new();
        assert!(validator.check(t0, now).is_ok());

        assert_eq!(
            validator.check(t0 - Duration::seconds(1), now),
            Err(Rejection::OutOfOrder { last_accepted: t0 })
        );
        assert_eq!(
            validator.check(t0, now),
            Err(Rejection::OutOfOrder { last_accepted: t0 })
        );
    }

    #[test]
    fn accepts_newer_fresh_sample_and_advances_the_mark() {
        let now = Utc::now();
        let t0 = now - Duration::seconds(30);
        let t1 = t0 + Duration::seconds(1);

        let mut validator = FreshnessValidator::new();
        assert!(validator.check(t0, now).is_ok());
        assert!(validator.check(t1, now).is_ok());
        assert_eq!(validator.last_accepted(), Some(t1));
    }

    #[test]
    fn rejects_samples_outside_the_window_regardless_of_ordering() {
        let now = Utc::now();
        let mut validator = FreshnessValidator::new();
        assert_eq!(
            validator.check(now - Duration::minutes(10), now),
            Err(Rejection::Expired)
        );
        assert_eq!(validator.last_accepted(), None);
    }

    #[test]
    fn reset_clears_the_high_water_mark() {
        let now = Utc::now();
        let mut validator = FreshnessValidator::new();
        validator.check(now, now).unwrap();
        validator.reset();
        assert_eq!(validator.last_accepted(), None);
        // An older-than-previous sample is acceptable again after reset.
        assert!(validator.check(now - Duration::seconds(5), now).is_ok());
    }
}
