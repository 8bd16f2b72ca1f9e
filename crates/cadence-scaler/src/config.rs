//! Controller timing configuration

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Requeue and backoff settings for the scaler controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScalerConfig {
    /// How long before a boundary the controller wakes up
    pub lead_time: Duration,
    /// Floor for every boundary-driven requeue
    pub min_requeue: Duration,
    /// Retry delay for invalid configuration and transient failures
    pub error_backoff: Duration,
    /// Retry delay for requests the API server rejected (forbidden, invalid)
    pub non_retryable_backoff: Duration,
    /// Re-check delay while the target Deployment is missing
    pub target_missing_backoff: Duration,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            lead_time: Duration::from_secs(10),
            min_requeue: Duration::from_secs(30),
            error_backoff: Duration::from_secs(30),
            non_retryable_backoff: Duration::from_secs(300),
            target_missing_backoff: Duration::from_secs(300),
        }
    }
}

impl ScalerConfig {
    /// Delay until the next evaluation for a decision that changes at `next_boundary`
    ///
    /// `next_boundary - now - lead_time`, never below `min_requeue`. A boundary
    /// in the past (clock skew) also yields the floor.
    pub fn requeue_after(&self, next_boundary: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        (next_boundary - now)
            .to_std()
            .ok()
            .and_then(|until| until.checked_sub(self.lead_time))
            .map_or(self.min_requeue, |delay| delay.max(self.min_requeue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap()
    }

    #[test]
    fn defaults() {
        let config = ScalerConfig::default();
        assert_eq!(config.lead_time, Duration::from_secs(10));
        assert_eq!(config.min_requeue, Duration::from_secs(30));
        assert_eq!(config.error_backoff, Duration::from_secs(30));
        assert_eq!(config.non_retryable_backoff, Duration::from_secs(300));
        assert_eq!(config.target_missing_backoff, Duration::from_secs(300));
    }

    #[test]
    fn wakes_up_lead_time_before_boundary() {
        let config = ScalerConfig::default();
        let boundary = now() + TimeDelta::hours(7);
        assert_eq!(
            config.requeue_after(boundary, now()),
            Duration::from_secs(7 * 3600 - 10)
        );
    }

    #[test]
    fn imminent_boundary_hits_the_floor() {
        let config = ScalerConfig::default();
        assert_eq!(
            config.requeue_after(now() + TimeDelta::seconds(25), now()),
            Duration::from_secs(30)
        );
        assert_eq!(
            config.requeue_after(now() + TimeDelta::seconds(5), now()),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn past_boundary_hits_the_floor() {
        let config = ScalerConfig::default();
        assert_eq!(
            config.requeue_after(now() - TimeDelta::minutes(1), now()),
            Duration::from_secs(30)
        );
    }
}
