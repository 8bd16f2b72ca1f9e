//! Error types for the scheduling engine

use thiserror::Error;

/// Errors produced while resolving a schedule
///
/// All variants describe a configuration problem: they are resolved by
/// editing the scaler spec, never by retrying.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// The timezone is not a known IANA name
    #[error("invalid timezone {name}: {reason}")]
    InvalidTimezone {
        /// The timezone string as configured
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// A window time-of-day is not a valid `HH:MM`
    #[error("invalid time {value:?}: {reason}")]
    InvalidTime {
        /// The offending string
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// A replica count is negative
    #[error("invalid replicas {replicas} for {subject}: must be >= 0")]
    InvalidReplicas {
        /// What the count belongs to (a window label or "defaultReplicas")
        subject: String,
        /// The offending count
        replicas: i32,
    },

    /// Calendar arithmetic left chrono's representable range
    #[error("date out of range while computing {context}")]
    OutOfRange {
        /// The computation that overflowed
        context: &'static str,
    },
}

impl ScheduleError {
    pub(crate) fn invalid_time(value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTime {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value() {
        let err = ScheduleError::invalid_time("25:00", "hour must be 0-23");
        assert_eq!(err.to_string(), "invalid time \"25:00\": hour must be 0-23");

        let err = ScheduleError::InvalidTimezone {
            name: "Mars/Olympus".to_string(),
            reason: "unknown zone".to_string(),
        };
        assert!(err.to_string().contains("Mars/Olympus"));

        let err = ScheduleError::InvalidReplicas {
            subject: "peak".to_string(),
            replicas: -2,
        };
        assert!(err.to_string().contains("peak"));
        assert!(err.to_string().contains("-2"));
    }
}
