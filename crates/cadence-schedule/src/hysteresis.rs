//! Scale-down grace period
//!
//! After a scale action the target is held at its current size for
//! `grace_period` before a further scale-down is allowed. Scale-ups and no-ops
//! always pass through untouched.

use tracing::debug;

use crate::engine::{EngineInput, EngineOutput, Reason, GRACE_PERIOD_WINDOW};

/// Apply the grace-period hold to a raw schedule decision
///
/// While the hold is active the next boundary is pulled in to the hold's
/// expiry when that comes first, so the caller wakes up to release it.
pub fn apply_grace_period(input: &EngineInput, decision: EngineOutput) -> EngineOutput {
    if input.grace_period <= chrono::TimeDelta::zero()
        || decision.effective_replicas >= input.current_replicas
    {
        return decision;
    }

    let Some(last_scale) = input.last_scale_time else {
        return decision;
    };

    let expiry = last_scale + input.grace_period;
    if input.now >= expiry {
        return decision;
    }

    debug!(
        current = input.current_replicas,
        computed = decision.effective_replicas,
        %expiry,
        "holding scale-down during grace period"
    );
    EngineOutput {
        effective_replicas: input.current_replicas,
        next_boundary: decision.next_boundary.min(expiry),
        window: GRACE_PERIOD_WINDOW.to_string(),
        reason: Reason::GracePeriodActive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 18, 0, 0).unwrap()
    }

    fn scale_down_to_one() -> EngineOutput {
        EngineOutput {
            effective_replicas: 1,
            next_boundary: Utc.with_ymd_and_hms(2025, 3, 11, 0, 0, 0).unwrap(),
            window: "Default".to_string(),
            reason: Reason::NoMatchingWindow,
        }
    }

    fn input(last_scale_ago: Option<i64>, current: i32, grace_secs: i64) -> EngineInput {
        EngineInput::new(now(), "UTC").with_grace_period(
            TimeDelta::seconds(grace_secs),
            last_scale_ago.map(|s| now() - TimeDelta::seconds(s)),
            current,
        )
    }

    #[test]
    fn holds_scale_down_inside_grace_period() {
        let out = apply_grace_period(&input(Some(120), 5, 300), scale_down_to_one());
        assert_eq!(out.effective_replicas, 5);
        assert_eq!(out.window, GRACE_PERIOD_WINDOW);
        assert_eq!(out.reason, Reason::GracePeriodActive);
        // expiry: 18:00 - 120s + 300s
        assert_eq!(out.next_boundary, now() + TimeDelta::seconds(180));
    }

    #[test]
    fn releases_after_grace_period() {
        let out = apply_grace_period(&input(Some(400), 5, 300), scale_down_to_one());
        assert_eq!(out, scale_down_to_one());
    }

    #[test]
    fn releases_exactly_at_expiry() {
        let out = apply_grace_period(&input(Some(300), 5, 300), scale_down_to_one());
        assert_eq!(out, scale_down_to_one());
    }

    #[test]
    fn never_blocks_scale_up_or_no_op() {
        let out = apply_grace_period(&input(Some(10), 1, 300), scale_down_to_one());
        assert_eq!(out, scale_down_to_one());

        let mut up = scale_down_to_one();
        up.effective_replicas = 5;
        let out = apply_grace_period(&input(Some(10), 1, 300), up.clone());
        assert_eq!(out, up);
    }

    #[test]
    fn needs_a_known_last_scale() {
        let out = apply_grace_period(&input(None, 5, 300), scale_down_to_one());
        assert_eq!(out, scale_down_to_one());
    }

    #[test]
    fn zero_grace_period_disables_hold() {
        let out = apply_grace_period(&input(Some(1), 5, 0), scale_down_to_one());
        assert_eq!(out, scale_down_to_one());
    }

    #[test]
    fn keeps_earlier_raw_boundary() {
        let mut decision = scale_down_to_one();
        decision.next_boundary = now() + TimeDelta::seconds(60);
        let out = apply_grace_period(&input(Some(120), 5, 300), decision);
        assert_eq!(out.next_boundary, now() + TimeDelta::seconds(60));
    }
}
