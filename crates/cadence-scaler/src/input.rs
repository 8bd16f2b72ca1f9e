//! Engine input assembly
//!
//! Turns a TimeWindowScaler, the live target replica count and the holiday
//! lookup into the engine's [`EngineInput`].

use chrono::{DateTime, Utc};
use tracing::debug;

use cadence_common::crd::TimeWindowScaler;
use cadence_common::Error;
use cadence_schedule::{local_date_key, parse_timezone, EngineInput};

use crate::client::ScalerKubeClient;

/// Result of checking the holiday ConfigMap for one cycle
#[derive(Debug)]
pub enum HolidayLookup {
    /// No `holidayConfigMap` set, or no valid timezone to date the lookup
    NotConfigured,
    /// The lookup ran; `true` when today's date is listed
    Checked(bool),
    /// The ConfigMap read failed; holiday handling is skipped this cycle
    Failed(Error),
}

impl HolidayLookup {
    /// Holiday flag for the engine; failures count as ordinary days
    pub fn is_holiday(&self) -> bool {
        matches!(self, Self::Checked(true))
    }

    /// Value for `status.holiday`; a failed check keeps the previous value
    pub fn holiday_flag(&self, previous: bool) -> bool {
        match self {
            Self::Failed(_) => previous,
            other => other.is_holiday(),
        }
    }
}

/// Check whether the scaler's local date is listed in its holiday ConfigMap
///
/// The ConfigMap is read from the scaler's own namespace. A missing ConfigMap
/// means "not a holiday".
pub async fn lookup_holiday(
    kube: &dyn ScalerKubeClient,
    scaler: &TimeWindowScaler,
    namespace: &str,
    now: DateTime<Utc>,
) -> HolidayLookup {
    let Some(config_map) = scaler
        .spec
        .holiday_config_map
        .as_deref()
        .filter(|name| !name.is_empty())
    else {
        return HolidayLookup::NotConfigured;
    };

    // An invalid timezone is reported by the engine
    let Ok(tz) = parse_timezone(&scaler.spec.timezone) else {
        return HolidayLookup::NotConfigured;
    };
    let today = local_date_key(&now.with_timezone(&tz));

    match kube.get_holiday_dates(config_map, namespace).await {
        Ok(Some(dates)) => HolidayLookup::Checked(dates.contains(&today)),
        Ok(None) => {
            debug!(config_map, "holiday ConfigMap not found, treating as ordinary day");
            HolidayLookup::Checked(false)
        }
        Err(e) => HolidayLookup::Failed(e),
    }
}

/// Build the engine input for one evaluation
pub fn build_engine_input(
    scaler: &TimeWindowScaler,
    now: DateTime<Utc>,
    is_holiday: bool,
    current_replicas: i32,
) -> EngineInput {
    let spec = &scaler.spec;
    let last_scale_time = scaler.status.as_ref().and_then(|s| s.last_scale_time);

    EngineInput::new(now, spec.timezone.clone())
        .with_windows(spec.window_specs())
        .with_default_replicas(spec.default_replicas)
        .with_holiday(spec.holiday_mode.into(), is_holiday)
        .with_pause(spec.pause)
        .with_grace_period(spec.grace_period(), last_scale_time, current_replicas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use cadence_common::crd::{
        HolidayMode, TargetRef, TimeWindow, TimeWindowScalerSpec, TimeWindowScalerStatus,
    };
    use chrono::{TimeDelta, TimeZone};

    use crate::client::MockScalerKubeClient;

    fn scaler(timezone: &str, holiday_config_map: Option<&str>) -> TimeWindowScaler {
        TimeWindowScaler::new(
            "web-hours",
            TimeWindowScalerSpec {
                target_ref: TargetRef {
                    name: "web".to_string(),
                    namespace: None,
                },
                default_replicas: 2,
                timezone: timezone.to_string(),
                windows: vec![TimeWindow {
                    start: "09:00".to_string(),
                    end: "17:00".to_string(),
                    replicas: 5,
                    ..Default::default()
                }],
                holiday_mode: HolidayMode::TreatAsClosed,
                holiday_config_map: holiday_config_map.map(String::from),
                grace_period_seconds: 120,
                pause: true,
            },
        )
    }

    // 2025-03-10 02:00 UTC is still 2025-03-09 in New York
    fn late_evening_in_new_york() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 2, 0, 0).unwrap()
    }

    fn dates(keys: &[&str]) -> Option<BTreeSet<String>> {
        Some(keys.iter().map(|k| k.to_string()).collect())
    }

    #[test]
    fn input_carries_spec_and_status() {
        let mut s = scaler("UTC", None);
        let last = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        s.status = Some(TimeWindowScalerStatus {
            last_scale_time: Some(last),
            ..Default::default()
        });

        let now = last + TimeDelta::minutes(1);
        let input = build_engine_input(&s, now, true, 4);

        assert_eq!(input.now, now);
        assert_eq!(input.timezone, "UTC");
        assert_eq!(input.windows.len(), 1);
        assert_eq!(input.default_replicas, 2);
        assert_eq!(input.holiday_mode, cadence_schedule::HolidayMode::TreatAsClosed);
        assert!(input.is_holiday);
        assert!(input.pause);
        assert_eq!(input.grace_period, TimeDelta::seconds(120));
        assert_eq!(input.last_scale_time, Some(last));
        assert_eq!(input.current_replicas, 4);
    }

    #[tokio::test]
    async fn no_config_map_skips_lookup() {
        let mut mock = MockScalerKubeClient::new();
        mock.expect_get_holiday_dates().never();
        let lookup = lookup_holiday(&mock, &scaler("UTC", None), "shop", late_evening_in_new_york()).await;
        assert!(matches!(lookup, HolidayLookup::NotConfigured));
    }

    #[tokio::test]
    async fn date_key_uses_local_calendar_day() {
        let mut mock = MockScalerKubeClient::new();
        mock.expect_get_holiday_dates().returning(|name, ns| {
            assert_eq!((name, ns), ("holidays", "shop"));
            Ok(dates(&["2025-03-09"]))
        });
        let lookup = lookup_holiday(
            &mock,
            &scaler("America/New_York", Some("holidays")),
            "shop",
            late_evening_in_new_york(),
        )
        .await;
        assert!(lookup.is_holiday());
    }

    #[tokio::test]
    async fn utc_date_differs_from_local_date() {
        let mut mock = MockScalerKubeClient::new();
        mock.expect_get_holiday_dates()
            .returning(|_, _| Ok(dates(&["2025-03-09"])));
        let lookup =
            lookup_holiday(&mock, &scaler("UTC", Some("holidays")), "shop", late_evening_in_new_york()).await;
        assert!(matches!(lookup, HolidayLookup::Checked(false)));
    }

    #[tokio::test]
    async fn missing_config_map_is_not_a_holiday() {
        let mut mock = MockScalerKubeClient::new();
        mock.expect_get_holiday_dates().returning(|_, _| Ok(None));
        let lookup =
            lookup_holiday(&mock, &scaler("UTC", Some("holidays")), "shop", late_evening_in_new_york()).await;
        assert!(matches!(lookup, HolidayLookup::Checked(false)));
    }

    #[tokio::test]
    async fn read_failure_is_reported_not_a_holiday() {
        let mut mock = MockScalerKubeClient::new();
        mock.expect_get_holiday_dates()
            .returning(|_, _| Err(Error::remote("connection reset", true)));
        let lookup =
            lookup_holiday(&mock, &scaler("UTC", Some("holidays")), "shop", late_evening_in_new_york()).await;
        assert!(matches!(lookup, HolidayLookup::Failed(_)));
        assert!(!lookup.is_holiday());
    }

    #[test]
    fn holiday_flag_survives_a_failed_check() {
        let failed = HolidayLookup::Failed(Error::remote("connection reset", true));
        assert!(failed.holiday_flag(true));
        assert!(!failed.holiday_flag(false));
        assert!(!HolidayLookup::Checked(false).holiday_flag(true));
        assert!(HolidayLookup::Checked(true).holiday_flag(false));
        assert!(!HolidayLookup::NotConfigured.holiday_flag(true));
    }

    #[tokio::test]
    async fn invalid_timezone_skips_lookup() {
        let mut mock = MockScalerKubeClient::new();
        mock.expect_get_holiday_dates().never();
        let lookup = lookup_holiday(
            &mock,
            &scaler("Mars/Olympus", Some("holidays")),
            "shop",
            late_evening_in_new_york(),
        )
        .await;
        assert!(matches!(lookup, HolidayLookup::NotConfigured));
    }
}
