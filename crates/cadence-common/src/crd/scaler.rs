//! TimeWindowScaler CRD
//!
//! A TimeWindowScaler drives one Deployment's replica count from a schedule of
//! local time-of-day windows, with optional holiday overrides and a
//! scale-down grace period.

use cadence_schedule::{TimeOfDay, WindowSpec};
use chrono::{DateTime, TimeDelta, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{find_condition, set_condition, Condition, READY_CONDITION};
use crate::Error;

/// Upper bound for `gracePeriodSeconds`
pub const MAX_GRACE_PERIOD_SECONDS: i32 = 3600;

/// TimeWindowScaler scales a Deployment on a time-of-day schedule.
///
/// Example:
/// ```yaml
/// apiVersion: cadence.dev/v1alpha1
/// kind: TimeWindowScaler
/// metadata:
///   name: web-business-hours
///   namespace: shop
/// spec:
///   targetRef:
///     name: web
///   defaultReplicas: 1
///   timezone: America/New_York
///   windows:
///     - name: BusinessHours
///       start: "09:00"
///       end: "17:00"
///       replicas: 5
///       days: [Monday, Tuesday, Wednesday, Thursday, Friday]
///   holidayMode: treat-as-closed
///   holidayConfigMap: us-holidays
///   gracePeriodSeconds: 300
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "cadence.dev",
    version = "v1alpha1",
    kind = "TimeWindowScaler",
    plural = "timewindowscalers",
    shortname = "tws",
    namespaced,
    status = "TimeWindowScalerStatus",
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.targetRef.name"}"#,
    printcolumn = r#"{"name":"Default","type":"integer","jsonPath":".spec.defaultReplicas"}"#,
    printcolumn = r#"{"name":"Effective","type":"integer","jsonPath":".status.effectiveReplicas"}"#,
    printcolumn = r#"{"name":"Window","type":"string","jsonPath":".status.currentWindow"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindowScalerSpec {
    /// Deployment to scale
    pub target_ref: TargetRef,

    /// Replicas when no window matches
    #[serde(default = "default_replicas")]
    #[schemars(range(min = 0))]
    pub default_replicas: i32,

    /// IANA timezone the windows are declared in (e.g. "Europe/Berlin")
    pub timezone: String,

    /// Scaling windows in priority order: a later window wins where windows overlap
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub windows: Vec<TimeWindow>,

    /// How a holiday overrides the windows
    #[serde(default)]
    pub holiday_mode: HolidayMode,

    /// ConfigMap in the scaler's namespace whose keys are holiday dates (`YYYY-MM-DD`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holiday_config_map: Option<String>,

    /// Seconds after a scale action before a scale-down is allowed
    #[serde(default = "default_grace_period_seconds")]
    #[schemars(range(min = 0, max = 3600))]
    pub grace_period_seconds: i32,

    /// Compute and report the schedule without scaling the target
    #[serde(default)]
    pub pause: bool,
}

fn default_replicas() -> i32 {
    1
}

fn default_grace_period_seconds() -> i32 {
    300
}

/// Reference to the scaled Deployment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    /// Deployment name
    pub name: String,

    /// Deployment namespace; defaults to the scaler's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// One time-of-day window
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    /// Local start time, `HH:MM` (24-hour), inclusive
    #[schemars(regex(pattern = r"^([0-1]?[0-9]|2[0-3]):[0-5][0-9]$"))]
    pub start: String,

    /// Local end time, `HH:MM` (24-hour), exclusive; at or before `start` crosses midnight
    #[schemars(regex(pattern = r"^([0-1]?[0-9]|2[0-3]):[0-5][0-9]$"))]
    pub end: String,

    /// Replicas while the window is active
    #[schemars(range(min = 0))]
    pub replicas: i32,

    /// Weekdays (e.g. "Monday") the window applies to; empty means every day
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days: Vec<String>,

    /// Label reported in status while the window is active
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(length(max = 63))]
    pub name: Option<String>,
}

impl TimeWindow {
    /// Convert to the engine's window type
    pub fn to_window_spec(&self) -> WindowSpec {
        WindowSpec {
            start: self.start.clone(),
            end: self.end.clone(),
            replicas: self.replicas,
            name: self.name.clone(),
            days: self.days.clone(),
        }
    }
}

/// Holiday policy
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HolidayMode {
    /// Holidays are ordinary days
    #[default]
    Ignore,
    /// Scale to zero on holidays
    TreatAsClosed,
    /// Run the largest configured replica count on holidays
    TreatAsOpen,
}

impl From<HolidayMode> for cadence_schedule::HolidayMode {
    fn from(mode: HolidayMode) -> Self {
        match mode {
            HolidayMode::Ignore => Self::Ignore,
            HolidayMode::TreatAsClosed => Self::TreatAsClosed,
            HolidayMode::TreatAsOpen => Self::TreatAsOpen,
        }
    }
}

impl TimeWindowScalerSpec {
    /// Namespace of the target Deployment
    pub fn target_namespace<'a>(&'a self, own_namespace: &'a str) -> &'a str {
        match self.target_ref.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => ns,
            _ => own_namespace,
        }
    }

    /// Grace period as a duration
    pub fn grace_period(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.grace_period_seconds))
    }

    /// Windows in declaration order, as the engine takes them
    pub fn window_specs(&self) -> Vec<WindowSpec> {
        self.windows.iter().map(TimeWindow::to_window_spec).collect()
    }

    /// Check the fields the engine depends on
    ///
    /// Reports the first problem found with the path of the offending field.
    pub fn validate(&self, scaler: &str) -> Result<(), Error> {
        if self.target_ref.name.is_empty() {
            return Err(Error::configuration_for_field(
                scaler,
                "spec.targetRef.name",
                "target name must not be empty",
            ));
        }
        if self.default_replicas < 0 {
            return Err(Error::configuration_for_field(
                scaler,
                "spec.defaultReplicas",
                format!("must be >= 0, got {}", self.default_replicas),
            ));
        }
        if !(0..=MAX_GRACE_PERIOD_SECONDS).contains(&self.grace_period_seconds) {
            return Err(Error::configuration_for_field(
                scaler,
                "spec.gracePeriodSeconds",
                format!(
                    "must be between 0 and {MAX_GRACE_PERIOD_SECONDS}, got {}",
                    self.grace_period_seconds
                ),
            ));
        }

        for (i, window) in self.windows.iter().enumerate() {
            for (field, value) in [("start", &window.start), ("end", &window.end)] {
                if let Err(e) = TimeOfDay::parse(value) {
                    return Err(Error::configuration_for_field(
                        scaler,
                        format!("spec.windows[{i}].{field}"),
                        e.to_string(),
                    ));
                }
            }
            if window.replicas < 0 {
                return Err(Error::configuration_for_field(
                    scaler,
                    format!("spec.windows[{i}].replicas"),
                    format!("must be >= 0, got {}", window.replicas),
                ));
            }
        }
        Ok(())
    }
}

/// TimeWindowScaler status
///
/// Rewritten in full on every reconcile; fields absent here are cleared.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindowScalerStatus {
    /// Spec generation the status reflects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Replicas the schedule currently calls for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_replicas: Option<i32>,

    /// Replicas last observed on the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_observed_replicas: Option<i32>,

    /// Active window label or sentinel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_window: Option<String>,

    /// Next instant the decision may change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_boundary: Option<DateTime<Utc>>,

    /// When the controller last scaled the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scale_time: Option<DateTime<Utc>>,

    /// When the current scale-down hold ends; present only while holding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_expiry: Option<DateTime<Utc>>,

    /// Whether the last evaluation fell on a holiday
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub holiday: bool,

    /// Status conditions; "Ready" is the primary type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl TimeWindowScalerStatus {
    /// Insert or replace a condition by type
    pub fn set_condition(&mut self, condition: Condition) {
        set_condition(&mut self.conditions, condition);
    }

    /// Builder form of [`Self::set_condition`]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.set_condition(condition);
        self
    }

    /// The Ready condition, if set
    pub fn ready_condition(&self) -> Option<&Condition> {
        find_condition(&self.conditions, READY_CONDITION)
    }
}
