//! Schedule resolution
//!
//! [`resolve`] turns an [`EngineInput`] into an [`EngineOutput`]. Branches are
//! taken in a fixed order:
//!
//! 1. holiday override, when today is a holiday and the mode is not `ignore`
//! 2. window match, where a later declaration outranks every earlier one
//! 3. the default replica count
//!
//! The grace-period hold is layered on top (see [`crate::hysteresis`]) and a
//! paused scaler reports the same decision with the reason replaced by `paused`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, TimeDelta, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::error::ScheduleError;
use crate::hysteresis::apply_grace_period;
use crate::window::{next_local_midnight, ResolvedWindow, WindowSpec};
use crate::Result;

/// Label reported when no window matches
pub const DEFAULT_WINDOW: &str = "Default";
/// Label reported on a holiday in `treat-as-closed` mode
pub const HOLIDAY_CLOSED_WINDOW: &str = "Holiday-Closed";
/// Label reported on a holiday in `treat-as-open` mode
pub const HOLIDAY_OPEN_WINDOW: &str = "Holiday-Open";
/// Label reported while a scale-down is held back
pub const GRACE_PERIOD_WINDOW: &str = "Grace-Period";

/// How a holiday overrides window evaluation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HolidayMode {
    /// Holidays are ordinary days
    #[default]
    Ignore,
    /// Scale to zero for the whole local day
    TreatAsClosed,
    /// Run the largest configured replica count for the whole local day
    TreatAsOpen,
}

impl HolidayMode {
    /// Wire name (`ignore`, `treat-as-closed`, `treat-as-open`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::TreatAsClosed => "treat-as-closed",
            Self::TreatAsOpen => "treat-as-open",
        }
    }
}

impl FromStr for HolidayMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(Self::Ignore),
            "treat-as-closed" => Ok(Self::TreatAsClosed),
            "treat-as-open" => Ok(Self::TreatAsOpen),
            other => Err(format!("unknown holiday mode: {other}")),
        }
    }
}

impl fmt::Display for HolidayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which branch produced a decision
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Reason {
    /// A configured window matched
    InWindow,
    /// No window matched; the default applies
    NoMatchingWindow,
    /// Holiday, `treat-as-closed`
    HolidayClosed,
    /// Holiday, `treat-as-open`
    HolidayOpen,
    /// The scaler is paused; the decision is informational only
    Paused,
    /// A scale-down is being held back
    GracePeriodActive,
}

impl Reason {
    /// Machine-readable code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InWindow => "in-window",
            Self::NoMatchingWindow => "no-matching-window",
            Self::HolidayClosed => "holiday-closed",
            Self::HolidayOpen => "holiday-open",
            Self::Paused => "paused",
            Self::GracePeriodActive => "grace-period-active",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one evaluation depends on
#[derive(Clone, Debug, PartialEq)]
pub struct EngineInput {
    /// The evaluation instant
    pub now: DateTime<Utc>,
    /// IANA timezone name the windows are declared in
    pub timezone: String,
    /// Windows in declaration order; later entries win on overlap
    pub windows: Vec<WindowSpec>,
    /// Replicas when no window matches
    pub default_replicas: i32,
    /// Holiday policy
    pub holiday_mode: HolidayMode,
    /// Whether the local date is a holiday (resolved by the caller)
    pub is_holiday: bool,
    /// Report the decision without acting on it
    pub pause: bool,
    /// Minimum dwell after a scale action before scaling down; zero disables
    pub grace_period: TimeDelta,
    /// When a scale action was last taken, if ever
    pub last_scale_time: Option<DateTime<Utc>>,
    /// Replicas the target runs right now
    pub current_replicas: i32,
}

impl EngineInput {
    /// Input with no windows, one default replica and every override off
    pub fn new(now: DateTime<Utc>, timezone: impl Into<String>) -> Self {
        Self {
            now,
            timezone: timezone.into(),
            windows: Vec::new(),
            default_replicas: 1,
            holiday_mode: HolidayMode::Ignore,
            is_holiday: false,
            pause: false,
            grace_period: TimeDelta::zero(),
            last_scale_time: None,
            current_replicas: 0,
        }
    }

    /// Set the window list
    pub fn with_windows(mut self, windows: Vec<WindowSpec>) -> Self {
        self.windows = windows;
        self
    }

    /// Set the default replica count
    pub fn with_default_replicas(mut self, replicas: i32) -> Self {
        self.default_replicas = replicas;
        self
    }

    /// Set the holiday policy and today's holiday flag
    pub fn with_holiday(mut self, mode: HolidayMode, is_holiday: bool) -> Self {
        self.holiday_mode = mode;
        self.is_holiday = is_holiday;
        self
    }

    /// Set the pause flag
    pub fn with_pause(mut self, pause: bool) -> Self {
        self.pause = pause;
        self
    }

    /// Set grace-period inputs
    pub fn with_grace_period(
        mut self,
        grace_period: TimeDelta,
        last_scale_time: Option<DateTime<Utc>>,
        current_replicas: i32,
    ) -> Self {
        self.grace_period = grace_period;
        self.last_scale_time = last_scale_time;
        self.current_replicas = current_replicas;
        self
    }
}

/// The decision for one evaluation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineOutput {
    /// Replicas the target should run
    pub effective_replicas: i32,
    /// Earliest instant the decision can change, strictly after `now`
    pub next_boundary: DateTime<Utc>,
    /// Active window label or one of the sentinels
    pub window: String,
    /// Branch that produced the decision
    pub reason: Reason,
}

/// Parse an IANA timezone name
pub fn parse_timezone(name: &str) -> Result<Tz> {
    if name.is_empty() {
        return Err(ScheduleError::InvalidTimezone {
            name: name.to_string(),
            reason: "timezone must not be empty".to_string(),
        });
    }
    name.parse::<Tz>()
        .map_err(|e| ScheduleError::InvalidTimezone {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

/// Resolve the effective replica count and next boundary for `input`
///
/// Fails only on whole-schedule configuration errors (timezone, default
/// replicas). A malformed window is logged and left out of the evaluation.
pub fn resolve(input: &EngineInput) -> Result<EngineOutput> {
    let tz = parse_timezone(&input.timezone)?;
    if input.default_replicas < 0 {
        return Err(ScheduleError::InvalidReplicas {
            subject: "defaultReplicas".to_string(),
            replicas: input.default_replicas,
        });
    }

    let now = input.now.with_timezone(&tz);
    let scheduled = schedule(input, &now)?;
    let mut output = apply_grace_period(input, scheduled);
    if input.pause {
        output.reason = Reason::Paused;
    }

    debug!(
        effective_replicas = output.effective_replicas,
        window = %output.window,
        reason = %output.reason,
        next_boundary = %output.next_boundary,
        "resolved schedule"
    );
    Ok(output)
}

fn schedule(input: &EngineInput, now: &DateTime<Tz>) -> Result<EngineOutput> {
    if input.is_holiday {
        match input.holiday_mode {
            HolidayMode::TreatAsClosed => {
                return holiday(now, 0, HOLIDAY_CLOSED_WINDOW, Reason::HolidayClosed);
            }
            HolidayMode::TreatAsOpen => {
                // Raw configured counts: weekday filters are not consulted.
                let peak = input
                    .windows
                    .iter()
                    .map(|w| w.replicas)
                    .fold(input.default_replicas, i32::max);
                return holiday(now, peak, HOLIDAY_OPEN_WINDOW, Reason::HolidayOpen);
            }
            HolidayMode::Ignore => {}
        }
    }
    evaluate_windows(input, now)
}

fn holiday(
    now: &DateTime<Tz>,
    replicas: i32,
    label: &str,
    reason: Reason,
) -> Result<EngineOutput> {
    Ok(EngineOutput {
        effective_replicas: replicas,
        next_boundary: next_local_midnight(now)?.with_timezone(&Utc),
        window: label.to_string(),
        reason,
    })
}

fn evaluate_windows(input: &EngineInput, now: &DateTime<Tz>) -> Result<EngineOutput> {
    let weekday = now.weekday();
    let mut next_boundary = next_local_midnight(now)?;
    let mut active: Option<(usize, ResolvedWindow)> = None;

    for (priority, spec) in input.windows.iter().enumerate() {
        if !spec.applies_on(weekday) {
            continue;
        }

        let window = match ResolvedWindow::anchor(spec, now) {
            Ok(window) => window,
            Err(error) => {
                warn!(window = %spec.display_name(), %error, "skipping invalid window");
                continue;
            }
        };

        let transition = window.next_transition(now)?;
        if transition > *now && transition < next_boundary {
            next_boundary = transition;
        }

        if window.contains(now) {
            active = match active {
                Some((rank, current)) if rank > priority => Some((rank, current)),
                _ => Some((priority, window)),
            };
        }
    }

    let next_boundary = next_boundary.with_timezone(&Utc);
    Ok(match active {
        Some((_, window)) => EngineOutput {
            effective_replicas: window.replicas,
            next_boundary,
            window: window.label,
            reason: Reason::InWindow,
        },
        None => EngineOutput {
            effective_replicas: input.default_replicas,
            next_boundary,
            window: DEFAULT_WINDOW.to_string(),
            reason: Reason::NoMatchingWindow,
        },
    })
}
