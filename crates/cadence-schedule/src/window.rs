//! Time-of-day windows
//!
//! A [`WindowSpec`] is what the user declares: `start`/`end` as local `HH:MM`,
//! a replica count, an optional label and an optional weekday filter. A
//! [`ResolvedWindow`] is that declaration pinned to concrete instants around
//! "now" in the scaler's timezone.
//!
//! All anchoring goes through local wall-clock arithmetic, so a window declared
//! `09:00-17:00` in `America/New_York` stays 09:00-17:00 local across DST
//! transitions while its UTC instants shift by the offset change.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, LocalResult, NaiveDate, NaiveTime, Offset, TimeDelta, TimeZone, Weekday};
use chrono_tz::Tz;

use crate::error::ScheduleError;
use crate::Result;

/// A local wall-clock time with minute precision
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    /// Build from an hour in `0..=23` and a minute in `0..=59`
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        let value = format!("{hour:02}:{minute:02}");
        if hour > 23 {
            return Err(ScheduleError::invalid_time(&value, "hour must be 0-23"));
        }
        if minute > 59 {
            return Err(ScheduleError::invalid_time(&value, "minute must be 0-59"));
        }
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(|| ScheduleError::invalid_time(&value, "not a valid time of day"))
    }

    /// Parse `H:MM` or `HH:MM` (24-hour)
    pub fn parse(value: &str) -> Result<Self> {
        let (hour, minute) = value
            .split_once(':')
            .ok_or_else(|| ScheduleError::invalid_time(value, "expected HH:MM"))?;

        if hour.is_empty() || hour.len() > 2 || !hour.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ScheduleError::invalid_time(value, "hour must be one or two digits"));
        }
        if minute.len() != 2 || !minute.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ScheduleError::invalid_time(value, "minute must be two digits"));
        }

        let hour: u32 = hour
            .parse()
            .map_err(|_| ScheduleError::invalid_time(value, "hour is not a number"))?;
        let minute: u32 = minute
            .parse()
            .map_err(|_| ScheduleError::invalid_time(value, "minute is not a number"))?;

        if hour > 23 {
            return Err(ScheduleError::invalid_time(value, "hour must be 0-23"));
        }
        if minute > 59 {
            return Err(ScheduleError::invalid_time(value, "minute must be 0-59"));
        }
        Self::new(hour, minute)
    }

    /// As a chrono time (seconds are always zero)
    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl FromStr for TimeOfDay {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

/// A declared window, exactly as configured
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WindowSpec {
    /// Local start time, `HH:MM`, inclusive
    pub start: String,
    /// Local end time, `HH:MM`, exclusive. `end <= start` means the window crosses midnight.
    pub end: String,
    /// Replicas while the window is active
    pub replicas: i32,
    /// Optional label; unnamed windows are labelled `HH:MM-HH:MM`
    pub name: Option<String>,
    /// Weekdays (full English names, any case) the window applies to; empty means every day
    pub days: Vec<String>,
}

impl WindowSpec {
    /// An unnamed window active every day
    pub fn new(start: impl Into<String>, end: impl Into<String>, replicas: i32) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            replicas,
            name: None,
            days: Vec::new(),
        }
    }

    /// Set the window label
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Restrict the window to the given weekdays
    pub fn on_days<I, S>(mut self, days: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.days = days.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the weekday filter admits `weekday`
    pub fn applies_on(&self, weekday: Weekday) -> bool {
        self.days.is_empty()
            || self
                .days
                .iter()
                .any(|day| day.trim().eq_ignore_ascii_case(weekday_name(weekday)))
    }

    /// Check times and replicas without anchoring the window
    pub fn validate(&self) -> Result<()> {
        TimeOfDay::parse(&self.start)?;
        TimeOfDay::parse(&self.end)?;
        if self.replicas < 0 {
            return Err(ScheduleError::InvalidReplicas {
                subject: self.display_name(),
                replicas: self.replicas,
            });
        }
        Ok(())
    }

    /// The configured label, or `HH:MM-HH:MM` for unnamed windows
    ///
    /// Times that do not parse are shown as written.
    pub fn display_name(&self) -> String {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => match (TimeOfDay::parse(&self.start), TimeOfDay::parse(&self.end)) {
                (Ok(start), Ok(end)) => format!("{start}-{end}"),
                _ => format!("{}-{}", self.start, self.end),
            },
        }
    }
}

/// A window pinned to concrete instants around "now"
///
/// For a window that crosses midnight, exactly one of `start`/`end` is moved by a
/// day: the start goes back to yesterday while "now" is still in the early-morning
/// tail, otherwise the end goes forward to tomorrow. Either way `start < end` and
/// membership is the half-open interval `[start, end)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedWindow {
    /// First instant inside the window
    pub start: DateTime<Tz>,
    /// First instant after the window
    pub end: DateTime<Tz>,
    /// Replicas while active
    pub replicas: i32,
    /// Label reported while active
    pub label: String,
    start_time: TimeOfDay,
    crosses_midnight: bool,
}

impl ResolvedWindow {
    /// Anchor `spec` to the local day containing `now`
    pub fn anchor(spec: &WindowSpec, now: &DateTime<Tz>) -> Result<Self> {
        let start_time = TimeOfDay::parse(&spec.start)?;
        let end_time = TimeOfDay::parse(&spec.end)?;
        if spec.replicas < 0 {
            return Err(ScheduleError::InvalidReplicas {
                subject: spec.display_name(),
                replicas: spec.replicas,
            });
        }

        let tz = now.timezone();
        let today = now.date_naive();
        let crosses_midnight = end_time <= start_time;

        let (start_day, end_day) = if !crosses_midnight {
            (today, today)
        } else if now.time() < end_time.as_naive() {
            (previous_day(today)?, today)
        } else {
            (today, following_day(today)?)
        };

        Ok(Self {
            start: at_local(&tz, start_day, start_time.as_naive()),
            end: at_local(&tz, end_day, end_time.as_naive()),
            replicas: spec.replicas,
            label: spec.display_name(),
            start_time,
            crosses_midnight,
        })
    }

    /// Whether the declared end is at or before the declared start
    pub fn crosses_midnight(&self) -> bool {
        self.crosses_midnight
    }

    /// Start-inclusive, end-exclusive membership
    pub fn contains(&self, instant: &DateTime<Tz>) -> bool {
        self.start <= *instant && *instant < self.end
    }

    /// The next instant, strictly after `now`, at which this window opens or closes
    pub fn next_transition(&self, now: &DateTime<Tz>) -> Result<DateTime<Tz>> {
        if *now < self.start {
            return Ok(self.start.clone());
        }
        if *now < self.end {
            return Ok(self.end.clone());
        }
        let tomorrow = following_day(now.date_naive())?;
        Ok(at_local(&now.timezone(), tomorrow, self.start_time.as_naive()))
    }
}

/// Resolve a local wall-clock time to an instant
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times inside a
/// spring-forward gap are read with the offset in force before the gap, which
/// lands them the same distance past the transition.
pub(crate) fn at_local(tz: &Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let before_gap = tz
                .offset_from_utc_datetime(&(naive - TimeDelta::days(1)))
                .fix();
            let utc = naive - TimeDelta::seconds(i64::from(before_gap.local_minus_utc()));
            tz.from_utc_datetime(&utc)
        }
    }
}

/// Local midnight at the start of the day after `now`
pub(crate) fn next_local_midnight(now: &DateTime<Tz>) -> Result<DateTime<Tz>> {
    let tomorrow = following_day(now.date_naive())?;
    Ok(at_local(&now.timezone(), tomorrow, NaiveTime::MIN))
}

/// Calendar date of `now` in `tz` as `YYYY-MM-DD`
pub fn local_date_key(now: &DateTime<Tz>) -> String {
    now.date_naive().format("%Y-%m-%d").to_string()
}

fn previous_day(date: NaiveDate) -> Result<NaiveDate> {
    date.pred_opt().ok_or(ScheduleError::OutOfRange {
        context: "previous day",
    })
}

fn following_day(date: NaiveDate) -> Result<NaiveDate> {
    date.succ_opt().ok_or(ScheduleError::OutOfRange {
        context: "following day",
    })
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
