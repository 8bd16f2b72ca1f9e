//! Time-window scheduling engine for cadence
//!
//! Given the current instant, an IANA timezone and an ordered list of
//! time-of-day windows, decides how many replicas a workload should run and
//! when that decision can next change. The engine is pure: no I/O, no hidden
//! state, and identical input always yields identical output.
//!
//! - [`clock`] - injectable source of "now"
//! - [`window`] - `HH:MM` parsing and anchoring windows to concrete instants
//! - [`engine`] - holiday, window and pause resolution
//! - [`hysteresis`] - scale-down grace period

#![deny(missing_docs)]

pub mod clock;
pub mod engine;
pub mod error;
pub mod hysteresis;
pub mod window;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{
    parse_timezone, resolve, EngineInput, EngineOutput, HolidayMode, Reason, DEFAULT_WINDOW,
    GRACE_PERIOD_WINDOW, HOLIDAY_CLOSED_WINDOW, HOLIDAY_OPEN_WINDOW,
};
pub use error::ScheduleError;
pub use hysteresis::apply_grace_period;
pub use window::{local_date_key, ResolvedWindow, TimeOfDay, WindowSpec};

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, ScheduleError>;
