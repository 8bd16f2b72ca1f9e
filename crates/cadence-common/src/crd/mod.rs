//! Custom Resource Definitions for cadence

mod scaler;
mod types;

pub use scaler::{
    HolidayMode, TargetRef, TimeWindow, TimeWindowScaler, TimeWindowScalerSpec,
    TimeWindowScalerStatus, MAX_GRACE_PERIOD_SECONDS,
};
pub use types::{find_condition, set_condition, Condition, ConditionStatus, READY_CONDITION};
