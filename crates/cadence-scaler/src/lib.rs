//! TimeWindowScaler controller for cadence
//!
//! Drives each scaler's target Deployment toward the replica count its
//! schedule calls for, and wakes up again just before the next boundary.

#![deny(missing_docs)]

pub mod client;
pub mod config;
pub mod controller;
pub mod input;
pub mod watch;

pub use client::{KubeScalerClient, ScalerKubeClient};
pub use config::ScalerConfig;
pub use controller::{error_policy, reconcile, Context, ContextBuilder};
pub use watch::{scalers_for_holiday_list, scalers_for_target};
