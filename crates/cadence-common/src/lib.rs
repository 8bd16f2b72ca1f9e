//! Common types for cadence: CRDs, errors, events, metrics and telemetry

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod finalizer;
pub mod kube_utils;
pub mod metrics;
pub mod telemetry;

pub use error::Error;

/// Field manager for every write the controller makes
pub const FIELD_MANAGER: &str = "cadence-scaler";

/// Reporting component on Kubernetes Events
pub const CONTROLLER_NAME: &str = "cadence-scaler-controller";

/// Finalizer that gates TimeWindowScaler deletion on metrics cleanup
pub const SCALER_FINALIZER: &str = "cadence.dev/cleanup";
