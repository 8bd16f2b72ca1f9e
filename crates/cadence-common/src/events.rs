//! Kubernetes Event recording for the scaler controller.
//!
//! Provides a trait-based abstraction over `kube::runtime::events::Recorder`
//! so that scale actions, grace-period holds and degraded states show up in
//! `kubectl describe tws` and `kubectl get events`.
//!
//! Events are **fire-and-forget**: failures are logged as warnings and never
//! propagate errors. A failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events.
///
/// Implementations are expected to be fire-and-forget: `publish()` logs a
/// warning on failure but never returns an error.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Kubernetes Event on the given resource.
    ///
    /// # Arguments
    ///
    /// * `resource_ref` - The Kubernetes object this event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason string (e.g. "ScaledUp")
    /// * `action` - What action was taken (e.g. "Scale")
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a new publisher for the given controller name.
    ///
    /// The controller name appears as the "reportingComponent" on Events.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// No-op implementation for tests and dry runs.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Well-known event reason strings.
///
/// These appear in `kubectl get events` under the REASON column.
pub mod reasons {
    // Scaling
    /// Target scaled to more replicas
    pub const SCALED_UP: &str = "ScaledUp";
    /// Target scaled to fewer replicas
    pub const SCALED_DOWN: &str = "ScaledDown";
    /// A scale-down is being held by the grace period
    pub const GRACE_PERIOD_ACTIVE: &str = "GracePeriodActive";
    /// A grace-period hold has ended
    pub const GRACE_PERIOD_ENDED: &str = "GracePeriodEnded";
    /// Writing the target's replica count failed
    pub const SCALE_FAILED: &str = "ScaleFailed";

    // Holidays
    /// Today is listed in the holiday ConfigMap
    pub const HOLIDAY_DETECTED: &str = "HolidayDetected";
    /// Reading the holiday ConfigMap failed; holiday handling skipped
    pub const HOLIDAY_CHECK_FAILED: &str = "HolidayCheckFailed";

    // Degraded states
    /// A window in the spec cannot be parsed
    pub const INVALID_WINDOW: &str = "InvalidWindow";
    /// The spec cannot be evaluated
    pub const INVALID_CONFIGURATION: &str = "InvalidConfiguration";
    /// The schedule engine failed
    pub const COMPUTE_FAILED: &str = "ComputeFailed";
    /// Reading the target failed
    pub const TARGET_FETCH_FAILED: &str = "TargetFetchFailed";
    /// The target Deployment does not exist
    pub const TARGET_NOT_FOUND: &str = "TargetNotFound";

    // Lifecycle
    /// Scaler deletion in progress
    pub const DELETING: &str = "Deleting";
}

/// Well-known event action strings.
///
/// These appear in `kubectl get events` under the ACTION column.
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Writing the target's replica count
    pub const SCALE: &str = "Scale";
    /// Releasing scaler resources
    pub const DELETE: &str = "Delete";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
    }

    #[test]
    fn reason_constants_are_pascal_case() {
        assert_eq!(reasons::SCALED_UP, "ScaledUp");
        assert_eq!(reasons::GRACE_PERIOD_ACTIVE, "GracePeriodActive");
        assert_eq!(reasons::TARGET_NOT_FOUND, "TargetNotFound");
    }

    #[test]
    fn action_constants_are_defined() {
        assert_eq!(actions::RECONCILE, "Reconcile");
        assert_eq!(actions::SCALE, "Scale");
    }

    #[tokio::test]
    async fn noop_publisher_does_not_panic() {
        let publisher = NoopEventPublisher;
        let obj_ref = ObjectReference::default();
        publisher
            .publish(
                &obj_ref,
                EventType::Normal,
                reasons::SCALED_UP,
                actions::SCALE,
                Some("Scaled from 1 to 5 replicas (window: BusinessHours)".to_string()),
            )
            .await;
    }
}
