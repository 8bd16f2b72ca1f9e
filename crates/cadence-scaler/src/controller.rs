//! TimeWindowScaler controller implementation
//!
//! Each reconcile recomputes the schedule decision from the current time,
//! writes the target's replica count only when it differs, replaces the
//! scaler's status and requeues shortly before the next boundary.
//!
//! States, in the order they are checked:
//! - Deleting: release metrics, drop the finalizer
//! - Initializing: add the finalizer and requeue
//! - TargetMissing / TargetFetchFailed: target Deployment unavailable
//! - InvalidConfig: the spec cannot be evaluated
//! - ComputeFailed: the engine rejected the input
//! - Paused: status only, never scale
//! - Reconciled / ScaleFailed: the common path

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use cadence_common::crd::{
    Condition, ConditionStatus, TimeWindowScaler, TimeWindowScalerStatus, READY_CONDITION,
};
use cadence_common::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use cadence_common::finalizer::{has_finalizer, with_finalizer, without_finalizer};
use cadence_common::metrics::{
    InstanceKey, ReconcileTimer, ScaleDirection, ScalerMetrics, ScalerObserver,
};
use cadence_common::{Error, CONTROLLER_NAME, SCALER_FINALIZER};
use cadence_schedule::{resolve, Clock, EngineOutput, SystemClock, GRACE_PERIOD_WINDOW};

use crate::client::{KubeScalerClient, ScalerKubeClient};
use crate::config::ScalerConfig;
use crate::input::{build_engine_input, lookup_holiday, HolidayLookup};

/// Condition reasons on the Ready condition
mod condition_reasons {
    pub const RECONCILED: &str = "Reconciled";
    pub const PAUSED: &str = "Paused";
}

/// Controller context containing shared state and clients
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```text
/// let ctx = Context::builder(client)
///     .config(ScalerConfig::default())
///     .build();
/// ```
pub struct Context {
    /// Kubernetes operations (trait object for testability)
    pub kube: Arc<dyn ScalerKubeClient>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Per-scaler metrics
    pub metrics: Arc<dyn ScalerObserver>,
    /// Source of the current instant
    pub clock: Arc<dyn Clock>,
    /// Requeue and backoff settings
    pub config: ScalerConfig,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with mock collaborators
    #[cfg(test)]
    pub fn for_testing(
        kube: Arc<dyn ScalerKubeClient>,
        events: Arc<dyn EventPublisher>,
        metrics: Arc<dyn ScalerObserver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            kube,
            events,
            metrics,
            clock,
            config: ScalerConfig::default(),
        }
    }
}

/// Builder for constructing [`Context`] instances
///
/// Unset collaborators default to the production implementations.
pub struct ContextBuilder {
    client: Client,
    kube: Option<Arc<dyn ScalerKubeClient>>,
    events: Option<Arc<dyn EventPublisher>>,
    metrics: Option<Arc<dyn ScalerObserver>>,
    clock: Option<Arc<dyn Clock>>,
    config: ScalerConfig,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            kube: None,
            events: None,
            metrics: None,
            clock: None,
            config: ScalerConfig::default(),
        }
    }

    /// Override the Kubernetes client
    pub fn kube_client(mut self, kube: Arc<dyn ScalerKubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Override the event publisher
    pub fn event_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Override the metrics observer
    pub fn metrics(mut self, metrics: Arc<dyn ScalerObserver>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Override the clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set requeue and backoff timing
    pub fn config(mut self, config: ScalerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            kube: self
                .kube
                .unwrap_or_else(|| Arc::new(KubeScalerClient::new(self.client.clone()))),
            events: self.events.unwrap_or_else(|| {
                Arc::new(KubeEventPublisher::new(self.client.clone(), CONTROLLER_NAME))
            }),
            metrics: self
                .metrics
                .unwrap_or_else(|| Arc::new(ScalerMetrics::global())),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config: self.config,
        }
    }
}

/// Reconcile a TimeWindowScaler
///
/// Returns when to evaluate the scaler again, or an error for remote
/// failures that [`error_policy`] retries.
#[instrument(
    skip(scaler, ctx),
    fields(scaler = %scaler.name_any(), namespace = %scaler.namespace().unwrap_or_default())
)]
pub async fn reconcile(scaler: Arc<TimeWindowScaler>, ctx: Arc<Context>) -> Result<Action, Error> {
    // Deletion drops every series of the scaler, so it is not timed
    if scaler.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&scaler, &ctx).await;
    }

    let timer = ReconcileTimer::start(ctx.metrics.clone(), instance_key(&scaler));
    let result = reconcile_scaler(&scaler, &ctx).await;
    match &result {
        Ok(_) => timer.success(),
        Err(_) => timer.error(),
    }
    result
}

/// Requeue policy for reconcile errors
///
/// Transient failures retry after `error_backoff`; rejected requests wait
/// `non_retryable_backoff` since only a spec or RBAC change fixes them.
pub fn error_policy(scaler: Arc<TimeWindowScaler>, error: &Error, ctx: Arc<Context>) -> Action {
    let retryable = error.is_retryable();
    error!(
        ?error,
        scaler = %scaler.name_any(),
        retryable,
        "reconciliation failed"
    );
    if retryable {
        Action::requeue(ctx.config.error_backoff)
    } else {
        Action::requeue(ctx.config.non_retryable_backoff)
    }
}

async fn reconcile_scaler(scaler: &TimeWindowScaler, ctx: &Context) -> Result<Action, Error> {
    let name = scaler.name_any();
    let namespace = scaler.namespace().unwrap_or_default();
    debug!("reconciling scaler");

    if !has_finalizer(&scaler.metadata, SCALER_FINALIZER) {
        info!("adding finalizer");
        ctx.kube
            .set_finalizers(&name, &namespace, with_finalizer(&scaler.metadata, SCALER_FINALIZER))
            .await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    let now = ctx.clock.now();
    let spec = &scaler.spec;
    let target = spec.target_ref.name.as_str();
    let target_namespace = spec.target_namespace(&namespace);

    let observed = match ctx.kube.get_deployment_replicas(target, target_namespace).await {
        Ok(Some(replicas)) => replicas,
        Ok(None) => {
            info!(deployment = %target, target_namespace, "target deployment not found");
            let message = format!("target deployment {target_namespace}/{target} not found");
            publish(ctx, scaler, EventType::Warning, reasons::TARGET_NOT_FOUND, actions::RECONCILE, &message).await;
            write_degraded_status(ctx, scaler, reasons::TARGET_NOT_FOUND, &message, now).await;
            return Ok(Action::requeue(ctx.config.target_missing_backoff));
        }
        Err(e) => {
            warn!(deployment = %target, target_namespace, error = %e, "failed to get target deployment");
            let message = format!("failed to get target deployment {target_namespace}/{target}: {e}");
            publish(ctx, scaler, EventType::Warning, reasons::TARGET_FETCH_FAILED, actions::RECONCILE, &message).await;
            write_degraded_status(ctx, scaler, reasons::TARGET_FETCH_FAILED, &message, now).await;
            return Err(e);
        }
    };

    if let Err(e) = spec.validate(&name) {
        warn!(error = %e, field = e.field().unwrap_or_default(), "invalid scaler configuration");
        if let Some(window) = invalid_window_label(scaler, &e) {
            publish(
                ctx,
                scaler,
                EventType::Warning,
                reasons::INVALID_WINDOW,
                actions::RECONCILE,
                &format!("window {window}: {e}"),
            )
            .await;
        }
        let message = e.to_string();
        publish(ctx, scaler, EventType::Warning, reasons::INVALID_CONFIGURATION, actions::RECONCILE, &message).await;
        write_degraded_status(ctx, scaler, reasons::INVALID_CONFIGURATION, &message, now).await;
        return Ok(Action::requeue(ctx.config.error_backoff));
    }

    let previous = scaler.status.clone().unwrap_or_default();
    let holiday = lookup_holiday(ctx.kube.as_ref(), scaler, &namespace, now).await;
    match &holiday {
        HolidayLookup::Failed(e) => {
            let config_map = spec.holiday_config_map.as_deref().unwrap_or_default();
            warn!(config_map, error = %e, "holiday check failed, evaluating as an ordinary day");
            publish(
                ctx,
                scaler,
                EventType::Warning,
                reasons::HOLIDAY_CHECK_FAILED,
                actions::RECONCILE,
                &format!("failed to check holiday ConfigMap {config_map}: {e}"),
            )
            .await;
        }
        HolidayLookup::Checked(true) if !previous.holiday => {
            publish(
                ctx,
                scaler,
                EventType::Normal,
                reasons::HOLIDAY_DETECTED,
                actions::RECONCILE,
                &format!("today is a holiday (mode: {})", cadence_schedule::HolidayMode::from(spec.holiday_mode)),
            )
            .await;
        }
        _ => {}
    }

    let input = build_engine_input(scaler, now, holiday.is_holiday(), observed);
    let output = match resolve(&input) {
        Ok(output) => output,
        Err(e) => {
            let err = Error::compute(&name, e.to_string());
            warn!(error = %err, "schedule evaluation failed");
            let message = err.to_string();
            publish(ctx, scaler, EventType::Warning, reasons::COMPUTE_FAILED, actions::RECONCILE, &message).await;
            write_degraded_status(ctx, scaler, reasons::COMPUTE_FAILED, &message, now).await;
            return Ok(Action::requeue(ctx.config.error_backoff));
        }
    };

    info!(
        effective = output.effective_replicas,
        observed,
        window = %output.window,
        reason = %output.reason,
        next_boundary = %output.next_boundary,
        "computed scaling decision"
    );

    let mut status = TimeWindowScalerStatus {
        observed_generation: scaler.metadata.generation,
        effective_replicas: Some(output.effective_replicas),
        target_observed_replicas: Some(observed),
        current_window: Some(output.window.clone()),
        next_boundary: Some(output.next_boundary),
        last_scale_time: previous.last_scale_time,
        grace_period_expiry: None,
        holiday: holiday.holiday_flag(previous.holiday),
        conditions: previous.conditions.clone(),
    };

    if !spec.pause && observed != output.effective_replicas {
        if let Err(e) = scale_target(ctx, scaler, observed, &output).await {
            let message = format!(
                "failed to scale from {observed} to {} replicas: {e}",
                output.effective_replicas
            );
            publish(ctx, scaler, EventType::Warning, reasons::SCALE_FAILED, actions::SCALE, &message).await;
            status.set_condition(ready_condition(scaler, ConditionStatus::False, reasons::SCALE_FAILED, message, now));
            if let Err(status_err) = ctx.kube.patch_status(&name, &namespace, &status).await {
                warn!(error = %status_err, "failed to update status after scale error");
            }
            return Err(e);
        }
        status.last_scale_time = Some(now);
    }

    let instance = instance_key(scaler);
    ctx.metrics
        .set_effective_replicas(&instance, &output.window, output.effective_replicas);
    if let Some(from) = previous.current_window.as_deref() {
        if !from.is_empty() && from != output.window {
            ctx.metrics
                .record_window_transition(&instance, from, &output.window);
        }
    }

    track_grace_period(ctx, scaler, &previous, &output, &mut status).await;

    let (reason, message) = if spec.pause {
        (
            condition_reasons::PAUSED,
            format!(
                "scaler is paused, would run {} replicas (window: {})",
                output.effective_replicas, output.window
            ),
        )
    } else {
        (
            condition_reasons::RECONCILED,
            format!("scaler is ready, window: {}", output.window),
        )
    };
    status.set_condition(ready_condition(scaler, ConditionStatus::True, reason, message, now));

    ctx.kube.patch_status(&name, &namespace, &status).await?;

    Ok(Action::requeue(
        ctx.config.requeue_after(output.next_boundary, now),
    ))
}

/// Write the effective replica count to the target and report it
async fn scale_target(
    ctx: &Context,
    scaler: &TimeWindowScaler,
    observed: i32,
    output: &EngineOutput,
) -> Result<(), Error> {
    let namespace = scaler.namespace().unwrap_or_default();
    let target = scaler.spec.target_ref.name.as_str();
    let target_namespace = scaler.spec.target_namespace(&namespace);
    let desired = output.effective_replicas;

    ctx.kube
        .scale_deployment(target, target_namespace, desired)
        .await?;

    let Some(direction) = ScaleDirection::between(observed, desired) else {
        return Ok(());
    };
    info!(from = observed, to = desired, window = %output.window, "scaled target");

    let reason = match direction {
        ScaleDirection::Up => reasons::SCALED_UP,
        ScaleDirection::Down => reasons::SCALED_DOWN,
    };
    publish(
        ctx,
        scaler,
        EventType::Normal,
        reason,
        actions::SCALE,
        &format!(
            "Scaled from {observed} to {desired} replicas (window: {})",
            output.window
        ),
    )
    .await;
    ctx.metrics
        .record_scale(&instance_key(scaler), direction, &output.window);
    Ok(())
}

/// Set `gracePeriodExpiry` while a scale-down is held and announce hold changes
async fn track_grace_period(
    ctx: &Context,
    scaler: &TimeWindowScaler,
    previous: &TimeWindowScalerStatus,
    output: &EngineOutput,
    status: &mut TimeWindowScalerStatus,
) {
    let holding = output.window == GRACE_PERIOD_WINDOW;
    let expiry = previous
        .last_scale_time
        .filter(|_| holding)
        .map(|last| last + scaler.spec.grace_period());

    match (expiry, previous.grace_period_expiry) {
        (Some(expiry), None) => {
            publish(
                ctx,
                scaler,
                EventType::Normal,
                reasons::GRACE_PERIOD_ACTIVE,
                actions::RECONCILE,
                &format!(
                    "grace period active until {}, holding {} replicas",
                    expiry.to_rfc3339(),
                    output.effective_replicas
                ),
            )
            .await;
        }
        (None, Some(_)) => {
            publish(
                ctx,
                scaler,
                EventType::Normal,
                reasons::GRACE_PERIOD_ENDED,
                actions::RECONCILE,
                "grace period ended, normal scaling resumed",
            )
            .await;
        }
        _ => {}
    }
    status.grace_period_expiry = expiry;
}

/// Release per-scaler resources and drop the finalizer
async fn handle_deletion(scaler: &TimeWindowScaler, ctx: &Context) -> Result<Action, Error> {
    if !has_finalizer(&scaler.metadata, SCALER_FINALIZER) {
        return Ok(Action::await_change());
    }

    info!("scaler deleted, releasing metrics");
    ctx.metrics.forget(&instance_key(scaler));
    publish(
        ctx,
        scaler,
        EventType::Normal,
        reasons::DELETING,
        actions::DELETE,
        "removing metrics and finalizer",
    )
    .await;

    let name = scaler.name_any();
    let namespace = scaler.namespace().unwrap_or_default();
    ctx.kube
        .set_finalizers(&name, &namespace, without_finalizer(&scaler.metadata, SCALER_FINALIZER))
        .await?;
    Ok(Action::await_change())
}

/// Keep the last known decision and mark the scaler not ready
async fn write_degraded_status(
    ctx: &Context,
    scaler: &TimeWindowScaler,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) {
    let mut status = scaler.status.clone().unwrap_or_default();
    status.observed_generation = scaler.metadata.generation;
    status.set_condition(ready_condition(scaler, ConditionStatus::False, reason, message, now));

    let name = scaler.name_any();
    let namespace = scaler.namespace().unwrap_or_default();
    if let Err(e) = ctx.kube.patch_status(&name, &namespace, &status).await {
        warn!(reason, error = %e, "failed to update degraded status");
    }
}

fn ready_condition(
    scaler: &TimeWindowScaler,
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
    now: DateTime<Utc>,
) -> Condition {
    Condition::new(READY_CONDITION, status, reason, message)
        .with_transition_time(now)
        .with_observed_generation(scaler.metadata.generation)
}

/// Label of the window a validation error points at
fn invalid_window_label(scaler: &TimeWindowScaler, err: &Error) -> Option<String> {
    let index: usize = err
        .field()?
        .strip_prefix("spec.windows[")?
        .split(']')
        .next()?
        .parse()
        .ok()?;
    scaler
        .spec
        .windows
        .get(index)
        .map(|w| w.to_window_spec().display_name())
}

fn instance_key(scaler: &TimeWindowScaler) -> InstanceKey {
    InstanceKey::new(scaler.namespace().unwrap_or_default(), scaler.name_any())
}

async fn publish(
    ctx: &Context,
    scaler: &TimeWindowScaler,
    type_: EventType,
    reason: &str,
    action: &str,
    note: &str,
) {
    ctx.events
        .publish(&scaler.object_ref(&()), type_, reason, action, Some(note.to_string()))
        .await;
}
