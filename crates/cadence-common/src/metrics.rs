//! Metrics for TimeWindowScaler observability
//!
//! Provides OpenTelemetry metrics for:
//! - Scale operations (per scaler, by direction and window)
//! - Effective replicas (per scaler)
//! - Window transitions (per scaler, from/to label)
//! - Reconciliation duration (per scaler, by result)
//!
//! Every series is keyed by scaler identity. Counters and the gauge live in
//! instance-keyed maps that observable instruments read at collection time,
//! so [`ScalerObserver::forget`] drops them for a deleted scaler. The duration
//! histogram is recorded directly; the exporter runs with delta temporality
//! (see [`crate::telemetry`]), so a scaler that no longer reconciles stops
//! producing histogram points.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use opentelemetry::metrics::{Histogram, Meter, ObservableCounter, ObservableGauge};
use opentelemetry::KeyValue;

use crate::telemetry::scaler_meter;

/// Bucket boundaries (seconds) of the reconcile duration histogram
pub const DURATION_BUCKETS: [f64; 10] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

// ============================================================================
// Label Types
// ============================================================================

/// Identity of one TimeWindowScaler
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey {
    /// Scaler namespace
    pub namespace: String,
    /// Scaler name
    pub name: String,
}

impl InstanceKey {
    /// Create a key from namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    fn attributes(&self) -> [KeyValue; 2] {
        [
            KeyValue::new("namespace", self.namespace.clone()),
            KeyValue::new("name", self.name.clone()),
        ]
    }
}

impl std::fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Labels for scale direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScaleDirection {
    /// More replicas
    Up,
    /// Fewer replicas
    Down,
}

impl ScaleDirection {
    /// Direction of a change from `from` to `to`, if any
    pub fn between(from: i32, to: i32) -> Option<Self> {
        match to.cmp(&from) {
            std::cmp::Ordering::Greater => Some(Self::Up),
            std::cmp::Ordering::Less => Some(Self::Down),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// Labels for reconcile result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileOutcome {
    /// Cycle completed
    Success,
    /// Cycle returned an error
    Error,
}

impl ReconcileOutcome {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

// ============================================================================
// Observer
// ============================================================================

/// Sink for per-scaler measurements, injected into the controller context
pub trait ScalerObserver: Send + Sync {
    /// Count one scale action
    fn record_scale(&self, instance: &InstanceKey, direction: ScaleDirection, window: &str);

    /// Publish the replicas the schedule currently calls for
    fn set_effective_replicas(&self, instance: &InstanceKey, window: &str, replicas: i32);

    /// Count a change of the active window label
    fn record_window_transition(&self, instance: &InstanceKey, from: &str, to: &str);

    /// Record how long one reconcile cycle took
    fn observe_reconcile(&self, instance: &InstanceKey, outcome: ReconcileOutcome, duration: Duration);

    /// Drop every series of a deleted scaler
    fn forget(&self, instance: &InstanceKey);
}

#[derive(Default)]
struct SeriesState {
    scale_operations: DashMap<(InstanceKey, ScaleDirection, String), u64>,
    effective_replicas: DashMap<InstanceKey, (String, i64)>,
    window_transitions: DashMap<(InstanceKey, String, String), u64>,
    reconcile_cycles: DashMap<(InstanceKey, ReconcileOutcome), u64>,
}

/// OpenTelemetry-backed [`ScalerObserver`]
pub struct ScalerMetrics {
    state: Arc<SeriesState>,
    _scale_operations: ObservableCounter<u64>,
    _effective_replicas: ObservableGauge<i64>,
    _window_transitions: ObservableCounter<u64>,
    reconcile_duration: Histogram<f64>,
}

impl ScalerMetrics {
    /// Register instruments on the process-wide scaler meter
    pub fn global() -> Self {
        Self::new(&scaler_meter())
    }

    /// Register instruments on the given meter
    pub fn new(meter: &Meter) -> Self {
        let state = Arc::new(SeriesState::default());

        let s = Arc::clone(&state);
        let scale_operations = meter
            .u64_observable_counter("cadence_scale_operations_total")
            .with_description("Total number of scale actions issued")
            .with_unit("{operations}")
            .with_callback(move |observer| {
                for entry in s.scale_operations.iter() {
                    let (instance, direction, window) = entry.key();
                    let [ns, name] = instance.attributes();
                    observer.observe(
                        *entry.value(),
                        &[
                            ns,
                            name,
                            KeyValue::new("direction", direction.as_str()),
                            KeyValue::new("window", window.clone()),
                        ],
                    );
                }
            })
            .build();

        let s = Arc::clone(&state);
        let effective_replicas = meter
            .i64_observable_gauge("cadence_effective_replicas")
            .with_description("Replicas the schedule currently calls for")
            .with_unit("{replicas}")
            .with_callback(move |observer| {
                for entry in s.effective_replicas.iter() {
                    let (window, replicas) = entry.value();
                    let [ns, name] = entry.key().attributes();
                    observer.observe(*replicas, &[ns, name, KeyValue::new("window", window.clone())]);
                }
            })
            .build();

        let s = Arc::clone(&state);
        let window_transitions = meter
            .u64_observable_counter("cadence_window_transitions_total")
            .with_description("Total number of active window changes")
            .with_unit("{transitions}")
            .with_callback(move |observer| {
                for entry in s.window_transitions.iter() {
                    let (instance, from, to) = entry.key();
                    let [ns, name] = instance.attributes();
                    observer.observe(
                        *entry.value(),
                        &[
                            ns,
                            name,
                            KeyValue::new("from", from.clone()),
                            KeyValue::new("to", to.clone()),
                        ],
                    );
                }
            })
            .build();

        let reconcile_duration = meter
            .f64_histogram("cadence_reconcile_duration_seconds")
            .with_description("Duration of scaler reconciliation in seconds")
            .with_unit("s")
            .with_boundaries(DURATION_BUCKETS.to_vec())
            .build();

        Self {
            state,
            _scale_operations: scale_operations,
            _effective_replicas: effective_replicas,
            _window_transitions: window_transitions,
            reconcile_duration,
        }
    }

    /// Scale actions recorded for a scaler in one direction, across windows
    pub fn scale_operations(&self, instance: &InstanceKey, direction: ScaleDirection) -> u64 {
        self.state
            .scale_operations
            .iter()
            .filter(|e| &e.key().0 == instance && e.key().1 == direction)
            .map(|e| *e.value())
            .sum()
    }

    /// Current effective replicas and window of a scaler
    pub fn effective_replicas(&self, instance: &InstanceKey) -> Option<(String, i64)> {
        self.state
            .effective_replicas
            .get(instance)
            .map(|e| e.value().clone())
    }

    /// Window transitions recorded for a scaler
    pub fn window_transitions(&self, instance: &InstanceKey) -> u64 {
        self.state
            .window_transitions
            .iter()
            .filter(|e| &e.key().0 == instance)
            .map(|e| *e.value())
            .sum()
    }

    /// Reconcile cycles recorded for a scaler with the given result
    pub fn reconcile_count(&self, instance: &InstanceKey, outcome: ReconcileOutcome) -> u64 {
        self.state
            .reconcile_cycles
            .get(&(instance.clone(), outcome))
            .map(|e| *e.value())
            .unwrap_or(0)
    }

    /// Number of live series keys held for a scaler
    pub fn series_count(&self, instance: &InstanceKey) -> usize {
        let s = &self.state;
        s.scale_operations.iter().filter(|e| &e.key().0 == instance).count()
            + usize::from(s.effective_replicas.contains_key(instance))
            + s.window_transitions.iter().filter(|e| &e.key().0 == instance).count()
            + s.reconcile_cycles.iter().filter(|e| &e.key().0 == instance).count()
    }
}

impl ScalerObserver for ScalerMetrics {
    fn record_scale(&self, instance: &InstanceKey, direction: ScaleDirection, window: &str) {
        *self
            .state
            .scale_operations
            .entry((instance.clone(), direction, window.to_string()))
            .or_insert(0) += 1;
    }

    fn set_effective_replicas(&self, instance: &InstanceKey, window: &str, replicas: i32) {
        self.state
            .effective_replicas
            .insert(instance.clone(), (window.to_string(), i64::from(replicas)));
    }

    fn record_window_transition(&self, instance: &InstanceKey, from: &str, to: &str) {
        *self
            .state
            .window_transitions
            .entry((instance.clone(), from.to_string(), to.to_string()))
            .or_insert(0) += 1;
    }

    fn observe_reconcile(&self, instance: &InstanceKey, outcome: ReconcileOutcome, duration: Duration) {
        *self
            .state
            .reconcile_cycles
            .entry((instance.clone(), outcome))
            .or_insert(0) += 1;
        let [ns, name] = instance.attributes();
        self.reconcile_duration.record(
            duration.as_secs_f64(),
            &[ns, name, KeyValue::new("result", outcome.as_str())],
        );
    }

    fn forget(&self, instance: &InstanceKey) {
        let s = &self.state;
        s.scale_operations.retain(|(i, _, _), _| i != instance);
        s.effective_replicas.remove(instance);
        s.window_transitions.retain(|(i, _, _), _| i != instance);
        s.reconcile_cycles.retain(|(i, _), _| i != instance);
    }
}

// ============================================================================
// Metric Recording Helpers
// ============================================================================

/// Record a reconciliation with timing
pub struct ReconcileTimer {
    observer: Arc<dyn ScalerObserver>,
    instance: InstanceKey,
    start: Instant,
}

impl ReconcileTimer {
    /// Start timing a reconciliation
    pub fn start(observer: Arc<dyn ScalerObserver>, instance: InstanceKey) -> Self {
        Self {
            observer,
            instance,
            start: Instant::now(),
        }
    }

    /// Record successful completion
    pub fn success(self) {
        self.finish(ReconcileOutcome::Success);
    }

    /// Record error completion
    pub fn error(self) {
        self.finish(ReconcileOutcome::Error);
    }

    fn finish(self, outcome: ReconcileOutcome) {
        self.observer
            .observe_reconcile(&self.instance, outcome, self.start.elapsed());
    }
}
