//! Controller runner - wires the TimeWindowScaler controller and its watches

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource, ResourceExt};

use cadence_common::crd::TimeWindowScaler;
use cadence_scaler::{
    error_policy, reconcile, scalers_for_holiday_list, scalers_for_target, Context, ScalerConfig,
};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Run the TimeWindowScaler controller until shutdown
///
/// Scalers are re-triggered by their own changes, by changes to the
/// Deployments they target and by changes to their holiday ConfigMaps.
pub async fn build_scaler_controller(client: Client, namespace: Option<&str>, config: ScalerConfig) {
    let ctx = Arc::new(Context::builder(client.clone()).config(config).build());

    let scalers: Api<TimeWindowScaler> = scoped_api(&client, namespace);
    let deployments: Api<Deployment> = scoped_api(&client, namespace);
    let config_maps: Api<ConfigMap> = scoped_api(&client, namespace);

    let controller = Controller::new(scalers, watcher_config());
    let by_target = controller.store();
    let by_holiday_list = by_target.clone();

    tracing::info!("- TimeWindowScaler controller");

    controller
        .watches(deployments, watcher_config(), move |deployment| {
            let name = deployment.name_any();
            let ns = deployment.namespace().unwrap_or_default();
            scalers_for_target(&name, &ns, &by_target.state())
        })
        .watches(config_maps, watcher_config(), move |config_map| {
            let name = config_map.name_any();
            let ns = config_map.namespace().unwrap_or_default();
            scalers_for_holiday_list(&name, &ns, &by_holiday_list.state())
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("TimeWindowScaler"))
        .await;
}

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
