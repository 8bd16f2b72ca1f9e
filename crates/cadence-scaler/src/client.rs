//! Kubernetes operations the scaler controller performs
//!
//! The controller only talks to the cluster through [`ScalerKubeClient`], so
//! tests can drive every state with a mock.

use std::collections::BTreeSet;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;

#[cfg(test)]
use mockall::automock;

use cadence_common::crd::{TimeWindowScaler, TimeWindowScalerStatus};
use cadence_common::kube_utils::{apply_resource_status, patch_finalizers};
use cadence_common::{Error, FIELD_MANAGER};

/// Replica count the API server assumes when `spec.replicas` is unset
const DEPLOYMENT_DEFAULT_REPLICAS: i32 = 1;

/// Trait abstracting Kubernetes client operations for TimeWindowScaler
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScalerKubeClient: Send + Sync {
    /// Desired replicas of a Deployment, `None` if it does not exist
    async fn get_deployment_replicas(&self, name: &str, namespace: &str)
        -> Result<Option<i32>, Error>;

    /// Set a Deployment's replica count through its scale subresource
    async fn scale_deployment(&self, name: &str, namespace: &str, replicas: i32)
        -> Result<(), Error>;

    /// Keys of a holiday ConfigMap, `None` if it does not exist
    async fn get_holiday_dates(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<BTreeSet<String>>, Error>;

    /// Replace the status of a TimeWindowScaler
    async fn patch_status(
        &self,
        name: &str,
        namespace: &str,
        status: &TimeWindowScalerStatus,
    ) -> Result<(), Error>;

    /// Replace the finalizer list of a TimeWindowScaler
    async fn set_finalizers(
        &self,
        name: &str,
        namespace: &str,
        finalizers: Vec<String>,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeScalerClient {
    client: Client,
}

impl KubeScalerClient {
    /// Create a new KubeScalerClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ScalerKubeClient for KubeScalerClient {
    async fn get_deployment_replicas(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<i32>, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployment = api.get_opt(name).await?;
        Ok(deployment.map(|d| {
            d.spec
                .and_then(|s| s.replicas)
                .unwrap_or(DEPLOYMENT_DEFAULT_REPLICAS)
        }))
    }

    async fn scale_deployment(
        &self,
        name: &str,
        namespace: &str,
        replicas: i32,
    ) -> Result<(), Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "spec": {
                "replicas": replicas
            }
        });
        api.patch_scale(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn get_holiday_dates(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<BTreeSet<String>>, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let config_map = api.get_opt(name).await?;
        Ok(config_map.map(|cm| cm.data.unwrap_or_default().into_keys().collect()))
    }

    async fn patch_status(
        &self,
        name: &str,
        namespace: &str,
        status: &TimeWindowScalerStatus,
    ) -> Result<(), Error> {
        apply_resource_status::<TimeWindowScaler>(
            &self.client,
            name,
            namespace,
            status,
            FIELD_MANAGER,
        )
        .await?;
        Ok(())
    }

    async fn set_finalizers(
        &self,
        name: &str,
        namespace: &str,
        finalizers: Vec<String>,
    ) -> Result<(), Error> {
        patch_finalizers::<TimeWindowScaler>(
            &self.client,
            name,
            namespace,
            &finalizers,
            FIELD_MANAGER,
        )
        .await?;
        Ok(())
    }
}
