//! Kubernetes API helpers shared by the controller and the operator binary

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

/// Replace the status sub-resource of a namespaced resource.
///
/// Uses server-side apply with a forced field manager, so the written
/// status is the complete set of fields this manager owns: fields left out
/// of `status` are removed rather than kept from the previous write.
pub async fn apply_resource_status<T>(
    client: &Client,
    name: &str,
    namespace: &str,
    status: &impl Serialize,
    field_manager: &str,
) -> std::result::Result<(), kube::Error>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + std::fmt::Debug,
    <T as Resource>::DynamicType: Default,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let patch = status_apply_patch::<T>(status);
    api.patch_status(name, &PatchParams::apply(field_manager).force(), &Patch::Apply(&patch))
        .await?;
    Ok(())
}

/// Replace the finalizer list of a namespaced resource via merge-patch
pub async fn patch_finalizers<T>(
    client: &Client,
    name: &str,
    namespace: &str,
    finalizers: &[String],
    field_manager: &str,
) -> std::result::Result<(), kube::Error>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + std::fmt::Debug,
    <T as Resource>::DynamicType: Default,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({
        "metadata": {
            "finalizers": finalizers
        }
    });
    api.patch(name, &PatchParams::apply(field_manager), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Install or update a CRD with server-side apply
pub async fn ensure_crd_installed(
    client: &Client,
    crd: &CustomResourceDefinition,
    field_manager: &str,
) -> std::result::Result<(), kube::Error> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let name = crd.metadata.name.as_deref().unwrap_or_default();
    crds.patch(
        name,
        &PatchParams::apply(field_manager).force(),
        &Patch::Apply(crd),
    )
    .await?;
    info!(crd = %name, "CRD installed");
    Ok(())
}

fn status_apply_patch<T>(status: &impl Serialize) -> serde_json::Value
where
    T: Resource,
    <T as Resource>::DynamicType: Default,
{
    let dt = T::DynamicType::default();
    serde_json::json!({
        "apiVersion": T::api_version(&dt),
        "kind": T::kind(&dt),
        "status": status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{TimeWindowScaler, TimeWindowScalerStatus};

    #[test]
    fn status_patch_carries_type_meta() {
        let status = TimeWindowScalerStatus {
            effective_replicas: Some(3),
            ..Default::default()
        };
        let patch = status_apply_patch::<TimeWindowScaler>(&status);
        assert_eq!(patch["apiVersion"], "cadence.dev/v1alpha1");
        assert_eq!(patch["kind"], "TimeWindowScaler");
        assert_eq!(patch["status"]["effectiveReplicas"], 3);
        assert!(patch["status"].get("gracePeriodExpiry").is_none());
    }
}
