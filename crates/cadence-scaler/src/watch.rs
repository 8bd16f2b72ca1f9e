//! Mapping watched objects back to the scalers that depend on them
//!
//! A Deployment change re-triggers every scaler that targets it; a
//! ConfigMap change re-triggers every scaler in the same namespace that
//! names it as its holiday list. Both are pure functions over a snapshot
//! of scalers, usually the controller's reflector store.

use std::sync::Arc;

use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;

use cadence_common::crd::TimeWindowScaler;

/// Scalers whose `targetRef` points at the Deployment `namespace/name`
pub fn scalers_for_target<'a>(
    name: &str,
    namespace: &str,
    scalers: impl IntoIterator<Item = &'a Arc<TimeWindowScaler>>,
) -> Vec<ObjectRef<TimeWindowScaler>> {
    scalers
        .into_iter()
        .filter(|scaler| {
            let own_namespace = scaler.namespace().unwrap_or_default();
            scaler.spec.target_ref.name == name
                && scaler.spec.target_namespace(&own_namespace) == namespace
        })
        .map(|scaler| object_ref(scaler))
        .collect()
}

/// Scalers in `namespace` whose `holidayConfigMap` is `name`
pub fn scalers_for_holiday_list<'a>(
    name: &str,
    namespace: &str,
    scalers: impl IntoIterator<Item = &'a Arc<TimeWindowScaler>>,
) -> Vec<ObjectRef<TimeWindowScaler>> {
    scalers
        .into_iter()
        .filter(|scaler| {
            scaler.spec.holiday_config_map.as_deref() == Some(name)
                && scaler.namespace().as_deref() == Some(namespace)
        })
        .map(|scaler| object_ref(scaler))
        .collect()
}

fn object_ref(scaler: &TimeWindowScaler) -> ObjectRef<TimeWindowScaler> {
    let r = ObjectRef::new(&scaler.name_any());
    match scaler.namespace() {
        Some(ns) => r.within(&ns),
        None => r,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_common::crd::{TargetRef, TimeWindowScalerSpec};

    fn scaler(
        name: &str,
        namespace: &str,
        target: &str,
        target_namespace: Option<&str>,
        holidays: Option<&str>,
    ) -> Arc<TimeWindowScaler> {
        let mut s = TimeWindowScaler::new(
            name,
            TimeWindowScalerSpec {
                target_ref: TargetRef {
                    name: target.to_string(),
                    namespace: target_namespace.map(String::from),
                },
                default_replicas: 1,
                timezone: "UTC".to_string(),
                windows: vec![],
                holiday_mode: Default::default(),
                holiday_config_map: holidays.map(String::from),
                grace_period_seconds: 300,
                pause: false,
            },
        );
        s.metadata.namespace = Some(namespace.to_string());
        Arc::new(s)
    }

    fn names(refs: &[ObjectRef<TimeWindowScaler>]) -> Vec<String> {
        refs.iter().map(|r| format!("{}/{}", r.namespace.as_deref().unwrap_or(""), r.name)).collect()
    }

    #[test]
    fn target_matches_on_name_and_resolved_namespace() {
        let scalers = vec![
            scaler("web-hours", "shop", "web", None, None),
            scaler("web-remote", "ops", "web", Some("shop"), None),
            scaler("api-hours", "shop", "api", None, None),
            scaler("web-other", "other", "web", None, None),
        ];

        let refs = scalers_for_target("web", "shop", &scalers);

        assert_eq!(names(&refs), vec!["shop/web-hours", "ops/web-remote"]);
    }

    #[test]
    fn holiday_list_matches_only_same_namespace() {
        let scalers = vec![
            scaler("web-hours", "shop", "web", None, Some("holidays")),
            scaler("api-hours", "shop", "api", None, Some("other-holidays")),
            scaler("ops-hours", "ops", "web", None, Some("holidays")),
            scaler("bare", "shop", "web", None, None),
        ];

        let refs = scalers_for_holiday_list("holidays", "shop", &scalers);

        assert_eq!(names(&refs), vec!["shop/web-hours"]);
    }

    #[test]
    fn empty_snapshot_maps_to_nothing() {
        let scalers: Vec<Arc<TimeWindowScaler>> = vec![];
        assert!(scalers_for_target("web", "shop", &scalers).is_empty());
    }
}
