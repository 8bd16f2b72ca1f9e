//! Finalizer list transformations
//!
//! Finalizers are modeled as a value in the resource's metadata: these
//! helpers compute the new list and never mutate the object they read.
//! Callers write the result back with an explicit patch.

use kube::api::ObjectMeta;

/// Whether `finalizer` is present on the object
pub fn has_finalizer(meta: &ObjectMeta, finalizer: &str) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|s| s == finalizer))
}

/// The object's finalizers with `finalizer` appended if missing
pub fn with_finalizer(meta: &ObjectMeta, finalizer: &str) -> Vec<String> {
    let mut finalizers = meta.finalizers.clone().unwrap_or_default();
    if !finalizers.iter().any(|s| s == finalizer) {
        finalizers.push(finalizer.to_string());
    }
    finalizers
}

/// The object's finalizers with every occurrence of `finalizer` removed
pub fn without_finalizer(meta: &ObjectMeta, finalizer: &str) -> Vec<String> {
    meta.finalizers
        .as_ref()
        .map(|f| f.iter().filter(|s| *s != finalizer).cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const F: &str = "cadence.dev/cleanup";

    fn meta(finalizers: Option<Vec<&str>>) -> ObjectMeta {
        ObjectMeta {
            finalizers: finalizers.map(|f| f.into_iter().map(String::from).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn detects_presence() {
        assert!(!has_finalizer(&meta(None), F));
        assert!(!has_finalizer(&meta(Some(vec!["other"])), F));
        assert!(has_finalizer(&meta(Some(vec!["other", F])), F));
    }

    #[test]
    fn add_is_idempotent_and_keeps_others() {
        let m = meta(Some(vec!["other"]));
        let added = with_finalizer(&m, F);
        assert_eq!(added, vec!["other".to_string(), F.to_string()]);

        let again = with_finalizer(&meta(Some(vec!["other", F])), F);
        assert_eq!(again.len(), 2);
        // source object untouched
        assert_eq!(m.finalizers.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn remove_keeps_others() {
        let removed = without_finalizer(&meta(Some(vec![F, "other"])), F);
        assert_eq!(removed, vec!["other".to_string()]);
        assert!(without_finalizer(&meta(None), F).is_empty());
    }
}
