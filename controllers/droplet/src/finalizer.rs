//! Finalizer guard.
//!
//! Keeps the Kubernetes object around until the DigitalOcean object it owns
//! has been deleted.

use crds::FINALIZER;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Whether the teardown finalizer is set
pub fn is_present(meta: &ObjectMeta) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|s| s == FINALIZER))
}

/// Add the finalizer; returns whether the metadata changed
pub fn ensure_present(meta: &mut ObjectMeta) -> bool {
    if is_present(meta) {
        return false;
    }
    meta.finalizers.get_or_insert_with(Vec::new).push(FINALIZER.to_string());
    true
}

/// Remove the finalizer; returns whether the metadata changed
///
/// Other controllers' finalizers are left alone.
pub fn ensure_absent(meta: &mut ObjectMeta) -> bool {
    let Some(finalizers) = meta.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != FINALIZER);
    before != finalizers.len()
}
