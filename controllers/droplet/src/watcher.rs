//! Kubernetes resource watchers.
//!
//! Both kinds go through `watch_resource()`, which drives a
//! `kube_runtime::Controller` and maps reconciler outcomes onto requeue
//! actions. Failed passes are retried with a per-resource Fibonacci backoff.

use crate::error::ControllerError;
use crate::metrics;
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::store::ResourceKey;
use crds::{ImportKeyPair, Instance};
use futures::StreamExt;
use futures::future::BoxFuture;
use kube::Api;
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::{Controller, watcher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Drive `reconcile_fn` for every object of kind `K` until shutdown.
///
/// Events are debounced for 5 seconds and at most 3 objects of the kind are
/// reconciled at once.
async fn watch_resource<K, F>(
    api: Api<K>,
    reconciler: Arc<Reconciler>,
    reconcile_fn: F,
    kind: &'static str,
) -> Result<(), ControllerError>
where
    K: kube::Resource + Clone + Send + Sync + 'static + std::fmt::Debug + serde::de::DeserializeOwned,
    K::DynamicType: Default + std::cmp::Eq + std::hash::Hash + Clone + std::fmt::Debug + Unpin,
    F: Fn(Arc<Reconciler>, ResourceKey) -> BoxFuture<'static, Result<ReconcileOutcome, ControllerError>>
        + Send
        + Sync
        + Clone
        + 'static,
{
    info!("Starting {} watcher", kind);

    let error_policy = move |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
        let key = ResourceKey::of(obj.as_ref());
        let (backoff, error_count) = ctx.next_backoff(&format!("{kind}/{key}"));
        warn!(
            "Reconciliation of {} {} failed (attempt {}), retrying in {:?}: {}",
            kind, key, error_count, backoff, error
        );
        metrics::increment_requeues(kind, "error-backoff");
        Action::requeue(backoff)
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        async move {
            let key = ResourceKey::of(obj.as_ref());
            debug!("Reconciling {} {}", kind, key);

            let started = Instant::now();
            let result = reconcile_fn(ctx.clone(), key.clone()).await;
            metrics::record_reconciliation(kind, result.is_ok(), started.elapsed().as_secs_f64());

            let outcome = result?;
            ctx.reset_error(&format!("{kind}/{key}"));
            if outcome.requeue {
                metrics::increment_requeues(kind, "not-converged");
                Ok(Action::requeue(ctx.requeue_interval))
            } else {
                Ok(Action::await_change())
            }
        }
    };

    let runtime_config = RuntimeConfig::default()
        .debounce(Duration::from_secs(5))
        .concurrency(3);

    Controller::new(api, watcher::Config::default())
        .with_config(runtime_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            if let Err(e) = res {
                error!("Controller error for {}: {}", kind, e);
            }
        })
        .await;

    info!("{} watcher stopped", kind);
    Ok(())
}

/// Watches Instance and ImportKeyPair resources.
///
/// Each watch is handed the `Api` for its own kind; clones share the reconciler.
#[derive(Clone)]
pub struct Watcher {
    reconciler: Arc<Reconciler>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    /// Starts watching Instance resources.
    pub async fn watch_instances(&self, api: Api<Instance>) -> Result<(), ControllerError> {
        watch_resource(
            api,
            self.reconciler.clone(),
            |reconciler, key| Box::pin(async move { reconciler.reconcile_instance(&key).await }),
            "Instance",
        )
        .await
    }

    /// Starts watching ImportKeyPair resources.
    pub async fn watch_key_pairs(&self, api: Api<ImportKeyPair>) -> Result<(), ControllerError> {
        watch_resource(
            api,
            self.reconciler.clone(),
            |reconciler, key| Box::pin(async move { reconciler.reconcile_key_pair(&key).await }),
            "ImportKeyPair",
        )
        .await
    }
}
