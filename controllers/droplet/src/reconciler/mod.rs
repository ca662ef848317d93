//! Reconciliation logic for the droplet operator CRDs.
//!
//! - `instance`: Instance → DigitalOcean droplet
//! - `key_pair`: ImportKeyPair → DigitalOcean account SSH key
//!
//! Every pass loads the latest copy of the resource, decides the next step
//! with `state_machine`, performs the provider calls for that step and saves
//! the result. Provider-side creates are always preceded by a saved
//! `CreateRequested` checkpoint carrying the finalizer.

pub mod instance;
pub mod key_pair;

#[cfg(test)]
mod key_pair_test;

use crate::backoff::FibonacciBackoff;
use crate::config::ControllerConfig;
use crate::credentials::CredentialResolver;
use crate::error::ControllerError;
use crate::metrics;
use crate::provider::ProviderFactory;
use crate::store::ResourceStore;
use crds::{ImportKeyPair, Instance};
use digitalocean_client::{DigitalOceanClientTrait, DigitalOceanError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

/// Result of a successful pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Re-drive the resource after the requeue interval
    pub requeue: bool,
}

impl ReconcileOutcome {
    /// Converged (or gone); wait for the next change
    pub fn done() -> Self {
        Self { requeue: false }
    }

    /// Not converged yet
    pub fn requeue() -> Self {
        Self { requeue: true }
    }
}

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }
}

/// Reconciles Instance and ImportKeyPair resources.
pub struct Reconciler {
    pub(crate) instances: Arc<dyn ResourceStore<Instance>>,
    pub(crate) key_pairs: Arc<dyn ResourceStore<ImportKeyPair>>,
    pub(crate) credentials: CredentialResolver,
    pub(crate) providers: Arc<dyn ProviderFactory>,
    pub(crate) requeue_interval: Duration,
    backoff_min_secs: u64,
    backoff_max_secs: u64,
    /// Error count tracking per resource (kind/namespace/name -> BackoffState);
    /// an entry lives only while the resource keeps failing
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("requeue_interval", &self.requeue_interval)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        instances: Arc<dyn ResourceStore<Instance>>,
        key_pairs: Arc<dyn ResourceStore<ImportKeyPair>>,
        credentials: CredentialResolver,
        providers: Arc<dyn ProviderFactory>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            instances,
            key_pairs,
            credentials,
            providers,
            requeue_interval: config.requeue_interval,
            backoff_min_secs: config.backoff_min_secs,
            backoff_max_secs: config.backoff_max_secs,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Resolve the token from `namespace/secret` and build a provider client
    pub(crate) async fn provider_for(
        &self,
        namespace: &str,
        secret: &str,
    ) -> Result<Box<dyn DigitalOceanClientTrait>, ControllerError> {
        let token = self.credentials.resolve(namespace, secret).await?;
        Ok(self.providers.build(&token)?)
    }

    /// Record a failed pass and return the delay before the next attempt
    ///
    /// Returns (backoff, error_count)
    pub fn next_backoff(&self, resource_key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(|| BackoffState::new(self.backoff_min_secs, self.backoff_max_secs));
                state.error_count += 1;
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (Duration::from_secs(self.backoff_min_secs), 0)
            }
        }
    }

    /// Forget the error history of a resource (on successful reconciliation)
    ///
    /// A deleted resource's last pass succeeds, so its entry is dropped too.
    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }

    #[cfg(test)]
    fn tracked_backoffs(&self) -> usize {
        self.backoff_states.lock().map(|states| states.len()).unwrap_or(0)
    }
}

/// Await a provider call and count it in the metrics
pub(crate) async fn tracked<T, F>(operation: &str, call: F) -> Result<T, DigitalOceanError>
where
    F: Future<Output = Result<T, DigitalOceanError>>,
{
    let result = call.await;
    metrics::record_provider_call(operation, result.is_ok());
    result
}
