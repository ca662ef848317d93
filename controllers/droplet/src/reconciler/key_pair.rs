//! ImportKeyPair reconciliation.
//!
//! Lifecycle: Empty → CreateRequested → Provisioned. Keys are imported under
//! a name derived from the resource uid, and recovery after a lost write
//! only ever matches that exact name.

use super::{ReconcileOutcome, Reconciler, tracked};
use crate::error::ControllerError;
use crate::finalizer;
use crate::state_machine::{Step, decide_key_pair};
use crate::store::ResourceKey;
use crds::{ImportKeyPair, ImportKeyPairStatus, KeyPairState};
use digitalocean_client::{DigitalOceanClientTrait, Key, KeyCreateRequest};
use tracing::{debug, error, info, warn};

/// Key type and base64 body of an OpenSSH public key, ignoring the comment
fn key_material(public_key: &str) -> Option<(&str, &str)> {
    let mut parts = public_key.split_whitespace();
    Some((parts.next()?, parts.next()?))
}

/// Prefix of the account key name that marks a key as imported by this operator
pub const KEY_NAME_PREFIX: &str = "droplet-operator-";

/// Account key name owned by one ImportKeyPair
///
/// Keys the user imported by hand never carry this name, so they are never
/// adopted or deleted.
pub fn owned_key_name(key_pair: &ImportKeyPair) -> Result<String, ControllerError> {
    let uid = key_pair
        .metadata
        .uid
        .as_deref()
        .filter(|uid| !uid.is_empty())
        .ok_or_else(|| ControllerError::InvalidSpec("ImportKeyPair has no uid yet".to_string()))?;
    Ok(format!("{KEY_NAME_PREFIX}{uid}"))
}

fn set_state(status: &mut ImportKeyPairStatus, state: KeyPairState) {
    if state > status.lifecycle_state {
        status.lifecycle_state = state;
        status.last_transition_time = Some(chrono::Utc::now());
    }
}

fn provisioned_status(key_pair: &ImportKeyPair, key: &Key) -> ImportKeyPairStatus {
    let mut status = key_pair.status.clone().unwrap_or_default();
    status.id = Some(key.id);
    status.finger_print = Some(key.fingerprint.clone());
    status.message = None;
    set_state(&mut status, KeyPairState::Provisioned);
    status
}

impl Reconciler {
    /// Reconcile one ImportKeyPair
    pub async fn reconcile_key_pair(&self, key: &ResourceKey) -> Result<ReconcileOutcome, ControllerError> {
        let Some(key_pair) = self.key_pairs.load(key).await? else {
            debug!("ImportKeyPair {} no longer exists", key);
            return Ok(ReconcileOutcome::done());
        };

        let state = key_pair
            .status
            .as_ref()
            .map(|s| s.lifecycle_state)
            .unwrap_or_default();
        let deletion_requested = key_pair.metadata.deletion_timestamp.is_some();
        let step = decide_key_pair(state, deletion_requested, finalizer::is_present(&key_pair.metadata));
        info!("Reconciling ImportKeyPair {} (state: {}, step: {:?})", key, state, step);

        match step {
            Step::NoOp => self.settle_key_pair(key, key_pair, deletion_requested).await,
            Step::Delete => self.delete_key_pair(key, key_pair).await,
            Step::RequestCreate | Step::RecoverOrCreate | Step::FetchDetails => {
                self.import_key_pair(key, key_pair, step == Step::RecoverOrCreate).await
            }
        }
    }

    async fn settle_key_pair(
        &self,
        key: &ResourceKey,
        mut key_pair: ImportKeyPair,
        deletion_requested: bool,
    ) -> Result<ReconcileOutcome, ControllerError> {
        if deletion_requested {
            debug!("ImportKeyPair {} is being deleted and holds no finalizer", key);
            return Ok(ReconcileOutcome::done());
        }

        let mut changed = finalizer::ensure_present(&mut key_pair.metadata);
        if let Some(status) = key_pair.status.as_mut() {
            changed |= status.message.take().is_some();
        }
        if changed {
            self.key_pairs.save(&key_pair).await?;
        }
        Ok(ReconcileOutcome::done())
    }

    async fn import_key_pair(
        &self,
        key: &ResourceKey,
        mut key_pair: ImportKeyPair,
        lookup_first: bool,
    ) -> Result<ReconcileOutcome, ControllerError> {
        if key_material(&key_pair.spec.public_key).is_none() {
            let err = ControllerError::InvalidSpec("spec.publicKey is not an OpenSSH public key".to_string());
            return self.fail_key_pair(key, key_pair, err).await;
        }

        let name = match owned_key_name(&key_pair) {
            Ok(name) => name,
            Err(e) => return self.fail_key_pair(key, key_pair, e).await,
        };

        let provider = match self.provider_for(&key.namespace, &key_pair.spec.secret).await {
            Ok(provider) => provider,
            Err(e) => return self.fail_key_pair(key, key_pair, e).await,
        };

        let status = match self
            .create_or_adopt_key(key, provider.as_ref(), &mut key_pair, name, lookup_first)
            .await
        {
            Ok(status) => status,
            Err(ControllerError::Store(e)) => return Err(ControllerError::Store(e)),
            Err(e) => return self.fail_key_pair(key, key_pair, e).await,
        };

        key_pair.status = Some(status);
        finalizer::ensure_present(&mut key_pair.metadata);
        self.key_pairs.save(&key_pair).await?;
        info!("ImportKeyPair {} is provisioned", key);
        Ok(ReconcileOutcome::done())
    }

    /// Save the `CreateRequested` checkpoint, then find or import the key
    async fn create_or_adopt_key(
        &self,
        key: &ResourceKey,
        provider: &dyn DigitalOceanClientTrait,
        key_pair: &mut ImportKeyPair,
        name: String,
        lookup_first: bool,
    ) -> Result<ImportKeyPairStatus, ControllerError> {
        let mut checkpoint = key_pair.clone();
        let status = checkpoint.status.get_or_insert_with(ImportKeyPairStatus::default);
        let before = status.clone();
        set_state(status, KeyPairState::CreateRequested);
        status.message = None;
        let status_changed = *status != before;
        let finalizer_added = finalizer::ensure_present(&mut checkpoint.metadata);
        if status_changed || finalizer_added {
            *key_pair = self.key_pairs.save(&checkpoint).await?;
            debug!("Saved create checkpoint for ImportKeyPair {}", key);
        }

        if lookup_first {
            let keys = tracked("list_keys", provider.list_keys()).await?;
            if let Some(existing) = keys.iter().find(|k| k.name == name) {
                info!("Adopting SSH key {} already imported for ImportKeyPair {}", existing.id, key);
                return Ok(provisioned_status(key_pair, existing));
            }
            debug!("No imported SSH key found for ImportKeyPair {}", key);
        }

        let request = KeyCreateRequest {
            name,
            public_key: key_pair.spec.public_key.trim().to_string(),
        };
        let imported = tracked("create_key", provider.create_key(&request)).await?;
        info!("Imported SSH key {} for ImportKeyPair {}", imported.id, key);
        Ok(provisioned_status(key_pair, &imported))
    }

    async fn delete_key_pair(&self, key: &ResourceKey, mut key_pair: ImportKeyPair) -> Result<ReconcileOutcome, ControllerError> {
        let status = key_pair.status.clone().unwrap_or_default();

        if status.id.is_none() && status.lifecycle_state == KeyPairState::Empty {
            info!("ImportKeyPair {} never reached DigitalOcean; releasing finalizer", key);
        } else {
            let provider = self.provider_for(&key.namespace, &key_pair.spec.secret).await?;
            let targets: Vec<u64> = match status.id {
                Some(id) => vec![id],
                None => {
                    let name = owned_key_name(&key_pair)?;
                    tracked("list_keys", provider.list_keys())
                        .await?
                        .into_iter()
                        .filter(|k| k.name == name)
                        .map(|k| k.id)
                        .collect()
                }
            };

            for id in targets {
                match tracked("delete_key", provider.delete_key(id)).await {
                    Ok(()) => info!("Deleted SSH key {} for ImportKeyPair {}", id, key),
                    Err(e) if e.is_not_found() => info!("SSH key {} for ImportKeyPair {} is already gone", id, key),
                    Err(e) => {
                        error!("Failed to delete SSH key {} for ImportKeyPair {}: {}", id, key, e);
                        return Err(e.into());
                    }
                }
            }
        }

        finalizer::ensure_absent(&mut key_pair.metadata);
        self.key_pairs.save(&key_pair).await?;
        Ok(ReconcileOutcome::done())
    }

    async fn fail_key_pair(
        &self,
        key: &ResourceKey,
        mut key_pair: ImportKeyPair,
        err: ControllerError,
    ) -> Result<ReconcileOutcome, ControllerError> {
        if err.is_transient() {
            warn!("Reconciling ImportKeyPair {} failed, will retry: {}", key, err);
        } else {
            error!("Reconciling ImportKeyPair {} failed: {}", key, err);
        }

        let message = err.to_string();
        let status = key_pair.status.get_or_insert_with(ImportKeyPairStatus::default);
        if status.message.as_deref() != Some(message.as_str()) {
            status.message = Some(message);
            if let Err(save_err) = self.key_pairs.save(&key_pair).await {
                warn!("Failed to record error on ImportKeyPair {}: {}", key, save_err);
            }
        }
        Err(err)
    }
}
