//! Instance reconciliation.
//!
//! Lifecycle: Empty → CreateRequested → Submitted → Provisioned.
//!
//! Every droplet is created with an ownership tag derived from the object's
//! uid. A pass that finds `CreateRequested` (the previous pass may have
//! created the droplet and then failed to save) looks the droplet up by that
//! tag before creating anything.

use super::{ReconcileOutcome, Reconciler, tracked};
use crate::error::ControllerError;
use crate::finalizer;
use crate::state_machine::{Step, decide_instance};
use crate::store::ResourceKey;
use crds::{Instance, InstanceSpec, InstanceState, InstanceStatus};
use digitalocean_client::{
    DigitalOceanClientTrait, Droplet, DropletCreateImage, DropletCreateRequest, DropletCreateSshKey,
    DropletCreateVolume,
};
use tracing::{debug, error, info, warn};

/// Prefix of the tag that marks a droplet as owned by an Instance
pub const OWNER_TAG_PREFIX: &str = "droplet-operator:";

/// Ownership tag for an Instance (`droplet-operator:<uid>`)
pub fn owner_tag(instance: &Instance) -> Result<String, ControllerError> {
    let uid = instance
        .metadata
        .uid
        .as_deref()
        .filter(|uid| !uid.is_empty())
        .ok_or_else(|| ControllerError::InvalidSpec("Instance has no uid yet".to_string()))?;
    Ok(format!("{OWNER_TAG_PREFIX}{uid}"))
}

/// Translate an Instance spec into a droplet create request
///
/// The image slug wins over the image id; an ssh key id wins over its fingerprint.
pub fn droplet_request(spec: &InstanceSpec, owner_tag: &str) -> Result<DropletCreateRequest, ControllerError> {
    let invalid = |msg: &str| ControllerError::InvalidSpec(msg.to_string());

    for (field, value) in [("name", &spec.name), ("region", &spec.region), ("size", &spec.size)] {
        if value.trim().is_empty() {
            return Err(invalid(&format!("spec.{field} must not be empty")));
        }
    }

    let image = match (spec.image.slug.as_deref(), spec.image.id) {
        (Some(slug), _) if !slug.trim().is_empty() => DropletCreateImage::Slug(slug.to_string()),
        (_, Some(id)) if id != 0 => DropletCreateImage::Id(id),
        _ => return Err(invalid("spec.image needs a slug or an id")),
    };

    let ssh_keys = spec
        .ssh_keys
        .iter()
        .map(|key| match (key.id, key.fingerprint.as_deref()) {
            (Some(id), _) if id != 0 => Ok(DropletCreateSshKey::Id(id)),
            (_, Some(fp)) if !fp.trim().is_empty() => Ok(DropletCreateSshKey::Fingerprint(fp.to_string())),
            _ => Err(invalid("spec.sshKeys entries need an id or a fingerprint")),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let volumes = spec
        .volumes
        .iter()
        .map(|volume| match (volume.id.as_deref(), volume.name.as_deref()) {
            (Some(id), _) if !id.trim().is_empty() => Ok(DropletCreateVolume::Id(id.to_string())),
            (_, Some(name)) if !name.trim().is_empty() => Ok(DropletCreateVolume::Name { name: name.to_string() }),
            _ => Err(invalid("spec.volumes entries need an id or a name")),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut tags = spec.tags.clone();
    if !tags.iter().any(|t| t == owner_tag) {
        tags.push(owner_tag.to_string());
    }

    Ok(DropletCreateRequest {
        name: spec.name.clone(),
        region: spec.region.clone(),
        size: spec.size.clone(),
        image,
        ssh_keys,
        backups: spec.backups,
        ipv6: spec.ipv6,
        private_networking: spec.private_networking,
        monitoring: spec.monitoring,
        user_data: spec.user_data.clone().filter(|u| !u.is_empty()),
        volumes,
        tags,
        vpc_uuid: spec.vpc_uuid.clone().filter(|v| !v.is_empty()),
    })
}

/// Move the lifecycle forward; never backwards
fn set_state(status: &mut InstanceStatus, state: InstanceState) {
    if state > status.lifecycle_state {
        status.lifecycle_state = state;
        status.last_transition_time = Some(chrono::Utc::now());
    }
}

fn submitted_status(instance: &Instance, droplet: &Droplet) -> InstanceStatus {
    let mut status = instance.status.clone().unwrap_or_default();
    status.instance_id = Some(droplet.id);
    status.message = None;
    set_state(&mut status, InstanceState::Submitted);
    status
}

impl Reconciler {
    /// Reconcile one Instance
    pub async fn reconcile_instance(&self, key: &ResourceKey) -> Result<ReconcileOutcome, ControllerError> {
        let Some(instance) = self.instances.load(key).await? else {
            debug!("Instance {} no longer exists", key);
            return Ok(ReconcileOutcome::done());
        };

        let state = instance
            .status
            .as_ref()
            .map(|s| s.lifecycle_state)
            .unwrap_or_default();
        let deletion_requested = instance.metadata.deletion_timestamp.is_some();
        let step = decide_instance(state, deletion_requested, finalizer::is_present(&instance.metadata));
        info!("Reconciling Instance {} (state: {}, step: {:?})", key, state, step);

        match step {
            Step::NoOp => self.settle_instance(key, instance, deletion_requested).await,
            Step::Delete => self.delete_instance(key, instance).await,
            Step::RequestCreate | Step::RecoverOrCreate | Step::FetchDetails => {
                self.advance_instance(key, instance, step).await
            }
        }
    }

    /// Terminal or finalizer-less deleting object: only keep metadata tidy
    async fn settle_instance(
        &self,
        key: &ResourceKey,
        mut instance: Instance,
        deletion_requested: bool,
    ) -> Result<ReconcileOutcome, ControllerError> {
        if deletion_requested {
            debug!("Instance {} is being deleted and holds no finalizer", key);
            return Ok(ReconcileOutcome::done());
        }

        let mut changed = finalizer::ensure_present(&mut instance.metadata);
        if let Some(status) = instance.status.as_mut() {
            changed |= status.message.take().is_some();
        }
        if changed {
            self.instances.save(&instance).await?;
        }
        Ok(ReconcileOutcome::done())
    }

    /// Run one forward step: create, recover, or fetch details
    async fn advance_instance(
        &self,
        key: &ResourceKey,
        mut instance: Instance,
        step: Step,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let provider = match self.provider_for(&key.namespace, &instance.spec.secret).await {
            Ok(provider) => provider,
            Err(e) => return self.fail_instance(key, instance, e).await,
        };

        let known_id = instance.status.as_ref().and_then(|s| s.instance_id);
        let result = match (step, known_id) {
            (Step::FetchDetails, Some(id)) => self.fetch_droplet_details(provider.as_ref(), &instance, id).await,
            (Step::FetchDetails, None) => {
                warn!("Instance {} is Submitted without a droplet id; looking it up by ownership tag", key);
                self.create_or_adopt_droplet(key, provider.as_ref(), &mut instance, true).await
            }
            (Step::RecoverOrCreate, _) => {
                self.create_or_adopt_droplet(key, provider.as_ref(), &mut instance, true).await
            }
            _ => self.create_or_adopt_droplet(key, provider.as_ref(), &mut instance, false).await,
        };

        let status = match result {
            Ok(status) => status,
            // Never overwrite a possibly half-written checkpoint with an older copy
            Err(ControllerError::Store(e)) => return Err(ControllerError::Store(e)),
            Err(e) => return self.fail_instance(key, instance, e).await,
        };

        let converged = status.lifecycle_state.is_terminal();
        instance.status = Some(status);
        finalizer::ensure_present(&mut instance.metadata);
        self.instances.save(&instance).await?;

        Ok(if converged {
            info!("Instance {} is provisioned", key);
            ReconcileOutcome::done()
        } else {
            ReconcileOutcome::requeue()
        })
    }

    /// Save the `CreateRequested` checkpoint, then find or create the droplet
    ///
    /// `instance` is replaced by the saved checkpoint so later writes start
    /// from the persisted state.
    async fn create_or_adopt_droplet(
        &self,
        key: &ResourceKey,
        provider: &dyn DigitalOceanClientTrait,
        instance: &mut Instance,
        lookup_first: bool,
    ) -> Result<InstanceStatus, ControllerError> {
        let tag = owner_tag(instance)?;
        let request = droplet_request(&instance.spec, &tag)?;

        let mut checkpoint = instance.clone();
        let status = checkpoint.status.get_or_insert_with(InstanceStatus::default);
        let before = status.clone();
        set_state(status, InstanceState::CreateRequested);
        status.message = None;
        let status_changed = *status != before;
        let finalizer_added = finalizer::ensure_present(&mut checkpoint.metadata);
        if status_changed || finalizer_added {
            *instance = self.instances.save(&checkpoint).await?;
            debug!("Saved create checkpoint for Instance {}", key);
        }

        if lookup_first {
            let mut owned = tracked("list_droplets", provider.list_droplets_by_tag(&tag)).await?;
            owned.sort_by_key(|d| d.id);
            if owned.len() > 1 {
                warn!(
                    "Found {} droplets tagged {} for Instance {}; adopting the oldest",
                    owned.len(),
                    tag,
                    key
                );
            }
            if let Some(droplet) = owned.first() {
                info!("Adopting droplet {} already created for Instance {}", droplet.id, key);
                return Ok(submitted_status(instance, droplet));
            }
            debug!("No droplet tagged {} found for Instance {}", tag, key);
        }

        let droplet = tracked("create_droplet", provider.create_droplet(&request)).await?;
        info!("Created droplet {} for Instance {}", droplet.id, key);
        Ok(submitted_status(instance, &droplet))
    }

    /// Read the droplet's addresses; `NotReady` until they are assigned
    async fn fetch_droplet_details(
        &self,
        provider: &dyn DigitalOceanClientTrait,
        instance: &Instance,
        id: u64,
    ) -> Result<InstanceStatus, ControllerError> {
        let droplet = tracked("get_droplet", provider.get_droplet(id)).await?;

        let private_ip = droplet.private_ipv4().ok_or_else(|| {
            ControllerError::NotReady(format!(
                "droplet {id} has no private IPv4 address yet (status: {})",
                droplet.status
            ))
        })?;
        let public_ip = if instance.spec.private_networking {
            None
        } else {
            let ip = droplet.public_ipv4().ok_or_else(|| {
                ControllerError::NotReady(format!(
                    "droplet {id} has no public IPv4 address yet (status: {})",
                    droplet.status
                ))
            })?;
            Some(ip.to_string())
        };

        let mut status = instance.status.clone().unwrap_or_default();
        status.private_ip = Some(private_ip.to_string());
        status.public_ip = public_ip;
        status.message = None;
        set_state(&mut status, InstanceState::Provisioned);
        Ok(status)
    }

    /// Delete the droplet (if any was created), then release the finalizer
    async fn delete_instance(&self, key: &ResourceKey, mut instance: Instance) -> Result<ReconcileOutcome, ControllerError> {
        let status = instance.status.clone().unwrap_or_default();

        if status.instance_id.is_none() && status.lifecycle_state == InstanceState::Empty {
            info!("Instance {} never reached DigitalOcean; releasing finalizer", key);
        } else {
            let provider = self.provider_for(&key.namespace, &instance.spec.secret).await?;
            let targets: Vec<u64> = match status.instance_id {
                Some(id) => vec![id],
                None => {
                    let tag = owner_tag(&instance)?;
                    tracked("list_droplets", provider.list_droplets_by_tag(&tag))
                        .await?
                        .into_iter()
                        .map(|d| d.id)
                        .collect()
                }
            };

            for id in targets {
                match tracked("delete_droplet", provider.delete_droplet(id)).await {
                    Ok(()) => info!("Deleted droplet {} for Instance {}", id, key),
                    Err(e) if e.is_not_found() => info!("Droplet {} for Instance {} is already gone", id, key),
                    Err(e) => {
                        error!("Failed to delete droplet {} for Instance {}: {}", id, key, e);
                        return Err(e.into());
                    }
                }
            }
        }

        finalizer::ensure_absent(&mut instance.metadata);
        self.instances.save(&instance).await?;
        Ok(ReconcileOutcome::done())
    }

    /// Record the error in `status.message` and hand it back for backoff
    async fn fail_instance(
        &self,
        key: &ResourceKey,
        mut instance: Instance,
        err: ControllerError,
    ) -> Result<ReconcileOutcome, ControllerError> {
        if err.is_transient() {
            warn!("Reconciling Instance {} failed, will retry: {}", key, err);
        } else {
            error!("Reconciling Instance {} failed: {}", key, err);
        }

        let message = err.to_string();
        let status = instance.status.get_or_insert_with(InstanceStatus::default);
        if status.message.as_deref() != Some(message.as_str()) {
            status.message = Some(message);
            if let Err(save_err) = self.instances.save(&instance).await {
                warn!("Failed to record error on Instance {}: {}", key, save_err);
            }
        }
        Err(err)
    }
}
