//! Persistence of managed resources.
//!
//! The reconciler only ever needs two things from the cluster: load the latest
//! copy of a resource, and write back its status and finalizer list.

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;
use tracing::debug;

/// Field manager used for status and metadata patches
pub const FIELD_MANAGER: &str = "droplet-controller";

/// Namespaced resource identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    /// Creates a key from namespace and name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing object (`default` namespace when unset)
    pub fn of<K: Resource>(resource: &K) -> Self {
        Self::new(
            resource.namespace().unwrap_or_else(|| "default".to_string()),
            resource.name_any(),
        )
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Errors raised by a `ResourceStore`
#[derive(Debug, Error)]
pub enum StoreError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Resource could not be serialized for a patch
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other backend failure
    #[error("{0}")]
    Backend(String),
}

/// Load/save access to one resource kind
#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    /// Latest copy of the resource; `None` once it is gone
    async fn load(&self, key: &ResourceKey) -> Result<Option<K>, StoreError>;

    /// Persist status and finalizers, returning the stored copy
    async fn save(&self, resource: &K) -> Result<K, StoreError>;
}

/// Merge patch for the status subresource, `None` when the object has no status
///
/// Unset optional fields serialize as `null`, which a JSON merge patch
/// (RFC 7386) treats as "remove this key". A cleared `message` therefore
/// disappears from the stored object instead of lingering.
pub fn status_patch<K: Serialize>(resource: &K) -> Result<Option<Value>, StoreError> {
    let value = serde_json::to_value(resource)?;
    Ok(value
        .get("status")
        .filter(|status| !status.is_null())
        .map(|status| serde_json::json!({ "status": status })))
}

/// Merge patch replacing `metadata.finalizers`
pub fn finalizer_patch<K: Resource>(resource: &K) -> Value {
    serde_json::json!({ "metadata": { "finalizers": resource.finalizers() } })
}

/// `ResourceStore` backed by the Kubernetes API
///
/// `save` issues two merge patches: the status subresource first, then
/// `metadata.finalizers`.
pub struct KubeResourceStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeResourceStore<K> {
    /// Creates a store using the given Kubernetes client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> fmt::Debug for KubeResourceStore<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeResourceStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl<K> ResourceStore<K> for KubeResourceStore<K>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default,
{
    async fn load(&self, key: &ResourceKey) -> Result<Option<K>, StoreError> {
        let api: Api<K> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn save(&self, resource: &K) -> Result<K, StoreError> {
        let key = ResourceKey::of(resource);
        let api: Api<K> = Api::namespaced(self.client.clone(), &key.namespace);
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PatchParams::default()
        };

        if let Some(patch) = status_patch(resource)? {
            debug!("Patching status of {}", key);
            api.patch_status(&key.name, &params, &Patch::Merge(&patch)).await?;
        }

        debug!("Patching finalizers of {}", key);
        let patch = finalizer_patch(resource);
        Ok(api.patch(&key.name, &params, &Patch::Merge(&patch)).await?)
    }
}
