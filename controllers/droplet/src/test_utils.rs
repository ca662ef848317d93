//! Test utilities for unit testing reconcilers
//!
//! In-memory stand-ins for the Kubernetes-backed stores plus fixtures for the
//! two CRDs. The provider is `MockDigitalOceanClient`.

use crate::config::ControllerConfig;
use crate::credentials::{CredentialError, CredentialResolver, SecretStore, TOKEN_KEY, Token};
use crate::provider::ProviderFactory;
use crate::reconciler::Reconciler;
use crate::store::{ResourceKey, ResourceStore, StoreError, finalizer_patch, status_patch};
use async_trait::async_trait;
use crds::*;
use digitalocean_client::{DigitalOceanClientTrait, DigitalOceanError, MockDigitalOceanClient};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

pub const NAMESPACE: &str = "default";
pub const SECRET: &str = "creds";
pub const TOKEN: &str = "dop_v1_test";
pub const PUBLIC_KEY: &str = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABAQC7 user@example";

fn metadata(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        uid: Some(format!("uid-{name}")),
        ..Default::default()
    }
}

/// Spec of the round-trip scenario droplet
pub fn ubuntu_spec(name: &str) -> InstanceSpec {
    InstanceSpec {
        secret: SECRET.to_string(),
        name: name.to_string(),
        region: "nyc1".to_string(),
        size: "s-1vcpu-1gb".to_string(),
        image: InstanceImage {
            id: None,
            slug: Some("ubuntu-20-04".to_string()),
        },
        ..Default::default()
    }
}

/// Helper to create a test Instance without status
pub fn instance(name: &str, spec: InstanceSpec) -> Instance {
    Instance {
        metadata: metadata(name),
        spec,
        status: None,
    }
}

/// Helper to create a test ImportKeyPair without status
pub fn key_pair(name: &str, public_key: &str) -> ImportKeyPair {
    ImportKeyPair {
        metadata: metadata(name),
        spec: ImportKeyPairSpec {
            public_key: public_key.to_string(),
            secret: SECRET.to_string(),
        },
        status: None,
    }
}

/// Deletion timestamp as set by the API server
pub fn deletion_time() -> Time {
    serde_json::from_value(serde_json::json!("2024-05-01T12:00:00Z")).unwrap()
}

/// JSON merge patch (RFC 7386) as the API server applies it
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(existing) = target {
        for (name, value) in fields {
            if value.is_null() {
                existing.remove(name);
            } else {
                merge_patch(existing.entry(name.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// In-memory `ResourceStore`
///
/// `save` applies the same merge patches as `KubeResourceStore` to the stored
/// copy, and mimics the API server's purge: once a deleting object has no
/// finalizers left it is removed.
#[derive(Clone)]
pub struct MemoryStore<K> {
    objects: Arc<Mutex<BTreeMap<ResourceKey, K>>>,
    saves: Arc<Mutex<usize>>,
    failing_saves: Arc<Mutex<usize>>,
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            saves: Arc::new(Mutex::new(0)),
            failing_saves: Arc::new(Mutex::new(0)),
        }
    }
}

impl<K: Resource + Clone> MemoryStore<K> {
    pub fn insert(&self, resource: K) -> ResourceKey {
        let key = ResourceKey::of(&resource);
        self.objects.lock().unwrap().insert(key.clone(), resource);
        key
    }

    pub fn get(&self, key: &ResourceKey) -> Option<K> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// Simulate `kubectl delete`: set the deletion timestamp (or purge right
    /// away when no finalizer is present)
    pub fn request_deletion(&self, key: &ResourceKey) {
        let mut objects = self.objects.lock().unwrap();
        let Some(resource) = objects.get_mut(key) else {
            return;
        };
        if resource.meta().finalizers.as_ref().is_none_or(Vec::is_empty) {
            objects.remove(key);
        } else {
            resource.meta_mut().deletion_timestamp = Some(deletion_time());
        }
    }

    /// Make the next `n` saves fail
    pub fn fail_next_saves(&self, n: usize) {
        *self.failing_saves.lock().unwrap() = n;
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl<K> ResourceStore<K> for MemoryStore<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync,
{
    async fn load(&self, key: &ResourceKey) -> Result<Option<K>, StoreError> {
        Ok(self.get(key))
    }

    async fn save(&self, resource: &K) -> Result<K, StoreError> {
        {
            let mut failing = self.failing_saves.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(StoreError::Backend("injected save failure".to_string()));
            }
        }
        *self.saves.lock().unwrap() += 1;

        let key = ResourceKey::of(resource);
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get(&key)
            .ok_or_else(|| StoreError::Backend(format!("{key} not found")))?;

        let mut value = serde_json::to_value(stored)?;
        if let Some(patch) = status_patch(resource)? {
            merge_patch(&mut value, &patch);
        }
        merge_patch(&mut value, &finalizer_patch(resource));
        let updated: K = serde_json::from_value(value)?;

        let deleting = updated.meta().deletion_timestamp.is_some();
        let no_finalizers = updated.meta().finalizers.as_ref().is_none_or(Vec::is_empty);
        if deleting && no_finalizers {
            objects.remove(&key);
        } else {
            objects.insert(key, updated.clone());
        }
        Ok(updated)
    }
}

/// In-memory `SecretStore`
#[derive(Clone, Default)]
pub struct MemorySecretStore {
    secrets: Arc<Mutex<HashMap<(String, String), BTreeMap<String, Vec<u8>>>>>,
}

impl MemorySecretStore {
    pub fn insert<'a>(&self, namespace: &str, name: &str, data: impl IntoIterator<Item = (&'a str, Vec<u8>)>) {
        let data = data.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        self.secrets
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name.to_string()), data);
    }

    pub fn insert_token(&self, namespace: &str, name: &str, token: &str) {
        self.insert(namespace, name, [(TOKEN_KEY, token.as_bytes().to_vec())]);
    }

    pub fn remove(&self, namespace: &str, name: &str) {
        self.secrets
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn load(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, Vec<u8>>>, CredentialError> {
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

/// Hands out clones of one shared mock and records the tokens it was given
#[derive(Clone)]
pub struct MockProviderFactory {
    client: MockDigitalOceanClient,
    tokens: Arc<Mutex<Vec<String>>>,
}

impl MockProviderFactory {
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

impl ProviderFactory for MockProviderFactory {
    fn build(&self, token: &Token) -> Result<Box<dyn DigitalOceanClientTrait>, DigitalOceanError> {
        self.tokens.lock().unwrap().push(token.expose().to_string());
        Ok(Box::new(self.client.clone()))
    }
}

/// Reconciler wired to in-memory stores and the mock provider
pub struct TestHarness {
    pub reconciler: Reconciler,
    pub instances: MemoryStore<Instance>,
    pub key_pairs: MemoryStore<ImportKeyPair>,
    pub secrets: MemorySecretStore,
    pub provider: MockDigitalOceanClient,
    pub factory: MockProviderFactory,
}

impl TestHarness {
    /// Harness with the `default/creds` secret in place
    pub fn new() -> Self {
        let instances = MemoryStore::<Instance>::default();
        let key_pairs = MemoryStore::<ImportKeyPair>::default();
        let secrets = MemorySecretStore::default();
        secrets.insert_token(NAMESPACE, SECRET, TOKEN);
        let provider = MockDigitalOceanClient::new();
        let factory = MockProviderFactory {
            client: provider.clone(),
            tokens: Arc::new(Mutex::new(Vec::new())),
        };

        let reconciler = Reconciler::new(
            Arc::new(instances.clone()),
            Arc::new(key_pairs.clone()),
            CredentialResolver::new(Arc::new(secrets.clone())),
            Arc::new(factory.clone()),
            &ControllerConfig::default(),
        );

        Self {
            reconciler,
            instances,
            key_pairs,
            secrets,
            provider,
            factory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_patch_follows_rfc7386() {
        let mut target = json!({ "a": "b", "c": { "d": "e", "f": "g" } });
        merge_patch(&mut target, &json!({ "a": "z", "c": { "f": null } }));
        assert_eq!(target, json!({ "a": "z", "c": { "d": "e" } }));

        let mut target = json!({ "list": [1, 2] });
        merge_patch(&mut target, &json!({ "list": [] }));
        assert_eq!(target, json!({ "list": [] }));
    }

    #[tokio::test]
    async fn test_save_removes_cleared_status_fields() {
        let store = MemoryStore::<Instance>::default();
        let mut resource = instance("t1", ubuntu_spec("t1"));
        resource.status = Some(InstanceStatus {
            lifecycle_state: InstanceState::Submitted,
            instance_id: Some(7),
            message: Some("droplet has no public IP yet".to_string()),
            ..Default::default()
        });
        let key = store.insert(resource.clone());

        resource.status.as_mut().unwrap().message = None;
        let saved = store.save(&resource).await.unwrap();

        assert!(saved.status.as_ref().unwrap().message.is_none());
        let stored = store.get(&key).unwrap();
        assert!(stored.status.as_ref().unwrap().message.is_none());
        assert_eq!(stored.status.unwrap().instance_id, Some(7));
    }

    #[tokio::test]
    async fn test_save_keeps_server_side_deletion_timestamp() {
        let store = MemoryStore::<Instance>::default();
        let mut resource = instance("t1", ubuntu_spec("t1"));
        crate::finalizer::ensure_present(&mut resource.metadata);
        let key = store.insert(resource.clone());
        store.request_deletion(&key);

        // Stale copy without the timestamp still purges once the finalizer goes
        crate::finalizer::ensure_absent(&mut resource.metadata);
        store.save(&resource).await.unwrap();
        assert!(store.get(&key).is_none());
    }

    #[tokio::test]
    async fn test_save_of_missing_object_fails() {
        let store = MemoryStore::<Instance>::default();
        let resource = instance("t1", ubuntu_spec("t1"));
        assert!(matches!(store.save(&resource).await, Err(StoreError::Backend(_))));
    }
}
