//! Mock DigitalOceanClient for unit testing
//!
//! In-memory implementation of `DigitalOceanClientTrait`. Besides storing
//! droplets and keys, the mock counts calls per operation and can be told to
//! fail the next call(s) of an operation, which is how the reconciler tests
//! exercise retry and crash-recovery paths.
//!
//! - `droplets.rs` - droplet operations
//! - `keys.rs` - account SSH key operations

mod droplets;
mod keys;

use crate::error::DigitalOceanError;
use crate::models::*;
use crate::provider_trait::DigitalOceanClientTrait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Operations the mock tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    ValidateToken,
    CreateDroplet,
    GetDroplet,
    DeleteDroplet,
    ListDroplets,
    CreateKey,
    DeleteKey,
    ListKeys,
}

/// Injected failure for the next call of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Unauthorized,
    RateLimited,
    NotFound,
    Validation,
    Transient,
    /// The call takes effect on the provider but the caller gets a transient error
    ResponseLost,
}

impl MockFailure {
    fn into_error(self, op: MockOperation) -> DigitalOceanError {
        let msg = format!("injected failure for {op:?}");
        match self {
            Self::Unauthorized => DigitalOceanError::Unauthorized(msg),
            Self::RateLimited => DigitalOceanError::RateLimited(msg),
            Self::NotFound => DigitalOceanError::NotFound(msg),
            Self::Validation => DigitalOceanError::Validation(msg),
            Self::Transient | Self::ResponseLost => DigitalOceanError::Transient(msg),
        }
    }
}

/// Mock DigitalOceanClient for testing
///
/// Clones share state, so a test can keep a handle while the reconciler owns another.
#[derive(Clone, Debug)]
pub struct MockDigitalOceanClient {
    pub(crate) droplets: Arc<Mutex<HashMap<u64, Droplet>>>,
    pub(crate) keys: Arc<Mutex<HashMap<u64, Key>>>,
    pub(crate) calls: Arc<Mutex<HashMap<MockOperation, usize>>>,
    pub(crate) failures: Arc<Mutex<HashMap<MockOperation, VecDeque<MockFailure>>>>,
    // Counter for generating IDs
    pub(crate) next_id: Arc<Mutex<u64>>,
}

impl Default for MockDigitalOceanClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDigitalOceanClient {
    /// Create a new mock client
    pub fn new() -> Self {
        Self {
            droplets: Arc::new(Mutex::new(HashMap::new())),
            keys: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1000)),
        }
    }

    /// Queue a failure for the next call of `op`
    pub fn fail_next(&self, op: MockOperation, failure: MockFailure) {
        self.failures.lock().unwrap().entry(op).or_default().push_back(failure);
    }

    /// Number of calls made to `op` so far (including failed ones)
    pub fn call_count(&self, op: MockOperation) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    /// Add a droplet to the mock store (for test setup)
    pub fn add_droplet(&self, droplet: Droplet) {
        self.droplets.lock().unwrap().insert(droplet.id, droplet);
    }

    /// Remove a droplet behind the operator's back
    pub fn remove_droplet(&self, id: u64) -> Option<Droplet> {
        self.droplets.lock().unwrap().remove(&id)
    }

    /// Snapshot of a stored droplet
    pub fn droplet(&self, id: u64) -> Option<Droplet> {
        self.droplets.lock().unwrap().get(&id).cloned()
    }

    /// Snapshot of all stored droplets
    pub fn droplets(&self) -> Vec<Droplet> {
        self.droplets.lock().unwrap().values().cloned().collect()
    }

    /// Simulate the droplet finishing boot with the given addresses
    pub fn assign_addresses(&self, id: u64, private_ip: Option<&str>, public_ip: Option<&str>) {
        let mut droplets = self.droplets.lock().unwrap();
        if let Some(droplet) = droplets.get_mut(&id) {
            let mut v4 = Vec::new();
            if let Some(ip) = private_ip {
                v4.push(NetworkV4 {
                    ip_address: ip.to_string(),
                    netmask: "255.255.0.0".to_string(),
                    gateway: String::new(),
                    network_type: "private".to_string(),
                });
            }
            if let Some(ip) = public_ip {
                v4.push(NetworkV4 {
                    ip_address: ip.to_string(),
                    netmask: "255.255.240.0".to_string(),
                    gateway: String::new(),
                    network_type: "public".to_string(),
                });
            }
            droplet.networks.v4 = v4;
            droplet.status = "active".to_string();
        }
    }

    /// Add a key to the mock store (for test setup)
    pub fn add_key(&self, key: Key) {
        self.keys.lock().unwrap().insert(key.id, key);
    }

    /// Snapshot of a stored key
    pub fn key(&self, id: u64) -> Option<Key> {
        self.keys.lock().unwrap().get(&id).cloned()
    }

    /// Snapshot of all stored keys
    pub fn keys(&self) -> Vec<Key> {
        self.keys.lock().unwrap().values().cloned().collect()
    }

    /// Generate next ID
    pub(crate) fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap();
        let current = *id;
        *id += 1;
        current
    }

    /// Count the call and pop any queued failure for it
    pub(crate) fn begin(&self, op: MockOperation) -> Option<MockFailure> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
        self.failures.lock().unwrap().get_mut(&op).and_then(VecDeque::pop_front)
    }

    /// Fail immediately unless the queued failure lets the call take effect
    pub(crate) fn check(&self, op: MockOperation) -> Result<Option<MockFailure>, DigitalOceanError> {
        match self.begin(op) {
            Some(MockFailure::ResponseLost) => Ok(Some(MockFailure::ResponseLost)),
            Some(failure) => Err(failure.into_error(op)),
            None => Ok(None),
        }
    }

    /// Apply a deferred `ResponseLost` failure after the call took effect
    pub(crate) fn finish<T>(
        op: MockOperation,
        deferred: Option<MockFailure>,
        value: T,
    ) -> Result<T, DigitalOceanError> {
        match deferred {
            Some(failure) => Err(failure.into_error(op)),
            None => Ok(value),
        }
    }
}

#[async_trait::async_trait]
impl DigitalOceanClientTrait for MockDigitalOceanClient {
    async fn validate_token(&self) -> Result<(), DigitalOceanError> {
        let deferred = self.check(MockOperation::ValidateToken)?;
        Self::finish(MockOperation::ValidateToken, deferred, ())
    }

    async fn create_droplet(&self, request: &DropletCreateRequest) -> Result<Droplet, DigitalOceanError> {
        droplets::create_droplet(self, request).await
    }

    async fn get_droplet(&self, id: u64) -> Result<Droplet, DigitalOceanError> {
        droplets::get_droplet(self, id).await
    }

    async fn delete_droplet(&self, id: u64) -> Result<(), DigitalOceanError> {
        droplets::delete_droplet(self, id).await
    }

    async fn list_droplets_by_tag(&self, tag: &str) -> Result<Vec<Droplet>, DigitalOceanError> {
        droplets::list_droplets_by_tag(self, tag).await
    }

    async fn create_key(&self, request: &KeyCreateRequest) -> Result<Key, DigitalOceanError> {
        keys::create_key(self, request).await
    }

    async fn delete_key(&self, id: u64) -> Result<(), DigitalOceanError> {
        keys::delete_key(self, id).await
    }

    async fn list_keys(&self) -> Result<Vec<Key>, DigitalOceanError> {
        keys::list_keys(self).await
    }
}
