//! Account SSH key operations for MockDigitalOceanClient

use super::{MockDigitalOceanClient, MockOperation};
use crate::error::DigitalOceanError;
use crate::models::*;

pub async fn create_key(client: &MockDigitalOceanClient, request: &KeyCreateRequest) -> Result<Key, DigitalOceanError> {
    let deferred = client.check(MockOperation::CreateKey)?;

    let mut keys = client.keys.lock().unwrap();
    // DigitalOcean answers 422 when the same public key is imported twice
    if keys.values().any(|k| k.public_key == request.public_key) {
        return Err(DigitalOceanError::Validation(
            "SSH Key is already in use on your account".to_string(),
        ));
    }

    let id = client.next_id();
    let key = Key {
        id,
        name: request.name.clone(),
        fingerprint: fake_fingerprint(id),
        public_key: request.public_key.clone(),
    };
    keys.insert(id, key.clone());
    drop(keys);

    MockDigitalOceanClient::finish(MockOperation::CreateKey, deferred, key)
}

pub async fn delete_key(client: &MockDigitalOceanClient, id: u64) -> Result<(), DigitalOceanError> {
    let deferred = client.check(MockOperation::DeleteKey)?;
    client
        .keys
        .lock()
        .unwrap()
        .remove(&id)
        .ok_or_else(|| DigitalOceanError::NotFound(format!("SSH key {} not found", id)))?;
    MockDigitalOceanClient::finish(MockOperation::DeleteKey, deferred, ())
}

pub async fn list_keys(client: &MockDigitalOceanClient) -> Result<Vec<Key>, DigitalOceanError> {
    let deferred = client.check(MockOperation::ListKeys)?;
    let mut keys: Vec<Key> = client.keys.lock().unwrap().values().cloned().collect();
    keys.sort_by_key(|k| k.id);
    MockDigitalOceanClient::finish(MockOperation::ListKeys, deferred, keys)
}

/// MD5-style colon-separated fingerprint derived from the key ID
fn fake_fingerprint(id: u64) -> String {
    id.to_be_bytes()
        .iter()
        .chain(id.to_le_bytes().iter())
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}
