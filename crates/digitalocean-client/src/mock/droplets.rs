//! Droplet operations for MockDigitalOceanClient

use super::{MockDigitalOceanClient, MockOperation};
use crate::error::DigitalOceanError;
use crate::models::*;

pub async fn create_droplet(
    client: &MockDigitalOceanClient,
    request: &DropletCreateRequest,
) -> Result<Droplet, DigitalOceanError> {
    let deferred = client.check(MockOperation::CreateDroplet)?;

    let id = client.next_id();
    // Newly created droplets are still booting and have no addresses
    let droplet = Droplet {
        id,
        name: request.name.clone(),
        status: "new".to_string(),
        networks: Networks::default(),
        tags: request.tags.clone(),
        created_at: None,
    };
    client.droplets.lock().unwrap().insert(id, droplet.clone());

    MockDigitalOceanClient::finish(MockOperation::CreateDroplet, deferred, droplet)
}

pub async fn get_droplet(client: &MockDigitalOceanClient, id: u64) -> Result<Droplet, DigitalOceanError> {
    let deferred = client.check(MockOperation::GetDroplet)?;
    let droplet = client
        .droplets
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .ok_or_else(|| DigitalOceanError::NotFound(format!("Droplet {} not found", id)))?;
    MockDigitalOceanClient::finish(MockOperation::GetDroplet, deferred, droplet)
}

pub async fn delete_droplet(client: &MockDigitalOceanClient, id: u64) -> Result<(), DigitalOceanError> {
    let deferred = client.check(MockOperation::DeleteDroplet)?;
    client
        .droplets
        .lock()
        .unwrap()
        .remove(&id)
        .ok_or_else(|| DigitalOceanError::NotFound(format!("Droplet {} not found", id)))?;
    MockDigitalOceanClient::finish(MockOperation::DeleteDroplet, deferred, ())
}

pub async fn list_droplets_by_tag(
    client: &MockDigitalOceanClient,
    tag: &str,
) -> Result<Vec<Droplet>, DigitalOceanError> {
    let deferred = client.check(MockOperation::ListDroplets)?;
    let mut matching: Vec<Droplet> = client
        .droplets
        .lock()
        .unwrap()
        .values()
        .filter(|d| d.tags.iter().any(|t| t == tag))
        .cloned()
        .collect();
    matching.sort_by_key(|d| d.id);
    MockDigitalOceanClient::finish(MockOperation::ListDroplets, deferred, matching)
}
