//! DigitalOceanClient trait for mocking
//!
//! The concrete `DigitalOceanClient` implements this trait; unit tests use
//! `MockDigitalOceanClient` (feature `test-util`).

use crate::error::DigitalOceanError;
use crate::models::*;

/// Trait for DigitalOcean API client operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait DigitalOceanClientTrait: Send + Sync {
    /// Validate the API token
    async fn validate_token(&self) -> Result<(), DigitalOceanError>;

    // Droplets
    async fn create_droplet(&self, request: &DropletCreateRequest) -> Result<Droplet, DigitalOceanError>;
    async fn get_droplet(&self, id: u64) -> Result<Droplet, DigitalOceanError>;
    async fn delete_droplet(&self, id: u64) -> Result<(), DigitalOceanError>;
    async fn list_droplets_by_tag(&self, tag: &str) -> Result<Vec<Droplet>, DigitalOceanError>;

    // Account SSH keys
    async fn create_key(&self, request: &KeyCreateRequest) -> Result<Key, DigitalOceanError>;
    async fn delete_key(&self, id: u64) -> Result<(), DigitalOceanError>;
    async fn list_keys(&self) -> Result<Vec<Key>, DigitalOceanError>;
}
