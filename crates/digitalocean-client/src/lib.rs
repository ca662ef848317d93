//! DigitalOcean REST API Client
//!
//! A small client for the parts of the DigitalOcean v2 API the droplet
//! operator drives: droplet create/get/delete/list-by-tag and account SSH key
//! import/delete/list.
//!
//! # Example
//!
//! ```no_run
//! use digitalocean_client::{DigitalOceanClient, KeyCreateRequest, DEFAULT_API_URL};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = DigitalOceanClient::new(DEFAULT_API_URL.to_string(), "dop_v1_...".to_string())?;
//!
//! let key = client
//!     .create_key(&KeyCreateRequest {
//!         name: "workstation".to_string(),
//!         public_key: "ssh-ed25519 AAAA... me@host".to_string(),
//!     })
//!     .await?;
//! println!("imported key {} ({})", key.id, key.fingerprint);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod provider_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::{DEFAULT_API_URL, DigitalOceanClient};
pub use error::DigitalOceanError;
pub use models::*;
pub use provider_trait::DigitalOceanClientTrait;
#[cfg(feature = "test-util")]
pub use mock::{MockDigitalOceanClient, MockFailure, MockOperation};
