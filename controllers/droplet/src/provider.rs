//! Provider client construction.
//!
//! A new DigitalOcean client is built from the resolved token on every pass,
//! since each resource may reference a different account.

use crate::credentials::Token;
use digitalocean_client::{DigitalOceanClient, DigitalOceanClientTrait, DigitalOceanError};

/// Builds a provider client for a token
pub trait ProviderFactory: Send + Sync {
    /// Construct a client; performs no I/O
    fn build(&self, token: &Token) -> Result<Box<dyn DigitalOceanClientTrait>, DigitalOceanError>;
}

/// Factory producing real `DigitalOceanClient`s
#[derive(Debug, Clone)]
pub struct DigitalOceanProviderFactory {
    base_url: String,
}

impl DigitalOceanProviderFactory {
    /// Creates a factory targeting `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into() }
    }
}

impl ProviderFactory for DigitalOceanProviderFactory {
    fn build(&self, token: &Token) -> Result<Box<dyn DigitalOceanClientTrait>, DigitalOceanError> {
        let client = DigitalOceanClient::new(self.base_url.clone(), token.expose().to_string())?;
        Ok(Box::new(client))
    }
}
