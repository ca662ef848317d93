//! Controller-specific error types.
//!
//! Provider, credential and persistence errors are wrapped here so a
//! reconciliation pass has a single error type to hand back to the watcher.

use crate::credentials::CredentialError;
use crate::store::StoreError;
use digitalocean_client::DigitalOceanError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the droplet controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// DigitalOcean API error
    #[error("DigitalOcean error: {0}")]
    DigitalOcean(#[from] DigitalOceanError),

    /// Credential secret missing or unusable
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Resource load/save failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Spec cannot be turned into a provider request
    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    /// Provider object exists but is not usable yet (e.g. no IP assigned)
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Metrics/probe server failed
    #[error("Server error: {0}")]
    Server(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// Whether a later pass may succeed without anyone changing the resource
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::DigitalOcean(e) => e.is_transient(),
            Self::Kube(_) | Self::Store(_) | Self::NotReady(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_classified() {
        assert!(ControllerError::DigitalOcean(DigitalOceanError::RateLimited("slow down".into())).is_transient());
        assert!(ControllerError::NotReady("no public address".into()).is_transient());
        assert!(!ControllerError::DigitalOcean(DigitalOceanError::Validation("bad size".into())).is_transient());
        assert!(!ControllerError::InvalidSpec("spec.region".into()).is_transient());
        assert!(!ControllerError::Credential(CredentialError::NotFound {
            namespace: "default".into(),
            name: "creds".into(),
        })
        .is_transient());
    }
}
