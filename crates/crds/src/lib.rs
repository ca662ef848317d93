//! Droplet Operator CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the droplet operator:
//! - `Instance`: a DigitalOcean droplet
//! - `ImportKeyPair`: an SSH public key imported into the DigitalOcean account

pub mod import_key_pair;
pub mod instance;

pub use import_key_pair::*;
pub use instance::*;

/// Finalizer placed on managed resources while a provider-side object may exist
pub const FINALIZER: &str = "droplet.cattle.io";
