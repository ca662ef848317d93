//! Droplet Controller
//!
//! Reconciles two CRDs against DigitalOcean:
//! - Instance: creates, tracks and deletes a droplet
//! - ImportKeyPair: imports and removes an account SSH key
//!
//! API tokens are read per resource from a Secret in the resource's namespace.

mod backoff;
mod config;
mod controller;
mod credentials;
mod error;
mod finalizer;
mod metrics;
mod provider;
mod reconciler;
mod server;
mod state_machine;
mod store;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // rustls 0.23 needs a process-wide crypto provider before the first TLS connection
    let provider_installed = rustls::crypto::ring::default_provider().install_default().is_ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "droplet_controller=info".into()),
        )
        .init();

    if !provider_installed {
        warn!("A rustls crypto provider was already installed; keeping it");
    }

    info!("Starting Droplet Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  DigitalOcean API URL: {}", config.api_url);
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Requeue interval: {:?}", config.requeue_interval);
    info!("  Error backoff: {}s..{}s", config.backoff_min_secs, config.backoff_max_secs);
    info!("  Metrics port: {}", config.metrics_port);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
