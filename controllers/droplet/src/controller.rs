//! Main controller implementation.
//!
//! Wires the Kubernetes-backed stores, the credential resolver and the
//! provider factory into a `Reconciler`, then runs both watchers and the
//! metrics/probe server.

use crate::config::ControllerConfig;
use crate::credentials::{CredentialResolver, KubeSecretStore};
use crate::error::ControllerError;
use crate::metrics;
use crate::provider::DigitalOceanProviderFactory;
use crate::reconciler::Reconciler;
use crate::server::{self, ServerState};
use crate::store::KubeResourceStore;
use crate::watcher::Watcher;
use crds::{ImportKeyPair, Instance};
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client, Resource};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Api for one kind, limited to `namespace` when set
fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Main controller for droplet and key pair management.
pub struct Controller {
    instance_watcher: JoinHandle<Result<(), ControllerError>>,
    key_pair_watcher: JoinHandle<Result<(), ControllerError>>,
    server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its background tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing droplet controller");

        metrics::register_metrics().map_err(|e| ControllerError::Server(format!("failed to register metrics: {e}")))?;

        let kube_client = Client::try_default().await?;

        let reconciler = Arc::new(Reconciler::new(
            Arc::new(KubeResourceStore::<Instance>::new(kube_client.clone())),
            Arc::new(KubeResourceStore::<ImportKeyPair>::new(kube_client.clone())),
            CredentialResolver::new(Arc::new(KubeSecretStore::new(kube_client.clone()))),
            Arc::new(DigitalOceanProviderFactory::new(config.api_url.clone())),
            &config,
        ));

        let instance_api: Api<Instance> = scoped_api(kube_client.clone(), config.namespace.as_deref());
        let key_pair_api: Api<ImportKeyPair> = scoped_api(kube_client, config.namespace.as_deref());

        let server_state = ServerState::default();
        let server = tokio::spawn(server::start_server(config.metrics_port, server_state.clone()));

        let watcher = Watcher::new(reconciler);
        let instance_watcher = tokio::spawn({
            let watcher = watcher.clone();
            async move { watcher.watch_instances(instance_api).await }
        });
        let key_pair_watcher = tokio::spawn(async move { watcher.watch_key_pairs(key_pair_api).await });

        server_state.mark_ready();

        Ok(Self {
            instance_watcher,
            key_pair_watcher,
            server,
        })
    }

    /// Runs the controller until a watcher stops or the server fails.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Droplet controller running");

        tokio::select! {
            result = &mut self.instance_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Instance watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("Instance watcher error: {}", e)))?;
            }
            result = &mut self.key_pair_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("ImportKeyPair watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("ImportKeyPair watcher error: {}", e)))?;
            }
            result = &mut self.server => {
                result.map_err(|e| ControllerError::Server(format!("server task panicked: {}", e)))??;
            }
        }

        info!("Droplet controller stopped");
        Ok(())
    }
}
