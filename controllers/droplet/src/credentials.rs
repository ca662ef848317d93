//! Credential resolution.
//!
//! Each resource names a Secret in its own namespace; the DigitalOcean access
//! token is read from the Secret's `TOKEN` entry on every pass (no caching, so
//! a rotated token is picked up immediately).

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Secret key holding the access token
pub const TOKEN_KEY: &str = "TOKEN";

/// Errors raised while resolving credentials
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The named secret does not exist
    #[error("secret {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    /// The secret exists but has no usable token
    #[error("secret {namespace}/{name} is malformed: {reason}")]
    MalformedSecret {
        namespace: String,
        name: String,
        reason: String,
    },

    /// The secret store could not be read
    #[error("failed to read secret: {0}")]
    Store(String),
}

/// Provider access token; never printed
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Raw token value for building the provider client
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// Read access to namespaced secrets
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Load a secret's data; `None` when the secret does not exist
    async fn load(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, Vec<u8>>>, CredentialError>;
}

/// `SecretStore` backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    /// Creates a store using the given Kubernetes client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn load(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, Vec<u8>>>, CredentialError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api
            .get_opt(name)
            .await
            .map_err(|e| CredentialError::Store(e.to_string()))?;

        Ok(secret.map(|s| {
            s.data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, v.0))
                .collect()
        }))
    }
}

/// Resolves the token referenced by a resource
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn SecretStore>,
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver").finish_non_exhaustive()
    }
}

impl CredentialResolver {
    /// Creates a resolver over the given secret store.
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Resolve the token stored in `namespace/name`
    pub async fn resolve(&self, namespace: &str, name: &str) -> Result<Token, CredentialError> {
        debug!("Resolving credentials from secret {}/{}", namespace, name);

        let malformed = |reason: &str| CredentialError::MalformedSecret {
            namespace: namespace.to_string(),
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(malformed("no secret name given"));
        }

        let data = self
            .store
            .load(namespace, name)
            .await?
            .ok_or_else(|| CredentialError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;

        let raw = data
            .get(TOKEN_KEY)
            .ok_or_else(|| malformed(&format!("missing {TOKEN_KEY} key")))?;
        let token = std::str::from_utf8(raw).map_err(|_| malformed(&format!("{TOKEN_KEY} is not valid UTF-8")))?;
        let token = token.trim();
        if token.is_empty() {
            return Err(malformed(&format!("{TOKEN_KEY} is empty")));
        }

        Ok(Token(token.to_string()))
    }
}
