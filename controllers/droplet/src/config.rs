//! Controller configuration loaded from environment variables.

use crate::error::ControllerError;
use digitalocean_client::DEFAULT_API_URL;
use std::time::Duration;

const DEFAULT_REQUEUE_INTERVAL_SECS: u64 = 10;
const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;
const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;
const DEFAULT_METRICS_PORT: u16 = 8080;

/// Runtime settings for the droplet controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// DigitalOcean API base URL
    pub api_url: String,
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Delay before re-driving a resource that has not converged yet
    pub requeue_interval: Duration,
    /// Error backoff floor in seconds
    pub backoff_min_secs: u64,
    /// Error backoff ceiling in seconds
    pub backoff_max_secs: u64,
    /// Port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            namespace: None,
            requeue_interval: Duration::from_secs(DEFAULT_REQUEUE_INTERVAL_SECS),
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_url = lookup("DIGITALOCEAN_API_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.api_url);
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(ControllerError::InvalidConfig(format!(
                "DIGITALOCEAN_API_URL must be an http(s) URL, got {api_url}"
            )));
        }

        let namespace = lookup("WATCH_NAMESPACE").filter(|v| !v.trim().is_empty());

        let requeue_secs = parse_var(&lookup, "REQUEUE_INTERVAL_SECS", DEFAULT_REQUEUE_INTERVAL_SECS)?;
        let backoff_min_secs = parse_var(&lookup, "BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS)?;
        let backoff_max_secs = parse_var(&lookup, "BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS)?;
        let metrics_port = parse_var(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT)?;

        if requeue_secs == 0 {
            return Err(ControllerError::InvalidConfig(
                "REQUEUE_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }
        if backoff_min_secs == 0 || backoff_min_secs > backoff_max_secs {
            return Err(ControllerError::InvalidConfig(format!(
                "backoff bounds must satisfy 0 < BACKOFF_MIN_SECS <= BACKOFF_MAX_SECS, got {backoff_min_secs}/{backoff_max_secs}"
            )));
        }

        Ok(Self {
            api_url,
            namespace,
            requeue_interval: Duration::from_secs(requeue_secs),
            backoff_min_secs,
            backoff_max_secs,
            metrics_port,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ControllerError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{key}={raw}: {e}"))),
    }
}
