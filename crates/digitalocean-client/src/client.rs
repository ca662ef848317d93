//! DigitalOcean API client
//!
//! Implements the subset of the DigitalOcean v2 REST API the operator needs:
//! droplets (`/v2/droplets`) and account SSH keys (`/v2/account/keys`).

use crate::error::DigitalOceanError;
use crate::models::*;
use crate::provider_trait::DigitalOceanClientTrait;
use reqwest::{Client, Method, RequestBuilder, Response, header::HeaderValue};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Default DigitalOcean API endpoint
pub const DEFAULT_API_URL: &str = "https://api.digitalocean.com";

/// Page size used for list calls (API maximum is 200)
const PER_PAGE: u32 = 200;

/// DigitalOcean API client
pub struct DigitalOceanClient {
    client: Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for DigitalOceanClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigitalOceanClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl DigitalOceanClient {
    /// Create a new DigitalOcean client
    ///
    /// No network call is made. Fails only when the token can never be sent
    /// as a bearer header (empty, or containing characters not allowed in a header).
    ///
    /// # Arguments
    /// * `base_url` - API base URL (e.g., "https://api.digitalocean.com")
    /// * `token` - personal access token
    pub fn new(base_url: String, token: String) -> Result<Self, DigitalOceanError> {
        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(DigitalOceanError::InvalidToken("token is empty".to_string()));
        }
        if HeaderValue::from_str(&format!("Bearer {token}")).is_err() {
            return Err(DigitalOceanError::InvalidToken(
                "token contains characters not allowed in an HTTP header".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/json")
    }

    /// Turn a non-success response into the matching error
    async fn check(response: Response, context: &str) -> Result<Response, DigitalOceanError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DigitalOceanError::from_status(status, context, &body))
    }

    async fn decode<T: DeserializeOwned>(response: Response, context: &str) -> Result<T, DigitalOceanError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            DigitalOceanError::Api(format!(
                "{context}: error decoding response body: {e} - Response (first 500 chars): {}",
                text.chars().take(500).collect::<String>()
            ))
        })
    }

    /// Validate the API token by making a lightweight authenticated request
    pub async fn validate_token(&self) -> Result<(), DigitalOceanError> {
        let url = format!("{}/v2/account", self.base_url);
        debug!("Validating DigitalOcean token");

        let response = self.request(Method::GET, &url).send().await?;
        Self::check(response, "validate token").await?;

        debug!("Token validated successfully");
        Ok(())
    }

    /// Fetch all pages of a list endpoint
    ///
    /// DigitalOcean wraps each page's items under a resource-specific key
    /// (`droplets`, `ssh_keys`) and links the next page via `links.pages.next`.
    async fn fetch_all_pages<T: DeserializeOwned>(
        &self,
        first_url: String,
        query: &[(&str, String)],
        items_key: &str,
    ) -> Result<Vec<T>, DigitalOceanError> {
        let mut all_results = Vec::new();
        let mut next = Some((first_url, true));

        while let Some((url, first)) = next.take() {
            debug!("Fetching page: {}", url);

            let mut builder = self.request(Method::GET, &url);
            // The `next` link already carries the query string
            if first {
                builder = builder.query(query);
            }
            let response = Self::check(builder.send().await?, &format!("list {items_key}")).await?;
            let mut page: serde_json::Value = Self::decode(response, &format!("list {items_key}")).await?;

            let items = page
                .get_mut(items_key)
                .map(serde_json::Value::take)
                .unwrap_or(serde_json::Value::Array(Vec::new()));
            let items: Vec<T> = serde_json::from_value(items)?;
            all_results.extend(items);

            let links: Links = page
                .get_mut("links")
                .map(|v| serde_json::from_value(v.take()))
                .transpose()?
                .unwrap_or_default();
            next = links.pages.and_then(|p| p.next).map(|url| (url, false));
        }

        Ok(all_results)
    }

    /// Create a droplet
    ///
    /// The API answers 202 Accepted: the droplet exists but is still booting
    /// and has no addresses yet.
    pub async fn create_droplet(&self, request: &DropletCreateRequest) -> Result<Droplet, DigitalOceanError> {
        let url = format!("{}/v2/droplets", self.base_url);
        debug!("Creating droplet {} in {}", request.name, request.region);

        let response = self.request(Method::POST, &url).json(request).send().await?;
        let response = Self::check(response, "create droplet").await?;
        let root: DropletRoot = Self::decode(response, "create droplet").await?;
        Ok(root.droplet)
    }

    /// Get a droplet by ID
    pub async fn get_droplet(&self, id: u64) -> Result<Droplet, DigitalOceanError> {
        let url = format!("{}/v2/droplets/{}", self.base_url, id);
        debug!("Fetching droplet {}", id);

        let response = self.request(Method::GET, &url).send().await?;
        let response = Self::check(response, &format!("get droplet {id}")).await?;
        let root: DropletRoot = Self::decode(response, "get droplet").await?;
        Ok(root.droplet)
    }

    /// Delete a droplet by ID
    pub async fn delete_droplet(&self, id: u64) -> Result<(), DigitalOceanError> {
        let url = format!("{}/v2/droplets/{}", self.base_url, id);
        debug!("Deleting droplet {}", id);

        let response = self.request(Method::DELETE, &url).send().await?;
        Self::check(response, &format!("delete droplet {id}")).await?;
        Ok(())
    }

    /// List droplets carrying a tag (all pages)
    pub async fn list_droplets_by_tag(&self, tag: &str) -> Result<Vec<Droplet>, DigitalOceanError> {
        let url = format!("{}/v2/droplets", self.base_url);
        let query = [("tag_name", tag.to_string()), ("per_page", PER_PAGE.to_string())];
        self.fetch_all_pages(url, &query, "droplets").await
    }

    /// Import an SSH public key into the account
    pub async fn create_key(&self, request: &KeyCreateRequest) -> Result<Key, DigitalOceanError> {
        let url = format!("{}/v2/account/keys", self.base_url);
        debug!("Importing SSH key {}", request.name);

        let response = self.request(Method::POST, &url).json(request).send().await?;
        let response = Self::check(response, "create key").await?;
        let root: KeyRoot = Self::decode(response, "create key").await?;
        Ok(root.ssh_key)
    }

    /// Remove an SSH key from the account
    pub async fn delete_key(&self, id: u64) -> Result<(), DigitalOceanError> {
        let url = format!("{}/v2/account/keys/{}", self.base_url, id);
        debug!("Deleting SSH key {}", id);

        let response = self.request(Method::DELETE, &url).send().await?;
        Self::check(response, &format!("delete key {id}")).await?;
        Ok(())
    }

    /// List all SSH keys in the account (all pages)
    pub async fn list_keys(&self) -> Result<Vec<Key>, DigitalOceanError> {
        let url = format!("{}/v2/account/keys", self.base_url);
        let query = [("per_page", PER_PAGE.to_string())];
        self.fetch_all_pages(url, &query, "ssh_keys").await
    }
}

#[async_trait::async_trait]
impl DigitalOceanClientTrait for DigitalOceanClient {
    async fn validate_token(&self) -> Result<(), DigitalOceanError> {
        self.validate_token().await
    }

    async fn create_droplet(&self, request: &DropletCreateRequest) -> Result<Droplet, DigitalOceanError> {
        self.create_droplet(request).await
    }

    async fn get_droplet(&self, id: u64) -> Result<Droplet, DigitalOceanError> {
        self.get_droplet(id).await
    }

    async fn delete_droplet(&self, id: u64) -> Result<(), DigitalOceanError> {
        self.delete_droplet(id).await
    }

    async fn list_droplets_by_tag(&self, tag: &str) -> Result<Vec<Droplet>, DigitalOceanError> {
        self.list_droplets_by_tag(tag).await
    }

    async fn create_key(&self, request: &KeyCreateRequest) -> Result<Key, DigitalOceanError> {
        self.create_key(request).await
    }

    async fn delete_key(&self, id: u64) -> Result<(), DigitalOceanError> {
        self.delete_key(id).await
    }

    async fn list_keys(&self) -> Result<Vec<Key>, DigitalOceanError> {
        self.list_keys().await
    }
}
