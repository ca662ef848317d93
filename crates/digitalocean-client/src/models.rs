//! DigitalOcean API models
//!
//! These models match the DigitalOcean v2 REST API payloads.
//! See: https://docs.digitalocean.com/reference/api/api-reference/

use serde::{Deserialize, Serialize};

/// Request body for `POST /v2/droplets`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DropletCreateRequest {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: DropletCreateImage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<DropletCreateSshKey>,
    #[serde(default)]
    pub backups: bool,
    #[serde(default)]
    pub ipv6: bool,
    #[serde(default)]
    pub private_networking: bool,
    #[serde(default)]
    pub monitoring: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<DropletCreateVolume>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_uuid: Option<String>,
}

/// Image for a create request: the API accepts either a slug or a numeric ID
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DropletCreateImage {
    Slug(String),
    Id(u64),
}

/// SSH key for a create request: numeric ID or fingerprint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DropletCreateSshKey {
    Id(u64),
    Fingerprint(String),
}

/// Volume for a create request: volume ID, or the deprecated `{ "name": ... }` form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DropletCreateVolume {
    Id(String),
    Name { name: String },
}

/// Droplet as returned by the API (fields the operator reads)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Droplet {
    pub id: u64,
    pub name: String,
    /// "new", "active", "off", "archive"
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub networks: Networks,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Droplet {
    /// First private IPv4 address, if one has been assigned
    #[must_use]
    pub fn private_ipv4(&self) -> Option<&str> {
        self.ipv4_of_type("private")
    }

    /// First public IPv4 address, if one has been assigned
    #[must_use]
    pub fn public_ipv4(&self) -> Option<&str> {
        self.ipv4_of_type("public")
    }

    fn ipv4_of_type(&self, network_type: &str) -> Option<&str> {
        self.networks
            .v4
            .iter()
            .find(|n| n.network_type == network_type && !n.ip_address.is_empty())
            .map(|n| n.ip_address.as_str())
    }
}

/// Droplet network assignments
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Networks {
    #[serde(default)]
    pub v4: Vec<NetworkV4>,
    #[serde(default)]
    pub v6: Vec<NetworkV6>,
}

/// IPv4 network assignment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkV4 {
    pub ip_address: String,
    #[serde(default)]
    pub netmask: String,
    #[serde(default)]
    pub gateway: String,
    /// "public" or "private"
    #[serde(rename = "type")]
    pub network_type: String,
}

/// IPv6 network assignment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkV6 {
    pub ip_address: String,
    #[serde(default)]
    pub netmask: u32,
    #[serde(default)]
    pub gateway: String,
    #[serde(rename = "type")]
    pub network_type: String,
}

/// SSH key stored in the account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Key {
    pub id: u64,
    pub name: String,
    pub fingerprint: String,
    pub public_key: String,
}

/// Request body for `POST /v2/account/keys`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyCreateRequest {
    pub name: String,
    pub public_key: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DropletRoot {
    pub droplet: Droplet,
}

#[derive(Debug, Deserialize)]
pub(crate) struct KeyRoot {
    pub ssh_key: Key,
}

/// Pagination links attached to list responses
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Links {
    #[serde(default)]
    pub pages: Option<Pages>,
}

/// Page navigation URLs
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Pages {
    #[serde(default)]
    pub next: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_serializes_mixed_references() {
        let request = DropletCreateRequest {
            name: "t1".to_string(),
            region: "nyc1".to_string(),
            size: "s-1vcpu-1gb".to_string(),
            image: DropletCreateImage::Slug("ubuntu-20-04-x64".to_string()),
            ssh_keys: vec![
                DropletCreateSshKey::Id(107_149),
                DropletCreateSshKey::Fingerprint("3b:16:e4".to_string()),
            ],
            backups: false,
            ipv6: true,
            private_networking: false,
            monitoring: false,
            user_data: None,
            volumes: vec![
                DropletCreateVolume::Id("vol-1".to_string()),
                DropletCreateVolume::Name { name: "data".to_string() },
            ],
            tags: vec!["web".to_string()],
            vpc_uuid: None,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["image"], "ubuntu-20-04-x64");
        assert_eq!(value["ssh_keys"], serde_json::json!([107_149, "3b:16:e4"]));
        assert_eq!(value["volumes"], serde_json::json!(["vol-1", { "name": "data" }]));
        assert!(value.get("user_data").is_none());
        assert!(value.get("vpc_uuid").is_none());
    }

    #[test]
    fn test_droplet_addresses() {
        let droplet: Droplet = serde_json::from_value(serde_json::json!({
            "id": 3_164_494,
            "name": "t1",
            "status": "active",
            "networks": {
                "v4": [
                    { "ip_address": "10.0.0.5", "netmask": "255.255.0.0", "gateway": "10.0.0.1", "type": "private" },
                    { "ip_address": "203.0.113.7", "netmask": "255.255.240.0", "gateway": "203.0.113.1", "type": "public" }
                ],
                "v6": []
            },
            "tags": ["droplet-operator:abc"]
        }))
        .unwrap();

        assert_eq!(droplet.private_ipv4(), Some("10.0.0.5"));
        assert_eq!(droplet.public_ipv4(), Some("203.0.113.7"));
    }

    #[test]
    fn test_new_droplet_has_no_addresses() {
        let droplet: Droplet =
            serde_json::from_value(serde_json::json!({ "id": 1, "name": "t1", "status": "new" })).unwrap();
        assert!(droplet.private_ipv4().is_none());
        assert!(droplet.public_ipv4().is_none());
    }
}
