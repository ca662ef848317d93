//! Instance Custom Resource Definition
//!
//! Declares a DigitalOcean droplet. `InstanceSpec` mirrors the
//! droplet create request; the status tracks provisioning progress.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// InstanceSpec defines the desired state of a droplet
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "droplet.cattle.io",
    version = "v1alpha1",
    kind = "Instance",
    namespaced,
    status = "InstanceStatus",
    printcolumn = r#"{"name":"InstanceID","type":"string","jsonPath":".status.instanceID"}"#,
    printcolumn = r#"{"name":"PublicIP","type":"string","jsonPath":".status.publicIP"}"#,
    printcolumn = r#"{"name":"PrivateIP","type":"string","jsonPath":".status.privateIP"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.lifecycleState"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    /// Name of the Secret (same namespace) holding the DigitalOcean `TOKEN`
    pub secret: String,

    /// Droplet name
    pub name: String,

    /// Region slug (e.g. "nyc1")
    pub region: String,

    /// Size slug (e.g. "s-1vcpu-1gb")
    pub size: String,

    /// Image to boot from
    pub image: InstanceImage,

    /// SSH keys to embed in the droplet
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<SshKeyReference>,

    /// Enable automated backups
    #[serde(default)]
    pub backups: bool,

    /// Enable IPv6 networking
    #[serde(default)]
    pub ipv6: bool,

    /// Keep the droplet off the public network; no public IP is recorded
    #[serde(default)]
    pub private_networking: bool,

    /// Install the monitoring agent
    #[serde(default)]
    pub monitoring: bool,

    /// Cloud-init user data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,

    /// Block storage volumes to attach
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeReference>,

    /// Tags applied to the droplet
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// VPC to place the droplet in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_uuid: Option<String>,
}

/// Image reference, by numeric ID or by slug
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceImage {
    /// Image ID (private snapshots and custom images)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// Image slug (public distribution images, e.g. "ubuntu-20-04-x64")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

/// SSH key reference, by key ID or by fingerprint
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SshKeyReference {
    /// Key ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// Key fingerprint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// Volume reference
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeReference {
    /// Volume ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Volume name (deprecated by DigitalOcean; prefer `id`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// InstanceStatus defines the observed state of a droplet
///
/// Unset fields serialize as `null` so a merge patch of the whole status
/// removes them from the stored object.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    /// Provisioning progress (`status` in objects written by older releases)
    #[serde(default, alias = "status")]
    pub lifecycle_state: InstanceState,

    /// Droplet ID assigned by DigitalOcean
    #[serde(default, rename = "instanceID")]
    pub instance_id: Option<u64>,

    /// Private IPv4 address
    #[serde(default, rename = "privateIP")]
    pub private_ip: Option<String>,

    /// Public IPv4 address (unset with private networking)
    #[serde(default, rename = "publicIP")]
    pub public_ip: Option<String>,

    /// Last error observed while reconciling
    #[serde(default)]
    pub message: Option<String>,

    /// When `lifecycleState` last changed
    #[serde(default)]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// Instance lifecycle state
///
/// Variants are declared in lifecycle order, so `Ord` doubles as the
/// forward-only progression check. Serializes as PascalCase and accepts the
/// lowercase `status` values written by older operator releases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "PascalCase")]
pub enum InstanceState {
    /// Nothing has been sent to DigitalOcean
    #[default]
    #[serde(alias = "")]
    Empty,
    /// A create request may have been issued; the droplet ID is not yet known
    CreateRequested,
    /// The droplet exists; waiting for IP addresses
    #[serde(alias = "submitted")]
    Submitted,
    /// The droplet is up and its addresses are recorded
    #[serde(alias = "provisioned")]
    Provisioned,
}

impl InstanceState {
    /// Whether the state needs no further provider calls
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Provisioned
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Empty => "Empty",
            Self::CreateRequested => "CreateRequested",
            Self::Submitted => "Submitted",
            Self::Provisioned => "Provisioned",
        };
        f.write_str(s)
    }
}
