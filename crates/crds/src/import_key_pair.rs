//! ImportKeyPair Custom Resource Definition
//!
//! Imports an SSH public key into the DigitalOcean account so droplets can
//! reference it by ID or fingerprint.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ImportKeyPairSpec defines the key to import
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[kube(
    group = "droplet.cattle.io",
    version = "v1alpha1",
    kind = "ImportKeyPair",
    namespaced,
    status = "ImportKeyPairStatus",
    printcolumn = r#"{"name":"ID","type":"string","jsonPath":".status.id"}"#,
    printcolumn = r#"{"name":"FingerPrint","type":"string","jsonPath":".status.fingerPrint"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.lifecycleState"}"#,
    printcolumn = r#"{"name":"Message","type":"string","jsonPath":".status.message"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ImportKeyPairSpec {
    /// OpenSSH formatted public key
    pub public_key: String,

    /// Name of the Secret (same namespace) holding the DigitalOcean `TOKEN`
    pub secret: String,
}

/// ImportKeyPairStatus defines the observed state of the imported key
///
/// Unset fields serialize as `null`; see `InstanceStatus`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportKeyPairStatus {
    /// Import progress (`status` in objects written by older releases)
    #[serde(default, alias = "status")]
    pub lifecycle_state: KeyPairState,

    /// Key ID assigned by DigitalOcean
    #[serde(default)]
    pub id: Option<u64>,

    /// Key fingerprint reported by DigitalOcean
    #[serde(default)]
    pub finger_print: Option<String>,

    /// Last error observed while reconciling
    #[serde(default)]
    pub message: Option<String>,

    /// When `lifecycleState` last changed
    #[serde(default)]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// Key pair lifecycle state
///
/// Key import is synchronous on the DigitalOcean side, so there is no
/// intermediate "submitted" state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "PascalCase")]
pub enum KeyPairState {
    /// Nothing has been sent to DigitalOcean
    #[default]
    #[serde(alias = "")]
    Empty,
    /// A create request may have been issued; the key ID is not yet known
    CreateRequested,
    /// The key is imported
    #[serde(alias = "provisioned")]
    Provisioned,
}

impl KeyPairState {
    /// Whether the state needs no further provider calls
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Provisioned
    }
}

impl std::fmt::Display for KeyPairState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Empty => "Empty",
            Self::CreateRequested => "CreateRequested",
            Self::Provisioned => "Provisioned",
        };
        f.write_str(s)
    }
}
