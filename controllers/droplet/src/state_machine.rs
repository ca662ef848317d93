//! Lifecycle decisions.
//!
//! Pure functions from (lifecycle state, deletion requested, finalizer present)
//! to the next step of a reconciliation pass. No I/O happens here; the
//! reconcilers execute whatever step is returned.

use crds::{InstanceState, KeyPairState};

/// Next step of a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Persist the `CreateRequested` checkpoint, then issue the create
    RequestCreate,
    /// A create may have happened: look the object up, create only if missing
    RecoverOrCreate,
    /// Read provider details (addresses) of a submitted droplet
    FetchDetails,
    /// Delete the provider object, then clear the finalizer
    Delete,
    /// Nothing to do
    NoOp,
}

/// Decide the next step for an Instance
pub fn decide_instance(state: InstanceState, deletion_requested: bool, finalizer_present: bool) -> Step {
    if deletion_requested {
        return if finalizer_present { Step::Delete } else { Step::NoOp };
    }
    match state {
        InstanceState::Empty => Step::RequestCreate,
        InstanceState::CreateRequested => Step::RecoverOrCreate,
        InstanceState::Submitted => Step::FetchDetails,
        InstanceState::Provisioned => Step::NoOp,
    }
}

/// Decide the next step for an ImportKeyPair
pub fn decide_key_pair(state: KeyPairState, deletion_requested: bool, finalizer_present: bool) -> Step {
    if deletion_requested {
        return if finalizer_present { Step::Delete } else { Step::NoOp };
    }
    match state {
        KeyPairState::Empty => Step::RequestCreate,
        KeyPairState::CreateRequested => Step::RecoverOrCreate,
        KeyPairState::Provisioned => Step::NoOp,
    }
}
