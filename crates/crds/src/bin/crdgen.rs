//! Prints the droplet operator CRDs as a multi-document YAML stream.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/bases/crds.yaml`

use crds::{ImportKeyPair, Instance};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    for crd in [Instance::crd(), ImportKeyPair::crd()] {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
