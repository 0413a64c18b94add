//! Prints the CFAPI CustomResourceDefinition as YAML.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/bases/cfapi.yaml`

use crds::CFAPI;
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&CFAPI::crd())?);
    Ok(())
}
