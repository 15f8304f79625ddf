//! # CRD Generator
//!
//! Prints the `CertificateSet` CustomResourceDefinition YAML, CEL validation rules included.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/certificateset.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use certificate_set_controller::crd::schema::certificate_set_crd;

fn main() {
    let yaml = certificate_set_crd()
        .map_err(|e| e.to_string())
        .and_then(|crd| serde_yaml::to_string(&crd).map_err(|e| e.to_string()));

    match yaml {
        Ok(yaml) => {
            println!("# This file is auto-generated by crdgen");
            println!("# DO NOT EDIT THIS FILE MANUALLY");
            println!("---");
            print!("{yaml}");
        }
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
