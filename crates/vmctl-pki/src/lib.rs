//! Certificate tree provisioning for vmctl.
#![forbid(unsafe_code)]
//!
//! This crate makes sure a consistent two-tier certificate hierarchy exists on
//! disk before the control plane opens a mutual-TLS listener or an agent dials
//! it. Provisioning is idempotent: existing material is validated and reused,
//! missing material is generated, and states that cannot be repaired safely
//! are reported instead of overwritten.
//!
//! # Example
//!
//! ```no_run
//! use vmctl_pki::{CertificateMap, CertificateStore, Provisioner};
//!
//! let registry = CertificateMap::standard_mtls("vmctl-ca").unwrap();
//! let provisioner = Provisioner::new(CertificateStore::new("/etc/vmctl/pki"));
//!
//! let provisioned = provisioner.run(&registry).unwrap();
//! println!("root CA: {}", provisioned.root.certificate.subject());
//! ```
//!
//! # Modules
//!
//! - [`registry`] - Certificate specs, the registry, and config mutators
//! - [`tree`] - Resolution of the registry into CA → leaves
//! - [`store`] - Directory-backed certificate/key storage
//! - [`ca`] - CA bootstrapping and signing
//! - [`leaf`] - Leaf issuance and validation
//! - [`provision`] - The provisioning run
//! - [`validation`] - Signature, hostname and validity checks
//! - [`config`] - TOML registry files
//! - [`types`] - Core types (Certificate, `PrivateKey`, etc.)
//! - [`error`] - Error types

pub mod ca;
pub mod config;
pub mod error;
pub mod leaf;
pub mod provision;
pub mod registry;
pub mod store;
pub mod tree;
pub mod types;
pub mod validation;

// Re-export commonly used types at crate root
pub use ca::{ensure_ca, CaMaterials, CertificateAuthority};
pub use config::{CertificateEntry, PathFormatKind, RegistryFile};
pub use error::{Error, ErrorKind, Result};
pub use leaf::{ensure_leaf, LeafOutcome};
pub use provision::{provision_directory, CaState, ProvisionReport, Provisioned, Provisioner};
pub use registry::{
    add_dns_names, add_hostname, add_ip_addresses, CertificateMap, CertificateSpec,
    CertificateSpecBuilder, ConfigMutator, HOST_ORGANIZATION, MAX_VALIDITY_DAYS,
};
pub use store::{CertificateStore, PathFormat, PathFormatter, PemBundle};
pub use tree::{resolve, CertificateTree};
pub use types::{AltNames, CertConfig, Certificate, KeyUsage, PrivateKey, SubjectAltName};
pub use validation::{is_expired, is_not_yet_valid, is_valid_now, remaining_validity};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{verify_hostnames, verify_signature};

    #[test]
    fn full_workflow_test() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = CertificateMap::standard_mtls("Vmctl Root CA").unwrap();
        let provisioner = Provisioner::new(CertificateStore::new(dir.path()));

        let out = provisioner.run(&registry).unwrap();
        assert_eq!(out.root.certificate.subject(), "Vmctl Root CA");

        let store = provisioner.store();
        let server = store.load_cert_only("server").unwrap();
        let client = store.load_cert_only("client").unwrap();

        verify_signature(&server, &out.root.certificate).unwrap();
        verify_signature(&client, &out.root.certificate).unwrap();
        verify_hostnames(&server, &registry.get("server").unwrap().config.alt_names).unwrap();

        assert_eq!(server.usages(), [KeyUsage::ServerAuth]);
        assert_eq!(client.usages(), [KeyUsage::ClientAuth]);
        assert_eq!(client.organization(), [HOST_ORGANIZATION.to_string()]);
        assert!(server.pem().contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn mtls_workflow_with_crt_naming() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CertificateStore::with_format(dir.path(), PathFormat::crt());
        let registry = CertificateMap::standard_mtls("mTLS CA").unwrap();

        Provisioner::new(store.clone()).run(&registry).unwrap();

        for base in ["ca", "server", "client"] {
            assert!(dir.path().join(format!("{base}.crt")).exists());
            assert!(dir.path().join(format!("{base}.key")).exists());
        }
        assert!(store.load("server").is_ok());
    }
}
