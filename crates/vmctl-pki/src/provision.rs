//! Provisioning of a whole certificate registry into a store.
//!
//! For each CA (in name order) the provisioner is in one of three states:
//!
//! - **absent**: nothing stored. The CA is generated and every leaf issued.
//! - **usable**: CA certificate and key stored. Each leaf is reused if it
//!   validates, or issued if missing.
//! - **keyless**: CA certificate stored, key gone. Every leaf must already
//!   exist and validate; nothing can be issued.
//!
//! The first error aborts the run. Re-running is safe and is the way to
//! recover from transient I/O failures.

use std::path::Path;

use tracing::{debug, info};

use crate::ca::{ensure_ca, CaMaterials};
use crate::error::{Error, Result};
use crate::leaf::{ensure_leaf, LeafOutcome};
use crate::registry::{CertificateMap, CertificateSpec, REGISTRY_NAME};
use crate::store::CertificateStore;
use crate::tree::resolve;

/// Storage state of a CA at the start of its processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaState {
    /// Nothing stored; the CA was generated.
    Absent,
    /// Certificate and key stored.
    Usable,
    /// Certificate stored without a usable key.
    Keyless,
}

/// Counts of what a run did, per kind of certificate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// CAs generated.
    pub cas_generated: usize,
    /// CAs reused from storage.
    pub cas_reused: usize,
    /// Leaves issued.
    pub leaves_issued: usize,
    /// Leaves reused from storage.
    pub leaves_reused: usize,
}

impl ProvisionReport {
    /// Number of certificate/key pairs written.
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.cas_generated + self.leaves_issued
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct Provisioned {
    /// Registry name of the root CA.
    pub root_name: String,
    /// Root CA certificate, and its key when available.
    pub root: CaMaterials,
    /// What the run did.
    pub report: ProvisionReport,
}

/// Drives CA bootstrapping and leaf issuance for a registry.
#[derive(Debug, Clone)]
pub struct Provisioner {
    store: CertificateStore,
}

impl Provisioner {
    /// Creates a provisioner writing to `store`.
    #[must_use]
    pub const fn new(store: CertificateStore) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &CertificateStore {
        &self.store
    }

    /// Provisions every certificate in `registry`.
    ///
    /// The root is the first CA in name order; with a single CA that is
    /// simply the CA.
    ///
    /// # Errors
    ///
    /// Returns the first error met, naming the certificate that caused it.
    /// A registry that fails to resolve, or that has no CA, fails before any
    /// file is touched.
    pub fn run(&self, registry: &CertificateMap) -> Result<Provisioned> {
        let tree = resolve(registry)?;
        if tree.is_empty() {
            return Err(Error::configuration(
                REGISTRY_NAME,
                "registry contains no certificate authority",
            ));
        }

        let mut report = ProvisionReport::default();
        let mut root: Option<(String, CaMaterials)> = None;

        for (ca_name, leaves) in tree.iter() {
            let ca_spec = lookup(registry, ca_name)?;

            let existed = self.store.exists(&ca_spec.base_file_name);
            let materials = ensure_ca(ca_spec, &self.store)?;
            let state = match (existed, materials.key.is_some()) {
                (false, _) => CaState::Absent,
                (true, true) => CaState::Usable,
                (true, false) => CaState::Keyless,
            };
            if state == CaState::Absent {
                report.cas_generated += 1;
            } else {
                report.cas_reused += 1;
            }
            debug!(ca = %ca_name, ?state, leaves = leaves.len(), "processing CA");

            for leaf_name in leaves {
                let leaf_spec = lookup(registry, leaf_name)?;
                let outcome = ensure_leaf(
                    leaf_spec,
                    &materials.certificate,
                    materials.key.as_ref(),
                    &self.store,
                )
                .map_err(|e| match (state, e) {
                    (CaState::Keyless, e @ Error::InconsistentState { .. }) => e,
                    (CaState::Keyless, e) => Error::InconsistentState {
                        name: leaf_name.clone(),
                        reason: format!(
                            "CA '{ca_name}' has no key and the certificate is not usable: {e}"
                        ),
                    },
                    (_, e) => e,
                })?;
                match outcome {
                    LeafOutcome::Issued => report.leaves_issued += 1,
                    LeafOutcome::Reused => report.leaves_reused += 1,
                }
            }

            if root.is_none() {
                root = Some((ca_name.to_string(), materials));
            }
        }

        let Some((root_name, root)) = root else {
            return Err(Error::configuration(
                REGISTRY_NAME,
                "registry contains no certificate authority",
            ));
        };

        info!(
            dir = %self.store.dir().display(),
            cas_generated = report.cas_generated,
            cas_reused = report.cas_reused,
            leaves_issued = report.leaves_issued,
            leaves_reused = report.leaves_reused,
            "certificate tree provisioned"
        );

        Ok(Provisioned {
            root_name,
            root,
            report,
        })
    }
}

fn lookup<'a>(registry: &'a CertificateMap, name: &str) -> Result<&'a CertificateSpec> {
    registry
        .get(name)
        .ok_or_else(|| Error::configuration(name, "certificate is not in the registry"))
}

/// Provisions `registry` into `dir` using the default file naming.
///
/// # Errors
///
/// See [`Provisioner::run`].
pub fn provision_directory(registry: &CertificateMap, dir: impl AsRef<Path>) -> Result<Provisioned> {
    Provisioner::new(CertificateStore::new(dir.as_ref())).run(registry)
}
