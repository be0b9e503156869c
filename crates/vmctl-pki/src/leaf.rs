//! Leaf certificate issuance and validation.

use tracing::{debug, warn};

use crate::ca::CertificateAuthority;
use crate::error::{Error, Result};
use crate::registry::CertificateSpec;
use crate::store::CertificateStore;
use crate::types::{Certificate, PrivateKey};
use crate::validation::{is_valid_now, verify_hostnames, verify_signature};

/// What [`ensure_leaf`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafOutcome {
    /// A new certificate and key were written.
    Issued,
    /// The stored certificate validated and was kept.
    Reused,
}

/// Produces or validates the leaf described by `spec`, signed by `ca_cert`.
///
/// If nothing is stored under the spec's base name a new certificate is
/// issued, which requires `ca_key`. Otherwise the stored pair is loaded, its
/// signature is checked against `ca_cert` and its SANs against the resolved
/// config. A mismatch is always reported, never repaired.
///
/// # Errors
///
/// - [`Error::Configuration`] if a mutator fails.
/// - [`Error::InconsistentState`] if issuance is needed and `ca_key` is `None`.
/// - [`Error::Io`] if the stored pair cannot be loaded or writing fails.
/// - [`Error::ChainValidation`] if the stored certificate was not signed by
///   `ca_cert` or the stored key does not belong to it.
/// - [`Error::SanValidation`] if the stored certificate misses a required SAN.
pub fn ensure_leaf(
    spec: &CertificateSpec,
    ca_cert: &Certificate,
    ca_key: Option<&PrivateKey>,
    store: &CertificateStore,
) -> Result<LeafOutcome> {
    let config = spec.resolve_config()?;
    let base = spec.base_file_name.as_str();

    if !store.exists(base) {
        let Some(ca_key) = ca_key else {
            return Err(Error::InconsistentState {
                name: spec.name.clone(),
                reason: "certificate is missing and cannot be issued without the CA key".into(),
            });
        };
        let ca_name = spec.parent_ca_name.as_deref().unwrap_or_default();
        let ca = CertificateAuthority::from_existing(ca_name, ca_cert.clone(), ca_key.clone())?;
        let (cert, key) = ca.issue(&spec.name, &config)?;
        store
            .write(base, &cert, &key)
            .map_err(|e| e.for_certificate(&spec.name))?;
        return Ok(LeafOutcome::Issued);
    }

    let (cert, key) = store
        .load(base)
        .map_err(|e| e.for_certificate(&spec.name))?;

    verify_signature(&cert, ca_cert).map_err(|reason| Error::ChainValidation {
        name: spec.name.clone(),
        reason,
    })?;
    if !key.matches(&cert) {
        return Err(Error::ChainValidation {
            name: spec.name.clone(),
            reason: format!("private key does not match certificate '{}'", cert.subject()),
        });
    }

    verify_hostnames(&cert, &config.alt_names).map_err(|reason| Error::SanValidation {
        name: spec.name.clone(),
        reason,
    })?;

    if !is_valid_now(&cert) {
        warn!(
            leaf = %spec.name,
            not_after = %cert.not_after(),
            "certificate is outside its validity window"
        );
    }

    debug!(leaf = %spec.name, "reusing existing certificate");
    Ok(LeafOutcome::Reused)
}
