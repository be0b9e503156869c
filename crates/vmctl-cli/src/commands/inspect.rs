//! Inspect command implementation.
//!
//! Reports what is stored for each registry entry without writing anything.

use std::io::Write;

use vmctl_pki::validation::verify_signature;
use vmctl_pki::{is_expired, is_not_yet_valid, CertificateMap, CertificateSpec, CertificateStore};

use crate::cli::RegistryArgs;
use crate::commands::load_registry;
use crate::error::CliError;
use crate::output::{CertificateList, CertificateRow, OutputFormat};

/// Inspect command executor.
#[derive(Debug, Default)]
pub struct InspectCommand;

impl InspectCommand {
    /// Create a new inspect command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Execute the inspect command.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is invalid or output fails. Problems
    /// with individual certificates are reported in the output instead.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &RegistryArgs,
    ) -> Result<(), CliError> {
        let (registry, store) = load_registry(args)?;
        let list = Self::inspect(&registry, &store);
        format.write(writer, &list)?;
        Ok(())
    }

    /// Build one row per registry entry.
    #[must_use]
    pub fn inspect(registry: &CertificateMap, store: &CertificateStore) -> CertificateList {
        CertificateList {
            directory: store.dir().display().to_string(),
            certificates: registry
                .iter()
                .map(|spec| Self::row(registry, store, spec))
                .collect(),
        }
    }

    fn row(registry: &CertificateMap, store: &CertificateStore, spec: &CertificateSpec) -> CertificateRow {
        let base = &spec.base_file_name;
        let mut row = CertificateRow {
            name: spec.name.clone(),
            parent: spec.parent_ca_name.clone(),
            status: "missing".into(),
            subject: None,
            issuer: None,
            not_after: None,
            is_ca: None,
            key_present: store.key_exists(base),
        };

        if !store.exists(base) {
            return row;
        }

        let cert = match store.load_cert_only(base) {
            Ok(cert) => cert,
            Err(e) => {
                row.status = format!("unreadable: {e}");
                return row;
            }
        };

        row.subject = Some(cert.subject().to_string());
        row.issuer = Some(cert.issuer().to_string());
        row.not_after = Some(cert.not_after().to_rfc3339());
        row.is_ca = Some(cert.is_ca());

        let parent = spec
            .parent_ca_name
            .as_deref()
            .and_then(|name| registry.get(name))
            .and_then(|ca| store.load_cert_only(&ca.base_file_name).ok());

        row.status = if is_expired(&cert) {
            "expired".into()
        } else if is_not_yet_valid(&cert) {
            "not yet valid".into()
        } else if let Some(Err(e)) = parent.as_ref().map(|ca| verify_signature(&cert, ca)) {
            format!("untrusted: {e}")
        } else {
            "ok".into()
        };
        row
    }
}
