//! Provision command implementation.
//!
//! Creates whatever is missing from the certificate tree and validates what
//! is already there.

use std::io::Write;

use vmctl_pki::Provisioner;

use crate::cli::RegistryArgs;
use crate::commands::load_registry;
use crate::error::CliError;
use crate::output::{OutputFormat, ProvisionSummary};

/// Provision command executor.
#[derive(Debug, Default)]
pub struct ProvisionCommand;

impl ProvisionCommand {
    /// Create a new provision command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Execute the provision command.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is invalid, provisioning fails, or
    /// output fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &RegistryArgs,
    ) -> Result<(), CliError> {
        let summary = self.provision(args)?;
        format.write(writer, &summary)?;
        Ok(())
    }

    /// Run provisioning and summarize the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is invalid or provisioning fails.
    pub fn provision(&self, args: &RegistryArgs) -> Result<ProvisionSummary, CliError> {
        let (registry, store) = load_registry(args)?;
        let directory = store.dir().display().to_string();
        let provisioned = Provisioner::new(store).run(&registry)?;
        let report = provisioned.report;

        Ok(ProvisionSummary {
            directory,
            root: provisioned.root_name,
            root_subject: provisioned.root.certificate.subject().to_string(),
            root_key_available: provisioned.root.key.is_some(),
            cas_generated: report.cas_generated,
            cas_reused: report.cas_reused,
            leaves_issued: report.leaves_issued,
            leaves_reused: report.leaves_reused,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Format;

    fn args(dir: &std::path::Path) -> RegistryArgs {
        RegistryArgs {
            dir: Some(dir.to_path_buf()),
            registry: None,
            ca_name: "test-ca".into(),
            hostname: false,
            path_format: None,
        }
    }

    #[test]
    fn first_then_second_run() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = ProvisionCommand::new();

        let first = cmd.provision(&args(dir.path())).unwrap();
        assert_eq!(first.cas_generated, 1);
        assert_eq!(first.leaves_issued, 2);
        assert_eq!(first.root, "ca");
        assert_eq!(first.root_subject, "test-ca");

        let second = cmd.provision(&args(dir.path())).unwrap();
        assert_eq!(second.cas_reused, 1);
        assert_eq!(second.leaves_reused, 2);
        assert_eq!(second.leaves_issued, 0);
    }

    #[test]
    fn execute_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut buf = Vec::new();
        ProvisionCommand::new()
            .execute(&mut buf, &OutputFormat::new(Format::Json), &args(dir.path()))
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["root"], "ca");
        assert_eq!(value["root_key_available"], true);
    }

    #[test]
    fn provisioning_errors_surface() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ca-cert.pem"), "not a certificate").unwrap();

        let err = ProvisionCommand::new().provision(&args(dir.path())).unwrap_err();
        match err {
            CliError::Pki(e) => assert_eq!(e.name(), "ca"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
