//! Export and import command implementations.
//!
//! `export` prints every stored certificate and key as a JSON object mapping
//! file names to PEM contents. `import` writes such an object into another
//! directory, so a tree provisioned on one host can be installed on another.

use std::fs;
use std::io::Write;

use vmctl_pki::PemBundle;

use crate::cli::{ImportArgs, RegistryArgs};
use crate::commands::load_registry;
use crate::error::CliError;
use crate::output::{ImportSummary, OutputFormat};

/// Export command executor.
#[derive(Debug, Default)]
pub struct ExportCommand;

impl ExportCommand {
    /// Create a new export command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Execute the export command.
    ///
    /// The map is always written as JSON, whatever the output format.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is invalid, a stored file cannot be
    /// read, or output fails.
    pub fn execute<W: Write>(&self, writer: &mut W, args: &RegistryArgs) -> Result<(), CliError> {
        let bundle = self.export(args)?;
        serde_json::to_writer_pretty(&mut *writer, &bundle)
            .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
        writeln!(writer)?;
        Ok(())
    }

    /// Collect the stored files for the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is invalid or a stored file cannot be
    /// read.
    pub fn export(&self, args: &RegistryArgs) -> Result<PemBundle, CliError> {
        let (registry, store) = load_registry(args)?;
        let bundle = store.export(&registry)?;
        tracing::debug!(files = bundle.len(), "export ready");
        Ok(bundle)
    }
}

/// Import command executor.
#[derive(Debug, Default)]
pub struct ImportCommand;

impl ImportCommand {
    /// Create a new import command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Execute the import command.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read, the map is rejected, or
    /// output fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &ImportArgs,
    ) -> Result<(), CliError> {
        let summary = self.import(args)?;
        format.write(writer, &summary)?;
        Ok(())
    }

    /// Read the source map and write it into the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or parsed, or the store
    /// rejects the map.
    pub fn import(&self, args: &ImportArgs) -> Result<ImportSummary, CliError> {
        let (registry, store) = load_registry(&args.registry)?;
        let contents = fs::read_to_string(&args.from)?;
        let bundle: PemBundle = serde_json::from_str(&contents).map_err(|e| {
            CliError::Config(format!("invalid certificate map {}: {e}", args.from.display()))
        })?;

        let certificates = store.import(&registry, &bundle)?;
        Ok(ImportSummary {
            directory: store.dir().display().to_string(),
            source: args.from.display().to_string(),
            certificates,
        })
    }
}
