//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Outcome of a provisioning run.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionSummary {
    /// Certificate directory.
    pub directory: String,
    /// Root CA registry name.
    pub root: String,
    /// Root CA subject.
    pub root_subject: String,
    /// Whether the root CA key is available.
    pub root_key_available: bool,
    /// CAs generated.
    pub cas_generated: usize,
    /// CAs reused.
    pub cas_reused: usize,
    /// Leaves issued.
    pub leaves_issued: usize,
    /// Leaves reused.
    pub leaves_reused: usize,
}

impl TableDisplay for ProvisionSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Certificate tree provisioned")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Directory:        {}", self.directory)?;
        writeln!(writer, "Root CA:          {} ({})", self.root, self.root_subject)?;
        writeln!(
            writer,
            "Root CA key:      {}",
            if self.root_key_available { "present" } else { "absent" }
        )?;
        writeln!(writer)?;
        writeln!(writer, "CAs")?;
        writeln!(writer, "  Generated:      {}", self.cas_generated)?;
        writeln!(writer, "  Reused:         {}", self.cas_reused)?;
        writeln!(writer, "Leaves")?;
        writeln!(writer, "  Issued:         {}", self.leaves_issued)?;
        writeln!(writer, "  Reused:         {}", self.leaves_reused)?;
        Ok(())
    }
}

/// One stored certificate as seen by `inspect`.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateRow {
    /// Registry name.
    pub name: String,
    /// Signing CA, if a leaf.
    pub parent: Option<String>,
    /// `ok`, `expired`, `missing`, or an error description.
    pub status: String,
    /// Subject common name.
    pub subject: Option<String>,
    /// Issuer common name.
    pub issuer: Option<String>,
    /// Expiry, RFC 3339.
    pub not_after: Option<String>,
    /// CA flag.
    pub is_ca: Option<bool>,
    /// Whether the key file is present.
    pub key_present: bool,
}

/// Rows for all registry entries.
#[derive(Debug, Clone, Serialize)]
pub struct CertificateList {
    /// Certificate directory.
    pub directory: String,
    /// Rows in registry name order.
    pub certificates: Vec<CertificateRow>,
}

impl TableDisplay for CertificateList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Directory: {}", self.directory)?;
        writeln!(writer)?;
        writeln!(
            writer,
            "{:<12}  {:<10}  {:<24}  {:<24}  {:<20}  {:<4}  {}",
            "NAME", "PARENT", "SUBJECT", "ISSUER", "NOT AFTER", "KEY", "STATUS"
        )?;
        writeln!(writer, "{}", "─".repeat(110))?;

        for row in &self.certificates {
            writeln!(
                writer,
                "{:<12}  {:<10}  {:<24}  {:<24}  {:<20}  {:<4}  {}",
                truncate(&row.name, 12),
                truncate(row.parent.as_deref().unwrap_or("-"), 10),
                truncate(row.subject.as_deref().unwrap_or("-"), 24),
                truncate(row.issuer.as_deref().unwrap_or("-"), 24),
                row.not_after.as_deref().unwrap_or("-"),
                if row.key_present { "yes" } else { "no" },
                row.status
            )?;
        }
        Ok(())
    }
}

/// Outcome of an import.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    /// Certificate directory.
    pub directory: String,
    /// Source file.
    pub source: String,
    /// Certificates written.
    pub certificates: usize,
}

impl TableDisplay for ImportSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Certificates imported")?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Source:           {}", self.source)?;
        writeln!(writer, "Directory:        {}", self.directory)?;
        writeln!(writer, "Certificates:     {}", self.certificates)?;
        Ok(())
    }
}

/// Truncate a string to max length, adding ellipsis if needed.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> ProvisionSummary {
        ProvisionSummary {
            directory: "/etc/vmctl/pki".into(),
            root: "ca".into(),
            root_subject: "vmctl-ca".into(),
            root_key_available: true,
            cas_generated: 1,
            cas_reused: 0,
            leaves_issued: 2,
            leaves_reused: 0,
        }
    }

    #[test]
    fn summary_table() {
        let mut buf = Vec::new();
        OutputFormat::default().write(&mut buf, &summary()).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("Root CA:          ca (vmctl-ca)"));
        assert!(out.contains("Issued:         2"));
    }

    #[test]
    fn summary_json() {
        let mut buf = Vec::new();
        OutputFormat::new(Format::Json).write(&mut buf, &summary()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["leaves_issued"], 2);
        assert_eq!(value["root_key_available"], true);
    }

    #[test]
    fn list_table_marks_missing() {
        let list = CertificateList {
            directory: "/tmp".into(),
            certificates: vec![CertificateRow {
                name: "server".into(),
                parent: Some("ca".into()),
                status: "missing".into(),
                subject: None,
                issuer: None,
                not_after: None,
                is_ca: None,
                key_present: false,
            }],
        };
        let mut buf = Vec::new();
        OutputFormat::default().write(&mut buf, &list).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("server"));
        assert!(out.trim_end().ends_with("missing"));
    }

    #[test]
    fn truncate_long_names() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-name", 6), "a-ver…");
    }
}
