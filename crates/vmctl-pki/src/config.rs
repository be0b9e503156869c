//! TOML registry files.
//!
//! ```toml
//! directory = "/etc/vmctl/pki"
//! path_format = "pem"
//!
//! [[certificate]]
//! name = "ca"
//! common_name = "vmctl-ca"
//!
//! [[certificate]]
//! name = "server"
//! parent = "ca"
//! common_name = "vmctl-server"
//! usages = ["serverAuth"]
//! dns_names = ["vmctl-server"]
//! include_hostname = true
//! ```

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::registry::{add_hostname, CertificateMap, CertificateSpec, REGISTRY_NAME};
use crate::store::PathFormat;
use crate::types::KeyUsage;

/// On-disk file naming preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathFormatKind {
    /// `<name>-cert.pem` / `<name>-key.pem`.
    #[default]
    Pem,
    /// `<name>.crt` / `<name>.key`.
    Crt,
}

impl PathFormatKind {
    /// Returns the matching formatter pair.
    #[must_use]
    pub fn path_format(self) -> PathFormat {
        match self {
            Self::Pem => PathFormat::pem(),
            Self::Crt => PathFormat::crt(),
        }
    }
}

/// One `[[certificate]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CertificateEntry {
    /// Registry name.
    pub name: String,
    /// Description; defaults to the name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// File stem; defaults to the name.
    #[serde(default)]
    pub base_name: Option<String>,
    /// Signing CA; absent for a self-signed CA.
    #[serde(default)]
    pub parent: Option<String>,
    /// Subject common name.
    pub common_name: String,
    /// Subject organizations.
    #[serde(default)]
    pub organization: Vec<String>,
    /// Extended key usages.
    #[serde(default)]
    pub usages: Vec<KeyUsage>,
    /// DNS SANs.
    #[serde(default)]
    pub dns_names: Vec<String>,
    /// IP SANs.
    #[serde(default)]
    pub ips: Vec<IpAddr>,
    /// Validity override in days.
    #[serde(default)]
    pub validity_days: Option<u32>,
    /// Add the runtime hostname as a DNS SAN at provisioning time.
    #[serde(default)]
    pub include_hostname: bool,
}

impl CertificateEntry {
    /// Converts the entry into a spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the entry is incomplete.
    pub fn to_spec(&self) -> Result<CertificateSpec> {
        let mut builder = CertificateSpec::builder(&self.name)
            .common_name(&self.common_name)
            .signed_by(self.parent.clone().unwrap_or_default());
        if let Some(display_name) = &self.display_name {
            builder = builder.display_name(display_name);
        }
        if let Some(base) = &self.base_name {
            builder = builder.base_file_name(base);
        }
        if let Some(days) = self.validity_days {
            builder = builder.validity_days(days);
        }
        for org in &self.organization {
            builder = builder.organization(org);
        }
        for usage in &self.usages {
            builder = builder.usage(*usage);
        }
        for dns in &self.dns_names {
            builder = builder.dns(dns);
        }
        for ip in &self.ips {
            builder = builder.ip(*ip);
        }
        if self.include_hostname {
            builder = builder.mutator(add_hostname());
        }
        builder.build()
    }
}

/// A registry file: target directory, naming, and certificate entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryFile {
    /// Target directory; callers may override it.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// File naming preset.
    #[serde(default)]
    pub path_format: PathFormatKind,
    /// Certificates to provision.
    #[serde(default, rename = "certificate")]
    pub certificates: Vec<CertificateEntry>,
}

impl RegistryFile {
    /// Loads a registry file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, or
    /// [`Error::Configuration`] if it is not a valid registry.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::Io {
            name: path.display().to_string(),
            path: path.to_path_buf(),
            reason: format!("failed to read registry file: {e}"),
        })?;
        Self::from_toml(&content)
    }

    /// Parses a registry from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::configuration(REGISTRY_NAME, format!("invalid TOML: {e}")))
    }

    /// Builds the certificate registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for incomplete or duplicate entries.
    pub fn to_registry(&self) -> Result<CertificateMap> {
        let specs = self
            .certificates
            .iter()
            .map(CertificateEntry::to_spec)
            .collect::<Result<Vec<_>>>()?;
        CertificateMap::from_specs(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::resolve;

    const SAMPLE: &str = r#"
directory = "/var/lib/vmctl/pki"
path_format = "crt"

[[certificate]]
name = "ca"
display_name = "root CA"
common_name = "myca"

[[certificate]]
name = "server"
parent = "ca"
common_name = "myca-server"
usages = ["serverAuth"]
dns_names = ["myca-server"]
ips = ["10.0.0.1"]
validity_days = 90

[[certificate]]
name = "client"
base_name = "agent"
parent = "ca"
common_name = "myca-client"
organization = ["system:host"]
usages = ["clientAuth"]
"#;

    #[test]
    fn parses_sample() {
        let file = RegistryFile::from_toml(SAMPLE).unwrap();
        assert_eq!(file.directory.as_deref(), Some(Path::new("/var/lib/vmctl/pki")));
        assert_eq!(file.path_format, PathFormatKind::Crt);
        assert_eq!(file.certificates.len(), 3);

        let registry = file.to_registry().unwrap();
        let server = registry.get("server").unwrap();
        assert_eq!(server.config.validity_days, Some(90));
        assert_eq!(server.config.alt_names.ips.len(), 1);
        assert_eq!(registry.get("client").unwrap().base_file_name, "agent");
        assert_eq!(registry.get("ca").unwrap().display_name, "root CA");

        let tree = resolve(&registry).unwrap();
        assert_eq!(tree.leaves("ca").unwrap().len(), 2);
    }

    #[test]
    fn defaults_to_pem_naming() {
        let file = RegistryFile::from_toml("").unwrap();
        assert_eq!(file.path_format, PathFormatKind::Pem);
        assert!(file.certificates.is_empty());
        let store = crate::store::CertificateStore::with_format("/d", file.path_format.path_format());
        assert_eq!(store.cert_path("ca"), Path::new("/d/ca-cert.pem"));
    }

    #[test]
    fn include_hostname_attaches_mutator() {
        let file = RegistryFile::from_toml(
            r#"
[[certificate]]
name = "ca"
common_name = "myca"
include_hostname = true
"#,
        )
        .unwrap();
        let registry = file.to_registry().unwrap();
        assert_eq!(registry.get("ca").unwrap().mutators.len(), 1);
    }

    #[test]
    fn unknown_usage_is_rejected() {
        let err = RegistryFile::from_toml(
            r#"
[[certificate]]
name = "x"
common_name = "x"
usages = ["codeSigning"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert!(RegistryFile::from_toml("directroy = \"/tmp\"").is_err());
    }

    #[test]
    fn duplicate_entries_are_rejected() {
        let file = RegistryFile::from_toml(
            r#"
[[certificate]]
name = "ca"
common_name = "a"

[[certificate]]
name = "ca"
common_name = "b"
"#,
        )
        .unwrap();
        assert!(file.to_registry().is_err());
    }

    #[test]
    fn huge_validity_is_rejected_before_provisioning() {
        let file = RegistryFile::from_toml(
            r#"
[[certificate]]
name = "ca"
common_name = "myca"
validity_days = 4000000000
"#,
        )
        .unwrap();
        let err = file.to_registry().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert_eq!(err.name(), "ca");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RegistryFile::from_file("/nonexistent/vmctl/registry.toml").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
