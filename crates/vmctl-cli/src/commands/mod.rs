//! CLI command implementations.
//!
//! - [`provision`] - Create or validate the certificate tree
//! - [`inspect`] - Read-only view of what is on disk
//! - [`transfer`] - Export and import of the stored set

pub mod inspect;
pub mod provision;
pub mod transfer;

pub use inspect::InspectCommand;
pub use provision::ProvisionCommand;
pub use transfer::{ExportCommand, ImportCommand};

use vmctl_pki::{add_hostname, CertificateMap, CertificateStore, KeyUsage, RegistryFile};

use crate::cli::RegistryArgs;
use crate::error::CliError;

/// Builds the registry and store described by the arguments.
///
/// Command-line values take precedence over the registry file. Without a
/// registry file the standard CA/server/client set is used.
///
/// # Errors
///
/// Returns an error if the registry file cannot be loaded or no certificate
/// directory is given.
pub fn load_registry(args: &RegistryArgs) -> Result<(CertificateMap, CertificateStore), CliError> {
    let file = args.registry.as_deref().map(RegistryFile::from_file).transpose()?;

    let mut registry = match &file {
        Some(file) => file.to_registry()?,
        None => CertificateMap::standard_mtls(&args.ca_name)?,
    };

    let dir = args
        .dir
        .clone()
        .or_else(|| file.as_ref().and_then(|f| f.directory.clone()))
        .ok_or_else(|| {
            CliError::Config(
                "no certificate directory: pass --dir or set `directory` in the registry file"
                    .into(),
            )
        })?;

    let kind = args
        .path_format
        .map(Into::into)
        .or_else(|| file.as_ref().map(|f| f.path_format))
        .unwrap_or_default();

    if args.hostname {
        let servers: Vec<String> = registry
            .iter()
            .filter(|spec| spec.config.usages.contains(&KeyUsage::ServerAuth))
            .map(|spec| spec.name.clone())
            .collect();
        for name in servers {
            if let Some(spec) = registry.get_mut(&name) {
                spec.mutators.push(add_hostname());
            }
        }
    }

    tracing::debug!(
        dir = %dir.display(),
        certificates = registry.len(),
        "registry loaded"
    );

    Ok((registry, CertificateStore::with_format(dir, kind.path_format())))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::cli::PathFormatArg;

    fn args(dir: Option<&str>) -> RegistryArgs {
        RegistryArgs {
            dir: dir.map(PathBuf::from),
            registry: None,
            ca_name: "vmctl-ca".into(),
            hostname: false,
            path_format: None,
        }
    }

    #[test]
    fn standard_set_without_registry_file() {
        let (registry, store) = load_registry(&args(Some("/tmp/pki"))).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(store.dir(), PathBuf::from("/tmp/pki"));
        assert_eq!(store.cert_path("ca"), PathBuf::from("/tmp/pki/ca-cert.pem"));
    }

    #[test]
    fn directory_is_required() {
        let err = load_registry(&args(None)).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn path_format_flag_wins() {
        let mut a = args(Some("/tmp/pki"));
        a.path_format = Some(PathFormatArg::Crt);
        let (_, store) = load_registry(&a).unwrap();
        assert_eq!(store.key_path("server"), PathBuf::from("/tmp/pki/server.key"));
    }

    #[test]
    fn registry_file_supplies_directory_and_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        std::fs::write(
            &path,
            r#"
directory = "/srv/pki"
path_format = "crt"

[[certificate]]
name = "root"
common_name = "Root"
"#,
        )
        .unwrap();

        let mut a = args(None);
        a.registry = Some(path);
        let (registry, store) = load_registry(&a).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(store.cert_path("root"), PathBuf::from("/srv/pki/root.crt"));
    }

    #[test]
    fn hostname_flag_only_touches_server_specs() {
        let mut a = args(Some("/tmp/pki"));
        a.hostname = true;
        let (registry, _) = load_registry(&a).unwrap();
        assert_eq!(registry.get("server").unwrap().mutators.len(), 1);
        assert!(registry.get("client").unwrap().mutators.is_empty());
        assert!(registry.get("ca").unwrap().mutators.is_empty());
    }
}
