//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use vmctl_pki::PathFormatKind;

/// vmctl certificate provisioning.
#[derive(Parser, Debug, Clone)]
#[command(name = "vmctl-certs")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table, global = true)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// On-disk file naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PathFormatArg {
    /// `<name>-cert.pem` / `<name>-key.pem`.
    Pem,
    /// `<name>.crt` / `<name>.key`.
    Crt,
}

impl From<PathFormatArg> for PathFormatKind {
    fn from(arg: PathFormatArg) -> Self {
        match arg {
            PathFormatArg::Pem => Self::Pem,
            PathFormatArg::Crt => Self::Crt,
        }
    }
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create or validate the certificate tree.
    ///
    /// Missing certificates are generated; existing ones are validated and
    /// kept. Safe to run repeatedly.
    Provision(RegistryArgs),

    /// Show what is stored for each certificate, without writing anything.
    Inspect(RegistryArgs),

    /// Print the stored certificates and keys as a JSON file-name to PEM map.
    Export(RegistryArgs),

    /// Write certificates from a map produced by `export`.
    ///
    /// The whole map is checked before any file is written.
    Import(ImportArgs),
}

/// Arguments for `import`.
#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// JSON file produced by `export`.
    #[arg(long, value_name = "FILE")]
    pub from: PathBuf,

    /// Destination registry and directory.
    #[command(flatten)]
    pub registry: RegistryArgs,
}

/// Where the certificates live and which ones to manage.
#[derive(Args, Debug, Clone)]
pub struct RegistryArgs {
    /// Certificate directory. Overrides the registry file's `directory`.
    #[arg(short, long, env = "VMCTL_PKI_DIR")]
    pub dir: Option<PathBuf>,

    /// TOML registry file. Without one, the standard CA/server/client set is used.
    #[arg(short, long, env = "VMCTL_PKI_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// CA common name for the standard set.
    #[arg(long, default_value = "vmctl-ca")]
    pub ca_name: String,

    /// Add this machine's hostname to every server certificate.
    #[arg(long)]
    pub hostname: bool,

    /// File naming. Overrides the registry file's `path_format`.
    #[arg(long, value_enum)]
    pub path_format: Option<PathFormatArg>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provision_defaults() {
        let cli = Cli::parse_from(["vmctl-certs", "provision", "--dir", "/etc/vmctl/pki"]);
        assert_eq!(cli.format, Format::Table);
        match cli.command {
            Commands::Provision(args) => {
                assert_eq!(args.dir, Some(PathBuf::from("/etc/vmctl/pki")));
                assert_eq!(args.ca_name, "vmctl-ca");
                assert!(!args.hostname);
                assert!(args.registry.is_none());
                assert!(args.path_format.is_none());
            }
            other => panic!("expected provision, got {other:?}"),
        }
    }

    #[test]
    fn parses_inspect_with_options() {
        let cli = Cli::parse_from([
            "vmctl-certs",
            "inspect",
            "-d",
            "/tmp/pki",
            "--path-format",
            "crt",
            "--format",
            "json",
        ]);
        assert_eq!(cli.format, Format::Json);
        match cli.command {
            Commands::Inspect(args) => {
                assert_eq!(args.path_format, Some(PathFormatArg::Crt));
                assert_eq!(PathFormatKind::from(PathFormatArg::Crt), PathFormatKind::Crt);
            }
            other => panic!("expected inspect, got {other:?}"),
        }
    }

    #[test]
    fn parses_import_source() {
        let cli = Cli::parse_from(["vmctl-certs", "import", "--from", "certs.json", "-d", "/tmp/pki"]);
        match cli.command {
            Commands::Import(args) => {
                assert_eq!(args.from, PathBuf::from("certs.json"));
                assert_eq!(args.registry.dir, Some(PathBuf::from("/tmp/pki")));
            }
            other => panic!("expected import, got {other:?}"),
        }
    }

    #[test]
    fn import_requires_source() {
        assert!(Cli::try_parse_from(["vmctl-certs", "import", "-d", "/tmp/pki"]).is_err());
    }

    #[test]
    fn rejects_unknown_path_format() {
        assert!(Cli::try_parse_from(["vmctl-certs", "provision", "--path-format", "der"]).is_err());
    }
}
