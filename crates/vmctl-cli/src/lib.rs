//! # vmctl-cli
//!
//! Command-line front end for vmctl certificate provisioning.
//!
//! Provides commands for:
//! - Provisioning the CA/server/client tree into a directory
//! - Inspecting what is currently stored there
//! - Exporting the stored set and importing it into another directory
//!
//! The certificate set comes from a TOML registry file, or defaults to the
//! standard mutual-TLS set built by [`vmctl_pki::CertificateMap::standard_mtls`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format, ImportArgs, PathFormatArg, RegistryArgs};
pub use error::CliError;
pub use output::OutputFormat;
