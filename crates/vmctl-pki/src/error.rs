//! PKI error types.
//!
//! Every variant names the certificate (registry `Name`) that triggered it, so a
//! failed provisioning run reports exactly one error pointing at one artifact.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for PKI operations.
pub type Result<T> = std::result::Result<T, Error>;

/// PKI error variants.
#[derive(Debug, Error)]
pub enum Error {
    /// A config mutator failed, or a spec references an unknown CA.
    #[error("configuration error for '{name}': {reason}")]
    Configuration {
        /// Certificate name.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// A certificate expected to be a CA is not usable as one.
    #[error("CA validation failed for '{name}': {reason}")]
    CaValidation {
        /// CA name.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// A leaf's signature does not verify against its CA's current certificate.
    #[error("chain validation failed for '{name}': {reason}")]
    ChainValidation {
        /// Leaf name.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// A leaf's SAN set does not cover what its resolved config requires.
    #[error("SAN validation failed for '{name}': {reason}")]
    SanValidation {
        /// Leaf name.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// The CA key is gone and a dependent leaf cannot be used or reissued.
    #[error("inconsistent state for '{name}': {reason}")]
    InconsistentState {
        /// Leaf name.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// Reading, parsing or writing stored material failed.
    #[error("I/O error for '{name}' at {}: {reason}", path.display())]
    Io {
        /// Certificate name (the base file name until re-tagged).
        name: String,
        /// File involved.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Key or certificate generation failed.
    #[error("certificate generation failed for '{name}': {reason}")]
    Generation {
        /// Certificate name.
        name: String,
        /// What went wrong.
        reason: String,
    },
}

/// Discriminant of [`Error`], for callers that branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::Configuration`].
    Configuration,
    /// See [`Error::CaValidation`].
    CaValidation,
    /// See [`Error::ChainValidation`].
    ChainValidation,
    /// See [`Error::SanValidation`].
    SanValidation,
    /// See [`Error::InconsistentState`].
    InconsistentState,
    /// See [`Error::Io`].
    Io,
    /// See [`Error::Generation`].
    Generation,
}

impl Error {
    /// Builds a configuration error.
    pub fn configuration(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Builds a generation error.
    pub fn generation(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Generation {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns the name of the certificate this error is about.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Configuration { name, .. }
            | Self::CaValidation { name, .. }
            | Self::ChainValidation { name, .. }
            | Self::SanValidation { name, .. }
            | Self::InconsistentState { name, .. }
            | Self::Io { name, .. }
            | Self::Generation { name, .. } => name,
        }
    }

    /// Returns the failure class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::CaValidation { .. } => ErrorKind::CaValidation,
            Self::ChainValidation { .. } => ErrorKind::ChainValidation,
            Self::SanValidation { .. } => ErrorKind::SanValidation,
            Self::InconsistentState { .. } => ErrorKind::InconsistentState,
            Self::Io { .. } => ErrorKind::Io,
            Self::Generation { .. } => ErrorKind::Generation,
        }
    }

    /// Re-tags the error with a registry name.
    ///
    /// The store only knows base file names; callers holding the spec replace
    /// that with the certificate's `Name`.
    #[must_use]
    pub fn for_certificate(self, cert_name: &str) -> Self {
        match self {
            Self::Io { path, reason, .. } => Self::Io {
                name: cert_name.to_string(),
                path,
                reason,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_name() {
        let err = Error::SanValidation {
            name: "server".into(),
            reason: "missing DNS name 'host-a'".into(),
        };
        assert_eq!(
            err.to_string(),
            "SAN validation failed for 'server': missing DNS name 'host-a'"
        );
    }

    #[test]
    fn io_display_includes_path() {
        let err = Error::Io {
            name: "ca".into(),
            path: PathBuf::from("/tmp/pki/ca-cert.pem"),
            reason: "permission denied".into(),
        };
        assert!(err.to_string().contains("/tmp/pki/ca-cert.pem"));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn for_certificate_retags_io_only() {
        let io = Error::Io {
            name: "agent-base".into(),
            path: PathBuf::from("agent-base-key.pem"),
            reason: "truncated".into(),
        }
        .for_certificate("agent");
        assert_eq!(io.name(), "agent");

        let chain = Error::ChainValidation {
            name: "server".into(),
            reason: "bad signature".into(),
        }
        .for_certificate("other");
        assert_eq!(chain.name(), "server");
    }
}
