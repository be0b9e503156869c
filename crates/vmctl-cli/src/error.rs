//! CLI error types.

use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provisioning or validation failed.
    #[error(transparent)]
    Pki(#[from] vmctl_pki::Error),
    /// Invalid arguments or registry.
    #[error("configuration error: {0}")]
    Config(String),
    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pki_errors_display_unchanged() {
        let err = CliError::from(vmctl_pki::Error::configuration("server", "unknown CA 'x'"));
        assert_eq!(err.to_string(), "configuration error for 'server': unknown CA 'x'");
    }

    #[test]
    fn cli_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        assert!(matches!(CliError::from(io_err), CliError::Io(_)));
    }
}
