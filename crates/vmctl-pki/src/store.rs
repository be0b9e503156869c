//! Directory-backed certificate storage.
//!
//! The store maps a base file name to a certificate file and a key file using
//! two injected formatters. It does no locking: the directory is assumed to be
//! owned by the calling process while provisioning runs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::registry::{CertificateMap, REGISTRY_NAME};
use crate::types::{Certificate, PrivateKey};

/// PEM file contents keyed by file name relative to a store directory.
pub type PemBundle = BTreeMap<String, String>;

type FormatFn = dyn Fn(&str) -> String + Send + Sync;

/// Formats a base name into a file name inside the store directory.
#[derive(Clone)]
pub struct PathFormatter(Arc<FormatFn>);

impl PathFormatter {
    /// Wraps a formatting function.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(func))
    }

    /// Formats `base`.
    #[must_use]
    pub fn format(&self, base: &str) -> String {
        (self.0)(base)
    }
}

impl fmt::Debug for PathFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathFormatter")
            .field(&self.format("<name>"))
            .finish()
    }
}

/// The pair of formatters naming a certificate file and its key file.
#[derive(Debug, Clone)]
pub struct PathFormat {
    /// Certificate file formatter.
    pub cert: PathFormatter,
    /// Key file formatter.
    pub key: PathFormatter,
}

impl PathFormat {
    /// `<name>-cert.pem` / `<name>-key.pem`.
    #[must_use]
    pub fn pem() -> Self {
        Self {
            cert: PathFormatter::new(|base| format!("{base}-cert.pem")),
            key: PathFormatter::new(|base| format!("{base}-key.pem")),
        }
    }

    /// `<name>.crt` / `<name>.key`.
    #[must_use]
    pub fn crt() -> Self {
        Self {
            cert: PathFormatter::new(|base| format!("{base}.crt")),
            key: PathFormatter::new(|base| format!("{base}.key")),
        }
    }
}

impl Default for PathFormat {
    fn default() -> Self {
        Self::pem()
    }
}

/// Certificate and key pairs persisted as PEM files under one directory.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    dir: PathBuf,
    format: PathFormat,
}

impl CertificateStore {
    /// Creates a store using the default `-cert.pem` / `-key.pem` naming.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_format(dir, PathFormat::default())
    }

    /// Creates a store with explicit file naming.
    #[must_use]
    pub fn with_format(dir: impl Into<PathBuf>, format: PathFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the certificate path for `base`.
    #[must_use]
    pub fn cert_path(&self, base: &str) -> PathBuf {
        self.dir.join(self.format.cert.format(base))
    }

    /// Returns the key path for `base`.
    #[must_use]
    pub fn key_path(&self, base: &str) -> PathBuf {
        self.dir.join(self.format.key.format(base))
    }

    /// Returns true if either the certificate or the key file is present.
    #[must_use]
    pub fn exists(&self, base: &str) -> bool {
        self.cert_path(base).exists() || self.key_path(base).exists()
    }

    /// Returns true if the key file is present.
    #[must_use]
    pub fn key_exists(&self, base: &str) -> bool {
        self.key_path(base).exists()
    }

    /// Loads the certificate and key for `base`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if either file is unreadable or unparsable.
    pub fn load(&self, base: &str) -> Result<(Certificate, PrivateKey)> {
        let cert = self.load_cert_only(base)?;
        let key = self.load_key(base)?;
        Ok((cert, key))
    }

    /// Loads only the certificate for `base`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file is unreadable or unparsable.
    pub fn load_cert_only(&self, base: &str) -> Result<Certificate> {
        let path = self.cert_path(base);
        let bytes = read(base, &path)?;
        Certificate::from_pem(&bytes).map_err(|e| io_error(base, &path, e))
    }

    /// Loads only the key for `base`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file is unreadable or unparsable.
    pub fn load_key(&self, base: &str) -> Result<PrivateKey> {
        let path = self.key_path(base);
        let bytes = read(base, &path)?;
        PrivateKey::from_pem(&bytes).map_err(|e| io_error(base, &path, e))
    }

    /// Writes the key, then the certificate, for `base`.
    ///
    /// Both files are first staged next to their targets and only renamed
    /// into place once both are fully written, so a failure while writing
    /// leaves any previous pair untouched. The key file is created with
    /// mode 0600 on Unix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on any failure. The directory state is then
    /// unknown and callers should abort.
    pub fn write(&self, base: &str, cert: &Certificate, key: &PrivateKey) -> Result<()> {
        self.commit(base, cert, Some(key))
    }

    /// Collects the stored PEM files of every registry entry, keyed by file
    /// name relative to the store directory.
    ///
    /// Entries without a certificate file are skipped; a key is included
    /// only when its file is present. The result can be handed to
    /// [`CertificateStore::import`] on another host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`], named by registry name, if a present file
    /// cannot be read or parsed.
    pub fn export(&self, registry: &CertificateMap) -> Result<PemBundle> {
        let mut bundle = PemBundle::new();
        for spec in registry.iter() {
            let base = spec.base_file_name.as_str();
            if !self.cert_path(base).exists() {
                debug!(name = %spec.name, "no certificate to export");
                continue;
            }
            let cert = self
                .load_cert_only(base)
                .map_err(|e| e.for_certificate(&spec.name))?;
            bundle.insert(self.format.cert.format(base), cert.pem());

            if self.key_exists(base) {
                let key = self.load_key(base).map_err(|e| e.for_certificate(&spec.name))?;
                bundle.insert(self.format.key.format(base), key.pem());
            }
        }
        debug!(dir = %self.dir.display(), files = bundle.len(), "exported certificates");
        Ok(bundle)
    }

    /// Writes the certificates of an exported bundle into this store.
    ///
    /// The whole bundle is parsed and checked before anything is written:
    /// every file must belong to a registry entry, every certificate must
    /// parse, and a key must belong to its certificate. A certificate shipped
    /// without its key replaces any key file left at the destination.
    /// Returns the number of certificates written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for a malformed or inconsistent
    /// bundle, and [`Error::Io`] if writing fails.
    pub fn import(&self, registry: &CertificateMap, bundle: &PemBundle) -> Result<usize> {
        let mut known = BTreeSet::new();
        let mut staged = Vec::new();

        for spec in registry.iter() {
            let base = spec.base_file_name.as_str();
            let cert_file = self.format.cert.format(base);
            let key_file = self.format.key.format(base);

            let Some(cert_pem) = bundle.get(&cert_file) else {
                if bundle.contains_key(&key_file) {
                    return Err(Error::configuration(
                        &spec.name,
                        format!("'{key_file}' is shipped without '{cert_file}'"),
                    ));
                }
                known.extend([cert_file, key_file]);
                continue;
            };

            let cert = Certificate::from_pem(cert_pem.as_bytes()).map_err(|e| {
                Error::configuration(&spec.name, format!("invalid certificate '{cert_file}': {e}"))
            })?;
            let key = bundle
                .get(&key_file)
                .map(|pem| {
                    PrivateKey::from_pem(pem.as_bytes()).map_err(|e| {
                        Error::configuration(&spec.name, format!("invalid key '{key_file}': {e}"))
                    })
                })
                .transpose()?;
            if key.as_ref().is_some_and(|key| !key.matches(&cert)) {
                return Err(Error::configuration(
                    &spec.name,
                    format!("'{key_file}' does not belong to '{cert_file}'"),
                ));
            }

            known.extend([cert_file, key_file]);
            staged.push((spec, cert, key));
        }

        if let Some(unknown) = bundle.keys().find(|file| !known.contains(*file)) {
            return Err(Error::configuration(
                REGISTRY_NAME,
                format!("'{unknown}' does not belong to any registry entry"),
            ));
        }

        for (spec, cert, key) in &staged {
            let base = spec.base_file_name.as_str();
            self.commit(base, cert, key.as_ref())
                .map_err(|e| e.for_certificate(&spec.name))?;
            if key.is_none() {
                let key_path = self.key_path(base);
                match fs::remove_file(&key_path) {
                    Ok(()) => debug!(path = %key_path.display(), "removed stale key"),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(io_error(&spec.name, &key_path, e)),
                }
            }
        }

        info!(dir = %self.dir.display(), certificates = staged.len(), "imported certificates");
        Ok(staged.len())
    }

    /// Stages then renames the key (if any) and the certificate for `base`.
    fn commit(&self, base: &str, cert: &Certificate, key: Option<&PrivateKey>) -> Result<()> {
        let key_path = self.key_path(base);
        let cert_path = self.cert_path(base);
        for parent in [key_path.parent(), cert_path.parent()].into_iter().flatten() {
            fs::create_dir_all(parent).map_err(|e| io_error(base, parent, e))?;
        }

        let key_tmp = staging_path(&key_path);
        let cert_tmp = staging_path(&cert_path);

        let staged = key
            .map_or(Ok(()), |key| write_staged(base, &key_tmp, key.pem().as_bytes(), true))
            .and_then(|()| write_staged(base, &cert_tmp, cert.pem().as_bytes(), false));
        if let Err(e) = staged {
            let _ = fs::remove_file(&key_tmp);
            let _ = fs::remove_file(&cert_tmp);
            return Err(e);
        }

        let key_renamed = key.map_or(Ok(()), |_| fs::rename(&key_tmp, &key_path));
        if let Err(e) = key_renamed {
            let _ = fs::remove_file(&key_tmp);
            let _ = fs::remove_file(&cert_tmp);
            return Err(io_error(base, &key_path, e));
        }
        if let Err(e) = fs::rename(&cert_tmp, &cert_path) {
            let _ = fs::remove_file(&cert_tmp);
            return Err(io_error(base, &cert_path, e));
        }

        info!(
            cert = %cert_path.display(),
            key = %key_path.display(),
            with_key = key.is_some(),
            subject = %cert.subject(),
            "wrote certificate"
        );
        Ok(())
    }
}

fn read(base: &str, path: &Path) -> Result<Vec<u8>> {
    debug!(path = %path.display(), "reading");
    fs::read(path).map_err(|e| io_error(base, path, e))
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

fn write_staged(base: &str, path: &Path, contents: &[u8], private: bool) -> Result<()> {
    // A leftover from an interrupted run would keep its old permissions.
    let _ = fs::remove_file(path);

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if private {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(path).map_err(|e| io_error(base, path, e))?;
    file.write_all(contents)
        .and_then(|()| file.sync_all())
        .map_err(|e| io_error(base, path, e))
}

fn io_error(base: &str, path: &Path, err: impl fmt::Display) -> Error {
    Error::Io {
        name: base.to_string(),
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
