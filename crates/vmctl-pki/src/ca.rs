//! Certificate Authority bootstrapping and signing.

use chrono::{DateTime, Duration, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, Ia5String, IsCa,
    KeyPair, KeyUsagePurpose, SanType,
};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::registry::CertificateSpec;
use crate::store::CertificateStore;
use crate::types::{CertConfig, Certificate, KeyUsage, PrivateKey};
use crate::validation::is_valid_now;

/// Default CA validity: ten years.
pub const DEFAULT_CA_VALIDITY_DAYS: u32 = 3650;

/// Default leaf validity: one year.
pub const DEFAULT_LEAF_VALIDITY_DAYS: u32 = 365;

/// A CA certificate and, when it could be loaded, its private key.
#[derive(Debug, Clone)]
pub struct CaMaterials {
    /// The CA certificate as currently on storage.
    pub certificate: Certificate,
    /// The CA key; `None` when the key file is missing or unreadable.
    pub key: Option<PrivateKey>,
}

/// A Certificate Authority able to sign leaf certificates.
pub struct CertificateAuthority {
    name: String,
    root_cert: Certificate,
    root_key: PrivateKey,
    key_pair: KeyPair,
}

impl CertificateAuthority {
    /// Generates a fresh key pair and a self-signed CA certificate.
    ///
    /// `name` is the registry name, used in errors and logs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Generation`] if key or certificate generation fails.
    pub fn generate(name: &str, config: &CertConfig) -> Result<Self> {
        info!(ca = %name, common_name = %config.common_name, "generating certificate authority");

        let key_pair = KeyPair::generate()
            .map_err(|e| Error::generation(name, format!("failed to generate key pair: {e}")))?;

        let mut params = CertificateParams::default();
        apply_subject(name, &mut params, config)?;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.subject_alt_names = convert_sans(name, config)?;
        apply_validity(
            name,
            &mut params,
            config.validity_days.unwrap_or(DEFAULT_CA_VALIDITY_DAYS),
        )?;

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| Error::generation(name, format!("failed to self-sign CA: {e}")))?;

        let root_cert = Certificate::from_der(cert.der()).map_err(|e| Error::generation(name, e))?;
        let root_key = PrivateKey::new(key_pair.serialize_der());

        debug!(ca = %name, "CA root certificate created");

        Ok(Self {
            name: name.to_string(),
            root_cert,
            root_key,
            key_pair,
        })
    }

    /// Wraps an existing CA certificate and key for signing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaValidation`] if the certificate is not a CA, the key
    /// cannot be used, or the key does not belong to the certificate.
    pub fn from_existing(name: &str, cert: Certificate, key: PrivateKey) -> Result<Self> {
        if !cert.is_ca() {
            return Err(ca_validation(name, "certificate is not marked as a CA"));
        }
        let key_pair = key
            .to_key_pair()
            .map_err(|e| ca_validation(name, e.to_string()))?;
        if key_pair.public_key_raw() != cert.public_key() {
            return Err(ca_validation(name, "private key does not match CA certificate"));
        }

        Ok(Self {
            name: name.to_string(),
            root_cert: cert,
            root_key: key,
            key_pair,
        })
    }

    /// Returns the CA certificate.
    #[must_use]
    pub const fn root_certificate(&self) -> &Certificate {
        &self.root_cert
    }

    /// Returns the CA private key.
    #[must_use]
    pub const fn root_key(&self) -> &PrivateKey {
        &self.root_key
    }

    /// Consumes the CA into its stored materials.
    #[must_use]
    pub fn into_materials(self) -> CaMaterials {
        CaMaterials {
            certificate: self.root_cert,
            key: Some(self.root_key),
        }
    }

    /// Issues a leaf certificate for `config` with a freshly generated key.
    ///
    /// `leaf_name` is the registry name of the leaf, used in errors and logs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Generation`] if generation or signing fails.
    pub fn issue(&self, leaf_name: &str, config: &CertConfig) -> Result<(Certificate, PrivateKey)> {
        info!(
            leaf = %leaf_name,
            ca = %self.name,
            common_name = %config.common_name,
            "issuing certificate"
        );

        let leaf_key = KeyPair::generate().map_err(|e| {
            Error::generation(leaf_name, format!("failed to generate key pair: {e}"))
        })?;

        let mut params = CertificateParams::default();
        apply_subject(leaf_name, &mut params, config)?;
        params.is_ca = IsCa::NoCa;
        params.extended_key_usages = config
            .usages
            .iter()
            .map(|usage| match usage {
                KeyUsage::ServerAuth => ExtendedKeyUsagePurpose::ServerAuth,
                KeyUsage::ClientAuth => ExtendedKeyUsagePurpose::ClientAuth,
            })
            .collect();
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.subject_alt_names = convert_sans(leaf_name, config)?;
        apply_validity(
            leaf_name,
            &mut params,
            config.validity_days.unwrap_or(DEFAULT_LEAF_VALIDITY_DAYS),
        )?;

        let issuer = self.issuer_cert()?;
        let cert = params
            .signed_by(&leaf_key, &issuer, &self.key_pair)
            .map_err(|e| Error::generation(leaf_name, format!("failed to sign certificate: {e}")))?;

        let certificate =
            Certificate::from_der(cert.der()).map_err(|e| Error::generation(leaf_name, e))?;
        let private_key = PrivateKey::new(leaf_key.serialize_der());

        debug!(leaf = %leaf_name, "certificate issued");

        Ok((certificate, private_key))
    }

    /// Rebuilds the CA as a signing issuer, keeping its full subject.
    fn issuer_cert(&self) -> Result<rcgen::Certificate> {
        let params = CertificateParams::from_ca_cert_pem(&self.root_cert.pem())
            .map_err(|e| Error::generation(&self.name, format!("failed to load CA params: {e}")))?;
        params
            .self_signed(&self.key_pair)
            .map_err(|e| Error::generation(&self.name, format!("failed to create issuer: {e}")))
    }
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("name", &self.name)
            .field("root_cert", &self.root_cert)
            .field("root_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Produces or reuses the self-signed CA described by `spec`.
///
/// When nothing is stored under the spec's base name, a new CA is generated
/// and persisted. Otherwise the stored certificate must be a CA; its key is
/// returned only if the key file loads, and a missing or unreadable key is
/// reported as `key: None` rather than as an error.
///
/// # Errors
///
/// - [`Error::Configuration`] if a mutator fails.
/// - [`Error::Io`] if the stored certificate cannot be read or writing fails.
/// - [`Error::CaValidation`] if the stored certificate is not a CA, or the
///   stored key belongs to a different certificate.
/// - [`Error::Generation`] if generation fails.
pub fn ensure_ca(spec: &CertificateSpec, store: &CertificateStore) -> Result<CaMaterials> {
    let config = spec.resolve_config()?;
    let base = spec.base_file_name.as_str();

    if !store.exists(base) {
        let ca = CertificateAuthority::generate(&spec.name, &config)?;
        store
            .write(base, ca.root_certificate(), ca.root_key())
            .map_err(|e| e.for_certificate(&spec.name))?;
        return Ok(ca.into_materials());
    }

    let certificate = store
        .load_cert_only(base)
        .map_err(|e| e.for_certificate(&spec.name))?;
    if !certificate.is_ca() {
        return Err(ca_validation(
            &spec.name,
            format!("certificate '{}' is not marked as a CA", certificate.subject()),
        ));
    }
    if !is_valid_now(&certificate) {
        warn!(
            ca = %spec.name,
            not_before = %certificate.not_before(),
            not_after = %certificate.not_after(),
            "CA certificate is outside its validity window"
        );
    }

    let key = if store.key_exists(base) {
        match store.load_key(base) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(ca = %spec.name, error = %e, "CA key is unreadable, treating as absent");
                None
            }
        }
    } else {
        None
    };

    if let Some(key) = &key {
        if !key.matches(&certificate) {
            return Err(ca_validation(
                &spec.name,
                "private key does not match CA certificate",
            ));
        }
    }

    debug!(ca = %spec.name, has_key = key.is_some(), "reusing existing CA");
    Ok(CaMaterials { certificate, key })
}

fn ca_validation(name: &str, reason: impl Into<String>) -> Error {
    Error::CaValidation {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn apply_subject(name: &str, params: &mut CertificateParams, config: &CertConfig) -> Result<()> {
    params
        .distinguished_name
        .push(DnType::CommonName, config.common_name.as_str());
    // rcgen keeps one value per attribute type.
    match config.organization.as_slice() {
        [] => {}
        [org] => params
            .distinguished_name
            .push(DnType::OrganizationName, org.as_str()),
        _ => {
            return Err(Error::configuration(
                name,
                "at most one subject organization is supported",
            ));
        }
    }
    Ok(())
}

fn apply_validity(name: &str, params: &mut CertificateParams, days: u32) -> Result<()> {
    let now = Utc::now();
    params.not_before = to_rcgen_time(name, now - Duration::hours(1))?;
    let not_after = Duration::try_days(i64::from(days))
        .and_then(|validity| now.checked_add_signed(validity))
        .ok_or_else(|| Error::configuration(name, "validity_days out of range"))?;
    params.not_after = to_rcgen_time(name, not_after)?;
    Ok(())
}

/// Converts the config's SANs to rcgen `SanType`s.
fn convert_sans(name: &str, config: &CertConfig) -> Result<Vec<SanType>> {
    let dns = config.alt_names.dns_names.iter().map(|dns| {
        Ia5String::try_from(dns.clone())
            .map(SanType::DnsName)
            .map_err(|e| Error::configuration(name, format!("invalid DNS name '{dns}': {e}")))
    });
    let ips = config
        .alt_names
        .ips
        .iter()
        .map(|ip| Ok(SanType::IpAddress(*ip)));
    dns.chain(ips).collect()
}

/// Converts a chrono `DateTime` to rcgen `OffsetDateTime`.
fn to_rcgen_time(name: &str, dt: DateTime<Utc>) -> Result<time::OffsetDateTime> {
    time::OffsetDateTime::from_unix_timestamp(dt.timestamp())
        .map_err(|e| Error::generation(name, format!("invalid timestamp: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubjectAltName;
    use crate::validation::verify_signature;
    use std::net::{IpAddr, Ipv4Addr};

    fn ca_config(cn: &str) -> CertConfig {
        CertConfig {
            common_name: cn.into(),
            ..CertConfig::default()
        }
    }

    fn ca_spec(name: &str) -> CertificateSpec {
        CertificateSpec::builder(name).common_name("myca").build().unwrap()
    }

    #[test]
    fn generated_ca_is_self_signed() {
        let ca = CertificateAuthority::generate("ca", &ca_config("Test CA")).unwrap();
        let cert = ca.root_certificate();
        assert_eq!(cert.subject(), "Test CA");
        assert_eq!(cert.issuer(), "Test CA");
        assert!(cert.is_ca());
        assert!(is_valid_now(cert));
        verify_signature(cert, cert).unwrap();
        assert!(ca.root_key().matches(cert));
    }

    #[test]
    fn ca_validity_defaults_to_ten_years() {
        let ca = CertificateAuthority::generate("ca", &ca_config("Test CA")).unwrap();
        let days = (ca.root_certificate().not_after() - Utc::now()).num_days();
        assert!((3649..=3650).contains(&days));
    }

    #[test]
    fn issue_leaf_with_sans_and_usage() {
        let ca = CertificateAuthority::generate("ca", &ca_config("Test CA")).unwrap();
        let mut config = CertConfig {
            common_name: "myca-server".into(),
            organization: vec!["vmctl".into()],
            usages: vec![KeyUsage::ServerAuth],
            validity_days: Some(30),
            ..CertConfig::default()
        };
        config.alt_names.push_dns("myca-server");
        config.alt_names.push_ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));

        let (cert, key) = ca.issue("server", &config).unwrap();

        assert_eq!(cert.subject(), "myca-server");
        assert_eq!(cert.issuer(), "Test CA");
        assert_eq!(cert.organization(), ["vmctl".to_string()]);
        assert!(!cert.is_ca());
        assert_eq!(cert.usages(), [KeyUsage::ServerAuth]);
        assert_eq!(
            cert.san(),
            [
                SubjectAltName::Dns("myca-server".into()),
                SubjectAltName::Ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))),
            ]
        );
        assert!(key.matches(&cert));
        verify_signature(&cert, ca.root_certificate()).unwrap();
        assert!((cert.not_after() - Utc::now()).num_hours() <= 30 * 24);
    }

    #[test]
    fn from_existing_signs_verifiable_leaves() {
        let original = CertificateAuthority::generate("ca", &ca_config("Persistent CA")).unwrap();
        let cert = original.root_certificate().clone();
        let key = original.root_key().clone();

        let reloaded = CertificateAuthority::from_existing("ca", cert, key).unwrap();
        let config = CertConfig {
            common_name: "agent".into(),
            usages: vec![KeyUsage::ClientAuth],
            ..CertConfig::default()
        };
        let (leaf, _) = reloaded.issue("client", &config).unwrap();
        verify_signature(&leaf, original.root_certificate()).unwrap();
        assert_eq!(leaf.issuer(), "Persistent CA");
    }

    #[test]
    fn from_existing_rejects_foreign_key() {
        let a = CertificateAuthority::generate("a", &ca_config("A")).unwrap();
        let b = CertificateAuthority::generate("b", &ca_config("B")).unwrap();
        let err = CertificateAuthority::from_existing(
            "a",
            a.root_certificate().clone(),
            b.root_key().clone(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::CaValidation { .. }));
    }

    #[test]
    fn oversized_validity_is_a_configuration_error() {
        let config = CertConfig {
            common_name: "x".into(),
            validity_days: Some(u32::MAX),
            ..CertConfig::default()
        };
        let err = CertificateAuthority::generate("ca", &config).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert_eq!(err.name(), "ca");

        let ca = CertificateAuthority::generate("ca", &ca_config("Test CA")).unwrap();
        let err = ca.issue("server", &CertConfig { validity_days: Some(4_000_000_000), ..config }).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert_eq!(err.name(), "server");
    }

    #[test]
    fn multiple_organizations_are_rejected() {
        let config = CertConfig {
            common_name: "x".into(),
            organization: vec!["a".into(), "b".into()],
            ..CertConfig::default()
        };
        let err = CertificateAuthority::generate("ca", &config).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn ensure_ca_generates_then_reuses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CertificateStore::new(dir.path());
        let spec = ca_spec("ca");

        let first = ensure_ca(&spec, &store).unwrap();
        assert!(first.key.is_some());
        assert!(store.exists("ca"));

        let second = ensure_ca(&spec, &store).unwrap();
        assert_eq!(second.certificate.der(), first.certificate.der());
        assert_eq!(
            second.key.as_ref().map(PrivateKey::der),
            first.key.as_ref().map(PrivateKey::der)
        );
    }

    #[test]
    fn ensure_ca_without_key_reports_no_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CertificateStore::new(dir.path());
        let spec = ca_spec("ca");
        let first = ensure_ca(&spec, &store).unwrap();

        std::fs::remove_file(store.key_path("ca")).unwrap();
        let again = ensure_ca(&spec, &store).unwrap();
        assert!(again.key.is_none());
        assert_eq!(again.certificate.der(), first.certificate.der());
    }

    #[test]
    fn ensure_ca_with_corrupt_key_reports_no_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CertificateStore::new(dir.path());
        let spec = ca_spec("ca");
        ensure_ca(&spec, &store).unwrap();

        std::fs::write(store.key_path("ca"), "not a key").unwrap();
        assert!(ensure_ca(&spec, &store).unwrap().key.is_none());
    }

    #[test]
    fn ensure_ca_rejects_non_ca_certificate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CertificateStore::new(dir.path());
        let ca = CertificateAuthority::generate("ca", &ca_config("Test CA")).unwrap();
        let (leaf, leaf_key) = ca
            .issue("ca", &CertConfig {
                common_name: "not-a-ca".into(),
                ..CertConfig::default()
            })
            .unwrap();
        store.write("ca", &leaf, &leaf_key).unwrap();

        let err = ensure_ca(&ca_spec("ca"), &store).unwrap_err();
        assert!(matches!(err, Error::CaValidation { .. }));
        assert_eq!(err.name(), "ca");
    }

    #[test]
    fn ensure_ca_rejects_mismatched_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CertificateStore::new(dir.path());
        ensure_ca(&ca_spec("ca"), &store).unwrap();

        let other = CertificateAuthority::generate("other", &ca_config("Other")).unwrap();
        std::fs::write(store.key_path("ca"), other.root_key().pem()).unwrap();

        let err = ensure_ca(&ca_spec("ca"), &store).unwrap_err();
        assert!(matches!(err, Error::CaValidation { .. }));
    }

    #[test]
    fn ensure_ca_unreadable_certificate_is_io_error_named_by_spec() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CertificateStore::new(dir.path());
        let spec = CertificateSpec::builder("root")
            .base_file_name("root-ca")
            .common_name("myca")
            .build()
            .unwrap();
        std::fs::write(store.cert_path("root-ca"), "junk").unwrap();

        let err = ensure_ca(&spec, &store).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.name(), "root");
    }

    #[test]
    fn ca_debug_redacts_key() {
        let ca = CertificateAuthority::generate("ca", &ca_config("Test CA")).unwrap();
        assert!(format!("{ca:?}").contains("REDACTED"));
    }
}
