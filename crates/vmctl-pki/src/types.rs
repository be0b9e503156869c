//! Core PKI types: certificate material and certificate configuration.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use x509_parser::prelude::*;
use zeroize::{Zeroize, ZeroizeOnDrop};

const CERTIFICATE_LABEL: &str = "CERTIFICATE";
const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

/// Failure to decode stored certificate or key material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParseError(String);

impl ParseError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Extended key usage purposes for certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyUsage {
    /// TLS server authentication.
    ServerAuth,
    /// TLS client authentication.
    ClientAuth,
}

impl KeyUsage {
    /// Returns the OID string for this key usage.
    #[must_use]
    pub const fn oid(&self) -> &'static str {
        match self {
            Self::ServerAuth => "1.3.6.1.5.5.7.3.1",
            Self::ClientAuth => "1.3.6.1.5.5.7.3.2",
        }
    }
}

impl std::fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServerAuth => f.write_str("serverAuth"),
            Self::ClientAuth => f.write_str("clientAuth"),
        }
    }
}

/// Subject Alternative Name entries carried by a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectAltName {
    /// DNS name.
    Dns(String),
    /// IP address.
    Ip(IpAddr),
}

/// DNS names and IP addresses a certificate must be valid for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AltNames {
    /// DNS names.
    #[serde(default)]
    pub dns_names: Vec<String>,
    /// IP addresses.
    #[serde(default)]
    pub ips: Vec<IpAddr>,
}

impl AltNames {
    /// Returns true if no names are required.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dns_names.is_empty() && self.ips.is_empty()
    }

    /// Adds a DNS name unless it is already present.
    pub fn push_dns(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.dns_names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            self.dns_names.push(name);
        }
    }

    /// Adds an IP address unless it is already present.
    pub fn push_ip(&mut self, ip: IpAddr) {
        if !self.ips.contains(&ip) {
            self.ips.push(ip);
        }
    }
}

/// Subject, SAN and usage fields of a certificate to generate.
///
/// A spec carries the static version of this; the resolved version is what
/// remains after every config mutator has run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertConfig {
    /// Subject common name.
    pub common_name: String,
    /// Subject organizations.
    #[serde(default)]
    pub organization: Vec<String>,
    /// Subject alternative names.
    #[serde(default)]
    pub alt_names: AltNames,
    /// Extended key usages.
    #[serde(default)]
    pub usages: Vec<KeyUsage>,
    /// Validity override in days. `None` uses the CA or leaf default.
    #[serde(default)]
    pub validity_days: Option<u32>,
}

/// A DER-encoded X.509 certificate with parsed metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    der: Vec<u8>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    subject: String,
    organization: Vec<String>,
    issuer: String,
    san: Vec<SubjectAltName>,
    is_ca: bool,
    usages: Vec<KeyUsage>,
    public_key: Vec<u8>,
}

impl Certificate {
    /// Parses a certificate from DER-encoded bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails.
    pub fn from_der(der: &[u8]) -> Result<Self, ParseError> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| ParseError::new(format!("failed to parse certificate: {e}")))?;

        let not_before = DateTime::from_timestamp(cert.validity().not_before.timestamp(), 0)
            .ok_or_else(|| ParseError::new("invalid not_before timestamp"))?;
        let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .ok_or_else(|| ParseError::new("invalid not_after timestamp"))?;

        let subject = extract_common_name(cert.subject())?;
        let issuer = extract_common_name(cert.issuer())?;
        let organization = cert
            .subject()
            .iter_organization()
            .filter_map(|attr| attr.as_str().ok().map(String::from))
            .collect();

        let is_ca = match cert.basic_constraints() {
            Ok(Some(ext)) => ext.value.ca,
            Ok(None) => false,
            Err(e) => return Err(ParseError::new(format!("invalid basic constraints: {e}"))),
        };

        Ok(Self {
            der: der.to_vec(),
            not_before,
            not_after,
            subject,
            organization,
            issuer,
            san: extract_san(&cert),
            is_ca,
            usages: extract_usages(&cert),
            public_key: cert.public_key().subject_public_key.data.to_vec(),
        })
    }

    /// Parses the first `CERTIFICATE` block of a PEM document.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM is malformed or holds something else.
    pub fn from_pem(pem: &[u8]) -> Result<Self, ParseError> {
        let der = decode_pem(pem, CERTIFICATE_LABEL)?;
        Self::from_der(&der)
    }

    /// Returns the DER-encoded certificate bytes.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the PEM-encoded certificate.
    #[must_use]
    pub fn pem(&self) -> String {
        encode_pem(CERTIFICATE_LABEL, &self.der)
    }

    /// Returns the certificate validity start time.
    #[must_use]
    pub const fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// Returns the certificate validity end time.
    #[must_use]
    pub const fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Returns the subject common name.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the subject organizations.
    #[must_use]
    pub fn organization(&self) -> &[String] {
        &self.organization
    }

    /// Returns the issuer common name.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the subject alternative names.
    #[must_use]
    pub fn san(&self) -> &[SubjectAltName] {
        &self.san
    }

    /// Returns true if the basic constraints mark this certificate as a CA.
    #[must_use]
    pub const fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// Returns the extended key usages.
    #[must_use]
    pub fn usages(&self) -> &[KeyUsage] {
        &self.usages
    }

    /// Returns the raw subject public key bits.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }
}

/// Extracts the common name from an X.509 name.
fn extract_common_name(name: &X509Name) -> Result<String, ParseError> {
    for rdn in name.iter() {
        for attr in rdn.iter() {
            if attr.attr_type() == &x509_parser::oid_registry::OID_X509_COMMON_NAME {
                return attr
                    .as_str()
                    .map(String::from)
                    .map_err(|e| ParseError::new(format!("failed to parse CN: {e}")));
            }
        }
    }
    Err(ParseError::new("common name not found"))
}

/// Extracts DNS and IP SANs from a certificate.
fn extract_san(cert: &X509Certificate<'_>) -> Vec<SubjectAltName> {
    let mut sans = Vec::new();

    if let Ok(Some(san_ext)) = cert.subject_alternative_name() {
        for name in &san_ext.value.general_names {
            match name {
                GeneralName::DNSName(dns) => {
                    sans.push(SubjectAltName::Dns((*dns).to_string()));
                }
                GeneralName::IPAddress(ip_bytes) => {
                    if let Some(ip) = parse_ip_bytes(ip_bytes) {
                        sans.push(SubjectAltName::Ip(ip));
                    }
                }
                _ => {}
            }
        }
    }

    sans
}

fn extract_usages(cert: &X509Certificate<'_>) -> Vec<KeyUsage> {
    let mut usages = Vec::new();
    if let Ok(Some(eku)) = cert.extended_key_usage() {
        if eku.value.server_auth {
            usages.push(KeyUsage::ServerAuth);
        }
        if eku.value.client_auth {
            usages.push(KeyUsage::ClientAuth);
        }
    }
    usages
}

/// Parses IP address bytes into an `IpAddr`.
fn parse_ip_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(std::net::Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(std::net::Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

/// A PKCS#8 private key with secure memory handling.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey {
    der: Vec<u8>,
}

impl PrivateKey {
    /// Creates a new private key from PKCS#8 DER bytes.
    #[must_use]
    pub const fn new(der: Vec<u8>) -> Self {
        Self { der }
    }

    /// Parses a `PRIVATE KEY` PEM block and checks that it is a usable signing key.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM is malformed or the key is not supported.
    pub fn from_pem(pem: &[u8]) -> Result<Self, ParseError> {
        let key = Self::new(decode_pem(pem, PRIVATE_KEY_LABEL)?);
        key.to_key_pair()?;
        Ok(key)
    }

    /// Returns the DER-encoded private key bytes.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the PEM-encoded private key.
    #[must_use]
    pub fn pem(&self) -> String {
        encode_pem(PRIVATE_KEY_LABEL, &self.der)
    }

    /// Converts into a signing key pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the key algorithm is not supported.
    pub fn to_key_pair(&self) -> Result<rcgen::KeyPair, ParseError> {
        rcgen::KeyPair::try_from(self.der.as_slice())
            .map_err(|e| ParseError::new(format!("failed to parse private key: {e}")))
    }

    /// Returns true if this key is the private half of `cert`'s public key.
    #[must_use]
    pub fn matches(&self, cert: &Certificate) -> bool {
        self.to_key_pair()
            .is_ok_and(|pair| pair.public_key_raw() == cert.public_key())
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("der", &"[REDACTED]")
            .finish()
    }
}

impl Clone for PrivateKey {
    fn clone(&self) -> Self {
        Self {
            der: self.der.clone(),
        }
    }
}

fn encode_pem(label: &str, der: &[u8]) -> String {
    use base64::Engine;
    let b64 = base64::engine::general_purpose::STANDARD.encode(der);
    format!(
        "-----BEGIN {label}-----\n{}\n-----END {label}-----\n",
        b64.as_bytes()
            .chunks(64)
            .map(|chunk| std::str::from_utf8(chunk).unwrap_or(""))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

fn decode_pem(pem: &[u8], label: &str) -> Result<Vec<u8>, ParseError> {
    let (_, block) = x509_parser::pem::parse_x509_pem(pem)
        .map_err(|e| ParseError::new(format!("invalid PEM: {e:?}")))?;
    if block.label != label {
        return Err(ParseError::new(format!(
            "expected PEM block '{label}', found '{}'",
            block.label
        )));
    }
    Ok(block.contents)
}
