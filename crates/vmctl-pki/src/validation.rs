//! Certificate validation utilities.

use std::net::IpAddr;

use chrono::Utc;
use tracing::debug;
use x509_parser::prelude::*;

use crate::types::{AltNames, Certificate, SubjectAltName};

/// Verifies that `cert` was signed by the key behind `issuer`.
///
/// Only the signature is checked; issuer names and validity are not.
///
/// # Errors
///
/// Returns a description of the failure if either certificate cannot be parsed
/// or the signature does not verify.
pub fn verify_signature(cert: &Certificate, issuer: &Certificate) -> Result<(), String> {
    let (_, parsed_cert) = X509Certificate::from_der(cert.der())
        .map_err(|e| format!("failed to parse certificate: {e}"))?;

    let (_, parsed_issuer) = X509Certificate::from_der(issuer.der())
        .map_err(|e| format!("failed to parse issuer certificate: {e}"))?;

    parsed_cert
        .verify_signature(Some(parsed_issuer.public_key()))
        .map_err(|e| {
            format!(
                "'{}' is not signed by '{}': {e:?}",
                cert.subject(),
                issuer.subject()
            )
        })?;

    debug!(subject = %cert.subject(), issuer = %issuer.subject(), "signature verified");
    Ok(())
}

/// Checks that every DNS name and IP in `required` is covered by `cert`'s SANs.
///
/// DNS names match case-insensitively; a SAN of the form `*.example.com`
/// covers exactly one extra left-most label. IPs must match exactly.
///
/// # Errors
///
/// Returns a description naming the first uncovered entry.
pub fn verify_hostnames(cert: &Certificate, required: &AltNames) -> Result<(), String> {
    for dns in &required.dns_names {
        let covered = cert.san().iter().any(|san| match san {
            SubjectAltName::Dns(pattern) => hostname_matches(pattern, dns),
            SubjectAltName::Ip(_) => false,
        });
        if !covered {
            return Err(format!(
                "certificate '{}' is not valid for DNS name '{dns}'",
                cert.subject()
            ));
        }
    }

    for ip in &required.ips {
        if !covers_ip(cert, *ip) {
            return Err(format!(
                "certificate '{}' is not valid for IP address '{ip}'",
                cert.subject()
            ));
        }
    }

    Ok(())
}

fn covers_ip(cert: &Certificate, ip: IpAddr) -> bool {
    cert.san()
        .iter()
        .any(|san| matches!(san, SubjectAltName::Ip(candidate) if *candidate == ip))
}

/// Matches a host name against a SAN DNS entry.
#[must_use]
pub fn hostname_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.');
    let host = host.trim_end_matches('.');

    if pattern.eq_ignore_ascii_case(host) {
        return true;
    }

    let Some(suffix) = pattern.strip_prefix("*.") else {
        return false;
    };
    match host.split_once('.') {
        Some((label, rest)) => !label.is_empty() && rest.eq_ignore_ascii_case(suffix),
        None => false,
    }
}

/// Checks if a certificate is expired.
#[must_use]
pub fn is_expired(cert: &Certificate) -> bool {
    cert.not_after() < Utc::now()
}

/// Checks if a certificate is not yet valid.
#[must_use]
pub fn is_not_yet_valid(cert: &Certificate) -> bool {
    cert.not_before() > Utc::now()
}

/// Checks if a certificate is currently valid (not expired and `not_before` has passed).
#[must_use]
pub fn is_valid_now(cert: &Certificate) -> bool {
    !is_expired(cert) && !is_not_yet_valid(cert)
}

/// Calculates the remaining validity period, or `None` if already expired.
#[must_use]
pub fn remaining_validity(cert: &Certificate) -> Option<chrono::Duration> {
    let now = Utc::now();
    if cert.not_after() > now {
        Some(cert.not_after() - now)
    } else {
        None
    }
}
