//! Resolution of a flat registry into a one-level CA → leaves tree.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::registry::CertificateMap;

/// CA names mapped to the names of the leaves they sign.
///
/// CAs and each CA's leaves are kept in name order, so walking the tree is
/// deterministic. A CA with no leaves still has an (empty) entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CertificateTree {
    entries: BTreeMap<String, Vec<String>>,
}

impl CertificateTree {
    /// Iterates `(ca, leaves)` pairs in CA name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(ca, leaves)| (ca.as_str(), leaves.as_slice()))
    }

    /// Returns the leaves signed by `ca`.
    #[must_use]
    pub fn leaves(&self, ca: &str) -> Option<&[String]> {
        self.entries.get(ca).map(Vec::as_slice)
    }

    /// Returns the CA names in walk order.
    pub fn authorities(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of CAs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the tree has no CA.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds the CA tree for `registry`.
///
/// No I/O happens here, so a registry that does not resolve never touches
/// the store.
///
/// # Errors
///
/// Returns [`Error::Configuration`] naming the leaf if its parent is missing
/// from the registry or is itself a leaf.
pub fn resolve(registry: &CertificateMap) -> Result<CertificateTree> {
    let mut entries: BTreeMap<String, Vec<String>> = registry
        .iter()
        .filter(|spec| spec.is_ca())
        .map(|spec| (spec.name.clone(), Vec::new()))
        .collect();

    for spec in registry.iter() {
        let Some(parent) = spec.parent_ca_name.as_deref() else {
            continue;
        };
        let Some(parent_spec) = registry.get(parent) else {
            return Err(Error::configuration(
                &spec.name,
                format!("unknown CA '{parent}'"),
            ));
        };
        if !parent_spec.is_ca() {
            return Err(Error::configuration(
                &spec.name,
                format!("'{parent}' is not a CA; only two-tier chains are supported"),
            ));
        }
        if let Some(leaves) = entries.get_mut(parent) {
            leaves.push(spec.name.clone());
        }
    }

    // Registry iteration is in name order already; keep it explicit.
    for leaves in entries.values_mut() {
        leaves.sort();
    }

    Ok(CertificateTree { entries })
}
