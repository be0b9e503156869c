//! Declarative certificate registry: what certificates to provision and who signs them.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{CertConfig, KeyUsage};

/// Organization marker carried by agent client certificates.
pub const HOST_ORGANIZATION: &str = "system:host";

/// Name carried by errors about the registry as a whole.
pub(crate) const REGISTRY_NAME: &str = "registry";

/// Longest validity a spec may request: one hundred years.
pub const MAX_VALIDITY_DAYS: u32 = 36_500;

type MutatorFn = dyn Fn(CertConfig) -> std::result::Result<CertConfig, String> + Send + Sync;

/// A named transformation applied to a [`CertConfig`] right before generation.
///
/// Mutators take a config by value and return the new one; they never touch
/// shared state. They inject values only known at provisioning time, such as
/// the runtime hostname.
#[derive(Clone)]
pub struct ConfigMutator {
    label: String,
    func: Arc<MutatorFn>,
}

impl ConfigMutator {
    /// Wraps a transformation function.
    pub fn new<F>(label: impl Into<String>, func: F) -> Self
    where
        F: Fn(CertConfig) -> std::result::Result<CertConfig, String> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            func: Arc::new(func),
        }
    }

    /// Returns the mutator's label, used in diagnostics.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Applies the transformation.
    ///
    /// # Errors
    ///
    /// Returns the mutator's own failure message.
    pub fn apply(&self, config: CertConfig) -> std::result::Result<CertConfig, String> {
        (self.func)(config)
    }
}

impl fmt::Debug for ConfigMutator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigMutator")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Mutator adding fixed DNS SANs.
pub fn add_dns_names<I, S>(names: I) -> ConfigMutator
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    ConfigMutator::new("add-dns-names", move |mut config| {
        for name in &names {
            config.alt_names.push_dns(name.clone());
        }
        Ok(config)
    })
}

/// Mutator adding fixed IP SANs.
pub fn add_ip_addresses(ips: impl IntoIterator<Item = IpAddr>) -> ConfigMutator {
    let ips: Vec<IpAddr> = ips.into_iter().collect();
    ConfigMutator::new("add-ip-addresses", move |mut config| {
        for ip in &ips {
            config.alt_names.push_ip(*ip);
        }
        Ok(config)
    })
}

/// Mutator adding this machine's hostname as a DNS SAN.
///
/// The hostname is read when the mutator runs, not when it is built.
pub fn add_hostname() -> ConfigMutator {
    ConfigMutator::new("add-hostname", |mut config| {
        let host = hostname::get().map_err(|e| format!("failed to read hostname: {e}"))?;
        let host = host
            .into_string()
            .map_err(|raw| format!("hostname is not valid UTF-8: {raw:?}"))?;
        if host.is_empty() {
            return Err("hostname is empty".to_string());
        }
        config.alt_names.push_dns(host);
        Ok(config)
    })
}

/// Declarative description of one certificate to produce.
#[derive(Debug, Clone)]
pub struct CertificateSpec {
    /// Unique key in the registry.
    pub name: String,
    /// Human-readable description for diagnostics.
    pub display_name: String,
    /// File stem the store derives the certificate and key paths from.
    pub base_file_name: String,
    /// Name of the CA that signs this certificate; `None` for a self-signed CA.
    pub parent_ca_name: Option<String>,
    /// Static subject, SAN and usage configuration.
    pub config: CertConfig,
    /// Transformations applied in order before generation.
    pub mutators: Vec<ConfigMutator>,
}

impl CertificateSpec {
    /// Starts a builder for a spec named `name`.
    ///
    /// Display name and base file name default to `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> CertificateSpecBuilder {
        let name = name.into();
        CertificateSpecBuilder {
            display_name: name.clone(),
            base_file_name: name.clone(),
            name,
            parent_ca_name: None,
            config: CertConfig::default(),
            mutators: Vec::new(),
        }
    }

    /// Returns true if this spec describes a self-signed CA.
    #[must_use]
    pub const fn is_ca(&self) -> bool {
        self.parent_ca_name.is_none()
    }

    /// Applies every mutator in order to a fresh copy of the static config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming this spec and the failing mutator.
    pub fn resolve_config(&self) -> Result<CertConfig> {
        self.mutators
            .iter()
            .try_fold(self.config.clone(), |config, mutator| {
                mutator.apply(config).map_err(|reason| {
                    Error::configuration(
                        &self.name,
                        format!("mutator '{}' failed: {reason}", mutator.label()),
                    )
                })
            })
    }
}

/// Builder for [`CertificateSpec`].
#[derive(Debug)]
pub struct CertificateSpecBuilder {
    name: String,
    display_name: String,
    base_file_name: String,
    parent_ca_name: Option<String>,
    config: CertConfig,
    mutators: Vec<ConfigMutator>,
}

impl CertificateSpecBuilder {
    /// Sets the display name.
    #[must_use]
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Sets the file stem.
    #[must_use]
    pub fn base_file_name(mut self, base: impl Into<String>) -> Self {
        self.base_file_name = base.into();
        self
    }

    /// Marks the certificate as signed by the CA named `ca`.
    ///
    /// An empty name keeps the spec a self-signed CA.
    #[must_use]
    pub fn signed_by(mut self, ca: impl Into<String>) -> Self {
        let ca = ca.into();
        self.parent_ca_name = if ca.is_empty() { None } else { Some(ca) };
        self
    }

    /// Sets the subject common name.
    #[must_use]
    pub fn common_name(mut self, cn: impl Into<String>) -> Self {
        self.config.common_name = cn.into();
        self
    }

    /// Adds a subject organization.
    #[must_use]
    pub fn organization(mut self, org: impl Into<String>) -> Self {
        self.config.organization.push(org.into());
        self
    }

    /// Adds a DNS SAN.
    #[must_use]
    pub fn dns(mut self, name: impl Into<String>) -> Self {
        self.config.alt_names.push_dns(name);
        self
    }

    /// Adds an IP SAN.
    #[must_use]
    pub fn ip(mut self, ip: IpAddr) -> Self {
        self.config.alt_names.push_ip(ip);
        self
    }

    /// Adds an extended key usage.
    #[must_use]
    pub fn usage(mut self, usage: KeyUsage) -> Self {
        if !self.config.usages.contains(&usage) {
            self.config.usages.push(usage);
        }
        self
    }

    /// Adds server authentication usage.
    #[must_use]
    pub fn server_auth(self) -> Self {
        self.usage(KeyUsage::ServerAuth)
    }

    /// Adds client authentication usage.
    #[must_use]
    pub fn client_auth(self) -> Self {
        self.usage(KeyUsage::ClientAuth)
    }

    /// Overrides the validity period in days.
    #[must_use]
    pub const fn validity_days(mut self, days: u32) -> Self {
        self.config.validity_days = Some(days);
        self
    }

    /// Appends a config mutator.
    #[must_use]
    pub fn mutator(mut self, mutator: ConfigMutator) -> Self {
        self.mutators.push(mutator);
        self
    }

    /// Builds the spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a required field is empty.
    pub fn build(self) -> Result<CertificateSpec> {
        if self.name.is_empty() {
            return Err(Error::configuration(REGISTRY_NAME, "certificate name cannot be empty"));
        }
        if self.base_file_name.is_empty() {
            return Err(Error::configuration(&self.name, "base file name cannot be empty"));
        }
        if self.config.common_name.is_empty() {
            return Err(Error::configuration(&self.name, "common name cannot be empty"));
        }
        match self.config.validity_days {
            Some(0) => {
                return Err(Error::configuration(
                    &self.name,
                    "validity_days must be greater than 0",
                ));
            }
            Some(days) if days > MAX_VALIDITY_DAYS => {
                return Err(Error::configuration(
                    &self.name,
                    format!("validity_days must be at most {MAX_VALIDITY_DAYS}, got {days}"),
                ));
            }
            _ => {}
        }
        Ok(CertificateSpec {
            name: self.name,
            display_name: self.display_name,
            base_file_name: self.base_file_name,
            parent_ca_name: self.parent_ca_name,
            config: self.config,
            mutators: self.mutators,
        })
    }
}

/// Flat registry of certificate specs keyed by name.
#[derive(Debug, Clone, Default)]
pub struct CertificateMap {
    specs: BTreeMap<String, CertificateSpec>,
}

impl CertificateMap {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from specs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] on duplicate names.
    pub fn from_specs(specs: impl IntoIterator<Item = CertificateSpec>) -> Result<Self> {
        let mut map = Self::new();
        for spec in specs {
            map.insert(spec)?;
        }
        Ok(map)
    }

    /// The standard mTLS set: a root CA, a `serverAuth` server certificate and
    /// a `clientAuth` agent certificate carrying [`HOST_ORGANIZATION`].
    ///
    /// Certificates are named `ca`, `server` and `client`; their common names
    /// are `ca_common_name`, `<ca_common_name>-server` and
    /// `<ca_common_name>-client`. The server certificate lists its common name
    /// as a DNS SAN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `ca_common_name` is empty.
    pub fn standard_mtls(ca_common_name: &str) -> Result<Self> {
        let server_cn = format!("{ca_common_name}-server");
        let ca = CertificateSpec::builder("ca")
            .display_name("self-signed root CA")
            .common_name(ca_common_name)
            .build()?;
        let server = CertificateSpec::builder("server")
            .display_name("control-plane server certificate")
            .signed_by("ca")
            .common_name(&server_cn)
            .dns(&server_cn)
            .server_auth()
            .build()?;
        let client = CertificateSpec::builder("client")
            .display_name("agent client certificate")
            .signed_by("ca")
            .common_name(format!("{ca_common_name}-client"))
            .organization(HOST_ORGANIZATION)
            .client_auth()
            .build()?;
        Self::from_specs([ca, server, client])
    }

    /// Adds a spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the name is already registered.
    pub fn insert(&mut self, spec: CertificateSpec) -> Result<()> {
        if self.specs.contains_key(&spec.name) {
            return Err(Error::configuration(
                &spec.name,
                "duplicate certificate name in registry",
            ));
        }
        self.specs.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Looks up a spec by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CertificateSpec> {
        self.specs.get(name)
    }

    /// Returns a mutable spec, e.g. to attach a mutator after loading.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut CertificateSpec> {
        self.specs.get_mut(name)
    }

    /// Iterates specs in name order.
    pub fn iter(&self) -> impl Iterator<Item = &CertificateSpec> {
        self.specs.values()
    }

    /// Number of specs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns true if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
