// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

use std::time::Duration;

use digest_core::types::{Algorithm, Cipher, Flavor, Qop, DEFAULT_MAXBUF, MAX_MAXBUF};
use digest_relay::passthrough::DEFAULT_FORWARD_BUDGET;
use digest_relay::AcceptorPolicy;
use thiserror::Error;

/// Default lifetime of partial and established contexts.
pub const DEFAULT_CONTEXT_LIFETIME: Duration = Duration::from_secs(600);

/// Rejected [`PackageConfig`] values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("realm must not be empty")]
    EmptyRealm,
    #[error("local domain must not be empty")]
    EmptyLocalDomain,
    #[error("no {0} quality of protection configured")]
    NoQops(&'static str),
    #[error("auth-conf offered without any cipher")]
    NoCiphers,
    #[error("maxbuf {0} outside 1..=16777215")]
    MaxbufOutOfRange(u32),
    #[error("context lifetime must be non-zero")]
    ZeroLifetime,
}

/// Package-wide settings. Acceptor policies are derived from it per flavor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageConfig {
    pub realm: String,
    pub local_domain: String,
    pub http_algorithm: Algorithm,
    pub http_qops: Vec<Qop>,
    pub sasl_qops: Vec<Qop>,
    pub sasl_ciphers: Vec<Cipher>,
    pub utf8_http: bool,
    pub utf8_sasl: bool,
    pub maxbuf: u32,
    pub context_lifetime: Duration,
    pub forward_budget: Duration,
    pub http_mutual_auth: bool,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            realm: String::from("localhost"),
            local_domain: String::from("LOCAL"),
            http_algorithm: Algorithm::Md5Sess,
            http_qops: vec![Qop::Auth, Qop::AuthInt],
            sasl_qops: vec![Qop::Auth, Qop::AuthInt, Qop::AuthConf],
            sasl_ciphers: Cipher::PREFERENCE.to_vec(),
            utf8_http: true,
            utf8_sasl: true,
            maxbuf: DEFAULT_MAXBUF,
            context_lifetime: DEFAULT_CONTEXT_LIFETIME,
            forward_budget: DEFAULT_FORWARD_BUDGET,
            http_mutual_auth: false,
        }
    }
}

impl PackageConfig {
    pub fn new(realm: &str) -> Self {
        Self {
            realm: realm.to_owned(),
            ..Self::default()
        }
    }

    pub fn with_local_domain(mut self, domain: &str) -> Self {
        self.local_domain = domain.to_owned();
        self
    }

    pub fn with_http_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.http_algorithm = algorithm;
        self
    }

    pub fn with_http_qops(mut self, qops: &[Qop]) -> Self {
        self.http_qops = qops.to_vec();
        self
    }

    pub fn with_sasl_qops(mut self, qops: &[Qop]) -> Self {
        self.sasl_qops = qops.to_vec();
        self
    }

    pub fn with_sasl_ciphers(mut self, ciphers: &[Cipher]) -> Self {
        self.sasl_ciphers = ciphers.to_vec();
        self
    }

    pub fn with_utf8(mut self, flavor: Flavor, allow: bool) -> Self {
        match flavor {
            Flavor::Http => self.utf8_http = allow,
            Flavor::Sasl => self.utf8_sasl = allow,
        }
        self
    }

    pub fn with_maxbuf(mut self, maxbuf: u32) -> Self {
        self.maxbuf = maxbuf;
        self
    }

    pub fn with_context_lifetime(mut self, lifetime: Duration) -> Self {
        self.context_lifetime = lifetime;
        self
    }

    pub fn with_forward_budget(mut self, budget: Duration) -> Self {
        self.forward_budget = budget;
        self
    }

    pub fn with_http_mutual_auth(mut self, enabled: bool) -> Self {
        self.http_mutual_auth = enabled;
        self
    }

    /// Checks the settings a package cannot run with.
    ///
    /// # Errors
    ///
    /// The first offending field as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.realm.is_empty() {
            return Err(ConfigError::EmptyRealm);
        }
        if self.local_domain.is_empty() {
            return Err(ConfigError::EmptyLocalDomain);
        }
        if self.http_qops.is_empty() {
            return Err(ConfigError::NoQops(Flavor::Http.as_str()));
        }
        if self.sasl_qops.is_empty() {
            return Err(ConfigError::NoQops(Flavor::Sasl.as_str()));
        }
        if self.sasl_qops.contains(&Qop::AuthConf) && self.sasl_ciphers.is_empty() {
            return Err(ConfigError::NoCiphers);
        }
        if self.maxbuf == 0 || self.maxbuf > MAX_MAXBUF {
            return Err(ConfigError::MaxbufOutOfRange(self.maxbuf));
        }
        if self.context_lifetime.is_zero() {
            return Err(ConfigError::ZeroLifetime);
        }
        Ok(())
    }

    /// Acceptor policy for `flavor` under these settings.
    pub fn acceptor_policy(&self, flavor: Flavor) -> AcceptorPolicy {
        let policy = AcceptorPolicy::new(flavor, &self.realm)
            .with_local_domain(&self.local_domain)
            .with_http_algorithm(self.http_algorithm)
            .with_maxbuf(self.maxbuf)
            .with_mutual_auth(self.http_mutual_auth);
        match flavor {
            Flavor::Http => policy.with_qops(&self.http_qops).with_utf8(self.utf8_http),
            Flavor::Sasl => policy
                .with_qops(&self.sasl_qops)
                .with_ciphers(&self.sasl_ciphers)
                .with_utf8(self.utf8_sasl),
        }
    }
}
