// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

use std::collections::HashMap;
use std::fmt;

use digest_core::context::SecurityStatus;
use digest_core::hash::{Secret, SessionKey};
use digest_core::types::{Algorithm, Cipher, DigestResult, Flavor, Qop, DEFAULT_MAXBUF};

/// What an acceptor offers and enforces for one flavor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptorPolicy {
    pub flavor: Flavor,
    pub realm: String,
    /// Authentication domain this acceptor belongs to.
    pub local_domain: String,
    /// Algorithm announced in HTTP challenges. SASL always uses `MD5-sess`.
    pub http_algorithm: Algorithm,
    pub qops: Vec<Qop>,
    pub ciphers: Vec<Cipher>,
    pub allow_utf8: bool,
    pub maxbuf: u32,
    /// Send `rspauth` to HTTP initiators. SASL acceptors always do.
    pub mutual_auth: bool,
}

impl AcceptorPolicy {
    pub fn new(flavor: Flavor, realm: &str) -> Self {
        let qops = match flavor {
            Flavor::Http => vec![Qop::Auth, Qop::AuthInt],
            Flavor::Sasl => vec![Qop::Auth, Qop::AuthInt, Qop::AuthConf],
        };
        Self {
            flavor,
            realm: realm.to_owned(),
            local_domain: String::from("LOCAL"),
            http_algorithm: Algorithm::Md5Sess,
            qops,
            ciphers: Cipher::PREFERENCE.to_vec(),
            allow_utf8: true,
            maxbuf: DEFAULT_MAXBUF,
            mutual_auth: false,
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

    pub fn with_qops(mut self, qops: &[Qop]) -> Self {
        self.qops = qops.to_vec();
        self
    }

    pub fn with_ciphers(mut self, ciphers: &[Cipher]) -> Self {
        self.ciphers = ciphers.to_vec();
        self
    }

    pub fn with_utf8(mut self, allow: bool) -> Self {
        self.allow_utf8 = allow;
        self
    }

    pub fn with_maxbuf(mut self, maxbuf: u32) -> Self {
        self.maxbuf = maxbuf;
        self
    }

    pub fn with_mutual_auth(mut self, enabled: bool) -> Self {
        self.mutual_auth = enabled;
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        match self.flavor {
            Flavor::Http => self.http_algorithm,
            Flavor::Sasl => Algorithm::Md5Sess,
        }
    }

    pub fn sends_rspauth(&self) -> bool {
        self.flavor == Flavor::Sasl || self.mutual_auth
    }
}

/// Secret material held for one local principal.
#[derive(Clone)]
pub struct PrincipalRecord {
    pub secret: Secret,
    pub authorization_data: Vec<u8>,
}

impl PrincipalRecord {
    pub fn new(secret: Secret) -> Self {
        Self {
            secret,
            authorization_data: Vec::new(),
        }
    }

    pub fn with_authorization_data(mut self, data: &[u8]) -> Self {
        self.authorization_data = data.to_vec();
        self
    }
}

impl fmt::Debug for PrincipalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrincipalRecord")
            .field("secret", &self.secret)
            .field("authorization_data_len", &self.authorization_data.len())
            .finish()
    }
}

/// External principal store of the local authentication domain.
pub trait PrincipalStore: Send + Sync {
    /// Record for `account` in `realm`, `Ok(None)` when the account is unknown.
    ///
    /// # Errors
    ///
    /// Store failures other than "not found".
    fn lookup(&self, account: &str, realm: &str) -> DigestResult<Option<PrincipalRecord>>;
}

/// In-memory [`PrincipalStore`] keyed by case-insensitive account name.
#[derive(Debug, Default, Clone)]
pub struct MemoryPrincipalStore {
    records: HashMap<String, PrincipalRecord>,
}

impl MemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, account: &str, record: PrincipalRecord) {
        self.records.insert(account.to_lowercase(), record);
    }

    pub fn with_principal(mut self, account: &str, record: PrincipalRecord) -> Self {
        self.insert(account, record);
        self
    }
}

impl PrincipalStore for MemoryPrincipalStore {
    fn lookup(&self, account: &str, _realm: &str) -> DigestResult<Option<PrincipalRecord>> {
        Ok(self.records.get(&account.to_lowercase()).cloned())
    }
}

/// Result of verifying one response, locally or in another domain.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub valid: bool,
    pub account: String,
    pub domain: String,
    /// Only meaningful when `valid`.
    pub authorization_data: Vec<u8>,
    pub session_key: Option<SessionKey>,
    pub forwarded: bool,
}

/// Message produced by an acceptor step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptorOutput {
    /// Challenge or `rspauth` text; empty when there is nothing to send.
    pub message: Vec<u8>,
    pub status: SecurityStatus,
}
