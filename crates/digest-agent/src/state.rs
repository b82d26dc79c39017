// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

use std::fmt;

use digest_core::context::ContextAttributes;
use digest_core::hash::Secret;
use digest_core::types::{Flavor, DEFAULT_MAXBUF};

/// Outbound credential: who the initiator claims to be and how it proves it.
#[derive(Clone)]
pub struct ClientIdentity {
    pub username: String,
    /// Realm to answer with; the challenge's first realm is used when `None`.
    pub realm: Option<String>,
    pub secret: Secret,
    /// SASL authorization identity, if different from `username`.
    pub authzid: Option<String>,
}

impl ClientIdentity {
    pub fn new(username: &str, secret: Secret) -> Self {
        Self {
            username: username.to_owned(),
            realm: None,
            secret,
            authzid: None,
        }
    }

    pub fn with_realm(mut self, realm: &str) -> Self {
        self.realm = Some(realm.to_owned());
        self
    }

    pub fn with_authzid(mut self, authzid: &str) -> Self {
        self.authzid = Some(authzid.to_owned());
        self
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("username", &self.username)
            .field("realm", &self.realm)
            .field("authzid", &self.authzid)
            .finish_non_exhaustive()
    }
}

/// Per-request inputs for an initiator step.
#[derive(Debug, Clone)]
pub struct InitiatorRequest {
    pub flavor: Flavor,
    /// Request URI (HTTP) or `digest-uri` such as `imap/host` (SASL).
    pub uri: String,
    /// HTTP method. SASL always hashes `AUTHENTICATE`.
    pub method: String,
    /// Entity body hashed into A2 for HTTP `auth-int`.
    pub entity_body: Option<Vec<u8>>,
    pub requirements: ContextAttributes,
    pub allow_utf8: bool,
    /// Receive buffer size advertised in a SASL response.
    pub maxbuf: u32,
    /// Fixed client nonce; a random one is drawn when `None`.
    pub cnonce: Option<String>,
}

impl InitiatorRequest {
    pub fn new(flavor: Flavor, uri: &str) -> Self {
        Self {
            flavor,
            uri: uri.to_owned(),
            method: String::from("GET"),
            entity_body: None,
            requirements: ContextAttributes::default(),
            allow_utf8: true,
            maxbuf: DEFAULT_MAXBUF,
            cnonce: None,
        }
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_owned();
        self
    }

    pub fn with_entity_body(mut self, body: &[u8]) -> Self {
        self.entity_body = Some(body.to_vec());
        self
    }

    pub fn with_requirements(mut self, requirements: ContextAttributes) -> Self {
        self.requirements = requirements;
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

    pub fn with_cnonce(mut self, cnonce: &str) -> Self {
        self.cnonce = Some(cnonce.to_owned());
        self
    }

    /// SASL always requires mutual authentication.
    pub fn wants_mutual_auth(&self) -> bool {
        self.flavor == Flavor::Sasl || self.requirements.mutual_auth
    }
}

/// Message produced by an initiator step and what the caller should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatorOutput {
    pub message: Vec<u8>,
    pub status: digest_core::context::SecurityStatus,
}
