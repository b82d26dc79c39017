// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

//! Per-connection authentication state shared by the initiator and acceptor halves.

use std::fmt;
use std::time::Instant;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::hash::SessionKey;
use crate::types::{
    Algorithm, Charset, Cipher, DigestError, DigestResult, Flavor, Qop, Role, DEFAULT_MAXBUF,
};

/// Position of a context in the multi-call exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextState {
    /// Created by a probe call, nothing exchanged yet.
    Empty,
    /// Acceptor sent a challenge and waits for the response.
    ChallengeIssued,
    /// Initiator sent a response and waits for `rspauth`.
    ChallengeSent,
    /// Credential or `rspauth` verification in progress.
    Verifying,
    /// Session key cached; further messages re-verify against it.
    Established,
    /// Torn down.
    Closed,
}

impl ContextState {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextState::Empty => "empty",
            ContextState::ChallengeIssued => "challenge-issued",
            ContextState::ChallengeSent => "challenge-sent",
            ContextState::Verifying => "verifying",
            ContextState::Established => "established",
            ContextState::Closed => "closed",
        }
    }

    fn may_advance_to(self, next: ContextState) -> bool {
        use ContextState::*;
        matches!(
            (self, next),
            (_, Closed)
                | (Empty, ChallengeIssued)
                | (Empty, ChallengeSent)
                | (Empty, Established)
                | (ChallengeIssued, ChallengeIssued)
                | (ChallengeIssued, Verifying)
                | (ChallengeSent, Verifying)
                | (Verifying, Established)
                | (Established, Established)
        ) && self != Closed
    }
}

/// Outcome of a successful protocol step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityStatus {
    /// The exchange is complete on this side.
    Ok,
    /// The peer must answer the produced message before the exchange completes.
    ContinueNeeded,
}

/// Context attribute flags requested by the caller and granted by negotiation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ContextAttributes {
    pub mutual_auth: bool,
    pub integrity: bool,
    pub confidentiality: bool,
    /// Principal verified by another domain through passthrough.
    pub forwarded: bool,
}

/// Long-lived state of one authenticated connection.
///
/// The session key is set exactly once; later messages reuse it. The
/// nonce-count only ever moves forward.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecurityContext {
    #[zeroize(skip)]
    role: Role,
    #[zeroize(skip)]
    flavor: Flavor,
    #[zeroize(skip)]
    state: ContextState,
    pub nonce: String,
    pub cnonce: String,
    pub opaque: String,
    #[zeroize(skip)]
    pub algorithm: Algorithm,
    #[zeroize(skip)]
    pub qop: Option<Qop>,
    #[zeroize(skip)]
    pub cipher: Option<Cipher>,
    #[zeroize(skip)]
    pub charset: Charset,
    pub maxbuf: u32,
    session_key: Option<SessionKey>,
    nonce_count: u32,
    pub expected_rspauth: Option<String>,
    pub principal: String,
    pub realm: String,
    pub domain: String,
    pub authzid: Option<String>,
    pub uri: String,
    pub method: String,
    #[zeroize(skip)]
    pub attributes: ContextAttributes,
    /// QOPs the acceptor advertised in its challenge.
    #[zeroize(skip)]
    pub offered_qops: Vec<Qop>,
    /// Ciphers the acceptor advertised alongside `auth-conf`.
    #[zeroize(skip)]
    pub offered_ciphers: Vec<Cipher>,
    pub authorization_data: Vec<u8>,
    #[zeroize(skip)]
    expires_at: Option<Instant>,
}

impl SecurityContext {
    pub fn new(role: Role, flavor: Flavor) -> Self {
        Self {
            role,
            flavor,
            state: ContextState::Empty,
            nonce: String::new(),
            cnonce: String::new(),
            opaque: String::new(),
            algorithm: Algorithm::Md5,
            qop: None,
            cipher: None,
            charset: Charset::default(),
            maxbuf: DEFAULT_MAXBUF,
            session_key: None,
            nonce_count: 0,
            expected_rspauth: None,
            principal: String::new(),
            realm: String::new(),
            domain: String::new(),
            authzid: None,
            uri: String::new(),
            method: String::new(),
            attributes: ContextAttributes::default(),
            offered_qops: Vec::new(),
            offered_ciphers: Vec::new(),
            authorization_data: Vec::new(),
            expires_at: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state == ContextState::Established
    }

    /// Moves the context to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::Internal`] for a transition the state machine does
    /// not permit, such as leaving `Closed` or establishing without verification.
    pub fn advance(&mut self, next: ContextState) -> DigestResult<()> {
        if !self.state.may_advance_to(next) {
            tracing::debug!(from = self.state.as_str(), to = next.as_str(), "rejected context transition");
            return Err(DigestError::Internal);
        }
        self.state = next;
        Ok(())
    }

    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    /// Caches the session key.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::Internal`] if a key is already cached.
    pub fn set_session_key(&mut self, key: SessionKey) -> DigestResult<()> {
        if self.session_key.is_some() {
            return Err(DigestError::Internal);
        }
        self.session_key = Some(key);
        Ok(())
    }

    /// Highest nonce-count accepted or sent so far.
    pub fn nonce_count(&self) -> u32 {
        self.nonce_count
    }

    /// Checks that `nc` strictly exceeds the high-water mark without recording it.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::ReplayDetected`] if `nc` does not advance.
    pub fn check_nonce_count(&self, nc: u32) -> DigestResult<()> {
        if nc <= self.nonce_count {
            return Err(DigestError::ReplayDetected);
        }
        Ok(())
    }

    /// Records `nc` as the new high-water mark.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::ReplayDetected`] if `nc` does not advance.
    pub fn record_nonce_count(&mut self, nc: u32) -> DigestResult<()> {
        self.check_nonce_count(nc)?;
        self.nonce_count = nc;
        Ok(())
    }

    /// Next nonce-count for an outgoing message.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::Internal`] once the counter is exhausted.
    pub fn next_nonce_count(&self) -> DigestResult<u32> {
        self.nonce_count.checked_add(1).ok_or(DigestError::Internal)
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    pub fn set_expiry(&mut self, expires_at: Instant) {
        self.expires_at = Some(expires_at);
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Drops secret material and moves to `Closed`.
    pub fn close(&mut self) {
        self.zeroize();
        self.session_key = None;
        self.state = ContextState::Closed;
    }
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityContext")
            .field("role", &self.role)
            .field("flavor", &self.flavor)
            .field("state", &self.state)
            .field("algorithm", &self.algorithm)
            .field("qop", &self.qop)
            .field("cipher", &self.cipher)
            .field("charset", &self.charset)
            .field("nonce_count", &self.nonce_count)
            .field("principal", &self.principal)
            .field("realm", &self.realm)
            .field("session_key", &self.session_key.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}
