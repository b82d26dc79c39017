// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

//! Verification of principals that belong to another authentication domain.
//!
//! The acceptor serializes the response parameters into a passthrough blob and
//! hands it to the principal's authoritative domain, which answers through
//! [`serve_forwarded`]. Forwarding happens at most once per response; a
//! forwarded request is never forwarded again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use digest_core::blob::{
    self, PassthroughReply, PassthroughRequest, FLAG_FORWARDED, FLAG_LOCAL_LOOKUP_DONE,
};
use digest_core::hash;
use digest_core::types::{DigestError, DigestResult};

use crate::authentication::{split_qualified, verify_locally};
use crate::state::{PrincipalStore, VerificationOutcome};

/// Budget handed to the forwarding call when none is configured.
pub const DEFAULT_FORWARD_BUDGET: Duration = Duration::from_secs(5);

/// Failure of the external "verify in domain" call.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ForwardError {
    #[error("forwarding budget exhausted")]
    Timeout,
    #[error("authoritative domain unreachable")]
    Unreachable,
    #[error("authoritative domain rejected the request")]
    Rejected,
}

/// Domain and account a principal name resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    pub domain: String,
    pub account: String,
}

/// Discovers the domain of a principal given without a `DOMAIN\` qualifier.
pub trait NameResolver: Send + Sync {
    /// `Ok(None)` when the name is unknown to every domain.
    ///
    /// # Errors
    ///
    /// Resolver failures other than "not found".
    fn resolve(&self, principal: &str) -> DigestResult<Option<ResolvedName>>;
}

/// Trust relationships of the local domain.
pub trait TrustTopology: Send + Sync {
    fn is_within_forest(&self, domain: &str) -> bool;
}

/// Sends a passthrough blob to `domain` and returns its reply blob.
pub trait DomainForwarder: Send + Sync {
    /// # Errors
    ///
    /// [`ForwardError::Timeout`] once `budget` is spent, other variants for
    /// transport or remote failures.
    fn forward_verify(&self, domain: &str, blob: &[u8], budget: Duration) -> Result<Vec<u8>, ForwardError>;
}

/// On whose behalf the local domain is resolving principals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustContext {
    /// Server domain the resolution is performed for, when not the local one.
    pub on_behalf_of: Option<String>,
}

/// Strips identities a downstream domain may not assert.
pub trait AuthorizationFilter: Send + Sync {
    /// # Errors
    ///
    /// Any error rejects the authorization data and with it the principal.
    fn filter(&self, data: &[u8], trust: &TrustContext) -> DigestResult<Vec<u8>>;
}

/// Filter that trusts authorization data as returned.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughFilter;

impl AuthorizationFilter for PassThroughFilter {
    fn filter(&self, data: &[u8], _trust: &TrustContext) -> DigestResult<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Collaborators and limits for cross-domain verification.
pub struct Forwarder {
    local_domain: String,
    resolver: Arc<dyn NameResolver>,
    topology: Arc<dyn TrustTopology>,
    transport: Arc<dyn DomainForwarder>,
    filter: Arc<dyn AuthorizationFilter>,
    trust: TrustContext,
    budget: Duration,
    attempts: AtomicU64,
}

impl Forwarder {
    pub fn new(
        local_domain: &str,
        resolver: Arc<dyn NameResolver>,
        topology: Arc<dyn TrustTopology>,
        transport: Arc<dyn DomainForwarder>,
    ) -> Self {
        Self {
            local_domain: local_domain.to_owned(),
            resolver,
            topology,
            transport,
            filter: Arc::new(PassThroughFilter),
            trust: TrustContext::default(),
            budget: DEFAULT_FORWARD_BUDGET,
            attempts: AtomicU64::new(0),
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn AuthorizationFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_trust_context(mut self, trust: TrustContext) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn local_domain(&self) -> &str {
        &self.local_domain
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Number of forwarding calls made so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Verifies `request` in the principal's authoritative domain.
    ///
    /// `qualifier` is the domain named by a `DOMAIN\account` username; without
    /// one the domain of `account` is looked up through the [`NameResolver`].
    ///
    /// # Errors
    ///
    /// * [`DigestError::NoAuthenticatingAuthority`] if the domain lies outside
    ///   the trust forest. No call is made.
    /// * [`DigestError::Internal`] if the call ran out of budget. Nothing was
    ///   consumed, so the caller may retry.
    /// * [`DigestError::AuthenticationFailed`] for every other failure.
    pub fn resolve(
        &self,
        request: &PassthroughRequest,
        qualifier: Option<&str>,
        account: &str,
    ) -> DigestResult<VerificationOutcome> {
        let domain = match qualifier {
            Some(domain) => domain.to_owned(),
            None => match self.resolver.resolve(account)? {
                Some(resolved) => resolved.domain,
                None => {
                    tracing::debug!("principal unknown to the name resolver");
                    let _ = verify_locally(request, None);
                    return Err(DigestError::AuthenticationFailed);
                }
            },
        };

        if !self.topology.is_within_forest(&domain) {
            tracing::warn!(domain = %domain, "principal domain outside the trust forest");
            return Err(DigestError::NoAuthenticatingAuthority);
        }
        if domain.eq_ignore_ascii_case(&self.local_domain) {
            let _ = verify_locally(request, None);
            return Err(DigestError::AuthenticationFailed);
        }

        let mut forwarded = request.clone();
        forwarded.flags = (forwarded.flags | FLAG_FORWARDED) & !FLAG_LOCAL_LOOKUP_DONE;
        forwarded.domain = domain.as_bytes().to_vec();
        let request_blob = blob::encode_request(&forwarded)?;

        self.attempts.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(domain = %domain, budget_ms = self.budget.as_millis() as u64, "forwarding verification");
        let reply_blob = match self.transport.forward_verify(&domain, &request_blob, self.budget) {
            Ok(reply) => reply,
            Err(ForwardError::Timeout) => {
                tracing::warn!(domain = %domain, "forwarded verification timed out");
                return Err(DigestError::Internal);
            }
            Err(e) => {
                tracing::warn!(domain = %domain, error = %e, "forwarded verification failed");
                return Err(DigestError::AuthenticationFailed);
            }
        };

        let reply = blob::decode_reply(&reply_blob).map_err(|_| DigestError::AuthenticationFailed)?;
        if let Err(status) = reply.check_status() {
            tracing::debug!(domain = %domain, status = status.to_status_code(), "authoritative domain refused");
            return Err(DigestError::AuthenticationFailed);
        }
        if !reply.domain.eq_ignore_ascii_case(domain.as_bytes())
            || !reply.account.eq_ignore_ascii_case(account.as_bytes())
        {
            tracing::warn!(domain = %domain, "authoritative domain answered for a different principal");
            return Err(DigestError::AuthenticationFailed);
        }
        let authorization_data = if self.trust.on_behalf_of.is_some() {
            self.filter
                .filter(&reply.authorization_data, &self.trust)
                .map_err(|_| DigestError::AuthenticationFailed)?
        } else {
            reply.authorization_data.clone()
        };
        let account = String::from_utf8(reply.account).map_err(|_| DigestError::AuthenticationFailed)?;
        let reply_domain = String::from_utf8(reply.domain).map_err(|_| DigestError::AuthenticationFailed)?;

        Ok(VerificationOutcome {
            valid: true,
            account,
            domain: reply_domain,
            authorization_data,
            session_key: reply.session_key,
            forwarded: true,
        })
    }
}

impl fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forwarder")
            .field("local_domain", &self.local_domain)
            .field("trust", &self.trust)
            .field("budget", &self.budget)
            .field("attempts", &self.attempts())
            .finish_non_exhaustive()
    }
}

/// Authoritative-domain side of a forwarded verification.
///
/// Verifies against `store` only and encodes the answer as a reply blob.
/// Verification failures travel inside the reply.
///
/// # Errors
///
/// Returns [`DigestError::MalformedMessage`] if `request_blob` does not decode.
pub fn serve_forwarded(
    request_blob: &[u8],
    store: &dyn PrincipalStore,
    domain: &str,
) -> DigestResult<Vec<u8>> {
    let request = blob::decode_request(request_blob)?;
    let reply = match verify_forwarded(&request, store, domain) {
        Ok(reply) => reply,
        Err(e) => {
            tracing::debug!(status = e.to_status_code(), "forwarded verification refused");
            PassthroughReply::failure(e)
        }
    };
    blob::encode_reply(&reply)
}

fn verify_forwarded(
    request: &PassthroughRequest,
    store: &dyn PrincipalStore,
    domain: &str,
) -> DigestResult<PassthroughReply> {
    if request.flags & FLAG_FORWARDED == 0 {
        return Err(DigestError::MalformedMessage);
    }
    if !request.domain.eq_ignore_ascii_case(domain.as_bytes()) {
        return Err(DigestError::NoAuthenticatingAuthority);
    }
    let username = hash::decode_wire_text(&request.username, request.charset, request.flavor)?;
    let realm = hash::decode_wire_text(&request.realm, request.charset, request.flavor)?;
    let (_, account) = split_qualified(&username);

    let record = store.lookup(account, &realm)?;
    let key = verify_locally(request, record.as_ref().map(|r| &r.secret))?;
    let authorization_data = record.map(|r| r.authorization_data).unwrap_or_default();
    tracing::info!(domain, "forwarded principal verified");
    Ok(PassthroughReply::success(
        account.as_bytes().to_vec(),
        domain.as_bytes().to_vec(),
        key,
        authorization_data,
    ))
}
