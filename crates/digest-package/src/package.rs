// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use digest_agent::InitiatorRequest;
use digest_core::context::{ContextAttributes, ContextState, SecurityContext, SecurityStatus};
use digest_core::crypto;
use digest_core::directive::{self, Directive};
use digest_core::types::{
    Algorithm, Charset, Cipher, DigestError, DigestResult, Flavor, Qop, Role,
};
use digest_relay::{AcceptorPolicy, Forwarder, PrincipalStore};

use crate::config::PackageConfig;
use crate::credential::{Credential, CredentialHandle, CredentialTable};
use crate::table::{ContextHandle, ContextTable};
use crate::PackageError;

/// Result of one host call that produced or advanced a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutput {
    pub handle: ContextHandle,
    pub status: SecurityStatus,
    /// Bytes of the output buffer holding the message for the peer.
    pub written: usize,
}

/// Negotiated state of a context, without key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    pub handle: ContextHandle,
    pub role: Role,
    pub flavor: Flavor,
    pub state: ContextState,
    pub principal: String,
    pub realm: String,
    pub domain: String,
    pub authzid: Option<String>,
    pub algorithm: Algorithm,
    pub qop: Option<Qop>,
    pub cipher: Option<Cipher>,
    pub charset: Charset,
    pub maxbuf: u32,
    pub nonce_count: u32,
    pub attributes: ContextAttributes,
    pub expires_at: Option<Instant>,
}

impl ContextInfo {
    fn snapshot(handle: ContextHandle, ctx: &SecurityContext) -> Self {
        Self {
            handle,
            role: ctx.role(),
            flavor: ctx.flavor(),
            state: ctx.state(),
            principal: ctx.principal.clone(),
            realm: ctx.realm.clone(),
            domain: ctx.domain.clone(),
            authzid: ctx.authzid.clone(),
            algorithm: ctx.algorithm,
            qop: ctx.qop,
            cipher: ctx.cipher,
            charset: ctx.charset,
            maxbuf: ctx.maxbuf,
            nonce_count: ctx.nonce_count(),
            attributes: ctx.attributes,
            expires_at: ctx.expires_at(),
        }
    }
}

/// Point-in-time copy of the package counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub contexts_created: u64,
    pub contexts_deleted: u64,
    pub authentications_succeeded: u64,
    pub authentications_failed: u64,
    pub replays_rejected: u64,
    /// Every initiator or acceptor step that returned an error.
    pub steps_failed: u64,
    pub forwards_attempted: u64,
}

#[derive(Debug, Default)]
struct Counters {
    contexts_created: AtomicU64,
    contexts_deleted: AtomicU64,
    authentications_succeeded: AtomicU64,
    authentications_failed: AtomicU64,
    replays_rejected: AtomicU64,
    steps_failed: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self, error: DigestError) {
        Self::bump(&self.steps_failed);
        match error {
            DigestError::AuthenticationFailed | DigestError::NoAuthenticatingAuthority => {
                Self::bump(&self.authentications_failed)
            }
            DigestError::ReplayDetected => Self::bump(&self.replays_rejected),
            _ => {}
        }
    }
}

struct Step {
    status: SecurityStatus,
    message: Vec<u8>,
    /// The step checked a proof from the peer.
    verified: bool,
}

/// Maps a host call result to a status code: `0` complete, `1` continue
/// needed, negative for errors.
pub fn status_code(result: &DigestResult<StepOutput>) -> i32 {
    match result {
        Ok(StepOutput {
            status: SecurityStatus::Ok,
            ..
        }) => 0,
        Ok(StepOutput {
            status: SecurityStatus::ContinueNeeded,
            ..
        }) => 1,
        Err(e) => e.to_status_code(),
    }
}

/// Trust failures end a partial exchange; parse and negotiation failures
/// leave it for the caller to retry.
fn releases_context(error: DigestError) -> bool {
    matches!(
        error,
        DigestError::AuthenticationFailed | DigestError::NoAuthenticatingAuthority
    )
}

fn copy_out(message: &[u8], output: &mut [u8]) -> DigestResult<usize> {
    let required = message.len();
    let dst = output
        .get_mut(..required)
        .ok_or(DigestError::InsufficientBuffer { required })?;
    dst.copy_from_slice(message);
    Ok(required)
}

/// The host-facing Digest security package.
///
/// Owns the credential and context tables and drives both halves of the
/// exchange. Calls on different contexts may run concurrently from any thread;
/// calls on one context serialize on its lock.
///
/// Every step runs on a copy of the context that is committed only after the
/// message fits the caller's buffer, so [`DigestError::InsufficientBuffer`]
/// leaves both the table and the context as they were.
pub struct DigestPackage {
    config: PackageConfig,
    http_policy: AcceptorPolicy,
    sasl_policy: AcceptorPolicy,
    principals: Arc<dyn PrincipalStore>,
    forwarder: Option<Forwarder>,
    credentials: CredentialTable,
    contexts: ContextTable,
    counters: Counters,
}

impl DigestPackage {
    /// Creates a package over `principals`, the local domain's principal store.
    ///
    /// # Errors
    ///
    /// * [`PackageError::Config`] if `config` fails validation.
    /// * [`PackageError::Digest`] if the crypto backend cannot initialize.
    pub fn new(config: PackageConfig, principals: Arc<dyn PrincipalStore>) -> Result<Self, PackageError> {
        config.validate()?;
        crypto::init()?;
        tracing::info!(
            realm = %config.realm,
            domain = %config.local_domain,
            lifetime_secs = config.context_lifetime.as_secs(),
            "digest package initialized"
        );
        Ok(Self {
            http_policy: config.acceptor_policy(Flavor::Http),
            sasl_policy: config.acceptor_policy(Flavor::Sasl),
            contexts: ContextTable::new(config.context_lifetime),
            config,
            principals,
            forwarder: None,
            credentials: CredentialTable::new(),
            counters: Counters::default(),
        })
    }

    /// Enables cross-domain verification. The configured forward budget applies.
    pub fn with_forwarder(mut self, forwarder: Forwarder) -> Self {
        self.forwarder = Some(forwarder.with_budget(self.config.forward_budget));
        self
    }

    pub fn config(&self) -> &PackageConfig {
        &self.config
    }

    pub fn acquire_credential(&self, credential: Credential) -> CredentialHandle {
        self.credentials.acquire(credential)
    }

    /// # Errors
    ///
    /// Returns [`DigestError::InvalidHandle`] for an unknown or freed handle.
    pub fn free_credential(&self, handle: CredentialHandle) -> DigestResult<()> {
        self.credentials.release(handle)
    }

    /// Runs the next initiator step.
    ///
    /// * No context and no input: creates an empty context (the SASL probe)
    ///   and returns `ContinueNeeded` with nothing written.
    /// * A challenge: answers it on the given context, or on a new one.
    /// * Input on a context awaiting confirmation: checks the acceptor's `rspauth`.
    /// * No input on an established HTTP context: writes a follow-up response
    ///   for `request`.
    ///
    /// # Errors
    ///
    /// * [`DigestError::InvalidHandle`] for an unknown credential or context, a
    ///   credential that may not initiate, or an acceptor context.
    /// * [`DigestError::InsufficientBuffer`] if `output` cannot hold the message.
    /// * [`DigestError::Internal`] if the context cannot take this input now.
    /// * Any error of the underlying initiator step. An `rspauth` mismatch
    ///   removes the context.
    pub fn initiate_outbound(
        &self,
        credential: CredentialHandle,
        context: Option<ContextHandle>,
        request: &InitiatorRequest,
        input: Option<&[u8]>,
        output: &mut [u8],
    ) -> DigestResult<StepOutput> {
        let credential = self.credentials.lookup(credential)?;
        let identity = credential.outbound_identity().ok_or(DigestError::InvalidHandle)?;
        let input = input.filter(|m| !m.is_empty());

        let Some(handle) = context else {
            let mut draft = digest_agent::begin_context(request.flavor);
            let Some(challenge) = input else {
                let handle = self.insert(draft);
                return Ok(StepOutput {
                    handle,
                    status: SecurityStatus::ContinueNeeded,
                    written: 0,
                });
            };
            let step = digest_agent::generate_response(identity, request, challenge, &mut draft)
                .inspect_err(|&e| self.counters.record_failure(e))?;
            let written = copy_out(&step.message, output)?;
            let handle = self.insert(draft);
            return Ok(StepOutput {
                handle,
                status: step.status,
                written,
            });
        };

        self.continue_context(handle, Role::Initiator, output, |draft| {
            match (draft.state(), input) {
                (ContextState::Empty, Some(challenge)) => {
                    let out = digest_agent::generate_response(identity, request, challenge, draft)?;
                    Ok(Step {
                        status: out.status,
                        message: out.message,
                        verified: false,
                    })
                }
                (ContextState::ChallengeSent, Some(confirmation)) => {
                    let status = digest_agent::verify_response_auth(confirmation, draft)?;
                    Ok(Step {
                        status,
                        message: Vec::new(),
                        verified: true,
                    })
                }
                (ContextState::Established, Some(confirmation)) if draft.expected_rspauth.is_some() => {
                    let status = digest_agent::verify_response_auth(confirmation, draft)?;
                    Ok(Step {
                        status,
                        message: Vec::new(),
                        verified: true,
                    })
                }
                (ContextState::Established, None) => {
                    let out = digest_agent::generate_follow_up(request, draft)?;
                    Ok(Step {
                        status: out.status,
                        message: out.message,
                        verified: false,
                    })
                }
                _ => Err(DigestError::Internal),
            }
        })
    }

    /// Runs the next acceptor step.
    ///
    /// * No input: issues a challenge on a new context.
    /// * A response: verifies it on the context named by `context`. HTTP
    ///   responses may omit the handle; the context is then located by the
    ///   opaque the challenge carried, and if none is live a fresh challenge
    ///   with `stale=true` goes out on a new context.
    /// * A response on an established context: reconnect with a higher
    ///   nonce-count, checked against the cached session key.
    ///
    /// # Errors
    ///
    /// * [`DigestError::InvalidHandle`] for an unknown credential or context, a
    ///   credential that may not accept, an initiator context, or a SASL
    ///   response without a handle.
    /// * [`DigestError::MalformedMessage`] for an HTTP response without a
    ///   handle or a usable opaque.
    /// * [`DigestError::InsufficientBuffer`] if `output` cannot hold the message.
    /// * Any error of the underlying acceptor step. Authentication and trust
    ///   failures remove a context that was not yet established.
    pub fn accept_inbound(
        &self,
        credential: CredentialHandle,
        context: Option<ContextHandle>,
        flavor: Flavor,
        input: Option<&[u8]>,
        output: &mut [u8],
    ) -> DigestResult<StepOutput> {
        let credential = self.credentials.lookup(credential)?;
        if !credential.usage().allows_inbound() {
            return Err(DigestError::InvalidHandle);
        }
        let policy = self.policy(flavor);

        let Some(message) = input.filter(|m| !m.is_empty()) else {
            if context.is_some() {
                return Err(DigestError::Internal);
            }
            return self.challenge(policy, false, output);
        };

        let handle = match (context, flavor) {
            (Some(handle), _) => handle,
            (None, Flavor::Sasl) => return Err(DigestError::InvalidHandle),
            (None, Flavor::Http) => match self.locate_by_opaque(message)? {
                Some(handle) => handle,
                None => {
                    tracing::debug!("response names no live context, re-challenging as stale");
                    return self.challenge(policy, true, output);
                }
            },
        };

        self.continue_context(handle, Role::Acceptor, output, |draft| {
            let out = digest_relay::verify_response(
                policy,
                self.principals.as_ref(),
                self.forwarder.as_ref(),
                message,
                draft,
            )?;
            Ok(Step {
                status: out.status,
                message: out.message,
                verified: true,
            })
        })
    }

    /// Removes a context from the table.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::InvalidHandle`] if the handle is unknown, expired
    /// or already deleted.
    pub fn delete_context(&self, handle: ContextHandle) -> DigestResult<()> {
        self.contexts.remove(handle)?;
        Counters::bump(&self.counters.contexts_deleted);
        tracing::debug!(handle = handle.as_u64(), "context deleted");
        Ok(())
    }

    /// Control tokens are not part of Digest.
    ///
    /// # Errors
    ///
    /// [`DigestError::InvalidHandle`] for a dead handle, otherwise always
    /// [`DigestError::Unsupported`].
    pub fn apply_control_token(&self, handle: ContextHandle, token: &[u8]) -> DigestResult<()> {
        self.contexts.find(handle)?;
        tracing::debug!(handle = handle.as_u64(), len = token.len(), "control token rejected");
        Err(DigestError::Unsupported)
    }

    /// # Errors
    ///
    /// Returns [`DigestError::InvalidHandle`] for an unknown, expired or
    /// deleted handle.
    pub fn query_context(&self, handle: ContextHandle) -> DigestResult<ContextInfo> {
        let entry = self.contexts.find(handle)?;
        let ctx = entry.lock();
        Ok(ContextInfo::snapshot(handle, &ctx))
    }

    /// Removes expired contexts and returns how many went.
    pub fn sweep_expired(&self) -> usize {
        let swept = self.contexts.sweep_expired(Instant::now());
        if swept > 0 {
            self.counters
                .contexts_deleted
                .fetch_add(swept as u64, Ordering::Relaxed);
            tracing::debug!(swept, "expired contexts swept");
        }
        swept
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    pub fn statistics(&self) -> Statistics {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        Statistics {
            contexts_created: load(&self.counters.contexts_created),
            contexts_deleted: load(&self.counters.contexts_deleted),
            authentications_succeeded: load(&self.counters.authentications_succeeded),
            authentications_failed: load(&self.counters.authentications_failed),
            replays_rejected: load(&self.counters.replays_rejected),
            steps_failed: load(&self.counters.steps_failed),
            forwards_attempted: self.forwarder.as_ref().map_or(0, Forwarder::attempts),
        }
    }

    fn policy(&self, flavor: Flavor) -> &AcceptorPolicy {
        match flavor {
            Flavor::Http => &self.http_policy,
            Flavor::Sasl => &self.sasl_policy,
        }
    }

    fn insert(&self, ctx: SecurityContext) -> ContextHandle {
        let role = ctx.role();
        let flavor = ctx.flavor();
        let (handle, swept) = self.contexts.insert(ctx);
        Counters::bump(&self.counters.contexts_created);
        if swept > 0 {
            self.counters
                .contexts_deleted
                .fetch_add(swept as u64, Ordering::Relaxed);
            tracing::debug!(swept, "expired contexts reclaimed on insert");
        }
        tracing::debug!(
            handle = handle.as_u64(),
            role = ?role,
            flavor = flavor.as_str(),
            "context created"
        );
        handle
    }

    fn challenge(&self, policy: &AcceptorPolicy, stale: bool, output: &mut [u8]) -> DigestResult<StepOutput> {
        let mut draft = digest_relay::begin_context(policy.flavor);
        let out = digest_relay::issue_challenge(policy, &mut draft, stale)?;
        let written = copy_out(&out.message, output)?;
        let handle = self.insert(draft);
        Ok(StepOutput {
            handle,
            status: out.status,
            written,
        })
    }

    fn locate_by_opaque(&self, message: &[u8]) -> DigestResult<Option<ContextHandle>> {
        let params = directive::parse(message, &[Directive::Opaque])?;
        if params.count(Directive::Opaque) != 1 {
            return Err(DigestError::MalformedMessage);
        }
        let opaque = params.value(Directive::Opaque).ok_or(DigestError::MalformedMessage)?;
        let opaque = std::str::from_utf8(&opaque).map_err(|_| DigestError::MalformedMessage)?;
        Ok(self.contexts.find_by_opaque(opaque).map(|(handle, _)| handle))
    }

    fn continue_context<F>(
        &self,
        handle: ContextHandle,
        role: Role,
        output: &mut [u8],
        step: F,
    ) -> DigestResult<StepOutput>
    where
        F: FnOnce(&mut SecurityContext) -> DigestResult<Step>,
    {
        let entry = self.contexts.find(handle)?;
        let mut ctx = entry.lock();
        // Released by a failed step that held the lock before us.
        if ctx.role() != role || ctx.state() == ContextState::Closed {
            return Err(DigestError::InvalidHandle);
        }

        let mut draft = ctx.clone();
        let step = match step(&mut draft) {
            Ok(step) => step,
            Err(e) => {
                self.counters.record_failure(e);
                if releases_context(e) && !ctx.is_established() {
                    // Unlinked under the context lock so no concurrent step can
                    // commit in between. The table never locks a context.
                    ctx.close();
                    if self.contexts.remove(handle).is_ok() {
                        Counters::bump(&self.counters.contexts_deleted);
                        tracing::debug!(handle = handle.as_u64(), error = %e, "partial context released");
                    }
                }
                return Err(e);
            }
        };
        let written = copy_out(&step.message, output)?;

        let expires_at = self.contexts.deadline(Instant::now());
        if let Some(at) = expires_at {
            draft.set_expiry(at);
        }
        *ctx = draft;
        let established = ctx.is_established();
        drop(ctx);

        if step.verified && established {
            Counters::bump(&self.counters.authentications_succeeded);
        }
        // A concurrent delete may have unlinked the handle; the committed
        // context is then freed with `entry`.
        let _ = self.contexts.touch(handle, expires_at);
        Ok(StepOutput {
            handle,
            status: step.status,
            written,
        })
    }
}
