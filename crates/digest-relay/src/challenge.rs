// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

use digest_core::context::{ContextState, SecurityContext, SecurityStatus};
use digest_core::crypto;
use digest_core::directive::{Directive, DirectiveWriter};
use digest_core::types::{
    Charset, DigestError, DigestResult, Flavor, Qop, Role, DEFAULT_MAXBUF,
    MAX_SASL_CHALLENGE_LENGTH,
};

use crate::state::{AcceptorOutput, AcceptorPolicy};

/// Creates an acceptor context with nothing exchanged yet.
pub fn begin_context(flavor: Flavor) -> SecurityContext {
    SecurityContext::new(Role::Acceptor, flavor)
}

/// Issues a challenge with a fresh nonce, offering every QOP and cipher the
/// policy allows. HTTP challenges also carry a fresh opaque, which locates the
/// context when the response arrives, and `stale=true` when re-challenging
/// after a response for a context that no longer exists.
///
/// # Errors
///
/// Returns [`DigestError::Internal`] if the context is not an empty acceptor
/// context, the CSPRNG fails, or the challenge outgrows the SASL bound.
pub fn issue_challenge(
    policy: &AcceptorPolicy,
    ctx: &mut SecurityContext,
    stale: bool,
) -> DigestResult<AcceptorOutput> {
    let flavor = policy.flavor;
    if ctx.role() != Role::Acceptor || ctx.flavor() != flavor || ctx.state() != ContextState::Empty {
        return Err(DigestError::Internal);
    }
    if policy.qops.is_empty() {
        return Err(DigestError::Unsupported);
    }

    let nonce = crypto::random_token()?;
    let opaque = match flavor {
        Flavor::Http => crypto::random_token()?,
        Flavor::Sasl => String::new(),
    };
    let algorithm = policy.algorithm();
    let ciphers = if policy.qops.contains(&Qop::AuthConf) {
        policy.ciphers.clone()
    } else {
        Vec::new()
    };

    let mut w = DirectiveWriter::new();
    w.push(Directive::Realm, policy.realm.as_bytes())?;
    w.push(Directive::Nonce, nonce.as_bytes())?;
    w.push_list(Directive::Qop, policy.qops.iter().map(|q| q.as_str()))?;
    if flavor == Flavor::Sasl && policy.maxbuf != DEFAULT_MAXBUF {
        w.push_token(Directive::Maxbuf, policy.maxbuf.to_string().as_bytes())?;
    }
    if policy.allow_utf8 {
        w.push_token(Directive::Charset, Charset::Utf8.as_str().as_bytes())?;
    }
    w.push_token(Directive::Algorithm, algorithm.wire_str(flavor).as_bytes())?;
    if flavor == Flavor::Sasl && !ciphers.is_empty() {
        w.push_list(Directive::Cipher, ciphers.iter().map(|c| c.as_str()))?;
    }
    if flavor == Flavor::Http {
        w.push(Directive::Opaque, opaque.as_bytes())?;
        if stale {
            w.push_token(Directive::Stale, b"true")?;
        }
    }
    let message = w.finish()?;
    if flavor == Flavor::Sasl && message.len() > MAX_SASL_CHALLENGE_LENGTH {
        return Err(DigestError::Internal);
    }

    ctx.advance(ContextState::ChallengeIssued)?;
    ctx.nonce = nonce;
    ctx.opaque = opaque;
    ctx.algorithm = algorithm;
    ctx.realm = policy.realm.clone();
    ctx.maxbuf = policy.maxbuf;
    ctx.offered_qops = policy.qops.clone();
    ctx.offered_ciphers = ciphers;

    tracing::debug!(
        flavor = flavor.as_str(),
        algorithm = algorithm.as_str(),
        qops = policy.qops.len(),
        stale,
        "challenge issued"
    );

    Ok(AcceptorOutput {
        message,
        status: SecurityStatus::ContinueNeeded,
    })
}
