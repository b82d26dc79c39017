// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

use zeroize::Zeroize;

use digest_core::blob::{PassthroughRequest, FLAG_LOCAL_LOOKUP_DONE};
use digest_core::check::{
    allowed_directives, check_directives, parse_maxbuf, parse_nonce_count, uri_directive,
    CheckMode, MessageKind,
};
use digest_core::context::{ContextAttributes, ContextState, SecurityContext, SecurityStatus};
use digest_core::crypto;
use digest_core::directive::{self, Directive, DigestParameterSet, DirectiveWriter};
use digest_core::hash::{self, DigestInput, Secret, SessionKey, SessionKeyInput};
use digest_core::negotiate;
use digest_core::types::{
    constant_time_eq, Charset, DigestError, DigestResult, Flavor, Qop, Role,
    MAX_SASL_RESPONSE_LENGTH, MD5_HASH_LENGTH, SASL_METHOD,
};

use crate::passthrough::Forwarder;
use crate::state::{AcceptorOutput, AcceptorPolicy, PrincipalStore, VerificationOutcome};

/// Splits `DOMAIN\account` into its qualifier and account.
pub(crate) fn split_qualified(username: &str) -> (Option<&str>, &str) {
    match username.split_once('\\') {
        Some((domain, account)) if !domain.is_empty() => (Some(domain), account),
        _ => (None, username),
    }
}

fn digest_input<'a>(request: &'a PassthroughRequest, key: &'a SessionKey) -> DigestInput<'a> {
    DigestInput {
        session_key: key,
        nonce: &request.nonce,
        nc: &request.nc,
        cnonce: &request.cnonce,
        qop: request.qop,
        method: &request.method,
        uri: &request.uri,
        entity_hash: request.entity_hash.as_deref(),
    }
}

/// Derives the session key for `request` from `secret` and checks the
/// presented request-digest.
///
/// With no secret the digest is still computed against a random throwaway
/// one, so an unknown principal costs the same as a wrong password.
///
/// # Errors
///
/// Returns [`DigestError::AuthenticationFailed`] on mismatch or unknown principal.
pub(crate) fn verify_locally(
    request: &PassthroughRequest,
    secret: Option<&Secret>,
) -> DigestResult<SessionKey> {
    let throwaway;
    let (secret, known) = match secret {
        Some(secret) => (secret, true),
        None => {
            let mut bytes = [0u8; MD5_HASH_LENGTH];
            crypto::random_bytes(&mut bytes)?;
            throwaway = Secret::Precomputed(bytes);
            bytes.zeroize();
            (&throwaway, false)
        }
    };
    let key = hash::compute_session_key(&SessionKeyInput {
        flavor: request.flavor,
        algorithm: request.algorithm,
        charset: request.charset,
        username: &request.username,
        realm: &request.realm,
        secret,
        nonce: &request.nonce,
        cnonce: &request.cnonce,
        authzid: request.authzid.as_deref(),
    })?;
    let expected = hash::compute_request_digest(&digest_input(request, &key))?;
    if !hash::digest_matches(&expected, &request.response) || !known {
        return Err(DigestError::AuthenticationFailed);
    }
    Ok(key)
}

/// A checked response, ready for verification.
struct InboundResponse {
    request: PassthroughRequest,
    nc: Option<u32>,
    maxbuf: u32,
    username: String,
    authzid: Option<String>,
}

fn required<'a>(params: &DigestParameterSet<'a>, d: Directive) -> DigestResult<Vec<u8>> {
    params
        .value(d)
        .map(|v| v.into_owned())
        .ok_or(DigestError::MalformedMessage)
}

fn utf8(bytes: &[u8]) -> DigestResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| DigestError::MalformedMessage)
}

/// Matches a parsed response against the challenge recorded on `ctx` and
/// collects the verification inputs.
fn read_response(
    policy: &AcceptorPolicy,
    ctx: &SecurityContext,
    params: &DigestParameterSet<'_>,
) -> DigestResult<InboundResponse> {
    let flavor = policy.flavor;

    let nonce = required(params, Directive::Nonce)?;
    if !constant_time_eq(&nonce, ctx.nonce.as_bytes()) {
        tracing::debug!("response nonce does not match the issued nonce");
        return Err(DigestError::MalformedMessage);
    }
    if flavor == Flavor::Http && !ctx.opaque.is_empty() {
        let opaque = params.value(Directive::Opaque).unwrap_or_default();
        if opaque.as_ref() != ctx.opaque.as_bytes() {
            return Err(DigestError::MalformedMessage);
        }
    }

    let charset = match params.value(Directive::Charset) {
        None => Charset::Iso8859_1,
        Some(v) => match Charset::parse(&v) {
            Some(Charset::Utf8) if policy.allow_utf8 => Charset::Utf8,
            Some(Charset::Iso8859_1) => Charset::Iso8859_1,
            _ => return Err(DigestError::Unsupported),
        },
    };

    let realm = params.value(Directive::Realm).unwrap_or_default().into_owned();
    if hash::decode_wire_text(&realm, charset, flavor)? != ctx.realm {
        tracing::debug!("response realm does not match the challenge");
        return Err(DigestError::MalformedMessage);
    }

    let algorithm =
        negotiate::accept_algorithm(params.value(Directive::Algorithm).as_deref(), flavor, ctx.algorithm)?;
    let qop = negotiate::accept_qop(params.value(Directive::Qop).as_deref(), flavor, &ctx.offered_qops)?;
    if qop.is_none() && !ctx.offered_qops.is_empty() {
        return Err(DigestError::Unsupported);
    }
    let cipher = match qop {
        Some(Qop::AuthConf) => Some(negotiate::accept_cipher(
            params.value(Directive::Cipher).as_deref(),
            &ctx.offered_ciphers,
        )?),
        _ => None,
    };
    let peer_maxbuf = params
        .value(Directive::Maxbuf)
        .map(|v| parse_maxbuf(&v))
        .transpose()?;
    let maxbuf = negotiate::select_maxbuf(peer_maxbuf, policy.maxbuf);

    let nc_text = params.value(Directive::Nc).unwrap_or_default().into_owned();
    let nc = match qop {
        Some(_) => Some(parse_nonce_count(&nc_text)?),
        None => None,
    };

    let (method, entity_hash) = match flavor {
        Flavor::Http => {
            let method = params
                .value(Directive::Method)
                .map_or_else(|| b"GET".to_vec(), |m| m.into_owned());
            let entity_hash = match qop {
                Some(q) if q.protects_entity() => Some(required(params, Directive::EntityHash)?),
                _ => None,
            };
            (method, entity_hash)
        }
        Flavor::Sasl => (SASL_METHOD.as_bytes().to_vec(), None),
    };

    let username = required(params, Directive::Username)?;
    let username_text = hash::decode_wire_text(&username, charset, flavor)?;
    let (authzid, authzid_text) = match (flavor, params.value(Directive::Authzid)) {
        (Flavor::Sasl, Some(v)) => {
            let text = hash::decode_wire_text(&v, charset, flavor)?;
            (Some(v.into_owned()), Some(text))
        }
        _ => (None, None),
    };

    let request = PassthroughRequest {
        flags: 0,
        flavor,
        algorithm,
        qop,
        cipher,
        charset,
        username,
        realm,
        nonce,
        cnonce: params.value(Directive::Cnonce).unwrap_or_default().into_owned(),
        nc: nc_text,
        method,
        uri: required(params, uri_directive(flavor))?,
        entity_hash,
        authzid,
        response: required(params, Directive::Response)?,
        domain: policy.local_domain.as_bytes().to_vec(),
    };
    Ok(InboundResponse {
        request,
        nc,
        maxbuf,
        username: username_text,
        authzid: authzid_text,
    })
}

fn write_response_auth(request: &PassthroughRequest, rspauth: &str) -> DigestResult<Vec<u8>> {
    let mut w = DirectiveWriter::new();
    w.push_token(Directive::Rspauth, rspauth.as_bytes())?;
    if request.flavor == Flavor::Http {
        if let Some(qop) = request.qop {
            w.push_token(Directive::Qop, qop.as_str().as_bytes())?;
            w.push(Directive::Cnonce, &request.cnonce)?;
            w.push_token(Directive::Nc, &request.nc)?;
        }
    }
    w.finish()
}

fn response_auth_message(
    policy: &AcceptorPolicy,
    request: &PassthroughRequest,
    key: &SessionKey,
) -> DigestResult<Vec<u8>> {
    if !policy.sends_rspauth() {
        return Ok(Vec::new());
    }
    let rspauth = hash::compute_response_auth(&digest_input(request, key))?;
    write_response_auth(request, &rspauth)
}

/// Resolves and verifies the principal of a first response, locally or in
/// its authoritative domain.
fn verify_principal(
    policy: &AcceptorPolicy,
    store: &dyn PrincipalStore,
    forwarder: Option<&Forwarder>,
    request: &mut PassthroughRequest,
    username: &str,
    realm: &str,
) -> DigestResult<VerificationOutcome> {
    let (qualifier, account) = split_qualified(username);
    let foreign = qualifier.filter(|d| !d.eq_ignore_ascii_case(&policy.local_domain));

    if foreign.is_none() {
        let record = store.lookup(account, realm)?;
        if let Some(record) = record {
            let key = verify_locally(request, Some(&record.secret))?;
            return Ok(VerificationOutcome {
                valid: true,
                account: account.to_owned(),
                domain: policy.local_domain.clone(),
                authorization_data: record.authorization_data.clone(),
                session_key: Some(key),
                forwarded: false,
            });
        }
        request.flags |= FLAG_LOCAL_LOOKUP_DONE;
    }

    match forwarder {
        Some(forwarder) if qualifier.is_none() || foreign.is_some() => {
            forwarder.resolve(request, foreign, account)
        }
        None if foreign.is_some() => Err(DigestError::NoAuthenticatingAuthority),
        _ => {
            verify_locally(request, None)?;
            Err(DigestError::AuthenticationFailed)
        }
    }
}

/// Verifies an initiator response against the challenge recorded on `ctx`.
///
/// A context in `ChallengeIssued` is verified in full: the principal is looked
/// up in `store`, or verified in its authoritative domain through `forwarder`
/// when it is not local. On success the session key is cached and the context
/// is `Established`. An `Established` context accepts a later response with a
/// strictly higher nonce-count, checked against the cached session key with no
/// lookup and no forwarding.
///
/// The returned message carries `rspauth` when the policy sends it and is
/// empty otherwise.
///
/// # Errors
///
/// * [`DigestError::MalformedMessage`] if the response fails the structural
///   check or names a different nonce, opaque or realm than the challenge.
/// * [`DigestError::Unsupported`] if it chose a parameter that was not offered.
/// * [`DigestError::ReplayDetected`] if its nonce-count does not advance.
/// * [`DigestError::AuthenticationFailed`] on digest mismatch or unknown principal.
/// * [`DigestError::NoAuthenticatingAuthority`] if the principal's domain is
///   outside the trust forest or no forwarder is configured for it.
/// * [`DigestError::Internal`] if the forwarding call timed out; `ctx` is unchanged.
pub fn verify_response(
    policy: &AcceptorPolicy,
    store: &dyn PrincipalStore,
    forwarder: Option<&Forwarder>,
    message: &[u8],
    ctx: &mut SecurityContext,
) -> DigestResult<AcceptorOutput> {
    let flavor = policy.flavor;
    if ctx.role() != Role::Acceptor || ctx.flavor() != flavor {
        return Err(DigestError::Internal);
    }
    let reconnect = match ctx.state() {
        ContextState::ChallengeIssued => false,
        ContextState::Established => true,
        _ => return Err(DigestError::Internal),
    };
    if flavor == Flavor::Sasl && message.len() > MAX_SASL_RESPONSE_LENGTH {
        return Err(DigestError::MalformedMessage);
    }

    let params = directive::parse(message, allowed_directives(MessageKind::Response))?;
    check_directives(&params, CheckMode::new(flavor, MessageKind::Response))?;
    let mut inbound = read_response(policy, ctx, &params)?;

    match inbound.nc {
        Some(nc) => {
            if let Err(e) = ctx.check_nonce_count(nc) {
                tracing::warn!(flavor = flavor.as_str(), nc, high_water = ctx.nonce_count(), "nonce-count replay rejected");
                return Err(e);
            }
        }
        None if reconnect => {
            tracing::warn!(flavor = flavor.as_str(), "reconnect without nonce-count rejected");
            return Err(DigestError::ReplayDetected);
        }
        None => {}
    }

    if reconnect {
        return verify_reconnect(policy, inbound, ctx);
    }

    let realm = ctx.realm.clone();
    let outcome = match verify_principal(
        policy,
        store,
        forwarder,
        &mut inbound.request,
        &inbound.username,
        &realm,
    ) {
        Ok(outcome) if outcome.valid => outcome,
        Ok(_) => return Err(DigestError::AuthenticationFailed),
        Err(e) => {
            tracing::warn!(flavor = flavor.as_str(), status = e.to_status_code(), "response verification failed");
            return Err(e);
        }
    };
    let key = outcome.session_key.clone().ok_or(DigestError::Internal)?;
    let message = response_auth_message(policy, &inbound.request, &key)?;
    let request = &inbound.request;
    let cnonce = utf8(&request.cnonce)?;
    let uri = utf8(&request.uri)?;
    let method = utf8(&request.method)?;

    ctx.advance(ContextState::Verifying)?;
    ctx.set_session_key(key)?;
    if let Some(nc) = inbound.nc {
        ctx.record_nonce_count(nc)?;
    }
    ctx.cnonce = cnonce;
    ctx.algorithm = request.algorithm;
    ctx.qop = request.qop;
    ctx.cipher = request.cipher;
    ctx.charset = request.charset;
    ctx.maxbuf = inbound.maxbuf;
    ctx.principal = outcome.account.clone();
    ctx.domain = outcome.domain.clone();
    ctx.authzid = inbound.authzid.take();
    ctx.uri = uri;
    ctx.method = method;
    ctx.authorization_data = outcome.authorization_data.clone();
    ctx.attributes = ContextAttributes {
        mutual_auth: policy.sends_rspauth(),
        integrity: request.qop.is_some_and(Qop::protects_entity),
        confidentiality: request.qop == Some(Qop::AuthConf),
        forwarded: outcome.forwarded,
    };
    ctx.advance(ContextState::Established)?;

    tracing::info!(
        flavor = flavor.as_str(),
        domain = %outcome.domain,
        forwarded = outcome.forwarded,
        qop = request.qop.map_or("none", Qop::as_str),
        "principal authenticated"
    );
    Ok(AcceptorOutput {
        message,
        status: SecurityStatus::Ok,
    })
}

fn verify_reconnect(
    policy: &AcceptorPolicy,
    inbound: InboundResponse,
    ctx: &mut SecurityContext,
) -> DigestResult<AcceptorOutput> {
    let request = &inbound.request;
    let (_, account) = split_qualified(&inbound.username);
    if !account.eq_ignore_ascii_case(&ctx.principal) || request.qop != ctx.qop {
        tracing::warn!(flavor = policy.flavor.as_str(), "reconnect does not match the established context");
        return Err(DigestError::AuthenticationFailed);
    }
    let nc = inbound.nc.ok_or(DigestError::ReplayDetected)?;
    let key = ctx.session_key().ok_or(DigestError::Internal)?;
    let expected = hash::compute_request_digest(&digest_input(request, key))?;
    if !hash::digest_matches(&expected, &request.response) {
        tracing::warn!(flavor = policy.flavor.as_str(), nc, "reconnect digest mismatch");
        return Err(DigestError::AuthenticationFailed);
    }
    let message = response_auth_message(policy, request, key)?;
    let uri = utf8(&request.uri)?;
    let method = utf8(&request.method)?;

    ctx.record_nonce_count(nc)?;
    ctx.uri = uri;
    ctx.method = method;
    ctx.advance(ContextState::Established)?;

    tracing::debug!(flavor = policy.flavor.as_str(), nc, "reconnect accepted");
    Ok(AcceptorOutput {
        message,
        status: SecurityStatus::Ok,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_qualified_recognizes_domain_prefix() {
        assert_eq!(split_qualified("CORP\\alice"), (Some("CORP"), "alice"));
        assert_eq!(split_qualified("alice"), (None, "alice"));
        assert_eq!(split_qualified("\\alice"), (None, "\\alice"));
    }
}
