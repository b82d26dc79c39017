// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

use digest_core::check::{
    allowed_directives, check_directives, format_nonce_count, parse_maxbuf, uri_directive,
    CheckMode, MessageKind,
};
use digest_core::context::{ContextAttributes, ContextState, SecurityContext, SecurityStatus};
use digest_core::crypto;
use digest_core::directive::{self, Directive, DirectiveWriter};
use digest_core::hash::{self, DigestInput, SessionKeyInput};
use digest_core::negotiate;
use digest_core::types::{
    Algorithm, Charset, Cipher, DigestError, DigestResult, Flavor, Qop, Role, DEFAULT_MAXBUF,
    MAX_SASL_CHALLENGE_LENGTH, MAX_SASL_RESPONSE_LENGTH, SASL_METHOD,
};

use crate::state::{ClientIdentity, InitiatorOutput, InitiatorRequest};

/// Creates an initiator context with nothing exchanged yet.
///
/// This is the SASL probe call: the caller gets a context back and no output,
/// and supplies the acceptor's challenge on the next step.
pub fn begin_context(flavor: Flavor) -> SecurityContext {
    SecurityContext::new(Role::Initiator, flavor)
}

struct ResponseFields<'a> {
    flavor: Flavor,
    charset: Charset,
    username: &'a [u8],
    realm: &'a [u8],
    nonce: &'a str,
    uri: &'a str,
    method: &'a str,
    entity_hash: Option<&'a str>,
    qop: Option<Qop>,
    nc: &'a str,
    cnonce: &'a str,
    algorithm: Algorithm,
    response: &'a str,
    opaque: &'a str,
    maxbuf: u32,
    cipher: Option<Cipher>,
    authzid: Option<&'a str>,
}

fn write_response(f: &ResponseFields<'_>) -> DigestResult<Vec<u8>> {
    let mut w = DirectiveWriter::new();
    if f.flavor == Flavor::Sasl && f.charset == Charset::Utf8 {
        w.push_token(Directive::Charset, f.charset.as_str().as_bytes())?;
    }
    w.push(Directive::Username, f.username)?;
    w.push(Directive::Realm, f.realm)?;
    w.push(Directive::Nonce, f.nonce.as_bytes())?;
    w.push(uri_directive(f.flavor), f.uri.as_bytes())?;
    if f.flavor == Flavor::Http {
        w.push_token(Directive::Method, f.method.as_bytes())?;
        if let Some(entity_hash) = f.entity_hash {
            w.push_token(Directive::EntityHash, entity_hash.as_bytes())?;
        }
    }
    if let Some(qop) = f.qop {
        w.push_token(Directive::Qop, qop.as_str().as_bytes())?;
        w.push_token(Directive::Nc, f.nc.as_bytes())?;
    }
    if f.qop.is_some() || f.algorithm == Algorithm::Md5Sess {
        w.push(Directive::Cnonce, f.cnonce.as_bytes())?;
    }
    match f.flavor {
        Flavor::Http => {
            w.push_token(Directive::Algorithm, f.algorithm.wire_str(f.flavor).as_bytes())?;
            w.push_quoted(Directive::Response, f.response.as_bytes())?;
            if !f.opaque.is_empty() {
                w.push(Directive::Opaque, f.opaque.as_bytes())?;
            }
        }
        Flavor::Sasl => {
            w.push_token(Directive::Response, f.response.as_bytes())?;
            if f.maxbuf != DEFAULT_MAXBUF {
                w.push_token(Directive::Maxbuf, f.maxbuf.to_string().as_bytes())?;
            }
            if let Some(cipher) = f.cipher {
                w.push_token(Directive::Cipher, cipher.as_str().as_bytes())?;
            }
            if let Some(authzid) = f.authzid {
                w.push(Directive::Authzid, authzid.as_bytes())?;
            }
        }
    }
    let message = w.finish()?;
    if f.flavor == Flavor::Sasl && message.len() > MAX_SASL_RESPONSE_LENGTH {
        return Err(DigestError::Internal);
    }
    Ok(message)
}

fn method_for(request: &InitiatorRequest) -> &str {
    match request.flavor {
        Flavor::Http => &request.method,
        Flavor::Sasl => SASL_METHOD,
    }
}

fn entity_hash_for(request: &InitiatorRequest, qop: Option<Qop>) -> Option<String> {
    match (request.flavor, qop) {
        (Flavor::Http, Some(q)) if q.protects_entity() => Some(crypto::entity_hash(
            request.entity_body.as_deref().unwrap_or_default(),
        )),
        _ => None,
    }
}

/// Answers an acceptor challenge.
///
/// Parses and checks the challenge, negotiates algorithm, QOP, cipher, charset
/// and maxbuf, derives the session key and request-digest, and writes the
/// response message. The context is only updated once every step succeeded.
///
/// When mutual authentication applies (always for SASL) the context moves to
/// `ChallengeSent`, keeps the expected `rspauth` and the step returns
/// [`SecurityStatus::ContinueNeeded`]; otherwise it is `Established`.
///
/// # Errors
///
/// * [`DigestError::MalformedMessage`] for a challenge that fails parsing or the structural check.
/// * [`DigestError::Unsupported`] if negotiation finds no acceptable parameters.
/// * [`DigestError::Internal`] if the context is not a fresh initiator context.
pub fn generate_response(
    identity: &ClientIdentity,
    request: &InitiatorRequest,
    challenge: &[u8],
    ctx: &mut SecurityContext,
) -> DigestResult<InitiatorOutput> {
    let flavor = request.flavor;
    if ctx.role() != Role::Initiator || ctx.flavor() != flavor || ctx.state() != ContextState::Empty {
        return Err(DigestError::Internal);
    }
    if flavor == Flavor::Sasl && challenge.len() > MAX_SASL_CHALLENGE_LENGTH {
        return Err(DigestError::MalformedMessage);
    }

    let params = directive::parse(challenge, allowed_directives(MessageKind::Challenge))?;
    check_directives(&params, CheckMode::new(flavor, MessageKind::Challenge))?;

    let wants = request.requirements;
    let algorithm =
        negotiate::select_algorithm(params.value(Directive::Algorithm).as_deref(), flavor)?;
    let qop = negotiate::select_qop(
        params.value(Directive::Qop).as_deref(),
        flavor,
        wants.confidentiality,
        wants.integrity,
    )?;
    let cipher = match qop {
        Some(Qop::AuthConf) => Some(negotiate::select_cipher(
            params.value(Directive::Cipher).as_deref(),
        )?),
        _ => None,
    };
    let charset =
        negotiate::select_charset(params.value(Directive::Charset).as_deref(), request.allow_utf8);
    let peer_maxbuf = params
        .value(Directive::Maxbuf)
        .map(|v| parse_maxbuf(&v))
        .transpose()?;
    let maxbuf = negotiate::select_maxbuf(peer_maxbuf, request.maxbuf);

    let nonce = params
        .get(Directive::Nonce)
        .ok_or(DigestError::MalformedMessage)?
        .to_str()?
        .into_owned();
    let opaque = match (flavor, params.get(Directive::Opaque)) {
        (Flavor::Http, Some(v)) => v.to_str()?.into_owned(),
        _ => String::new(),
    };
    let realm = match (&identity.realm, params.value(Directive::Realm)) {
        (Some(realm), _) => realm.clone(),
        (None, Some(offered)) => hash::decode_wire_text(&offered, charset, flavor)?,
        (None, None) => String::new(),
    };
    let cnonce = match &request.cnonce {
        Some(cnonce) => cnonce.clone(),
        None => crypto::random_token()?,
    };
    let authzid = match flavor {
        Flavor::Sasl => identity.authzid.as_deref(),
        Flavor::Http => None,
    };

    let username_wire = hash::wire_text(&identity.username, charset, flavor)?;
    let realm_wire = hash::wire_text(&realm, charset, flavor)?;

    let session_key = hash::compute_session_key(&SessionKeyInput {
        flavor,
        algorithm,
        charset,
        username: &username_wire,
        realm: &realm_wire,
        secret: &identity.secret,
        nonce: nonce.as_bytes(),
        cnonce: cnonce.as_bytes(),
        authzid: authzid.map(str::as_bytes),
    })?;

    let nc = ctx.next_nonce_count()?;
    let nc_text = format_nonce_count(nc);
    let method = method_for(request);
    let entity_hash = entity_hash_for(request, qop);
    let digest_input = DigestInput {
        session_key: &session_key,
        nonce: nonce.as_bytes(),
        nc: nc_text.as_bytes(),
        cnonce: cnonce.as_bytes(),
        qop,
        method: method.as_bytes(),
        uri: request.uri.as_bytes(),
        entity_hash: entity_hash.as_deref().map(str::as_bytes),
    };
    let response = hash::compute_request_digest(&digest_input)?;
    let mutual = request.wants_mutual_auth();
    let expected_rspauth = if mutual {
        Some(hash::compute_response_auth(&digest_input)?)
    } else {
        None
    };

    let message = write_response(&ResponseFields {
        flavor,
        charset,
        username: &username_wire,
        realm: &realm_wire,
        nonce: &nonce,
        uri: &request.uri,
        method,
        entity_hash: entity_hash.as_deref(),
        qop,
        nc: &nc_text,
        cnonce: &cnonce,
        algorithm,
        response: &response,
        opaque: &opaque,
        maxbuf: request.maxbuf,
        cipher,
        authzid,
    })?;

    ctx.advance(if mutual {
        ContextState::ChallengeSent
    } else {
        ContextState::Established
    })?;
    ctx.set_session_key(session_key)?;
    ctx.record_nonce_count(nc)?;
    ctx.nonce = nonce;
    ctx.cnonce = cnonce;
    ctx.opaque = opaque;
    ctx.algorithm = algorithm;
    ctx.qop = qop;
    ctx.cipher = cipher;
    ctx.charset = charset;
    ctx.maxbuf = maxbuf;
    ctx.principal = identity.username.clone();
    ctx.realm = realm;
    ctx.authzid = authzid.map(str::to_owned);
    ctx.uri = request.uri.clone();
    ctx.method = method.to_owned();
    ctx.expected_rspauth = expected_rspauth;
    ctx.attributes = ContextAttributes {
        mutual_auth: mutual,
        integrity: qop.is_some_and(Qop::protects_entity),
        confidentiality: qop == Some(Qop::AuthConf),
        forwarded: false,
    };

    tracing::debug!(
        flavor = flavor.as_str(),
        algorithm = algorithm.as_str(),
        qop = qop.map_or("none", Qop::as_str),
        mutual,
        "initiator response generated"
    );

    Ok(InitiatorOutput {
        message,
        status: if mutual {
            SecurityStatus::ContinueNeeded
        } else {
            SecurityStatus::Ok
        },
    })
}

/// Checks the acceptor's `rspauth` confirmation.
///
/// Accepted in `ChallengeSent`, and in `Established` after a follow-up that
/// expects confirmation. On success the context is `Established`.
///
/// # Errors
///
/// * [`DigestError::MalformedMessage`] if the message fails the structural check.
/// * [`DigestError::AuthenticationFailed`] if `rspauth`, `cnonce` or `nc` does not match.
/// * [`DigestError::Internal`] if no confirmation is pending.
pub fn verify_response_auth(message: &[u8], ctx: &mut SecurityContext) -> DigestResult<SecurityStatus> {
    let pending = matches!(ctx.state(), ContextState::ChallengeSent | ContextState::Established);
    if ctx.role() != Role::Initiator || !pending {
        return Err(DigestError::Internal);
    }
    let expected = ctx.expected_rspauth.clone().ok_or(DigestError::Internal)?;

    let params = directive::parse(message, allowed_directives(MessageKind::ResponseAuth))?;
    check_directives(&params, CheckMode::new(ctx.flavor(), MessageKind::ResponseAuth))?;

    let rspauth = params.value(Directive::Rspauth).ok_or(DigestError::MalformedMessage)?;
    let cnonce_ok = params
        .value(Directive::Cnonce)
        .map_or(true, |c| c.as_ref() == ctx.cnonce.as_bytes());
    let nc_ok = params
        .value(Directive::Nc)
        .map_or(true, |nc| nc.as_ref() == format_nonce_count(ctx.nonce_count()).as_bytes());
    if !hash::digest_matches(&expected, &rspauth) || !cnonce_ok || !nc_ok {
        tracing::warn!(flavor = ctx.flavor().as_str(), "response-auth verification failed");
        return Err(DigestError::AuthenticationFailed);
    }
    if params.contains(Directive::Nextnonce) {
        tracing::debug!("acceptor offered nextnonce; cached session key stays bound to the original nonce");
    }

    if ctx.state() == ContextState::ChallengeSent {
        ctx.advance(ContextState::Verifying)?;
        ctx.advance(ContextState::Established)?;
    }
    ctx.expected_rspauth = None;
    tracing::debug!(flavor = ctx.flavor().as_str(), "mutual authentication confirmed");
    Ok(SecurityStatus::Ok)
}

/// Produces a further HTTP response for a new request on an established
/// context, reusing the cached session key, nonce and cnonce with `nc + 1`.
///
/// # Errors
///
/// * [`DigestError::Unsupported`] for SASL contexts and legacy (no-QOP) contexts.
/// * [`DigestError::Internal`] if the context is not established or the counter is exhausted.
pub fn generate_follow_up(
    request: &InitiatorRequest,
    ctx: &mut SecurityContext,
) -> DigestResult<InitiatorOutput> {
    if ctx.role() != Role::Initiator || !ctx.is_established() {
        return Err(DigestError::Internal);
    }
    if ctx.flavor() != Flavor::Http || request.flavor != Flavor::Http || ctx.qop.is_none() {
        return Err(DigestError::Unsupported);
    }
    let session_key = ctx.session_key().ok_or(DigestError::Internal)?;

    let nc = ctx.next_nonce_count()?;
    let nc_text = format_nonce_count(nc);
    let entity_hash = entity_hash_for(request, ctx.qop);
    let digest_input = DigestInput {
        session_key,
        nonce: ctx.nonce.as_bytes(),
        nc: nc_text.as_bytes(),
        cnonce: ctx.cnonce.as_bytes(),
        qop: ctx.qop,
        method: request.method.as_bytes(),
        uri: request.uri.as_bytes(),
        entity_hash: entity_hash.as_deref().map(str::as_bytes),
    };
    let response = hash::compute_request_digest(&digest_input)?;
    let expected_rspauth = if ctx.attributes.mutual_auth {
        Some(hash::compute_response_auth(&digest_input)?)
    } else {
        None
    };

    let message = write_response(&ResponseFields {
        flavor: Flavor::Http,
        charset: ctx.charset,
        username: ctx.principal.as_bytes(),
        realm: ctx.realm.as_bytes(),
        nonce: &ctx.nonce,
        uri: &request.uri,
        method: &request.method,
        entity_hash: entity_hash.as_deref(),
        qop: ctx.qop,
        nc: &nc_text,
        cnonce: &ctx.cnonce,
        algorithm: ctx.algorithm,
        response: &response,
        opaque: &ctx.opaque,
        maxbuf: DEFAULT_MAXBUF,
        cipher: None,
        authzid: None,
    })?;

    ctx.advance(ContextState::Established)?;
    ctx.record_nonce_count(nc)?;
    ctx.uri = request.uri.clone();
    ctx.method = request.method.clone();
    ctx.expected_rspauth = expected_rspauth;

    tracing::debug!(nc, "initiator follow-up generated");
    Ok(InitiatorOutput {
        message,
        status: SecurityStatus::Ok,
    })
}
