// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

//! Structural gate run on every parsed message before any cryptographic work.

use crate::directive::{Directive, DigestParameterSet};
use crate::types::{
    DigestError, DigestResult, Flavor, HEX_HASH_LENGTH, MAX_MAXBUF, MAX_MAXBUF_DIGITS,
    NONCE_COUNT_LENGTH,
};

/// Which protocol message is being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Acceptor challenge, consumed by the initiator.
    Challenge,
    /// Initiator response, consumed by the acceptor.
    Response,
    /// Acceptor `rspauth` confirmation, consumed by the initiator.
    ResponseAuth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckMode {
    pub flavor: Flavor,
    pub kind: MessageKind,
}

impl CheckMode {
    pub fn new(flavor: Flavor, kind: MessageKind) -> Self {
        Self { flavor, kind }
    }
}

const CHALLENGE_DIRECTIVES: &[Directive] = &[
    Directive::Realm,
    Directive::Nonce,
    Directive::Qop,
    Directive::Algorithm,
    Directive::Cipher,
    Directive::Charset,
    Directive::Maxbuf,
    Directive::Opaque,
    Directive::Stale,
    Directive::Domain,
];

const RESPONSE_DIRECTIVES: &[Directive] = &[
    Directive::Username,
    Directive::Realm,
    Directive::Nonce,
    Directive::Cnonce,
    Directive::Nc,
    Directive::Qop,
    Directive::Algorithm,
    Directive::Cipher,
    Directive::Charset,
    Directive::Uri,
    Directive::DigestUri,
    Directive::Method,
    Directive::EntityHash,
    Directive::Maxbuf,
    Directive::Opaque,
    Directive::Response,
    Directive::Authzid,
];

const RESPONSE_AUTH_DIRECTIVES: &[Directive] = &[
    Directive::Rspauth,
    Directive::Nextnonce,
    Directive::Qop,
    Directive::Cnonce,
    Directive::Nc,
];

/// Directives the codec should record for a message of `kind`.
pub fn allowed_directives(kind: MessageKind) -> &'static [Directive] {
    match kind {
        MessageKind::Challenge => CHALLENGE_DIRECTIVES,
        MessageKind::Response => RESPONSE_DIRECTIVES,
        MessageKind::ResponseAuth => RESPONSE_AUTH_DIRECTIVES,
    }
}

/// Name of the directive carrying the request URI for `flavor`.
pub fn uri_directive(flavor: Flavor) -> Directive {
    match flavor {
        Flavor::Http => Directive::Uri,
        Flavor::Sasl => Directive::DigestUri,
    }
}

fn exactly_once(params: &DigestParameterSet<'_>, d: Directive) -> DigestResult<()> {
    if params.count(d) != 1 {
        tracing::debug!(directive = d.name(), count = params.count(d), "directive must appear exactly once");
        return Err(DigestError::MalformedMessage);
    }
    Ok(())
}

fn at_most_once(params: &DigestParameterSet<'_>, d: Directive) -> DigestResult<()> {
    if params.count(d) > 1 {
        tracing::debug!(directive = d.name(), count = params.count(d), "directive repeated");
        return Err(DigestError::MalformedMessage);
    }
    Ok(())
}

fn absent(params: &DigestParameterSet<'_>, d: Directive) -> DigestResult<()> {
    if params.contains(d) {
        tracing::debug!(directive = d.name(), "directive not valid for this flavor");
        return Err(DigestError::MalformedMessage);
    }
    Ok(())
}

/// Enforces per-mode cardinality and value shape.
///
/// Runs before any secret is touched; every failure is
/// [`DigestError::MalformedMessage`].
pub fn check_directives(params: &DigestParameterSet<'_>, mode: CheckMode) -> DigestResult<()> {
    let allowed = allowed_directives(mode.kind);

    match mode.kind {
        MessageKind::Challenge => {
            exactly_once(params, Directive::Nonce)?;
            for &d in allowed {
                // RFC 2831 lets a SASL challenge list several realms.
                if d == Directive::Nonce || (d == Directive::Realm && mode.flavor == Flavor::Sasl) {
                    continue;
                }
                at_most_once(params, d)?;
            }
        }
        MessageKind::Response => {
            exactly_once(params, Directive::Username)?;
            exactly_once(params, Directive::Nonce)?;
            exactly_once(params, Directive::Response)?;
            exactly_once(params, uri_directive(mode.flavor))?;
            match mode.flavor {
                Flavor::Sasl => {
                    exactly_once(params, Directive::Realm)?;
                    exactly_once(params, Directive::Nc)?;
                    exactly_once(params, Directive::Cnonce)?;
                    absent(params, Directive::Uri)?;
                    absent(params, Directive::Opaque)?;
                }
                Flavor::Http => {
                    absent(params, Directive::DigestUri)?;
                    if params.contains(Directive::Qop) {
                        exactly_once(params, Directive::Nc)?;
                        exactly_once(params, Directive::Cnonce)?;
                    }
                }
            }
            for &d in allowed {
                at_most_once(params, d)?;
            }
            if let Some(response) = params.get(Directive::Response) {
                check_hex_digest(&response.unescaped())?;
            }
        }
        MessageKind::ResponseAuth => {
            exactly_once(params, Directive::Rspauth)?;
            for &d in allowed {
                at_most_once(params, d)?;
            }
            if let Some(rspauth) = params.get(Directive::Rspauth) {
                check_hex_digest(&rspauth.unescaped())?;
            }
        }
    }

    if let Some(nc) = params.get(Directive::Nc) {
        parse_nonce_count(&nc.unescaped())?;
    }
    if let Some(maxbuf) = params.get(Directive::Maxbuf) {
        parse_maxbuf(&maxbuf.unescaped())?;
    }
    Ok(())
}

fn check_hex_digest(value: &[u8]) -> DigestResult<()> {
    if value.len() != HEX_HASH_LENGTH || !value.iter().all(u8::is_ascii_hexdigit) {
        return Err(DigestError::MalformedMessage);
    }
    Ok(())
}

/// Parses an `nc` value: exactly eight hex digits.
///
/// # Errors
///
/// Returns [`DigestError::MalformedMessage`] on any other shape.
pub fn parse_nonce_count(value: &[u8]) -> DigestResult<u32> {
    if value.len() != NONCE_COUNT_LENGTH || !value.iter().all(u8::is_ascii_hexdigit) {
        return Err(DigestError::MalformedMessage);
    }
    let text = std::str::from_utf8(value).map_err(|_| DigestError::MalformedMessage)?;
    u32::from_str_radix(text, 16).map_err(|_| DigestError::MalformedMessage)
}

/// Renders a nonce-count as eight lower-case hex digits.
pub fn format_nonce_count(nc: u32) -> String {
    format!("{nc:08x}")
}

/// Parses a `maxbuf` value: at most [`MAX_MAXBUF_DIGITS`] decimal digits, in `1..=MAX_MAXBUF`.
///
/// # Errors
///
/// Returns [`DigestError::MalformedMessage`] if the value is empty, too wide,
/// non-numeric or out of range.
pub fn parse_maxbuf(value: &[u8]) -> DigestResult<u32> {
    if value.is_empty()
        || value.len() > MAX_MAXBUF_DIGITS
        || !value.iter().all(u8::is_ascii_digit)
    {
        return Err(DigestError::MalformedMessage);
    }
    let parsed = value
        .iter()
        .fold(0u32, |acc, &b| acc * 10 + u32::from(b - b'0'));
    if parsed == 0 || parsed > MAX_MAXBUF {
        return Err(DigestError::MalformedMessage);
    }
    Ok(parsed)
}
