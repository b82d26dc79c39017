// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

//! Parameter selection between the peer's offer and local capability/policy.
//!
//! `select_*` functions run on the initiator against a challenge offer;
//! `accept_*` functions run on the acceptor against the single value the
//! initiator chose.

use crate::directive::split_list;
use crate::types::{
    Algorithm, Charset, Cipher, DigestError, DigestResult, Flavor, Qop, DEFAULT_MAXBUF,
};

fn offered_list<T>(offered: Option<&[u8]>, parse: impl Fn(&[u8]) -> Option<T>) -> Vec<T> {
    offered
        .map(|value| split_list(value).filter_map(&parse).collect())
        .unwrap_or_default()
}

/// Picks the hash algorithm from a challenge.
///
/// HTTP prefers `MD5-sess`, then `MD5`, and defaults to `MD5` when the directive
/// is absent. SASL accepts only `MD5-sess`.
///
/// # Errors
///
/// Returns [`DigestError::Unsupported`] when no acceptable algorithm is offered.
pub fn select_algorithm(offered: Option<&[u8]>, flavor: Flavor) -> DigestResult<Algorithm> {
    let algorithms = offered_list(offered, Algorithm::parse);
    if algorithms.contains(&Algorithm::Md5Sess) {
        return Ok(Algorithm::Md5Sess);
    }
    match flavor {
        Flavor::Http if offered.is_none() || algorithms.contains(&Algorithm::Md5) => {
            Ok(Algorithm::Md5)
        }
        _ => Err(DigestError::Unsupported),
    }
}

/// Picks the quality of protection from a challenge. `Ok(None)` is the legacy
/// pre-QOP mode.
///
/// Confidentiality requires `auth-conf`, integrity requires `auth-int`;
/// otherwise `auth` is taken. An HTTP challenge with no `qop` directive
/// negotiates legacy mode; a SASL challenge with none means `auth`.
///
/// # Errors
///
/// Returns [`DigestError::Unsupported`] if the requested tier is not offered.
pub fn select_qop(
    offered: Option<&[u8]>,
    flavor: Flavor,
    confidentiality: bool,
    integrity: bool,
) -> DigestResult<Option<Qop>> {
    let qops = match (offered, flavor) {
        (None, Flavor::Sasl) => vec![Qop::Auth],
        _ => offered_list(offered, Qop::parse),
    };

    let wanted = if confidentiality {
        Qop::AuthConf
    } else if integrity {
        Qop::AuthInt
    } else {
        Qop::Auth
    };
    if qops.contains(&wanted) {
        return Ok(Some(wanted));
    }
    if wanted == Qop::Auth && flavor == Flavor::Http && offered.is_none() {
        return Ok(None);
    }
    Err(DigestError::Unsupported)
}

/// Picks a cipher for `auth-conf` using the fixed local preference order.
///
/// # Errors
///
/// Returns [`DigestError::Unsupported`] if no offered cipher is known.
pub fn select_cipher(offered: Option<&[u8]>) -> DigestResult<Cipher> {
    let ciphers = offered_list(offered, Cipher::parse);
    Cipher::PREFERENCE
        .into_iter()
        .find(|c| ciphers.contains(c))
        .ok_or(DigestError::Unsupported)
}

/// UTF-8 only when the peer offered it and local policy permits it.
pub fn select_charset(offered: Option<&[u8]>, policy_allows_utf8: bool) -> Charset {
    match offered.and_then(Charset::parse) {
        Some(Charset::Utf8) if policy_allows_utf8 => Charset::Utf8,
        _ => Charset::Iso8859_1,
    }
}

/// Smaller of the peer's advertised `maxbuf` and the local limit.
pub fn select_maxbuf(peer: Option<u32>, local: u32) -> u32 {
    peer.unwrap_or(DEFAULT_MAXBUF).min(local)
}

/// Validates the algorithm echoed in a response against the one challenged.
///
/// # Errors
///
/// Returns [`DigestError::Unsupported`] if the response names a different
/// algorithm. SASL responses carry no algorithm and inherit the challenge's;
/// an HTTP response without one means `MD5`.
pub fn accept_algorithm(
    chosen: Option<&[u8]>,
    flavor: Flavor,
    challenged: Algorithm,
) -> DigestResult<Algorithm> {
    match chosen {
        None if flavor == Flavor::Sasl => Ok(challenged),
        None if challenged == Algorithm::Md5 => Ok(Algorithm::Md5),
        None => Err(DigestError::Unsupported),
        Some(token) => match Algorithm::parse(token) {
            Some(a) if a == challenged => Ok(a),
            _ => Err(DigestError::Unsupported),
        },
    }
}

/// Validates the QOP chosen by the initiator against the acceptor's offer.
///
/// An absent directive means legacy mode for HTTP and `auth` for SASL.
///
/// # Errors
///
/// Returns [`DigestError::Unsupported`] for unknown or unoffered values.
pub fn accept_qop(chosen: Option<&[u8]>, flavor: Flavor, offered: &[Qop]) -> DigestResult<Option<Qop>> {
    match (chosen, flavor) {
        (None, Flavor::Http) => Ok(None),
        (None, Flavor::Sasl) if offered.contains(&Qop::Auth) => Ok(Some(Qop::Auth)),
        (None, Flavor::Sasl) => Err(DigestError::Unsupported),
        (Some(token), _) => match Qop::parse(token) {
            Some(q) if offered.contains(&q) => Ok(Some(q)),
            _ => Err(DigestError::Unsupported),
        },
    }
}

/// Validates the cipher chosen by the initiator against the acceptor's offer.
///
/// # Errors
///
/// Returns [`DigestError::Unsupported`] if absent, unknown or not offered.
pub fn accept_cipher(chosen: Option<&[u8]>, offered: &[Cipher]) -> DigestResult<Cipher> {
    chosen
        .and_then(Cipher::parse)
        .filter(|c| offered.contains(c))
        .ok_or(DigestError::Unsupported)
}
