// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

//! H(A1) / H(A2) / request-digest computation per RFC 2617 and RFC 2831.

use std::borrow::Cow;
use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{hash7, normalize_hex_digest, to_hex};
use crate::types::{
    constant_time_eq, Algorithm, Charset, DigestError, DigestResult, Flavor, Qop, SecureBytes,
    MD5_HASH_LENGTH, ZERO_ENTITY_HASH,
};

/// Credential material for one principal.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub enum Secret {
    /// Clear-text password.
    Password(SecureBytes),
    /// Precomputed `H(username:realm:password)`, raw 16 bytes.
    Precomputed([u8; MD5_HASH_LENGTH]),
}

impl Secret {
    pub fn password(password: &str) -> Self {
        Secret::Password(SecureBytes::from(password))
    }

    /// Precomputes `H(username:realm:password)` so the clear text need not be stored.
    pub fn precompute(flavor: Flavor, username: &str, realm: &str, password: &str) -> DigestResult<Self> {
        let password = SecureBytes::from(
            canonical_text(password.as_bytes(), Charset::Utf8, flavor).into_owned(),
        );
        let username = canonical_text(username.as_bytes(), Charset::Utf8, flavor);
        let realm = canonical_text(realm.as_bytes(), Charset::Utf8, flavor);
        let hash = hash7(&[Some(&username[..]), Some(&realm[..]), Some(password.data())])?;
        Ok(Secret::Precomputed(hash))
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Secret::Password(_) => f.write_str("Secret::Password([REDACTED])"),
            Secret::Precomputed(_) => f.write_str("Secret::Precomputed([REDACTED])"),
        }
    }
}

/// Cached H(A1). Never recomputed once a context holds it.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; MD5_HASH_LENGTH]);

impl SessionKey {
    pub fn from_bytes(bytes: [u8; MD5_HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; MD5_HASH_LENGTH] {
        &self.0
    }

    fn to_hex(&self) -> String {
        to_hex(&self.0)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey([REDACTED])")
    }
}

/// Bytes hashed into A1 for a `value` received in `charset`.
///
/// RFC 2831 hashes any string representable in ISO-8859-1 in that charset,
/// even when `charset=utf-8` was negotiated. HTTP hashes the wire bytes.
pub fn canonical_text(value: &[u8], charset: Charset, flavor: Flavor) -> Cow<'_, [u8]> {
    if flavor != Flavor::Sasl || charset != Charset::Utf8 || value.is_ascii() {
        return Cow::Borrowed(value);
    }
    match std::str::from_utf8(value) {
        Ok(text) if text.chars().all(|c| u32::from(c) <= 0xFF) => {
            Cow::Owned(text.chars().map(|c| c as u8).collect())
        }
        _ => Cow::Borrowed(value),
    }
}

/// Bytes an initiator puts on the wire for `text` under `charset`.
///
/// # Errors
///
/// Returns [`DigestError::Unsupported`] if a SASL exchange negotiated
/// ISO-8859-1 and `text` falls outside it.
pub fn wire_text(text: &str, charset: Charset, flavor: Flavor) -> DigestResult<Cow<'_, [u8]>> {
    if flavor != Flavor::Sasl || charset == Charset::Utf8 || text.is_ascii() {
        return Ok(Cow::Borrowed(text.as_bytes()));
    }
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| DigestError::Unsupported))
        .collect::<DigestResult<Vec<u8>>>()
        .map(Cow::Owned)
}

/// Decodes a received value into text; ISO-8859-1 maps each byte to one char.
///
/// # Errors
///
/// Returns [`DigestError::MalformedMessage`] if a UTF-8 value is not valid UTF-8.
pub fn decode_wire_text(value: &[u8], charset: Charset, flavor: Flavor) -> DigestResult<String> {
    if flavor == Flavor::Sasl && charset == Charset::Iso8859_1 {
        return Ok(value.iter().map(|&b| char::from(b)).collect());
    }
    String::from_utf8(value.to_vec()).map_err(|_| DigestError::MalformedMessage)
}

/// Inputs to [`compute_session_key`]. `username` and `realm` are wire bytes in `charset`.
pub struct SessionKeyInput<'a> {
    pub flavor: Flavor,
    pub algorithm: Algorithm,
    pub charset: Charset,
    pub username: &'a [u8],
    pub realm: &'a [u8],
    pub secret: &'a Secret,
    pub nonce: &'a [u8],
    pub cnonce: &'a [u8],
    pub authzid: Option<&'a [u8]>,
}

/// Derives H(A1).
///
/// `MD5`: `H(username:realm:secret)`. `MD5-sess`: `H(H(username:realm:secret):nonce:cnonce)`,
/// where the inner hash is hex for HTTP and raw for SASL, and SASL appends
/// `:authzid` when one is present.
pub fn compute_session_key(input: &SessionKeyInput<'_>) -> DigestResult<SessionKey> {
    let mut inner = match input.secret {
        Secret::Password(password) => {
            let password = SecureBytes::from(
                canonical_text(password.data(), Charset::Utf8, input.flavor).into_owned(),
            );
            let username = canonical_text(input.username, input.charset, input.flavor);
            let realm = canonical_text(input.realm, input.charset, input.flavor);
            hash7(&[Some(&username[..]), Some(&realm[..]), Some(password.data())])?
        }
        Secret::Precomputed(hash) => *hash,
    };

    let key = match input.algorithm {
        Algorithm::Md5 => inner,
        Algorithm::Md5Sess => match input.flavor {
            Flavor::Http => {
                let mut inner_hex = to_hex(&inner);
                let key = hash7(&[
                    Some(inner_hex.as_bytes()),
                    Some(input.nonce),
                    Some(input.cnonce),
                ]);
                inner_hex.zeroize();
                key?
            }
            Flavor::Sasl => match input.authzid {
                Some(authzid) => hash7(&[
                    Some(&inner[..]),
                    Some(input.nonce),
                    Some(input.cnonce),
                    Some(authzid),
                ])?,
                None => hash7(&[Some(&inner[..]), Some(input.nonce), Some(input.cnonce)])?,
            },
        },
    };
    inner.zeroize();
    Ok(SessionKey(key))
}

/// Inputs to [`compute_request_digest`] and [`compute_response_auth`].
pub struct DigestInput<'a> {
    pub session_key: &'a SessionKey,
    pub nonce: &'a [u8],
    /// Eight-hex-digit nonce-count as sent on the wire.
    pub nc: &'a [u8],
    pub cnonce: &'a [u8],
    pub qop: Option<Qop>,
    pub method: &'a [u8],
    pub uri: &'a [u8],
    /// Hex entity hash for `auth-int`/`auth-conf`; the all-zero hash when `None`.
    pub entity_hash: Option<&'a [u8]>,
}

fn a2_hash(method: Option<&[u8]>, input: &DigestInput<'_>) -> DigestResult<String> {
    let digest = match input.qop {
        Some(qop) if qop.protects_entity() => {
            let entity = input.entity_hash.unwrap_or(ZERO_ENTITY_HASH.as_bytes());
            hash7(&[method, Some(input.uri), Some(entity)])?
        }
        _ => hash7(&[method, Some(input.uri)])?,
    };
    Ok(to_hex(&digest))
}

fn keyed_digest(ha2: &str, input: &DigestInput<'_>) -> DigestResult<String> {
    let mut key_hex = input.session_key.to_hex();
    let digest = match input.qop {
        Some(qop) => hash7(&[
            Some(key_hex.as_bytes()),
            Some(input.nonce),
            Some(input.nc),
            Some(input.cnonce),
            Some(qop.as_str().as_bytes()),
            Some(ha2.as_bytes()),
        ]),
        None => hash7(&[
            Some(key_hex.as_bytes()),
            Some(input.nonce),
            Some(ha2.as_bytes()),
        ]),
    };
    key_hex.zeroize();
    Ok(to_hex(&digest?))
}

/// Request-digest sent by the initiator in `response=`.
pub fn compute_request_digest(input: &DigestInput<'_>) -> DigestResult<String> {
    let ha2 = a2_hash(Some(input.method), input)?;
    keyed_digest(&ha2, input)
}

/// Response-auth sent by the acceptor in `rspauth=`; A2 omits the method.
pub fn compute_response_auth(input: &DigestInput<'_>) -> DigestResult<String> {
    let ha2 = a2_hash(None, input)?;
    keyed_digest(&ha2, input)
}

/// Compares a computed hex digest with the peer's in constant time,
/// ignoring hex letter case.
pub fn digest_matches(expected: &str, presented: &[u8]) -> bool {
    match normalize_hex_digest(presented) {
        Ok(presented) => constant_time_eq(expected.as_bytes(), &presented),
        Err(_) => false,
    }
}
