// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

use std::sync::OnceLock;

use zeroize::Zeroize;

use crate::types::{
    DigestError, DigestResult, HASH7_MAX_PARTS, HEX_HASH_LENGTH, MD5_HASH_LENGTH,
    RANDOM_TOKEN_BYTES,
};

static SODIUM_READY: OnceLock<bool> = OnceLock::new();

/// Initializes libsodium once per process.
///
/// # Errors
///
/// Returns [`DigestError::Internal`] if `sodium_init` reports failure.
pub fn init() -> DigestResult<()> {
    // SAFETY: sodium_init is thread-safe and idempotent; the OnceLock only
    // avoids repeating the call.
    let ready = *SODIUM_READY.get_or_init(|| unsafe { libsodium_sys::sodium_init() } >= 0);
    if ready {
        Ok(())
    } else {
        Err(DigestError::Internal)
    }
}

/// Fills `buf` with cryptographically secure random bytes.
///
/// # Errors
///
/// Returns [`DigestError::Internal`] if `buf` is empty or libsodium cannot be initialized.
pub fn random_bytes(buf: &mut [u8]) -> DigestResult<()> {
    if buf.is_empty() {
        return Err(DigestError::Internal);
    }
    init()?;
    // SAFETY: buf is a valid mutable slice; length matches buf.len().
    unsafe {
        libsodium_sys::randombytes_buf(buf.as_mut_ptr() as *mut _, buf.len());
    }
    Ok(())
}

/// Produces an independently random, hex-encoded token for nonces, cnonces and opaques.
///
/// Every call draws fresh bytes from the CSPRNG; there is no counter component.
pub fn random_token() -> DigestResult<String> {
    let mut raw = [0u8; RANDOM_TOKEN_BYTES];
    random_bytes(&mut raw)?;
    let token = hex::encode(raw);
    raw.zeroize();
    Ok(token)
}

/// MD5 over up to seven colon-joined sections.
///
/// `None` renders its section empty while keeping the separator, so
/// `hash7(&[None, Some(b"uri")])` hashes `":uri"`.
///
/// # Errors
///
/// Returns [`DigestError::Internal`] if more than [`HASH7_MAX_PARTS`] parts are given.
pub fn hash7(parts: &[Option<&[u8]>]) -> DigestResult<[u8; MD5_HASH_LENGTH]> {
    if parts.is_empty() || parts.len() > HASH7_MAX_PARTS {
        return Err(DigestError::Internal);
    }
    let mut ctx = md5::Context::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            ctx.consume(b":");
        }
        if let Some(bytes) = part {
            ctx.consume(bytes);
        }
    }
    Ok(ctx.compute().0)
}

/// Same as [`hash7`] but returns the 32-character lower-case hex wire form.
pub fn hash7_hex(parts: &[Option<&[u8]>]) -> DigestResult<String> {
    let mut raw = hash7(parts)?;
    let hex = to_hex(&raw);
    raw.zeroize();
    Ok(hex)
}

/// Hex-encodes a raw digest.
pub fn to_hex(digest: &[u8; MD5_HASH_LENGTH]) -> String {
    hex::encode(digest)
}

/// Hex MD5 of an entity body, as used for `auth-int` in HTTP.
pub fn entity_hash(body: &[u8]) -> String {
    to_hex(&md5::compute(body).0)
}

/// Checks that `value` is a 32-digit hex digest and returns its lower-cased form.
///
/// # Errors
///
/// Returns [`DigestError::MalformedMessage`] on wrong length or non-hex characters.
pub fn normalize_hex_digest(value: &[u8]) -> DigestResult<[u8; HEX_HASH_LENGTH]> {
    if value.len() != HEX_HASH_LENGTH || !value.iter().all(u8::is_ascii_hexdigit) {
        return Err(DigestError::MalformedMessage);
    }
    let mut out = [0u8; HEX_HASH_LENGTH];
    for (dst, src) in out.iter_mut().zip(value) {
        *dst = src.to_ascii_lowercase();
    }
    Ok(out)
}
