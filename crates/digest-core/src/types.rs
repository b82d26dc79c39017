// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

use std::fmt;

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a raw MD5 digest in bytes.
pub const MD5_HASH_LENGTH: usize = 16;
/// Length of a hex-encoded MD5 digest in characters.
pub const HEX_HASH_LENGTH: usize = 2 * MD5_HASH_LENGTH;
/// Number of input sections accepted by [`crate::crypto::hash7`].
pub const HASH7_MAX_PARTS: usize = 7;
/// Number of hex digits in a nonce-count (`nc`) value.
pub const NONCE_COUNT_LENGTH: usize = 8;
/// Number of random bytes behind every generated nonce, cnonce and opaque.
pub const RANDOM_TOKEN_BYTES: usize = 16;

/// Largest accepted directive value (after unquoting) in bytes.
pub const MAX_TOKEN_LENGTH: usize = 1024;
/// Largest accepted wire message in bytes.
pub const MAX_MESSAGE_LENGTH: usize = 8192;
/// RFC 2831 upper bound for a SASL challenge.
pub const MAX_SASL_CHALLENGE_LENGTH: usize = 2048;
/// RFC 2831 upper bound for a SASL response.
pub const MAX_SASL_RESPONSE_LENGTH: usize = 4096;

/// Maximum decimal digits accepted in a `maxbuf` directive.
pub const MAX_MAXBUF_DIGITS: usize = 8;
/// Largest `maxbuf` value a SASL peer may advertise.
pub const MAX_MAXBUF: u32 = 16_777_215;
/// `maxbuf` assumed when a SASL peer omits the directive.
pub const DEFAULT_MAXBUF: u32 = 65_536;

/// Method used in A2 for SASL exchanges.
pub const SASL_METHOD: &str = "AUTHENTICATE";
/// Entity hash used for SASL `auth-int` and `auth-conf` A2 computations.
pub const ZERO_ENTITY_HASH: &str = "00000000000000000000000000000000";

/// Wire flavor of a digest exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    /// RFC 2617 HTTP Digest.
    Http,
    /// RFC 2831 SASL DIGEST-MD5.
    Sasl,
}

impl Flavor {
    pub fn as_str(self) -> &'static str {
        match self {
            Flavor::Http => "http",
            Flavor::Sasl => "sasl",
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Flavor::Http => 1,
            Flavor::Sasl => 2,
        }
    }

    pub fn from_byte(b: u8) -> DigestResult<Self> {
        match b {
            1 => Ok(Flavor::Http),
            2 => Ok(Flavor::Sasl),
            _ => Err(DigestError::MalformedMessage),
        }
    }
}

/// Side of the exchange a context plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Initiator,
    Acceptor,
}

/// Digest hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Md5,
    Md5Sess,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Md5 => "MD5",
            Algorithm::Md5Sess => "MD5-sess",
        }
    }

    /// Spelling used on the SASL wire, where RFC 2831 writes the token in lower case.
    pub fn wire_str(self, flavor: Flavor) -> &'static str {
        match (self, flavor) {
            (Algorithm::Md5Sess, Flavor::Sasl) => "md5-sess",
            (a, _) => a.as_str(),
        }
    }

    pub fn parse(token: &[u8]) -> Option<Self> {
        if token.eq_ignore_ascii_case(b"md5") {
            Some(Algorithm::Md5)
        } else if token.eq_ignore_ascii_case(b"md5-sess") {
            Some(Algorithm::Md5Sess)
        } else {
            None
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Algorithm::Md5 => 1,
            Algorithm::Md5Sess => 2,
        }
    }

    pub fn from_byte(b: u8) -> DigestResult<Self> {
        match b {
            1 => Ok(Algorithm::Md5),
            2 => Ok(Algorithm::Md5Sess),
            _ => Err(DigestError::MalformedMessage),
        }
    }
}

/// Quality of protection. The legacy pre-QOP mode is modelled as `Option::<Qop>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Qop {
    Auth,
    AuthInt,
    AuthConf,
}

impl Qop {
    pub fn as_str(self) -> &'static str {
        match self {
            Qop::Auth => "auth",
            Qop::AuthInt => "auth-int",
            Qop::AuthConf => "auth-conf",
        }
    }

    pub fn parse(token: &[u8]) -> Option<Self> {
        if token.eq_ignore_ascii_case(b"auth") {
            Some(Qop::Auth)
        } else if token.eq_ignore_ascii_case(b"auth-int") {
            Some(Qop::AuthInt)
        } else if token.eq_ignore_ascii_case(b"auth-conf") {
            Some(Qop::AuthConf)
        } else {
            None
        }
    }

    /// `auth-int` and `auth-conf` bind the entity hash into A2.
    pub fn protects_entity(self) -> bool {
        matches!(self, Qop::AuthInt | Qop::AuthConf)
    }

    pub fn to_byte(qop: Option<Self>) -> u8 {
        match qop {
            None => 0,
            Some(Qop::Auth) => 1,
            Some(Qop::AuthInt) => 2,
            Some(Qop::AuthConf) => 3,
        }
    }

    pub fn from_byte(b: u8) -> DigestResult<Option<Self>> {
        match b {
            0 => Ok(None),
            1 => Ok(Some(Qop::Auth)),
            2 => Ok(Some(Qop::AuthInt)),
            3 => Ok(Some(Qop::AuthConf)),
            _ => Err(DigestError::MalformedMessage),
        }
    }
}

/// SASL confidentiality cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cipher {
    Rc4,
    TripleDes,
    Rc4_56,
    Rc4_40,
    Des,
}

impl Cipher {
    /// Fixed local preference order, strongest first.
    pub const PREFERENCE: [Cipher; 5] = [
        Cipher::Rc4,
        Cipher::TripleDes,
        Cipher::Rc4_56,
        Cipher::Rc4_40,
        Cipher::Des,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Cipher::Rc4 => "rc4",
            Cipher::TripleDes => "3des",
            Cipher::Rc4_56 => "rc4-56",
            Cipher::Rc4_40 => "rc4-40",
            Cipher::Des => "des",
        }
    }

    pub fn parse(token: &[u8]) -> Option<Self> {
        Self::PREFERENCE
            .into_iter()
            .find(|c| token.eq_ignore_ascii_case(c.as_str().as_bytes()))
    }

    pub fn to_byte(cipher: Option<Self>) -> u8 {
        match cipher {
            None => 0,
            Some(Cipher::Rc4) => 1,
            Some(Cipher::TripleDes) => 2,
            Some(Cipher::Rc4_56) => 3,
            Some(Cipher::Rc4_40) => 4,
            Some(Cipher::Des) => 5,
        }
    }

    pub fn from_byte(b: u8) -> DigestResult<Option<Self>> {
        match b {
            0 => Ok(None),
            1 => Ok(Some(Cipher::Rc4)),
            2 => Ok(Some(Cipher::TripleDes)),
            3 => Ok(Some(Cipher::Rc4_56)),
            4 => Ok(Some(Cipher::Rc4_40)),
            5 => Ok(Some(Cipher::Des)),
            _ => Err(DigestError::MalformedMessage),
        }
    }
}

/// Character set used to interpret username, realm and password.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Charset {
    #[default]
    Iso8859_1,
    Utf8,
}

impl Charset {
    pub fn as_str(self) -> &'static str {
        match self {
            Charset::Iso8859_1 => "iso-8859-1",
            Charset::Utf8 => "utf-8",
        }
    }

    pub fn parse(token: &[u8]) -> Option<Self> {
        if token.eq_ignore_ascii_case(b"utf-8") {
            Some(Charset::Utf8)
        } else if token.eq_ignore_ascii_case(b"iso-8859-1") {
            Some(Charset::Iso8859_1)
        } else {
            None
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Charset::Iso8859_1 => 1,
            Charset::Utf8 => 2,
        }
    }

    pub fn from_byte(b: u8) -> DigestResult<Self> {
        match b {
            1 => Ok(Charset::Iso8859_1),
            2 => Ok(Charset::Utf8),
            _ => Err(DigestError::MalformedMessage),
        }
    }
}

/// Enumerates all error conditions surfaced by the digest engine.
///
/// `AuthenticationFailed` deliberately covers both unknown principals and wrong
/// secrets.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DigestError {
    /// Structural or parse failure in a peer message.
    #[error("malformed digest message")]
    MalformedMessage,
    /// No mutually acceptable algorithm, QOP, cipher or charset.
    #[error("no mutually supported digest parameters")]
    Unsupported,
    /// Digest mismatch or unknown principal.
    #[error("authentication failed")]
    AuthenticationFailed,
    /// Nonce-count did not strictly increase.
    #[error("nonce-count replay detected")]
    ReplayDetected,
    /// Cross-domain target lies outside the trust forest.
    #[error("no authenticating authority for the principal's domain")]
    NoAuthenticatingAuthority,
    /// Caller-provided output buffer is too small.
    #[error("output buffer too small, {required} bytes required")]
    InsufficientBuffer { required: usize },
    /// Unknown, expired or already deleted context handle.
    #[error("invalid context handle")]
    InvalidHandle,
    /// A collaborator call failed unexpectedly.
    #[error("internal error")]
    Internal,
}

impl DigestError {
    /// Converts this error into a negative `i32` status code for host status mapping.
    pub fn to_status_code(self) -> i32 {
        match self {
            DigestError::MalformedMessage => -1,
            DigestError::Unsupported => -2,
            DigestError::AuthenticationFailed => -3,
            DigestError::ReplayDetected => -4,
            DigestError::NoAuthenticatingAuthority => -5,
            DigestError::InsufficientBuffer { .. } => -6,
            DigestError::InvalidHandle => -7,
            DigestError::Internal => -8,
        }
    }
}

/// Convenience alias for `Result<T, DigestError>`.
pub type DigestResult<T> = Result<T, DigestError>;

/// A heap-allocated byte buffer that is zeroized on drop.
///
/// Wraps a `Vec<u8>` so that passwords and other credential material are scrubbed
/// from memory when no longer needed. The `Debug` implementation redacts the contents.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecureBytes(Vec<u8>);

impl SecureBytes {
    /// Creates a buffer by copying the given slice.
    pub fn from_slice(data: &[u8]) -> Self {
        Self(data.to_vec())
    }

    /// Returns an immutable reference to the underlying bytes.
    pub fn data(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::ops::Deref for SecureBytes {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for SecureBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for SecureBytes {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl From<&str> for SecureBytes {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl fmt::Debug for SecureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureBytes([REDACTED; {}])", self.0.len())
    }
}

/// Compares two byte slices in constant time using libsodium's `sodium_memcmp`.
///
/// Returns `true` if the slices are equal, `false` otherwise. If the lengths
/// differ, returns `false` immediately (length itself is not secret).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    if a.is_empty() {
        return true;
    }
    // SAFETY: Both pointers come from valid slices. Length equality is verified before the call.
    unsafe {
        libsodium_sys::sodium_memcmp(
            a.as_ptr() as *const _,
            b.as_ptr() as *const _,
            a.len(),
        ) == 0
    }
}
