// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

//! Binary codec for the cross-domain passthrough request and reply.
//!
//! Layout: `magic(4) | version(1) | kind(1) | header | records`, where every
//! record is `tag(1) | length(2, big-endian) | value`. Decoding is strict:
//! unknown tags, repeated tags, missing required tags, oversized fields and
//! trailing bytes are all rejected.

use std::fmt;

use crate::hash::SessionKey;
use crate::types::{
    Algorithm, Charset, Cipher, DigestError, DigestResult, Flavor, Qop, MAX_TOKEN_LENGTH,
    MD5_HASH_LENGTH,
};

pub const BLOB_MAGIC: [u8; 4] = *b"DGPT";
pub const BLOB_VERSION: u8 = 1;

const KIND_REQUEST: u8 = 1;
const KIND_REPLY: u8 = 2;

/// Set by the forwarding domain; the receiver must verify locally and never forward again.
pub const FLAG_FORWARDED: u8 = 0x01;
/// Acceptor-local marker recording that the local principal lookup already ran.
/// Stripped before a request goes on the wire.
pub const FLAG_LOCAL_LOOKUP_DONE: u8 = 0x02;
const WIRE_FLAGS: u8 = FLAG_FORWARDED;

/// Largest authorization-data blob carried in a reply.
pub const MAX_AUTHORIZATION_DATA_LENGTH: usize = 16 * 1024;
/// Largest encoded blob accepted by either decoder.
pub const MAX_BLOB_LENGTH: usize = 64 * 1024;

const HEADER_LENGTH: usize = BLOB_MAGIC.len() + 2;
const REQUEST_FIXED_LENGTH: usize = 6;
const REPLY_FIXED_LENGTH: usize = 4;

mod tag {
    pub const USERNAME: u8 = 1;
    pub const REALM: u8 = 2;
    pub const NONCE: u8 = 3;
    pub const CNONCE: u8 = 4;
    pub const NC: u8 = 5;
    pub const METHOD: u8 = 6;
    pub const URI: u8 = 7;
    pub const ENTITY_HASH: u8 = 8;
    pub const AUTHZID: u8 = 9;
    pub const RESPONSE: u8 = 10;
    pub const DOMAIN: u8 = 11;

    pub const ACCOUNT: u8 = 32;
    pub const REPLY_DOMAIN: u8 = 33;
    pub const SESSION_KEY: u8 = 34;
    pub const AUTHORIZATION_DATA: u8 = 35;
}

/// Everything the authoritative domain needs to verify one response.
#[derive(Clone, PartialEq, Eq)]
pub struct PassthroughRequest {
    pub flags: u8,
    pub flavor: Flavor,
    pub algorithm: Algorithm,
    pub qop: Option<Qop>,
    pub cipher: Option<Cipher>,
    pub charset: Charset,
    pub username: Vec<u8>,
    pub realm: Vec<u8>,
    pub nonce: Vec<u8>,
    pub cnonce: Vec<u8>,
    pub nc: Vec<u8>,
    pub method: Vec<u8>,
    pub uri: Vec<u8>,
    pub entity_hash: Option<Vec<u8>>,
    pub authzid: Option<Vec<u8>>,
    pub response: Vec<u8>,
    /// Domain the request is addressed to.
    pub domain: Vec<u8>,
}

impl fmt::Debug for PassthroughRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassthroughRequest")
            .field("flags", &self.flags)
            .field("flavor", &self.flavor)
            .field("algorithm", &self.algorithm)
            .field("qop", &self.qop)
            .field("username_len", &self.username.len())
            .field("domain", &String::from_utf8_lossy(&self.domain))
            .finish_non_exhaustive()
    }
}

/// Answer from the authoritative domain. `status` is zero on success or a
/// [`DigestError::to_status_code`] value.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PassthroughReply {
    pub status: i32,
    pub account: Vec<u8>,
    pub domain: Vec<u8>,
    pub session_key: Option<SessionKey>,
    pub authorization_data: Vec<u8>,
}

impl PassthroughReply {
    pub fn success(
        account: Vec<u8>,
        domain: Vec<u8>,
        session_key: SessionKey,
        authorization_data: Vec<u8>,
    ) -> Self {
        Self {
            status: 0,
            account,
            domain,
            session_key: Some(session_key),
            authorization_data,
        }
    }

    pub fn failure(error: DigestError) -> Self {
        Self {
            status: error.to_status_code(),
            account: Vec::new(),
            domain: Vec::new(),
            session_key: None,
            authorization_data: Vec::new(),
        }
    }

    /// Converts the status into a result.
    pub fn check_status(&self) -> DigestResult<()> {
        match status_to_error(self.status) {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

fn status_to_error(status: i32) -> Option<DigestError> {
    match status {
        0 => None,
        -1 => Some(DigestError::MalformedMessage),
        -2 => Some(DigestError::Unsupported),
        -3 => Some(DigestError::AuthenticationFailed),
        -4 => Some(DigestError::ReplayDetected),
        -5 => Some(DigestError::NoAuthenticatingAuthority),
        -7 => Some(DigestError::InvalidHandle),
        _ => Some(DigestError::Internal),
    }
}

struct BlobWriter {
    buf: Vec<u8>,
}

impl BlobWriter {
    fn new(kind: u8) -> Self {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&BLOB_MAGIC);
        buf.push(BLOB_VERSION);
        buf.push(kind);
        Self { buf }
    }

    fn record(&mut self, tag: u8, value: &[u8], max: usize) -> DigestResult<()> {
        if value.len() > max {
            return Err(DigestError::Internal);
        }
        let len = u16::try_from(value.len()).map_err(|_| DigestError::Internal)?;
        self.buf.push(tag);
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(value);
        Ok(())
    }

    fn finish(self) -> DigestResult<Vec<u8>> {
        if self.buf.len() > MAX_BLOB_LENGTH {
            return Err(DigestError::Internal);
        }
        Ok(self.buf)
    }
}

struct BlobReader<'a> {
    data: &'a [u8],
    pos: usize,
    seen: u64,
}

impl<'a> BlobReader<'a> {
    fn open(data: &'a [u8], kind: u8, fixed: usize) -> DigestResult<(Self, &'a [u8])> {
        if data.len() > MAX_BLOB_LENGTH || data.len() < HEADER_LENGTH + fixed {
            return Err(DigestError::MalformedMessage);
        }
        if data[..BLOB_MAGIC.len()] != BLOB_MAGIC
            || data[BLOB_MAGIC.len()] != BLOB_VERSION
            || data[BLOB_MAGIC.len() + 1] != kind
        {
            return Err(DigestError::MalformedMessage);
        }
        let header = &data[HEADER_LENGTH..HEADER_LENGTH + fixed];
        Ok((
            Self {
                data,
                pos: HEADER_LENGTH + fixed,
                seen: 0,
            },
            header,
        ))
    }

    fn next(&mut self) -> DigestResult<Option<(u8, &'a [u8])>> {
        if self.pos == self.data.len() {
            return Ok(None);
        }
        if self.data.len() - self.pos < 3 {
            return Err(DigestError::MalformedMessage);
        }
        let tag = self.data[self.pos];
        let len = usize::from(u16::from_be_bytes([
            self.data[self.pos + 1],
            self.data[self.pos + 2],
        ]));
        let start = self.pos + 3;
        let end = start.checked_add(len).ok_or(DigestError::MalformedMessage)?;
        if end > self.data.len() {
            return Err(DigestError::MalformedMessage);
        }
        let bit = 1u64 << (tag & 63);
        if self.seen & bit != 0 {
            return Err(DigestError::MalformedMessage);
        }
        self.seen |= bit;
        self.pos = end;
        Ok(Some((tag, &self.data[start..end])))
    }
}

fn bounded(value: &[u8], max: usize) -> DigestResult<Vec<u8>> {
    if value.len() > max {
        return Err(DigestError::MalformedMessage);
    }
    Ok(value.to_vec())
}

fn required(value: Option<Vec<u8>>) -> DigestResult<Vec<u8>> {
    value.ok_or(DigestError::MalformedMessage)
}

/// Encodes a passthrough request. Local-only flags are stripped.
///
/// # Errors
///
/// Returns [`DigestError::Internal`] if a field exceeds its bound.
pub fn encode_request(request: &PassthroughRequest) -> DigestResult<Vec<u8>> {
    let mut w = BlobWriter::new(KIND_REQUEST);
    w.buf.extend_from_slice(&[
        request.flags & WIRE_FLAGS,
        request.flavor.to_byte(),
        request.algorithm.to_byte(),
        Qop::to_byte(request.qop),
        Cipher::to_byte(request.cipher),
        request.charset.to_byte(),
    ]);
    w.record(tag::USERNAME, &request.username, MAX_TOKEN_LENGTH)?;
    w.record(tag::REALM, &request.realm, MAX_TOKEN_LENGTH)?;
    w.record(tag::NONCE, &request.nonce, MAX_TOKEN_LENGTH)?;
    w.record(tag::CNONCE, &request.cnonce, MAX_TOKEN_LENGTH)?;
    w.record(tag::NC, &request.nc, MAX_TOKEN_LENGTH)?;
    w.record(tag::METHOD, &request.method, MAX_TOKEN_LENGTH)?;
    w.record(tag::URI, &request.uri, MAX_TOKEN_LENGTH)?;
    if let Some(entity_hash) = &request.entity_hash {
        w.record(tag::ENTITY_HASH, entity_hash, MAX_TOKEN_LENGTH)?;
    }
    if let Some(authzid) = &request.authzid {
        w.record(tag::AUTHZID, authzid, MAX_TOKEN_LENGTH)?;
    }
    w.record(tag::RESPONSE, &request.response, MAX_TOKEN_LENGTH)?;
    w.record(tag::DOMAIN, &request.domain, MAX_TOKEN_LENGTH)?;
    w.finish()
}

/// Decodes a passthrough request.
///
/// # Errors
///
/// Returns [`DigestError::MalformedMessage`] on any structural defect.
pub fn decode_request(data: &[u8]) -> DigestResult<PassthroughRequest> {
    let (mut r, header) = BlobReader::open(data, KIND_REQUEST, REQUEST_FIXED_LENGTH)?;
    let flags = header[0];
    if flags & !WIRE_FLAGS != 0 {
        return Err(DigestError::MalformedMessage);
    }

    let mut username = None;
    let mut realm = None;
    let mut nonce = None;
    let mut cnonce = None;
    let mut nc = None;
    let mut method = None;
    let mut uri = None;
    let mut entity_hash = None;
    let mut authzid = None;
    let mut response = None;
    let mut domain = None;

    while let Some((t, value)) = r.next()? {
        let slot = match t {
            tag::USERNAME => &mut username,
            tag::REALM => &mut realm,
            tag::NONCE => &mut nonce,
            tag::CNONCE => &mut cnonce,
            tag::NC => &mut nc,
            tag::METHOD => &mut method,
            tag::URI => &mut uri,
            tag::ENTITY_HASH => &mut entity_hash,
            tag::AUTHZID => &mut authzid,
            tag::RESPONSE => &mut response,
            tag::DOMAIN => &mut domain,
            _ => return Err(DigestError::MalformedMessage),
        };
        *slot = Some(bounded(value, MAX_TOKEN_LENGTH)?);
    }

    Ok(PassthroughRequest {
        flags,
        flavor: Flavor::from_byte(header[1])?,
        algorithm: Algorithm::from_byte(header[2])?,
        qop: Qop::from_byte(header[3])?,
        cipher: Cipher::from_byte(header[4])?,
        charset: Charset::from_byte(header[5])?,
        username: required(username)?,
        realm: required(realm)?,
        nonce: required(nonce)?,
        cnonce: required(cnonce)?,
        nc: required(nc)?,
        method: required(method)?,
        uri: required(uri)?,
        entity_hash,
        authzid,
        response: required(response)?,
        domain: required(domain)?,
    })
}

/// Encodes a passthrough reply.
///
/// # Errors
///
/// Returns [`DigestError::Internal`] if a field exceeds its bound.
pub fn encode_reply(reply: &PassthroughReply) -> DigestResult<Vec<u8>> {
    let mut w = BlobWriter::new(KIND_REPLY);
    w.buf.extend_from_slice(&reply.status.to_be_bytes());
    w.record(tag::ACCOUNT, &reply.account, MAX_TOKEN_LENGTH)?;
    w.record(tag::REPLY_DOMAIN, &reply.domain, MAX_TOKEN_LENGTH)?;
    if let Some(key) = &reply.session_key {
        w.record(tag::SESSION_KEY, key.as_bytes(), MD5_HASH_LENGTH)?;
    }
    w.record(
        tag::AUTHORIZATION_DATA,
        &reply.authorization_data,
        MAX_AUTHORIZATION_DATA_LENGTH,
    )?;
    w.finish()
}

/// Decodes a passthrough reply. A success status without a session key is malformed.
///
/// # Errors
///
/// Returns [`DigestError::MalformedMessage`] on any structural defect.
pub fn decode_reply(data: &[u8]) -> DigestResult<PassthroughReply> {
    let (mut r, header) = BlobReader::open(data, KIND_REPLY, REPLY_FIXED_LENGTH)?;
    let status = i32::from_be_bytes([header[0], header[1], header[2], header[3]]);

    let mut account = None;
    let mut domain = None;
    let mut session_key = None;
    let mut authorization_data = None;

    while let Some((t, value)) = r.next()? {
        match t {
            tag::ACCOUNT => account = Some(bounded(value, MAX_TOKEN_LENGTH)?),
            tag::REPLY_DOMAIN => domain = Some(bounded(value, MAX_TOKEN_LENGTH)?),
            tag::SESSION_KEY => {
                let bytes: [u8; MD5_HASH_LENGTH] =
                    value.try_into().map_err(|_| DigestError::MalformedMessage)?;
                session_key = Some(SessionKey::from_bytes(bytes));
            }
            tag::AUTHORIZATION_DATA => {
                authorization_data = Some(bounded(value, MAX_AUTHORIZATION_DATA_LENGTH)?)
            }
            _ => return Err(DigestError::MalformedMessage),
        }
    }

    if status == 0 && session_key.is_none() {
        return Err(DigestError::MalformedMessage);
    }
    Ok(PassthroughReply {
        status,
        account: required(account)?,
        domain: required(domain)?,
        session_key,
        authorization_data: required(authorization_data)?,
    })
}
