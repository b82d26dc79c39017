// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

//! Wire codec for comma-separated `name=value` directive lists.
//!
//! Parsing never copies: every recorded value borrows the message buffer and is
//! unescaped lazily. Serialization builds into a growable buffer with a bounds
//! check on every append.

use std::borrow::Cow;

use crate::types::{DigestError, DigestResult, MAX_MESSAGE_LENGTH, MAX_TOKEN_LENGTH};

/// Every directive name the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    Username,
    Realm,
    Nonce,
    Cnonce,
    Nc,
    Qop,
    Algorithm,
    Cipher,
    Charset,
    Uri,
    DigestUri,
    Method,
    EntityHash,
    Maxbuf,
    Opaque,
    Response,
    Rspauth,
    Authzid,
    Stale,
    Domain,
    Nextnonce,
}

impl Directive {
    pub const COUNT: usize = 21;

    pub const ALL: [Directive; Self::COUNT] = [
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
        Directive::Rspauth,
        Directive::Authzid,
        Directive::Stale,
        Directive::Domain,
        Directive::Nextnonce,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Directive::Username => "username",
            Directive::Realm => "realm",
            Directive::Nonce => "nonce",
            Directive::Cnonce => "cnonce",
            Directive::Nc => "nc",
            Directive::Qop => "qop",
            Directive::Algorithm => "algorithm",
            Directive::Cipher => "cipher",
            Directive::Charset => "charset",
            Directive::Uri => "uri",
            Directive::DigestUri => "digest-uri",
            Directive::Method => "method",
            Directive::EntityHash => "entity-hash",
            Directive::Maxbuf => "maxbuf",
            Directive::Opaque => "opaque",
            Directive::Response => "response",
            Directive::Rspauth => "rspauth",
            Directive::Authzid => "authzid",
            Directive::Stale => "stale",
            Directive::Domain => "domain",
            Directive::Nextnonce => "nextnonce",
        }
    }

    /// Directive names are case-insensitive on the wire.
    pub fn from_name(name: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|d| name.eq_ignore_ascii_case(d.name().as_bytes()))
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether RFC 2617 / RFC 2831 write this directive as a quoted-string.
    pub fn quoted_by_default(self) -> bool {
        matches!(
            self,
            Directive::Username
                | Directive::Realm
                | Directive::Nonce
                | Directive::Cnonce
                | Directive::Uri
                | Directive::DigestUri
                | Directive::Opaque
                | Directive::Authzid
                | Directive::Domain
                | Directive::Nextnonce
        )
    }
}

/// A directive value borrowed from the message buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectiveValue<'a> {
    raw: &'a [u8],
    quoted: bool,
}

impl<'a> DirectiveValue<'a> {
    /// Bytes exactly as they appear between the quotes, escapes included.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    pub fn was_quoted(&self) -> bool {
        self.quoted
    }

    /// Value with backslash escapes removed. Borrows when nothing was escaped.
    pub fn unescaped(&self) -> Cow<'a, [u8]> {
        if !self.quoted || !self.raw.contains(&b'\\') {
            return Cow::Borrowed(self.raw);
        }
        let mut out = Vec::with_capacity(self.raw.len());
        let mut escaped = false;
        for &b in self.raw {
            if !escaped && b == b'\\' {
                escaped = true;
                continue;
            }
            escaped = false;
            out.push(b);
        }
        Cow::Owned(out)
    }

    /// Unescaped value as text.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::MalformedMessage`] if the value is not valid UTF-8.
    pub fn to_str(&self) -> DigestResult<Cow<'a, str>> {
        match self.unescaped() {
            Cow::Borrowed(b) => std::str::from_utf8(b)
                .map(Cow::Borrowed)
                .map_err(|_| DigestError::MalformedMessage),
            Cow::Owned(v) => String::from_utf8(v)
                .map(Cow::Owned)
                .map_err(|_| DigestError::MalformedMessage),
        }
    }

    fn unescaped_len(&self) -> usize {
        if !self.quoted {
            return self.raw.len();
        }
        let mut len = 0;
        let mut escaped = false;
        for &b in self.raw {
            if !escaped && b == b'\\' {
                escaped = true;
                continue;
            }
            escaped = false;
            len += 1;
        }
        len
    }
}

/// Structured view of one protocol message.
///
/// Holds the presence count of every recognized directive and the value of each
/// occurrence in message order. Cardinality is not enforced here; see
/// [`crate::check::check_directives`].
#[derive(Debug, Clone, Default)]
pub struct DigestParameterSet<'a> {
    counts: [u16; Directive::COUNT],
    entries: Vec<(Directive, DirectiveValue<'a>)>,
}

impl<'a> DigestParameterSet<'a> {
    pub fn count(&self, directive: Directive) -> usize {
        usize::from(self.counts[directive.index()])
    }

    pub fn contains(&self, directive: Directive) -> bool {
        self.count(directive) > 0
    }

    /// First occurrence of `directive`.
    pub fn get(&self, directive: Directive) -> Option<DirectiveValue<'a>> {
        self.entries
            .iter()
            .find(|(d, _)| *d == directive)
            .map(|(_, v)| *v)
    }

    /// Every occurrence of `directive`, in message order.
    pub fn all(&self, directive: Directive) -> impl Iterator<Item = DirectiveValue<'a>> + '_ {
        self.entries
            .iter()
            .filter(move |(d, _)| *d == directive)
            .map(|(_, v)| *v)
    }

    /// Unescaped first occurrence of `directive`.
    pub fn value(&self, directive: Directive) -> Option<Cow<'a, [u8]>> {
        self.get(directive).map(|v| v.unescaped())
    }

    pub fn entries(&self) -> &[(Directive, DirectiveValue<'a>)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&mut self, directive: Directive, value: DirectiveValue<'a>) {
        let slot = &mut self.counts[directive.index()];
        *slot = slot.saturating_add(1);
        self.entries.push((directive, value));
    }
}

fn is_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

fn skip_ws(msg: &[u8], mut pos: usize) -> usize {
    while pos < msg.len() && is_ws(msg[pos]) {
        pos += 1;
    }
    pos
}

fn trim(mut s: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = s {
        if !is_ws(*first) {
            break;
        }
        s = rest;
    }
    while let [rest @ .., last] = s {
        if !is_ws(*last) {
            break;
        }
        s = rest;
    }
    s
}

/// Skips a leading HTTP `Digest` auth-scheme token if present.
fn skip_scheme(msg: &[u8]) -> usize {
    const SCHEME: &[u8] = b"digest";
    let start = skip_ws(msg, 0);
    let end = start + SCHEME.len();
    if msg.len() > end
        && msg[start..end].eq_ignore_ascii_case(SCHEME)
        && is_ws(msg[end])
    {
        end
    } else {
        start
    }
}

/// Parses a directive list, recording only directives named in `allowed`.
///
/// Unrecognized or disallowed names are skipped. Empty list elements are
/// tolerated as the RFC `#rule` requires.
///
/// # Errors
///
/// Returns [`DigestError::MalformedMessage`] if the message exceeds
/// [`MAX_MESSAGE_LENGTH`], a quoted-string is not terminated, a name lacks `=`,
/// garbage follows a value, or any value exceeds [`MAX_TOKEN_LENGTH`].
pub fn parse<'a>(message: &'a [u8], allowed: &[Directive]) -> DigestResult<DigestParameterSet<'a>> {
    if message.len() > MAX_MESSAGE_LENGTH {
        return Err(DigestError::MalformedMessage);
    }
    let mut params = DigestParameterSet::default();
    let mut pos = skip_scheme(message);

    loop {
        while pos < message.len() && (is_ws(message[pos]) || message[pos] == b',') {
            pos += 1;
        }
        if pos >= message.len() {
            break;
        }

        let name_start = pos;
        while pos < message.len() && message[pos] != b'=' && message[pos] != b',' {
            pos += 1;
        }
        if pos >= message.len() || message[pos] != b'=' {
            return Err(DigestError::MalformedMessage);
        }
        let name = trim(&message[name_start..pos]);
        if name.is_empty() {
            return Err(DigestError::MalformedMessage);
        }
        pos = skip_ws(message, pos + 1);

        let value = if pos < message.len() && message[pos] == b'"' {
            let start = pos + 1;
            let mut i = start;
            let mut escaped = false;
            loop {
                if i >= message.len() {
                    return Err(DigestError::MalformedMessage);
                }
                let b = message[i];
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    break;
                }
                i += 1;
            }
            pos = skip_ws(message, i + 1);
            if pos < message.len() && message[pos] != b',' {
                return Err(DigestError::MalformedMessage);
            }
            DirectiveValue { raw: &message[start..i], quoted: true }
        } else {
            let start = pos;
            while pos < message.len() && message[pos] != b',' {
                pos += 1;
            }
            let token = trim(&message[start..pos]);
            if token.iter().any(|&b| b == b'"' || is_ws(b)) {
                return Err(DigestError::MalformedMessage);
            }
            DirectiveValue { raw: token, quoted: false }
        };

        if value.unescaped_len() > MAX_TOKEN_LENGTH {
            return Err(DigestError::MalformedMessage);
        }

        match Directive::from_name(name) {
            Some(d) if allowed.contains(&d) => params.record(d, value),
            Some(d) => tracing::trace!(directive = d.name(), "skipping directive not allowed here"),
            None => tracing::trace!(name_len = name.len(), "skipping unrecognized directive"),
        }
    }

    Ok(params)
}

/// Splits a comma-separated list value such as `qop="auth,auth-int"`.
pub fn split_list(value: &[u8]) -> impl Iterator<Item = &[u8]> {
    value.split(|&b| b == b',').map(trim).filter(|t| !t.is_empty())
}

fn needs_quoting(value: &[u8]) -> bool {
    value.is_empty()
        || value
            .iter()
            .any(|&b| matches!(b, b',' | b'"' | b'\\' | b'=') || is_ws(b))
}

/// Incremental serializer for directive lists.
///
/// Directives are emitted in insertion order, which keeps output stable for a
/// given sequence of calls.
#[derive(Debug, Default)]
pub struct DirectiveWriter {
    buf: Vec<u8>,
}

impl DirectiveWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `directive` using its conventional quoting.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::MalformedMessage`] if `value` exceeds [`MAX_TOKEN_LENGTH`].
    pub fn push(&mut self, directive: Directive, value: &[u8]) -> DigestResult<()> {
        if directive.quoted_by_default() {
            self.push_quoted(directive, value)
        } else {
            self.push_token(directive, value)
        }
    }

    /// Appends `directive` as a quoted-string, escaping `"` and `\`.
    pub fn push_quoted(&mut self, directive: Directive, value: &[u8]) -> DigestResult<()> {
        if value.len() > MAX_TOKEN_LENGTH {
            return Err(DigestError::MalformedMessage);
        }
        self.separator(directive);
        self.buf.push(b'"');
        for &b in value {
            if b == b'"' || b == b'\\' {
                self.buf.push(b'\\');
            }
            self.buf.push(b);
        }
        self.buf.push(b'"');
        Ok(())
    }

    /// Appends `directive` as a bare token, falling back to quoting when the
    /// value contains separators.
    pub fn push_token(&mut self, directive: Directive, value: &[u8]) -> DigestResult<()> {
        if needs_quoting(value) {
            return self.push_quoted(directive, value);
        }
        if value.len() > MAX_TOKEN_LENGTH {
            return Err(DigestError::MalformedMessage);
        }
        self.separator(directive);
        self.buf.extend_from_slice(value);
        Ok(())
    }

    /// Appends a quoted, comma-joined list (`qop="auth,auth-int"`).
    pub fn push_list<'v>(
        &mut self,
        directive: Directive,
        items: impl IntoIterator<Item = &'v str>,
    ) -> DigestResult<()> {
        let joined = items.into_iter().collect::<Vec<_>>().join(",");
        self.push_quoted(directive, joined.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the finished message.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::Internal`] if the message outgrew [`MAX_MESSAGE_LENGTH`].
    pub fn finish(self) -> DigestResult<Vec<u8>> {
        if self.buf.len() > MAX_MESSAGE_LENGTH {
            return Err(DigestError::Internal);
        }
        Ok(self.buf)
    }

    fn separator(&mut self, directive: Directive) {
        if !self.buf.is_empty() {
            self.buf.push(b',');
        }
        self.buf.extend_from_slice(directive.name().as_bytes());
        self.buf.push(b'=');
    }
}

/// Serializes a parsed parameter set back to wire form, preserving order and
/// the original quoting of each value.
pub fn serialize(params: &DigestParameterSet<'_>) -> DigestResult<Vec<u8>> {
    let mut writer = DirectiveWriter::new();
    for (directive, value) in params.entries() {
        let unescaped = value.unescaped();
        if value.was_quoted() {
            writer.push_quoted(*directive, &unescaped)?;
        } else {
            writer.push_token(*directive, &unescaped)?;
        }
    }
    writer.finish()
}
