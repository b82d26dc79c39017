//! Secret-handling properties of the initiator.

use digest_agent::*;
use digest_core::hash::Secret;
use digest_core::types::*;

const CHALLENGE: &[u8] = b"realm=\"example.com\",nonce=\"0123456789abcdef\",qop=\"auth\",algorithm=MD5-sess,opaque=\"o\"";
const PASSWORD: &str = "correct horse battery staple";

fn established() -> (digest_core::context::SecurityContext, Vec<u8>) {
    let identity = ClientIdentity::new("alice", Secret::password(PASSWORD));
    let mut ctx = begin_context(Flavor::Http);
    let out = generate_response(&identity, &InitiatorRequest::new(Flavor::Http, "/"), CHALLENGE, &mut ctx).unwrap();
    (ctx, out.message)
}

#[test]
fn password_never_reaches_the_wire() {
    let (_, message) = established();
    let text = String::from_utf8(message).unwrap();
    assert!(!text.contains(PASSWORD));
    assert!(text.contains("username=\"alice\""));
}

#[test]
fn identity_debug_redacts_the_secret() {
    let identity = ClientIdentity::new("alice", Secret::password(PASSWORD)).with_authzid("admin");
    let rendered = format!("{identity:?}");
    assert!(rendered.contains("alice"));
    assert!(!rendered.contains(PASSWORD));
}

#[test]
fn context_debug_redacts_the_session_key() {
    let (ctx, _) = established();
    let rendered = format!("{ctx:?}");
    assert!(rendered.contains("[REDACTED]"));
    assert!(!rendered.contains(PASSWORD));
}

#[test]
fn each_response_draws_a_fresh_cnonce() {
    let (a, _) = established();
    let (b, _) = established();
    assert_ne!(a.cnonce, b.cnonce);
    assert_ne!(a.session_key(), b.session_key());
    assert_eq!(a.cnonce.len(), 2 * RANDOM_TOKEN_BYTES);
}

#[test]
fn closing_drops_the_session_key() {
    let (mut ctx, _) = established();
    assert!(ctx.session_key().is_some());
    ctx.close();
    assert!(ctx.session_key().is_none());
    assert!(ctx.nonce.is_empty());
}
