use criterion::{criterion_group, criterion_main, Criterion};
use digest_core::check::{allowed_directives, check_directives, CheckMode, MessageKind};
use digest_core::crypto;
use digest_core::directive;
use digest_core::hash::*;
use digest_core::types::*;

const RESPONSE: &[u8] = br#"username="chris",realm="elwood.innosoft.com",nonce="OA6MG9tEQGm2hh",nc=00000001,cnonce="OA6MHXh6VqTrRk",digest-uri="imap/elwood.innosoft.com",response=d388dad90d4bbd760a152321f2143af7,qop=auth"#;

fn bench_hash7(c: &mut Criterion) {
    c.bench_function("md5/hash7_three_parts", |b| {
        b.iter(|| {
            crypto::hash7(&[
                Some("Mufasa".as_bytes()),
                Some("testrealm@host.com".as_bytes()),
                Some("Circle Of Life".as_bytes()),
            ])
            .unwrap()
        })
    });
}

fn bench_random_token(c: &mut Criterion) {
    c.bench_function("sodium/random_token", |b| {
        b.iter(|| crypto::random_token().unwrap())
    });
}

fn bench_session_key(c: &mut Criterion) {
    let secret = Secret::password("secret");
    c.bench_function("digest/session_key_md5_sess", |b| {
        b.iter(|| {
            compute_session_key(&SessionKeyInput {
                flavor: Flavor::Sasl,
                algorithm: Algorithm::Md5Sess,
                charset: Charset::default(),
                username: b"chris",
                realm: b"elwood.innosoft.com",
                secret: &secret,
                nonce: b"OA6MG9tEQGm2hh",
                cnonce: b"OA6MHXh6VqTrRk",
                authzid: None,
            })
            .unwrap()
        })
    });
}

fn bench_request_digest(c: &mut Criterion) {
    let key = SessionKey::from_bytes([0x42; MD5_HASH_LENGTH]);
    c.bench_function("digest/request_digest", |b| {
        b.iter(|| {
            compute_request_digest(&DigestInput {
                session_key: &key,
                nonce: b"OA6MG9tEQGm2hh",
                nc: b"00000001",
                cnonce: b"OA6MHXh6VqTrRk",
                qop: Some(Qop::Auth),
                method: SASL_METHOD.as_bytes(),
                uri: b"imap/elwood.innosoft.com",
                entity_hash: None,
            })
            .unwrap()
        })
    });
}

fn bench_parse_and_check(c: &mut Criterion) {
    let allowed = allowed_directives(MessageKind::Response);
    let mode = CheckMode::new(Flavor::Sasl, MessageKind::Response);
    c.bench_function("codec/parse_and_check_response", |b| {
        b.iter(|| {
            let params = directive::parse(RESPONSE, allowed).unwrap();
            check_directives(&params, mode).unwrap();
            params.entries().len()
        })
    });
}

criterion_group!(
    benches,
    bench_hash7,
    bench_random_token,
    bench_session_key,
    bench_request_digest,
    bench_parse_and_check
);
criterion_main!(benches);
