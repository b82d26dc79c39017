//! Randomized properties of the initiator steps.

use digest_agent::*;
use digest_core::hash::Secret;
use digest_core::types::*;
use proptest::prelude::*;

fn challenge(nonce: &str, algorithm: &str) -> Vec<u8> {
    format!("realm=\"example.com\",nonce=\"{nonce}\",qop=\"auth,auth-int\",algorithm={algorithm}").into_bytes()
}

fn answer(password: &str, nonce: &str, cnonce: &str, algorithm: &str) -> (Vec<u8>, digest_core::context::SecurityContext) {
    let identity = ClientIdentity::new("alice", Secret::password(password));
    let request = InitiatorRequest::new(Flavor::Http, "/index.html").with_cnonce(cnonce);
    let mut ctx = begin_context(Flavor::Http);
    let out = generate_response(&identity, &request, &challenge(nonce, algorithm), &mut ctx).unwrap();
    (out.message, ctx)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn response_is_deterministic_for_fixed_inputs(
        password in "[ -~]{1,32}",
        nonce in "[0-9a-f]{8,32}",
        cnonce in "[0-9a-f]{8,16}",
    ) {
        let (first, a) = answer(&password, &nonce, &cnonce, "MD5-sess");
        let (second, b) = answer(&password, &nonce, &cnonce, "MD5-sess");
        prop_assert_eq!(first, second);
        prop_assert_eq!(a.session_key(), b.session_key());
    }

    #[test]
    fn md5_sess_key_depends_on_the_nonce(
        password in "[ -~]{1,32}",
        nonce_a in "[0-9a-f]{16}",
        nonce_b in "[0-9a-f]{16}",
    ) {
        prop_assume!(nonce_a != nonce_b);
        let (_, a) = answer(&password, &nonce_a, "0a4f113b", "MD5-sess");
        let (_, b) = answer(&password, &nonce_b, "0a4f113b", "MD5-sess");
        prop_assert_ne!(a.session_key(), b.session_key());
    }

    #[test]
    fn md5_key_ignores_nonce_and_cnonce(
        password in "[ -~]{1,32}",
        nonce_a in "[0-9a-f]{16}",
        nonce_b in "[0-9a-f]{16}",
    ) {
        let (_, a) = answer(&password, &nonce_a, "0a4f113b", "MD5");
        let (_, b) = answer(&password, &nonce_b, "deadbeef", "MD5");
        prop_assert_eq!(a.session_key(), b.session_key());
    }

    #[test]
    fn follow_ups_strictly_increase_the_nonce_count(steps in 1usize..16) {
        let (_, mut ctx) = answer("Circle Of Life", "abcdef0123456789", "0a4f113b", "MD5");
        let mut last = ctx.nonce_count();
        for _ in 0..steps {
            generate_follow_up(&InitiatorRequest::new(Flavor::Http, "/next"), &mut ctx).unwrap();
            prop_assert!(ctx.nonce_count() > last);
            last = ctx.nonce_count();
        }
        prop_assert_eq!(last as usize, steps + 1);
    }

    #[test]
    fn random_challenges_never_panic(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let identity = ClientIdentity::new("alice", Secret::password("pw"));
        for flavor in [Flavor::Http, Flavor::Sasl] {
            let mut ctx = begin_context(flavor);
            let _ = generate_response(&identity, &InitiatorRequest::new(flavor, "/"), &data, &mut ctx);
        }
    }
}
