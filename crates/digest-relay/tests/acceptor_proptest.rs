//! Randomized properties of the acceptor steps.

use digest_agent::{ClientIdentity, InitiatorRequest};
use digest_core::context::ContextState;
use digest_core::hash::Secret;
use digest_core::types::*;
use digest_relay::*;
use proptest::prelude::*;

fn store() -> MemoryPrincipalStore {
    MemoryPrincipalStore::new().with_principal("alice", PrincipalRecord::new(Secret::password("wonderland")))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn random_responses_never_establish(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        for flavor in [Flavor::Http, Flavor::Sasl] {
            let policy = AcceptorPolicy::new(flavor, "example.com");
            let mut ctx = digest_relay::begin_context(flavor);
            issue_challenge(&policy, &mut ctx, false).unwrap();
            let result = verify_response(&policy, &store(), None, &data, &mut ctx);
            prop_assert!(result.is_err());
            prop_assert_eq!(ctx.state(), ContextState::ChallengeIssued);
            prop_assert!(ctx.session_key().is_none());
        }
    }

    #[test]
    fn reconnects_only_accept_advancing_nonce_counts(
        count in 1usize..8,
        order in proptest::collection::vec(0usize..8, 1..16),
    ) {
        let policy = AcceptorPolicy::new(Flavor::Http, "example.com");
        let mut acceptor = digest_relay::begin_context(Flavor::Http);
        let challenge = issue_challenge(&policy, &mut acceptor, false).unwrap().message;

        let identity = ClientIdentity::new("alice", Secret::password("wonderland"));
        let mut initiator = digest_agent::begin_context(Flavor::Http);
        let first = digest_agent::generate_response(
            &identity,
            &InitiatorRequest::new(Flavor::Http, "/"),
            &challenge,
            &mut initiator,
        )
        .unwrap()
        .message;
        verify_response(&policy, &store(), None, &first, &mut acceptor).unwrap();

        // Follow-up `i` carries nc = i + 2.
        let follow_ups: Vec<Vec<u8>> = (0..count)
            .map(|i| {
                let request = InitiatorRequest::new(Flavor::Http, &format!("/page/{i}"));
                digest_agent::generate_follow_up(&request, &mut initiator).unwrap().message
            })
            .collect();

        let mut high_water = 1u32;
        for index in order.into_iter().filter(|&i| i < count) {
            let nc = index as u32 + 2;
            let result = verify_response(&policy, &store(), None, &follow_ups[index], &mut acceptor);
            if nc > high_water {
                prop_assert!(result.is_ok());
                high_water = nc;
            } else {
                prop_assert_eq!(result, Err(DigestError::ReplayDetected));
            }
            prop_assert_eq!(acceptor.nonce_count(), high_water);
            prop_assert!(acceptor.is_established());
        }
    }
}
