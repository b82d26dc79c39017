use std::sync::Arc;
use std::time::Duration;

use digest_agent::{ClientIdentity, InitiatorRequest};
use digest_core::context::{ContextAttributes, ContextState, SecurityStatus};
use digest_core::hash::Secret;
use digest_core::types::{Cipher, Flavor, Qop, Role};
use digest_package::*;
use digest_relay::passthrough::{DomainForwarder, ForwardError, NameResolver, ResolvedName, TrustTopology};
use digest_relay::{Forwarder, MemoryPrincipalStore, PrincipalRecord};

const BUF: usize = 4096;

fn principals() -> Arc<MemoryPrincipalStore> {
    Arc::new(
        MemoryPrincipalStore::new()
            .with_principal("Mufasa", PrincipalRecord::new(Secret::password("Circle Of Life")))
            .with_principal("chris", PrincipalRecord::new(Secret::password("secret"))),
    )
}

fn package_with(config: PackageConfig) -> DigestPackage {
    DigestPackage::new(config, principals()).unwrap()
}

fn package() -> DigestPackage {
    package_with(PackageConfig::new("testrealm@host.com"))
}

struct Peers {
    server: CredentialHandle,
    client: CredentialHandle,
}

fn peers(pkg: &DigestPackage, username: &str, password: &str) -> Peers {
    Peers {
        server: pkg.acquire_credential(Credential::inbound()),
        client: pkg.acquire_credential(Credential::outbound(ClientIdentity::new(
            username,
            Secret::password(password),
        ))),
    }
}

fn http_request(uri: &str) -> InitiatorRequest {
    InitiatorRequest::new(Flavor::Http, uri)
}

fn sasl_request() -> InitiatorRequest {
    InitiatorRequest::new(Flavor::Sasl, "imap/elwood.innosoft.com")
}

/// Challenge plus initiator response; returns both handles and the response.
fn http_exchange(pkg: &DigestPackage, p: &Peers) -> (ContextHandle, ContextHandle, Vec<u8>) {
    let mut buf = vec![0u8; BUF];
    let challenge = pkg.accept_inbound(p.server, None, Flavor::Http, None, &mut buf).unwrap();
    assert_eq!(challenge.status, SecurityStatus::ContinueNeeded);
    let challenge_text = buf[..challenge.written].to_vec();

    let answer = pkg
        .initiate_outbound(p.client, None, &http_request("/dir/index.html"), Some(&challenge_text), &mut buf)
        .unwrap();
    assert_eq!(answer.status, SecurityStatus::Ok);
    (challenge.handle, answer.handle, buf[..answer.written].to_vec())
}

#[test]
fn http_round_trip_locates_the_context_by_opaque() {
    let pkg = package();
    let p = peers(&pkg, "Mufasa", "Circle Of Life");
    let (server, _, response) = http_exchange(&pkg, &p);

    let mut buf = vec![0u8; BUF];
    let done = pkg.accept_inbound(p.server, None, Flavor::Http, Some(&response), &mut buf).unwrap();
    assert_eq!(done.handle, server);
    assert_eq!(done.status, SecurityStatus::Ok);
    assert_eq!(done.written, 0);

    let info = pkg.query_context(server).unwrap();
    assert_eq!(info.role, Role::Acceptor);
    assert_eq!(info.state, ContextState::Established);
    assert_eq!(info.principal, "Mufasa");
    assert_eq!(info.domain, "LOCAL");
    assert_eq!(info.qop, Some(Qop::Auth));
    assert_eq!(info.nonce_count, 1);

    let stats = pkg.statistics();
    assert_eq!(stats.contexts_created, 2);
    assert_eq!(stats.authentications_succeeded, 1);
    assert_eq!(stats.authentications_failed, 0);
}

#[test]
fn http_follow_up_reconnects_and_replay_is_rejected() {
    let pkg = package();
    let p = peers(&pkg, "Mufasa", "Circle Of Life");
    let (server, client, response) = http_exchange(&pkg, &p);
    let mut buf = vec![0u8; BUF];
    pkg.accept_inbound(p.server, None, Flavor::Http, Some(&response), &mut buf).unwrap();

    let follow = pkg
        .initiate_outbound(p.client, Some(client), &http_request("/dir/other.html"), None, &mut buf)
        .unwrap();
    assert_eq!(follow.handle, client);
    let follow_text = buf[..follow.written].to_vec();
    assert!(std::str::from_utf8(&follow_text).unwrap().contains("nc=00000002"));

    let again = pkg.accept_inbound(p.server, None, Flavor::Http, Some(&follow_text), &mut buf).unwrap();
    assert_eq!(again.handle, server);
    assert_eq!(pkg.query_context(server).unwrap().nonce_count, 2);

    let replay = pkg.accept_inbound(p.server, None, Flavor::Http, Some(&follow_text), &mut buf);
    assert_eq!(replay, Err(DigestError::ReplayDetected));
    assert_eq!(pkg.query_context(server).unwrap().state, ContextState::Established);
    assert_eq!(pkg.statistics().replays_rejected, 1);
}

#[test]
fn sasl_probe_then_mutual_exchange() {
    let pkg = package();
    let p = peers(&pkg, "chris", "secret");
    let mut buf = vec![0u8; BUF];

    let probe = pkg.initiate_outbound(p.client, None, &sasl_request(), None, &mut buf).unwrap();
    assert_eq!(probe.status, SecurityStatus::ContinueNeeded);
    assert_eq!(probe.written, 0);
    assert_eq!(pkg.query_context(probe.handle).unwrap().state, ContextState::Empty);

    let challenge = pkg.accept_inbound(p.server, None, Flavor::Sasl, None, &mut buf).unwrap();
    let challenge_text = buf[..challenge.written].to_vec();

    let answer = pkg
        .initiate_outbound(p.client, Some(probe.handle), &sasl_request(), Some(&challenge_text), &mut buf)
        .unwrap();
    assert_eq!(answer.handle, probe.handle);
    assert_eq!(answer.status, SecurityStatus::ContinueNeeded);
    let response = buf[..answer.written].to_vec();

    let verified = pkg
        .accept_inbound(p.server, Some(challenge.handle), Flavor::Sasl, Some(&response), &mut buf)
        .unwrap();
    assert_eq!(verified.status, SecurityStatus::Ok);
    let rspauth = buf[..verified.written].to_vec();
    assert!(rspauth.starts_with(b"rspauth="));

    let confirmed = pkg
        .initiate_outbound(p.client, Some(probe.handle), &sasl_request(), Some(&rspauth), &mut buf)
        .unwrap();
    assert_eq!(confirmed.status, SecurityStatus::Ok);
    assert_eq!(confirmed.written, 0);

    let client = pkg.query_context(probe.handle).unwrap();
    assert_eq!(client.state, ContextState::Established);
    assert!(client.attributes.mutual_auth);
    assert_eq!(pkg.statistics().authentications_succeeded, 2);
}

#[test]
fn sasl_confidentiality_negotiates_a_cipher() {
    let pkg = package_with(
        PackageConfig::new("elwood.innosoft.com").with_sasl_ciphers(&[Cipher::Des, Cipher::TripleDes]),
    );
    let p = peers(&pkg, "chris", "secret");
    let request = sasl_request().with_requirements(ContextAttributes {
        confidentiality: true,
        ..ContextAttributes::default()
    });
    let mut buf = vec![0u8; BUF];

    let challenge = pkg.accept_inbound(p.server, None, Flavor::Sasl, None, &mut buf).unwrap();
    let challenge_text = buf[..challenge.written].to_vec();
    let answer = pkg
        .initiate_outbound(p.client, None, &request, Some(&challenge_text), &mut buf)
        .unwrap();
    let response = buf[..answer.written].to_vec();
    pkg.accept_inbound(p.server, Some(challenge.handle), Flavor::Sasl, Some(&response), &mut buf)
        .unwrap();

    let server = pkg.query_context(challenge.handle).unwrap();
    assert_eq!(server.qop, Some(Qop::AuthConf));
    assert_eq!(server.cipher, Some(Cipher::TripleDes));
    assert!(server.attributes.confidentiality);
}

#[test]
fn undersized_buffer_leaves_everything_untouched() {
    let pkg = package();
    let p = peers(&pkg, "chris", "secret");

    let mut tiny = [0u8; 8];
    let err = pkg.accept_inbound(p.server, None, Flavor::Sasl, None, &mut tiny).unwrap_err();
    let DigestError::InsufficientBuffer { required } = err else {
        panic!("expected InsufficientBuffer, got {err:?}");
    };
    assert!(required > tiny.len());
    assert_eq!(pkg.context_count(), 0);
    assert_eq!(pkg.statistics().contexts_created, 0);

    let mut buf = vec![0u8; BUF];
    let challenge = pkg.accept_inbound(p.server, None, Flavor::Sasl, None, &mut buf).unwrap();
    let challenge_text = buf[..challenge.written].to_vec();
    let answer = pkg
        .initiate_outbound(p.client, None, &sasl_request(), Some(&challenge_text), &mut buf)
        .unwrap();
    let response = buf[..answer.written].to_vec();

    let err = pkg
        .accept_inbound(p.server, Some(challenge.handle), Flavor::Sasl, Some(&response), &mut tiny)
        .unwrap_err();
    assert!(matches!(err, DigestError::InsufficientBuffer { required } if required > 8));
    let info = pkg.query_context(challenge.handle).unwrap();
    assert_eq!(info.state, ContextState::ChallengeIssued);
    assert_eq!(info.nonce_count, 0);

    let retried = pkg
        .accept_inbound(p.server, Some(challenge.handle), Flavor::Sasl, Some(&response), &mut buf)
        .unwrap();
    assert_eq!(retried.status, SecurityStatus::Ok);
}

#[test]
fn wrong_password_releases_the_partial_context() {
    let pkg = package();
    let p = peers(&pkg, "Mufasa", "Circle of life");
    let (server, _, response) = http_exchange(&pkg, &p);

    let mut buf = vec![0u8; BUF];
    let result = pkg.accept_inbound(p.server, Some(server), Flavor::Http, Some(&response), &mut buf);
    assert_eq!(result, Err(DigestError::AuthenticationFailed));
    assert_eq!(pkg.query_context(server), Err(DigestError::InvalidHandle));

    let stats = pkg.statistics();
    assert_eq!(stats.authentications_failed, 1);
    assert_eq!(stats.contexts_deleted, 1);
}

#[test]
fn malformed_response_keeps_the_partial_context() {
    let pkg = package();
    let p = peers(&pkg, "Mufasa", "Circle Of Life");
    let (server, _, _) = http_exchange(&pkg, &p);

    let mut buf = vec![0u8; BUF];
    let result = pkg.accept_inbound(p.server, Some(server), Flavor::Http, Some(b"username=\"Mufasa\""), &mut buf);
    assert_eq!(result, Err(DigestError::MalformedMessage));
    assert_eq!(pkg.query_context(server).unwrap().state, ContextState::ChallengeIssued);
}

#[test]
fn response_for_a_vanished_context_is_rechallenged_as_stale() {
    let pkg = package();
    let p = peers(&pkg, "Mufasa", "Circle Of Life");
    let (server, _, response) = http_exchange(&pkg, &p);
    pkg.delete_context(server).unwrap();

    let mut buf = vec![0u8; BUF];
    let again = pkg.accept_inbound(p.server, None, Flavor::Http, Some(&response), &mut buf).unwrap();
    assert_eq!(again.status, SecurityStatus::ContinueNeeded);
    assert_ne!(again.handle, server);
    let text = std::str::from_utf8(&buf[..again.written]).unwrap();
    assert!(text.contains("stale=true"));
    assert_eq!(pkg.query_context(again.handle).unwrap().state, ContextState::ChallengeIssued);
}

#[test]
fn handle_less_responses() {
    let pkg = package();
    let p = peers(&pkg, "chris", "secret");
    let mut buf = vec![0u8; BUF];

    let no_opaque = pkg.accept_inbound(p.server, None, Flavor::Http, Some(b"username=\"chris\",nonce=\"n\""), &mut buf);
    assert_eq!(no_opaque, Err(DigestError::MalformedMessage));

    let sasl = pkg.accept_inbound(p.server, None, Flavor::Sasl, Some(b"username=\"chris\""), &mut buf);
    assert_eq!(sasl, Err(DigestError::InvalidHandle));
}

#[test]
fn delete_twice_reports_invalid_handle() {
    let pkg = package();
    let p = peers(&pkg, "chris", "secret");
    let mut buf = vec![0u8; BUF];
    let challenge = pkg.accept_inbound(p.server, None, Flavor::Http, None, &mut buf).unwrap();

    pkg.delete_context(challenge.handle).unwrap();
    assert_eq!(pkg.delete_context(challenge.handle), Err(DigestError::InvalidHandle));
    assert_eq!(pkg.context_count(), 0);
    assert_eq!(pkg.statistics().contexts_deleted, 1);
}

#[test]
fn control_tokens_are_unsupported() {
    let pkg = package();
    let p = peers(&pkg, "chris", "secret");
    let mut buf = vec![0u8; BUF];
    let challenge = pkg.accept_inbound(p.server, None, Flavor::Sasl, None, &mut buf).unwrap();

    assert_eq!(pkg.apply_control_token(challenge.handle, b"shutdown"), Err(DigestError::Unsupported));
    pkg.delete_context(challenge.handle).unwrap();
    assert_eq!(pkg.apply_control_token(challenge.handle, b"shutdown"), Err(DigestError::InvalidHandle));
}

#[test]
fn credential_direction_is_enforced() {
    let pkg = package();
    let p = peers(&pkg, "chris", "secret");
    let mut buf = vec![0u8; BUF];

    assert_eq!(
        pkg.initiate_outbound(p.server, None, &sasl_request(), None, &mut buf),
        Err(DigestError::InvalidHandle)
    );
    assert_eq!(
        pkg.accept_inbound(p.client, None, Flavor::Sasl, None, &mut buf),
        Err(DigestError::InvalidHandle)
    );

    let both = pkg.acquire_credential(Credential::both(ClientIdentity::new("chris", Secret::password("secret"))));
    assert!(pkg.accept_inbound(both, None, Flavor::Sasl, None, &mut buf).is_ok());
    assert!(pkg.initiate_outbound(both, None, &sasl_request(), None, &mut buf).is_ok());

    pkg.free_credential(both).unwrap();
    assert_eq!(pkg.free_credential(both), Err(DigestError::InvalidHandle));
    assert_eq!(
        pkg.accept_inbound(both, None, Flavor::Sasl, None, &mut buf),
        Err(DigestError::InvalidHandle)
    );
}

#[test]
fn handles_are_bound_to_their_role() {
    let pkg = package();
    let p = peers(&pkg, "chris", "secret");
    let mut buf = vec![0u8; BUF];
    let challenge = pkg.accept_inbound(p.server, None, Flavor::Sasl, None, &mut buf).unwrap();
    let challenge_text = buf[..challenge.written].to_vec();

    let result = pkg.initiate_outbound(
        p.client,
        Some(challenge.handle),
        &sasl_request(),
        Some(&challenge_text),
        &mut buf,
    );
    assert_eq!(result, Err(DigestError::InvalidHandle));
}

#[test]
fn probe_context_refuses_a_follow_up() {
    let pkg = package();
    let p = peers(&pkg, "Mufasa", "Circle Of Life");
    let mut buf = vec![0u8; BUF];
    let probe = pkg.initiate_outbound(p.client, None, &http_request("/"), None, &mut buf).unwrap();
    assert_eq!(
        pkg.initiate_outbound(p.client, Some(probe.handle), &http_request("/"), None, &mut buf),
        Err(DigestError::Internal)
    );
}

#[test]
fn expired_contexts_are_invalid_and_swept() {
    let pkg = package_with(PackageConfig::new("testrealm@host.com").with_context_lifetime(Duration::from_millis(300)));
    let p = peers(&pkg, "chris", "secret");
    let mut buf = vec![0u8; BUF];
    let first = pkg.accept_inbound(p.server, None, Flavor::Http, None, &mut buf).unwrap();
    pkg.accept_inbound(p.server, None, Flavor::Http, None, &mut buf).unwrap();
    pkg.accept_inbound(p.server, None, Flavor::Sasl, None, &mut buf).unwrap();
    assert!(pkg.query_context(first.handle).unwrap().expires_at.is_some());

    std::thread::sleep(Duration::from_millis(400));
    assert_eq!(pkg.query_context(first.handle), Err(DigestError::InvalidHandle));
    assert_eq!(pkg.sweep_expired(), 2);
    assert_eq!(pkg.context_count(), 0);
    assert_eq!(pkg.statistics().contexts_deleted, 2);
}

#[test]
fn new_contexts_reclaim_expired_ones_without_an_explicit_sweep() {
    let pkg = package_with(PackageConfig::new("testrealm@host.com").with_context_lifetime(Duration::from_millis(300)));
    let p = peers(&pkg, "chris", "secret");
    let mut buf = vec![0u8; BUF];
    let batch = table::SWEEP_INTERVAL as usize;
    for _ in 0..batch {
        pkg.accept_inbound(p.server, None, Flavor::Http, None, &mut buf).unwrap();
    }
    assert_eq!(pkg.context_count(), batch);

    std::thread::sleep(Duration::from_millis(400));
    for _ in 0..batch {
        pkg.accept_inbound(p.server, None, Flavor::Http, None, &mut buf).unwrap();
    }
    assert_eq!(pkg.context_count(), batch);
    let stats = pkg.statistics();
    assert_eq!(stats.contexts_created, 2 * batch as u64);
    assert_eq!(stats.contexts_deleted, batch as u64);
}

#[test]
fn failed_first_responses_are_counted() {
    let pkg = package();
    let p = peers(&pkg, "chris", "secret");
    let mut buf = vec![0u8; BUF];

    let refused = pkg.initiate_outbound(p.client, None, &http_request("/"), Some(b"not a challenge"), &mut buf);
    assert!(refused.is_err());
    assert_eq!(pkg.context_count(), 0);
    let stats = pkg.statistics();
    assert_eq!(stats.steps_failed, 1);
    assert_eq!(stats.contexts_created, 0);

    let p = peers(&pkg, "Mufasa", "Circle of life");
    let (_, _, response) = http_exchange(&pkg, &p);
    let failed = pkg.accept_inbound(p.server, None, Flavor::Http, Some(&response), &mut buf);
    assert_eq!(failed, Err(DigestError::AuthenticationFailed));
    let stats = pkg.statistics();
    assert_eq!(stats.steps_failed, 2);
    assert_eq!(stats.authentications_failed, 1);
}

#[test]
fn status_codes_fold_results() {
    let pkg = package();
    let p = peers(&pkg, "chris", "secret");
    let mut buf = vec![0u8; BUF];
    let challenge = pkg.accept_inbound(p.server, None, Flavor::Sasl, None, &mut buf);
    assert_eq!(status_code(&challenge), 1);
    assert_eq!(status_code(&Err(DigestError::Unsupported)), -2);
    assert_eq!(status_code(&Err(DigestError::InsufficientBuffer { required: 9 })), -6);

    let p = peers(&pkg, "Mufasa", "Circle Of Life");
    let (_, _, response) = http_exchange(&pkg, &p);
    let done = pkg.accept_inbound(p.server, None, Flavor::Http, Some(&response), &mut buf);
    assert_eq!(status_code(&done), 0);
}

#[test]
fn invalid_configuration_is_refused() {
    let result = DigestPackage::new(PackageConfig::new(""), principals());
    assert_eq!(result.err(), Some(PackageError::Config(ConfigError::EmptyRealm)));

    let result = DigestPackage::new(PackageConfig::default().with_maxbuf(0), principals());
    assert_eq!(result.err(), Some(PackageError::Config(ConfigError::MaxbufOutOfRange(0))));
}

struct Forest;

impl TrustTopology for Forest {
    fn is_within_forest(&self, domain: &str) -> bool {
        matches!(domain, "LOCAL" | "CORP")
    }
}

struct NoDirectory;

impl NameResolver for NoDirectory {
    fn resolve(&self, _principal: &str) -> DigestResult<Option<ResolvedName>> {
        Ok(None)
    }
}

struct Failing(ForwardError);

impl DomainForwarder for Failing {
    fn forward_verify(&self, _domain: &str, _blob: &[u8], budget: Duration) -> Result<Vec<u8>, ForwardError> {
        assert_eq!(budget, Duration::from_millis(250));
        Err(self.0)
    }
}

fn forwarding_package(error: ForwardError) -> DigestPackage {
    package_with(PackageConfig::new("testrealm@host.com").with_forward_budget(Duration::from_millis(250)))
        .with_forwarder(Forwarder::new("LOCAL", Arc::new(NoDirectory), Arc::new(Forest), Arc::new(Failing(error))))
}

#[test]
fn forward_timeout_keeps_the_context_for_a_retry() {
    let pkg = forwarding_package(ForwardError::Timeout);
    let p = peers(&pkg, "CORP\\bob", "hunter2");
    let (server, _, response) = http_exchange(&pkg, &p);

    let mut buf = vec![0u8; BUF];
    let result = pkg.accept_inbound(p.server, Some(server), Flavor::Http, Some(&response), &mut buf);
    assert_eq!(result, Err(DigestError::Internal));
    let info = pkg.query_context(server).unwrap();
    assert_eq!(info.state, ContextState::ChallengeIssued);
    assert_eq!(info.nonce_count, 0);
    assert_eq!(pkg.statistics().forwards_attempted, 1);
}

#[test]
fn forward_rejection_releases_the_context() {
    let pkg = forwarding_package(ForwardError::Unreachable);
    let p = peers(&pkg, "CORP\\bob", "hunter2");
    let (server, _, response) = http_exchange(&pkg, &p);

    let mut buf = vec![0u8; BUF];
    let result = pkg.accept_inbound(p.server, Some(server), Flavor::Http, Some(&response), &mut buf);
    assert_eq!(result, Err(DigestError::AuthenticationFailed));
    assert_eq!(pkg.query_context(server), Err(DigestError::InvalidHandle));
}

#[test]
fn domain_outside_the_forest_is_never_forwarded() {
    let pkg = forwarding_package(ForwardError::Rejected);
    let p = peers(&pkg, "EVIL\\mallory", "pw");
    let (server, _, response) = http_exchange(&pkg, &p);

    let mut buf = vec![0u8; BUF];
    let result = pkg.accept_inbound(p.server, Some(server), Flavor::Http, Some(&response), &mut buf);
    assert_eq!(result, Err(DigestError::NoAuthenticatingAuthority));
    let stats = pkg.statistics();
    assert_eq!(stats.forwards_attempted, 0);
    assert_eq!(stats.authentications_failed, 1);
}
