// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication Relay (Acceptor)
// Licensed under the MIT License

//! Digest relay (acceptor / server).
//!
//! Issues HTTP and SASL digest challenges, verifies initiator responses against
//! a principal store, accepts reconnects on established contexts and forwards
//! principals of other domains to their authoritative domain.

/// Challenge generation.
mod challenge;
/// Response verification and reconnect handling.
mod authentication;
/// Cross-domain verification through passthrough blobs.
pub mod passthrough;
/// Policy, principal store and step outputs.
mod state;

pub use authentication::verify_response;
pub use challenge::{begin_context, issue_challenge};
pub use passthrough::{serve_forwarded, Forwarder};
pub use state::{
    AcceptorOutput, AcceptorPolicy, MemoryPrincipalStore, PrincipalRecord, PrincipalStore,
    VerificationOutcome,
};
