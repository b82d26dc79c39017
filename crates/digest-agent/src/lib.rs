// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication Agent (Initiator)
// Licensed under the MIT License

//! Digest agent (initiator / client).
//!
//! Answers HTTP and SASL digest challenges, confirms the acceptor's `rspauth`
//! when mutual authentication applies, and produces follow-up HTTP responses
//! on an established context.

/// Challenge answering, `rspauth` confirmation and follow-ups.
mod authentication;
/// Client identity, per-request inputs and step outputs.
mod state;

pub use authentication::{begin_context, generate_follow_up, generate_response, verify_response_auth};
pub use state::{ClientIdentity, InitiatorOutput, InitiatorRequest};
