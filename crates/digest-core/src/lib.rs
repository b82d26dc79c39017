// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

//! Core library for RFC 2617 HTTP Digest and RFC 2831 SASL DIGEST-MD5.
//!
//! Holds everything both halves of an exchange share: the directive wire codec,
//! parameter negotiation, the MD5 hash engine and the per-connection context
//! model. The initiator steps live in `digest-agent`, the acceptor steps in
//! `digest-relay`.
//!
//! # Crate layout
//!
//! * [`types`] -- shared constants, enums, error type and secure byte containers.
//! * [`crypto`] -- MD5 `hash7`, hex helpers and the libsodium CSPRNG.
//! * [`directive`] -- parsing and serialization of `name=value` directive lists.
//! * [`check`] -- per-message structural validation.
//! * [`negotiate`] -- algorithm, QOP, cipher, charset and maxbuf selection.
//! * [`hash`] -- session key, request-digest and response-auth computation.
//! * [`context`] -- the `SecurityContext` state machine data.
//! * [`blob`] -- binary codec for cross-domain passthrough.

/// Passthrough request/reply codec.
pub mod blob;
/// Structural checks run before any cryptographic work.
pub mod check;
/// Per-connection state.
pub mod context;
/// Hashing and randomness primitives.
pub mod crypto;
/// Directive list wire codec.
pub mod directive;
/// Digest hash computations.
pub mod hash;
/// Parameter negotiation.
pub mod negotiate;
/// Shared constants, error types, and secure byte containers.
pub mod types;
