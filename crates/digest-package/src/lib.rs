// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication Package (Host API)
// Licensed under the MIT License

//! Host-facing Digest security package.
//!
//! Wraps the initiator (`digest-agent`) and acceptor (`digest-relay`) steps
//! behind a handle-based API: callers acquire credentials, then drive contexts
//! with [`DigestPackage::initiate_outbound`] and
//! [`DigestPackage::accept_inbound`], passing peer messages in and receiving
//! the next message in a buffer they own. Contexts are named by opaque
//! [`ContextHandle`]s and never by pointer.
//!
//! Every call returns a [`DigestResult`]; [`status_code`] folds it into `0`
//! (complete), `1` (continue needed) or a negative error code for hosts that
//! speak integers.

/// Package settings and the acceptor policies derived from them.
pub mod config;
/// Credential handles.
pub mod credential;
/// The host call driver.
mod package;
/// Reference-counted context handle table.
pub mod table;

use thiserror::Error;

pub use config::{ConfigError, PackageConfig};
pub use credential::{Credential, CredentialHandle, CredentialUse};
pub use digest_core::types::{DigestError, DigestResult};
pub use package::{status_code, ContextInfo, DigestPackage, Statistics, StepOutput};
pub use table::ContextHandle;

/// Failures while constructing a [`DigestPackage`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PackageError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Digest(#[from] DigestError),
}
