// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

use std::collections::HashMap;
use std::sync::Arc;

use digest_agent::ClientIdentity;
use digest_core::types::{DigestError, DigestResult};
use parking_lot::Mutex;

/// Direction a credential may be used in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialUse {
    Outbound,
    Inbound,
    Both,
}

impl CredentialUse {
    pub fn allows_outbound(self) -> bool {
        matches!(self, CredentialUse::Outbound | CredentialUse::Both)
    }

    pub fn allows_inbound(self) -> bool {
        matches!(self, CredentialUse::Inbound | CredentialUse::Both)
    }
}

/// Opaque token naming an acquired credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CredentialHandle(u64);

impl CredentialHandle {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }
}

/// A credential held by the package. Outbound use needs a client identity;
/// inbound use verifies against the package's principal store.
#[derive(Debug, Clone)]
pub struct Credential {
    usage: CredentialUse,
    identity: Option<ClientIdentity>,
}

impl Credential {
    pub fn outbound(identity: ClientIdentity) -> Self {
        Self {
            usage: CredentialUse::Outbound,
            identity: Some(identity),
        }
    }

    pub fn inbound() -> Self {
        Self {
            usage: CredentialUse::Inbound,
            identity: None,
        }
    }

    pub fn both(identity: ClientIdentity) -> Self {
        Self {
            usage: CredentialUse::Both,
            identity: Some(identity),
        }
    }

    pub fn usage(&self) -> CredentialUse {
        self.usage
    }

    /// Identity to answer challenges with, if this credential may initiate.
    pub fn outbound_identity(&self) -> Option<&ClientIdentity> {
        self.identity.as_ref().filter(|_| self.usage.allows_outbound())
    }
}

#[derive(Default)]
struct CredentialSlots {
    next: u64,
    entries: HashMap<u64, Arc<Credential>>,
}

/// Registry of acquired credentials.
#[derive(Default)]
pub struct CredentialTable {
    slots: Mutex<CredentialSlots>,
}

impl CredentialTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, credential: Credential) -> CredentialHandle {
        let mut slots = self.slots.lock();
        slots.next += 1;
        let id = slots.next;
        slots.entries.insert(id, Arc::new(credential));
        CredentialHandle(id)
    }

    /// Returns a reference that stays valid even if the handle is freed meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::InvalidHandle`] for an unknown or freed handle.
    pub fn lookup(&self, handle: CredentialHandle) -> DigestResult<Arc<Credential>> {
        self.slots
            .lock()
            .entries
            .get(&handle.0)
            .cloned()
            .ok_or(DigestError::InvalidHandle)
    }

    /// # Errors
    ///
    /// Returns [`DigestError::InvalidHandle`] for an unknown or freed handle.
    pub fn release(&self, handle: CredentialHandle) -> DigestResult<()> {
        self.slots
            .lock()
            .entries
            .remove(&handle.0)
            .map(drop)
            .ok_or(DigestError::InvalidHandle)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
