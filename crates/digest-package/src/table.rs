// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — Digest Authentication
// Licensed under the MIT License

//! Registry of live security contexts.
//!
//! Every entry is reference counted. [`ContextTable::find`] hands out a
//! [`ContextRef`]; dropping it is the release. Removing a handle only unlinks
//! it from the table, so a step already running on that context finishes on
//! its own reference and the context is freed (and zeroized) with the last
//! reference. All table mutations happen under one lock.
//!
//! A caller may take the table lock while holding a context lock. The table
//! itself never locks a context.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use digest_core::context::SecurityContext;
use digest_core::types::{DigestError, DigestResult, Role};
use parking_lot::Mutex;

/// Every this many inserts, expired entries are swept under the same lock.
pub const SWEEP_INTERVAL: u64 = 64;

/// Shared, lock-guarded reference to a live context.
pub type ContextRef = Arc<Mutex<SecurityContext>>;

/// Opaque token naming a context across host calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextHandle(u64);

impl ContextHandle {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }
}

struct Entry {
    context: ContextRef,
    opaque: Option<String>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Default)]
struct Slots {
    next: u64,
    entries: HashMap<u64, Entry>,
    by_opaque: HashMap<String, u64>,
}

impl Slots {
    fn unlink(&mut self, id: u64) -> Option<Entry> {
        let entry = self.entries.remove(&id)?;
        if let Some(opaque) = &entry.opaque {
            self.by_opaque.remove(opaque);
        }
        Some(entry)
    }

    fn sweep(&mut self, now: Instant) -> usize {
        let expired: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(&id, _)| id)
            .collect();
        for id in &expired {
            self.unlink(*id);
        }
        expired.len()
    }
}

pub struct ContextTable {
    slots: Mutex<Slots>,
    lifetime: Duration,
}

impl ContextTable {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            lifetime,
        }
    }

    /// Expiry for a context touched at `now`; `None` if it would overflow.
    pub fn deadline(&self, now: Instant) -> Option<Instant> {
        now.checked_add(self.lifetime)
    }

    /// Registers `context` and returns its handle with the number of expired
    /// entries swept on the way. Acceptor contexts carrying an opaque are also
    /// indexed by it.
    pub fn insert(&self, mut context: SecurityContext) -> (ContextHandle, usize) {
        let now = Instant::now();
        let expires_at = self.deadline(now);
        if let Some(at) = expires_at {
            context.set_expiry(at);
        }
        let opaque = (context.role() == Role::Acceptor && !context.opaque.is_empty())
            .then(|| context.opaque.clone());

        let mut slots = self.slots.lock();
        slots.next += 1;
        let id = slots.next;
        let swept = if id % SWEEP_INTERVAL == 0 { slots.sweep(now) } else { 0 };
        if let Some(opaque) = &opaque {
            slots.by_opaque.insert(opaque.clone(), id);
        }
        slots.entries.insert(
            id,
            Entry {
                context: Arc::new(Mutex::new(context)),
                opaque,
                expires_at,
            },
        );
        (ContextHandle(id), swept)
    }

    /// Takes a reference to a live context. An expired entry is unlinked.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::InvalidHandle`] for an unknown, removed or
    /// expired handle.
    pub fn find(&self, handle: ContextHandle) -> DigestResult<ContextRef> {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        match slots.entries.get(&handle.0) {
            Some(entry) if !entry.is_expired(now) => Ok(Arc::clone(&entry.context)),
            Some(_) => {
                slots.unlink(handle.0);
                tracing::debug!(handle = handle.0, "expired context unlinked on lookup");
                Err(DigestError::InvalidHandle)
            }
            None => Err(DigestError::InvalidHandle),
        }
    }

    /// Locates a live acceptor context by the opaque it issued.
    pub fn find_by_opaque(&self, opaque: &str) -> Option<(ContextHandle, ContextRef)> {
        let id = *self.slots.lock().by_opaque.get(opaque)?;
        let handle = ContextHandle(id);
        self.find(handle).ok().map(|context| (handle, context))
    }

    /// Extends the expiry of a live entry.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::InvalidHandle`] if the handle was removed meanwhile.
    pub fn touch(&self, handle: ContextHandle, expires_at: Option<Instant>) -> DigestResult<()> {
        let mut slots = self.slots.lock();
        let entry = slots.entries.get_mut(&handle.0).ok_or(DigestError::InvalidHandle)?;
        entry.expires_at = expires_at;
        Ok(())
    }

    /// Unlinks `handle`. The context itself is freed with its last reference.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::InvalidHandle`] if the handle is not in the table,
    /// including a second removal of the same handle.
    pub fn remove(&self, handle: ContextHandle) -> DigestResult<()> {
        self.slots
            .lock()
            .unlink(handle.0)
            .map(drop)
            .ok_or(DigestError::InvalidHandle)
    }

    /// Unlinks every entry expired at `now` and returns how many went.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        self.slots.lock().sweep(now)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
