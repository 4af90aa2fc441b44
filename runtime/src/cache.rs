//! Single-flight artifact cache.
//!
//! Maps a 64-bit content key to a slot that is filled at most once. The first
//! caller for a key runs the fill; concurrent callers for the same key block
//! on the slot and observe its outcome, success or failure. Keys are
//! independent, so fills for distinct keys run in parallel.
//!
//! Only successful fills persist. A failed slot is dropped from the map by the
//! caller that filled it; its waiters still see the error, the next request retries.
//!
//! Uses papaya's lock-free HashMap for the key space and a `OnceLock` per key
//! for the in-flight fill.

use std::sync::{Arc, OnceLock};

use papaya::{Compute, HashMap, Operation};
use snafu::ensure;

use crate::error::*;

type Slot<V> = Arc<OnceLock<Result<Arc<V>>>>;

/// How a lookup was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Lookup {
    Hit,
    Miss,
    /// Another caller was filling the slot; this one waited for it.
    Coalesced,
}

pub struct KeyedCache<V> {
    name: &'static str,
    slots: HashMap<u64, Slot<V>>,
}

impl<V> KeyedCache<V> {
    pub fn new(name: &'static str) -> Self {
        Self { name, slots: HashMap::new() }
    }

    /// Return the artifact for `key`, running `fill` if no caller has produced it yet.
    ///
    /// `matches` verifies a cached artifact against the full request; a
    /// mismatch means two requests collided on one key and is reported as
    /// [`Error::CacheCorruption`].
    pub fn get_or_fill<F>(&self, key: u64, matches: impl Fn(&V) -> bool, fill: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        let (slot, mut lookup) = self.slot(key);

        let mut filled = false;
        let outcome = slot.get_or_init(|| {
            filled = true;
            fill().map(Arc::new)
        });
        if filled {
            lookup = Lookup::Miss;
        }
        tracing::trace!(cache = self.name, key, %lookup, "cache lookup");

        match outcome {
            Ok(value) => {
                let reason = || format!("{} entry was produced for a different request", self.name);
                ensure!(matches(value), CacheCorruptionSnafu { key, reason: reason() });
                Ok(Arc::clone(value))
            }
            Err(error) => {
                if filled {
                    self.evict(key, &slot);
                    tracing::debug!(cache = self.name, key, %error, "cache fill failed");
                }
                Err(error.clone())
            }
        }
    }

    /// Drop every entry. In-flight fills complete, but their results are no longer reachable by key.
    pub fn invalidate(&self) {
        let guard = self.slots.guard();
        self.slots.clear(&guard);
        tracing::debug!(cache = self.name, "cache invalidated");
    }

    /// Number of completed, successful entries.
    pub fn len(&self) -> usize {
        let guard = self.slots.guard();
        self.slots.iter(&guard).filter(|(_, slot)| matches!(slot.get(), Some(Ok(_)))).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: u64) -> (Slot<V>, Lookup) {
        let guard = self.slots.guard();
        if let Some(existing) = self.slots.get(&key, &guard) {
            let lookup = if existing.get().is_some() { Lookup::Hit } else { Lookup::Coalesced };
            return (Arc::clone(existing), lookup);
        }

        let fresh: Slot<V> = Arc::new(OnceLock::new());
        match self.slots.compute(
            key,
            |entry| match entry {
                Some((_, existing)) => Operation::Abort(Arc::clone(existing)),
                None => Operation::Insert(Arc::clone(&fresh)),
            },
            &guard,
        ) {
            Compute::Aborted(existing) => (existing, Lookup::Coalesced),
            _ => (fresh, Lookup::Miss),
        }
    }

    fn evict(&self, key: u64, failed: &Slot<V>) {
        let guard = self.slots.guard();
        let _ = self.slots.compute(
            key,
            |entry| match entry {
                Some((_, current)) if Arc::ptr_eq(current, failed) => Operation::Remove,
                _ => Operation::Abort(()),
            },
            &guard,
        );
    }
}
