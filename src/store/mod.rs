//! # Storage Layer
//!
//! This module defines the storage abstraction for satchel. The [`KvStore`]
//! trait models the kind of store the facade layers its tiers over: a
//! synchronous, size-bounded key→string mapping with an index view for
//! iteration.
//!
//! ## Two Stores, One Interface
//!
//! The facade is always constructed over two independent `KvStore` instances:
//!
//! 1. **Persistent**: survives process restarts. Holds the authoritative copy
//!    of every value that fits, plus the fallback markers for those that don't.
//! 2. **Volatile**: survives only the current session. Holds the overflow:
//!    values the persistent store refused even after cleanup and compaction.
//!
//! Both stores enforce their own byte quota and fail a `set` that would exceed
//! it. Quota accounting is `key.len() + value.len()` per entry; overwriting an
//! existing key counts the replacement value, not the sum of both.
//!
//! ## Contract
//!
//! - `set` is the only fallible operation the facade reacts to. Any error from
//!   it (capacity, backend failure) is treated as "this tier is full" and the
//!   facade moves on; nothing is retried at this layer.
//! - `remove` on an absent key is a no-op.
//! - `key_at(index)` / `len` expose an iteration view. The view is allowed to
//!   shift between calls when entries are added or removed; callers that
//!   mutate while iterating must collect keys first.
//!
//! All methods take `&self`: implementations use interior mutability because
//! satchel is single-threaded by contract (see the crate docs).
//!
//! ## Implementations
//!
//! - [`fs::FileStore`]: directory-backed store for the persistent role.
//! - [`memory::MemStore`]: in-memory store for the volatile role and for tests.

use crate::error::Result;

pub mod fs;
pub mod memory;

/// Abstract interface for a synchronous, size-bounded key-value store.
pub trait KvStore {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Write `value` under `key`, replacing any existing entry.
    /// Fails when the write would exceed the store's capacity or the
    /// backend refuses it.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete the entry under `key`. Absent keys are ignored.
    fn remove(&self, key: &str);

    /// The key at position `index` in the store's iteration view,
    /// or `None` past the end.
    fn key_at(&self, index: usize) -> Option<String>;

    /// Number of entries currently stored.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
