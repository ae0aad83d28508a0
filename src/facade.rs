//! The persistence facade: tiered save/load over two stores.
//!
//! [`Satchel`] owns no storage of its own. It is constructed once at
//! application start over a persistent and a volatile [`KvStore`] and decides,
//! per write, which tier a value lands in:
//!
//! ```text
//! save(key, value)
//!   │
//!   ├─ 1. full value → persistent store          ─ ok → true
//!   ├─ 2. evict disposable entries, retry once   ─ ok → true
//!   ├─ 3. compacted rendition → persistent store ─ ok → true
//!   ├─ 4. full value → volatile store
//!   │     + "<key>-fallback" = "session" marker  ─ ok → true
//!   └─ 5. false
//! ```
//!
//! The marker written in tier 4 is the bookkeeping `load` uses to find the
//! authoritative copy: marker present and equal to `"session"` means the
//! volatile store holds it, otherwise the persistent store does. Every save
//! that lands in the persistent store clears a stale marker for its key, so
//! the invariant survives a key bouncing between tiers.
//!
//! No operation here returns an error. Store failures are expected pressure
//! signals, not exceptional conditions: `save` answers with `bool`, `load`
//! with `Option`, and diagnostics go to the `tracing` log.

use crate::compact::{Compactor, ProfileCompactor};
use crate::health::StorageHealth;
use crate::policy::CleanupPolicy;
use crate::store::memory::MemStore;
use crate::store::KvStore;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

const FALLBACK_SUFFIX: &str = "-fallback";
const FALLBACK_SESSION: &str = "session";

/// Assumed total capacity of the persistent store. The store has no quota
/// introspection, so health reporting divides by this constant.
const DEFAULT_CAPACITY_ESTIMATE: usize = 5 * 1024 * 1024;

const PROBE_KEY_PREFIX: &str = "__satchel-probe-";
const PROBE_CHUNK_BYTES: usize = 1024;
const PROBE_CEILING_BYTES: usize = 5 * 1024 * 1024;

/// Best-effort persistence of JSON values across a persistent and a
/// volatile store. See the module docs for the tier chain.
///
/// Single-threaded by contract, like the stores it wraps. Construct one per
/// process and pass it by reference; inject [`MemStore`] fakes in tests.
pub struct Satchel<P: KvStore, V: KvStore> {
    persistent: P,
    volatile: V,
    policy: CleanupPolicy,
    capacity_estimate: usize,
    compactors: Vec<(String, Box<dyn Compactor>)>,
    default_compactor: Box<dyn Compactor>,
}

impl<P: KvStore, V: KvStore> Satchel<P, V> {
    pub fn new(persistent: P, volatile: V) -> Self {
        Self {
            persistent,
            volatile,
            policy: CleanupPolicy::default(),
            capacity_estimate: DEFAULT_CAPACITY_ESTIMATE,
            compactors: Vec::new(),
            default_compactor: Box::new(ProfileCompactor),
        }
    }

    pub fn with_cleanup_policy(mut self, policy: CleanupPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the capacity constant used by [`storage_health`](Self::storage_health).
    pub fn with_capacity_estimate(mut self, bytes: usize) -> Self {
        self.capacity_estimate = bytes;
        self
    }

    /// Route keys starting with `key_prefix` to `compactor` instead of the
    /// default projection. The longest matching prefix wins.
    pub fn with_compactor(mut self, key_prefix: &str, compactor: impl Compactor + 'static) -> Self {
        self.compactors.push((key_prefix.to_string(), Box::new(compactor)));
        self
    }

    pub fn persistent(&self) -> &P {
        &self.persistent
    }

    pub fn volatile(&self) -> &V {
        &self.volatile
    }

    /// Persist `value` under `key` using the best available tier.
    ///
    /// Returns `false` only when every tier failed (or the value is not
    /// serializable); the value is then not persisted anywhere and the caller
    /// owns recovery. Tiers 2–4 may mutate unrelated keys: cleanup evicts
    /// disposable entries, tier 4 writes a marker entry.
    ///
    /// Never panics and never surfaces an error.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let json = match serde_json::to_value(value) {
            Ok(json) => json,
            Err(err) => {
                warn!("value for {:?} is not serializable: {}", key, err);
                return false;
            }
        };
        let serialized = json.to_string();

        // Tier 1: full value straight into the persistent store.
        if self.persistent.set(key, &serialized).is_ok() {
            self.clear_fallback(key);
            return true;
        }

        // Tier 2: make room, retry once.
        debug!("persistent write of {:?} refused, evicting disposable entries", key);
        self.cleanup_non_essential_data();
        if self.persistent.set(key, &serialized).is_ok() {
            self.clear_fallback(key);
            return true;
        }

        // Tier 3: reduced-fidelity rendition. Skipped when the compactor had
        // nothing to trade away (non-object values).
        let compacted = self.compactor_for(key).compact(&json);
        if compacted != json {
            let compact_serialized = compacted.to_string();
            debug!(
                "retrying {:?} compacted, {} -> {} bytes",
                key,
                serialized.len(),
                compact_serialized.len()
            );
            if self.persistent.set(key, &compact_serialized).is_ok() {
                self.clear_fallback(key);
                return true;
            }
        }

        // Tier 4: session-lifetime copy, with a marker recording where the
        // authoritative value lives.
        if self.volatile.set(key, &serialized).is_ok() {
            if self.persistent.set(&fallback_key(key), FALLBACK_SESSION).is_ok() {
                debug!("{:?} saved to the volatile store", key);
                return true;
            }
            // Without the marker a later load would miss this copy.
            self.volatile.remove(key);
        }

        warn!("all storage tiers exhausted for {:?}", key);
        false
    }

    /// Read the value under `key` from whichever store is authoritative.
    ///
    /// Returns `None` for absent keys and for entries that no longer parse as
    /// JSON; the two are deliberately indistinguishable. The returned value
    /// may be a compacted rendition of what was saved; check
    /// [`COMPACT_FLAG`](crate::compact::COMPACT_FLAG).
    pub fn load(&self, key: &str) -> Option<Value> {
        if self.persistent.get(&fallback_key(key)).as_deref() == Some(FALLBACK_SESSION) {
            if let Some(value) = self.volatile.get(key).and_then(|raw| parse_stored(key, &raw)) {
                return Some(value);
            }
        }
        self.persistent.get(key).and_then(|raw| parse_stored(key, &raw))
    }

    /// [`load`](Self::load), deserialized into `T`. A value that does not fit
    /// `T` (a compacted rendition usually won't) yields `None`.
    pub fn load_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match serde_json::from_value(self.load(key)?) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!("stored value for {:?} does not deserialize: {}", key, err);
                None
            }
        }
    }

    /// Evict every persistent entry the cleanup policy marks disposable.
    ///
    /// Untagged entries are never touched, so calling this repeatedly with no
    /// intervening writes is a no-op after the first.
    pub fn cleanup_non_essential_data(&self) {
        let keys: Vec<String> = (0..self.persistent.len())
            .filter_map(|index| self.persistent.key_at(index))
            .collect();
        for key in keys {
            if self.policy.is_disposable(&key) {
                debug!("evicting disposable entry {:?}", key);
                self.persistent.remove(&key);
            }
        }
    }

    /// Empirically measure remaining persistent capacity by writing 1 KiB
    /// filler entries until a write fails (or 5 MiB has gone in), then
    /// deleting everything it wrote.
    ///
    /// Diagnostic only: this consumes the space it measures before giving it
    /// back, so keep it off hot paths. The running total is local state, not
    /// reconciled against the store, so a concurrent writer skews the
    /// estimate; the facade assumes a single writer throughout.
    pub fn available_space_estimate(&self) -> usize {
        let filler = "0".repeat(PROBE_CHUNK_BYTES);
        let mut probe_keys = Vec::new();
        let mut written = 0;

        while written < PROBE_CEILING_BYTES {
            let key = format!("{}{}", PROBE_KEY_PREFIX, probe_keys.len());
            if self.persistent.set(&key, &filler).is_err() {
                break;
            }
            written += PROBE_CHUNK_BYTES;
            probe_keys.push(key);
        }

        for key in &probe_keys {
            self.persistent.remove(key);
        }
        written
    }

    /// Scan every persistent entry and report utilization against the
    /// configured capacity estimate.
    ///
    /// O(n) over the key set, which is fine for the tens-to-hundreds of entries this
    /// is built for, but meant for a coarse timer or on-demand diagnostics,
    /// not a per-write hook.
    pub fn storage_health(&self) -> StorageHealth {
        let mut used_bytes = 0;
        for index in 0..self.persistent.len() {
            if let Some(key) = self.persistent.key_at(index) {
                let value_len = self.persistent.get(&key).map_or(0, |v| v.len());
                used_bytes += key.len() + value_len;
            }
        }

        let percentage_used = if self.capacity_estimate == 0 {
            100.0
        } else {
            used_bytes as f64 / self.capacity_estimate as f64 * 100.0
        };

        StorageHealth {
            total_capacity_estimate: self.capacity_estimate,
            used_bytes,
            available_bytes: self.capacity_estimate.saturating_sub(used_bytes),
            percentage_used,
            captured_at: Utc::now(),
        }
    }

    /// Drop the fallback bookkeeping for `key` after a successful persistent
    /// write. The marker and the volatile copy it points at are both stale.
    fn clear_fallback(&self, key: &str) {
        let marker = fallback_key(key);
        if self.persistent.get(&marker).is_some() {
            self.persistent.remove(&marker);
            self.volatile.remove(key);
        }
    }

    fn compactor_for(&self, key: &str) -> &dyn Compactor {
        let mut best: Option<&(String, Box<dyn Compactor>)> = None;
        for entry in &self.compactors {
            if key.starts_with(entry.0.as_str()) && best.map_or(true, |b| entry.0.len() > b.0.len()) {
                best = Some(entry);
            }
        }
        match best {
            Some((_, compactor)) => compactor.as_ref(),
            None => self.default_compactor.as_ref(),
        }
    }
}

pub type InMemorySatchel = Satchel<MemStore, MemStore>;

impl InMemorySatchel {
    /// Facade over two unbounded in-memory stores. Mainly for tests.
    pub fn in_memory() -> Self {
        Satchel::new(MemStore::new(), MemStore::new())
    }
}

fn fallback_key(key: &str) -> String {
    format!("{}{}", key, FALLBACK_SUFFIX)
}

fn parse_stored(key: &str, raw: &str) -> Option<Value> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!("stored value for {:?} is not valid JSON: {}", key, err);
            None
        }
    }
}
