//! Memoized geometry results for the current spine item.
//!
//! Two LRU caches (visible leaf lists and visible leaf CFIs) keyed by a
//! [`GeometryFingerprint`], plus a node-identity side table for element CFIs.
//! Entries expire lazily on lookup once older than [`CacheLimits::max_age`].
//! Everything is dropped on spine-item change: node identities mean nothing
//! across documents.

use core::hash::Hash;
use core::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::Serialize;

use crate::cfi::CfiAddress;
use crate::collector::LeafDescriptor;
use crate::geometry::{ContentOffset, FrameDimensions, PaginationState};
use crate::picker::Picker;
use crate::tree::NodeId;

/// Capacity and age bounds for [`GeometryCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheLimits {
    /// Maximum visible-leaf-list entries.
    pub leaf_capacity: usize,
    /// Maximum visible-leaf-CFI entries.
    pub cfi_capacity: usize,
    /// Maximum memoized element CFIs.
    pub side_table_capacity: usize,
    /// Entries older than this are treated as misses.
    pub max_age: Duration,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            leaf_capacity: 16,
            cfi_capacity: 64,
            side_table_capacity: 4096,
            max_age: Duration::from_secs(5),
        }
    }
}

impl CacheLimits {
    /// Embedded-focused preset with smaller bounds.
    pub fn embedded() -> Self {
        Self {
            leaf_capacity: 4,
            cfi_capacity: 8,
            side_table_capacity: 512,
            max_age: Duration::from_secs(2),
        }
    }
}

/// Time source for cache ageing.
pub trait CacheClock {
    fn now(&self) -> Instant;
}

/// Monotonic wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl CacheClock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Canonical serialization of everything a geometry result depends on.
///
/// Equality and hashing compare the full payload, so distinct queries never
/// share an entry. [`GeometryFingerprint::digest`] is a short form for logs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct GeometryFingerprint {
    payload: Vec<u8>,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    pagination: &'a PaginationState,
    offset: &'a ContentOffset,
    frame: &'a FrameDimensions,
    picker: &'static str,
}

impl GeometryFingerprint {
    /// Build a fingerprint from canonical payload bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: bytes.into(),
        }
    }

    /// Fingerprint of a visibility query.
    pub fn for_query(
        pagination: &PaginationState,
        offset: &ContentOffset,
        frame: &FrameDimensions,
        picker: Picker,
    ) -> Self {
        let input = FingerprintInput {
            pagination,
            offset,
            frame,
            picker: picker.tag(),
        };
        let payload = serde_json::to_vec(&input).unwrap_or_else(|_| {
            format!("{:?}|{:?}|{:?}|{}", pagination, offset, frame, picker.tag()).into_bytes()
        });
        Self::from_bytes(payload)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// FNV-1a digest of the payload.
    pub fn digest(&self) -> u64 {
        self.payload.iter().fold(0xcbf29ce484222325, |hash, &b| {
            (hash ^ u64::from(b)).wrapping_mul(0x100000001b3)
        })
    }
}

impl core::fmt::Debug for GeometryFingerprint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "GeometryFingerprint({:016x})", self.digest())
    }
}

struct CacheEntry<V> {
    payload: V,
    inserted_at: Instant,
}

/// LRU map whose entries also expire by age.
struct TimedLru<K: Hash + Eq, V> {
    entries: LruCache<K, CacheEntry<V>>,
    max_age: Duration,
}

impl<K: Hash + Eq, V: Clone> TimedLru<K, V> {
    fn new(capacity: usize, max_age: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            max_age,
        }
    }

    fn get(&mut self, key: &K, now: Instant) -> Option<V> {
        let entry = self.entries.get(key)?;
        if now.saturating_duration_since(entry.inserted_at) <= self.max_age {
            return Some(entry.payload.clone());
        }
        self.entries.pop(key);
        None
    }

    fn put(&mut self, key: K, payload: V, now: Instant) {
        self.entries.put(
            key,
            CacheEntry {
                payload,
                inserted_at: now,
            },
        );
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Geometry caches for one spine item.
pub struct GeometryCache {
    leaves: TimedLru<GeometryFingerprint, Vec<LeafDescriptor>>,
    cfis: TimedLru<GeometryFingerprint, CfiAddress>,
    element_cfis: TimedLru<NodeId, CfiAddress>,
}

impl GeometryCache {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            leaves: TimedLru::new(limits.leaf_capacity, limits.max_age),
            cfis: TimedLru::new(limits.cfi_capacity, limits.max_age),
            element_cfis: TimedLru::new(limits.side_table_capacity, limits.max_age),
        }
    }

    pub fn visible_leaves(
        &mut self,
        key: &GeometryFingerprint,
        now: Instant,
    ) -> Option<Vec<LeafDescriptor>> {
        self.leaves.get(key, now)
    }

    pub fn store_visible_leaves(
        &mut self,
        key: GeometryFingerprint,
        leaves: Vec<LeafDescriptor>,
        now: Instant,
    ) {
        self.leaves.put(key, leaves, now);
    }

    pub fn visible_cfi(&mut self, key: &GeometryFingerprint, now: Instant) -> Option<CfiAddress> {
        self.cfis.get(key, now)
    }

    pub fn store_visible_cfi(&mut self, key: GeometryFingerprint, cfi: CfiAddress, now: Instant) {
        self.cfis.put(key, cfi, now);
    }

    pub fn element_cfi(&mut self, node: NodeId, now: Instant) -> Option<CfiAddress> {
        self.element_cfis.get(&node, now)
    }

    pub fn store_element_cfi(&mut self, node: NodeId, cfi: CfiAddress, now: Instant) {
        self.element_cfis.put(node, cfi, now);
    }

    /// Total live entries across all tables.
    pub fn len(&self) -> usize {
        self.leaves.len() + self.cfis.len() + self.element_cfis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.leaves.clear();
        self.cfis.clear();
        self.element_cfis.clear();
    }
}

impl core::fmt::Debug for GeometryCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GeometryCache")
            .field("leaves", &self.leaves.len())
            .field("cfis", &self.cfis.len())
            .field("element_cfis", &self.element_cfis.len())
            .finish()
    }
}
