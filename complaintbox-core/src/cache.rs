//! Bounded in-memory complaint cache
//!
//! Keyed by [`ComplaintId`], guarded by an `RwLock` so concurrent readers do
//! not block each other. Recency for LRU is tracked with a per-entry atomic
//! tick, which lets `get` run under the read lock.
//!
//! Counters live behind their own mutex and are always bumped while the map
//! lock is held, so [`ComplaintCache::stats`] sees hits, misses, evictions,
//! and size from the same moment.

use crate::complaint::Complaint;
use crate::ids::ComplaintId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

/// Which entry to drop when the cache is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently read or written
    #[default]
    Lru,
    /// Oldest insertion, regardless of reads
    Fifo,
    /// Caching disabled; every call passes through
    None,
}

impl EvictionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Fifo => "fifo",
            EvictionPolicy::None => "none",
        }
    }
}

impl std::str::FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lru" => Ok(EvictionPolicy::Lru),
            "fifo" => Ok(EvictionPolicy::Fifo),
            "none" => Ok(EvictionPolicy::None),
            _ => Err(format!("unknown eviction policy: {}", s)),
        }
    }
}

/// Cache settings, normally taken from the `[cache]` config section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Master switch
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Maximum number of cached complaints
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,

    /// Eviction policy
    #[serde(default)]
    pub eviction_policy: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_size: default_cache_max_size(),
            eviction_policy: EvictionPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// A configuration that turns caching off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether entries are actually retained.
    pub fn is_active(&self) -> bool {
        self.enabled && self.eviction_policy != EvictionPolicy::None && self.max_size > 0
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_max_size() -> usize {
    1000
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub max_size: usize,
    /// Percentage of reads served from cache, 0 when there were none
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
}

#[derive(Debug)]
struct Entry {
    complaint: Complaint,
    inserted: u64,
    last_used: AtomicU64,
}

/// Bounded complaint cache with LRU or FIFO eviction.
#[derive(Debug)]
pub struct ComplaintCache {
    config: CacheConfig,
    entries: RwLock<HashMap<ComplaintId, Entry>>,
    counters: Mutex<Counters>,
    clock: AtomicU64,
}

impl ComplaintCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            counters: Mutex::new(Counters::default()),
            clock: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_active()
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up a complaint, counting the hit or miss.
    pub fn get(&self, id: &ComplaintId) -> Option<Complaint> {
        if !self.is_enabled() {
            return None;
        }
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let found = entries.get(id).map(|entry| {
            entry.last_used.store(self.tick(), Ordering::Relaxed);
            entry.complaint.clone()
        });

        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        if found.is_some() {
            counters.hits += 1;
            tracing::trace!(id = %id, "cache hit");
        } else {
            counters.misses += 1;
            tracing::trace!(id = %id, "cache miss");
        }
        found
    }

    /// Look up a complaint without counting it or refreshing its recency.
    pub fn peek(&self, id: &ComplaintId) -> Option<Complaint> {
        if !self.is_enabled() {
            return None;
        }
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(id).map(|entry| entry.complaint.clone())
    }

    /// Insert or replace a complaint, evicting one entry if the cache is full.
    ///
    /// Returns the evicted ID, if any.
    pub fn set(&self, complaint: Complaint) -> Option<ComplaintId> {
        if !self.is_enabled() {
            return None;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let now = self.tick();

        if let Some(entry) = entries.get_mut(complaint.id()) {
            entry.complaint = complaint;
            entry.last_used.store(now, Ordering::Relaxed);
            return None;
        }

        let evicted = if entries.len() >= self.config.max_size {
            self.pick_victim(&entries).and_then(|victim| {
                entries.remove(&victim)?;
                Some(victim)
            })
        } else {
            None
        };

        if let Some(victim) = &evicted {
            let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
            counters.evictions += 1;
            tracing::debug!(
                evicted = %victim,
                policy = self.config.eviction_policy.as_str(),
                "cache eviction"
            );
        }

        entries.insert(
            complaint.id().clone(),
            Entry {
                complaint,
                inserted: now,
                last_used: AtomicU64::new(now),
            },
        );
        evicted
    }

    fn pick_victim(&self, entries: &HashMap<ComplaintId, Entry>) -> Option<ComplaintId> {
        let victim = match self.config.eviction_policy {
            EvictionPolicy::Lru => entries
                .iter()
                .min_by_key(|(_, e)| e.last_used.load(Ordering::Relaxed)),
            EvictionPolicy::Fifo => entries.iter().min_by_key(|(_, e)| e.inserted),
            EvictionPolicy::None => None,
        };
        victim.map(|(id, _)| id.clone())
    }

    /// Drop one entry. Not counted as an eviction.
    pub fn remove(&self, id: &ComplaintId) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(id).is_some()
    }

    /// Drop all entries, keeping counters.
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies of every cached complaint, without touching counters or recency.
    pub fn snapshot(&self) -> Vec<Complaint> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.values().map(|e| e.complaint.clone()).collect()
    }

    /// Consistent view of the counters.
    ///
    /// A disabled cache reports all zeros with `max_size` 0.
    pub fn stats(&self) -> CacheStats {
        if !self.is_enabled() {
            return CacheStats::default();
        }
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let total = counters.hits + counters.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            counters.hits as f64 / total as f64 * 100.0
        };
        CacheStats {
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
            size: entries.len(),
            max_size: self.config.max_size,
            hit_rate,
        }
    }
}
