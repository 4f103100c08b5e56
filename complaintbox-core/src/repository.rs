//! Complaint repository: file store plus write-through cache
//!
//! ## Read and write paths
//!
//! ```text
//! save/update/resolve ──► per-ID lock ──► FileStore (authoritative) ──► cache
//! find_by_id ──► cache ──(miss)──► per-ID lock ──► FileStore ──► cache
//! filters/search ──► warmed cache (if complete) or FileStore scan
//! ```
//!
//! Writes to one complaint ID are serialized by a per-ID mutex so concurrent
//! resolves cannot interleave. Every cache insert happens under that same
//! mutex, after the disk write it reflects, so the cache never holds an older
//! copy than the disk. Cache hits take no lock.
//!
//! ## Warm view
//!
//! After [`Repository::warm_cache`] loads every record and nothing has been
//! evicted since, the cache holds a complete copy of the store and filter
//! queries scan it instead of the disk. Any eviction drops back to disk
//! scans. The warm view only reflects writes made through this repository.

use crate::cache::{CacheConfig, CacheStats, ComplaintCache};
use crate::cancel::CancelToken;
use crate::complaint::{Complaint, ResolveOutcome, Severity};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ids::{AgentId, ComplaintId, ProjectId, SessionId};
use crate::store::{self, FileStore, StoreConfig};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Largest page size accepted by listing and filter calls.
pub const MAX_LIMIT: usize = 1000;

/// Complaint storage with an in-memory cache in front of it.
///
/// `Repository` is `Send + Sync`; share it across threads with an `Arc`.
#[derive(Debug)]
pub struct Repository {
    store: FileStore,
    cache: ComplaintCache,
    write_locks: Mutex<HashMap<ComplaintId, Arc<Mutex<()>>>>,
    /// Eviction count right after a complete warm, if there was one
    warm_mark: Mutex<Option<u64>>,
    /// Bumped under the per-ID lock by every committed write
    write_generation: AtomicU64,
}

impl Repository {
    pub fn new(store: FileStore, cache: ComplaintCache) -> Self {
        Self {
            store,
            cache,
            write_locks: Mutex::new(HashMap::new()),
            warm_mark: Mutex::new(None),
            write_generation: AtomicU64::new(0),
        }
    }

    /// Open the store and build a cache from explicit settings.
    pub fn open(store: StoreConfig, cache: CacheConfig) -> Result<Self> {
        Ok(Self::new(FileStore::open(store)?, ComplaintCache::new(cache)))
    }

    /// Open using the `[storage]` and `[cache]` sections of a loaded config.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Self::open(config.storage.clone(), config.cache.clone())
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Run `f` while holding the write lock for `id`.
    fn with_write_lock<T>(&self, id: &ComplaintId, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = {
            let mut locks = self.write_locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(id.clone()).or_default().clone()
        };
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        // Drop the map entry once nobody else holds or waits on it.
        let mut locks = self.write_locks.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
        result
    }

    /// Record that a write for some ID has reached the disk. Call with the lock held.
    fn committed(&self) {
        self.write_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Persist a complaint and cache it.
    ///
    /// If the disk write fails the cache is left untouched.
    pub fn save(&self, cancel: &CancelToken, complaint: &Complaint) -> Result<PathBuf> {
        let id = complaint.id().clone();
        self.with_write_lock(&id, || {
            complaint.validate()?;
            let path = self.store.save(cancel, complaint)?;
            self.committed();
            self.cache.set(complaint.clone());
            tracing::info!(
                id = %id,
                agent = %complaint.agent_id(),
                severity = %complaint.severity(),
                "Saved complaint"
            );
            Ok(path)
        })
        .map_err(|e| e.within("save", Some(id.as_str())))
    }

    /// Rewrite a complaint that already exists.
    pub fn update(&self, cancel: &CancelToken, complaint: &Complaint) -> Result<()> {
        let id = complaint.id().clone();
        self.with_write_lock(&id, || {
            complaint.validate()?;
            self.store.update(cancel, complaint)?;
            self.committed();
            self.cache.set(complaint.clone());
            tracing::info!(id = %id, "Updated complaint");
            Ok(())
        })
        .map_err(|e| e.within("update", Some(id.as_str())))
    }

    /// Remove a complaint from disk and cache.
    pub fn delete(&self, cancel: &CancelToken, id: &ComplaintId) -> Result<()> {
        self.with_write_lock(id, || {
            self.store.delete(cancel, id)?;
            self.committed();
            self.cache.remove(id);
            tracing::info!(id = %id, "Deleted complaint");
            Ok(())
        })
        .map_err(|e| e.within("delete", Some(id.as_str())))
    }

    /// Look up one complaint, cache first.
    pub fn find_by_id(&self, cancel: &CancelToken, id: &ComplaintId) -> Result<Complaint> {
        self.load(cancel, id)
            .map_err(|e| e.within("find_by_id", Some(id.as_str())))
    }

    fn load(&self, cancel: &CancelToken, id: &ComplaintId) -> Result<Complaint> {
        cancel.check("find_by_id")?;
        if let Some(hit) = self.cache.get(id) {
            return Ok(hit);
        }
        self.with_write_lock(id, || self.load_locked(cancel, id))
    }

    /// Cache, then disk, filling the cache on the way out. Call with the lock held.
    fn load_locked(&self, cancel: &CancelToken, id: &ComplaintId) -> Result<Complaint> {
        cancel.check("find_by_id")?;
        if let Some(current) = self.cache.peek(id) {
            return Ok(current);
        }
        let complaint = self.store.find_by_id(cancel, id)?;
        self.cache.set(complaint.clone());
        Ok(complaint)
    }

    /// Resolve a complaint on behalf of `resolver` and return the result.
    ///
    /// Repeating the call with the same resolver succeeds without writing.
    /// A different resolver gets [`Error::AlreadyResolved`].
    pub fn resolve(
        &self,
        cancel: &CancelToken,
        id: &ComplaintId,
        resolver: &AgentId,
    ) -> Result<Complaint> {
        self.with_write_lock(id, || {
            let mut complaint = self.load_locked(cancel, id)?;
            match complaint.resolve(resolver)? {
                ResolveOutcome::Unchanged => {
                    tracing::debug!(id = %id, resolver = %resolver, "Complaint already resolved");
                }
                ResolveOutcome::Resolved => {
                    self.store.save(cancel, &complaint)?;
                    self.committed();
                    self.cache.set(complaint.clone());
                    tracing::info!(id = %id, resolver = %resolver, "Resolved complaint");
                }
            }
            Ok(complaint)
        })
        .map_err(|e| e.within("resolve", Some(id.as_str())))
    }

    /// One page of complaints, oldest first.
    pub fn find_all(&self, cancel: &CancelToken, limit: usize, offset: usize) -> Result<Vec<Complaint>> {
        check_limit(limit).map_err(|e| e.within("find_all", None))?;
        match self.warm_view() {
            Some(all) => {
                cancel.check("find_all")?;
                Ok(all.into_iter().skip(offset).take(limit).collect())
            }
            None => self
                .store
                .find_all(cancel, limit, offset)
                .map_err(|e| e.within("find_all", None)),
        }
    }

    pub fn find_by_session(&self, cancel: &CancelToken, session: &SessionId) -> Result<Vec<Complaint>> {
        self.scan(cancel, "find_by_session", None, |c| c.session_id() == session)
    }

    pub fn find_by_project(&self, cancel: &CancelToken, project: &ProjectId) -> Result<Vec<Complaint>> {
        self.scan(cancel, "find_by_project", None, |c| c.project_id() == project)
    }

    pub fn find_by_agent(&self, cancel: &CancelToken, agent: &AgentId) -> Result<Vec<Complaint>> {
        self.scan(cancel, "find_by_agent", None, |c| c.agent_id() == agent)
    }

    pub fn find_by_severity(
        &self,
        cancel: &CancelToken,
        severity: Severity,
        limit: usize,
    ) -> Result<Vec<Complaint>> {
        check_limit(limit).map_err(|e| e.within("find_by_severity", None))?;
        self.scan(cancel, "find_by_severity", Some(limit), |c| c.severity() == severity)
    }

    pub fn find_unresolved(&self, cancel: &CancelToken, limit: usize) -> Result<Vec<Complaint>> {
        check_limit(limit).map_err(|e| e.within("find_unresolved", None))?;
        self.scan(cancel, "find_unresolved", Some(limit), |c| !c.is_resolved())
    }

    /// Case-insensitive substring search over task, context, missing info,
    /// and confused-by text.
    pub fn search(&self, cancel: &CancelToken, query: &str, limit: usize) -> Result<Vec<Complaint>> {
        check_limit(limit).map_err(|e| e.within("search", None))?;
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(Error::validation("query", "must not be empty").within("search", None));
        }
        self.scan(cancel, "search", Some(limit), |c| c.matches_text(&needle))
    }

    fn scan<P>(
        &self,
        cancel: &CancelToken,
        operation: &'static str,
        limit: Option<usize>,
        predicate: P,
    ) -> Result<Vec<Complaint>>
    where
        P: Fn(&Complaint) -> bool,
    {
        let found = match self.warm_view() {
            Some(all) => {
                cancel.check(operation)?;
                Ok(all
                    .into_iter()
                    .filter(|c| predicate(c))
                    .take(limit.unwrap_or(usize::MAX))
                    .collect())
            }
            None => self.store.find_where(cancel, limit, predicate),
        }
        .map_err(|e| e.within(operation, None))?;
        tracing::debug!(operation, matches = found.len(), "Scanned complaints");
        Ok(found)
    }

    /// Load every stored complaint into the cache. Returns how many were loaded.
    ///
    /// When everything fits, later filter calls read from the cache. Writes may
    /// run concurrently: entries they already cached are kept, and a scanned
    /// copy that a later write may have superseded is read again from disk.
    pub fn warm_cache(&self, cancel: &CancelToken) -> Result<usize> {
        let generation = self.write_generation.load(Ordering::SeqCst);
        let all = self
            .store
            .load_all(cancel)
            .map_err(|e| e.within("warm_cache", None))?;
        let evictions_before = self.cache.stats().evictions;
        for scanned in all.iter() {
            cancel.check("warm_cache")?;
            self.with_write_lock(scanned.id(), || self.warm_one(cancel, scanned, generation))
                .map_err(|e| e.within("warm_cache", Some(scanned.id().as_str())))?;
        }

        let stats = self.cache.stats();
        let complete = self.cache.is_enabled() && stats.evictions == evictions_before;
        *self.warm_mark.lock().unwrap_or_else(PoisonError::into_inner) =
            complete.then_some(stats.evictions);

        tracing::info!(
            loaded = all.len(),
            cache_size = stats.size,
            complete,
            "Warmed complaint cache"
        );
        Ok(all.len())
    }

    /// Cache one scanned record. Call with the lock for its ID held.
    fn warm_one(&self, cancel: &CancelToken, scanned: &Complaint, generation: u64) -> Result<()> {
        if self.cache.peek(scanned.id()).is_some() {
            return Ok(());
        }
        if self.write_generation.load(Ordering::SeqCst) == generation {
            self.cache.set(scanned.clone());
            return Ok(());
        }
        match self.store.find_by_id(cancel, scanned.id()) {
            Ok(current) => {
                self.cache.set(current);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(id = %scanned.id(), "Complaint deleted during warm");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// The full record set from cache, if the cache still holds all of it.
    fn warm_view(&self) -> Option<Vec<Complaint>> {
        let mark = (*self.warm_mark.lock().unwrap_or_else(PoisonError::into_inner))?;
        if !self.cache.is_enabled() || self.cache.stats().evictions != mark {
            return None;
        }
        let mut all = self.cache.snapshot();
        if self.cache.stats().evictions != mark {
            return None;
        }
        store::sort_chronologically(&mut all);
        Some(all)
    }

    /// Drop every cached complaint and leave the warm view.
    ///
    /// Use after other processes have changed the directory; a following
    /// [`Repository::warm_cache`] picks their records up.
    pub fn clear_cache(&self) {
        *self.warm_mark.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.cache.clear();
        tracing::info!("Cleared complaint cache");
    }

    /// Cache counters; all zero when caching is disabled.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Path of the record file for `id`.
    pub fn file_path(&self, cancel: &CancelToken, id: &ComplaintId) -> Result<PathBuf> {
        self.store
            .file_path(cancel, id)
            .map_err(|e| e.within("file_path", Some(id.as_str())))
    }

    /// Path of the Markdown mirror for `id`, or `None` if the mirror is off.
    pub fn docs_path(&self, cancel: &CancelToken, id: &ComplaintId) -> Result<Option<PathBuf>> {
        let complaint = self.find_by_id(cancel, id)?;
        Ok(self.store.docs_path(&complaint))
    }
}

fn check_limit(limit: usize) -> Result<()> {
    if limit == 0 || limit > MAX_LIMIT {
        return Err(Error::validation(
            "limit",
            format!("must be between 1 and {MAX_LIMIT}, got {limit}"),
        ));
    }
    Ok(())
}
