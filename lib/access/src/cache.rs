//! Time-expiring, size-bounded cache of user roles.
//!
//! Shared by every request task. Entries expire a fixed time after they were
//! loaded; when the cache is full the least recently used entry is evicted.
//! Concurrent misses for the same user wait on a per-user gate so that only
//! one loader call is in flight per user.

use pocketbook_core::UserId;
use rootcause::Report;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::error::StoreError;
use crate::role::{RoleLoader, RoleSet};

/// Role cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleCacheConfig {
    /// Lifetime of a cached entry, in seconds.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Maximum number of users held at once.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Deadline for one loader call, in milliseconds.
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
}

fn default_ttl_seconds() -> u64 {
    60
}

fn default_capacity() -> usize {
    200
}

fn default_load_timeout_ms() -> u64 {
    2000
}

impl Default for RoleCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            capacity: default_capacity(),
            load_timeout_ms: default_load_timeout_ms(),
        }
    }
}

struct CacheEntry {
    roles: RoleSet,
    loaded_at: Instant,
    last_used: u64,
}

#[derive(Default)]
struct Entries {
    map: HashMap<UserId, CacheEntry>,
    clock: u64,
}

/// Caches [`RoleLoader`] results per user.
pub struct RoleCache {
    loader: Arc<dyn RoleLoader>,
    ttl: Duration,
    capacity: usize,
    load_timeout: Duration,
    entries: Mutex<Entries>,
    gates: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

impl RoleCache {
    #[must_use]
    pub fn new(loader: Arc<dyn RoleLoader>, config: &RoleCacheConfig) -> Self {
        Self {
            loader,
            ttl: Duration::from_secs(config.ttl_seconds),
            capacity: config.capacity,
            load_timeout: Duration::from_millis(config.load_timeout_ms),
            entries: Mutex::new(Entries::default()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the roles of `user_id`, loading them on a miss.
    ///
    /// Loader failures are returned to the caller and never cached.
    pub async fn get_roles(&self, user_id: &UserId) -> Result<RoleSet, Report<StoreError>> {
        if let Some(roles) = self.lookup(user_id) {
            debug!(%user_id, "role cache hit");
            return Ok(roles);
        }

        let gate = self.gate(user_id);
        let _permit = gate.lock().await;

        // Filled by another caller while this one waited on the gate.
        if let Some(roles) = self.lookup(user_id) {
            debug!(%user_id, "role cache filled while waiting");
            self.release(user_id, &gate);
            return Ok(roles);
        }

        let result = self.load(user_id).await;
        if let Ok(roles) = &result {
            self.insert(user_id, roles.clone());
        }
        self.release(user_id, &gate);
        result
    }

    /// Drops the cached entry of `user_id`, if any.
    pub fn invalidate(&self, user_id: &UserId) {
        self.entries().map.remove(user_id);
    }

    /// Number of cached users, including entries that expired but have not
    /// been swept yet.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[instrument(skip_all, fields(%user_id))]
    async fn load(&self, user_id: &UserId) -> Result<RoleSet, Report<StoreError>> {
        match tokio::time::timeout(self.load_timeout, self.loader.load_roles(user_id)).await {
            Ok(Ok(roles)) => {
                debug!(count = roles.roles().len(), "loaded roles");
                Ok(roles)
            }
            Ok(Err(report)) => {
                warn!(error = %report, "role load failed");
                Err(report)
            }
            Err(_) => {
                warn!(timeout_ms = self.load_timeout.as_millis() as u64, "role load timed out");
                Err(StoreError::Timeout.into())
            }
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, user_id: &UserId) -> Option<RoleSet> {
        let mut entries = self.entries();
        entries.clock += 1;
        let now = entries.clock;

        match entries.map.get_mut(user_id) {
            None => return None,
            Some(entry) if entry.loaded_at.elapsed() < self.ttl => {
                entry.last_used = now;
                return Some(entry.roles.clone());
            }
            Some(_) => {}
        }
        entries.map.remove(user_id);
        None
    }

    fn insert(&self, user_id: &UserId, roles: RoleSet) {
        if self.capacity == 0 {
            return;
        }

        let mut entries = self.entries();
        entries.clock += 1;
        let now = entries.clock;

        if !entries.map.contains_key(user_id) && entries.map.len() >= self.capacity {
            let ttl = self.ttl;
            entries.map.retain(|_, e| e.loaded_at.elapsed() < ttl);
        }
        if !entries.map.contains_key(user_id) && entries.map.len() >= self.capacity {
            let victim = entries
                .map
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(id, _)| id.clone());
            if let Some(victim) = victim {
                debug!(user_id = %victim, "evicting least recently used roles");
                entries.map.remove(&victim);
            }
        }

        entries.map.insert(
            user_id.clone(),
            CacheEntry {
                roles,
                loaded_at: Instant::now(),
                last_used: now,
            },
        );
    }

    fn gate(&self, user_id: &UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        gates.entry(user_id.clone()).or_default().clone()
    }

    fn release(&self, user_id: &UserId, gate: &Arc<tokio::sync::Mutex<()>>) {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        // Waiters still hold clones; the gate is only forgotten once idle.
        if gates.get(user_id).is_some_and(|g| Arc::ptr_eq(g, gate)) && Arc::strong_count(gate) <= 2
        {
            gates.remove(user_id);
        }
    }
}
