//! API response cache
//!
//! Entries are keyed by the credential that fetched them, so one user's
//! token never serves another user's data.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::utils::sha256_hash;

/// Owning key of a cached response
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// SHA-256 of the credential, never the credential itself
    credential: String,
    endpoint: String,
    params: String,
}

impl CacheKey {
    pub fn new(credential: &str, endpoint: &str, params: &[(&str, String)]) -> Self {
        let params = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        Self {
            credential: credential_digest(credential),
            endpoint: endpoint.to_string(),
            params,
        }
    }
}

pub fn credential_digest(credential: &str) -> String {
    sha256_hash(credential.as_bytes())
}

#[derive(Debug, Clone)]
struct ResponseCacheEntry {
    value: Value,
    cached_at: Instant,
}

/// In-memory response cache with TTL and capacity bound
pub struct ResponseCache {
    entries: RwLock<HashMap<CacheKey, ResponseCacheEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl ResponseCache {
    /// Create a new response cache
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity,
        }
    }

    /// Fresh value for `key`, if any
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|e| e.cached_at.elapsed() < self.ttl)
            .map(|e| e.value.clone())
    }

    /// Insert a response, evicting expired entries and then the oldest
    pub fn insert(&self, key: CacheKey, value: Value) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        if entries.len() >= self.capacity {
            let ttl = self.ttl;
            entries.retain(|_, e| e.cached_at.elapsed() < ttl);
        }
        if entries.len() >= self.capacity {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.cached_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            ResponseCacheEntry {
                value,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop every entry fetched with `credential`
    pub fn invalidate_credential(&self, credential: &str) -> usize {
        let digest = credential_digest(credential);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|k, _| k.credential != digest);
        before - entries.len()
    }

    /// Clear the cache
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    /// Get cache size
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
