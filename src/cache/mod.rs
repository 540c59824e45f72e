//! Tiered TTL cache in front of expensive reads.
//!
//! This module provides a store-agnostic caching mechanism that:
//! - Caches JSON payloads under entity-plus-period keys with long TTLs
//! - Serves a broad "global" fallback key, marked stale, when a narrow
//!   per-period key has not been populated yet
//! - Optionally mirrors writes to an on-disk snapshot so a restart can
//!   rehydrate without an immediate re-fetch
//!
//! Instances are constructed explicitly and injected; there is no global
//! cache. `Clone` shares the instance, like a handle.

mod snapshot;

pub use snapshot::SnapshotStore;

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use snapshot::SnapshotEntry;

#[derive(Debug, Clone)]
struct Entry {
  payload: Value,
  written_at: DateTime<Utc>,
  ttl: Duration,
}

impl Entry {
  fn is_expired(&self, now: DateTime<Utc>) -> bool {
    let age = now.signed_duration_since(self.written_at);
    age.to_std().map_or(true, |age| age > self.ttl)
  }
}

/// A successful cache lookup.
#[derive(Debug, Clone)]
pub struct CacheHit {
  pub payload: Value,
  /// True when this came from the broad fallback key rather than the
  /// requested one: usable, but degraded.
  pub stale: bool,
}

/// Counters for the cache-inspection surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatus {
  pub name: String,
  pub entries: usize,
  pub expired: usize,
  pub snapshot_path: Option<String>,
}

struct Inner {
  name: String,
  default_ttl: Duration,
  global_ttl: Duration,
  /// Fallback key refreshed on every set; None disables the fallback tier.
  global_key: Option<String>,
  entries: Mutex<HashMap<String, Entry>>,
  snapshot: Option<SnapshotStore>,
}

#[derive(Clone)]
pub struct TtlCache {
  inner: Arc<Inner>,
}

impl TtlCache {
  pub fn new(name: &str, default_ttl: Duration) -> Self {
    Self {
      inner: Arc::new(Inner {
        name: name.to_string(),
        default_ttl,
        global_ttl: default_ttl,
        global_key: None,
        entries: Mutex::new(HashMap::new()),
        snapshot: None,
      }),
    }
  }

  /// Enable the broad fallback key for derived-metrics caches.
  pub fn with_global_key(self, key: &str, ttl: Duration) -> Self {
    let mut inner = self.into_inner();
    inner.global_key = Some(key.to_string());
    inner.global_ttl = ttl;
    Self {
      inner: Arc::new(inner),
    }
  }

  /// Enable the on-disk snapshot tier, rehydrating from an existing file.
  pub fn with_snapshot_dir(self, dir: &Path) -> Self {
    let mut inner = self.into_inner();
    let store = SnapshotStore::new(dir, &inner.name, inner.default_ttl.as_secs());

    let now = Utc::now();
    let mut entries = HashMap::new();
    for (key, entry) in store.load() {
      let restored = Entry {
        payload: entry.payload,
        written_at: entry.written_at,
        ttl: Duration::from_secs(entry.ttl_secs),
      };
      if !restored.is_expired(now) {
        entries.insert(key, restored);
      }
    }

    inner.entries = Mutex::new(entries);
    inner.snapshot = Some(store);
    Self {
      inner: Arc::new(inner),
    }
  }

  // Builder steps run before the cache is shared, so the Arc is still
  // uniquely owned here.
  fn into_inner(self) -> Inner {
    Arc::into_inner(self.inner).expect("cache configured after being shared")
  }

  /// Look up a key: exact hit first, then the global fallback (marked
  /// stale). Expired entries are misses.
  pub fn get(&self, key: &str) -> Option<CacheHit> {
    let entries = self.lock();
    let now = Utc::now();

    if let Some(entry) = entries.get(key) {
      if !entry.is_expired(now) {
        return Some(CacheHit {
          payload: entry.payload.clone(),
          stale: false,
        });
      }
    }

    let global_key = self.inner.global_key.as_deref()?;
    if global_key == key {
      return None;
    }
    let entry = entries.get(global_key)?;
    if entry.is_expired(now) {
      return None;
    }

    debug!(
      cache = %self.inner.name,
      key,
      written_at = %entry.written_at,
      "serving global fallback"
    );
    Some(CacheHit {
      payload: entry.payload.clone(),
      stale: true,
    })
  }

  /// Store a payload under a key. The global fallback key, when configured,
  /// is refreshed alongside so later fallbacks stay current.
  pub fn set(&self, key: &str, payload: Value, ttl: Option<Duration>) {
    let mut entries = self.lock();
    let now = Utc::now();

    if let Some(global_key) = self.inner.global_key.as_deref() {
      if global_key != key {
        entries.insert(
          global_key.to_string(),
          Entry {
            payload: payload.clone(),
            written_at: now,
            ttl: self.inner.global_ttl,
          },
        );
      }
    }

    entries.insert(
      key.to_string(),
      Entry {
        payload,
        written_at: now,
        ttl: ttl.unwrap_or(self.inner.default_ttl),
      },
    );

    self.write_snapshot(&entries);
  }

  /// Drop every key with the given prefix. Returns how many were dropped.
  pub fn clear(&self, prefix: &str) -> usize {
    let mut entries = self.lock();
    let before = entries.len();
    entries.retain(|key, _| !key.starts_with(prefix));
    let dropped = before - entries.len();

    if dropped > 0 {
      debug!(cache = %self.inner.name, prefix, dropped, "cleared cache prefix");
      self.write_snapshot(&entries);
    }
    dropped
  }

  pub fn clear_all(&self) -> usize {
    let mut entries = self.lock();
    let dropped = entries.len();
    entries.clear();
    self.write_snapshot(&entries);
    dropped
  }

  pub fn status(&self) -> CacheStatus {
    let entries = self.lock();
    let now = Utc::now();
    let expired = entries.values().filter(|e| e.is_expired(now)).count();

    CacheStatus {
      name: self.inner.name.clone(),
      entries: entries.len(),
      expired,
      snapshot_path: self
        .inner
        .snapshot
        .as_ref()
        .map(|s| s.path().display().to_string()),
    }
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
    // A poisoned cache mutex only means a panic mid-insert; the map itself
    // is still usable.
    self
      .inner
      .entries
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn write_snapshot(&self, entries: &HashMap<String, Entry>) {
    let Some(store) = &self.inner.snapshot else {
      return;
    };
    let data: HashMap<String, SnapshotEntry> = entries
      .iter()
      .map(|(key, entry)| {
        (
          key.clone(),
          SnapshotEntry {
            payload: entry.payload.clone(),
            written_at: entry.written_at,
            ttl_secs: entry.ttl.as_secs(),
          },
        )
      })
      .collect();
    store.store(&data);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_set_then_get_returns_payload() {
    let cache = TtlCache::new("test", Duration::from_secs(60));
    cache.set("employees_week_2024_10", json!([1, 2, 3]), None);

    let hit = cache.get("employees_week_2024_10").unwrap();
    assert_eq!(hit.payload, json!([1, 2, 3]));
    assert!(!hit.stale);
  }

  #[test]
  fn test_expired_entry_is_a_miss() {
    let cache = TtlCache::new("test", Duration::from_secs(60));
    cache.set("key", json!(1), Some(Duration::ZERO));

    assert!(cache.get("key").is_none());
  }

  #[test]
  fn test_global_fallback_served_stale() {
    let cache = TtlCache::new("hours", Duration::from_secs(60))
      .with_global_key("hours:global", Duration::from_secs(120));

    cache.set("hours:42:week:2024-10", json!({"expected": 40.0}), None);

    // A different narrow key was never populated; the global fallback
    // steps in, flagged stale.
    let hit = cache.get("hours:42:week:2024-11").unwrap();
    assert!(hit.stale);
    assert_eq!(hit.payload, json!({"expected": 40.0}));
  }

  #[test]
  fn test_no_fallback_without_global_key() {
    let cache = TtlCache::new("entities", Duration::from_secs(60));
    cache.set("employees:list", json!([]), None);
    assert!(cache.get("employees:other").is_none());
  }

  #[test]
  fn test_expired_narrow_key_falls_back_to_global() {
    let cache = TtlCache::new("hours", Duration::from_secs(60))
      .with_global_key("hours:global", Duration::from_secs(3600));

    cache.set("hours:42:week:2024-10", json!("fresh"), Some(Duration::ZERO));

    let hit = cache.get("hours:42:week:2024-10").unwrap();
    assert!(hit.stale);
  }

  #[test]
  fn test_clear_prefix_only_drops_matching_keys() {
    let cache = TtlCache::new("test", Duration::from_secs(60));
    cache.set("employees:1", json!(1), None);
    cache.set("employees:2", json!(2), None);
    cache.set("holidays:2024", json!(3), None);

    assert_eq!(cache.clear("employees:"), 2);
    assert!(cache.get("employees:1").is_none());
    assert!(cache.get("holidays:2024").is_some());
  }

  #[test]
  fn test_clear_all() {
    let cache = TtlCache::new("test", Duration::from_secs(60));
    cache.set("a", json!(1), None);
    cache.set("b", json!(2), None);

    assert_eq!(cache.clear_all(), 2);
    assert_eq!(cache.status().entries, 0);
  }

  #[test]
  fn test_snapshot_rehydrates_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
      let cache =
        TtlCache::new("hours", Duration::from_secs(3600)).with_snapshot_dir(dir.path());
      cache.set("hours:42:week:2024-10", json!({"expected": 40.0}), None);
    }

    // New process, same snapshot dir.
    let cache = TtlCache::new("hours", Duration::from_secs(3600)).with_snapshot_dir(dir.path());
    let hit = cache.get("hours:42:week:2024-10").unwrap();
    assert_eq!(hit.payload, json!({"expected": 40.0}));
  }

  #[test]
  fn test_snapshot_skips_expired_entries_on_load() {
    let dir = tempfile::tempdir().unwrap();

    {
      let cache = TtlCache::new("hours", Duration::from_secs(3600)).with_snapshot_dir(dir.path());
      cache.set("hours:old", json!(1), Some(Duration::ZERO));
      cache.set("hours:live", json!(2), None);
    }

    let cache = TtlCache::new("hours", Duration::from_secs(3600)).with_snapshot_dir(dir.path());
    assert!(cache.get("hours:old").is_none());
    assert!(cache.get("hours:live").is_some());
  }
}
