//! Best-effort on-disk snapshot tier.
//!
//! One JSON file per cache name, rewritten whole on every store. A write
//! failure is logged and swallowed: the snapshot is a warm-start
//! convenience, never part of the correctness story.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
  pub payload: serde_json::Value,
  pub written_at: DateTime<Utc>,
  pub ttl_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
  data: HashMap<String, SnapshotEntry>,
  timestamp: DateTime<Utc>,
  expires_in: u64,
}

pub struct SnapshotStore {
  path: PathBuf,
  default_ttl_secs: u64,
}

impl SnapshotStore {
  pub fn new(dir: &Path, cache_name: &str, default_ttl_secs: u64) -> Self {
    Self {
      path: dir.join(format!("{}.json", cache_name)),
      default_ttl_secs,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Load the snapshot, if one exists and parses. Errors are logged and
  /// treated as an empty snapshot.
  pub fn load(&self) -> HashMap<String, SnapshotEntry> {
    let contents = match std::fs::read_to_string(&self.path) {
      Ok(c) => c,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
      Err(e) => {
        warn!(path = %self.path.display(), error = %e, "failed to read cache snapshot");
        return HashMap::new();
      }
    };

    match serde_json::from_str::<SnapshotFile>(&contents) {
      Ok(file) => {
        debug!(
          path = %self.path.display(),
          entries = file.data.len(),
          "loaded cache snapshot"
        );
        file.data
      }
      Err(e) => {
        warn!(path = %self.path.display(), error = %e, "failed to parse cache snapshot");
        HashMap::new()
      }
    }
  }

  /// Rewrite the snapshot file from the full entry map. Best-effort.
  pub fn store(&self, entries: &HashMap<String, SnapshotEntry>) {
    let file = SnapshotFile {
      data: entries.clone(),
      timestamp: Utc::now(),
      expires_in: self.default_ttl_secs,
    };

    let result = serde_json::to_string(&file).map_err(std::io::Error::other).and_then(|json| {
      if let Some(parent) = self.path.parent() {
        std::fs::create_dir_all(parent)?;
      }
      std::fs::write(&self.path, json)
    });

    if let Err(e) = result {
      warn!(path = %self.path.display(), error = %e, "failed to write cache snapshot");
    }
  }
}
