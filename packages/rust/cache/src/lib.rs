//! Dedup cache — the durable set of already-processed CVE identifiers.
//!
//! The cache only grows: feed identifiers are globally unique and never
//! reused, so there is no eviction. The pipeline owns the cache exclusively
//! for the duration of a cycle: load at process start, mutate in memory,
//! persist before the report is written.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use otwatch_shared::{OtWatchError, Result};

// ---------------------------------------------------------------------------
// DedupCache trait
// ---------------------------------------------------------------------------

/// Injected cache abstraction so tests can use an in-memory stand-in.
pub trait DedupCache: Send + Sync {
    /// Whether `cve_id` was processed in any prior cycle.
    fn contains(&self, cve_id: &str) -> bool;

    /// Mark `cve_id` as processed. Returns false if it was already present.
    fn insert(&mut self, cve_id: &str) -> bool;

    /// Number of identifiers tracked.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the current identifier set to durable storage.
    fn persist(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// FileDedupCache
// ---------------------------------------------------------------------------

/// File-backed cache: a JSON array of identifier strings.
#[derive(Debug)]
pub struct FileDedupCache {
    path: PathBuf,
    ids: HashSet<String>,
}

impl FileDedupCache {
    /// Load the cache from `path`. A missing file yields an empty cache; a
    /// file that exists but cannot be read or parsed is corruption and is
    /// fatal — reprocessing previously handled records must never happen
    /// silently.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.exists() {
            debug!(?path, "no dedup cache file, starting empty");
            return Ok(Self {
                path,
                ids: HashSet::new(),
            });
        }

        let content = std::fs::read_to_string(&path).map_err(|e| OtWatchError::CacheCorrupt {
            path: path.clone(),
            message: format!("unreadable: {e}"),
        })?;

        let ids: Vec<String> =
            serde_json::from_str(&content).map_err(|e| OtWatchError::CacheCorrupt {
                path: path.clone(),
                message: format!("invalid JSON: {e}"),
            })?;

        info!(count = ids.len(), ?path, "loaded dedup cache");
        Ok(Self {
            path,
            ids: ids.into_iter().collect(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DedupCache for FileDedupCache {
    fn contains(&self, cve_id: &str) -> bool {
        self.ids.contains(cve_id)
    }

    fn insert(&mut self, cve_id: &str) -> bool {
        self.ids.insert(cve_id.to_string())
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| OtWatchError::io(parent, e))?;
            }
        }

        // Sorted output keeps the file diffable across cycles.
        let mut ids: Vec<&str> = self.ids.iter().map(String::as_str).collect();
        ids.sort_unstable();

        let content = serde_json::to_string_pretty(&ids)
            .map_err(|e| OtWatchError::validation(format!("cache serialization: {e}")))?;
        std::fs::write(&self.path, content).map_err(|e| OtWatchError::io(&self.path, e))?;

        debug!(count = ids.len(), path = ?self.path, "persisted dedup cache");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryDedupCache
// ---------------------------------------------------------------------------

/// In-memory cache for tests and ephemeral runs. `persist` is a no-op.
#[derive(Debug, Default)]
pub struct MemoryDedupCache {
    ids: HashSet<String>,
}

impl MemoryDedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

impl DedupCache for MemoryDedupCache {
    fn contains(&self, cve_id: &str) -> bool {
        self.ids.contains(cve_id)
    }

    fn insert(&mut self, cve_id: &str) -> bool {
        self.ids.insert(cve_id.to_string())
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn persist(&self) -> Result<()> {
        Ok(())
    }
}
