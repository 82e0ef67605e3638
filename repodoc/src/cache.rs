//! File-backed result cache
//!
//! One JSON file per (tool, arguments) pair under a shared root. The file's
//! modification time is the freshness clock. Every failure inside the cache
//! is logged and reported as a miss; a cache problem never fails a call.

use crate::types::{ToolCall, ToolResult};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

const ENTRY_EXTENSION: &str = "json";

/// Hit/miss counters of a [`ResponseCache`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Fresh entries returned
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
    /// Entries removed because they were stale or unreadable
    pub evictions: u64,
    /// Entries written
    pub writes: u64,
}

impl CacheStats {
    /// Fraction of lookups that were hits
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    writes: AtomicU64,
}

/// Derive the storage key: SHA-256 hex of `"{tool}:{canonical arguments}"`
pub fn cache_key(call: &ToolCall) -> String {
    let mut hasher = Sha256::new();
    hasher.update(call.name.as_bytes());
    hasher.update(b":");
    hasher.update(call.canonical_arguments().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Content-addressed, time-bounded store of tool results
#[derive(Debug)]
pub struct ResponseCache {
    root: PathBuf,
    ttl: Duration,
    counters: Counters,
}

impl ResponseCache {
    /// Cache rooted at `root`; the directory is created on first write
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
            counters: Counters::default(),
        }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Freshness window
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// File that holds the entry for `call`
    pub fn entry_path(&self, call: &ToolCall) -> PathBuf {
        self.root
            .join(cache_key(call))
            .with_extension(ENTRY_EXTENSION)
    }

    /// Return the cached result for `call` if a fresh, readable entry exists.
    ///
    /// Stale and corrupt entries are deleted.
    pub fn lookup(&self, call: &ToolCall) -> Option<ToolResult> {
        let path = self.entry_path(call);

        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => return self.miss(),
        };

        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age >= self.ttl {
            tracing::debug!("Cache entry for {} expired ({:?} old)", call.name, age);
            self.evict(&path);
            return self.miss();
        }

        let parsed = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<ToolResult>(&content).map_err(|e| e.to_string())
            });

        match parsed {
            Ok(result) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Cache hit for {}", call);
                Some(result)
            }
            Err(e) => {
                tracing::warn!("Evicting unreadable cache entry {}: {}", path.display(), e);
                self.evict(&path);
                self.miss()
            }
        }
    }

    /// Persist `result` for `call`, replacing any previous entry whole.
    ///
    /// Absent results are not stored.
    pub fn store(&self, call: &ToolCall, result: &ToolResult) {
        if result.is_absent() {
            return;
        }
        match self.write_entry(call, result) {
            Ok(path) => {
                self.counters.writes.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Cached {} at {}", call.name, path.display());
            }
            Err(e) => tracing::warn!("Failed to cache result for {}: {}", call.name, e),
        }
    }

    fn write_entry(&self, call: &ToolCall, result: &ToolResult) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let path = self.entry_path(call);

        let mut staged = tempfile::NamedTempFile::new_in(&self.root)?;
        serde_json::to_writer(&mut staged, result)?;
        staged.flush()?;
        staged.persist(&path).map_err(|e| e.error)?;

        Ok(path)
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
        }
    }

    fn miss(&self) -> Option<ToolResult> {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn evict(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => {
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not remove cache entry {}: {}", path.display(), e),
        }
    }
}
