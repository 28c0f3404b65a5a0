//! Freshness-aware memo cache for parsed datasets.
//!
//! Entries are keyed by file id and sheet selector. Every lookup recomputes
//! the file's fingerprint from live remote metadata, so an edit made within
//! the TTL window is still noticed. Once the TTL has passed, a matching
//! fingerprint revalidates the entry instead of forcing a download.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SheetSelector;
use crate::dataset::Dataset;
use crate::gateway::DriveGateway;

// ---------------------------------------------------------------------------
// Fingerprints
// ---------------------------------------------------------------------------

/// Digest of a file's identity and remote modification time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// MD5 of `<id>_<modified time>`; id-only when no time is known.
    pub fn of(file_id: &str, modified_time: Option<DateTime<Utc>>) -> Self {
        match modified_time {
            Some(time) => Self::digest(&format!("{}_{}", file_id, time.to_rfc3339())),
            None => Self::id_only(file_id),
        }
    }

    pub fn id_only(file_id: &str) -> Self {
        Self::digest(file_id)
    }

    /// Fetch live metadata and fingerprint it.
    ///
    /// Never fails: metadata errors degrade to [`Fingerprint::id_only`].
    pub fn compute(gateway: &dyn DriveGateway, file_id: &str) -> Self {
        match gateway.file_metadata(file_id) {
            Ok(meta) => Self::of(&meta.id, meta.modified_time),
            Err(e) => {
                warn!(file_id, error = %e, "metadata lookup failed, using id-only fingerprint");
                Self::id_only(file_id)
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn digest(input: &str) -> Self {
        Self(format!("{:x}", md5::compute(input.as_bytes())))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Identifies one cached dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub file_id: String,
    pub sheet: SheetSelector,
}

impl CacheKey {
    pub fn new(file_id: impl Into<String>, sheet: SheetSelector) -> Self {
        Self {
            file_id: file_id.into(),
            sheet,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.file_id, self.sheet)
    }
}

#[derive(Debug)]
struct CacheEntry {
    dataset: Dataset,
    fingerprint: Fingerprint,
    captured_at: Instant,
    file_name: String,
    size_bytes: usize,
}

/// Outcome of [`MemoCache::lookup`].
#[derive(Debug)]
pub enum CacheLookup {
    Hit(Dataset),
    /// Carries the live fingerprint to store alongside the reloaded dataset
    Miss { fingerprint: Fingerprint },
}

/// Counters describing cache behavior since creation or the last clear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Hits on entries whose TTL had passed but whose fingerprint still matched
    pub revalidations: u64,
    pub invalidations: u64,
    pub total_entries: usize,
    pub total_bytes: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Diagnostic snapshot of the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheInfo {
    pub total_entries: usize,
    /// Entries within TTL whose fingerprint still matches
    pub valid_entries: usize,
    pub expired_entries: usize,
    /// Size of the valid entries, in MB rounded to two decimals
    pub estimated_size_mb: f64,
    pub ttl_minutes: f64,
    pub indexed_files: usize,
}

impl fmt::Display for CacheInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "total entries:   {}", self.total_entries)?;
        writeln!(f, "valid entries:   {}", self.valid_entries)?;
        writeln!(f, "expired entries: {}", self.expired_entries)?;
        writeln!(f, "estimated size:  {:.2} MB", self.estimated_size_mb)?;
        writeln!(f, "ttl:             {} min", self.ttl_minutes)?;
        write!(f, "indexed files:   {}", self.indexed_files)
    }
}

/// Memo cache of parsed datasets.
///
/// Not internally synchronized; callers sharing one across threads must
/// lock around it.
#[derive(Debug)]
pub struct MemoCache {
    ttl: Duration,
    entries: HashMap<CacheKey, CacheEntry>,
    stats: CacheStats,
}

impl MemoCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serve `key` if its fingerprint still matches the remote file.
    pub fn lookup(&mut self, gateway: &dyn DriveGateway, key: &CacheKey) -> CacheLookup {
        let fingerprint = Fingerprint::compute(gateway, &key.file_id);

        let entry = match self.entries.get_mut(key) {
            Some(entry) => entry,
            None => {
                self.stats.misses += 1;
                return CacheLookup::Miss { fingerprint };
            }
        };

        if entry.fingerprint != fingerprint {
            debug!(key = %key, file = %entry.file_name, "remote file changed");
            self.stats.misses += 1;
            return CacheLookup::Miss { fingerprint };
        }

        if entry.captured_at.elapsed() >= self.ttl {
            debug!(key = %key, file = %entry.file_name, "revalidated after ttl");
            entry.captured_at = Instant::now();
            self.stats.revalidations += 1;
        } else {
            debug!(key = %key, file = %entry.file_name, "cache hit");
        }
        self.stats.hits += 1;
        CacheLookup::Hit(entry.dataset.clone())
    }

    /// Insert or replace the entry for `key`.
    pub fn store(&mut self, key: CacheKey, dataset: Dataset, fingerprint: Fingerprint, file_name: &str) {
        let size_bytes = dataset.memory_size();
        self.entries.insert(
            key,
            CacheEntry {
                dataset,
                fingerprint,
                captured_at: Instant::now(),
                file_name: file_name.to_string(),
                size_bytes,
            },
        );
    }

    /// Drop the entry for `key`; returns whether one existed.
    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.stats.invalidations += 1;
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.stats = CacheStats::default();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_entries: self.entries.len(),
            total_bytes: self.entries.values().map(|e| e.size_bytes).sum(),
            ..self.stats.clone()
        }
    }

    /// Classify every entry with the same check [`MemoCache::lookup`] uses.
    ///
    /// Entries within TTL cost one metadata call each.
    pub fn info(&self, gateway: &dyn DriveGateway, indexed_files: usize) -> CacheInfo {
        let mut valid_entries = 0;
        let mut valid_bytes = 0usize;
        for (key, entry) in &self.entries {
            let fresh = entry.captured_at.elapsed() < self.ttl
                && Fingerprint::compute(gateway, &key.file_id) == entry.fingerprint;
            if fresh {
                valid_entries += 1;
                valid_bytes += entry.size_bytes;
            }
        }

        let megabytes = valid_bytes as f64 / (1024.0 * 1024.0);
        CacheInfo {
            total_entries: self.entries.len(),
            valid_entries,
            expired_entries: self.entries.len() - valid_entries,
            estimated_size_mb: (megabytes * 100.0).round() / 100.0,
            ttl_minutes: self.ttl.as_secs_f64() / 60.0,
            indexed_files,
        }
    }
}
