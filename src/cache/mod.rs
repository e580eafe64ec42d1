//! Artifact cache with time-based eviction.
//!
//! Entries live in a [`CacheStore`] under prefixed keys:
//!
//! | key | value |
//! |---|---|
//! | `png-{key}` | base64 PNG |
//! | `map-{key}` | image-map document |
//! | `svg-{key}` | SVG markup |
//! | `ascii-{key}` | text art |
//! | `ts-{key}` | last access, Unix millis |
//!
//! The timestamp is shared by all formats of one source. Store failures are
//! logged and behave like a miss; they never reach the caller.

mod store;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use puml_render_config::OutputFormat;

use crate::backend::{ImageSource, RenderResult};
use crate::encoding::RequestKey;

pub use store::{CacheStore, FileStore, MemoryStore, cache_dir, key_to_filename};

const TIMESTAMP_PREFIX: &str = "ts";
const MAP_PREFIX: &str = "map";

/// Every per-format prefix an evicted key must be cleared from.
const ARTIFACT_PREFIXES: &[&str] = &["png", "svg", "ascii", MAP_PREFIX];

fn entry_key(prefix: &str, key: &str) -> String {
    format!("{prefix}-{key}")
}

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Timestamp records examined.
    pub scanned: usize,
    /// Keys whose entries were deleted.
    pub evicted: usize,
    /// Individual deletions that failed.
    pub failures: usize,
}

/// Typed view over a [`CacheStore`].
#[derive(Clone)]
pub struct RenderCache {
    store: Arc<dyn CacheStore>,
}

impl RenderCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Look up a cached artifact, refreshing the key's timestamp on a hit.
    pub fn get(&self, key: &RequestKey, format: OutputFormat) -> Option<RenderResult> {
        let result = self.lookup(key.as_str(), format)?;
        self.touch(key.as_str(), Utc::now());
        crate::debug_trace!("CACHE", "Hit {}-{}", format.cache_prefix(), key);
        Some(result)
    }

    fn lookup(&self, key: &str, format: OutputFormat) -> Option<RenderResult> {
        let value = self.read(&entry_key(format.cache_prefix(), key))?;
        Some(match format {
            OutputFormat::Png => RenderResult::Raster {
                image: ImageSource::Base64(value),
                map: self.read(&entry_key(MAP_PREFIX, key)),
            },
            OutputFormat::Svg => RenderResult::Vector(value),
            OutputFormat::Txt => RenderResult::Text(value),
        })
    }

    /// Store an artifact, replacing any previous entry for the same format.
    ///
    /// Raster results that point at a URL carry no bytes and are skipped.
    pub fn put(&self, key: &RequestKey, result: &RenderResult) {
        let key = key.as_str();
        let format = result.format();
        match result {
            RenderResult::Raster {
                image: ImageSource::Base64(data),
                map,
            } => {
                self.write(&entry_key(format.cache_prefix(), key), data);
                match map {
                    Some(map) => self.write(&entry_key(MAP_PREFIX, key), map),
                    None => self.delete(&entry_key(MAP_PREFIX, key)),
                };
            }
            RenderResult::Raster {
                image: ImageSource::Url(_),
                ..
            } => return,
            RenderResult::Vector(text) | RenderResult::Text(text) => {
                self.write(&entry_key(format.cache_prefix(), key), text);
            }
        }
        self.touch(key, Utc::now());
    }

    /// Delete every entry not accessed within `retention_days`.
    pub fn sweep(&self, retention_days: u32) -> SweepStats {
        self.sweep_at(retention_days, Utc::now())
    }

    /// [`sweep`](Self::sweep) against an explicit clock.
    pub fn sweep_at(&self, retention_days: u32, now: DateTime<Utc>) -> SweepStats {
        // A window reaching past chrono's range means no timestamp is old enough.
        let cutoff = Duration::try_days(i64::from(retention_days))
            .and_then(|window| now.checked_sub_signed(window))
            .map_or(i64::MIN, |cutoff| cutoff.timestamp_millis());
        let ts_prefix = format!("{TIMESTAMP_PREFIX}-");

        let mut stale = Vec::new();
        let mut stats = SweepStats::default();
        let listed = self.store.iterate(&mut |entry, value| {
            let Some(key) = entry.strip_prefix(&ts_prefix) else {
                return;
            };
            stats.scanned += 1;
            // An unreadable timestamp can never be refreshed; treat it as stale.
            let expired = value.trim().parse::<i64>().map_or(true, |ts| ts < cutoff);
            if expired {
                stale.push(key.to_string());
            }
        });
        if let Err(e) = listed {
            crate::debug_error!("CACHE", "Sweep could not list entries: {}", e);
            return stats;
        }

        for key in &stale {
            let mut ok = true;
            for prefix in ARTIFACT_PREFIXES.iter().chain([&TIMESTAMP_PREFIX]) {
                let entry = entry_key(prefix, key);
                if let Err(e) = self.store.remove(&entry) {
                    crate::debug_error!("CACHE", "Failed to evict {}: {}", entry, e);
                    stats.failures += 1;
                    ok = false;
                }
            }
            if ok {
                stats.evicted += 1;
            }
        }

        crate::debug_info!(
            "CACHE",
            "Sweep: {} scanned, {} evicted, {} failures",
            stats.scanned,
            stats.evicted,
            stats.failures
        );
        stats
    }

    /// Last-access time for `key`, if recorded.
    pub fn last_access(&self, key: &RequestKey) -> Option<DateTime<Utc>> {
        self.read(&entry_key(TIMESTAMP_PREFIX, key.as_str()))?
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
    }

    /// Record `at` as the last access time of `key`.
    pub fn touch_at(&self, key: &RequestKey, at: DateTime<Utc>) {
        self.touch(key.as_str(), at);
    }

    fn touch(&self, key: &str, at: DateTime<Utc>) {
        self.write(
            &entry_key(TIMESTAMP_PREFIX, key),
            &at.timestamp_millis().to_string(),
        );
    }

    fn read(&self, entry: &str) -> Option<String> {
        match self.store.get(entry) {
            Ok(value) => value,
            Err(e) => {
                crate::debug_error!("CACHE", "Read {} failed: {}", entry, e);
                None
            }
        }
    }

    fn write(&self, entry: &str, value: &str) {
        if let Err(e) = self.store.set(entry, value) {
            crate::debug_error!("CACHE", "Write {} failed: {}", entry, e);
        }
    }

    fn delete(&self, entry: &str) {
        if let Err(e) = self.store.remove(entry) {
            crate::debug_error!("CACHE", "Remove {} failed: {}", entry, e);
        }
    }
}
