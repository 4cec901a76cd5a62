//! Render cache for transformed images.
//!
//! Decoding, resampling and encoding dominate request time, and the same
//! source/directive pair is typically requested over and over. This module
//! stores every successful render on disk and serves it back on repeat
//! requests.
//!
//! # Design
//!
//! ## Cache keys
//!
//! The cache is **content-addressed**: an entry is keyed by the SHA-256 of
//!
//! - the source identity: the SHA-256 of the source bytes (so a replaced
//!   asset never serves a stale render) plus the storage key, whose suffix
//!   picks the output format when the directive does not,
//! - the directive string, trimmed,
//! - the default quality (it changes lossy output when no `q` is given).
//!
//! Request paths never appear in file names; entries are named by the hash.
//!
//! ## Storage
//!
//! Each entry is two files in the cache directory:
//!
//! ```text
//! .imgview-cache/
//! ├── 3f2a…e1.bin    # rendered bytes
//! └── 3f2a…e1.json   # {"version":1,"content_type":"image/png","len":1234}
//! ```
//!
//! Both are written to a unique temporary name and renamed into place, so a
//! reader never sees a partial file. The payload lands first; an entry only
//! counts as present once its metadata exists and agrees with the payload.
//!
//! ## Concurrent identical requests
//!
//! [`RenderCache::get_or_render`] holds a per-key lock while it checks and
//! fills an entry. Concurrent requests for the same key wait for the first
//! render and then read its result instead of rendering again.
//!
//! ## Bypassing the cache
//!
//! Pass `--no-cache` to `transform` or `batch`, or set `cache.enabled = false`,
//! to render every request from scratch.

use crate::pipeline::Rendered;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Version of the entry format. Bump this to invalidate all existing
/// entries when the format or key computation changes.
const ENTRY_VERSION: u32 = 1;

const PAYLOAD_EXT: &str = "bin";
const ENTRY_EXT: &str = "json";

/// Metadata stored next to each cached payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub version: u32,
    pub content_type: String,
    pub len: u64,
}

/// SHA-256 of a byte slice, as a hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Cache key for rendering `directive` against the source identified by
/// `source_hash`.
pub fn render_key(source_hash: &str, directive: &str, default_quality: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"render\0");
    hasher.update(source_hash.as_bytes());
    hasher.update(b"\0");
    hasher.update(directive.trim().as_bytes());
    hasher.update(b"\0");
    hasher.update(default_quality.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hit/miss counters, shared across worker threads.
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU32,
    misses: AtomicU32,
}

/// Summary of cache performance for a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} rendered ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} rendered", self.misses)
        }
    }
}

/// On-disk render cache with single-writer-per-key coordination.
#[derive(Debug)]
pub struct RenderCache {
    dir: PathBuf,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    counters: Counters,
    temp_seq: AtomicU64,
}

impl RenderCache {
    /// Open (creating if needed) a cache rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            in_flight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
            temp_seq: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{key}.{ext}"))
    }

    /// Look up an entry. Missing, corrupt, stale-version or mismatched
    /// entries read as absent.
    pub fn get(&self, key: &str) -> Option<Rendered> {
        let meta = fs::read_to_string(self.path(key, ENTRY_EXT)).ok()?;
        let entry: CacheEntry = serde_json::from_str(&meta).ok()?;
        if entry.version != ENTRY_VERSION {
            return None;
        }
        let bytes = fs::read(self.path(key, PAYLOAD_EXT)).ok()?;
        if bytes.len() as u64 != entry.len {
            warn!("Cache entry {key} has a mismatched payload, ignoring");
            return None;
        }
        Some(Rendered {
            bytes,
            content_type: entry.content_type,
        })
    }

    /// Store an entry: payload first, then metadata, each via temp file + rename.
    pub fn put(&self, key: &str, rendered: &Rendered) -> io::Result<()> {
        let entry = CacheEntry {
            version: ENTRY_VERSION,
            content_type: rendered.content_type.clone(),
            len: rendered.bytes.len() as u64,
        };
        let meta = serde_json::to_vec(&entry)?;
        self.write_atomic(&self.path(key, PAYLOAD_EXT), &rendered.bytes)?;
        self.write_atomic(&self.path(key, ENTRY_EXT), &meta)
    }

    fn write_atomic(&self, target: &Path, bytes: &[u8]) -> io::Result<()> {
        let seq = self.temp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".tmp-{}-{seq}", std::process::id()));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, target).inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(in_flight.entry(key.to_string()).or_default())
    }

    fn release(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The map holds one reference and we hold another; anything more
        // means another request is still waiting on this key.
        if Arc::strong_count(&lock) <= 2 {
            in_flight.remove(key);
        }
    }

    /// Serve `key` from the cache, or run `render` once and store its result.
    ///
    /// Errors from `render` are returned and never cached. A failed cache
    /// write is logged and the fresh render is still returned.
    pub fn get_or_render<E>(
        &self,
        key: &str,
        render: impl FnOnce() -> Result<Rendered, E>,
    ) -> Result<Rendered, E> {
        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            match self.get(key) {
                Some(rendered) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    debug!("Cache hit {key}");
                    Ok(rendered)
                }
                None => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    render().inspect(|rendered| {
                        if let Err(e) = self.put(key, rendered) {
                            warn!("Failed to cache render {key}: {e}");
                        } else {
                            info!("Cached {} bytes as {key}", rendered.bytes.len());
                        }
                    })
                }
            }
        };
        self.release(key, lock);
        result
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use tempfile::TempDir;

    fn rendered(bytes: &[u8]) -> Rendered {
        Rendered {
            bytes: bytes.to_vec(),
            content_type: "image/png".into(),
        }
    }

    fn cache() -> (TempDir, RenderCache) {
        let tmp = TempDir::new().unwrap();
        let cache = RenderCache::open(tmp.path().join("cache")).unwrap();
        (tmp, cache)
    }

    // =========================================================================
    // Keys
    // =========================================================================

    #[test]
    fn hash_bytes_deterministic() {
        assert_eq!(hash_bytes(b"abc"), hash_bytes(b"abc"));
        assert_ne!(hash_bytes(b"abc"), hash_bytes(b"abd"));
        assert_eq!(hash_bytes(b"").len(), 64);
    }

    #[test]
    fn render_key_ignores_surrounding_whitespace() {
        assert_eq!(
            render_key("s", "imageView2/1/w/10", 75),
            render_key("s", "  imageView2/1/w/10\n", 75)
        );
    }

    #[test]
    fn render_key_varies_with_each_input() {
        let base = render_key("s", "imageView2/1/w/10", 75);
        assert_ne!(base, render_key("t", "imageView2/1/w/10", 75));
        assert_ne!(base, render_key("s", "imageView2/1/w/11", 75));
        assert_ne!(base, render_key("s", "imageView2/1/w/10", 80));
    }

    // =========================================================================
    // Storage
    // =========================================================================

    #[test]
    fn put_then_get() {
        let (_tmp, cache) = cache();
        cache.put("k", &rendered(b"pixels")).unwrap();
        assert_eq!(cache.get("k"), Some(rendered(b"pixels")));
    }

    #[test]
    fn get_missing_is_none() {
        let (_tmp, cache) = cache();
        assert_eq!(cache.get("absent"), None);
    }

    #[test]
    fn payload_without_metadata_is_absent() {
        let (_tmp, cache) = cache();
        fs::write(cache.dir().join("k.bin"), b"half").unwrap();
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn corrupt_or_stale_metadata_is_absent() {
        let (_tmp, cache) = cache();
        cache.put("k", &rendered(b"pixels")).unwrap();
        fs::write(cache.dir().join("k.json"), "{not json").unwrap();
        assert_eq!(cache.get("k"), None);

        let stale = CacheEntry {
            version: ENTRY_VERSION + 1,
            content_type: "image/png".into(),
            len: 6,
        };
        fs::write(
            cache.dir().join("k.json"),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn truncated_payload_is_absent() {
        let (_tmp, cache) = cache();
        cache.put("k", &rendered(b"pixels")).unwrap();
        fs::write(cache.dir().join("k.bin"), b"pix").unwrap();
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn no_temp_files_left_behind() {
        let (_tmp, cache) = cache();
        cache.put("k", &rendered(b"pixels")).unwrap();
        let names: Vec<String> = fs::read_dir(cache.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| !n.starts_with(".tmp-")), "{names:?}");
        assert_eq!(names.len(), 2);
    }

    // =========================================================================
    // get_or_render
    // =========================================================================

    #[test]
    fn second_request_is_a_hit() {
        let (_tmp, cache) = cache();
        let first = cache
            .get_or_render::<()>("k", || Ok(rendered(b"one")))
            .unwrap();
        let second = cache
            .get_or_render::<()>("k", || panic!("should not re-render"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn errors_are_not_cached() {
        let (_tmp, cache) = cache();
        let err = cache.get_or_render("k", || Err::<Rendered, _>("boom"));
        assert_eq!(err, Err("boom"));
        assert_eq!(cache.get("k"), None);
        let ok = cache.get_or_render::<&str>("k", || Ok(rendered(b"fine")));
        assert_eq!(ok, Ok(rendered(b"fine")));
    }

    #[test]
    fn concurrent_identical_requests_render_once() {
        let (_tmp, cache) = cache();
        let renders = AtomicUsize::new(0);
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let out = cache
                        .get_or_render::<()>("shared", || {
                            renders.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(20));
                            Ok(rendered(b"once"))
                        })
                        .unwrap();
                    assert_eq!(out.bytes, b"once");
                });
            }
        });
        assert_eq!(renders.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().total(), 8);
        assert!(cache.in_flight.lock().unwrap().is_empty());
    }

    // =========================================================================
    // CacheStats
    // =========================================================================

    #[test]
    fn cache_stats_display_with_hits() {
        let s = CacheStats { hits: 5, misses: 2 };
        assert_eq!(format!("{}", s), "5 cached, 2 rendered (7 total)");
    }

    #[test]
    fn cache_stats_display_no_hits() {
        let s = CacheStats { hits: 0, misses: 3 };
        assert_eq!(format!("{}", s), "3 rendered");
    }
}
