//! The two-tier module cache.
//!
//! In memory, the cache is an index map (`entries`) plus a lazily
//! populated body map (`bodies`), identically keyed. On disk it is a JSON
//! index file plus one raw textual-IR body file per entry. The index file
//! is the source of truth; body files whose rolling-hash names collide
//! are shared, with the later writer winning.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};
use zyphar_common::ContentHash;
use zyphar_ir::{text, Design, Module};

use crate::entry::{CacheEntry, IndexEntry, IndexFile};
use crate::error::CacheError;
use crate::key;

/// Current index schema version. An index with any other version is
/// ignored with a warning; migration is out of scope here.
const INDEX_VERSION: u32 = 1;

/// Subdirectory holding per-entry body files.
const MODULES_SUBDIR: &str = "modules";

/// Eviction limits for the cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Entry-count ceiling.
    pub max_entries: usize,
    /// Total body-bytes ceiling.
    pub max_size_bytes: u64,
    /// Upper bound on entry age in seconds. `0` disables age eviction.
    pub max_age_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_size_bytes: 500 * 1024 * 1024,
            max_age_secs: 30 * 24 * 3600,
        }
    }
}

/// Aggregate cache statistics snapshot.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// The cache directory.
    pub cache_dir: PathBuf,
    /// Number of entries currently held.
    pub entries: usize,
    /// Sum of in-memory body sizes in bytes.
    pub total_size_bytes: u64,
    /// Successful lookups since initialization.
    pub hits: u64,
    /// Failed lookups since initialization.
    pub misses: u64,
    /// Hit percentage over all lookups, `0.0` if none.
    pub hit_rate: f64,
}

/// Persistent per-module content cache.
///
/// Lookup is keyed by `(module_name, content_hash, pass_sequence)`.
/// `has` and `get` take `&mut self` deliberately: maintaining the hit and
/// miss counters is part of their contract, not an implementation leak.
///
/// On drop, an initialized cache with unsaved changes saves itself,
/// swallowing all errors — shutdown must never be aborted by the cache.
pub struct ModuleCache {
    cache_dir: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
    bodies: HashMap<String, String>,
    config: CacheConfig,
    initialized: bool,
    dirty: bool,
    total_hits: u64,
    total_misses: u64,
}

impl Default for ModuleCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleCache {
    /// Creates an uninitialized cache. Call [`init`](Self::init) before
    /// storing or restoring anything.
    pub fn new() -> Self {
        Self {
            cache_dir: PathBuf::new(),
            entries: BTreeMap::new(),
            bodies: HashMap::new(),
            config: CacheConfig::default(),
            initialized: false,
            dirty: false,
            total_hits: 0,
            total_misses: 0,
        }
    }

    /// Initializes the cache directory and loads any existing index.
    ///
    /// With no directory given, defaults to `$HOME/.cache/zyphar`, falling
    /// back to `/tmp/zyphar_cache` when `HOME` is unset. Creating the
    /// directory structure is idempotent. Returns `false` (after a
    /// warning) if the directory cannot be created; store and restore
    /// operations are refused until a later `init` succeeds.
    pub fn init(&mut self, cache_dir: Option<&Path>) -> bool {
        self.cache_dir = match cache_dir {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => default_cache_dir(),
        };
        let modules_dir = self.cache_dir.join(MODULES_SUBDIR);
        if let Err(e) = std::fs::create_dir_all(&modules_dir) {
            warn!(
                "failed to create cache directory {}: {e}",
                modules_dir.display()
            );
            return false;
        }
        self.load_from_disk();
        self.initialized = true;
        info!(
            "cache initialized at {} ({} entries)",
            self.cache_dir.display(),
            self.entries.len()
        );
        true
    }

    /// Returns `true` once [`init`](Self::init) has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Returns the cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the current eviction limits.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the eviction limits mutably. Changed limits take effect on
    /// the next [`evict_if_needed`](Self::evict_if_needed).
    pub fn config_mut(&mut self) -> &mut CacheConfig {
        &mut self.config
    }

    /// Checks whether an entry exists for the key, updating the aggregate
    /// hit/miss counters.
    pub fn has(&mut self, module_name: &str, hash: ContentHash, pass_seq: &str) -> bool {
        let Ok(k) = key::make_key(module_name, hash, pass_seq) else {
            self.total_misses += 1;
            return false;
        };
        let found = self.entries.contains_key(&k);
        if found {
            self.total_hits += 1;
        } else {
            self.total_misses += 1;
        }
        found
    }

    /// Looks up an entry, incrementing its hit count and the aggregate
    /// counters.
    pub fn get(
        &mut self,
        module_name: &str,
        hash: ContentHash,
        pass_seq: &str,
    ) -> Option<&CacheEntry> {
        let k = match key::make_key(module_name, hash, pass_seq) {
            Ok(k) => k,
            Err(e) => {
                warn!("rejecting cache lookup: {e}");
                self.total_misses += 1;
                return None;
            }
        };
        if !self.entries.contains_key(&k) {
            self.total_misses += 1;
            return None;
        }
        self.total_hits += 1;
        if let Some(entry) = self.entries.get_mut(&k) {
            entry.hit_count += 1;
        }
        self.entries.get(&k)
    }

    /// Stores a module body under `(module_name, hash, pass_seq)`.
    ///
    /// Serializes the module through the textual IR backend. Returns
    /// `true` iff the entry was stored; an uninitialized cache, a bad key,
    /// or an empty serialization are warnings plus `false`.
    pub fn put(
        &mut self,
        module_name: &str,
        hash: ContentHash,
        pass_seq: &str,
        module: &Module,
    ) -> bool {
        if !self.initialized {
            warn!("cache not initialized; refusing to store {module_name}");
            return false;
        }
        let k = match key::make_key(module_name, hash, pass_seq) {
            Ok(k) => k,
            Err(e) => {
                warn!("refusing to cache {module_name}: {e}");
                return false;
            }
        };
        let body = text::dump_module(module);
        if body.is_empty() {
            warn!("refusing to cache empty serialization of {module_name}");
            return false;
        }
        let entry = CacheEntry {
            module_name: module_name.to_string(),
            content_hash: hash,
            pass_sequence: pass_seq.to_string(),
            body: body.clone(),
            timestamp: unix_now(),
            hit_count: 0,
        };
        self.entries.insert(k.clone(), entry);
        self.bodies.insert(k, body);
        self.dirty = true;
        info!("cached module {module_name} (hash: {hash}, pass: {pass_seq})");
        self.evict_if_needed();
        true
    }

    /// Restores a cached module body into the design.
    ///
    /// Returns `false` on a missing key, an empty body, or a frontend
    /// parse failure. The body is written to a temp file inside the cache
    /// directory and handed to the textual IR frontend; the temp file is
    /// removed on every exit path.
    pub fn restore(
        &mut self,
        module_name: &str,
        hash: ContentHash,
        pass_seq: &str,
        design: &mut Design,
    ) -> bool {
        if !self.initialized {
            warn!("cache not initialized; cannot restore {module_name}");
            return false;
        }
        let k = match key::make_key(module_name, hash, pass_seq) {
            Ok(k) => k,
            Err(e) => {
                warn!("rejecting cache restore: {e}");
                return false;
            }
        };
        if !self.entries.contains_key(&k) {
            return false;
        }
        let body = self.body_for(&k);
        if body.is_empty() {
            warn!("cache entry exists but module body is empty: {k}");
            return false;
        }

        let temp_path = self
            .cache_dir
            .join(format!("temp_restore_{}.rtlil", std::process::id()));
        let _guard = TempFile(temp_path.clone());
        if let Err(e) = std::fs::write(&temp_path, format!("autoidx 1\n{body}")) {
            warn!("failed to write restore temp file: {e}");
            return false;
        }
        match text::parse_file_into(&temp_path, design) {
            Ok(_) => {
                info!("restored module {module_name} from cache");
                true
            }
            Err(e) => {
                warn!("failed to restore module {module_name} from cache: {e}");
                false
            }
        }
    }

    /// Removes every cached version of a module, across all hashes and
    /// pass sequences. Returns the number of entries removed.
    pub fn invalidate(&mut self, module_name: &str) -> usize {
        let to_remove: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.module_name == module_name)
            .map(|(k, _)| k.clone())
            .collect();
        for k in &to_remove {
            self.entries.remove(k);
            self.bodies.remove(k);
        }
        if !to_remove.is_empty() {
            self.dirty = true;
            info!(
                "invalidated {} cache entries for module {module_name}",
                to_remove.len()
            );
        }
        to_remove.len()
    }

    /// Removes exactly one cached entry. Returns `true` if it existed.
    pub fn invalidate_entry(
        &mut self,
        module_name: &str,
        hash: ContentHash,
        pass_seq: &str,
    ) -> bool {
        let Ok(k) = key::make_key(module_name, hash, pass_seq) else {
            return false;
        };
        if self.entries.remove(&k).is_some() {
            self.bodies.remove(&k);
            self.dirty = true;
            true
        } else {
            false
        }
    }

    /// Invalidates every module transitively affected by a set of changed
    /// modules, given a dependents map (module -> modules instantiating it,
    /// directly).
    pub fn invalidate_affected(
        &mut self,
        changed_modules: &BTreeSet<String>,
        dependents: &BTreeMap<String, BTreeSet<String>>,
    ) {
        let mut to_invalidate: BTreeSet<String> = changed_modules.clone();
        let mut worklist: Vec<String> = changed_modules.iter().cloned().collect();
        while let Some(module) = worklist.pop() {
            if let Some(deps) = dependents.get(&module) {
                for dep in deps {
                    if to_invalidate.insert(dep.clone()) {
                        worklist.push(dep.clone());
                    }
                }
            }
        }
        for module in &to_invalidate {
            self.invalidate(module);
        }
    }

    /// Drops all entries and resets the counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.bodies.clear();
        self.total_hits = 0;
        self.total_misses = 0;
        self.dirty = true;
    }

    /// Applies the eviction policy: first by age, then by entry count,
    /// then by total body size.
    ///
    /// Victims are chosen in ascending `(hit_count, timestamp)` order —
    /// least-used first, ties broken by oldest. Evicted entries have their
    /// body files unlinked. With `max_entries = 0` an insert-then-evict
    /// cycle leaves the cache empty; this is intended.
    pub fn evict_if_needed(&mut self) {
        if self.config.max_age_secs > 0 {
            let now = unix_now();
            let expired: Vec<String> = self
                .entries
                .iter()
                .filter(|(_, e)| now.saturating_sub(e.timestamp) > self.config.max_age_secs)
                .map(|(k, _)| k.clone())
                .collect();
            for k in expired {
                self.evict_entry(&k);
            }
        }

        if self.entries.len() > self.config.max_entries {
            let excess = self.entries.len() - self.config.max_entries;
            let victims: Vec<String> = self.eviction_order().into_iter().take(excess).collect();
            for k in victims {
                self.evict_entry(&k);
            }
        }

        while self.total_size_bytes() > self.config.max_size_bytes {
            let Some(victim) = self.eviction_order().into_iter().next() else {
                break;
            };
            self.evict_entry(&victim);
        }
    }

    /// Writes all body files and the JSON index to disk. A successful
    /// save clears the dirty flag.
    pub fn save_to_disk(&mut self) -> Result<(), CacheError> {
        if !self.initialized {
            return Ok(());
        }
        for (k, entry) in &self.entries {
            let body = if !entry.body.is_empty() {
                &entry.body
            } else if let Some(b) = self.bodies.get(k) {
                b
            } else {
                // Body never materialized (file was missing on load);
                // leave the slot absent rather than writing an empty file.
                continue;
            };
            if body.is_empty() {
                continue;
            }
            let path = self.body_path(k);
            std::fs::write(&path, body).map_err(|e| CacheError::Io { path, source: e })?;
        }

        let index = IndexFile {
            version: INDEX_VERSION,
            entries: self
                .entries
                .iter()
                .map(|(k, e)| IndexEntry {
                    key: k.clone(),
                    module_name: e.module_name.clone(),
                    hash: e.content_hash,
                    pass_seq: e.pass_sequence.clone(),
                    timestamp: e.timestamp,
                    hits: e.hit_count,
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&index).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        let path = self.index_path();
        std::fs::write(&path, json).map_err(|e| CacheError::Io { path, source: e })?;

        self.dirty = false;
        info!("saved cache index with {} entries", self.entries.len());
        Ok(())
    }

    /// Loads the index and body files from disk, replacing in-memory
    /// state. An absent index is a no-op; a malformed index or one with
    /// an unsupported version leaves the cache empty with a warning.
    /// Entries with an empty module name are skipped; a missing body file
    /// is tolerated (the body stays empty, so a later restore fails and
    /// forces re-synthesis).
    pub fn load_from_disk(&mut self) {
        let path = self.index_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return,
        };
        let index: IndexFile = match serde_json::from_str(&content) {
            Ok(i) => i,
            Err(e) => {
                warn!("failed to parse cache index {}: {e}", path.display());
                return;
            }
        };
        if index.version != INDEX_VERSION {
            warn!(
                "unsupported cache index version {} (expected {INDEX_VERSION}); starting empty",
                index.version
            );
            return;
        }
        self.entries.clear();
        self.bodies.clear();
        for ie in index.entries {
            if ie.module_name.is_empty() {
                continue;
            }
            let body = std::fs::read_to_string(self.body_path(&ie.key)).unwrap_or_default();
            self.entries.insert(
                ie.key,
                CacheEntry {
                    module_name: ie.module_name,
                    content_hash: ie.hash,
                    pass_sequence: ie.pass_seq,
                    body,
                    timestamp: ie.timestamp,
                    hit_count: ie.hits,
                },
            );
        }
    }

    /// Returns the number of entries currently held.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over all entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    /// Sum of in-memory body sizes in bytes.
    pub fn total_size_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.body.len() as u64).sum()
    }

    /// Hit percentage over all lookups so far, `0.0` if none.
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_hits + self.total_misses;
        if total == 0 {
            return 0.0;
        }
        self.total_hits as f64 / total as f64 * 100.0
    }

    /// Returns an aggregate statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cache_dir: self.cache_dir.clone(),
            entries: self.entries.len(),
            total_size_bytes: self.total_size_bytes(),
            hits: self.total_hits,
            misses: self.total_misses,
            hit_rate: self.hit_rate(),
        }
    }

    /// Returns `true` if there are unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn index_path(&self) -> PathBuf {
        self.cache_dir.join("index.json")
    }

    fn body_path(&self, cache_key: &str) -> PathBuf {
        self.cache_dir
            .join(MODULES_SUBDIR)
            .join(key::body_file_name(cache_key))
    }

    /// Fetches the body for a key, loading it from disk into the body
    /// cache if it is not in memory yet.
    fn body_for(&mut self, cache_key: &str) -> String {
        if let Some(body) = self.bodies.get(cache_key) {
            return body.clone();
        }
        let mut body = self
            .entries
            .get(cache_key)
            .map(|e| e.body.clone())
            .unwrap_or_default();
        if body.is_empty() {
            body = std::fs::read_to_string(self.body_path(cache_key)).unwrap_or_default();
        }
        self.bodies.insert(cache_key.to_string(), body.clone());
        body
    }

    /// Keys in eviction order: ascending hit count, then ascending
    /// timestamp, then key.
    fn eviction_order(&self) -> Vec<String> {
        let mut order: Vec<(u64, u64, String)> = self
            .entries
            .iter()
            .map(|(k, e)| (e.hit_count, e.timestamp, k.clone()))
            .collect();
        order.sort();
        order.into_iter().map(|(_, _, k)| k).collect()
    }

    fn evict_entry(&mut self, cache_key: &str) {
        if self.entries.remove(cache_key).is_some() {
            self.bodies.remove(cache_key);
            let _ = std::fs::remove_file(self.body_path(cache_key));
            self.dirty = true;
            debug!("evicted cache entry {cache_key}");
        }
    }
}

impl Drop for ModuleCache {
    fn drop(&mut self) {
        if self.initialized && self.dirty {
            if let Err(e) = self.save_to_disk() {
                debug!("cache save at shutdown failed: {e}");
            }
        }
    }
}

/// Deletes its path when dropped. Covers every exit path of `restore`.
struct TempFile(PathBuf);

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn default_cache_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(".cache").join("zyphar"),
        _ => PathBuf::from("/tmp/zyphar_cache"),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
