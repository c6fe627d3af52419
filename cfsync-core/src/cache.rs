//! Persisted mapping from guide trash ids to the remote ids assigned to them.
//!
//! One cache file exists per remote target, under a directory derived from
//! the target's base URL. The cache is loaded at the start of a run, threaded
//! through the pipeline as a plain value and saved once at the end.
//!
//! Loading never fails: a missing, unreadable or incompatible file yields an
//! empty cache, and the next run simply re-derives identities (by name) from
//! the remote listing. Saving replaces the file atomically.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::persister::AppliedResult;
use crate::transaction::Transaction;

/// Version of the on-disk layout written by this crate.
pub const CACHE_VERSION: u32 = 1;

const CACHE_FILE_NAME: &str = "custom-format-cache.json";

/// Links a guide definition to the remote custom format it was synced to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(rename = "trash_id")]
    pub content_id: String,
    #[serde(rename = "custom_format_id")]
    pub remote_id: i64,
    #[serde(rename = "custom_format_name")]
    pub last_known_name: String,
}

/// All cache entries of one target, keyed by trash id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomFormatCache {
    entries: BTreeMap<String, CacheEntry>,
}

impl CustomFormatCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, content_id: &str) -> Option<&CacheEntry> {
        self.entries.get(content_id)
    }

    pub fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.insert(entry.content_id.clone(), entry)
    }

    pub fn remove(&mut self, content_id: &str) -> Option<CacheEntry> {
        self.entries.remove(content_id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Folds the outcome of a run into the cache.
    ///
    /// Created, updated and unchanged definitions are upserted. Successful
    /// deletions and stale orphans are dropped. Failed items leave their
    /// entries as they were.
    pub fn record(&mut self, transaction: &Transaction, applied: &AppliedResult) {
        let synced = applied
            .created
            .iter()
            .chain(&applied.updated)
            .chain(&transaction.unchanged);
        for entry in synced {
            self.insert(entry.clone());
        }
        for deletion in &applied.deleted {
            self.remove(&deletion.content_id);
        }
        for entry in &transaction.stale {
            self.remove(&entry.content_id);
        }
    }
}

impl FromIterator<CacheEntry> for CustomFormatCache {
    fn from_iter<I: IntoIterator<Item = CacheEntry>>(iter: I) -> Self {
        let mut cache = CustomFormatCache::new();
        for entry in iter {
            cache.insert(entry);
        }
        cache
    }
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    #[serde(default)]
    trash_id_mappings: Vec<CacheEntry>,
}

/// Identity of a remote instance: the base URL without trailing `/`, lowercased.
pub fn normalise_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_ascii_lowercase()
}

/// File-backed storage for one target's [`CustomFormatCache`].
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cache location for the target at `base_url` under `cache_dir`.
    pub fn for_target(cache_dir: &Path, base_url: &str) -> Self {
        let digest = Sha256::digest(normalise_base_url(base_url).as_bytes());
        let dir_name: String = format!("{digest:x}").chars().take(16).collect();
        Self::new(cache_dir.join(dir_name).join(CACHE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> CustomFormatCache {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No cache file yet, starting empty");
                return CustomFormatCache::new();
            }
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "Failed to read cache, starting empty");
                return CustomFormatCache::new();
            }
        };

        let file: CacheFile = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "Failed to parse cache, starting empty");
                return CustomFormatCache::new();
            }
        };

        if file.version != CACHE_VERSION {
            warn!(
                found = file.version,
                expected = CACHE_VERSION,
                path = %self.path.display(),
                "Cache version mismatch, starting empty"
            );
            return CustomFormatCache::new();
        }

        let cache: CustomFormatCache = file.trash_id_mappings.into_iter().collect();
        info!(entries = cache.len(), path = %self.path.display(), "Loaded custom format cache");
        cache
    }

    pub fn save(&self, cache: &CustomFormatCache) -> Result<(), CacheError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|source| CacheError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let file = CacheFile {
            version: CACHE_VERSION,
            trash_id_mappings: cache.entries().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|source| CacheError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|source| CacheError::Io {
                path: tmp.path().to_path_buf(),
                source,
            })?;
        tmp.persist(&self.path).map_err(|e| CacheError::Persist {
            path: self.path.clone(),
            source: e.error,
        })?;

        info!(entries = cache.len(), path = %self.path.display(), "Saved custom format cache");
        Ok(())
    }
}
