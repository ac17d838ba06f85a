//! Local durable cache for reader state.
//!
//! Every entry is keyed by a data kind and the course id. The file-backed
//! store keeps one JSON document per key under `.cache/<sha256(course)>/`,
//! hashing the course id so arbitrary ids never touch the filesystem
//! directly. Writes never fail to the caller; errors are logged.

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    ViewedPages,
    CompletedTopics,
    Bookmark,
    Notes,
    OverallProgress,
}

impl CacheKind {
    pub fn prefix(self) -> &'static str {
        match self {
            CacheKind::ViewedPages => "viewedPages",
            CacheKind::CompletedTopics => "completedTopics",
            CacheKind::Bookmark => "bookmark",
            CacheKind::Notes => "notes",
            CacheKind::OverallProgress => "overallProgress",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: CacheKind,
    pub course_id: String,
}

impl CacheKey {
    pub fn new(kind: CacheKind, course_id: impl Into<String>) -> Self {
        Self {
            kind,
            course_id: course_id.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind.prefix(), self.course_id)
    }
}

/// Process-wide key/value store used as the offline mirror.
pub trait LocalCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<String>;
    fn set(&self, key: &CacheKey, value: &str);
}

/// Decode a cached JSON value. Missing or malformed entries read as absent.
pub fn load_json<T: DeserializeOwned>(cache: &dyn LocalCache, key: &CacheKey) -> Option<T> {
    let raw = cache.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(%key, "Ignoring malformed cache entry: {err}");
            None
        }
    }
}

pub fn store_json<T: Serialize>(cache: &dyn LocalCache, key: &CacheKey, value: &T) {
    match serde_json::to_string(value) {
        Ok(encoded) => cache.set(key, &encoded),
        Err(err) => warn!(%key, "Failed to encode cache entry: {err}"),
    }
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<String> {
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.get(&key.to_string()).cloned()
    }

    fn set(&self, key: &CacheKey, value: &str) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(key.to_string(), value.to_string());
    }
}

#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hash_dir(&self, course_id: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(course_id.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        self.root.join(hash)
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.hash_dir(&key.course_id)
            .join(format!("{}.json", key.kind.prefix()))
    }
}

impl LocalCache for FileCache {
    fn get(&self, key: &CacheKey) -> Option<String> {
        fs::read_to_string(self.entry_path(key)).ok()
    }

    fn set(&self, key: &CacheKey, value: &str) {
        let path = self.entry_path(key);
        if let Some(parent) = path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!(%key, path = %parent.display(), "Failed to create cache dir: {err}");
                return;
            }
        }
        match fs::write(&path, value) {
            Ok(()) => debug!(%key, path = %path.display(), "Wrote cache entry"),
            Err(err) => warn!(%key, path = %path.display(), "Failed to write cache entry: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after epoch")
            .as_nanos();
        std::env::temp_dir().join(format!("course_reader_test_{name}_{nanos}"))
    }

    #[test]
    fn keys_render_as_kind_underscore_course() {
        assert_eq!(
            CacheKey::new(CacheKind::ViewedPages, "c42").to_string(),
            "viewedPages_c42"
        );
        assert_eq!(
            CacheKey::new(CacheKind::CompletedTopics, "c42").to_string(),
            "completedTopics_c42"
        );
        assert_eq!(
            CacheKey::new(CacheKind::Bookmark, "c42").to_string(),
            "bookmark_c42"
        );
        assert_eq!(CacheKey::new(CacheKind::Notes, "c42").to_string(), "notes_c42");
        assert_eq!(
            CacheKey::new(CacheKind::OverallProgress, "c42").to_string(),
            "overallProgress_c42"
        );
    }

    #[test]
    fn memory_cache_overwrites_per_key() {
        let cache = MemoryCache::new();
        let a = CacheKey::new(CacheKind::Bookmark, "a");
        let b = CacheKey::new(CacheKind::Bookmark, "b");
        cache.set(&a, "1");
        cache.set(&a, "2");
        cache.set(&b, "3");

        assert_eq!(cache.get(&a).as_deref(), Some("2"));
        assert_eq!(cache.get(&b).as_deref(), Some("3"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn malformed_json_reads_as_absent() {
        let cache = MemoryCache::new();
        let key = CacheKey::new(CacheKind::ViewedPages, "c1");
        cache.set(&key, "{not json");

        let decoded: Option<BTreeMap<String, Vec<usize>>> = load_json(&cache, &key);
        assert!(decoded.is_none());
    }

    #[test]
    fn file_cache_survives_new_instance() {
        let root = unique_temp_dir("file_cache");
        let key = CacheKey::new(CacheKind::OverallProgress, "course/with spaces");
        {
            let cache = FileCache::new(&root);
            store_json(&cache, &key, &42u32);
        }

        let reopened = FileCache::new(&root);
        let value: Option<u32> = load_json(&reopened, &key);
        let entry_dir = reopened.hash_dir("course/with spaces");
        let _ = fs::remove_dir_all(&root);

        assert_eq!(value, Some(42));
        assert!(entry_dir.starts_with(&root));
        assert_eq!(entry_dir.file_name().map(|name| name.len()), Some(64));
    }

    #[test]
    fn file_cache_missing_entry_is_none() {
        let cache = FileCache::new(unique_temp_dir("file_cache_missing"));
        assert!(cache.get(&CacheKey::new(CacheKind::Notes, "none")).is_none());
    }
}
