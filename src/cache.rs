use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FixtureError;

/// One entry of the resolved-URL file: `{"id": ..., "urls": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedUrls {
    pub id: String,
    pub urls: Vec<String>,
}

/// Storage for data file URLs found during discovery, keyed by pubmed id or
/// accession bucket.
pub trait UrlCache: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<String>>, FixtureError>;
    fn store(&self, key: &str, urls: &[String]) -> Result<(), FixtureError>;
}

/// JSON array file cache. Entries sharing an id are merged on load.
pub struct JsonFileCache {
    path: PathBuf,
    entries: Mutex<Option<BTreeMap<String, Vec<String>>>>,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    fn read_file(&self) -> Result<BTreeMap<String, Vec<String>>, FixtureError> {
        let mut map = BTreeMap::<String, Vec<String>>::new();
        if !self.path.exists() {
            return Ok(map);
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|err| FixtureError::Filesystem(format!("read {}: {err}", self.path.display())))?;
        let entries: Vec<CachedUrls> =
            serde_json::from_str(&content).map_err(|err| FixtureError::CacheParse {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
        for entry in entries {
            map.entry(entry.id).or_default().extend(entry.urls);
        }
        debug!(path = %self.path.display(), keys = map.len(), "loaded url cache");
        Ok(map)
    }

    fn write_file(&self, map: &BTreeMap<String, Vec<String>>) -> Result<(), FixtureError> {
        let entries: Vec<CachedUrls> = map
            .iter()
            .map(|(id, urls)| CachedUrls {
                id: id.clone(),
                urls: urls.clone(),
            })
            .collect();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| FixtureError::Filesystem(err.to_string()))?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(&entries)
            .map_err(|err| FixtureError::Filesystem(err.to_string()))?;
        fs::write(&tmp_path, &content).map_err(|err| FixtureError::Filesystem(err.to_string()))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|err| FixtureError::Filesystem(err.to_string()))?;
        Ok(())
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, Vec<String>>) -> Result<T, FixtureError>,
    ) -> Result<T, FixtureError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| FixtureError::Filesystem("url cache lock poisoned".to_string()))?;
        if guard.is_none() {
            *guard = Some(self.read_file()?);
        }
        match guard.as_mut() {
            Some(entries) => f(entries),
            None => Err(FixtureError::Filesystem("url cache not loaded".to_string())),
        }
    }
}

impl UrlCache for JsonFileCache {
    fn load(&self, key: &str) -> Result<Option<Vec<String>>, FixtureError> {
        self.with_entries(|entries| Ok(entries.get(key).cloned()))
    }

    fn store(&self, key: &str, urls: &[String]) -> Result<(), FixtureError> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), urls.to_vec());
            self.write_file(entries)
        })
    }
}

/// In-process cache, mostly for tests.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<BTreeMap<String, Vec<String>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UrlCache for MemoryCache {
    fn load(&self, key: &str) -> Result<Option<Vec<String>>, FixtureError> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| FixtureError::Filesystem("url cache lock poisoned".to_string()))?;
        Ok(guard.get(key).cloned())
    }

    fn store(&self, key: &str, urls: &[String]) -> Result<(), FixtureError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| FixtureError::Filesystem("url cache lock poisoned".to_string()))?;
        guard.insert(key.to_string(), urls.to_vec());
        Ok(())
    }
}
