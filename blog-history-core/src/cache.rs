//! Response cache implementations.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::contract::{CacheKey, ResponseCache};

/// Never stores anything; every request goes to the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl ResponseCache for NoCache {
    fn load(&self, _key: &CacheKey) -> std::io::Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn store(&self, _key: &CacheKey, _body: &[u8]) -> std::io::Result<()> {
        Ok(())
    }
}

/// In-memory cache, lives as long as the client.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResponseCache for MemoryCache {
    fn load(&self, key: &CacheKey) -> std::io::Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| std::io::Error::other("memory cache lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn store(&self, key: &CacheKey, body: &[u8]) -> std::io::Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| std::io::Error::other("memory cache lock poisoned"))?;
        entries.insert(*key, body.to_vec());
        Ok(())
    }
}

/// One file per key under a directory, so re-runs during development skip
/// the network (and the throttle) entirely.
#[derive(Debug, Clone)]
pub struct DirCache {
    dir: PathBuf,
}

impl DirCache {
    /// Creates the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        debug!(path = %dir.display(), "Opened response cache directory");
        Ok(DirCache { dir })
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.cache"))
    }
}

impl ResponseCache for DirCache {
    fn load(&self, key: &CacheKey) -> std::io::Result<Option<Vec<u8>>> {
        let path = self.entry_path(key);
        match fs::read(&path) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn store(&self, key: &CacheKey, body: &[u8]) -> std::io::Result<()> {
        let path = self.entry_path(key);
        // Entries appear atomically.
        let partial = path.with_extension("partial");
        fs::write(&partial, body)?;
        fs::rename(&partial, &path)?;
        debug!(key = %key, path = %path.display(), bytes = body.len(), "Cached response");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PostType;

    #[test]
    fn no_cache_never_hits() {
        let cache = NoCache;
        cache.store(&CacheKey::Sites, b"x").unwrap();
        assert!(cache.load(&CacheKey::Sites).unwrap().is_none());
    }

    #[test]
    fn memory_cache_keeps_keys_apart() {
        let cache = MemoryCache::new();
        let page1 = CacheKey::PostsPage {
            site_id: 1,
            post_type: PostType::Post,
            page: 1,
        };
        let page2 = CacheKey::PostsPage {
            site_id: 1,
            post_type: PostType::Post,
            page: 2,
        };
        cache.store(&page1, b"one").unwrap();
        assert_eq!(cache.load(&page1).unwrap().as_deref(), Some(&b"one"[..]));
        assert!(cache.load(&page2).unwrap().is_none());
    }

    #[test]
    fn dir_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::Post {
            site_id: 3,
            post_id: 4,
        };
        DirCache::open(dir.path()).unwrap().store(&key, b"{}").unwrap();

        let reopened = DirCache::open(dir.path()).unwrap();
        assert_eq!(reopened.load(&key).unwrap().as_deref(), Some(&b"{}"[..]));
        assert!(dir.path().join("post_3_4.cache").exists());
        assert!(reopened.load(&CacheKey::Sites).unwrap().is_none());
    }
}
