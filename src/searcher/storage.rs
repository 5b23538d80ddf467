//! Byte-range-addressable index storage, a best-effort block cache and the
//! bounded fetcher the query engine goes through

use std::collections::HashMap;
use std::io::SeekFrom;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{MorselError, Result};

/// Async storage of named index files
#[async_trait]
pub trait IndexStore: Send + Sync + 'static {
    /// Read a whole file
    async fn fetch(&self, name: &str) -> Result<Arc<Vec<u8>>>;

    /// Read a byte range of a file
    async fn fetch_range(&self, name: &str, range: Range<u64>) -> Result<Vec<u8>>;
}

/// Best-effort cache in front of an [`IndexStore`]
#[async_trait]
pub trait BlockCache: Send + Sync + 'static {
    async fn match_entry(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>>;

    async fn add(&self, key: &str, data: Arc<Vec<u8>>) -> Result<()>;

    /// Drop entries of every index version except `version`
    async fn retain_version(&self, version: &str) -> Result<()>;
}

fn not_found(name: &str) -> MorselError {
    MorselError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("index file not found: {}", name),
    ))
}

pub(crate) fn is_not_found(err: &MorselError) -> bool {
    matches!(err, MorselError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
}

/// Index files in a local directory
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        if relative.is_absolute() || name.split('/').any(|p| p == "..") {
            return Err(MorselError::Internal(format!("invalid index file name: {}", name)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl IndexStore for FsStore {
    async fn fetch(&self, name: &str) -> Result<Arc<Vec<u8>>> {
        let data = tokio::fs::read(self.resolve(name)?).await?;
        Ok(Arc::new(data))
    }

    async fn fetch_range(&self, name: &str, range: Range<u64>) -> Result<Vec<u8>> {
        let mut file = tokio::fs::File::open(self.resolve(name)?).await?;
        file.seek(SeekFrom::Start(range.start)).await?;
        let mut buf = vec![0u8; range.end.saturating_sub(range.start) as usize];
        file.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

/// Index files held in memory
#[derive(Default)]
pub struct MemoryStore {
    files: RwLock<HashMap<String, Arc<Vec<u8>>>>,
    fetches: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every file under `dir`, keyed by `/`-separated relative path
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let store = Self::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            for entry in std::fs::read_dir(&current)? {
                let path = entry?.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(dir) {
                    let name: Vec<String> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    store.insert(name.join("/"), std::fs::read(&path)?);
                }
            }
        }
        Ok(store)
    }

    pub fn insert(&self, name: impl Into<String>, data: Vec<u8>) {
        self.files.write().insert(name.into(), Arc::new(data));
    }

    pub fn remove(&self, name: &str) -> bool {
        self.files.write().remove(name).is_some()
    }

    /// Number of fetch calls served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn fetch(&self, name: &str) -> Result<Arc<Vec<u8>>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    async fn fetch_range(&self, name: &str, range: Range<u64>) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let files = self.files.read();
        let data = files.get(name).ok_or_else(|| not_found(name))?;
        data.get(range.start as usize..range.end as usize)
            .map(|s| s.to_vec())
            .ok_or_else(|| {
                MorselError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("range {:?} out of bounds for {}", range, name),
                ))
            })
    }
}

/// Unbounded in-memory [`BlockCache`]
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Arc<Vec<u8>>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Cached keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlockCache for MemoryCache {
    async fn match_entry(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn add(&self, key: &str, data: Arc<Vec<u8>>) -> Result<()> {
        self.entries.write().insert(key.to_string(), data);
        Ok(())
    }

    async fn retain_version(&self, version: &str) -> Result<()> {
        let prefix = version_prefix(version);
        self.entries.write().retain(|key, _| key.starts_with(&prefix));
        Ok(())
    }
}

/// Store access limited to a fixed number of in-flight fetches.
///
/// Waiters are served in arrival order. Cache failures are logged and fall
/// through to the store.
pub struct BoundedFetcher {
    store: Arc<dyn IndexStore>,
    cache: Option<Arc<dyn BlockCache>>,
    permits: Semaphore,
    max_concurrent: usize,
}

impl BoundedFetcher {
    pub fn new(
        store: Arc<dyn IndexStore>,
        cache: Option<Arc<dyn BlockCache>>,
        max_concurrent: usize,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            store,
            cache,
            permits: Semaphore::new(max_concurrent),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    async fn acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|_| MorselError::Internal("fetcher closed".to_string()))
    }

    /// Fetch a whole file, bypassing the cache
    pub async fn fetch(&self, name: &str) -> Result<Arc<Vec<u8>>> {
        let _permit = self.acquire().await?;
        self.store.fetch(name).await
    }

    /// Fetch a byte range, bypassing the cache
    pub async fn fetch_range(&self, name: &str, range: Range<u64>) -> Result<Vec<u8>> {
        let _permit = self.acquire().await?;
        self.store.fetch_range(name, range).await
    }

    /// Cached copy of `name` for index version `version`, if any
    pub async fn cached(&self, name: &str, version: &str) -> Option<Arc<Vec<u8>>> {
        let cache = self.cache.as_ref()?;
        match cache.match_entry(&cache_key(name, version)).await {
            Ok(hit) => hit,
            Err(e) => {
                debug!(name, error = %e, "cache lookup failed");
                None
            }
        }
    }

    /// Fetch a whole file through the cache; cache keys carry the index
    /// version so an updated index never reads stale blocks
    pub async fn fetch_cached(&self, name: &str, version: &str) -> Result<Arc<Vec<u8>>> {
        if let Some(hit) = self.cached(name, version).await {
            return Ok(hit);
        }

        let data = self.fetch(name).await?;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.add(&cache_key(name, version), data.clone()).await {
                debug!(name, error = %e, "cache add failed");
            }
        }
        Ok(data)
    }

    /// Evict cached files of older index versions
    pub async fn retain_version(&self, version: &str) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.retain_version(version).await {
                debug!(version, error = %e, "cache eviction failed");
            }
        }
    }
}

fn version_prefix(version: &str) -> String {
    format!("{}/", version)
}

fn cache_key(name: &str, version: &str) -> String {
    format!("{}{}", version_prefix(version), name)
}
