//! Disk-based cache of downloaded bytes with per-entry expiry.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::domain::entities::digest_str;
use crate::domain::ports::{CacheError, CacheResult, DownloadCachePort};

/// Maximum disk cache size in bytes (200 MB default).
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 200 * 1024 * 1024;

const MAGIC: &[u8; 4] = b"IPC1";
const HEADER_LEN: usize = 4 + 8 + 8;
const NO_EXPIRY: u64 = u64::MAX;
const ENTRY_EXT: &str = "img";
const TEMP_EXT: &str = "tmp";

/// Header stored in front of every cached payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EntryHeader {
    written_at_ms: i64,
    ttl_ms: u64,
}

impl EntryHeader {
    fn new(ttl: Option<Duration>) -> Self {
        let ttl_ms = ttl.map_or(NO_EXPIRY, |d| u64::try_from(d.as_millis()).unwrap_or(NO_EXPIRY));
        Self {
            written_at_ms: Utc::now().timestamp_millis(),
            ttl_ms,
        }
    }

    fn encode(self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(MAGIC);
        out[4..12].copy_from_slice(&self.written_at_ms.to_le_bytes());
        out[12..].copy_from_slice(&self.ttl_ms.to_le_bytes());
        out
    }

    fn decode(data: &[u8]) -> CacheResult<Self> {
        if data.len() < HEADER_LEN || &data[..4] != MAGIC {
            return Err(CacheError::Corrupt("missing header".to_string()));
        }
        let mut written = [0u8; 8];
        written.copy_from_slice(&data[4..12]);
        let mut ttl = [0u8; 8];
        ttl.copy_from_slice(&data[12..HEADER_LEN]);
        Ok(Self {
            written_at_ms: i64::from_le_bytes(written),
            ttl_ms: u64::from_le_bytes(ttl),
        })
    }

    fn is_expired(self, now_ms: i64) -> bool {
        if self.ttl_ms == NO_EXPIRY {
            return false;
        }
        let ttl = i64::try_from(self.ttl_ms).unwrap_or(i64::MAX);
        now_ms >= self.written_at_ms.saturating_add(ttl)
    }
}

/// Disk-based cache that persists raw image bytes across sessions.
///
/// Each key maps to one `<digest>.img` file holding a small header (magic,
/// write time, TTL) followed by the payload. Expired or unreadable entries
/// are removed the next time they are read.
pub struct DiskImageCache {
    cache_dir: PathBuf,
    max_size: u64,
    current_size: AtomicU64,
    item_count: AtomicUsize,
    // Held while a file is committed or removed together with its counter update.
    ledger: Mutex<()>,
}

impl DiskImageCache {
    /// Opens a disk cache in the specified directory, restoring its counters.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be created.
    pub async fn new(cache_dir: PathBuf, max_size: u64) -> CacheResult<Self> {
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to create cache dir: {e}")))?;
        let mut total_size = 0u64;
        let mut count = 0usize;

        let mut entries = fs::read_dir(&cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read cache dir: {e}")))?;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == TEMP_EXT) {
                let _ = fs::remove_file(&path).await;
                continue;
            }
            if path.extension().is_some_and(|ext| ext == ENTRY_EXT)
                && let Ok(meta) = entry.metadata().await
            {
                total_size += meta.len();
                count += 1;
            }
        }

        let cache = Self {
            cache_dir,
            max_size,
            current_size: AtomicU64::new(total_size),
            item_count: AtomicUsize::new(count),
            ledger: Mutex::new(()),
        };

        cache.cleanup_if_needed().await;

        Ok(cache)
    }

    /// Opens a cache in the platform cache directory.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be created.
    pub async fn default_location() -> CacheResult<Self> {
        Self::new(default_cache_dir(), DEFAULT_MAX_CACHE_SIZE).await
    }

    /// Returns the directory holding the entries.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.{ENTRY_EXT}", digest_str(key)))
    }

    /// Reads the payload for `key`, deleting the entry if it has expired or
    /// cannot be parsed.
    ///
    /// # Errors
    /// Returns [`CacheError::NotFound`] for a miss or an expired entry,
    /// [`CacheError::Corrupt`] for an unreadable entry and
    /// [`CacheError::IoError`] for other failures.
    pub async fn read(&self, key: &str) -> CacheResult<Bytes> {
        let path = self.cache_path(key);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(key = %key, "Disk cache miss");
                return Err(CacheError::NotFound(key.to_string()));
            }
            Err(e) => return Err(CacheError::IoError(format!("Failed to read entry: {e}"))),
        };

        let header = match EntryHeader::decode(&data) {
            Ok(header) => header,
            Err(e) => {
                warn!(key = %key, path = %path.display(), "Removing corrupt disk cache entry");
                self.remove_path(&path).await;
                return Err(e);
            }
        };

        if header.is_expired(Utc::now().timestamp_millis()) {
            debug!(key = %key, "Disk cache entry expired");
            self.remove_path(&path).await;
            return Err(CacheError::NotFound(key.to_string()));
        }

        trace!(key = %key, path = %path.display(), "Disk cache hit");
        let mut data = Bytes::from(data);
        Ok(data.split_off(HEADER_LEN))
    }

    /// Stores `bytes` under `key`, replacing any previous entry.
    ///
    /// The payload is written to a temporary file and renamed into place, so
    /// readers never see a partial entry.
    ///
    /// # Errors
    /// Returns error if file cannot be created or written.
    pub async fn write(&self, key: &str, bytes: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let path = self.cache_path(key);
        let temp_path = self
            .cache_dir
            .join(format!("{}.{TEMP_EXT}", uuid::Uuid::new_v4()));

        let header = EntryHeader::new(ttl).encode();
        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&header).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(CacheError::IoError(format!("Failed to write cache file: {e}")));
        }

        {
            let _ledger = self.ledger.lock().await;
            let old_size = fs::metadata(&path).await.map(|m| m.len()).ok();
            if let Err(e) = fs::rename(&temp_path, &path).await {
                let _ = fs::remove_file(&temp_path).await;
                return Err(CacheError::IoError(format!("Failed to commit cache file: {e}")));
            }

            let new_size = (HEADER_LEN + bytes.len()) as u64;
            if let Some(old) = old_size {
                if new_size > old {
                    self.current_size.fetch_add(new_size - old, Ordering::Relaxed);
                } else {
                    self.current_size.fetch_sub(old - new_size, Ordering::Relaxed);
                }
            } else {
                self.current_size.fetch_add(new_size, Ordering::Relaxed);
                self.item_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        debug!(key = %key, path = %path.display(), size = bytes.len(), "Stored bytes in disk cache");

        self.cleanup_if_needed().await;

        Ok(())
    }

    /// Removes the entry for `key`.
    pub async fn evict(&self, key: &str) {
        let path = self.cache_path(key);
        if self.remove_path(&path).await {
            debug!(key = %key, "Evicted from disk cache");
        }
    }

    async fn remove_path(&self, path: &Path) -> bool {
        let _ledger = self.ledger.lock().await;
        let size = fs::metadata(path).await.map(|m| m.len()).ok();
        match fs::remove_file(path).await {
            Ok(()) => {
                if let Some(s) = size {
                    self.current_size.fetch_sub(s, Ordering::Relaxed);
                    self.item_count.fetch_sub(1, Ordering::Relaxed);
                }
                true
            }
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove disk cache entry");
                }
                false
            }
        }
    }

    /// Clears the entire disk cache.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be read.
    pub async fn clear(&self) -> CacheResult<()> {
        let _ledger = self.ledger.lock().await;
        let mut entries = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read cache dir: {e}")))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read entry: {e}")))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXT)
                && fs::remove_file(&path).await.is_err()
            {
                warn!(path = %path.display(), "Failed to remove cache file");
            }
        }
        self.current_size.store(0, Ordering::Relaxed);
        self.item_count.store(0, Ordering::Relaxed);
        debug!("Cleared disk cache");
        Ok(())
    }

    /// Returns the current cache size in bytes, headers included.
    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }

    /// Returns the number of cached files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.item_count.load(Ordering::Relaxed)
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if an entry file exists for `key`. Does not check expiry.
    pub async fn contains(&self, key: &str) -> bool {
        fs::try_exists(self.cache_path(key)).await.unwrap_or(false)
    }

    /// Removes least recently used entries once the cache is over its limit,
    /// down to 90% of the limit.
    async fn cleanup_if_needed(&self) {
        let current_size = self.current_size();
        if current_size <= self.max_size {
            return;
        }

        debug!(
            current_size = current_size,
            max_size = self.max_size,
            "Disk cache over limit, cleaning up"
        );

        let Ok(mut entries) = fs::read_dir(&self.cache_dir).await else {
            return;
        };

        let mut files: Vec<(PathBuf, std::time::SystemTime, u64)> = Vec::new();

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != ENTRY_EXT) {
                continue;
            }

            if let Ok(meta) = entry.metadata().await {
                let used = meta
                    .accessed()
                    .or_else(|_| meta.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                files.push((path, used, meta.len()));
            }
        }

        files.sort_by_key(|(_, time, _)| *time);

        let _ledger = self.ledger.lock().await;
        let mut freed_size = 0u64;
        let mut freed_count = 0usize;
        let target = current_size - self.max_size + (self.max_size / 10);

        for (path, _, size) in files {
            if freed_size >= target {
                break;
            }

            if let Err(e) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove old cache file");
            } else {
                trace!(path = %path.display(), "Removed old cache file");
                freed_size += size;
                freed_count += 1;
            }
        }
        self.current_size.fetch_sub(freed_size, Ordering::Relaxed);
        self.item_count.fetch_sub(freed_count, Ordering::Relaxed);

        debug!(
            freed_size = freed_size,
            freed_count = freed_count,
            "Disk cache cleanup complete"
        );
    }
}

#[async_trait::async_trait]
impl DownloadCachePort for DiskImageCache {
    async fn get(&self, url: &str) -> Option<Bytes> {
        match self.read(url).await {
            Ok(bytes) => Some(bytes),
            Err(CacheError::NotFound(_)) => None,
            Err(e) => {
                warn!(key = %url, error = %e, "Disk cache read failed, treating as miss");
                None
            }
        }
    }

    async fn put(&self, url: &str, bytes: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        self.write(url, bytes, ttl).await
    }

    async fn remove(&self, url: &str) {
        self.evict(url).await;
    }

    async fn clear(&self) -> CacheResult<()> {
        DiskImageCache::clear(self).await
    }
}

/// Returns the default cache directory path.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "imgpipe", "imgpipe").map_or_else(
        || std::env::temp_dir().join("imgpipe").join("cache").join("downloads"),
        |dirs| dirs.cache_dir().join("downloads"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DAY: Duration = Duration::from_secs(86_400);

    async fn create_test_cache() -> (DiskImageCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskImageCache::new(temp_dir.path().to_path_buf(), 1024 * 1024)
            .await
            .unwrap();
        (cache, temp_dir)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (cache, _temp) = create_test_cache().await;
        let url = "https://example.com/a.png";

        cache.put(url, b"test image data", Some(DAY)).await.unwrap();

        assert_eq!(cache.get(url).await.unwrap().as_ref(), b"test image data");
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let (cache, _temp) = create_test_cache().await;

        assert!(cache.get("https://example.com/none.png").await.is_none());
        assert!(matches!(
            cache.read("https://example.com/none.png").await,
            Err(CacheError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let url = "https://example.com/persist.png";
        {
            let cache = DiskImageCache::new(temp_dir.path().to_path_buf(), 1024 * 1024)
                .await
                .unwrap();
            cache.put(url, b"persisted", None).await.unwrap();
        }

        let reopened = DiskImageCache::new(temp_dir.path().to_path_buf(), 1024 * 1024)
            .await
            .unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get(url).await.unwrap().as_ref(), b"persisted");
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed_on_read() {
        let (cache, _temp) = create_test_cache().await;
        let url = "https://example.com/old.png";

        cache
            .put(url, b"stale", Some(Duration::from_millis(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(cache.get(url).await.is_none());
        assert!(!cache.contains(url).await);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.current_size(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let (cache, _temp) = create_test_cache().await;
        let url = "https://example.com/broken.png";
        std::fs::write(cache.cache_path(url), b"garbage").unwrap();

        assert!(matches!(cache.read(url).await, Err(CacheError::Corrupt(_))));
        assert!(!cache.contains(url).await);
        assert!(cache.get(url).await.is_none());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let (cache, _temp) = create_test_cache().await;
        let url = "https://example.com/a.png";

        cache.put(url, b"first", None).await.unwrap();
        cache.put(url, b"second", None).await.unwrap();

        assert_eq!(cache.get(url).await.unwrap().as_ref(), b"second");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (cache, _temp) = create_test_cache().await;

        cache.put("a", b"data1", None).await.unwrap();
        cache.put("b", b"data2", None).await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.remove("a").await;
        assert!(!cache.contains("a").await);
        assert_eq!(cache.len(), 1);

        cache.clear().await.unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.current_size(), 0);
    }

    #[tokio::test]
    async fn test_atomic_counters_sync() {
        let (cache, _temp) = create_test_cache().await;
        let header = HEADER_LEN as u64;

        cache.put("test1", b"hello", None).await.unwrap();
        cache.put("test2", b"world!", None).await.unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_size(), 11 + 2 * header);

        cache.put("test1", b"hey", None).await.unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_size(), 9 + 2 * header);

        cache.evict("test2").await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 3 + header);
    }

    #[tokio::test]
    async fn test_concurrent_writes_of_new_key_count_once() {
        let (cache, _temp) = create_test_cache().await;
        let url = "https://example.com/race.png";

        let writes = (0..8).map(|_| cache.put(url, b"payload", None));
        for result in futures_util::future::join_all(writes).await {
            result.unwrap();
        }

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), HEADER_LEN as u64 + 7);
    }

    #[tokio::test]
    async fn test_cleanup_updates_counters() {
        let temp_dir = TempDir::new().unwrap();
        let limit = HEADER_LEN as u64 + 10;
        let cache = DiskImageCache::new(temp_dir.path().to_path_buf(), limit)
            .await
            .unwrap();

        cache.put("test1", b"123456", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.put("test2", b"123456", None).await.unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), HEADER_LEN as u64 + 6);
    }

    #[test]
    fn test_header_expiry() {
        let header = EntryHeader {
            written_at_ms: 1_000,
            ttl_ms: 500,
        };
        assert!(!header.is_expired(1_499));
        assert!(header.is_expired(1_500));

        let forever = EntryHeader {
            written_at_ms: 0,
            ttl_ms: NO_EXPIRY,
        };
        assert!(!forever.is_expired(i64::MAX));
        assert_eq!(EntryHeader::decode(&forever.encode()).unwrap(), forever);
    }
}
