//! Cache manager: the registry that owns the cache directory
//!
//! [`CacheManager`] decides where cached bytes live, hands out per-resource
//! configurations, keeps the directory within its byte budget and fans out
//! progress notifications. It is constructed once from a [`CacheConfig`] and
//! shared by reference (typically inside an `Arc`) with the proxy layer and
//! the download workers.
//!
//! Locking:
//! - `settings` (directory, budget, naming rule) sits behind a reader-writer
//!   lock; it changes rarely and is read on every call.
//! - Each resource's configuration has its own mutex, so mutations of one
//!   resource are serialized while different resources proceed in parallel.
//! - Eviction runs and in-use bookkeeping share one cache-wide lock owned by
//!   the [`EvictionEngine`]. Lock order is eviction, then in-use, then
//!   registry, then a resource's configuration.

use crate::config::{validate_max_cache_size, CacheConfig, ImportMode};
use crate::configuration::ResourceConfiguration;
use crate::error::{CacheError, Result};
use crate::events::{CacheEvent, EventBus};
use crate::eviction::{remove_resource_files, EvictionEngine, EvictionReport};
use crate::metrics::{CacheMetrics, MetricsSnapshot};
use crate::models::ByteRange;
use crate::naming::{HashNaming, NamingStrategy, SharedNaming};
use crate::session::DownloadSession;
use crate::throttle::NotifyThrottle;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Mutable process-wide settings
struct ManagerSettings {
    cache_dir: PathBuf,
    max_cache_size: u64,
    naming: SharedNaming,
    import_mode: ImportMode,
    evict_on_write: bool,
}

/// Registry slot for one resource
pub(crate) struct ResourceEntry {
    /// Directory the resource lives in; fixed for the entry's lifetime
    pub(crate) dir: PathBuf,
    pub(crate) config: Mutex<ResourceConfiguration>,
}

/// Disk usage summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of eviction units (bytes file plus sidecar)
    pub units: usize,
    /// Bytes held by bytes files
    pub media_bytes: u64,
    /// Bytes held by sidecar files
    pub sidecar_bytes: u64,
    pub max_cache_size: u64,
}

/// Disk-backed cache manager for partially downloaded media resources
pub struct CacheManager {
    settings: RwLock<ManagerSettings>,
    registry: Mutex<HashMap<PathBuf, Arc<ResourceEntry>>>,
    /// Active users per bytes-file path
    in_use: Mutex<HashMap<PathBuf, usize>>,
    throttle: NotifyThrottle,
    events: EventBus,
    eviction: EvictionEngine,
    metrics: CacheMetrics,
}

/// Marks a resource as in use until dropped
pub(crate) struct InUseGuard<'a> {
    manager: &'a CacheManager,
    path: PathBuf,
}

impl Drop for InUseGuard<'_> {
    fn drop(&mut self) {
        let mut in_use = self.manager.in_use.lock();
        if let Some(count) = in_use.get_mut(&self.path) {
            *count -= 1;
            if *count == 0 {
                in_use.remove(&self.path);
                // Idle entries live on disk only; held under the in-use lock so
                // a session starting now cannot pick up the stale entry
                self.manager.registry.lock().remove(&self.path);
            }
        }
    }
}

fn create_cache_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| {
        CacheError::ConfigError(format!(
            "Failed to create cache directory {}: {}",
            dir.display(),
            e
        ))
    })
}

impl CacheManager {
    /// Create a cache manager, validating `config` and creating its directory
    ///
    /// # Returns
    /// * `Ok(CacheManager)` ready for use
    /// * `Err(CacheError::ConfigError)` if the config is invalid or the
    ///   directory cannot be created
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        create_cache_dir(&config.cache_dir)?;

        info!(
            "Initializing media cache: dir={}, max_size={}MB, notify_interval={}ms",
            config.cache_dir.display(),
            config.max_cache_size / 1024 / 1024,
            config.notify_interval_ms
        );

        Ok(CacheManager {
            settings: RwLock::new(ManagerSettings {
                cache_dir: config.cache_dir.clone(),
                max_cache_size: config.max_cache_size,
                naming: Arc::new(HashNaming),
                import_mode: config.import_mode,
                evict_on_write: config.evict_on_write,
            }),
            registry: Mutex::new(HashMap::new()),
            in_use: Mutex::new(HashMap::new()),
            throttle: NotifyThrottle::new(config.notify_interval()),
            events: EventBus::new(config.event_buffer),
            eviction: EvictionEngine::new(),
            metrics: CacheMetrics::new(),
        })
    }

    // ----- settings -----

    /// Point the manager at a new root directory, creating it if needed
    ///
    /// Existing files are not migrated; resources cached under the old
    /// directory become cache misses. Active download sessions keep
    /// writing where they started.
    pub fn set_cache_directory(&self, dir: impl Into<PathBuf>) -> Result<()> {
        let dir = dir.into();
        if dir.as_os_str().is_empty() {
            return Err(CacheError::ConfigError(
                "cache directory must not be empty".to_string(),
            ));
        }
        create_cache_dir(&dir)?;

        let mut settings = self.settings.write();
        info!(
            "Cache directory changed from {} to {}",
            settings.cache_dir.display(),
            dir.display()
        );
        settings.cache_dir = dir;
        Ok(())
    }

    pub fn cache_directory(&self) -> PathBuf {
        self.settings.read().cache_dir.clone()
    }

    /// Set the byte budget; zero is rejected rather than read as unlimited
    pub fn set_max_cache_size(&self, bytes: u64) -> Result<()> {
        validate_max_cache_size(bytes)?;
        self.settings.write().max_cache_size = bytes;
        Ok(())
    }

    pub fn max_cache_size(&self) -> u64 {
        self.settings.read().max_cache_size
    }

    pub fn set_notify_interval(&self, interval: Duration) {
        self.throttle.set_interval(interval);
    }

    pub fn notify_interval(&self) -> Duration {
        self.throttle.interval()
    }

    /// Install a custom naming strategy
    ///
    /// Only affects URLs resolved afterwards. Files cached under the old
    /// names are not renamed and will not be found again.
    pub fn set_file_name_rule<S>(&self, strategy: S)
    where
        S: NamingStrategy + 'static,
    {
        self.settings.write().naming = Arc::new(strategy);
    }

    pub fn set_import_mode(&self, mode: ImportMode) {
        self.settings.write().import_mode = mode;
    }

    // ----- resolution -----

    /// Base name for `url` under the current naming strategy
    pub fn resource_key_for_url(&self, url: &str) -> String {
        self.settings.read().naming.name_for(url)
    }

    /// Path of the bytes file for `url`; does not touch the disk
    pub fn cached_file_path_for_url(&self, url: &str) -> PathBuf {
        let (dir, key) = self.resolve(url);
        dir.join(key)
    }

    fn resolve(&self, url: &str) -> (PathBuf, String) {
        let settings = self.settings.read();
        (settings.cache_dir.clone(), settings.naming.name_for(url))
    }

    /// Configuration of `url`, loaded from its sidecar or freshly created
    ///
    /// A missing or unreadable sidecar yields an empty configuration that is
    /// not persisted until something is written. Resources with an active
    /// session are answered from memory; anything else is read from disk
    /// and not kept in the registry.
    pub fn cache_configuration_for_url(&self, url: &str) -> ResourceConfiguration {
        let (dir, key) = self.resolve(url);
        let active = self.registry.lock().get(&dir.join(&key)).cloned();
        match active {
            Some(entry) => {
                let config = entry.config.lock().clone();
                config
            }
            None => self.load_or_new(&dir, &key, url),
        }
    }

    #[cfg(test)]
    pub(crate) fn registered_resources(&self) -> usize {
        self.registry.lock().len()
    }

    pub(crate) fn entry(&self, dir: &Path, key: &str, url: &str) -> Arc<ResourceEntry> {
        let path = dir.join(key);
        let mut registry = self.registry.lock();
        if let Some(entry) = registry.get(&path) {
            return entry.clone();
        }

        let config = self.load_or_new(dir, key, url);
        let entry = Arc::new(ResourceEntry {
            dir: dir.to_path_buf(),
            config: Mutex::new(config),
        });
        registry.insert(path, entry.clone());
        entry
    }

    fn load_or_new(&self, dir: &Path, key: &str, url: &str) -> ResourceConfiguration {
        let path = dir.join(key);
        let fresh = || ResourceConfiguration::new(url, key, path.clone());

        let mut config = match ResourceConfiguration::load(dir, key) {
            Ok(Some(config)) => config,
            Ok(None) => return fresh(),
            Err(e) => {
                warn!("Discarding unreadable sidecar for {}: {}", url, e);
                self.metrics.record_sidecar_failure();
                return fresh();
            }
        };

        // Bookkeeping must never claim bytes that are not on disk
        match fs::metadata(&path) {
            Ok(meta) => {
                if config.clip_to_file_len(meta.len()) {
                    warn!(
                        "Sidecar of {} described bytes past the end of its file, clipped to {}",
                        url,
                        meta.len()
                    );
                }
            }
            Err(_) if config.ranges().is_empty() => {}
            Err(_) => {
                warn!("Bytes file of {} is missing, dropping its cached ranges", url);
                config.reset_ranges();
            }
        }
        config
    }

    fn forget(&self, path: &Path) {
        self.registry.lock().remove(path);
    }

    // ----- in-use tracking -----

    pub(crate) fn mark_in_use(&self, path: PathBuf) -> InUseGuard<'_> {
        // Taking the eviction lock orders this against a run in progress
        let _eviction = self.eviction.lock();
        *self.in_use.lock().entry(path.clone()).or_insert(0) += 1;
        InUseGuard {
            manager: self,
            path,
        }
    }

    /// Mark `path` in use unless someone else already holds it
    fn try_mark_exclusive(&self, path: PathBuf) -> Option<InUseGuard<'_>> {
        let _eviction = self.eviction.lock();
        let mut in_use = self.in_use.lock();
        if in_use.contains_key(&path) {
            return None;
        }
        in_use.insert(path.clone(), 1);
        Some(InUseGuard {
            manager: self,
            path,
        })
    }

    pub fn is_in_use(&self, url: &str) -> bool {
        let path = self.cached_file_path_for_url(url);
        self.path_in_use(&path)
    }

    fn path_in_use(&self, path: &Path) -> bool {
        self.in_use.lock().contains_key(path)
    }

    // ----- download workers -----

    /// Start a download session for `url`
    ///
    /// The resource is protected from eviction until the session is
    /// finished or dropped.
    pub fn begin_download(&self, url: &str) -> DownloadSession<'_> {
        let (dir, key) = self.resolve(url);
        let guard = self.mark_in_use(dir.join(&key));
        let entry = self.entry(&dir, &key, url);
        debug!("Download session started for {} ({})", url, key);
        DownloadSession::new(self, entry, guard)
    }

    /// Make room for `incoming` bytes if the budget would be exceeded
    ///
    /// # Returns
    /// * `Ok(Some(report))` if an eviction ran
    /// * `Ok(None)` if there was room or eviction on write is disabled
    pub fn ensure_space(&self, incoming: u64) -> Result<Option<EvictionReport>> {
        let (dir, max, enabled) = {
            let settings = self.settings.read();
            (settings.cache_dir.clone(), settings.max_cache_size, settings.evict_on_write)
        };
        if !enabled {
            return Ok(None);
        }

        let _eviction = self.eviction.lock();
        let current = EvictionEngine::media_bytes(&dir)?;
        let needed = current.saturating_add(incoming);
        if needed <= max {
            return Ok(None);
        }

        debug!(
            "Cache over budget: current={} incoming={} max={}",
            current, incoming, max
        );
        let report = self.evict_locked(&dir, needed - max)?;
        Ok(Some(report))
    }

    pub(crate) fn publish_update(&self, config: &ResourceConfiguration) {
        let emitted = self.throttle.try_acquire(&config.resource_key);
        self.metrics.record_update(emitted);
        if emitted {
            self.events.emit(CacheEvent::Updated {
                resource_key: config.resource_key.clone(),
                configuration: config.clone(),
            });
        }
    }

    /// Publish the terminal event of a session that still holds its in-use
    /// mark on `path`
    pub(crate) fn publish_finished(
        &self,
        config: &ResourceConfiguration,
        path: &Path,
        error: Option<CacheError>,
    ) {
        // Other sessions on the same resource keep their throttle window
        let last_session = self.in_use.lock().get(path).copied().unwrap_or(0) <= 1;
        if last_session {
            self.throttle.reset(&config.resource_key);
        }
        self.metrics.record_finished();
        self.events.emit(CacheEvent::Finished {
            resource_key: config.resource_key.clone(),
            configuration: config.clone(),
            error,
        });
    }

    pub(crate) fn metrics_handle(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Read `range` of `url` from the cache if every byte of it is present
    pub fn read_cached(&self, url: &str, range: ByteRange) -> Result<Option<Bytes>> {
        let config = self.cache_configuration_for_url(url);
        if !config.ranges().covers(&range) {
            return Ok(None);
        }

        let path = &config.local_file_path;
        let mut file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io_at(path, e)),
        };
        file.seek(SeekFrom::Start(range.start))
            .map_err(|e| CacheError::io_at(path, e))?;

        let mut buf = vec![0u8; range.len() as usize];
        match file.read_exact(&mut buf) {
            Ok(()) => Ok(Some(Bytes::from(buf))),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                warn!("Bytes file of {} is shorter than its sidecar claims", url);
                Ok(None)
            }
            Err(e) => Err(CacheError::io_at(path, e)),
        }
    }

    // ----- size accounting and cleaning -----

    /// Total size of all bytes files in the cache directory
    ///
    /// Sidecars are bookkeeping overhead and are not counted.
    pub fn calculate_cached_size(&self) -> Result<u64> {
        EvictionEngine::media_bytes(&self.cache_directory())
    }

    /// Disk usage summary including sidecar overhead
    pub fn stats(&self) -> Result<CacheStats> {
        let units = EvictionEngine::scan(&self.cache_directory())?;
        Ok(CacheStats {
            units: units.len(),
            media_bytes: units.iter().map(|u| u.media_bytes).sum(),
            sidecar_bytes: units.iter().map(|u| u.sidecar_bytes).sum(),
            max_cache_size: self.max_cache_size(),
        })
    }

    /// Delete the oldest cached resources until `bytes` are reclaimed
    ///
    /// Resources with an active download are skipped. The report carries
    /// the bytes actually freed, which may be less than requested, and the
    /// first per-resource failure, if any.
    pub fn clean_cache_with_size(&self, bytes: u64) -> Result<EvictionReport> {
        let dir = self.cache_directory();
        let _eviction = self.eviction.lock();
        self.evict_locked(&dir, bytes)
    }

    /// Delete every cached resource that is not being downloaded
    ///
    /// Skipped in-use resources are reported as `ResourceInUse` in the
    /// report's `first_error` when nothing else failed. Their throttle
    /// state is left alone.
    pub fn clean_all_cache(&self) -> Result<EvictionReport> {
        let mut report = self.clean_cache_with_size(u64::MAX)?;
        for key in report.skipped_in_use.clone() {
            report.record_error(CacheError::ResourceInUse(key));
        }
        Ok(report)
    }

    fn evict_locked(&self, dir: &Path, bytes: u64) -> Result<EvictionReport> {
        let report = self
            .eviction
            .evict_locked(dir, bytes, |key| self.path_in_use(&dir.join(key)))?;

        for key in &report.evicted {
            self.forget(&dir.join(key));
            self.throttle.reset(key);
        }
        self.metrics.record_eviction(
            report.evicted.len() as u64,
            report.freed_bytes,
            report.error_count,
        );
        Ok(report)
    }

    /// Delete the bytes file and sidecar of `url`
    ///
    /// Succeeds without touching the disk if nothing is cached.
    pub fn clean_cache_for_url(&self, url: &str) -> Result<()> {
        let (dir, key) = self.resolve(url);
        let path = dir.join(&key);

        let _eviction = self.eviction.lock();
        if self.path_in_use(&path) {
            return Err(CacheError::ResourceInUse(url.to_string()));
        }

        remove_resource_files(&dir, &key)?;
        self.forget(&path);
        self.throttle.reset(&key);
        info!("Cleaned cache for {}", url);
        Ok(())
    }

    /// Seed the cache with a complete local copy of `url`
    ///
    /// The file is copied or moved (per the configured [`ImportMode`]) to
    /// the resource's bytes path and described as fully cached.
    ///
    /// # Returns
    /// * `Ok(configuration)` describing the imported resource
    /// * `Err(CacheError::SourceNotFound)` if `local_path` is not a file
    /// * `Err(CacheError::AlreadyCached)` if `url` is already fully cached;
    ///   a partial entry is replaced instead
    /// * `Err(CacheError::ResourceInUse)` if a download is writing to it
    pub fn add_cache_file(&self, local_path: impl AsRef<Path>, url: &str) -> Result<ResourceConfiguration> {
        let local_path = local_path.as_ref();
        let source_len = match fs::metadata(local_path) {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => return Err(CacheError::SourceNotFound(local_path.to_path_buf())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CacheError::SourceNotFound(local_path.to_path_buf()))
            }
            Err(e) => return Err(CacheError::io_at(local_path, e)),
        };

        let (dir, key) = self.resolve(url);
        let target = dir.join(&key);
        let _busy = self
            .try_mark_exclusive(target.clone())
            .ok_or_else(|| CacheError::ResourceInUse(url.to_string()))?;

        // Checked under the exclusive mark so a concurrent import is seen
        if self.load_or_new(&dir, &key, url).is_complete() {
            return Err(CacheError::AlreadyCached(url.to_string()));
        }

        self.ensure_space(source_len)?;

        remove_resource_files(&dir, &key)?;
        self.forget(&target);

        let mode = self.settings.read().import_mode;
        import_file(local_path, &target, mode)?;

        let mut config = ResourceConfiguration::new(url, key.as_str(), target.clone());
        config.set_content_info(Some(source_len), None);
        if source_len > 0 {
            config.add_range(ByteRange::new(0, source_len)?)?;
        }
        config.save(&dir)?;
        self.metrics.record_import();
        info!(
            "Imported {} as {} ({} bytes, {:?})",
            local_path.display(),
            url,
            source_len,
            mode
        );
        Ok(config)
    }

    // ----- observation -----

    /// Subscribe to cache notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn import_file(source: &Path, target: &Path, mode: ImportMode) -> Result<()> {
    match mode {
        ImportMode::Copy => {
            fs::copy(source, target).map_err(|e| CacheError::io_at(target, e))?;
        }
        ImportMode::Move => {
            if let Err(e) = fs::rename(source, target) {
                // Cross-device moves cannot be renamed
                debug!("Rename failed ({}), falling back to copy", e);
                fs::copy(source, target).map_err(|e| CacheError::io_at(target, e))?;
                fs::remove_file(source).map_err(|e| CacheError::io_at(source, e))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::FnNaming;
    use tempfile::TempDir;

    fn manager(dir: &Path) -> CacheManager {
        CacheManager::new(CacheConfig::new(dir)).unwrap()
    }

    #[test]
    fn test_new_creates_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("cache");
        let manager = manager(&dir);
        assert!(dir.is_dir());
        assert_eq!(manager.cache_directory(), dir);
        assert_eq!(manager.max_cache_size(), 512 * 1024 * 1024);
    }

    #[test]
    fn test_unwritable_directory_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, b"x").unwrap();

        let result = CacheManager::new(CacheConfig::new(blocker.join("cache")));
        assert!(matches!(result, Err(CacheError::ConfigError(_))));

        let manager = manager(&tmp.path().join("ok"));
        let err = manager.set_cache_directory(blocker.join("cache")).unwrap_err();
        assert!(matches!(err, CacheError::ConfigError(_)));
    }

    #[test]
    fn test_zero_budget_rejected() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(tmp.path());
        assert!(manager.set_max_cache_size(0).is_err());
        manager.set_max_cache_size(1024).unwrap();
        assert_eq!(manager.max_cache_size(), 1024);
    }

    #[test]
    fn test_path_is_pure() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(tmp.path());
        let url = "https://media.example.com/track.mp3";
        let a = manager.cached_file_path_for_url(url);
        let b = manager.cached_file_path_for_url(url);
        assert_eq!(a, b);
        assert_eq!(a.parent().unwrap(), tmp.path());
        assert!(!a.exists());
    }

    #[test]
    fn test_custom_naming_rule() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(tmp.path());
        let url = "https://media.example.com/a/track.mp3";
        let before = manager.cached_file_path_for_url(url);

        manager.set_file_name_rule(FnNaming(|u: &str| {
            u.rsplit('/').next().unwrap_or_default().to_string()
        }));
        let after = manager.cached_file_path_for_url(url);
        assert_ne!(before, after);
        assert_eq!(after, tmp.path().join("track.mp3"));
    }

    #[test]
    fn test_configuration_lookup_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(tmp.path());
        let url = "https://media.example.com/video.mp4";

        let first = manager.cache_configuration_for_url(url);
        let second = manager.cache_configuration_for_url(url);
        assert_eq!(first, second);
        assert!(first.ranges().is_empty());
        assert_eq!(first.content_length, None);
        // Not persisted until written
        assert!(!ResourceConfiguration::sidecar_path(tmp.path(), &first.resource_key).exists());
    }

    #[test]
    fn test_corrupt_sidecar_falls_back_to_empty() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(tmp.path());
        let url = "https://media.example.com/video.mp4";
        let key = manager.resource_key_for_url(url);
        fs::write(ResourceConfiguration::sidecar_path(tmp.path(), &key), b"not a sidecar").unwrap();

        let config = manager.cache_configuration_for_url(url);
        assert!(config.ranges().is_empty());
        assert_eq!(manager.metrics().sidecar_load_failures, 1);
    }

    #[test]
    fn test_clean_missing_url_is_noop() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(tmp.path());
        fs::write(tmp.path().join("unrelated"), b"keep").unwrap();
        manager.clean_cache_for_url("https://nothing.example.com/x").unwrap();
        assert!(tmp.path().join("unrelated").exists());
    }

    #[test]
    fn test_add_cache_file_missing_source() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp.path().join("cache"));
        let err = manager
            .add_cache_file(tmp.path().join("missing.mp4"), "https://x/y.mp4")
            .unwrap_err();
        assert!(matches!(err, CacheError::SourceNotFound(_)));
    }

    #[test]
    fn test_add_cache_file_move_mode() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp.path().join("cache"));
        manager.set_import_mode(ImportMode::Move);

        let source = tmp.path().join("song.mp3");
        fs::write(&source, vec![7u8; 64]).unwrap();
        let config = manager.add_cache_file(&source, "https://x/song.mp3").unwrap();

        assert!(!source.exists());
        assert_eq!(fs::read(&config.local_file_path).unwrap(), vec![7u8; 64]);
        assert!(config.is_complete());
    }

    #[test]
    fn test_lookups_do_not_grow_registry() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(tmp.path());
        for i in 0..50 {
            let url = format!("https://media.example.com/{}.mp4", i);
            manager.cache_configuration_for_url(&url);
            manager
                .read_cached(&url, ByteRange::new(0, 10).unwrap())
                .unwrap();
        }
        assert_eq!(manager.registered_resources(), 0);

        let session = manager.begin_download("https://media.example.com/live.mp4");
        session.write_at(0, b"live").unwrap();
        assert_eq!(manager.registered_resources(), 1);
        session.finish(Ok(())).unwrap();
        assert_eq!(manager.registered_resources(), 0);

        // State comes back from the sidecar
        let config = manager.cache_configuration_for_url("https://media.example.com/live.mp4");
        assert_eq!(config.cached_bytes(), 4);
    }
}
