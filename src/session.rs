//! Download sessions: the surface download workers write through
//!
//! A session pins one resource in the cache for its lifetime so eviction
//! never deletes bytes that are being written. Every write merges the
//! written range into the resource's configuration, persists the sidecar
//! and publishes a throttled update event. Ending the session, by
//! [`DownloadSession::finish`] or by dropping it, publishes the terminal
//! event, which is never throttled.

use crate::configuration::ResourceConfiguration;
use crate::error::{CacheError, Result};
use crate::manager::{CacheManager, InUseGuard, ResourceEntry};
use crate::models::ByteRange;
use parking_lot::MutexGuard;
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Write access to one cached resource
///
/// Created by [`CacheManager::begin_download`]. Dropping a session without
/// calling [`finish`](Self::finish) counts as a failed download: the
/// configuration is persisted and a `Finished` event carrying
/// `DownloadFailed` is published. The ranges written so far stay valid.
pub struct DownloadSession<'a> {
    manager: &'a CacheManager,
    entry: Arc<ResourceEntry>,
    finished: bool,
    _guard: InUseGuard<'a>,
}

impl<'a> DownloadSession<'a> {
    pub(crate) fn new(manager: &'a CacheManager, entry: Arc<ResourceEntry>, guard: InUseGuard<'a>) -> Self {
        DownloadSession {
            manager,
            entry,
            finished: false,
            _guard: guard,
        }
    }

    pub fn resource_key(&self) -> String {
        self.entry.config.lock().resource_key.clone()
    }

    /// Bytes file this session writes to
    pub fn file_path(&self) -> PathBuf {
        self.entry.config.lock().local_file_path.clone()
    }

    /// Snapshot of the resource's configuration
    pub fn configuration(&self) -> ResourceConfiguration {
        self.entry.config.lock().clone()
    }

    /// Record the content length and type reported by the origin
    ///
    /// If the length differs from the one previously cached, the remote
    /// file changed: cached ranges are discarded and the bytes file is
    /// truncated so stale data is never served.
    pub fn set_content_info(&self, content_length: Option<u64>, content_type: Option<String>) -> Result<()> {
        let mut config = self.entry.config.lock();
        let previous = config.content_length;
        config.set_content_info(content_length, content_type);

        if let (Some(old), Some(new)) = (previous, content_length) {
            if old != new {
                truncate_if_present(&config.local_file_path)?;
            }
        }
        config.save(&self.entry.dir)
    }

    /// Write `data` at `offset` of the bytes file and record the range
    ///
    /// The file write and the range merge happen under the resource's lock,
    /// so a concurrent [`set_content_info`](Self::set_content_info) cannot
    /// truncate the bytes between them.
    ///
    /// # Returns
    /// * `Ok(true)` if the write added bytes that were not cached before
    /// * `Err(CacheError::InvalidRange)` if the write ends past the known
    ///   content length; nothing is written
    /// * `Err(CacheError::IoError)` if the bytes file cannot be written
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<bool> {
        if data.is_empty() {
            return Ok(false);
        }
        let range = ByteRange::with_len(offset, data.len() as u64)?;

        // Eviction takes cache-wide locks, which come before this resource's
        self.manager.ensure_space(range.len())?;

        let config = self.entry.config.lock();
        if let Some(length) = config.content_length {
            if range.end > length {
                return Err(CacheError::InvalidRange(format!(
                    "{} exceeds content length {} of {}",
                    range, length, config.url
                )));
            }
        }

        let path = config.local_file_path.clone();
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| CacheError::io_at(&path, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| CacheError::io_at(&path, e))?;
        file.write_all(data).map_err(|e| CacheError::io_at(&path, e))?;

        self.merge_locked(config, range)
    }

    /// Record a range the worker wrote to [`file_path`](Self::file_path)
    /// itself
    pub fn record_range(&self, range: ByteRange) -> Result<bool> {
        let config = self.entry.config.lock();
        self.merge_locked(config, range)
    }

    fn merge_locked(&self, mut config: MutexGuard<'_, ResourceConfiguration>, range: ByteRange) -> Result<bool> {
        let merged = config.add_range(range)?;
        self.manager.metrics_handle().record_write(range.len(), merged);
        if !merged {
            return Ok(false);
        }
        config.save(&self.entry.dir)?;
        let snapshot = config.clone();
        drop(config);

        debug!(
            "Cached {} of {} ({} ranges, {} bytes)",
            range,
            snapshot.resource_key,
            snapshot.ranges().len(),
            snapshot.cached_bytes()
        );
        self.manager.publish_update(&snapshot);
        Ok(true)
    }

    /// Add network transfer statistics for this resource
    pub fn record_download(&self, bytes: u64, elapsed: Duration) {
        self.entry.config.lock().record_download(bytes, elapsed);
    }

    /// End the session, persisting the configuration and publishing the
    /// terminal event
    ///
    /// `result` is the worker's outcome; a failure is carried in the event.
    /// The event is published even if persisting fails.
    pub fn finish(mut self, result: Result<()>) -> Result<ResourceConfiguration> {
        self.complete(result)
    }

    fn complete(&mut self, result: Result<()>) -> Result<ResourceConfiguration> {
        self.finished = true;
        let (snapshot, saved) = {
            let config = self.entry.config.lock();
            let saved = config.save(&self.entry.dir);
            (config.clone(), saved)
        };

        let error = match (&result, &saved) {
            (Err(e), _) => Some(e.clone()),
            (Ok(()), Err(e)) => Some(e.clone()),
            (Ok(()), Ok(())) => None,
        };
        match &error {
            None => info!(
                "Download of {} finished: {} bytes cached, complete={}",
                snapshot.url,
                snapshot.cached_bytes(),
                snapshot.is_complete()
            ),
            Some(e) => warn!("Download of {} failed: {}", snapshot.url, e),
        }

        self.manager
            .publish_finished(&snapshot, &snapshot.local_file_path, error);
        saved.map(|()| snapshot)
    }
}

impl Drop for DownloadSession<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let dropped = Err(CacheError::DownloadFailed("session dropped".to_string()));
        if let Err(e) = self.complete(dropped) {
            warn!("Failed to persist abandoned session: {}", e);
        }
    }
}

fn truncate_if_present(path: &Path) -> Result<()> {
    match OpenOptions::new().write(true).open(path) {
        Ok(file) => file.set_len(0).map_err(|e| CacheError::io_at(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io_at(path, e)),
    }
}
