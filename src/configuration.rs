//! Per-resource cache configuration and its sidecar persistence
//!
//! Every cached resource owns a [`ResourceConfiguration`] describing which
//! byte ranges of the remote file are present in the local bytes file,
//! the total content length and type once known, and a few timestamps used
//! by eviction. The configuration is persisted next to the bytes file as
//! `<base>.cfg`.
//!
//! Sidecar layout: a bincode-encoded envelope holding a magic number, a
//! format version, a CRC32 of the body and the bincode-encoded body itself.
//! Saves are written to `<base>.cfg.tmp`, synced and renamed over the live
//! sidecar, so a crash mid-save leaves the previous version intact.

use crate::error::{CacheError, Result};
use crate::models::{ByteRange, RangeSet};
use crate::naming::{sidecar_name, sidecar_tmp_name};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Magic number identifying a sidecar file ("MRCF")
pub const SIDECAR_MAGIC: u32 = 0x4D52_4346;

/// Current sidecar format version
pub const SIDECAR_VERSION: u32 = 1;

/// Milliseconds since the Unix epoch
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Accumulated download throughput for one resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStats {
    /// Bytes fetched from the network across all sessions
    pub downloaded_bytes: u64,
    /// Wall-clock time spent fetching them, in milliseconds
    pub elapsed_ms: u64,
}

impl DownloadStats {
    pub fn record(&mut self, bytes: u64, elapsed: Duration) {
        self.downloaded_bytes = self.downloaded_bytes.saturating_add(bytes);
        self.elapsed_ms = self.elapsed_ms.saturating_add(elapsed.as_millis() as u64);
    }

    /// Average speed in bytes per second, if any time was recorded
    pub fn bytes_per_second(&self) -> Option<f64> {
        if self.elapsed_ms == 0 {
            return None;
        }
        Some(self.downloaded_bytes as f64 * 1000.0 / self.elapsed_ms as f64)
    }
}

/// Metadata describing what is cached for one remote resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfiguration {
    /// URL the resource was requested with
    pub url: String,
    /// Base name produced by the naming strategy
    pub resource_key: String,
    /// Total size of the remote resource, unknown until the first response
    pub content_length: Option<u64>,
    /// MIME type reported by the origin
    pub content_type: Option<String>,
    ranges: RangeSet,
    /// Creation time in Unix milliseconds
    pub created_at: u64,
    /// Last mutation time in Unix milliseconds
    pub last_modified_at: u64,
    #[serde(default)]
    pub download_stats: DownloadStats,
    /// Absolute path of the bytes file; derived, never persisted
    #[serde(skip)]
    pub local_file_path: PathBuf,
}

/// On-disk wrapper around an encoded configuration
#[derive(Serialize, Deserialize)]
struct SidecarEnvelope {
    magic: u32,
    version: u32,
    checksum: u32,
    body: Vec<u8>,
}

impl ResourceConfiguration {
    /// Create an empty configuration for a resource that has no sidecar yet
    pub fn new(url: impl Into<String>, resource_key: impl Into<String>, local_file_path: PathBuf) -> Self {
        let now = now_millis();
        Self {
            url: url.into(),
            resource_key: resource_key.into(),
            content_length: None,
            content_type: None,
            ranges: RangeSet::new(),
            created_at: now,
            last_modified_at: now,
            download_stats: DownloadStats::default(),
            local_file_path,
        }
    }

    /// Cached byte ranges, sorted and merged
    pub fn ranges(&self) -> &RangeSet {
        &self.ranges
    }

    /// Total number of cached bytes
    pub fn cached_bytes(&self) -> u64 {
        self.ranges.covered_bytes()
    }

    /// Merge a newly written range
    ///
    /// # Returns
    /// * `Ok(true)` if the range added bytes that were not cached before
    /// * `Ok(false)` if it was already covered
    /// * `Err(CacheError::InvalidRange)` if it ends past the known length
    pub fn add_range(&mut self, range: ByteRange) -> Result<bool> {
        if let Some(length) = self.content_length {
            if range.end > length {
                return Err(CacheError::InvalidRange(format!(
                    "{} exceeds content length {} of {}",
                    range, length, self.url
                )));
            }
        }

        let changed = self.ranges.insert(range);
        if changed {
            self.touch();
        }
        Ok(changed)
    }

    /// Record content length and type as reported by the origin
    ///
    /// A length that differs from a previously known one means the remote
    /// file changed, so all cached ranges are discarded.
    pub fn set_content_info(&mut self, content_length: Option<u64>, content_type: Option<String>) {
        if let Some(length) = content_length {
            match self.content_length {
                Some(known) if known != length => {
                    warn!(
                        "Content length of {} changed from {} to {}, discarding {} cached ranges",
                        self.url,
                        known,
                        length,
                        self.ranges.len()
                    );
                    self.ranges.clear();
                }
                _ => self.ranges.clip_to(length),
            }
            self.content_length = Some(length);
        }
        if content_type.is_some() {
            self.content_type = content_type;
        }
        self.touch();
    }

    /// Add bytes fetched over the network and the time spent on them
    pub fn record_download(&mut self, bytes: u64, elapsed: Duration) {
        self.download_stats.record(bytes, elapsed);
    }

    /// True once every byte of a known-length resource is cached
    pub fn is_complete(&self) -> bool {
        self.content_length
            .map(|length| self.ranges.is_complete(length))
            .unwrap_or(false)
    }

    /// Fraction of the resource that is cached, if the length is known
    pub fn progress(&self) -> Option<f64> {
        match self.content_length {
            Some(0) => Some(1.0),
            Some(length) => Some(self.cached_bytes() as f64 / length as f64),
            None => None,
        }
    }

    /// Gaps inside `range` that still have to be fetched
    pub fn missing_within(&self, range: &ByteRange) -> Vec<ByteRange> {
        self.ranges.missing_within(range)
    }

    /// Forget cached ranges that lie beyond the bytes actually on disk
    ///
    /// Returns `true` if anything was dropped.
    pub(crate) fn clip_to_file_len(&mut self, file_len: u64) -> bool {
        let before = self.ranges.covered_bytes();
        self.ranges.clip_to(file_len);
        before != self.ranges.covered_bytes()
    }

    /// Drop all cached ranges, keeping content length and type
    pub(crate) fn reset_ranges(&mut self) {
        self.ranges.clear();
        self.touch();
    }

    fn touch(&mut self) {
        // Never move backwards, even if the wall clock does
        self.last_modified_at = now_millis().max(self.last_modified_at);
    }

    /// Sidecar path for a base name inside `dir`
    pub fn sidecar_path(dir: &Path, resource_key: &str) -> PathBuf {
        dir.join(sidecar_name(resource_key))
    }

    /// Encode into the sidecar wire format
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)?;
        let envelope = SidecarEnvelope {
            magic: SIDECAR_MAGIC,
            version: SIDECAR_VERSION,
            checksum: crc32fast::hash(&body),
            body,
        };
        Ok(bincode::serialize(&envelope)?)
    }

    /// Decode from the sidecar wire format, verifying magic, version and checksum
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let envelope: SidecarEnvelope = bincode::deserialize(data)?;

        if envelope.magic != SIDECAR_MAGIC {
            return Err(CacheError::SerializationError(format!(
                "bad sidecar magic {:#x}",
                envelope.magic
            )));
        }
        if envelope.version != SIDECAR_VERSION {
            return Err(CacheError::SerializationError(format!(
                "unsupported sidecar version {}",
                envelope.version
            )));
        }
        let checksum = crc32fast::hash(&envelope.body);
        if checksum != envelope.checksum {
            return Err(CacheError::SerializationError(format!(
                "sidecar checksum mismatch: expected {:#x}, got {:#x}",
                envelope.checksum, checksum
            )));
        }

        let config: ResourceConfiguration = bincode::deserialize(&envelope.body)?;
        if !config.ranges.is_normalized() {
            return Err(CacheError::SerializationError(
                "sidecar holds overlapping or unsorted ranges".to_string(),
            ));
        }
        if let Some(length) = config.content_length {
            if config.ranges.iter().any(|r| r.end > length) {
                return Err(CacheError::SerializationError(
                    "sidecar holds ranges past the content length".to_string(),
                ));
            }
        }
        Ok(config)
    }

    /// Rewrite the sidecar in `dir` with the current state
    pub fn save(&self, dir: &Path) -> Result<()> {
        let data = self.to_bytes()?;
        let final_path = Self::sidecar_path(dir, &self.resource_key);
        let tmp_path = dir.join(sidecar_tmp_name(&self.resource_key));

        let mut file = fs::File::create(&tmp_path).map_err(|e| CacheError::io_at(&tmp_path, e))?;
        file.write_all(&data).map_err(|e| CacheError::io_at(&tmp_path, e))?;
        file.sync_all().map_err(|e| CacheError::io_at(&tmp_path, e))?;
        drop(file);

        fs::rename(&tmp_path, &final_path).map_err(|e| CacheError::io_at(&final_path, e))?;

        debug!(
            "Saved sidecar for {} ({} ranges, {} bytes cached)",
            self.resource_key,
            self.ranges.len(),
            self.cached_bytes()
        );
        Ok(())
    }

    /// Load the sidecar for `resource_key` from `dir`
    ///
    /// # Returns
    /// * `Ok(Some(config))` if a valid sidecar exists
    /// * `Ok(None)` if there is no sidecar
    /// * `Err(CacheError::SerializationError)` if the sidecar is corrupt
    /// * `Err(CacheError::IoError)` if it exists but cannot be read
    pub fn load(dir: &Path, resource_key: &str) -> Result<Option<Self>> {
        let path = Self::sidecar_path(dir, resource_key);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io_at(&path, e)),
        };

        let mut config = Self::from_bytes(&data)?;
        if config.resource_key != resource_key {
            return Err(CacheError::SerializationError(format!(
                "sidecar {} belongs to {}",
                path.display(),
                config.resource_key
            )));
        }
        config.local_file_path = dir.join(resource_key);
        Ok(Some(config))
    }
}
