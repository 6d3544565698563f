//! Oldest-first eviction of cached resources
//!
//! The cache directory holds, per resource, a bytes file `<base>` and a
//! sidecar `<base>.cfg` (plus, transiently, `<base>.cfg.tmp`). Together they
//! form an eviction unit and are always deleted together. Units are ordered
//! by the creation time of the bytes file, ties broken by base name, and
//! deleted oldest first until the requested number of bytes is reclaimed.

use crate::error::{CacheError, Result};
use crate::naming::{classify, sidecar_name, sidecar_tmp_name};
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

/// A bytes file and its sidecar artifacts, deleted as one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionUnit {
    pub resource_key: String,
    /// Creation time of the bytes file (or the sidecar for orphans)
    pub created: SystemTime,
    /// Size of the bytes file, 0 if it is missing
    pub media_bytes: u64,
    /// Combined size of the sidecar artifacts
    pub sidecar_bytes: u64,
    has_media: bool,
}

/// Outcome of an eviction run
#[derive(Debug, Clone, Default)]
pub struct EvictionReport {
    /// Bytes the caller asked to reclaim
    pub requested: u64,
    /// Media bytes actually reclaimed
    pub freed_bytes: u64,
    /// Sidecar bytes reclaimed alongside
    pub freed_sidecar_bytes: u64,
    /// Resource keys whose units were deleted, in deletion order
    pub evicted: Vec<String>,
    /// Units passed over because a download was writing to them
    pub skipped_in_use: Vec<String>,
    /// First failure encountered; the run continued past it
    pub first_error: Option<CacheError>,
    /// Number of failures encountered
    pub error_count: u64,
    pub duration: Duration,
}

impl EvictionReport {
    pub(crate) fn record_error(&mut self, err: CacheError) {
        self.error_count += 1;
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }

    /// True when enough bytes were reclaimed and nothing failed
    pub fn is_satisfied(&self) -> bool {
        self.freed_bytes >= self.requested && self.first_error.is_none()
    }
}

/// Eviction engine; a single instance serializes all runs over one cache
#[derive(Debug, Default)]
pub struct EvictionEngine {
    lock: Mutex<()>,
}

impl EvictionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the cache-wide eviction lock
    ///
    /// While the guard lives no eviction run can start, which lets callers
    /// mark a unit as in use without racing a run that already scanned it.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }

    /// Enumerate the eviction units in `dir`, oldest first
    ///
    /// A missing directory holds no units. Subdirectories and names that
    /// are not valid UTF-8 are ignored.
    pub fn scan(dir: &Path) -> Result<Vec<EvictionUnit>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io_at(dir, e)),
        };

        let mut units: BTreeMap<String, EvictionUnit> = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io_at(dir, e))?;
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                // Removed between listing and stat
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(CacheError::io_at(&entry.path(), e)),
            };
            if !metadata.is_file() {
                continue;
            }

            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                warn!("Skipping non UTF-8 cache entry {:?}", entry.path());
                continue;
            };

            let (base, is_sidecar) = classify(file_name);
            let created = metadata
                .created()
                .or_else(|_| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            let unit = units.entry(base.to_string()).or_insert_with(|| EvictionUnit {
                resource_key: base.to_string(),
                created,
                media_bytes: 0,
                sidecar_bytes: 0,
                has_media: false,
            });

            if is_sidecar {
                unit.sidecar_bytes += metadata.len();
                if !unit.has_media {
                    unit.created = unit.created.min(created);
                }
            } else {
                unit.media_bytes = metadata.len();
                unit.created = created;
                unit.has_media = true;
            }
        }

        let mut units: Vec<EvictionUnit> = units.into_values().collect();
        // BTreeMap already yields names in order; a stable sort keeps it for ties
        units.sort_by_key(|unit| unit.created);
        Ok(units)
    }

    /// Sum of the bytes files in `dir`, sidecars excluded
    pub fn media_bytes(dir: &Path) -> Result<u64> {
        Ok(Self::scan(dir)?.iter().map(|u| u.media_bytes).sum())
    }

    /// Delete units oldest first until `requested` media bytes are reclaimed
    ///
    /// Units for which `in_use` returns true are skipped. A unit that fails
    /// to delete is recorded in the report and the run moves on.
    ///
    /// # Returns
    /// * `Ok(EvictionReport)` once the run ends, even with per-unit failures
    /// * `Err(CacheError)` only if the directory cannot be enumerated
    pub fn evict<F>(&self, dir: &Path, requested: u64, in_use: F) -> Result<EvictionReport>
    where
        F: Fn(&str) -> bool,
    {
        let _guard = self.lock.lock();
        self.evict_locked(dir, requested, in_use)
    }

    /// [`evict`](Self::evict) for a caller that already holds [`lock`](Self::lock)
    pub fn evict_locked<F>(&self, dir: &Path, requested: u64, in_use: F) -> Result<EvictionReport>
    where
        F: Fn(&str) -> bool,
    {
        let start = Instant::now();
        let mut report = EvictionReport {
            requested,
            ..Default::default()
        };

        if requested == 0 {
            return Ok(report);
        }

        let units = Self::scan(dir)?;
        info!(
            "Starting eviction in {}: requested={} bytes, units={}",
            dir.display(),
            requested,
            units.len()
        );

        for unit in units {
            if report.freed_bytes >= requested {
                break;
            }
            if in_use(&unit.resource_key) {
                debug!("Skipping in-use unit {}", unit.resource_key);
                report.skipped_in_use.push(unit.resource_key);
                continue;
            }

            match remove_unit(dir, &unit) {
                Ok(()) => {
                    debug!(
                        "Evicted {} ({} media bytes, {} sidecar bytes)",
                        unit.resource_key, unit.media_bytes, unit.sidecar_bytes
                    );
                    report.freed_bytes += unit.media_bytes;
                    report.freed_sidecar_bytes += unit.sidecar_bytes;
                    report.evicted.push(unit.resource_key);
                }
                Err(UnitRemovalError::MediaKept(err)) => {
                    warn!("Failed to evict {}: {}", unit.resource_key, err);
                    report.record_error(err);
                }
                Err(UnitRemovalError::SidecarKept(err)) => {
                    // Bytes are gone, so the space counts as reclaimed
                    warn!("Evicted {} but its sidecar remains: {}", unit.resource_key, err);
                    report.freed_bytes += unit.media_bytes;
                    report.evicted.push(unit.resource_key);
                    report.record_error(err);
                }
            }
        }

        report.duration = start.elapsed();
        info!(
            "Eviction finished: freed {} of {} requested bytes, {} units removed, {} skipped, {} errors in {:?}",
            report.freed_bytes,
            requested,
            report.evicted.len(),
            report.skipped_in_use.len(),
            report.error_count,
            report.duration
        );
        Ok(report)
    }
}

enum UnitRemovalError {
    MediaKept(CacheError),
    SidecarKept(CacheError),
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io_at(path, e)),
    }
}

fn unit_paths(dir: &Path, resource_key: &str) -> [PathBuf; 3] {
    [
        dir.join(resource_key),
        dir.join(sidecar_name(resource_key)),
        dir.join(sidecar_tmp_name(resource_key)),
    ]
}

fn remove_unit(dir: &Path, unit: &EvictionUnit) -> std::result::Result<(), UnitRemovalError> {
    let [media, sidecar, tmp] = unit_paths(dir, &unit.resource_key);

    // Bytes first: a leftover sidecar without bytes is harmless, the reverse
    // would describe bytes nobody can account for
    remove_if_present(&media).map_err(UnitRemovalError::MediaKept)?;

    let mut first = None;
    for path in [sidecar, tmp] {
        if let Err(err) = remove_if_present(&path) {
            first.get_or_insert(err);
        }
    }
    match first {
        Some(err) => Err(UnitRemovalError::SidecarKept(err)),
        None => Ok(()),
    }
}

/// Delete every artifact of one resource, ignoring the ones already gone
pub fn remove_resource_files(dir: &Path, resource_key: &str) -> Result<()> {
    let [media, sidecar, tmp] = unit_paths(dir, resource_key);
    remove_if_present(&media)?;
    remove_if_present(&sidecar)?;
    remove_if_present(&tmp)
}
