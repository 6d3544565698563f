//! Media Range Cache
//!
//! A disk-backed cache for partially or fully downloaded remote media, for
//! clients that stream large audio/video files over HTTP Range requests and
//! want to reuse the bytes they already fetched across sessions.
//!
//! # Overview
//!
//! Every resource is stored as two files in the cache directory: a bytes
//! file holding the media at its natural offsets, and a `.cfg` sidecar that
//! records which byte ranges of it are actually present. The cache manager
//! resolves URLs to those files, merges ranges as download workers report
//! them, keeps the directory within a byte budget by deleting the oldest
//! resources first, and publishes progress notifications.
//!
//! # Features
//!
//! - **Range Bookkeeping**: sorted, merged half-open ranges per resource
//! - **Crash-Safe Sidecars**: checksummed, versioned, atomically replaced
//! - **Budget Enforcement**: oldest-first eviction that never touches a
//!   resource with an active download
//! - **Throttled Notifications**: per-resource rate-limited update events and
//!   an always-delivered finished event
//! - **Pluggable Naming**: hash-based file names by default, any
//!   [`NamingStrategy`] on request
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use media_range_cache::{ByteRange, CacheConfig, CacheManager};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CacheConfig::from_file("media_cache.yaml")?;
//! let manager = CacheManager::new(config)?;
//!
//! let url = "https://media.example.com/episode-42.mp3";
//! let session = manager.begin_download(url);
//! session.set_content_info(Some(4_000_000), Some("audio/mpeg".to_string()))?;
//! session.write_at(0, &[0u8; 65536])?;
//! session.finish(Ok(()))?;
//!
//! let head = manager.read_cached(url, ByteRange::new(0, 1024)?)?;
//! assert!(head.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`CacheManager`]: owns the directory, the registry of resources and
//!   the cache-wide eviction lock
//! - [`DownloadSession`]: write access for one download worker
//! - [`ResourceConfiguration`]: per-resource range set and its sidecar
//! - [`EvictionEngine`]: oldest-first deletion of bytes file + sidecar units
//! - [`NotifyThrottle`] and [`EventBus`]: notification rate limiting and
//!   delivery
//! - [`CacheMetrics`]: runtime counters
//!
//! # Configuration
//!
//! ```yaml
//! cache_dir: /var/cache/media
//! max_cache_size: 536870912   # 512MB
//! notify_interval_ms: 100
//! import_mode: copy           # or move
//! evict_on_write: true
//! event_buffer: 256
//! ```
//!
//! See [`CacheConfig`] for details.
//!
//! # Error Handling
//!
//! Every fallible operation returns [`CacheError`]:
//!
//! ```rust,no_run
//! use media_range_cache::{CacheConfig, CacheError, CacheManager};
//!
//! # fn main() {
//! let manager = CacheManager::new(CacheConfig::default()).unwrap();
//! match manager.add_cache_file("/tmp/song.mp3", "https://example.com/song.mp3") {
//!     Ok(config) => println!("Imported {} bytes", config.cached_bytes()),
//!     Err(CacheError::SourceNotFound(path)) => eprintln!("No such file: {}", path.display()),
//!     Err(CacheError::AlreadyCached(url)) => eprintln!("{} is already cached", url),
//!     Err(e) => eprintln!("Import failed: {}", e),
//! }
//! # }
//! ```

pub mod config;
pub mod configuration;
pub mod error;
pub mod events;
pub mod eviction;
pub mod manager;
pub mod metrics;
pub mod models;
pub mod naming;
pub mod session;
pub mod throttle;

// Re-export commonly used types
pub use config::{CacheConfig, ImportMode};
pub use configuration::{DownloadStats, ResourceConfiguration};
pub use error::{CacheError, Result};
pub use events::{CacheEvent, EventBus};
pub use eviction::{EvictionEngine, EvictionReport, EvictionUnit};
pub use manager::{CacheManager, CacheStats};
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use models::{ByteRange, RangeSet};
pub use naming::{FnNaming, HashNaming, NamingStrategy, SharedNaming};
pub use session::DownloadSession;
pub use throttle::NotifyThrottle;
