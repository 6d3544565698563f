//! Media Cache maintenance tool
//!
//! Inspects and maintains a media range cache directory from the command
//! line. Results are printed as JSON on stdout; logs go to stderr.

use anyhow::{bail, Context, Result};
use media_range_cache::{CacheConfig, CacheManager, EvictionReport};
use serde_json::json;
use std::env;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
Usage: media-cache <config.yaml> <command> [args]

Commands:
  size                  Total bytes held by cached media
  stats                 Disk usage and runtime counters
  clean <bytes>         Evict the oldest resources until <bytes> are freed
  clean-all             Evict every resource without an active download
  clean-url <url>       Delete the cached copy of <url>
  import <path> <url>   Seed the cache with a complete local file
  inspect <url>         Show what is cached for <url>";

/// Main entry point for the media cache tool
///
/// # Usage
/// ```bash
/// media-cache media_cache.yaml stats
/// media-cache media_cache.yaml clean 104857600
/// RUST_LOG=debug media-cache media_cache.yaml import ./song.mp3 https://example.com/song.mp3
/// ```
fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if let Err(e) = run(&args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {
    let Some((config_path, rest)) = args.split_first() else {
        bail!("missing config path\n\n{}", USAGE);
    };
    let Some((command, params)) = rest.split_first() else {
        bail!("missing command\n\n{}", USAGE);
    };

    info!("Loading configuration from: {}", config_path);
    let config = CacheConfig::from_file(config_path)
        .with_context(|| format!("loading {}", config_path))?;
    info!("  - Cache directory: {}", config.cache_dir.display());
    info!("  - Max cache size: {} MB", config.max_cache_size / 1024 / 1024);

    let manager = CacheManager::new(config)?;

    let output = match (command.as_str(), params) {
        ("size", []) => json!({ "cached_bytes": manager.calculate_cached_size()? }),
        ("stats", []) => json!({
            "disk": manager.stats()?,
            "metrics": manager.metrics(),
        }),
        ("clean", [bytes]) => {
            let bytes: u64 = bytes
                .parse()
                .with_context(|| format!("invalid byte count {:?}", bytes))?;
            report_json(&manager.clean_cache_with_size(bytes)?)
        }
        ("clean-all", []) => report_json(&manager.clean_all_cache()?),
        ("clean-url", [url]) => {
            manager.clean_cache_for_url(url)?;
            json!({ "cleaned": url })
        }
        ("import", [path, url]) => {
            let config = manager.add_cache_file(path, url)?;
            json!({
                "url": config.url,
                "path": config.local_file_path,
                "content_length": config.content_length,
            })
        }
        ("inspect", [url]) => {
            let config = manager.cache_configuration_for_url(url);
            let ranges: Vec<String> = config.ranges().iter().map(|r| r.to_string()).collect();
            json!({
                "url": config.url,
                "resource_key": config.resource_key,
                "path": config.local_file_path,
                "content_length": config.content_length,
                "content_type": config.content_type,
                "ranges": ranges,
                "cached_bytes": config.cached_bytes(),
                "progress": config.progress(),
                "complete": config.is_complete(),
                "download_speed": config.download_stats.bytes_per_second(),
            })
        }
        _ => bail!("unknown command or wrong arguments: {}\n\n{}", command, USAGE),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn report_json(report: &EvictionReport) -> serde_json::Value {
    json!({
        "requested": report.requested,
        "freed_bytes": report.freed_bytes,
        "freed_sidecar_bytes": report.freed_sidecar_bytes,
        "evicted": report.evicted,
        "skipped_in_use": report.skipped_in_use,
        "error_count": report.error_count,
        "first_error": report.first_error.as_ref().map(|e| e.to_string()),
        "duration_ms": report.duration.as_millis() as u64,
    })
}
