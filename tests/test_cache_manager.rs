//! Integration tests for the cache manager: lookup, import, cleaning and
//! persistence across manager instances

use media_range_cache::{
    ByteRange, CacheConfig, CacheError, CacheManager, ImportMode, ResourceConfiguration,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const URL: &str = "https://media.example.com/show/episode-1.mp3";

fn manager_at(dir: &Path) -> CacheManager {
    CacheManager::new(CacheConfig::new(dir)).unwrap()
}

fn write_source(dir: &Path, name: &str, len: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, (0..len).map(|i| i as u8).collect::<Vec<u8>>()).unwrap();
    path
}

#[test]
fn test_add_cache_file_produces_complete_configuration() {
    let tmp = TempDir::new().unwrap();
    let manager = manager_at(&tmp.path().join("cache"));
    let source = write_source(tmp.path(), "episode.mp3", 100);

    let config = manager.add_cache_file(&source, URL).unwrap();
    assert_eq!(config.content_length, Some(100));
    assert_eq!(config.ranges().as_slice(), &[ByteRange::new(0, 100).unwrap()]);
    assert!(config.is_complete());
    // Copy mode leaves the source alone
    assert!(source.exists());

    let looked_up = manager.cache_configuration_for_url(URL);
    assert_eq!(looked_up.ranges(), config.ranges());
    assert_eq!(looked_up.content_length, Some(100));

    let bytes = manager
        .read_cached(URL, ByteRange::new(10, 20).unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(&bytes[..], &(10u8..20).collect::<Vec<u8>>()[..]);
}

#[test]
fn test_add_cache_file_twice_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let manager = manager_at(&tmp.path().join("cache"));
    let source = write_source(tmp.path(), "episode.mp3", 100);

    manager.add_cache_file(&source, URL).unwrap();
    let err = manager.add_cache_file(&source, URL).unwrap_err();
    assert_eq!(err, CacheError::AlreadyCached(URL.to_string()));
}

#[test]
fn test_add_cache_file_replaces_partial_entry() {
    let tmp = TempDir::new().unwrap();
    let manager = manager_at(&tmp.path().join("cache"));

    let session = manager.begin_download(URL);
    session.set_content_info(Some(100), None).unwrap();
    session.write_at(0, &[0xffu8; 30]).unwrap();
    session.finish(Ok(())).unwrap();

    let source = write_source(tmp.path(), "episode.mp3", 100);
    let config = manager.add_cache_file(&source, URL).unwrap();
    assert!(config.is_complete());
    assert_eq!(fs::read(&config.local_file_path).unwrap(), fs::read(&source).unwrap());
}

#[test]
fn test_add_cache_file_while_downloading_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let manager = manager_at(&tmp.path().join("cache"));
    let source = write_source(tmp.path(), "episode.mp3", 10);

    let _session = manager.begin_download(URL);
    let err = manager.add_cache_file(&source, URL).unwrap_err();
    assert!(matches!(err, CacheError::ResourceInUse(_)));
}

#[test]
fn test_import_move_mode_from_config() {
    let tmp = TempDir::new().unwrap();
    let config = CacheConfig::new(tmp.path().join("cache")).with_import_mode(ImportMode::Move);
    let manager = CacheManager::new(config).unwrap();
    let source = write_source(tmp.path(), "episode.mp3", 10);

    manager.add_cache_file(&source, URL).unwrap();
    assert!(!source.exists());
    assert!(manager.cached_file_path_for_url(URL).exists());
}

#[test]
fn test_calculated_size_matches_bytes_files() {
    let tmp = TempDir::new().unwrap();
    let cache = tmp.path().join("cache");
    let manager = manager_at(&cache);

    for (i, len) in [10usize, 250, 4096].iter().enumerate() {
        let source = write_source(tmp.path(), &format!("src-{}", i), *len);
        manager
            .add_cache_file(&source, &format!("https://media.example.com/{}.mp4", i))
            .unwrap();
    }

    let on_disk: u64 = fs::read_dir(&cache)
        .unwrap()
        .map(|e| e.unwrap())
        .filter(|e| !e.file_name().to_string_lossy().contains(".cfg"))
        .map(|e| e.metadata().unwrap().len())
        .sum();
    assert_eq!(manager.calculate_cached_size().unwrap(), on_disk);
    assert_eq!(on_disk, 10 + 250 + 4096);

    let stats = manager.stats().unwrap();
    assert_eq!(stats.units, 3);
    assert_eq!(stats.media_bytes, on_disk);
    assert!(stats.sidecar_bytes > 0);
}

#[test]
fn test_clean_all_cache_empties_directory() {
    let tmp = TempDir::new().unwrap();
    let cache = tmp.path().join("cache");
    let manager = manager_at(&cache);

    for i in 0..4 {
        let source = write_source(tmp.path(), &format!("src-{}", i), 64);
        manager
            .add_cache_file(&source, &format!("https://media.example.com/{}.mp4", i))
            .unwrap();
    }

    let report = manager.clean_all_cache().unwrap();
    assert_eq!(report.freed_bytes, 4 * 64);
    assert!(report.first_error.is_none());
    assert_eq!(manager.calculate_cached_size().unwrap(), 0);
    assert_eq!(fs::read_dir(&cache).unwrap().count(), 0);
}

#[test]
fn test_clean_all_cache_reports_in_use() {
    let tmp = TempDir::new().unwrap();
    let manager = manager_at(tmp.path());

    let session = manager.begin_download(URL);
    session.write_at(0, b"partial").unwrap();

    let report = manager.clean_all_cache().unwrap();
    assert_eq!(report.first_error, Some(CacheError::ResourceInUse(session.resource_key())));
    assert!(session.file_path().exists());

    session.finish(Ok(())).unwrap();
    manager.clean_all_cache().unwrap();
    assert_eq!(manager.calculate_cached_size().unwrap(), 0);
}

#[test]
fn test_clean_cache_for_url() {
    let tmp = TempDir::new().unwrap();
    let manager = manager_at(&tmp.path().join("cache"));
    let source = write_source(tmp.path(), "episode.mp3", 100);
    let other = write_source(tmp.path(), "other.mp3", 50);

    manager.add_cache_file(&source, URL).unwrap();
    manager.add_cache_file(&other, "https://media.example.com/other.mp3").unwrap();

    manager.clean_cache_for_url(URL).unwrap();
    let path = manager.cached_file_path_for_url(URL);
    assert!(!path.exists());
    assert!(!path.with_file_name(format!("{}.cfg", path.file_name().unwrap().to_string_lossy())).exists());
    assert!(manager.cache_configuration_for_url(URL).ranges().is_empty());
    assert_eq!(manager.calculate_cached_size().unwrap(), 50);

    // Second clean is a no-op
    manager.clean_cache_for_url(URL).unwrap();
    assert_eq!(manager.calculate_cached_size().unwrap(), 50);
}

#[test]
fn test_clean_cache_for_url_in_use() {
    let tmp = TempDir::new().unwrap();
    let manager = manager_at(tmp.path());
    let _session = manager.begin_download(URL);
    assert!(matches!(
        manager.clean_cache_for_url(URL),
        Err(CacheError::ResourceInUse(_))
    ));
}

#[test]
fn test_ranges_survive_restart() {
    let tmp = TempDir::new().unwrap();
    {
        let manager = manager_at(tmp.path());
        let session = manager.begin_download(URL);
        session.set_content_info(Some(1000), Some("audio/mpeg".to_string())).unwrap();
        session.write_at(0, &[1u8; 100]).unwrap();
        session.write_at(500, &[2u8; 100]).unwrap();
        session.finish(Ok(())).unwrap();
    }

    let manager = manager_at(tmp.path());
    let config = manager.cache_configuration_for_url(URL);
    assert_eq!(
        config.ranges().as_slice(),
        &[ByteRange::new(0, 100).unwrap(), ByteRange::new(500, 600).unwrap()]
    );
    assert_eq!(config.content_length, Some(1000));
    assert_eq!(config.content_type.as_deref(), Some("audio/mpeg"));
    assert_eq!(
        config.missing_within(&ByteRange::new(50, 550).unwrap()),
        vec![ByteRange::new(100, 500).unwrap()]
    );
    assert!(manager.read_cached(URL, ByteRange::new(90, 110).unwrap()).unwrap().is_none());
}

#[test]
fn test_sidecar_clipped_to_bytes_on_disk() {
    let tmp = TempDir::new().unwrap();
    {
        let manager = manager_at(tmp.path());
        let session = manager.begin_download(URL);
        session.write_at(0, &[1u8; 100]).unwrap();
        session.finish(Ok(())).unwrap();
    }

    // Bytes file lost its tail, e.g. after a crash
    let manager = manager_at(tmp.path());
    let path = manager.cached_file_path_for_url(URL);
    fs::OpenOptions::new().write(true).open(&path).unwrap().set_len(40).unwrap();

    let config = manager.cache_configuration_for_url(URL);
    assert_eq!(config.ranges().as_slice(), &[ByteRange::new(0, 40).unwrap()]);

    fs::remove_file(&path).unwrap();
    let manager = manager_at(tmp.path());
    assert!(manager.cache_configuration_for_url(URL).ranges().is_empty());
}

#[test]
fn test_directory_change_does_not_migrate() {
    let tmp = TempDir::new().unwrap();
    let manager = manager_at(&tmp.path().join("a"));
    let source = write_source(tmp.path(), "episode.mp3", 100);
    manager.add_cache_file(&source, URL).unwrap();

    manager.set_cache_directory(tmp.path().join("b")).unwrap();
    assert!(tmp.path().join("b").is_dir());
    assert_eq!(manager.cached_file_path_for_url(URL).parent().unwrap(), tmp.path().join("b"));
    assert!(!manager.cache_configuration_for_url(URL).is_complete());
    assert_eq!(manager.calculate_cached_size().unwrap(), 0);

    manager.set_cache_directory(tmp.path().join("a")).unwrap();
    assert!(manager.cache_configuration_for_url(URL).is_complete());
}

#[test]
fn test_resource_configuration_sidecar_location() {
    let tmp = TempDir::new().unwrap();
    let manager = manager_at(tmp.path());
    let session = manager.begin_download(URL);
    session.write_at(0, b"x").unwrap();

    let key = manager.resource_key_for_url(URL);
    assert!(ResourceConfiguration::sidecar_path(tmp.path(), &key).exists());
    assert!(tmp.path().join(&key).exists());
}
