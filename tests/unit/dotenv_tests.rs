use std::fs::File;
use std::time::{Duration, SystemTime};

use codex_subagent::environment::dotenv::DotenvLoader;

fn bump_mtime(path: &std::path::Path, by: Duration) {
    let file = File::options().write(true).open(path).expect("open");
    file.set_modified(SystemTime::now() + by).expect("set mtime");
}

#[test]
fn missing_file_yields_empty_mapping() {
    let dir = tempfile::tempdir().expect("tempdir");
    let loader = DotenvLoader::new();
    assert!(loader.load(&dir.path().join(".env")).is_empty());
    assert_eq!(loader.cached_files(), 0);
}

#[test]
fn cache_serves_until_mtime_changes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(".env");
    std::fs::write(&path, "TOKEN=first\n").expect("write");
    bump_mtime(&path, Duration::from_secs(10));

    let loader = DotenvLoader::new();
    assert_eq!(loader.load(&path).get("TOKEN").map(String::as_str), Some("first"));
    assert_eq!(loader.cached_files(), 1);

    // Rewrite the content but pin the old mtime: the cached value wins.
    let stamp = std::fs::metadata(&path).and_then(|m| m.modified()).expect("mtime");
    std::fs::write(&path, "TOKEN=second\n").expect("rewrite");
    File::options()
        .write(true)
        .open(&path)
        .expect("open")
        .set_modified(stamp)
        .expect("restore mtime");
    assert_eq!(loader.load(&path).get("TOKEN").map(String::as_str), Some("first"));

    bump_mtime(&path, Duration::from_secs(20));
    assert_eq!(loader.load(&path).get("TOKEN").map(String::as_str), Some("second"));
}

#[test]
fn deleted_file_evicts_cache_entry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(".env");
    std::fs::write(&path, "A=1\n").expect("write");

    let loader = DotenvLoader::new();
    assert_eq!(loader.load(&path).len(), 1);
    std::fs::remove_file(&path).expect("remove");
    assert!(loader.load(&path).is_empty());
    assert_eq!(loader.cached_files(), 0);
}
