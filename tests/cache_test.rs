//! メタデータキャッシュの統合テスト

use appshots::local::{DiskCachedResolver, LocalResolver, MetadataCache};
use appshots_common::{parse_store_link, MetadataResolver};
use futures::executor::block_on;
use tempfile::tempdir;

/// キャッシュファイルがなければ空
#[test]
fn test_load_missing_cache() {
    let dir = tempdir().unwrap();
    let cache = MetadataCache::load(dir.path());
    assert!(cache.is_empty());
}

/// バージョン違いのキャッシュは捨てる
#[test]
fn test_version_mismatch_discarded() {
    let dir = tempdir().unwrap();
    std::fs::write(
        MetadataCache::cache_path(dir.path()),
        r#"{"version":0,"entries":{"AppStore:1":{"appId":"1","name":"Old"}}}"#,
    )
    .unwrap();
    assert!(MetadataCache::load(dir.path()).is_empty());
}

/// 壊れたキャッシュは空として扱う
#[test]
fn test_corrupt_cache_is_empty() {
    let dir = tempdir().unwrap();
    std::fs::write(MetadataCache::cache_path(dir.path()), "{broken").unwrap();
    assert!(MetadataCache::load(dir.path()).is_empty());
}

/// 手で直したキャッシュの内容が優先される
#[test]
fn test_cached_entry_wins() {
    let dir = tempdir().unwrap();
    let link = parse_store_link("https://apps.apple.com/us/app/focus-timer/id42").unwrap();

    let resolver = DiskCachedResolver::new(LocalResolver, dir.path());
    let first = block_on(resolver.resolve(&link)).unwrap();
    assert_eq!(first.name, "Focus Timer");

    let mut cache = MetadataCache::load(dir.path());
    let mut edited = first.clone();
    edited.name = "Focus Timer Pro".into();
    cache.insert(&link, edited);
    cache.save(dir.path()).unwrap();

    let reopened = DiskCachedResolver::new(LocalResolver, dir.path());
    assert_eq!(block_on(reopened.resolve(&link)).unwrap().name, "Focus Timer Pro");
}

/// キャッシュ削除
#[test]
fn test_clear_cache() {
    let dir = tempdir().unwrap();
    MetadataCache::default().save(dir.path()).unwrap();
    assert!(MetadataCache::clear(dir.path()).unwrap());
    assert!(!MetadataCache::clear(dir.path()).unwrap());
}
