//! ストアリンクからのアプリ情報解決
//!
//! ネットワークには出ず、リンクのスラッグとIDからアプリ名を組み立てる。
//! 解決結果はデータディレクトリにキャッシュし、`link` と `confirm` の
//! 2回の起動で同じ結果を返す。

use appshots_common::backend::MetadataResolver;
use appshots_common::{AppRecord, Error as CommonError, Store, StoreLink};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

const CACHE_FILE_NAME: &str = ".metadata-cache.json";

lazy_static::lazy_static! {
    static ref APP_SLUG_RE: Regex = Regex::new(r"/app/([^/?#]+)/id\d+").unwrap();
}

/// リンクだけからアプリ情報を組み立てるリゾルバ
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalResolver;

impl LocalResolver {
    fn app_name(link: &StoreLink) -> String {
        let raw = match link.store {
            Store::AppStore => APP_SLUG_RE
                .captures(&link.url)
                .map(|caps| caps[1].to_string())
                .unwrap_or_else(|| link.app_id.clone()),
            Store::PlayStore => link
                .app_id
                .rsplit('.')
                .next()
                .unwrap_or(&link.app_id)
                .to_string(),
        };
        title_case(&raw)
    }

    fn publisher(link: &StoreLink) -> String {
        match link.store {
            Store::AppStore => String::new(),
            Store::PlayStore => link
                .app_id
                .split('.')
                .nth(1)
                .map(title_case)
                .unwrap_or_default(),
        }
    }
}

impl MetadataResolver for LocalResolver {
    async fn resolve(&self, link: &StoreLink) -> appshots_common::Result<AppRecord> {
        Ok(AppRecord {
            app_id: link.app_id.clone(),
            name: Self::app_name(link),
            publisher: Self::publisher(link),
            platform: link.store.platform(),
            icon_url: String::new(),
        })
    }
}

/// "my-cool_app" -> "My Cool App"
fn title_case(raw: &str) -> String {
    raw.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// キャッシュファイルの構造
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataCache {
    /// バージョン（互換性チェック用）
    version: u32,
    /// "ストア:アプリID" → アプリ情報
    entries: HashMap<String, AppRecord>,
}

impl MetadataCache {
    const CURRENT_VERSION: u32 = 1;

    pub fn cache_path(dir: &Path) -> PathBuf {
        dir.join(CACHE_FILE_NAME)
    }

    /// キャッシュファイルを読み込み（壊れていれば空）
    pub fn load(dir: &Path) -> Self {
        let cache_path = Self::cache_path(dir);
        let file = match File::open(&cache_path) {
            Ok(f) => f,
            Err(_) => return Self::default(),
        };

        match serde_json::from_reader::<_, MetadataCache>(BufReader::new(file)) {
            Ok(cache) if cache.version == Self::CURRENT_VERSION => cache,
            Ok(_) => {
                log::warn!("メタデータキャッシュのバージョン不一致、再生成します");
                Self::default()
            }
            Err(e) => {
                log::warn!("メタデータキャッシュを読めません: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, dir: &Path) -> crate::error::Result<()> {
        std::fs::create_dir_all(dir)?;
        let file = File::create(Self::cache_path(dir))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// キャッシュを削除（削除した場合は true）
    pub fn clear(dir: &Path) -> crate::error::Result<bool> {
        let cache_path = Self::cache_path(dir);
        if cache_path.exists() {
            std::fs::remove_file(cache_path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn key(link: &StoreLink) -> String {
        format!("{:?}:{}", link.store, link.app_id)
    }

    pub fn get(&self, link: &StoreLink) -> Option<&AppRecord> {
        self.entries.get(&Self::key(link))
    }

    pub fn insert(&mut self, link: &StoreLink, record: AppRecord) {
        self.entries.insert(Self::key(link), record);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// ファイルキャッシュつきリゾルバ
pub struct DiskCachedResolver<R> {
    inner: R,
    dir: PathBuf,
    cache: RefCell<MetadataCache>,
}

impl<R: MetadataResolver> DiskCachedResolver<R> {
    pub fn new(inner: R, dir: &Path) -> Self {
        Self {
            inner,
            dir: dir.to_path_buf(),
            cache: RefCell::new(MetadataCache::load(dir)),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.borrow().len()
    }
}

impl<R: MetadataResolver> MetadataResolver for DiskCachedResolver<R> {
    async fn resolve(&self, link: &StoreLink) -> appshots_common::Result<AppRecord> {
        if let Some(hit) = self.cache.borrow().get(link) {
            log::debug!("metadata cache hit: {}", MetadataCache::key(link));
            return Ok(hit.clone());
        }

        let record = self.inner.resolve(link).await?;
        let mut cache = self.cache.borrow_mut();
        cache.insert(link, record.clone());
        cache
            .save(&self.dir)
            .map_err(|e| CommonError::Metadata(format!("キャッシュ保存に失敗: {}", e)))?;
        Ok(record)
    }
}
