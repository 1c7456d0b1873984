//! 外部サービスとの境界
//!
//! メタデータ取得・オブジェクトストレージ・レコード登録は
//! ホスティング先のAPIに任せ、ここではインターフェースだけを定める。

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::link::StoreLink;
use crate::types::{AppRecord, Platform};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;

/// ストアリンクからアプリ情報を取得
pub trait MetadataResolver {
    async fn resolve(&self, link: &StoreLink) -> Result<AppRecord>;
}

/// 画像を保存して永続URLを返す
pub trait ObjectStore {
    async fn put(&self, path: &str, mime_type: &str, bytes: &[u8]) -> Result<String>;
}

/// 確定したスクリーンショットのレコード登録
///
/// 1回の呼び出しで全件を登録する（途中までの登録は残さない）。
pub trait RecordStore {
    async fn insert_screenshots(&self, records: &[ScreenshotRecord]) -> Result<()>;
}

/// 登録するレコード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotRecord {
    pub app_id: String,
    pub app_name: String,
    pub platform: Platform,
    pub screen_type: String,
    pub ui_elements: Vec<String>,
    pub image_url: String,
    pub file_name: String,
}

/// 取得結果をメモリにキャッシュするリゾルバ
pub struct CachedResolver<R> {
    inner: R,
    cache: RefCell<HashMap<String, AppRecord>>,
}

impl<R: MetadataResolver> CachedResolver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }
}

impl<R: MetadataResolver> MetadataResolver for CachedResolver<R> {
    async fn resolve(&self, link: &StoreLink) -> Result<AppRecord> {
        let key = format!("{:?}:{}", link.store, link.app_id);
        if let Some(hit) = self.cache.borrow().get(&key) {
            log::debug!("metadata cache hit: {}", key);
            return Ok(hit.clone());
        }

        let record = self.inner.resolve(link).await?;
        self.cache.borrow_mut().insert(key, record.clone());
        Ok(record)
    }
}
