//! CLIの1回の起動 = アップロード画面の1回の表示
//!
//! 起動時にマウントして保存内容を復元し、終了時に「ページ非表示」を
//! 通知して状態を書き出す。

use crate::config::Config;
use crate::error::{AppshotsError, Result};
use crate::local::{DiskCachedResolver, JsonlRecordStore, LocalObjectStore, LocalResolver};
use crate::session_file::FileSessionStore;
use appshots_common::{GateDecision, RedirectTarget, UploadFlow, Visibility};
use std::path::{Path, PathBuf};

const OBJECTS_DIR: &str = "objects";
const RECORDS_FILE: &str = "records.jsonl";

/// 現在時刻（UNIXミリ秒）
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

pub struct App {
    pub flow: UploadFlow<FileSessionStore>,
    config: Config,
    data_dir: PathBuf,
}

impl App {
    /// セッションを開いてマウント
    ///
    /// `route` がアップロード画面以外なら、マウント直後にそこへ移動したものとして扱う。
    pub fn open(config: Config, route: Option<&str>) -> Result<Self> {
        let data_dir = config.data_dir()?;
        Self::open_at(config, &data_dir, route)
    }

    pub fn open_at(config: Config, data_dir: &Path, route: Option<&str>) -> Result<Self> {
        let store = FileSessionStore::open(data_dir)?;
        let mut flow = UploadFlow::new(store, config.flow.clone());

        let upload_route = config.flow.upload_route.clone();
        let now = now_ms();
        if flow.mount(&upload_route, now) {
            log::info!("restored upload state at step {}", flow.state().step());
        }
        if let Some(route) = route.filter(|r| *r != upload_route) {
            flow.navigate(route, now);
        }

        Ok(Self {
            flow,
            config,
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// アクセス判定（リダイレクトはエラーとして返す）
    pub fn authorize(&mut self) -> Result<GateDecision> {
        let decision = self
            .flow
            .check_access(&self.config.identity(), &self.config.access_level());
        match decision {
            GateDecision::Redirect(RedirectTarget::SignIn) => Err(AppshotsError::SignInRequired),
            GateDecision::Redirect(RedirectTarget::Upgrade) => Err(AppshotsError::UpgradeRequired),
            other => Ok(other),
        }
    }

    pub fn resolver(&self) -> DiskCachedResolver<LocalResolver> {
        DiskCachedResolver::new(LocalResolver, &self.data_dir)
    }

    pub fn object_store(&self) -> LocalObjectStore {
        LocalObjectStore::new(self.data_dir.join(OBJECTS_DIR))
    }

    pub fn record_store(&self) -> JsonlRecordStore {
        JsonlRecordStore::new(self.data_dir.join(RECORDS_FILE))
    }

    /// 終了（非表示イベントで強制保存してからアンマウント）
    pub fn close(mut self) -> UploadFlow<FileSessionStore> {
        let action = self.flow.on_visibility(Visibility::Hidden, now_ms());
        log::debug!("closing: {:?}", action);
        self.flow.unmount();
        self.flow
    }
}
