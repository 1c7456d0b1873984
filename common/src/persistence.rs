//! ウィザード状態のスナップショット保存・復元
//!
//! - ステップ1の状態は保存しない
//! - 画像本体は保存せず、プレビューのData URLから復元する
//! - 前回の書き込みから `throttle_ms` 未満の書き込みは捨てる
//! - 読み書きの失敗はログに出して握りつぶす（呼び出し側には伝えない）

use crate::codec::PayloadCodec;
use crate::error::{Error, Result};
use crate::link::StoreLink;
use crate::session::{
    FlowSession, SessionStore, TEMP_SCREENSHOTS_KEY, UPLOADED_SCREENSHOTS_KEY, UPLOAD_STATE_KEY,
    WIZARD_KEYS,
};
use crate::types::{
    AppRecord, CategoryRef, ElementRef, FlowVariant, HeroSelection, PendingScreenshot, TagSubStep,
};
use crate::wizard::{WizardState, FIRST_STEP};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 既定の書き込み間隔（ms）
pub const DEFAULT_THROTTLE_MS: u64 = 100;

/// スナップショット内のスクリーンショット（画像本体は含まない）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotSnapshot {
    pub id: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    pub preview: String,
    #[serde(default)]
    pub category: Option<CategoryRef>,
    #[serde(default)]
    pub elements: Vec<ElementRef>,
}

impl From<&PendingScreenshot> for ScreenshotSnapshot {
    fn from(shot: &PendingScreenshot) -> Self {
        Self {
            id: shot.id.clone(),
            file_name: shot.file_name.clone(),
            mime_type: shot.mime_type.clone(),
            size: shot.size,
            preview: shot.preview.clone(),
            category: shot.category.clone(),
            elements: shot.elements.iter().cloned().collect(),
        }
    }
}

impl ScreenshotSnapshot {
    /// 画像本体を復元（失敗時は Missing）
    fn into_pending<C: PayloadCodec>(self, codec: &C) -> PendingScreenshot {
        let payload = codec.decode(&self.preview);
        if payload.is_missing() {
            log::warn!("could not rebuild image data for {}", self.file_name);
        }
        PendingScreenshot {
            id: self.id,
            file_name: self.file_name,
            mime_type: self.mime_type,
            size: self.size,
            payload,
            preview: self.preview,
            category: self.category,
            elements: self.elements.into_iter().collect(),
        }
    }
}

/// `uploadState` に保存するJSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// バージョン（互換性チェック用）
    pub version: u32,
    pub step: u8,
    pub source_link: Option<StoreLink>,
    pub app_record: Option<AppRecord>,
    #[serde(default)]
    pub hero_selection: Option<HeroSelection>,
    #[serde(default)]
    pub screenshots: Vec<ScreenshotSnapshot>,
    #[serde(default)]
    pub active_screenshot_index: usize,
    #[serde(default)]
    pub tag_sub_step: TagSubStep,
    #[serde(default)]
    pub pending_category: Option<CategoryRef>,
    #[serde(default)]
    pub variant: FlowVariant,
    pub saved_at: u64,
}

impl Snapshot {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn capture(state: &WizardState, now_ms: u64) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            step: state.step,
            source_link: state.source_link.clone(),
            app_record: state.app_record.clone(),
            hero_selection: state.hero_selection.clone(),
            screenshots: state.screenshots.iter().map(ScreenshotSnapshot::from).collect(),
            active_screenshot_index: state.active_index,
            tag_sub_step: state.tag_sub_step,
            pending_category: state.pending_category.clone(),
            variant: state.variant,
            saved_at: now_ms,
        }
    }

    /// WizardState を組み立てる（構造が壊れていればエラー）
    pub fn into_state<C: PayloadCodec>(self, codec: &C) -> Result<WizardState> {
        if self.version != Self::CURRENT_VERSION {
            return Err(Error::Snapshot(format!("unsupported version {}", self.version)));
        }

        let state = WizardState {
            step: self.step,
            source_link: self.source_link,
            app_record: self.app_record,
            hero_selection: self.hero_selection,
            screenshots: self
                .screenshots
                .into_iter()
                .map(|s| s.into_pending(codec))
                .collect(),
            active_index: self.active_screenshot_index,
            tag_sub_step: self.tag_sub_step,
            pending_category: self.pending_category,
            variant: self.variant,
            saved_at: Some(self.saved_at),
        };

        if !state.is_consistent() {
            return Err(Error::Snapshot(format!(
                "inconsistent state at step {} ({} screenshots, index {})",
                state.step,
                state.screenshots.len(),
                state.active_index
            )));
        }
        Ok(state)
    }
}

/// 保存結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    /// 書き込み間隔が短すぎて捨てた
    Throttled,
    /// ステップ1なので保存不要
    NotNeeded,
    /// ガード中のため保存しない
    Blocked,
    /// 書き込み失敗（ログ済み）
    Failed,
}

/// セッションストアへの永続化アダプタ
#[derive(Debug)]
pub struct Persistence<S> {
    store: S,
    throttle_ms: u64,
    last_write_ms: Option<u64>,
}

impl<S: SessionStore> Persistence<S> {
    pub fn new(store: S, throttle_ms: u64) -> Self {
        Self {
            store,
            throttle_ms,
            last_write_ms: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// 間引きありの保存
    pub fn save(&mut self, state: &WizardState, session: &FlowSession, now_ms: u64) -> SaveOutcome {
        if state.step <= FIRST_STEP {
            return self.discard_snapshot();
        }
        if let Some(last) = self.last_write_ms {
            if now_ms.saturating_sub(last) < self.throttle_ms {
                log::trace!("snapshot write throttled ({} ms since last)", now_ms.saturating_sub(last));
                return SaveOutcome::Throttled;
            }
        }
        self.write(state, session, now_ms)
    }

    /// 間引きなしの保存（ページが隠れるとき用）
    pub fn force_save(&mut self, state: &WizardState, session: &FlowSession, now_ms: u64) -> SaveOutcome {
        if state.step <= FIRST_STEP {
            return self.discard_snapshot();
        }
        self.write(state, session, now_ms)
    }

    /// ステップ1に戻ったら古いスナップショットを消す（次のマウントで復元させない）
    fn discard_snapshot(&mut self) -> SaveOutcome {
        match self.store.contains(UPLOAD_STATE_KEY) {
            Ok(false) => {}
            Ok(true) => {
                if let Err(e) = self.store.remove(UPLOAD_STATE_KEY) {
                    log::warn!("failed to remove stale upload snapshot: {}", e);
                    return SaveOutcome::Failed;
                }
                log::debug!("back at step 1, upload snapshot removed");
            }
            Err(e) => log::warn!("failed to read upload snapshot: {}", e),
        }
        SaveOutcome::NotNeeded
    }

    fn write(&mut self, state: &WizardState, session: &FlowSession, now_ms: u64) -> SaveOutcome {
        let result = serde_json::to_string(&Snapshot::capture(state, now_ms))
            .map_err(Error::from)
            .and_then(|json| self.store.set(UPLOAD_STATE_KEY, &json))
            .and_then(|_| session.write(&mut self.store));

        match result {
            Ok(()) => {
                self.last_write_ms = Some(now_ms);
                log::debug!("snapshot saved at step {}", state.step);
                SaveOutcome::Written
            }
            Err(e) => {
                log::warn!("failed to save upload snapshot: {}", e);
                SaveOutcome::Failed
            }
        }
    }

    /// フラグだけを書き出す
    pub fn write_session(&mut self, session: &FlowSession) {
        if let Err(e) = session.write(&mut self.store) {
            log::warn!("failed to write session markers: {}", e);
        }
    }

    pub fn has_snapshot(&self) -> bool {
        matches!(self.store.get(UPLOAD_STATE_KEY), Ok(Some(_)))
    }

    /// スナップショットから復元
    ///
    /// アップロード画面にいないとき、スナップショットがないとき、
    /// 読めないときは None。
    pub fn restore<C: PayloadCodec>(&self, codec: &C, on_upload_route: bool) -> Option<WizardState> {
        if !on_upload_route {
            log::debug!("not on the upload route, skipping restore");
            return None;
        }

        let json = match self.store.get(UPLOAD_STATE_KEY) {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("failed to read upload snapshot: {}", e);
                return None;
            }
        };

        let parsed = serde_json::from_str::<Snapshot>(&json)
            .map_err(Error::from)
            .and_then(|snapshot| snapshot.into_state(codec));
        match parsed {
            Ok(state) => {
                log::info!(
                    "restored upload at step {} with {} screenshot(s)",
                    state.step,
                    state.screenshots.len()
                );
                Some(state)
            }
            Err(e) => {
                log::warn!("discarding unreadable upload snapshot: {}", e);
                None
            }
        }
    }

    /// 直近バッチの一時キャッシュ
    pub fn cache_batch(&mut self, batch: &[PendingScreenshot]) {
        let items: Vec<ScreenshotSnapshot> = batch.iter().map(ScreenshotSnapshot::from).collect();
        let result = serde_json::to_string(&items)
            .map_err(Error::from)
            .and_then(|json| self.store.set(TEMP_SCREENSHOTS_KEY, &json));
        if let Err(e) = result {
            log::warn!("failed to cache screenshot batch: {}", e);
        }
    }

    /// 一時キャッシュを読み出す（なければ空）
    pub fn cached_batch(&self) -> Vec<ScreenshotSnapshot> {
        self.read_json(TEMP_SCREENSHOTS_KEY).unwrap_or_default()
    }

    /// ステップが進んだら一時キャッシュを捨てる
    pub fn clear_transient(&mut self) {
        if let Err(e) = self.store.remove(TEMP_SCREENSHOTS_KEY) {
            log::warn!("failed to clear {}: {}", TEMP_SCREENSHOTS_KEY, e);
        }
    }

    /// 送信済みオブジェクト（スクリーンショットID → URL）
    pub fn uploaded(&self) -> BTreeMap<String, String> {
        self.read_json(UPLOADED_SCREENSHOTS_KEY).unwrap_or_default()
    }

    pub fn record_uploaded(&mut self, uploaded: &BTreeMap<String, String>) {
        let result = serde_json::to_string(uploaded)
            .map_err(Error::from)
            .and_then(|json| self.store.set(UPLOADED_SCREENSHOTS_KEY, &json));
        if let Err(e) = result {
            log::warn!("failed to record uploaded screenshots: {}", e);
        }
    }

    /// ウィザード関連のキーをすべて削除（何度呼んでもよい）
    pub fn clear(&mut self) {
        for key in WIZARD_KEYS {
            if let Err(e) = self.store.remove(key) {
                log::warn!("failed to remove {}: {}", key, e);
            }
        }
        self.last_write_ms = None;
    }

    fn read_json<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        let json = self.store.get(key).ok().flatten()?;
        match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("ignoring unreadable {}: {}", key, e);
                None
            }
        }
    }
}
