//! アップロードウィザードの状態管理
//!
//! 5ステップの直線的なフロー:
//! 1. ストアリンク入力
//! 2. アプリ情報の確認
//! 3. カテゴリ選択・スクリーンショットのアップロード
//! 4. 1枚ごとのタグ付け
//! 5. 送信
//!
//! 状態の変更は必ずこのモジュールの操作を通す。
//! 検証に失敗した操作は状態を一切変更しない。

use crate::codec::{DataUrlCodec, Payload, PayloadCodec};
use crate::error::{Error, Result};
use crate::link::{parse_store_link, StoreLink};
use crate::session::FlowSession;
use crate::types::{
    AppRecord, CategoryRef, ElementRef, FlowVariant, HeroSelection, PendingScreenshot, RawFile,
    TagSubStep,
};
use std::collections::BTreeSet;

pub const FIRST_STEP: u8 = 1;
pub const LAST_STEP: u8 = 5;

const STEP_METADATA: u8 = 2;
const STEP_UPLOAD: u8 = 3;
const STEP_TAGGING: u8 = 4;

/// ウィザードの状態（唯一の正）
#[derive(Debug, Clone, PartialEq)]
pub struct WizardState {
    pub(crate) step: u8,
    pub(crate) source_link: Option<StoreLink>,
    pub(crate) app_record: Option<AppRecord>,
    pub(crate) hero_selection: Option<HeroSelection>,
    pub(crate) screenshots: Vec<PendingScreenshot>,
    pub(crate) active_index: usize,
    pub(crate) tag_sub_step: TagSubStep,
    /// 次のバッチに適用するカテゴリ
    pub(crate) pending_category: Option<CategoryRef>,
    pub(crate) variant: FlowVariant,
    pub(crate) saved_at: Option<u64>,
}

impl WizardState {
    pub fn new(variant: FlowVariant) -> Self {
        Self {
            step: FIRST_STEP,
            source_link: None,
            app_record: None,
            hero_selection: None,
            screenshots: Vec::new(),
            active_index: 0,
            tag_sub_step: variant.initial_sub_step(),
            pending_category: None,
            variant,
            saved_at: None,
        }
    }

    pub fn step(&self) -> u8 {
        self.step
    }

    pub fn source_link(&self) -> Option<&StoreLink> {
        self.source_link.as_ref()
    }

    pub fn app_record(&self) -> Option<&AppRecord> {
        self.app_record.as_ref()
    }

    pub fn hero_selection(&self) -> Option<&HeroSelection> {
        self.hero_selection.as_ref()
    }

    pub fn screenshots(&self) -> &[PendingScreenshot] {
        &self.screenshots
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    /// タグ付け中のスクリーンショット（ステップ4以外はNone）
    pub fn active_screenshot(&self) -> Option<&PendingScreenshot> {
        if self.step == STEP_TAGGING {
            self.screenshots.get(self.active_index)
        } else {
            None
        }
    }

    pub fn tag_sub_step(&self) -> TagSubStep {
        self.tag_sub_step
    }

    pub fn pending_category(&self) -> Option<&CategoryRef> {
        self.pending_category.as_ref()
    }

    pub fn variant(&self) -> FlowVariant {
        self.variant
    }

    pub fn saved_at(&self) -> Option<u64> {
        self.saved_at
    }

    /// 構造的に正しい状態か（復元時の検査用）
    pub fn is_consistent(&self) -> bool {
        if !(FIRST_STEP..=LAST_STEP).contains(&self.step) {
            return false;
        }
        if self.step >= STEP_METADATA && self.source_link.is_none() {
            return false;
        }
        if self.step > STEP_METADATA && self.app_record.is_none() {
            return false;
        }
        if self.step >= STEP_TAGGING && self.active_index >= self.screenshots.len() {
            return false;
        }
        true
    }
}

/// バッチ取り込みの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub added: usize,
    /// 画像でないため読み飛ばしたファイル名
    pub skipped: Vec<String>,
}

/// タグ付け後の遷移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOutcome {
    /// 次のスクリーンショットへ
    Next(usize),
    /// 全件完了（ステップ5へ）
    Completed,
}

/// ウィザード本体
///
/// WizardState とフロー共有フラグ（FlowSession）を所有する。
#[derive(Debug, Clone)]
pub struct Wizard<C = DataUrlCodec> {
    state: WizardState,
    session: FlowSession,
    codec: C,
}

impl Wizard<DataUrlCodec> {
    pub fn new(variant: FlowVariant) -> Self {
        Self::with_codec(variant, DataUrlCodec)
    }
}

impl<C: PayloadCodec> Wizard<C> {
    pub fn with_codec(variant: FlowVariant, codec: C) -> Self {
        Self {
            state: WizardState::new(variant),
            session: FlowSession::default(),
            codec,
        }
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn session(&self) -> &FlowSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut FlowSession {
        &mut self.session
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn step(&self) -> u8 {
        self.state.step
    }

    /// Step 1: ストアリンクを送信
    pub fn submit_link(&mut self, url: &str) -> Result<StoreLink> {
        self.expect_step(FIRST_STEP)?;
        let link = parse_store_link(url)?;

        // 戻ってきた場合、確認済みのリンクは差し替えられない
        if let (Some(existing), Some(_)) = (&self.state.source_link, &self.state.app_record) {
            if existing.url != link.url {
                return Err(Error::LinkLocked);
            }
        }

        log::debug!("store link accepted: {:?} {}", link.store, link.app_id);
        self.state.source_link = Some(link.clone());
        self.state.step = STEP_METADATA;
        self.session.upload_in_progress = true;
        Ok(link)
    }

    /// Step 2: アプリ情報と代表メディアを確定
    pub fn confirm_metadata(
        &mut self,
        record: AppRecord,
        hero_images: &[String],
        hero_videos: &[String],
    ) -> Result<()> {
        self.expect_step(STEP_METADATA)?;
        let hero = if hero_images.is_empty() && hero_videos.is_empty() {
            None
        } else {
            Some(HeroSelection::from_picks(hero_images, hero_videos)?)
        };

        self.state.app_record = Some(record);
        self.state.hero_selection = hero;
        self.state.step = STEP_UPLOAD;
        Ok(())
    }

    /// Step 3: 次のバッチのカテゴリを選択
    pub fn select_category(&mut self, category: CategoryRef) -> Result<()> {
        self.expect_step(STEP_UPLOAD)?;
        self.state.pending_category = Some(category);
        Ok(())
    }

    /// Step 3/4: スクリーンショットを追加
    ///
    /// 画像以外は読み飛ばす。有効な画像が1枚もなければエラー。
    pub fn upload_batch(&mut self, files: Vec<RawFile>) -> Result<BatchOutcome> {
        if self.state.step != STEP_UPLOAD && self.state.step != STEP_TAGGING {
            return Err(Error::WrongStep { expected: STEP_UPLOAD, actual: self.state.step });
        }

        let category = self.state.pending_category.clone();
        if self.state.variant == FlowVariant::CategoryFirst && category.is_none() {
            return Err(Error::NoCategorySelected);
        }

        let (images, others): (Vec<RawFile>, Vec<RawFile>) =
            files.into_iter().partition(RawFile::is_image);
        if images.is_empty() {
            return Err(Error::NoValidImages);
        }

        let first_new = self.state.screenshots.len();
        let added = images.len();
        for (offset, file) in images.into_iter().enumerate() {
            let screenshot = self.to_pending(first_new + offset, file, category.clone());
            self.state.screenshots.push(screenshot);
        }

        self.state.active_index = first_new;
        self.state.tag_sub_step = self.state.variant.initial_sub_step();
        self.state.step = STEP_TAGGING;

        let skipped: Vec<String> = others.into_iter().map(|f| f.name).collect();
        if !skipped.is_empty() {
            log::info!("skipped {} non-image file(s)", skipped.len());
        }
        Ok(BatchOutcome { added, skipped })
    }

    /// Step 4（カテゴリ後決め）: 現在の1枚のカテゴリを選ぶ
    pub fn choose_category(&mut self, category: CategoryRef) -> Result<()> {
        self.expect_step(STEP_TAGGING)?;
        let index = self.state.active_index;
        let shot = self
            .state
            .screenshots
            .get_mut(index)
            .ok_or(Error::NoActiveScreenshot)?;
        shot.category = Some(category);
        self.state.tag_sub_step = TagSubStep::Elements;
        Ok(())
    }

    /// Step 4: 現在の1枚にUI要素タグを付ける
    pub fn tag_current(&mut self, elements: Vec<ElementRef>) -> Result<TagOutcome> {
        self.tag(None, elements)
    }

    /// Step 4: カテゴリとUI要素タグをまとめて付ける
    pub fn tag_current_with_category(
        &mut self,
        category: CategoryRef,
        elements: Vec<ElementRef>,
    ) -> Result<TagOutcome> {
        self.tag(Some(category), elements)
    }

    fn tag(&mut self, category: Option<CategoryRef>, elements: Vec<ElementRef>) -> Result<TagOutcome> {
        self.expect_step(STEP_TAGGING)?;
        if elements.is_empty() {
            return Err(Error::NoElementTags);
        }

        let index = self.state.active_index;
        let shot = self
            .state
            .screenshots
            .get_mut(index)
            .ok_or(Error::NoActiveScreenshot)?;
        if category.is_none() && shot.category.is_none() {
            return Err(Error::MissingCategory);
        }

        if let Some(category) = category {
            shot.category = Some(category);
        }
        shot.elements = elements.into_iter().collect::<BTreeSet<_>>();

        match self.next_untagged(index) {
            Some(next) => {
                self.state.active_index = next;
                self.state.tag_sub_step = self.state.variant.initial_sub_step();
                Ok(TagOutcome::Next(next))
            }
            None => {
                self.state.step = LAST_STEP;
                Ok(TagOutcome::Completed)
            }
        }
    }

    /// `index` の後ろ、次に先頭から探して最初の未タグの1枚
    ///
    /// タグ付け中に追加したバッチで前の1枚が飛ばされても取りこぼさない。
    fn next_untagged(&self, index: usize) -> Option<usize> {
        let shots = &self.state.screenshots;
        (index + 1..shots.len())
            .chain(0..index)
            .find(|&i| !shots[i].is_tagged())
    }

    /// 1つ前のステップへ（データは保持）
    pub fn go_back(&mut self) -> u8 {
        self.state.step = self.state.step.saturating_sub(1).max(FIRST_STEP);
        self.state.step
    }

    /// 初期状態に戻す
    pub fn reset(&mut self) {
        self.state = WizardState::new(self.state.variant);
        self.session.upload_in_progress = false;
        self.session.prevent_auth_redirects = false;
    }

    /// 送信可能か（ステップ5かつ全件タグ付け済み）
    pub fn ready_to_submit(&self) -> bool {
        self.state.step == LAST_STEP
            && self.state.app_record.is_some()
            && !self.state.screenshots.is_empty()
            && self.state.screenshots.iter().all(PendingScreenshot::is_tagged)
    }

    /// 復元した状態で丸ごと置き換える
    pub(crate) fn replace_state(&mut self, state: WizardState) {
        self.state = state;
    }

    pub(crate) fn stamp_saved(&mut self, now_ms: u64) {
        self.state.saved_at = Some(now_ms);
    }

    fn expect_step(&self, expected: u8) -> Result<()> {
        if self.state.step == expected {
            Ok(())
        } else {
            Err(Error::WrongStep { expected, actual: self.state.step })
        }
    }

    fn to_pending(&self, index: usize, file: RawFile, category: Option<CategoryRef>) -> PendingScreenshot {
        let preview = self.codec.encode(&file.mime_type, &file.bytes);
        PendingScreenshot {
            id: format!("shot-{:03}-{}", index, file.name),
            size: file.bytes.len() as u64,
            file_name: file.name,
            mime_type: file.mime_type,
            payload: Payload::Bytes(file.bytes),
            preview,
            category,
            elements: BTreeSet::new(),
        }
    }
}
