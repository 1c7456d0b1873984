//! ウィザードで扱う型定義
//!
//! CLIとWeb(WASM)で共有される型:
//! - AppRecord: ストアリンクから解決したアプリ情報
//! - HeroSelection: 代表メディア（最大3件、表示順つき）
//! - RawFile: アップロード前の入力ファイル
//! - PendingScreenshot: タグ付け待ちのスクリーンショット

use crate::codec::Payload;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 代表メディアの上限
pub const MAX_HERO_MEDIA: usize = 3;

/// 画面種別カテゴリの候補
pub const SCREEN_CATEGORIES: &[&str] = &[
    "home",
    "onboarding",
    "login",
    "signup",
    "search",
    "profile",
    "settings",
    "checkout",
    "paywall",
    "empty-state",
];

/// プラットフォーム
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Ios,
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }
}

/// アプリ情報
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppRecord {
    pub app_id: String,
    pub name: String,
    pub publisher: String,
    pub platform: Platform,
    pub icon_url: String,
}

/// 画面種別カテゴリ（例: "home", "onboarding"）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryRef(pub String);

impl CategoryRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// UI要素タグ（例: "nav-bar", "tab-bar"）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// カンマ区切りの入力を解釈（小文字化・重複除去、入力順を保持）
    pub fn parse_list(input: &str) -> Vec<ElementRef> {
        let mut seen = BTreeSet::new();
        input
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .filter(|s| seen.insert(s.clone()))
            .map(ElementRef)
            .collect()
    }
}

/// メディア種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// 代表メディアの1枠
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeroSlot {
    pub url: String,
    pub kind: MediaKind,
    /// 表示順（1..=3）
    pub position: u8,
}

/// 代表メディアの選択
///
/// 復元時も `with_positions` を通して件数と表示順を検証する。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<HeroSlot>", into = "Vec<HeroSlot>")]
pub struct HeroSelection {
    slots: Vec<HeroSlot>,
}

impl HeroSelection {
    /// 画像→動画の順に表示順を割り当てる
    pub fn from_picks(images: &[String], videos: &[String]) -> Result<Self> {
        let got = images.len() + videos.len();
        if got > MAX_HERO_MEDIA {
            return Err(Error::TooManyHeroMedia { max: MAX_HERO_MEDIA, got });
        }

        let slots = images
            .iter()
            .map(|url| (url, MediaKind::Image))
            .chain(videos.iter().map(|url| (url, MediaKind::Video)))
            .enumerate()
            .map(|(i, (url, kind))| HeroSlot {
                url: url.clone(),
                kind,
                position: (i + 1) as u8,
            })
            .collect();

        Ok(Self { slots })
    }

    /// 表示順を明示して作成（重複・範囲外は拒否）
    pub fn with_positions(slots: Vec<HeroSlot>) -> Result<Self> {
        if slots.len() > MAX_HERO_MEDIA {
            return Err(Error::TooManyHeroMedia { max: MAX_HERO_MEDIA, got: slots.len() });
        }
        let mut seen = BTreeSet::new();
        for slot in &slots {
            let in_range = (1..=MAX_HERO_MEDIA as u8).contains(&slot.position);
            if !in_range || !seen.insert(slot.position) {
                return Err(Error::Snapshot(format!(
                    "hero position {} is out of range or duplicated",
                    slot.position
                )));
            }
        }
        let mut slots = slots;
        slots.sort_by_key(|s| s.position);
        Ok(Self { slots })
    }

    pub fn slots(&self) -> &[HeroSlot] {
        &self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

impl TryFrom<Vec<HeroSlot>> for HeroSelection {
    type Error = Error;

    fn try_from(slots: Vec<HeroSlot>) -> Result<Self> {
        Self::with_positions(slots)
    }
}

impl From<HeroSelection> for Vec<HeroSlot> {
    fn from(hero: HeroSelection) -> Self {
        hero.slots
    }
}

/// アップロード前の入力ファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl RawFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/") && !self.bytes.is_empty()
    }
}

/// タグ付けのサブステップ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagSubStep {
    Category,
    #[default]
    Elements,
}

/// フローの種類
///
/// `CategoryFirst`: アップロード時にカテゴリを決める
/// `PerScreenshot`: 1枚ごとにカテゴリを選ぶ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowVariant {
    #[default]
    CategoryFirst,
    PerScreenshot,
}

impl FlowVariant {
    /// 1枚のタグ付けを始めるときのサブステップ
    pub fn initial_sub_step(&self) -> TagSubStep {
        match self {
            FlowVariant::CategoryFirst => TagSubStep::Elements,
            FlowVariant::PerScreenshot => TagSubStep::Category,
        }
    }
}

/// タグ付け待ちのスクリーンショット
#[derive(Debug, Clone, PartialEq)]
pub struct PendingScreenshot {
    pub id: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    /// 元の画像バイト列（メモリ上のみ）
    pub payload: Payload,
    /// プレビュー兼復元用のData URL
    pub preview: String,
    pub category: Option<CategoryRef>,
    pub elements: BTreeSet<ElementRef>,
}

impl PendingScreenshot {
    pub fn is_tagged(&self) -> bool {
        self.category.is_some() && !self.elements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_element_list() {
        let parsed = ElementRef::parse_list(" Nav-Bar, button ,,button");
        assert_eq!(parsed, vec![ElementRef::new("nav-bar"), ElementRef::new("button")]);
        assert!(ElementRef::parse_list("  ").is_empty());
    }

    #[test]
    fn test_hero_from_picks_orders_images_first() {
        let hero = HeroSelection::from_picks(
            &["a.png".to_string(), "b.png".to_string()],
            &["intro.mp4".to_string()],
        )
        .unwrap();

        assert_eq!(hero.len(), 3);
        assert_eq!(hero.slots()[0].position, 1);
        assert_eq!(hero.slots()[2].kind, MediaKind::Video);
        assert_eq!(hero.slots()[2].position, 3);
    }

    #[test]
    fn test_hero_rejects_more_than_three() {
        let images: Vec<String> = (0..4).map(|i| format!("{}.png", i)).collect();
        let err = HeroSelection::from_picks(&images, &[]).unwrap_err();
        assert!(matches!(err, Error::TooManyHeroMedia { max: 3, got: 4 }));
    }

    #[test]
    fn test_hero_with_positions_rejects_duplicates() {
        let slot = |p| HeroSlot { url: "x".into(), kind: MediaKind::Image, position: p };
        assert!(HeroSelection::with_positions(vec![slot(1), slot(1)]).is_err());
        assert!(HeroSelection::with_positions(vec![slot(4)]).is_err());

        let hero = HeroSelection::with_positions(vec![slot(3), slot(1)]).unwrap();
        assert_eq!(hero.slots()[0].position, 1);
    }

    #[test]
    fn test_hero_deserialize_validates_positions() {
        let ok: HeroSelection = serde_json::from_str(
            r#"[{"url":"b.mp4","kind":"video","position":2},{"url":"a.png","kind":"image","position":1}]"#,
        )
        .unwrap();
        assert_eq!(ok.slots()[0].url, "a.png");
        assert_eq!(serde_json::to_string(&ok).unwrap().matches("position").count(), 2);

        let out_of_range = r#"[{"url":"a.png","kind":"image","position":4}]"#;
        assert!(serde_json::from_str::<HeroSelection>(out_of_range).is_err());
        let duplicated = r#"[{"url":"a","kind":"image","position":1},{"url":"b","kind":"image","position":1}]"#;
        assert!(serde_json::from_str::<HeroSelection>(duplicated).is_err());
        let too_many = r#"[{"url":"a","kind":"image","position":1},{"url":"b","kind":"image","position":2},
            {"url":"c","kind":"image","position":3},{"url":"d","kind":"image","position":3}]"#;
        assert!(serde_json::from_str::<HeroSelection>(too_many).is_err());
    }

    #[test]
    fn test_raw_file_is_image() {
        assert!(RawFile::new("a.png", "image/png", vec![1, 2]).is_image());
        assert!(!RawFile::new("a.txt", "text/plain", vec![1]).is_image());
        assert!(!RawFile::new("empty.png", "image/png", vec![]).is_image());
    }

    #[test]
    fn test_app_record_serialize() {
        let record = AppRecord {
            app_id: "123".to_string(),
            name: "X".to_string(),
            platform: Platform::Android,
            ..Default::default()
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"appId\":\"123\""));
        assert!(json.contains("\"platform\":\"android\""));
    }

    #[test]
    fn test_initial_sub_step_by_variant() {
        assert_eq!(FlowVariant::CategoryFirst.initial_sub_step(), TagSubStep::Elements);
        assert_eq!(FlowVariant::PerScreenshot.initial_sub_step(), TagSubStep::Category);
    }
}
