//! エラー型定義
//!
//! - 入力検証エラー: その場で表示し、ステップは進めない
//! - 外部連携エラー: 通知として表示し、収集済みの状態は保持する
//! - 永続化エラー: persistence 内でログ出力して握りつぶす

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("Please paste an App Store or Google Play link")]
    EmptyLink,

    #[error("Only https:// store links are accepted: {0}")]
    InvalidScheme(String),

    #[error("Unsupported store domain: {0}")]
    UnsupportedDomain(String),

    #[error("Store link is missing an app id: {0}")]
    MissingAppId(String),

    #[error("Link is locked once metadata is confirmed; restart the upload to change it")]
    LinkLocked,

    #[error("Operation requires step {expected}, wizard is at step {actual}")]
    WrongStep { expected: u8, actual: u8 },

    #[error("Select a category before uploading screenshots")]
    NoCategorySelected,

    #[error("No valid images in the selection")]
    NoValidImages,

    #[error("Select at least one UI element")]
    NoElementTags,

    #[error("No screenshot is waiting to be tagged")]
    NoActiveScreenshot,

    #[error("Select a category for this screenshot first")]
    MissingCategory,

    #[error("At most {max} hero media can be selected (got {got})")]
    TooManyHeroMedia { max: usize, got: usize },

    #[error("Metadata lookup failed: {0}")]
    Metadata(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Record insert failed: {0}")]
    Insert(String),

    #[error("Screenshot data is missing, please upload it again: {0}")]
    MissingPayload(String),

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Invalid snapshot: {0}")]
    Snapshot(String),

    #[error("Lifecycle transition rejected: {from:?} -> {to:?}")]
    InvalidTransition {
        from: crate::lifecycle::Phase,
        to: crate::lifecycle::Phase,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// 入力検証エラーか（ステップ内でインライン表示する種類）
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::EmptyLink
                | Error::InvalidScheme(_)
                | Error::UnsupportedDomain(_)
                | Error::MissingAppId(_)
                | Error::LinkLocked
                | Error::WrongStep { .. }
                | Error::NoCategorySelected
                | Error::NoValidImages
                | Error::NoElementTags
                | Error::MissingCategory
                | Error::NoActiveScreenshot
                | Error::TooManyHeroMedia { .. }
        )
    }

    /// 外部連携エラーか（通知表示、再試行可能）
    pub fn is_collaborator(&self) -> bool {
        matches!(
            self,
            Error::Metadata(_) | Error::Upload(_) | Error::Insert(_) | Error::MissingPayload(_)
        )
    }
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_scheme() {
        let error = Error::InvalidScheme("http://apps.apple.com".to_string());
        let display = format!("{}", error);
        assert!(display.contains("https://"));
        assert!(display.contains("http://apps.apple.com"));
    }

    #[test]
    fn test_error_display_wrong_step() {
        let error = Error::WrongStep { expected: 2, actual: 1 };
        assert_eq!(
            format!("{}", error),
            "Operation requires step 2, wizard is at step 1"
        );
    }

    #[test]
    fn test_error_from_json() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: Error = json_error.into();
        assert!(matches!(error, Error::Json(_)));
        assert!(!error.is_validation());
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::NoValidImages.is_validation());
        assert!(Error::NoElementTags.is_validation());
        assert!(!Error::NoValidImages.is_collaborator());
        assert!(Error::Upload("timeout".into()).is_collaborator());
        assert!(!Error::Storage("quota".into()).is_validation());
        assert!(!Error::Storage("quota".into()).is_collaborator());
    }
}
