use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppshotsError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("サインインが必要です。`appshots config --set-viewer YOUR_ID` で設定してください")]
    SignInRequired,

    #[error("アップロード権限がありません。プランをアップグレードしてください")]
    UpgradeRequired,

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("セッションファイルが不正: {0}")]
    InvalidSession(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("対話入力エラー: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error(transparent)]
    Common(#[from] appshots_common::Error),
}

pub type Result<T> = std::result::Result<T, AppshotsError>;
