//! セッションストア（タブ単位のキー・バリューストア）
//!
//! ブラウザでは sessionStorage、CLIではJSONファイルが実体。
//! キー名は周辺のページと共有するため変更しないこと。

use crate::error::Result;
use std::collections::BTreeMap;

pub const UPLOAD_STATE_KEY: &str = "uploadState";
pub const UPLOAD_IN_PROGRESS_KEY: &str = "uploadInProgress";
pub const PREVENT_AUTH_REDIRECTS_KEY: &str = "preventAuthRedirects";
pub const TEMP_SCREENSHOTS_KEY: &str = "tempScreenshots";
pub const UPLOADED_SCREENSHOTS_KEY: &str = "uploadedScreenshots";
pub const CURRENT_UPLOAD_PATH_KEY: &str = "currentUploadPath";

/// ウィザードが使うすべてのキー
pub const WIZARD_KEYS: &[&str] = &[
    UPLOAD_STATE_KEY,
    UPLOAD_IN_PROGRESS_KEY,
    PREVENT_AUTH_REDIRECTS_KEY,
    TEMP_SCREENSHOTS_KEY,
    UPLOADED_SCREENSHOTS_KEY,
    CURRENT_UPLOAD_PATH_KEY,
];

const MARKER_VALUE: &str = "true";

/// セッションスコープのキー・バリューストア
pub trait SessionStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// メモリ上のストア（テスト・単体利用向け）
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// フローの共有フラグ
///
/// ウィザードが所有し、ライフサイクルガードとアクセスゲートには参照で渡す。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowSession {
    /// アップロード作業中
    pub upload_in_progress: bool,
    /// 認証リダイレクトを抑止
    pub prevent_auth_redirects: bool,
    /// 直前にタブ切り替えがあった
    pub tab_switched: bool,
    /// フロー中の最終ルート
    pub current_path: Option<String>,
}

impl FlowSession {
    /// ストア上のマーカーから読み込む（読めないキーは未設定扱い）
    pub fn load<S: SessionStore + ?Sized>(store: &S) -> Self {
        let marker = |key: &str| match store.get(key) {
            Ok(value) => value.is_some_and(|v| v != "false"),
            Err(e) => {
                log::warn!("failed to read {}: {}", key, e);
                false
            }
        };

        Self {
            upload_in_progress: marker(UPLOAD_IN_PROGRESS_KEY),
            prevent_auth_redirects: marker(PREVENT_AUTH_REDIRECTS_KEY),
            tab_switched: false,
            current_path: store.get(CURRENT_UPLOAD_PATH_KEY).ok().flatten(),
        }
    }

    /// マーカーをストアに書き出す
    pub fn write<S: SessionStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        write_marker(store, UPLOAD_IN_PROGRESS_KEY, self.upload_in_progress)?;
        write_marker(store, PREVENT_AUTH_REDIRECTS_KEY, self.prevent_auth_redirects)?;
        match &self.current_path {
            Some(path) => store.set(CURRENT_UPLOAD_PATH_KEY, path),
            None => store.remove(CURRENT_UPLOAD_PATH_KEY),
        }
    }

    /// 復元後にリダイレクト抑止を再設定
    pub fn assert_in_progress(&mut self) {
        self.upload_in_progress = true;
        self.prevent_auth_redirects = true;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

fn write_marker<S: SessionStore + ?Sized>(store: &mut S, key: &str, on: bool) -> Result<()> {
    if on {
        store.set(key, MARKER_VALUE)
    } else {
        store.remove(key)
    }
}
