//! sessionStorage を実体とするセッションストア
//!
//! プライベートブラウズ等で使えない場合も画面は動かし、
//! 書き込みはエラーとして永続化層に任せる（ログのみ）。

use appshots_common::{Error, Result, SessionStore};

#[derive(Clone)]
pub struct WebSessionStore {
    storage: Option<web_sys::Storage>,
}

impl WebSessionStore {
    pub fn new() -> Self {
        let storage = web_sys::window().and_then(|w| w.session_storage().ok().flatten());
        if storage.is_none() {
            log::warn!("sessionStorage is not available");
        }
        Self { storage }
    }

    fn storage(&self) -> Result<&web_sys::Storage> {
        self.storage
            .as_ref()
            .ok_or_else(|| Error::Storage("sessionStorage is not available".into()))
    }
}

impl Default for WebSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn js_error(e: wasm_bindgen::JsValue) -> Error {
    Error::Storage(format!("{:?}", e))
}

impl SessionStore for WebSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.storage()?.get_item(key).map_err(js_error)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        // 容量超過（QuotaExceededError）もここで返る
        self.storage()?.set_item(key, value).map_err(js_error)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.storage()?.remove_item(key).map_err(js_error)
    }
}
