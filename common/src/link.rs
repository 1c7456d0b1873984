//! ストアリンクの検証
//!
//! 受け付けるのは https の App Store / Google Play のリンクのみ。
//! スキーム違いとドメイン違いは別のエラーとして返す。

use crate::error::{Error, Result};
use crate::types::Platform;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const APP_STORE_HOST: &str = "apps.apple.com";
pub const PLAY_STORE_HOST: &str = "play.google.com";

/// ストア種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Store {
    AppStore,
    PlayStore,
}

impl Store {
    pub fn platform(&self) -> Platform {
        match self {
            Store::AppStore => Platform::Ios,
            Store::PlayStore => Platform::Android,
        }
    }
}

/// 検証済みストアリンク
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreLink {
    pub url: String,
    pub store: Store,
    pub app_id: String,
}

lazy_static::lazy_static! {
    static ref SCHEME_RE: Regex = Regex::new(r"^([A-Za-z][A-Za-z0-9+.-]*)://(.*)$").unwrap();
    static ref APPLE_ID_RE: Regex = Regex::new(r"/id(\d+)").unwrap();
    static ref PLAY_ID_RE: Regex = Regex::new(r"[?&]id=([A-Za-z0-9_.]+)").unwrap();
}

/// リンクを検証して StoreLink を返す
pub fn parse_store_link(input: &str) -> Result<StoreLink> {
    let url = input.trim();
    if url.is_empty() {
        return Err(Error::EmptyLink);
    }

    let caps = SCHEME_RE
        .captures(url)
        .ok_or_else(|| Error::InvalidScheme(url.to_string()))?;
    if !caps[1].eq_ignore_ascii_case("https") {
        return Err(Error::InvalidScheme(url.to_string()));
    }

    let rest = &caps[2];
    let host = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    // ポート指定付きは想定しない
    let store = match host.as_str() {
        APP_STORE_HOST => Store::AppStore,
        PLAY_STORE_HOST => Store::PlayStore,
        _ => return Err(Error::UnsupportedDomain(host)),
    };

    let app_id = match store {
        Store::AppStore => APPLE_ID_RE.captures(rest).map(|c| c[1].to_string()),
        Store::PlayStore => PLAY_ID_RE.captures(rest).map(|c| c[1].to_string()),
    }
    .ok_or_else(|| Error::MissingAppId(url.to_string()))?;

    Ok(StoreLink {
        url: url.to_string(),
        store,
        app_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_app_store_link() {
        let link = parse_store_link("https://apps.apple.com/us/app/x/id123").unwrap();
        assert_eq!(link.store, Store::AppStore);
        assert_eq!(link.app_id, "123");
        assert_eq!(link.store.platform(), Platform::Ios);
    }

    #[test]
    fn test_parse_play_store_link() {
        let link =
            parse_store_link("https://play.google.com/store/apps/details?hl=en&id=com.example.app")
                .unwrap();
        assert_eq!(link.store, Store::PlayStore);
        assert_eq!(link.app_id, "com.example.app");
    }

    #[test]
    fn test_trims_whitespace() {
        let link = parse_store_link("  https://apps.apple.com/app/id9  ").unwrap();
        assert_eq!(link.url, "https://apps.apple.com/app/id9");
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(parse_store_link("   "), Err(Error::EmptyLink)));
    }

    #[test]
    fn test_rejects_http() {
        let err = parse_store_link("http://apps.apple.com/us/app/x/id123").unwrap_err();
        assert!(matches!(err, Error::InvalidScheme(_)));
    }

    #[test]
    fn test_rejects_missing_scheme() {
        let err = parse_store_link("apps.apple.com/us/app/x/id123").unwrap_err();
        assert!(matches!(err, Error::InvalidScheme(_)));
    }

    #[test]
    fn test_rejects_other_domain() {
        let err = parse_store_link("https://example.com/app/id123").unwrap_err();
        assert!(matches!(err, Error::UnsupportedDomain(ref h) if h == "example.com"));
    }

    #[test]
    fn test_rejects_lookalike_domain() {
        let err = parse_store_link("https://apps.apple.com.evil.io/app/id1").unwrap_err();
        assert!(matches!(err, Error::UnsupportedDomain(_)));
    }

    #[test]
    fn test_rejects_missing_id() {
        let err = parse_store_link("https://play.google.com/store/apps").unwrap_err();
        assert!(matches!(err, Error::MissingAppId(_)));
    }
}
