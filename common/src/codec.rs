//! 画像バイト列 ⇔ Data URL 変換
//!
//! セッションストレージにはバイナリを直接置けないため、
//! プレビュー用のData URLから元のバイト列を復元する。
//! 復元に失敗した場合は `Payload::Missing` を返し、例外にはしない。

use base64::{engine::general_purpose::STANDARD, Engine as _};

const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// 画像本体
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Bytes(Vec<u8>),
    /// 復元できなかった（再アップロードが必要）
    Missing,
}

impl Payload {
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Bytes(b) => Some(b),
            Payload::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Payload::Missing)
    }
}

/// バイト列とテキストトークンの相互変換
pub trait PayloadCodec {
    fn encode(&self, mime_type: &str, bytes: &[u8]) -> String;
    fn decode(&self, token: &str) -> Payload;
}

/// `data:<mime>;base64,<data>` 形式のコーデック
#[derive(Debug, Clone, Copy, Default)]
pub struct DataUrlCodec;

impl PayloadCodec for DataUrlCodec {
    fn encode(&self, mime_type: &str, bytes: &[u8]) -> String {
        let mime_type = if mime_type.is_empty() { DEFAULT_MIME_TYPE } else { mime_type };
        format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
    }

    fn decode(&self, token: &str) -> Payload {
        if !token.starts_with("data:") || !token.contains(";base64,") {
            log::warn!("not a base64 data URL ({} chars)", token.len());
            return Payload::Missing;
        }
        let Some(data) = extract_base64_from_data_url(token) else {
            return Payload::Missing;
        };
        match STANDARD.decode(data) {
            Ok(bytes) => Payload::Bytes(bytes),
            Err(e) => {
                log::warn!("failed to decode data URL: {}", e);
                Payload::Missing
            }
        }
    }
}

/// Data URLからBase64データ部分を抽出
///
/// # Arguments
/// * `data_url` - "data:image/jpeg;base64,/9j/4AAQ..." 形式のData URL
pub fn extract_base64_from_data_url(data_url: &str) -> Option<&str> {
    data_url.split_once(',').map(|(_, data)| data)
}

/// Data URLからMIMEタイプを抽出
///
/// 抽出失敗時は"image/jpeg"をデフォルトとして返す
pub fn extract_mime_type_from_data_url(data_url: &str) -> &str {
    data_url
        .strip_prefix("data:")
        .and_then(|s| s.split([';', ',']).next())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_MIME_TYPE)
}
