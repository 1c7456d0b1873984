//! バックエンドAPI連携
//!
//! アプリ情報の取得・画像の保存・レコード登録・ログイン状態の取得を
//! 同一オリジンの `/api` に任せる。

use appshots_common::backend::{MetadataResolver, ObjectStore, RecordStore, ScreenshotRecord};
use appshots_common::{AccessLevel, AppRecord, Error, Result, StoreLink, Viewer};
use serde::{de::DeserializeOwned, Deserialize};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, RequestMode, Response};

const API_BASE: &str = "/api";

#[derive(Deserialize)]
struct UploadedObject {
    url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewerResponse {
    id: Option<String>,
    #[serde(default)]
    can_upload: bool,
}

async fn fetch(
    method: &str,
    path: &str,
    body: Option<&JsValue>,
    content_type: &str,
) -> std::result::Result<Response, JsValue> {
    let url = format!("{}{}", API_BASE, path);

    let opts = RequestInit::new();
    opts.set_method(method);
    opts.set_mode(RequestMode::SameOrigin);
    if let Some(body) = body {
        opts.set_body(body);
    }

    let request = Request::new_with_str_and_init(&url, &opts)?;
    request.headers().set("Content-Type", content_type)?;

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("window is not available"))?;
    let resp_value = JsFuture::from(window.fetch_with_request(&request)).await?;
    resp_value.dyn_into()
}

/// API呼び出し（共通処理）
async fn call_api(
    method: &str,
    path: &str,
    body: Option<&JsValue>,
    content_type: &str,
) -> std::result::Result<Response, JsValue> {
    let resp = fetch(method, path, body, content_type).await?;
    if !resp.ok() {
        return Err(JsValue::from_str(&format!("API error: {}", resp.status())));
    }
    Ok(resp)
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> std::result::Result<T, JsValue> {
    let json = JsFuture::from(resp.json()?).await?;
    Ok(serde_wasm_bindgen::from_value(json)?)
}

fn describe(e: JsValue) -> String {
    e.as_string().unwrap_or_else(|| format!("{:?}", e))
}

fn encode_query(value: &str) -> String {
    String::from(js_sys::encode_uri_component(value))
}

/// 同一オリジンのAPI
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpBackend;

impl MetadataResolver for HttpBackend {
    async fn resolve(&self, link: &StoreLink) -> Result<AppRecord> {
        let path = format!("/metadata?url={}", encode_query(&link.url));
        let resp = call_api("GET", &path, None, "application/json")
            .await
            .map_err(|e| Error::Metadata(describe(e)))?;
        let mut record: AppRecord = read_json(resp).await.map_err(|e| Error::Metadata(describe(e)))?;
        if record.app_id.is_empty() {
            record.app_id = link.app_id.clone();
        }
        record.platform = link.store.platform();
        Ok(record)
    }
}

impl ObjectStore for HttpBackend {
    async fn put(&self, path: &str, mime_type: &str, bytes: &[u8]) -> Result<String> {
        let body: JsValue = js_sys::Uint8Array::from(bytes).into();
        let resp = call_api("PUT", &format!("/objects/{}", path), Some(&body), mime_type)
            .await
            .map_err(|e| Error::Upload(describe(e)))?;
        let uploaded: UploadedObject = read_json(resp).await.map_err(|e| Error::Upload(describe(e)))?;
        Ok(uploaded.url)
    }
}

impl RecordStore for HttpBackend {
    async fn insert_screenshots(&self, records: &[ScreenshotRecord]) -> Result<()> {
        let body = JsValue::from_str(&serde_json::to_string(records)?);
        call_api("POST", "/screenshots", Some(&body), "application/json")
            .await
            .map_err(|e| Error::Insert(describe(e)))?;
        Ok(())
    }
}

/// ログイン状態と権限
///
/// 401 は未ログインとして扱う。
pub async fn fetch_viewer() -> std::result::Result<(Option<Viewer>, AccessLevel), String> {
    let resp = fetch("GET", "/viewer", None, "application/json")
        .await
        .map_err(describe)?;
    if resp.status() == 401 {
        return Ok((None, AccessLevel::Basic));
    }
    if !resp.ok() {
        return Err(format!("API error: {}", resp.status()));
    }
    let viewer: ViewerResponse = read_json(resp).await.map_err(describe)?;
    let level = if viewer.can_upload { AccessLevel::Uploader } else { AccessLevel::Basic };
    Ok((viewer.id.map(|id| Viewer { id }), level))
}
