//! Step 5: 送信
//!
//! 画像をすべてアップロードしてから、レコードを1回でまとめて登録する。
//! どこかで失敗したら送信全体を失敗とし、ウィザードの状態は残す。
//! アップロード済みの画像は `uploaded` に記録され、再試行時は再送しない。

use crate::backend::{ObjectStore, RecordStore, ScreenshotRecord};
use crate::error::{Error, Result};
use crate::types::PendingScreenshot;
use crate::wizard::{WizardState, LAST_STEP};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// 送信結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitReport {
    pub inserted: usize,
    /// 前回の試行でアップロード済みだった件数
    pub reused: usize,
}

/// 保存先パス: `{app_id}/{sha256先頭16桁}.{拡張子}`
pub fn object_path(app_id: &str, mime_type: &str, bytes: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    format!("{}/{}.{}", app_id, &digest[..16], extension_for(mime_type))
}

fn extension_for(mime_type: &str) -> &str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        other => other
            .strip_prefix("image/")
            .filter(|sub| !sub.is_empty() && sub.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("bin"),
    }
}

/// 送信前チェック（全件タグ付け済み）
fn validate(shot: &PendingScreenshot) -> Result<&str> {
    let category = shot.category.as_ref().ok_or(Error::MissingCategory)?;
    if shot.elements.is_empty() {
        return Err(Error::NoElementTags);
    }
    Ok(category.as_str())
}

pub async fn submit_screenshots<O, R, F>(
    state: &WizardState,
    objects: &O,
    records: &R,
    uploaded: &mut BTreeMap<String, String>,
    mut on_progress: F,
) -> Result<SubmitReport>
where
    O: ObjectStore,
    R: RecordStore,
    F: FnMut(usize, usize),
{
    if state.step() != LAST_STEP {
        return Err(Error::WrongStep { expected: LAST_STEP, actual: state.step() });
    }
    let app = state
        .app_record()
        .ok_or(Error::WrongStep { expected: LAST_STEP, actual: state.step() })?;

    let shots = state.screenshots();
    for shot in shots {
        validate(shot)?;
    }

    let total = shots.len();
    let mut reused = 0;
    let mut batch = Vec::with_capacity(total);
    for (i, shot) in shots.iter().enumerate() {
        let category = validate(shot)?;
        let image_url = match uploaded.get(&shot.id) {
            Some(url) => {
                reused += 1;
                url.clone()
            }
            None => {
                let bytes = shot
                    .payload
                    .bytes()
                    .ok_or_else(|| Error::MissingPayload(shot.file_name.clone()))?;
                let path = object_path(&app.app_id, &shot.mime_type, bytes);
                let url = objects.put(&path, &shot.mime_type, bytes).await?;
                log::debug!("uploaded {} -> {}", shot.file_name, url);
                uploaded.insert(shot.id.clone(), url.clone());
                url
            }
        };

        batch.push(ScreenshotRecord {
            app_id: app.app_id.clone(),
            app_name: app.name.clone(),
            platform: app.platform,
            screen_type: category.to_string(),
            ui_elements: shot.elements.iter().map(|e| e.as_str().to_string()).collect(),
            image_url,
            file_name: shot.file_name.clone(),
        });
        on_progress(i + 1, total);
    }

    records.insert_screenshots(&batch).await?;
    log::info!("submitted {} screenshot(s) for {}", batch.len(), app.app_id);
    Ok(SubmitReport { inserted: batch.len(), reused })
}
