//! 画像とレコードのローカル保存

use appshots_common::{Error as CommonError, ObjectStore, RecordStore, ScreenshotRecord};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// バケットディレクトリへ画像を保存
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ObjectStore for LocalObjectStore {
    async fn put(&self, path: &str, _mime_type: &str, bytes: &[u8]) -> appshots_common::Result<String> {
        let target = self.root.join(path);
        let write = async {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, bytes).await
        };
        write
            .await
            .map_err(|e| CommonError::Upload(format!("{}: {}", target.display(), e)))?;

        let absolute = std::path::absolute(&target).unwrap_or(target);
        Ok(format!("file://{}", absolute.display()))
    }
}

/// 1行1レコードのJSON Linesに追記
#[derive(Debug, Clone)]
pub struct JsonlRecordStore {
    path: PathBuf,
}

impl JsonlRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 登録済みレコードを読み込む
    pub fn load(&self) -> crate::error::Result<Vec<ScreenshotRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let mut records = Vec::new();
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            records.push(serde_json::from_str(line)?);
        }
        Ok(records)
    }
}

impl RecordStore for JsonlRecordStore {
    /// 全件を1回の書き込みで追記する
    async fn insert_screenshots(&self, records: &[ScreenshotRecord]) -> appshots_common::Result<()> {
        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }

        let write = async {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(buf.as_bytes()).await?;
            file.flush().await
        };
        write
            .await
            .map_err(|e| CommonError::Insert(format!("{}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appshots_common::Platform;
    use tempfile::tempdir;

    fn record(file_name: &str) -> ScreenshotRecord {
        ScreenshotRecord {
            app_id: "123".into(),
            app_name: "X".into(),
            platform: Platform::Ios,
            screen_type: "home".into(),
            ui_elements: vec!["nav-bar".into()],
            image_url: format!("file:///tmp/{}", file_name),
            file_name: file_name.into(),
        }
    }

    #[tokio::test]
    async fn test_put_writes_under_root() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let url = store.put("123/abc.png", "image/png", b"png").await.unwrap();

        assert!(url.starts_with("file://"));
        assert!(url.ends_with("123/abc.png"));
        assert_eq!(std::fs::read(dir.path().join("123/abc.png")).unwrap(), b"png");
    }

    #[tokio::test]
    async fn test_insert_appends_batches() {
        let dir = tempdir().unwrap();
        let store = JsonlRecordStore::new(dir.path().join("records.jsonl"));
        store.insert_screenshots(&[record("a.png"), record("b.png")]).await.unwrap();
        store.insert_screenshots(&[record("c.png")]).await.unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[2].file_name, "c.png");
    }
}
