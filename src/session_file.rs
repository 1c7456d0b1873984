//! JSONファイルを実体とするセッションストア
//!
//! CLIの1回の起動を「ページ表示」とみなし、起動をまたいで
//! ブラウザの sessionStorage と同じキーを保持する。

use crate::error::{AppshotsError, Result};
use appshots_common::{Error as CommonError, SessionStore};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

const SESSION_FILE_NAME: &str = "session.json";

#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileSessionStore {
    /// データディレクトリのセッションファイルを開く（なければ空）
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = Self::session_path(data_dir);
        if !path.exists() {
            return Ok(Self { path, entries: BTreeMap::new() });
        }

        let file = File::open(&path)?;
        let entries = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| AppshotsError::InvalidSession(format!("{}: {}", path.display(), e)))?;
        Ok(Self { path, entries })
    }

    pub fn session_path(data_dir: &Path) -> PathBuf {
        data_dir.join(SESSION_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// セッションファイルを削除
    ///
    /// 削除した場合は true。
    pub fn delete(data_dir: &Path) -> Result<bool> {
        let path = Self::session_path(data_dir);
        if path.exists() {
            std::fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn flush(&self) -> std::result::Result<(), CommonError> {
        let write = || -> Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            if self.entries.is_empty() {
                if self.path.exists() {
                    std::fs::remove_file(&self.path)?;
                }
                return Ok(());
            }
            let file = File::create(&self.path)?;
            serde_json::to_writer_pretty(BufWriter::new(file), &self.entries)?;
            Ok(())
        };
        write().map_err(|e| CommonError::Storage(e.to_string()))
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> std::result::Result<Option<String>, CommonError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), CommonError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> std::result::Result<(), CommonError> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_set_persists_across_open() {
        let dir = tempdir().unwrap();
        let mut store = FileSessionStore::open(dir.path()).unwrap();
        store.set("uploadInProgress", "true").unwrap();

        let reopened = FileSessionStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("uploadInProgress").unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn test_removing_last_key_deletes_file() {
        let dir = tempdir().unwrap();
        let mut store = FileSessionStore::open(dir.path()).unwrap();
        store.set("uploadState", "{}").unwrap();
        assert!(store.path().exists());

        store.remove("uploadState").unwrap();
        assert!(!store.path().exists());
        store.remove("uploadState").unwrap();
    }

    #[test]
    fn test_corrupt_file_is_rejected() {
        let dir = tempdir().unwrap();
        std::fs::write(FileSessionStore::session_path(dir.path()), "not json").unwrap();
        assert!(matches!(
            FileSessionStore::open(dir.path()),
            Err(AppshotsError::InvalidSession(_))
        ));
    }
}
