use crate::error::{AppshotsError, Result};
use appshots_common::{AccessLevel, FlowConfig, Resolution, Viewer};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// サインイン中の利用者ID
    pub viewer: Option<String>,
    /// アップロード権限
    pub can_upload: bool,
    /// セッション・ストレージの保存先（未指定時は既定のデータディレクトリ）
    pub data_dir: Option<PathBuf>,
    pub flow: FlowConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default_config())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| AppshotsError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("appshots").join("config.json"))
    }

    fn default_config() -> Self {
        Self {
            viewer: None,
            can_upload: true,
            data_dir: None,
            flow: FlowConfig::default(),
        }
    }

    /// データディレクトリ（環境変数を優先）
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("APPSHOTS_DATA_DIR") {
            return Ok(PathBuf::from(dir));
        }
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let base = dirs::data_local_dir()
            .ok_or_else(|| AppshotsError::Config("データディレクトリが見つかりません".into()))?;
        Ok(base.join("appshots"))
    }

    /// 利用者（環境変数を優先）
    pub fn identity(&self) -> Resolution<Option<Viewer>> {
        let id = std::env::var("APPSHOTS_VIEWER").ok().or_else(|| self.viewer.clone());
        Resolution::Ready(id.filter(|s| !s.trim().is_empty()).map(|id| Viewer { id }))
    }

    pub fn access_level(&self) -> Resolution<AccessLevel> {
        Resolution::Ready(if self.can_upload {
            AccessLevel::Uploader
        } else {
            AccessLevel::Basic
        })
    }

    pub fn set_viewer(&mut self, viewer: String) -> Result<()> {
        self.viewer = Some(viewer);
        self.save()
    }

    pub fn set_can_upload(&mut self, can_upload: bool) -> Result<()> {
        self.can_upload = can_upload;
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.viewer.is_none());
        assert!(config.can_upload);
        assert_eq!(config.flow.save_throttle_ms, 100);
        assert_eq!(config.flow.upload_route, "/upload");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"viewer":"u1","flow":{"cooldownMs":500}}"#).unwrap();
        assert_eq!(config.viewer.as_deref(), Some("u1"));
        assert_eq!(config.flow.lifecycle.cooldown_ms, 500);
        assert_eq!(config.flow.lifecycle.restore_delay_ms, 150);
        assert!(config.can_upload);
    }

    #[test]
    fn test_access_level() {
        let mut config = Config::default();
        assert_eq!(config.access_level(), Resolution::Ready(AccessLevel::Uploader));
        config.can_upload = false;
        assert_eq!(config.access_level(), Resolution::Ready(AccessLevel::Basic));
    }
}
