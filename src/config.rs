//! Persistent application settings

use crate::cipher::AnchorConfig;
use crate::download::DEFAULT_CHUNK_SIZE;
use crate::error::SigtubeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONFIG_FILE: &str = "config.json";

/// Settings read from `config.json`; absent keys take their defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub download_path: PathBuf,
    pub chunk_size: u64,
    pub max_retries: u32,
    /// Replaces the built-in anchors when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchors: Option<AnchorConfig>,
    pub ffmpeg_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_path: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: 3,
            anchors: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

impl AppConfig {
    /// `<config dir>/sigtube/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sigtube").join(CONFIG_FILE))
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self, SigtubeError> {
        match std::fs::read_to_string(path) {
            Ok(data) => {
                let config: AppConfig = serde_json::from_str(&data)
                    .map_err(|e| SigtubeError::Config(format!("{}: {}", path.display(), e)))?;
                if let Some(anchors) = &config.anchors {
                    anchors.validate()?;
                }
                info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write pretty JSON, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<(), SigtubeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Anchors to use: an explicit anchors file wins over the config's own
    pub fn resolve_anchors(&self, anchors_file: Option<&Path>) -> Result<AnchorConfig, SigtubeError> {
        match anchors_file {
            Some(path) => AnchorConfig::load(path),
            None => Ok(self.anchors.clone().unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{Anchor, AnchorSet};

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.chunk_size, 10 * 1024 * 1024);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"downloadPath": "/media/videos", "maxRetries": 5}"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.download_path, PathBuf::from("/media/videos"));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert!(config.anchors.is_none());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(AppConfig::load(&path), Err(SigtubeError::Config(_))));
    }

    #[test]
    fn test_invalid_anchor_pattern_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"anchors": {"signature": [{"pattern": "("}]}}"#).unwrap();

        assert!(matches!(AppConfig::load(&path), Err(SigtubeError::Config(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = AppConfig {
            chunk_size: 1024,
            anchors: Some(AnchorConfig {
                signature: AnchorSet::new(vec![Anchor::Literal("split(\"\")".to_string())]),
                ..AnchorConfig::default()
            }),
            ..AppConfig::default()
        };

        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_anchors_file_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let anchors_path = dir.path().join("anchors.json");
        std::fs::write(&anchors_path, r#"{"n_parameter": [{"literal": "custom"}]}"#).unwrap();

        let config = AppConfig::default();
        assert_eq!(config.resolve_anchors(None).unwrap(), AnchorConfig::default());

        let anchors = config.resolve_anchors(Some(&anchors_path)).unwrap();
        assert_eq!(anchors.n_parameter.descriptions(), vec!["custom".to_string()]);
        assert_eq!(anchors.signature, AnchorConfig::default().signature);
    }
}
