//! On-disk configuration: typed representation, defaults, and a single-shot loader.
//!
//! Loaded once at process start (§4.10). There is no hot-reload; the interactive
//! wizard that produces a config file in the first place is an external collaborator.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chzzk_engine::config::{OnStartPrevious, Quality};
use serde::Deserialize;

use crate::error::{AppError, Result};

fn default_poll_interval_sec() -> u64 {
    30
}

fn default_stall_restart_sec() -> u64 {
    180
}

fn default_session_refresh_hours() -> BTreeSet<u8> {
    [6, 18].into_iter().collect()
}

fn default_quality() -> Quality {
    Quality::Best
}

fn default_on_start_previous() -> OnStartPrevious {
    OnStartPrevious::Keep
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("./archive")
}

fn default_recordings_root() -> PathBuf {
    PathBuf::from("./recordings")
}

fn default_session_path() -> PathBuf {
    PathBuf::from("./session.json")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Typed, validated representation of the on-disk JSON configuration (§3).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub target_channels: BTreeSet<String>,

    #[serde(default = "default_poll_interval_sec")]
    pub poll_interval_sec: u64,

    #[serde(default = "default_stall_restart_sec")]
    pub stall_restart_sec: u64,

    #[serde(default = "default_on_start_previous")]
    pub on_start_previous: OnStartPrevious,

    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    #[serde(default = "default_session_refresh_hours")]
    pub session_refresh_hours: BTreeSet<u8>,

    #[serde(default = "default_quality")]
    pub quality: Quality,

    #[serde(default = "default_recordings_root")]
    pub recordings_root: PathBuf,

    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Load and validate a config file. An empty `targetChannels` or an unreadable or
    /// malformed file is `ConfigFatal`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("reading {}: {e}", path.display())))?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|e| AppError::config(format!("parsing {}: {e}", path.display())))?;

        if config.target_channels.is_empty() {
            return Err(AppError::config("targetChannels must not be empty"));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"targetChannels": ["c1", "c2"]}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.target_channels.len(), 2);
        assert_eq!(config.poll_interval_sec, 30);
        assert_eq!(config.stall_restart_sec, 180);
        assert_eq!(config.session_refresh_hours, [6, 18].into_iter().collect());
        assert_eq!(config.quality, Quality::Best);
        assert_eq!(config.on_start_previous, OnStartPrevious::Keep);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn empty_target_channels_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"targetChannels": []}"#).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = Config::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn malformed_json_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn overrides_are_honored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "targetChannels": ["c1"],
                "pollIntervalSec": 10,
                "quality": "prefer1080",
                "onStartPrevious": "archive",
                "logLevel": "debug"
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.poll_interval_sec, 10);
        assert_eq!(config.quality, Quality::Prefer1080);
        assert_eq!(config.on_start_previous, OnStartPrevious::Archive);
        assert_eq!(config.log_level, "debug");
    }
}
