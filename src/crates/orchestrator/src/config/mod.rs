//! Server configuration.
//!
//! Loaded from `adforge-server.toml` (path overridable via `CONFIG_PATH`)
//! with environment-variable overrides for deployment knobs.

use domain::Phase;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file path.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "adforge.db".to_string(),
        }
    }
}

/// Blob storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the local blob store.
    pub blob_root: PathBuf,
    /// Scratch directory for FFmpeg work.
    pub work_dir: PathBuf,
    /// Secret key for signing time-limited read URLs.
    pub signing_key: String,
    /// Base URL prefix signed URLs are issued under.
    pub public_base_url: String,
    /// Signed URL lifetime in seconds.
    #[serde(default = "default_url_ttl_s")]
    pub url_ttl_s: u64,
}

fn default_url_ttl_s() -> u64 {
    3_600
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_root: PathBuf::from("blobs"),
            work_dir: PathBuf::from("work"),
            signing_key: "dev-signing-key".to_string(),
            public_base_url: "http://127.0.0.1:8080/blobs".to_string(),
            url_ttl_s: default_url_ttl_s(),
        }
    }
}

/// Stage execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Wall-clock budget per phase, seconds, keyed 1..4.
    #[serde(default = "default_phase_budgets_s")]
    pub phase_budgets_s: [u64; 4],
    /// Fan-out cap for storyboard image generation.
    #[serde(default = "default_storyboard_fanout")]
    pub storyboard_fanout: usize,
    /// Fan-out cap across chunk groups.
    #[serde(default = "default_chunk_group_fanout")]
    pub chunk_group_fanout: usize,
    /// Fall back to a music-less final video when music generation fails.
    #[serde(default = "default_music_fallback")]
    pub music_fallback: bool,
    /// Per-job provider spend cap, USD.
    #[serde(default = "default_spend_cap_usd")]
    pub spend_cap_usd: f64,
    /// Worker pool size for stage tasks.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

fn default_phase_budgets_s() -> [u64; 4] {
    [120, 600, 1_800, 600]
}

fn default_storyboard_fanout() -> usize {
    8
}

fn default_chunk_group_fanout() -> usize {
    4
}

fn default_music_fallback() -> bool {
    true
}

fn default_spend_cap_usd() -> f64 {
    25.0
}

fn default_worker_count() -> usize {
    4
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            phase_budgets_s: default_phase_budgets_s(),
            storyboard_fanout: default_storyboard_fanout(),
            chunk_group_fanout: default_chunk_group_fanout(),
            music_fallback: default_music_fallback(),
            spend_cap_usd: default_spend_cap_usd(),
            worker_count: default_worker_count(),
        }
    }
}

impl StageConfig {
    /// Wall-clock budget for a phase.
    pub fn phase_budget(&self, phase: Phase) -> Duration {
        Duration::from_secs(self.phase_budgets_s[(phase.number() - 1) as usize])
    }
}

/// Garbage collection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcConfig {
    /// Sweep interval, seconds.
    #[serde(default = "default_gc_interval_s")]
    pub interval_s: u64,
    /// Minimum idle time before a dead job's blobs are collected, seconds.
    #[serde(default = "default_gc_idle_s")]
    pub idle_threshold_s: u64,
}

fn default_gc_interval_s() -> u64 {
    900
}

fn default_gc_idle_s() -> u64 {
    3_600
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval_s: default_gc_interval_s(),
            idle_threshold_s: default_gc_idle_s(),
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub stage: StageConfig,
    #[serde(default)]
    pub gc: GcConfig,
}

impl ServerConfig {
    /// Load from `CONFIG_PATH` or `adforge-server.toml`; missing file means
    /// defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "adforge-server.toml".into());
        Self::load_from(Path::new(&path))
    }

    /// Load from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// SQLite connection string.
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.database.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_spec_budgets() {
        let config = ServerConfig::default();
        assert_eq!(config.stage.phase_budget(Phase::Plan), Duration::from_secs(120));
        assert_eq!(config.stage.phase_budget(Phase::Chunks), Duration::from_secs(1_800));
        assert_eq!(config.stage.storyboard_fanout, 8);
        assert_eq!(config.stage.chunk_group_fanout, 4);
        assert!(config.stage.music_fallback);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = ServerConfig::load_from(Path::new("/nonexistent/adforge.toml")).unwrap();
        assert_eq!(config.database.path, "adforge.db");
    }

    #[test]
    fn test_partial_toml_overrides() {
        let parsed: ServerConfig = toml::from_str(
            r#"
            [stage]
            storyboard_fanout = 2
            spend_cap_usd = 5.0
            "#,
        )
        .unwrap();
        assert_eq!(parsed.stage.storyboard_fanout, 2);
        assert_eq!(parsed.stage.spend_cap_usd, 5.0);
        assert_eq!(parsed.stage.chunk_group_fanout, 4);
    }
}
