//! Cache configuration
//!
//! Read-only JSON; missing keys fall back to defaults. CLI flags override
//! single keys after loading.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::cache_man::CacheManager;

/// Environment variable naming a config file when `--config` is absent
pub const CONFIG_ENV: &str = "PRECACHE_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Byte budget of the frame store; 0 = derive from system memory
    pub max_cache_bytes: usize,
    pub lookahead_frames: usize,
    pub lookbehind_frames: usize,
    /// Playhead movement that triggers a recompute during playback
    pub recompute_threshold_frames: usize,
    pub rate_interval_ms: u64,
    /// Share of available memory used when `max_cache_bytes` is 0
    pub memory_fraction: f64,
    /// Memory always left to the system (GB) when `max_cache_bytes` is 0
    pub memory_reserve_gb: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_bytes: 512 * 1024 * 1024,
            lookahead_frames: 50,
            lookbehind_frames: 10,
            recompute_threshold_frames: 8,
            rate_interval_ms: 1000,
            memory_fraction: 0.5,
            memory_reserve_gb: 2.0,
        }
    }
}

impl CacheConfig {
    /// Load from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        log::info!("Loaded cache config from {}", path.display());
        Ok(config)
    }

    /// Load from `path`, else from `$PRECACHE_CONFIG`, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));
        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Effective byte budget
    pub fn budget_bytes(&self) -> usize {
        if self.max_cache_bytes > 0 {
            self.max_cache_bytes
        } else {
            CacheManager::memory_budget(self.memory_fraction, self.memory_reserve_gb)
        }
    }

    pub fn rate_interval(&self) -> Duration {
        Duration::from_millis(self.rate_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_keys_use_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_cache_bytes": 1000, "lookahead_frames": 5 }}"#).unwrap();

        let config = CacheConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_cache_bytes, 1000);
        assert_eq!(config.lookahead_frames, 5);
        assert_eq!(config.lookbehind_frames, CacheConfig::default().lookbehind_frames);
        assert_eq!(config.budget_bytes(), 1000);
    }

    #[test]
    fn test_bad_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = CacheConfig::from_file(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));

        let missing = CacheConfig::from_file(Path::new("/nonexistent/precache.json")).unwrap_err();
        assert!(missing.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_budget_from_memory() {
        let config = CacheConfig {
            max_cache_bytes: 0,
            memory_fraction: 1.0,
            memory_reserve_gb: 0.0,
            ..Default::default()
        };
        assert!(config.budget_bytes() > 0);
        assert_eq!(CacheConfig::default().rate_interval(), Duration::from_secs(1));
    }
}
