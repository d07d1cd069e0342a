//! Host configuration file: engine settings plus logging.

use anyhow::{Context, Result};
use rttprof_core::ProfilerConfig;
use rttprof_observability::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(flatten)]
    pub profiler: ProfilerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl HostConfig {
    /// Load from `path`, or fall back to defaults when no file is given.
    /// Files ending in `.json` are parsed as JSON, anything else as YAML.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file '{}'", path.display()))?;
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let config = if is_json {
            serde_json::from_str(&text)
                .with_context(|| format!("invalid JSON config '{}'", path.display()))?
        } else {
            serde_yaml::from_str(&text)
                .with_context(|| format!("invalid YAML config '{}'", path.display()))?
        };
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rttprof_core::ByteOrder;

    #[test]
    fn missing_path_means_defaults() {
        assert_eq!(HostConfig::load(None).unwrap(), HostConfig::default());
    }

    #[test]
    fn yaml_mixes_engine_and_log_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.yaml");
        std::fs::write(
            &path,
            "byte_order: big\nread_chunk_size: 64\nlog:\n  level: debug\n",
        )
        .unwrap();

        let cfg = HostConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.profiler.byte_order, ByteOrder::Big);
        assert_eq!(cfg.profiler.read_chunk_size, 64);
        assert_eq!(cfg.profiler.read_period_ms, 50);
        assert_eq!(cfg.log.level, "debug");
    }

    #[test]
    fn json_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.json");
        std::fs::write(&path, r#"{"timestamp_raw_max": 65536}"#).unwrap();
        let cfg = HostConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.profiler.timestamp_raw_max, 65536);
    }

    #[test]
    fn unreadable_file_names_the_path() {
        let err = HostConfig::load(Some(Path::new("/nonexistent/host.yaml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/host.yaml"));
    }
}
