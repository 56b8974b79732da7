//! Layered configuration: built-in defaults, an optional JSON file, then
//! environment overrides — the CLI layer on top is handled by `clap` in
//! `cli.rs` and wins last via explicit flags.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_ROW_CAP;
use crate::error::BridgeError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub row_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self { log_level: "info".to_string(), row_cap: DEFAULT_ROW_CAP }
    }
}

impl Config {
    /// Apply layers in order: defaults, optional JSON file, environment.
    pub fn load(file_path: Option<&Path>) -> Result<Self, BridgeError> {
        let mut cfg = Config::default();

        if let Some(path) = file_path {
            if path.exists() {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| BridgeError::Unexpected { kind: "config_read".into(), message: e.to_string() })?;
                cfg = serde_json::from_str(&text)
                    .map_err(|e| BridgeError::Unexpected { kind: "config_parse".into(), message: e.to_string() })?;
            }
        }

        if let Ok(level) = std::env::var("FM_BRIDGE_LOG") {
            cfg.log_level = level;
        }
        if let Ok(cap) = std::env::var("FM_BRIDGE_ROW_CAP") {
            if let Ok(n) = cap.parse() {
                cfg.row_cap = n;
            }
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.row_cap, DEFAULT_ROW_CAP);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = Config::load(Some(Path::new("/nonexistent/fm-bridge.json"))).unwrap();
        assert_eq!(cfg.row_cap, DEFAULT_ROW_CAP);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("fm-bridge-cfg-test-{}", std::process::id()));
        std::fs::write(&dir, r#"{"log_level":"debug","row_cap":500}"#).unwrap();
        let cfg = Config::load(Some(&dir)).unwrap();
        std::fs::remove_file(&dir).ok();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.row_cap, 500);
    }
}
