//! Global defaults stored in `config.json` under the platform data dir.

use crate::error::Result;
use crate::io::atomic_write;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_main_branch() -> String {
    "main".to_string()
}

fn default_max_concurrent() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Main branch assumed for newly initialised projects.
    #[serde(default = "default_main_branch")]
    pub default_main_branch: String,
    /// Concurrency cap for projects that don't set their own.
    #[serde(default = "default_max_concurrent")]
    pub default_max_concurrent: u32,
    /// Model handed to the planner CLI; `None` uses its default.
    #[serde(default)]
    pub planner_model: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_main_branch: default_main_branch(),
            default_max_concurrent: default_max_concurrent(),
            planner_model: None,
        }
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        atomic_write(path, raw.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.default_main_branch, "main");
        assert_eq!(config.default_max_concurrent, 2);
        assert!(config.planner_model.is_none());
    }

    #[test]
    fn roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let config = Config {
            default_main_branch: "trunk".into(),
            default_max_concurrent: 4,
            planner_model: Some("claude-sonnet-4-6".into()),
        };
        config.save(&path).unwrap();
        let back = Config::load(&path).unwrap();
        assert_eq!(back.default_main_branch, "trunk");
        assert_eq!(back.default_max_concurrent, 4);
        assert_eq!(back.planner_model.as_deref(), Some("claude-sonnet-4-6"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"default_max_concurrent": 8}"#).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.default_max_concurrent, 8);
        assert_eq!(config.default_main_branch, "main");
    }
}
