//! Configuration management for the control hub
//!
//! Handles loading, parsing, and hot-reloading of YAML configuration files.
//! Every section has defaults, so an empty file is a valid configuration.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::fs;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

/// Engine timing parameters (reloadable)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Trigger clock period
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_redraw_debounce")]
    pub redraw_debounce_ms: u64,
    /// Bound on internal actions drained per call
    #[serde(default = "default_max_deferred")]
    pub max_deferred_iterations: usize,
}

/// Grid dimensions (read at startup only)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GridConfig {
    #[serde(default = "default_pages")]
    pub pages: u32,
    #[serde(default = "default_rows")]
    pub rows: u32,
    #[serde(default = "default_columns")]
    pub columns: u32,
    /// Buttons per row in legacy bank numbering
    #[serde(default = "default_columns")]
    pub legacy_columns: u32,
}

/// Control store location and write debounce
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_store_debounce")]
    pub debounce_ms: u64,
}

/// A console connection to register at startup
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ConnectionConfig {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Feedback definitions reported as advanced
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advanced_feedbacks: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            redraw_debounce_ms: default_redraw_debounce(),
            max_deferred_iterations: default_max_deferred(),
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            pages: default_pages(),
            rows: default_rows(),
            columns: default_columns(),
            legacy_columns: default_columns(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            debounce_ms: default_store_debounce(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        Ok(config)
    }

    /// Parse and validate YAML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = if contents.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.engine.tick_interval_ms == 0 {
            anyhow::bail!("engine.tick_interval_ms must be greater than 0");
        }
        if self.engine.max_deferred_iterations == 0 {
            anyhow::bail!("engine.max_deferred_iterations must be greater than 0");
        }

        let grid = &self.grid;
        if grid.pages == 0 || grid.rows == 0 || grid.columns == 0 {
            anyhow::bail!(
                "Grid dimensions must be non-zero (pages={}, rows={}, columns={})",
                grid.pages,
                grid.rows,
                grid.columns
            );
        }
        if grid.legacy_columns == 0 {
            anyhow::bail!("grid.legacy_columns must be greater than 0");
        }

        if self.persistence.db_path.is_empty() {
            anyhow::bail!("persistence.db_path cannot be empty");
        }

        let mut seen = HashSet::new();
        for (idx, connection) in self.connections.iter().enumerate() {
            if connection.id.is_empty() {
                anyhow::bail!("Connection {} id cannot be empty", idx);
            }
            if connection.id == crate::model::INTERNAL_CONNECTION {
                anyhow::bail!("Connection id '{}' is reserved", connection.id);
            }
            if !seen.insert(connection.id.as_str()) {
                anyhow::bail!("Duplicate connection id '{}'", connection.id);
            }
        }

        Ok(())
    }
}

// Default value functions
fn default_tick_interval() -> u64 { 1000 }
fn default_redraw_debounce() -> u64 { 20 }
fn default_max_deferred() -> usize { 1000 }
fn default_pages() -> u32 { 99 }
fn default_rows() -> u32 { 4 }
fn default_columns() -> u32 { 8 }
fn default_store_debounce() -> u64 { crate::persistence::DEFAULT_DEBOUNCE_MS }

fn default_db_path() -> String {
    dirs::data_local_dir()
        .map(|dir| dir.join("control-hub").join("controls.sled"))
        .and_then(|path| path.to_str().map(str::to_string))
        .unwrap_or_else(|| "./data/controls.sled".to_string())
}
