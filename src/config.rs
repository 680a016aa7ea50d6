//! Configuration Management
//!
//! Handles persistent configuration storage for azinfo.

use crate::azure::{DEFAULT_AZ_PATH, DEFAULT_TIMEOUT};
use crate::resource::{QueryErrorPolicy, ResolveOptions, DEFAULT_CONCURRENCY};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Azure CLI program to run
    #[serde(default)]
    pub az_path: Option<String>,
    /// Per-query timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Maximum queries in flight
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Failure handling for nested queries
    #[serde(default)]
    pub on_query_error: Option<QueryErrorPolicy>,
    /// Expand nested references when resolving `all`
    #[serde(default)]
    pub expand_wildcard: Option<bool>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("azinfo").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Load configuration from a specific file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config {:?}: {}", path, e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;

        Ok(())
    }

    /// Get effective Azure CLI program (CLI > config > default)
    pub fn effective_az_path(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.az_path.clone())
            .unwrap_or_else(|| DEFAULT_AZ_PATH.to_string())
    }

    /// Get effective query timeout (CLI > config > default)
    pub fn effective_timeout(&self, cli_secs: Option<u64>) -> Duration {
        cli_secs
            .or(self.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Get effective resolver options (CLI > config > default)
    pub fn effective_options(
        &self,
        concurrency: Option<usize>,
        on_query_error: Option<QueryErrorPolicy>,
        shallow_all: bool,
    ) -> ResolveOptions {
        let expand_wildcard = if shallow_all {
            false
        } else {
            self.expand_wildcard.unwrap_or(true)
        };

        ResolveOptions {
            concurrency: concurrency
                .or(self.concurrency)
                .unwrap_or(DEFAULT_CONCURRENCY)
                .max(1),
            on_query_error: on_query_error.or(self.on_query_error).unwrap_or_default(),
            expand_wildcard,
        }
    }
}
