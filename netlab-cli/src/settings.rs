//! Persistent user defaults, stored with confy.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use netlab_core::hosts::DEFAULT_HOSTS_FILE;
use netlab_core::netns::DEFAULT_NETNS_DIR;
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "netlab";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Container runtime binary; detected when unset.
    pub runtime: Option<String>,
    pub ip_binary: String,
    pub hosts_file: String,
    pub netns_dir: String,
    /// `0` runs every node and link at once.
    pub max_workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            runtime: None,
            ip_binary: "ip".to_string(),
            hosts_file: DEFAULT_HOSTS_FILE.to_string(),
            netns_dir: DEFAULT_NETNS_DIR.to_string(),
            max_workers: 0,
        }
    }
}

impl Settings {
    /// Load from the per-user config location, writing defaults on first use.
    pub fn load() -> Result<Self> {
        confy::load(APP_NAME, None).context("Failed to load netlab settings")
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        confy::load_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))
    }

    #[must_use]
    pub fn hosts_path(&self) -> PathBuf {
        expand_path(&self.hosts_file)
    }

    #[must_use]
    pub fn netns_path(&self) -> PathBuf {
        expand_path(&self.netns_dir)
    }
}

/// Expand `~` and environment variables; unresolvable input is kept as is.
#[must_use]
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(path),
    }
}
