//! Host-side symlinks to container network namespaces, so `ip netns` style
//! tooling can enter a node by its container name.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use snafu::ResultExt;
use tracing::debug;

use crate::error::{NetnsSnafu, Result};

pub const DEFAULT_NETNS_DIR: &str = "/run/netns";

#[derive(Debug, Clone)]
pub struct NetnsLinker {
    dir: PathBuf,
}

impl Default for NetnsLinker {
    fn default() -> Self {
        Self::new(DEFAULT_NETNS_DIR)
    }
}

impl NetnsLinker {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn symlink_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Point `<dir>/<name>` at `ns_path`, replacing a stale link.
    pub fn link(&self, ns_path: &Path, name: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).context(NetnsSnafu { path: &self.dir })?;
        let link = self.symlink_path(name);
        self.unlink(name)?;
        debug!(link = %link.display(), target = %ns_path.display(), "linking netns");
        symlink(ns_path, &link).context(NetnsSnafu { path: link })
    }

    /// Remove `<dir>/<name>`. A missing link is not an error.
    pub fn unlink(&self, name: &str) -> Result<()> {
        let link = self.symlink_path(name);
        match fs::remove_file(&link) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e).context(NetnsSnafu { path: link }),
            _ => Ok(()),
        }
    }
}
