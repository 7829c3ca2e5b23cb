//! Host prerequisite checks run before a deployment.
//!
//! Deploying needs root (netns symlinks, veth pairs, `/etc/hosts`), a
//! container runtime and iproute2.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{Result, bail};

/// Result of looking up a single binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryCheck {
    pub name: String,
    pub path: Option<PathBuf>,
}

impl BinaryCheck {
    #[must_use]
    pub fn found(&self) -> bool {
        self.path.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrereqResult {
    pub is_root: bool,
    pub binaries: Vec<BinaryCheck>,
}

impl PrereqResult {
    #[must_use]
    pub fn missing(&self) -> Vec<&BinaryCheck> {
        self.binaries.iter().filter(|b| !b.found()).collect()
    }

    #[must_use]
    pub fn all_met(&self) -> bool {
        self.is_root && self.missing().is_empty()
    }
}

/// Check if binary exists in PATH
pub fn find_binary(name: &str) -> Option<PathBuf> {
    Command::new("which")
        .arg(name)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| PathBuf::from(s.trim()))
        .filter(|p| !p.as_os_str().is_empty())
}

/// Effective uid from the `Uid:` line of `/proc/<pid>/status`, which lists
/// real, effective, saved and filesystem uids.
fn effective_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|uids| uids.split_whitespace().nth(1))
        .and_then(|uid| uid.parse().ok())
}

#[must_use]
pub fn is_root() -> bool {
    fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| effective_uid(&status))
        == Some(0)
}

/// Pick docker if available, podman otherwise.
pub fn detect_runtime() -> Result<String> {
    for candidate in ["docker", "podman"] {
        if find_binary(candidate).is_some() {
            return Ok(candidate.to_string());
        }
    }
    bail!("Neither docker nor podman available")
}

pub fn check_prerequisites(binaries: &[&str]) -> PrereqResult {
    PrereqResult {
        is_root: is_root(),
        binaries: binaries
            .iter()
            .map(|name| BinaryCheck {
                name: (*name).to_string(),
                path: find_binary(name),
            })
            .collect(),
    }
}

pub fn print_prereq_report(result: &PrereqResult) {
    if result.is_root {
        println!("  ✅ running as root");
    } else {
        println!("  ❌ not running as root");
    }
    for bin in &result.binaries {
        match &bin.path {
            Some(path) => println!("  ✅ {} ({})", bin.name, path.display()),
            None => println!("  ❌ {} not found in PATH", bin.name),
        }
    }
}
