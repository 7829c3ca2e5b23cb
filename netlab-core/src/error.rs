//! Error type shared by every netlab-core module.

use std::path::PathBuf;

use snafu::Snafu;

/// Result alias used across netlab-core.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("unknown node kind '{kind}'"))]
    UnknownKind { kind: String },

    #[snafu(display("node '{node}' is missing required field '{field}'"))]
    MissingField { node: String, field: &'static str },

    #[snafu(display("invalid MAC address '{value}'"))]
    InvalidMac { value: String },

    #[snafu(display("invalid address '{value}': {reason}"))]
    InvalidAddress { value: String, reason: String },

    #[snafu(display("invalid topology: {message}"))]
    Topology { message: String },

    #[snafu(display("failed to read topology file {}", path.display()))]
    ReadTopology {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse topology file {}", path.display()))]
    ParseTopology {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display("path exists but is not a directory: {}", path.display()))]
    NotADirectory { path: PathBuf },

    #[snafu(display("failed to create directory {}", path.display()))]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to remove directory {}", path.display()))]
    RemoveDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to read {}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to write {}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to render configuration for node '{node}'"))]
    Render { node: String, source: tera::Error },

    #[snafu(display("failed to update netns symlink {}", path.display()))]
    Netns {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A container engine call failed.
    #[snafu(
        display("runtime {action} failed for '{target}': {message}"),
        visibility(pub)
    )]
    Runtime {
        action: &'static str,
        target: String,
        message: String,
    },

    /// Virtual wire creation failed.
    #[snafu(display("failed to create link {link}: {message}"), visibility(pub))]
    Link { link: String, message: String },

    #[snafu(display("no containers found for lab '{lab}'"))]
    NoContainers { lab: String },

    #[snafu(display("missing bridge name"))]
    MissingBridgeName,

    #[snafu(display("deployment cancelled"))]
    Cancelled,

    #[snafu(display("worker task failed"))]
    Join { source: tokio::task::JoinError },
}
