//! `/etc/hosts` entries for lab containers.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use snafu::{ResultExt, ensure};

use crate::error::{MissingBridgeNameSnafu, Result, WriteFileSnafu};
use crate::types::GenericContainer;

pub const DEFAULT_HOSTS_FILE: &str = "/etc/hosts";

/// One `address\tname` line per address family of every container that has
/// a name and populated network settings. An empty `bridge_name` is only an
/// error when there is something to emit.
pub fn hosts_entries(containers: &[GenericContainer], bridge_name: &str) -> Result<String> {
    let mut buf = String::new();
    for container in containers {
        let Some(name) = container.name() else {
            continue;
        };
        let settings = &container.network_settings;
        if !settings.set {
            continue;
        }
        if let Some(v4) = settings.ipv4 {
            let _ = writeln!(buf, "{}\t{name}", v4.addr);
        }
        if let Some(v6) = settings.ipv6 {
            let _ = writeln!(buf, "{}\t{name}", v6.addr);
        }
    }
    ensure!(buf.is_empty() || !bridge_name.is_empty(), MissingBridgeNameSnafu);
    Ok(buf)
}

/// Append the entries to `path`, preceded by a blank line. Nothing is
/// opened when there are no entries. Returns whether anything was written.
pub fn append_hosts_file(
    path: &Path,
    containers: &[GenericContainer],
    bridge_name: &str,
) -> Result<bool> {
    let data = hosts_entries(containers, bridge_name)?;
    if data.is_empty() {
        return Ok(false);
    }
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .context(WriteFileSnafu { path })?;
    file.write_all(b"\n")
        .and_then(|()| file.write_all(data.as_bytes()))
        .context(WriteFileSnafu { path })?;
    Ok(true)
}
