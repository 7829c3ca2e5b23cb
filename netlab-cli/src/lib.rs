//! Command line front-end for netlab: the docker runtime, veth links,
//! settings and output formatting around `netlab-core`.

pub mod commands;
pub mod docker;
pub mod links;
pub mod prereq;
pub mod report;
pub mod settings;
