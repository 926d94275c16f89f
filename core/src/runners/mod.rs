//! Runners that execute a box: locally under docker, or on a remote host
//! reached over SSH.

pub mod docker;
pub mod ssh;

pub use docker::{DockerRun, Mount};
pub use ssh::SshRun;
