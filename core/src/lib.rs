//! MLBox runner core.
//!
//! Box layout and metadata, platform and runner configuration, and the two
//! runners that execute a box: locally under docker, or on a remote host
//! driven over SSH with rsync transfers. All external commands go through
//! [`infrastructure::CommandRunner`].

pub mod error;
pub mod hparams;
pub mod infrastructure;
pub mod logging;
pub mod merge;
pub mod mlbox;
pub mod platform;
pub mod rig;
pub mod runner_config;
pub mod runners;
pub mod settings;
pub mod template;

pub use error::{Error, Result};
