//! Infrastructure backends for external commands.
//!
//! Everything that spawns a process goes through [`runner::CommandRunner`];
//! the rest of the crate only builds command strings.

pub mod runner;

pub use runner::{join_quoted, shell_quote, CommandRunner, DryRunner, MockRunner, ShellRunner};
