//! Error type shared by every runner component.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for box loading, configuration and command execution.
#[derive(Error, Debug)]
pub enum Error {
    /// A file could not be read or written.
    #[error("cannot access '{}': {source}", path.display())]
    Io {
        /// The path that was being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A YAML document failed to parse or did not match the expected shape.
    #[error("invalid YAML in '{}': {source}", path.display())]
    Yaml {
        /// Document path (or a pseudo-path such as `<string>`).
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_yaml::Error,
    },

    /// Configuration is structurally valid YAML but semantically wrong.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// One or more validation rules failed.
    #[error("validation failed: {}", issues.join("; "))]
    Validation {
        /// Human-readable problems, one per rule violation.
        issues: Vec<String>,
    },

    /// A required file or directory does not exist.
    #[error("{what} not found: {}", path.display())]
    NotFound {
        /// What was expected (e.g. "Dockerfile").
        what: String,
        /// Where it was expected.
        path: PathBuf,
    },

    /// An external command exited unsuccessfully.
    #[error("command failed ({status}): {command}\n{stderr}")]
    CommandFailed {
        /// The command line as executed.
        command: String,
        /// Exit status description.
        status: String,
        /// Captured standard error (empty when streamed).
        stderr: String,
    },

    /// A command succeeded but produced output we did not expect.
    #[error("unexpected response from {target}: {output}")]
    UnexpectedResponse {
        /// Host or command that responded.
        target: String,
        /// What it said.
        output: String,
    },

    /// A named runner step failed.
    #[error("{step} failed: {source}")]
    Step {
        /// Step label (e.g. "push", "remote run").
        step: String,
        /// The error raised by the step.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Shorthand for [`Error::InvalidConfig`].
    pub fn config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::Io`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for [`Error::Yaml`].
    pub fn yaml(path: impl Into<PathBuf>, source: serde_yaml::Error) -> Self {
        Error::Yaml {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(what: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Error::NotFound {
            what: what.into(),
            path: path.into(),
        }
    }

    /// Wrap this error with the name of the runner step that raised it.
    pub fn in_step(self, step: impl Into<String>) -> Self {
        Error::Step {
            step: step.into(),
            source: Box::new(self),
        }
    }
}


/// Read a file to a string, mapping failures to [`Error::Io`].
pub fn read_to_string(path: &std::path::Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::io(path, e))
}
