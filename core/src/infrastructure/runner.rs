//! Command runner abstraction for executing shell commands.
//!
//! `CommandRunner` is the seam every runner goes through to touch the outside
//! world (ssh, rsync, docker). `ShellRunner` is the production implementation
//! that spawns `sh -c`, `DryRunner` only logs, and `MockRunner` is the test
//! double that records calls and returns preset responses.

use std::process::{Command, Stdio};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// Trait for executing shell command strings.
pub trait CommandRunner: Send {
    /// Run `cmd` through the shell and return its standard output.
    fn run(&self, cmd: &str) -> Result<String>;

    /// Run `cmd` and always return its standard output, even on runners
    /// that normally stream it to the terminal.
    fn capture(&self, cmd: &str) -> Result<String> {
        self.run(cmd)
    }
}

/// Production runner that spawns `sh -c <cmd>`.
///
/// With `streaming` set, the child inherits stdout/stderr so long-running
/// builds and transfers show progress; the returned output is then empty.
#[derive(Debug, Default, Clone)]
pub struct ShellRunner {
    pub streaming: bool,
}

impl ShellRunner {
    pub fn new(streaming: bool) -> Self {
        ShellRunner { streaming }
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, cmd: &str) -> Result<String> {
        if !self.streaming {
            return self.capture(cmd);
        }
        tracing::info!(command = %cmd, "exec");
        let status = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| spawn_failed(cmd, e))?;
        if status.success() {
            Ok(String::new())
        } else {
            Err(Error::CommandFailed {
                command: cmd.to_string(),
                status: status.to_string(),
                stderr: String::new(),
            })
        }
    }

    fn capture(&self, cmd: &str) -> Result<String> {
        tracing::info!(command = %cmd, "exec");
        let output = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .output()
            .map_err(|e| spawn_failed(cmd, e))?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        tracing::debug!(status = %output.status, bytes = stdout.len(), "exec finished");
        if output.status.success() {
            Ok(stdout)
        } else {
            Err(Error::CommandFailed {
                command: cmd.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }
}

fn spawn_failed(cmd: &str, e: std::io::Error) -> Error {
    Error::CommandFailed {
        command: cmd.to_string(),
        status: "not started".to_string(),
        stderr: e.to_string(),
    }
}

/// Runner that logs each command instead of executing it.
///
/// Commands whose output is inspected (the ssh health probe) get the answer
/// a healthy host would give.
#[derive(Debug, Default, Clone)]
pub struct DryRunner;

impl CommandRunner for DryRunner {
    fn run(&self, cmd: &str) -> Result<String> {
        tracing::info!(command = %cmd, "dry-run");
        println!("{}", cmd);
        if cmd.ends_with(" 'echo ok'") {
            Ok("ok\n".to_string())
        } else {
            Ok(String::new())
        }
    }
}

/// Test-double runner that records commands and returns pre-configured responses.
pub struct MockRunner {
    responses: Mutex<Vec<Result<String>>>,
    commands: Mutex<Vec<String>>,
}

impl MockRunner {
    /// Responses are returned in the given order; once exhausted every call
    /// returns `Ok("")`.
    pub fn with_responses(responses: Vec<Result<String>>) -> Self {
        let mut reversed = responses;
        reversed.reverse();
        MockRunner {
            responses: Mutex::new(reversed),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn new() -> Self {
        Self::with_responses(Vec::new())
    }

    pub fn executed_commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, cmd: &str) -> Result<String> {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(cmd.to_string());
        }
        match self.responses.lock() {
            Ok(mut responses) => responses.pop().unwrap_or_else(|| Ok(String::new())),
            Err(_) => Ok(String::new()),
        }
    }
}


/// Quote a word for `sh`. Words made only of safe characters pass through.
///
/// A leading `~` or `~/` stays unquoted so the shell still expands it to the
/// home directory; only the remainder is quoted.
pub fn shell_quote(word: &str) -> String {
    if word == "~" {
        return word.to_string();
    }
    if let Some(rest) = word.strip_prefix("~/") {
        if rest.is_empty() {
            return word.to_string();
        }
        return format!("~/{}", quote_plain(rest));
    }
    quote_plain(word)
}

fn quote_plain(word: &str) -> String {
    let safe = !word.is_empty()
        && word.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | ',' | '+' | '%')
        });
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Quote each word and join with spaces.
pub fn join_quoted<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| shell_quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}


/// Build a test error shaped like a failed command.
#[cfg(test)]
pub fn failed(stderr: &str) -> Error {
    Error::CommandFailed {
        command: "mock".into(),
        status: "exit status: 1".into(),
        stderr: stderr.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_runner_records_commands() {
        let runner = MockRunner::with_responses(vec![Ok("ok".into()), Ok("ok2".into())]);
        assert!(runner.run("echo hello").is_ok());
        assert!(runner.run("echo world").is_ok());
        let cmds = runner.executed_commands();
        assert_eq!(cmds, vec!["echo hello".to_string(), "echo world".to_string()]);
    }

    #[test]
    fn mock_runner_returns_responses_in_order() {
        let runner = MockRunner::with_responses(vec![
            Ok("first".into()),
            Err(failed("fail")),
            Ok("third".into()),
        ]);
        assert_eq!(runner.run("cmd1").unwrap(), "first");
        assert!(runner.run("cmd2").is_err());
        assert_eq!(runner.run("cmd3").unwrap(), "third");
    }

    #[test]
    fn mock_runner_defaults_to_empty_ok() {
        let runner = MockRunner::new();
        assert_eq!(runner.run("anything").unwrap(), "");
    }

    #[test]
    fn shell_runner_captures_stdout() {
        let runner = ShellRunner::new(false);
        assert_eq!(runner.run("echo hi").unwrap(), "hi\n");
    }

    #[test]
    fn streaming_runner_still_captures_on_request() {
        let runner = ShellRunner::new(true);
        assert_eq!(runner.capture("echo ok").unwrap(), "ok\n");
    }

    #[test]
    fn shell_runner_reports_failure() {
        let runner = ShellRunner::new(false);
        match runner.run("echo oops >&2; exit 3").unwrap_err() {
            Error::CommandFailed { stderr, status, .. } => {
                assert_eq!(stderr, "oops\n");
                assert!(status.contains('3'));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn dry_runner_answers_health_probe() {
        let runner = DryRunner;
        assert_eq!(runner.run("ssh -p 22 u@h 'echo ok'").unwrap(), "ok\n");
        assert_eq!(runner.run("docker build .").unwrap(), "");
    }

    #[test]
    fn quote_passes_safe_words() {
        assert_eq!(shell_quote("/data/box-1/run.yaml"), "/data/box-1/run.yaml");
        assert_eq!(shell_quote("--volume=/a:/b"), "--volume=/a:/b");
    }

    #[test]
    fn quote_wraps_unsafe_words() {
        assert_eq!(shell_quote("my dir"), "'my dir'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$HOME"), "'$HOME'");
    }

    #[test]
    fn quote_keeps_home_prefix_expandable() {
        assert_eq!(shell_quote("~"), "~");
        assert_eq!(shell_quote("~/"), "~/");
        assert_eq!(shell_quote("~/.virtualenvs/mlbox"), "~/.virtualenvs/mlbox");
        assert_eq!(shell_quote("~/my boxes"), "~/'my boxes'");
        assert_eq!(shell_quote("~other/x"), "'~other/x'");
        assert_eq!(shell_quote("/a/~/b"), "'/a/~/b'");
    }

    #[test]
    fn quoted_home_path_expands_in_shell() {
        let home = tempfile::tempdir().unwrap();
        let cmd = format!(
            "export HOME={} && mkdir -p {}",
            shell_quote(&home.path().to_string_lossy()),
            shell_quote("~/venvs/my env")
        );
        ShellRunner::new(false).run(&cmd).unwrap();
        assert!(home.path().join("venvs/my env").is_dir());
        assert!(!home.path().join("~").exists());
    }

    #[test]
    fn join_quoted_mixes() {
        assert_eq!(join_quoted(&["ls", "a b"]), "ls 'a b'");
    }
}
