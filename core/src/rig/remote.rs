//! Remote command execution.
//!
//! `RemoteExecutor` records commands run on a remote host via SSH and builds
//! the ssh argument vectors. Like the rest of the rig, it never spawns
//! processes; the caller executes the command and reports the result back.

use serde::{Deserialize, Serialize};

use super::config::RemoteConfig;


// ---------------------------------------------------------------------------
// ExecStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a remote command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecStatus {
    Queued,
    Running,
    /// Finished with a zero exit status.
    Completed,
    /// ssh or the remote command reported failure.
    Failed,
}


// ---------------------------------------------------------------------------
// RemoteExecution
// ---------------------------------------------------------------------------

/// A single remote command execution and its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteExecution {
    pub id: String,
    /// Name of the remote host.
    pub remote: String,
    /// Short label for logs (e.g. "configure", "remote run").
    pub label: String,
    /// The shell command executed by the remote login shell.
    pub command: String,
    pub status: ExecStatus,
    pub started_ms: Option<u64>,
    pub completed_ms: Option<u64>,
    /// Captured standard output (empty when streamed).
    pub stdout: Option<String>,
    /// Failure description.
    pub error: Option<String>,
}


// ---------------------------------------------------------------------------
// RemoteExecutor
// ---------------------------------------------------------------------------

/// Records remote executions in the order they were issued.
pub struct RemoteExecutor {
    executions: Vec<RemoteExecution>,
    next_id: u64,
}

impl RemoteExecutor {
    pub fn new() -> Self {
        RemoteExecutor {
            executions: Vec::new(),
            next_id: 1,
        }
    }

    /// Queue a command for execution on a remote. Returns the execution ID.
    pub fn queue(&mut self, remote: &str, label: &str, command: &str) -> String {
        let id = format!("exec-{}", self.next_id);
        self.next_id += 1;
        self.executions.push(RemoteExecution {
            id: id.clone(),
            remote: remote.to_string(),
            label: label.to_string(),
            command: command.to_string(),
            status: ExecStatus::Queued,
            started_ms: None,
            completed_ms: None,
            stdout: None,
            error: None,
        });
        id
    }

    /// Move a queued execution to `Running`.
    pub fn start(&mut self, exec_id: &str, now_ms: u64) -> Result<&RemoteExecution, String> {
        let exec = self.find_mut(exec_id, ExecStatus::Queued)?;
        exec.status = ExecStatus::Running;
        exec.started_ms = Some(now_ms);
        Ok(exec)
    }

    /// Record that a running execution completed successfully.
    pub fn complete(&mut self, exec_id: &str, stdout: &str, now_ms: u64) -> Result<(), String> {
        let exec = self.find_mut(exec_id, ExecStatus::Running)?;
        exec.status = ExecStatus::Completed;
        exec.completed_ms = Some(now_ms);
        exec.stdout = Some(stdout.to_string());
        Ok(())
    }

    /// Record that a running execution failed.
    pub fn fail(&mut self, exec_id: &str, error: &str, now_ms: u64) -> Result<(), String> {
        let exec = self.find_mut(exec_id, ExecStatus::Running)?;
        exec.status = ExecStatus::Failed;
        exec.completed_ms = Some(now_ms);
        exec.error = Some(error.to_string());
        Ok(())
    }

    fn find_mut(&mut self, exec_id: &str, expected: ExecStatus) -> Result<&mut RemoteExecution, String> {
        let exec = self
            .executions
            .iter_mut()
            .find(|e| e.id == exec_id)
            .ok_or_else(|| format!("execution '{}' not found", exec_id))?;
        if exec.status != expected {
            return Err(format!(
                "execution '{}' is {:?}, expected {:?}",
                exec_id, exec.status, expected
            ));
        }
        Ok(exec)
    }

    /// All executions, oldest first.
    pub fn history(&self) -> &[RemoteExecution] {
        &self.executions
    }

    /// Build the SSH command argument vector for an execution.
    ///
    /// The remote command is the last element, as a single argument, so the
    /// remote shell handles `&&`, redirects and variable expansion.
    pub fn build_ssh_command(&self, exec: &RemoteExecution, config: &RemoteConfig) -> Vec<String> {
        let mut args = config.ssh_base_args();
        args.push(exec.command.clone());
        args
    }
}

impl Default for RemoteExecutor {
    fn default() -> Self {
        Self::new()
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
impl RemoteExecutor {
    fn get(&self, exec_id: &str) -> Option<&RemoteExecution> {
        self.executions.iter().find(|e| e.id == exec_id)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::config::test_remote;

    #[test]
    fn queue_returns_unique_ids() {
        let mut executor = RemoteExecutor::new();
        let id1 = executor.queue("r1", "probe", "echo hello");
        let id2 = executor.queue("r1", "probe", "echo world");
        assert_ne!(id1, id2);
        assert_eq!(executor.history().len(), 2);
    }

    #[test]
    fn default_executor_starts_ids_at_one() {
        let mut executor = RemoteExecutor::default();
        assert_eq!(executor.queue("r1", "x", "true"), "exec-1");
        assert_eq!(executor.queue("r1", "x", "true"), "exec-2");
    }

    #[test]
    fn start_then_complete() {
        let mut executor = RemoteExecutor::new();
        let id = executor.queue("r1", "probe", "echo hi");
        let started = executor.start(&id, 1000).unwrap();
        assert_eq!(started.status, ExecStatus::Running);
        executor.complete(&id, "hi\n", 2000).unwrap();

        let exec = executor.get(&id).unwrap();
        assert_eq!(exec.status, ExecStatus::Completed);
        assert_eq!(exec.stdout.as_deref(), Some("hi\n"));
        assert_eq!(exec.started_ms, Some(1000));
        assert_eq!(exec.completed_ms, Some(2000));
    }

    #[test]
    fn fail_records_error() {
        let mut executor = RemoteExecutor::new();
        let id = executor.queue("r1", "remote run", "docker run x");
        executor.start(&id, 1000).unwrap();
        executor.fail(&id, "SSH connection lost", 1500).unwrap();
        let exec = executor.get(&id).unwrap();
        assert_eq!(exec.status, ExecStatus::Failed);
        assert_eq!(exec.error.as_deref(), Some("SSH connection lost"));
    }

    #[test]
    fn transitions_are_checked() {
        let mut executor = RemoteExecutor::new();
        let id = executor.queue("r1", "probe", "true");
        assert!(executor.complete(&id, "", 10).is_err());
        executor.start(&id, 10).unwrap();
        assert!(executor.start(&id, 20).is_err());
        assert!(executor.start("nope", 0).is_err());
    }

    #[test]
    fn build_ssh_command_puts_command_last() {
        let mut executor = RemoteExecutor::new();
        let id = executor.queue(
            "r1",
            "remote run",
            "cd /data/box && python3 -m runner run --mlbox=. 2>&1",
        );
        let exec = executor.get(&id).unwrap().clone();
        let args = executor.build_ssh_command(&exec, &test_remote());
        assert!(args.contains(&"ubuntu@10.0.0.1".to_string()));
        assert_eq!(
            args.last().unwrap(),
            "cd /data/box && python3 -m runner run --mlbox=. 2>&1"
        );
    }
}
