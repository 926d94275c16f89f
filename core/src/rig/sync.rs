//! File synchronisation via rsync.
//!
//! `SyncManager` records push/pull jobs and tracks their lifecycle. Jobs run
//! strictly one at a time. It builds rsync argument vectors from job metadata
//! and `RemoteConfig` but never spawns processes; the caller executes them.

use serde::{Deserialize, Serialize};

use super::config::RemoteConfig;


// ---------------------------------------------------------------------------
// SyncDirection / SyncStatus
// ---------------------------------------------------------------------------

/// Whether a sync job pushes files to or pulls files from a remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncDirection {
    /// Local -> Remote.
    Push,
    /// Remote -> Local.
    Pull,
}

/// Lifecycle status of a sync job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Queued,
    Running,
    Completed,
    Failed,
}


// ---------------------------------------------------------------------------
// SyncJob
// ---------------------------------------------------------------------------

/// A single directory mirroring operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    /// Unique identifier for this job.
    pub id: String,
    /// Name of the remote host involved.
    pub remote: String,
    pub direction: SyncDirection,
    /// Local directory.
    pub local_path: String,
    /// Directory on the remote host.
    pub remote_path: String,
    /// Glob patterns to exclude from the transfer.
    pub exclude_patterns: Vec<String>,
    pub status: SyncStatus,
    /// Epoch-millisecond timestamp when the transfer started.
    pub started_ms: Option<u64>,
    /// Epoch-millisecond timestamp when the transfer finished.
    pub completed_ms: Option<u64>,
    /// Error message on failure.
    pub error: Option<String>,
}


// ---------------------------------------------------------------------------
// SyncManager
// ---------------------------------------------------------------------------

/// Sequential queue of sync jobs plus the rsync flags they share.
pub struct SyncManager {
    /// Completed and failed jobs.
    history: Vec<SyncJob>,
    /// Jobs waiting to start, oldest first.
    queue: Vec<SyncJob>,
    /// The job currently running, if any.
    active: Option<SyncJob>,
    /// rsync flags placed before the transport options (e.g. `-a -z`).
    flags: Vec<String>,
    /// Exclude patterns applied to every job.
    default_excludes: Vec<String>,
    next_id: u64,
}

impl SyncManager {
    pub fn new(flags: Vec<String>, default_excludes: Vec<String>) -> Self {
        SyncManager {
            history: Vec::new(),
            queue: Vec::new(),
            active: None,
            flags,
            default_excludes,
            next_id: 1,
        }
    }

    /// Add a pattern to the default exclude list.
    pub fn add_default_exclude(&mut self, pattern: &str) {
        if !self.default_excludes.iter().any(|p| p == pattern) {
            self.default_excludes.push(pattern.to_string());
        }
    }

    /// Queue a push (local -> remote) job. Returns the job ID.
    pub fn queue_push(&mut self, remote: &str, local: &str, remote_path: &str) -> String {
        self.enqueue(SyncDirection::Push, remote, local, remote_path)
    }

    /// Queue a pull (remote -> local) job. Returns the job ID.
    pub fn queue_pull(&mut self, remote: &str, remote_path: &str, local: &str) -> String {
        self.enqueue(SyncDirection::Pull, remote, local, remote_path)
    }

    fn enqueue(
        &mut self,
        direction: SyncDirection,
        remote: &str,
        local: &str,
        remote_path: &str,
    ) -> String {
        let id = format!("sync-{}", self.next_id);
        self.next_id += 1;
        self.queue.push(SyncJob {
            id: id.clone(),
            remote: remote.to_string(),
            direction,
            local_path: local.to_string(),
            remote_path: remote_path.to_string(),
            exclude_patterns: self.default_excludes.clone(),
            status: SyncStatus::Queued,
            started_ms: None,
            completed_ms: None,
            error: None,
        });
        id
    }

    /// Start the oldest queued job. Returns `None` if the queue is empty or
    /// another job is still running.
    pub fn start_next(&mut self, now_ms: u64) -> Option<&SyncJob> {
        if self.active.is_some() || self.queue.is_empty() {
            return None;
        }
        let mut job = self.queue.remove(0);
        job.status = SyncStatus::Running;
        job.started_ms = Some(now_ms);
        self.active = Some(job);
        self.active.as_ref()
    }

    /// Mark the running job as completed.
    pub fn complete(&mut self, job_id: &str, now_ms: u64) -> Result<(), String> {
        let mut job = self.take_active(job_id)?;
        job.status = SyncStatus::Completed;
        job.completed_ms = Some(now_ms);
        self.history.push(job);
        Ok(())
    }

    /// Mark the running job as failed.
    pub fn fail(&mut self, job_id: &str, error: &str, now_ms: u64) -> Result<(), String> {
        let mut job = self.take_active(job_id)?;
        job.status = SyncStatus::Failed;
        job.completed_ms = Some(now_ms);
        job.error = Some(error.to_string());
        self.history.push(job);
        Ok(())
    }

    fn take_active(&mut self, job_id: &str) -> Result<SyncJob, String> {
        match self.active.take() {
            Some(job) if job.id == job_id => Ok(job),
            other => {
                self.active = other;
                Err(format!("no active job '{}'", job_id))
            }
        }
    }

    /// Completed and failed jobs.
    pub fn history(&self) -> &[SyncJob] {
        &self.history
    }

    /// Build the rsync argument vector for a job.
    ///
    /// Both directions mirror directory *contents*: the source always ends
    /// with `/`, so the destination receives the files, not a nested copy.
    pub fn build_rsync_args(&self, job: &SyncJob, config: &RemoteConfig) -> Vec<String> {
        let mut args: Vec<String> = self.flags.clone();

        // SSH transport with the same options as remote execution.
        let mut ssh_cmd = String::from("ssh");
        for opt in config.ssh_options() {
            ssh_cmd.push(' ');
            ssh_cmd.push_str(&opt);
        }
        args.push("-e".to_string());
        args.push(ssh_cmd);

        for pattern in &job.exclude_patterns {
            args.push("--exclude".to_string());
            args.push(pattern.clone());
        }

        let local = ensure_trailing_slash(&job.local_path);
        let remote = config.remote_spec(&ensure_trailing_slash(&job.remote_path));
        match job.direction {
            SyncDirection::Push => {
                args.push(local);
                args.push(remote);
            }
            SyncDirection::Pull => {
                args.push(remote);
                args.push(local);
            }
        }
        args
    }
}


/// Ensure a path ends with `/` (rsync convention for syncing directory contents).
fn ensure_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
impl SyncManager {
    /// Look up a job by ID across queue, active, and history.
    fn status(&self, job_id: &str) -> Option<&SyncJob> {
        self.active
            .as_ref()
            .filter(|j| j.id == job_id)
            .or_else(|| self.queue.iter().find(|j| j.id == job_id))
            .or_else(|| self.history.iter().find(|j| j.id == job_id))
    }

    fn pending_count(&self) -> usize {
        self.queue.len()
    }

    fn is_busy(&self) -> bool {
        self.active.is_some()
    }
}
