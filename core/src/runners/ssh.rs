//! Remote runner over SSH.
//!
//! The box is mirrored to `<remote_root>/<box name>` with rsync and the
//! container runner is driven on the remote host through its Python
//! interpreter. Nothing runs in parallel: every step waits for the previous
//! one and the first failing step aborts the whole operation.
//!
//! `configure`: health check, create the remote root, push, provision the
//! interpreter, remote `configure`.
//!
//! `run`: health check, push, remote `run`, pull the workspace back.

use std::path::Path;

use crate::error::{Error, Result};
use crate::infrastructure::{join_quoted, shell_quote, CommandRunner};
use crate::mlbox::MLBox;
use crate::platform::PlatformConfig;
use crate::rig::{RemoteConfig, RemoteExecutor, SyncManager};
use crate::settings::Settings;


pub struct SshRun<'a> {
    mlbox: &'a MLBox,
    platform: PlatformConfig,
    remote: RemoteConfig,
    sync: SyncManager,
    executor: RemoteExecutor,
    runner: &'a dyn CommandRunner,
}

impl<'a> SshRun<'a> {
    pub fn new(
        mlbox: &'a MLBox,
        platform: PlatformConfig,
        settings: &Settings,
        runner: &'a dyn CommandRunner,
    ) -> Result<Self> {
        platform.validate()?;
        let remote = platform.remote_config(&platform.host, settings.connect_timeout_secs);
        let mut sync = SyncManager::new(platform.sync.flags.clone(), settings.default_excludes.clone());
        for pattern in &platform.sync.exclude {
            sync.add_default_exclude(pattern);
        }
        Ok(SshRun {
            mlbox,
            platform,
            remote,
            sync,
            executor: RemoteExecutor::new(),
            runner,
        })
    }

    /// Where the box lives on the remote host.
    pub fn remote_box_path(&self) -> String {
        self.remote.remote_path(&self.mlbox.name)
    }

    pub fn sync_manager(&self) -> &SyncManager {
        &self.sync
    }

    pub fn executor(&self) -> &RemoteExecutor {
        &self.executor
    }

    /// Prepare the remote host: sync the box, set up Python and build the image.
    pub fn configure(&mut self) -> Result<()> {
        tracing::info!(host = %self.remote.host, box_name = %self.mlbox.name, "ssh configure");
        self.health_check()?;

        let mkdir = format!("mkdir -p {}", shell_quote(&self.remote.remote_root));
        self.execute("create remote root", &mkdir)?;

        self.push()?;

        let env = self.platform.env_prefix();
        for cmd in self.platform.interpreter.provision_commands() {
            self.execute("provision interpreter", &format!("{}{}", env, cmd))?;
        }

        let cmd = self.runner_command("configure", None);
        self.execute("remote configure", &cmd)?;
        tracing::info!(host = %self.remote.host, "ssh configure complete");
        Ok(())
    }

    /// Run the task named by `invocation` (a file inside the box) remotely
    /// and bring the workspace back.
    pub fn run(&mut self, invocation: &Path) -> Result<()> {
        let relative = self.mlbox.relative_path(invocation)?;
        let task = relative.to_string_lossy().into_owned();
        tracing::info!(host = %self.remote.host, task = %task, "ssh run");

        self.health_check()?;
        self.push()?;
        let cmd = self.runner_command("run", Some(&task));
        self.execute("remote run", &cmd)?;
        self.pull_workspace()?;
        tracing::info!(host = %self.remote.host, task = %task, "ssh run complete");
        Ok(())
    }

    /// `ssh … 'echo ok'` must answer `ok`.
    pub fn health_check(&mut self) -> Result<()> {
        let output = self.remote_exec("health check", "echo ok", true)?;
        if output.trim() != "ok" {
            return Err(Error::UnexpectedResponse {
                target: self.remote.user_at_host(),
                output: output.trim().to_string(),
            }
            .in_step("health check"));
        }
        Ok(())
    }

    /// Mirror the local box to the remote host.
    pub fn push(&mut self) -> Result<()> {
        let local = self.mlbox.root().to_string_lossy().into_owned();
        let remote_path = self.remote_box_path();
        let job_id = self.sync.queue_push(&self.remote.name, &local, &remote_path);
        self.transfer("push", &job_id)
    }

    /// Copy the remote workspace back over the local one.
    pub fn pull_workspace(&mut self) -> Result<()> {
        let local = self.mlbox.workspace_path();
        std::fs::create_dir_all(&local).map_err(|e| Error::io(&local, e))?;
        let local = local.to_string_lossy().into_owned();
        let remote_path = format!("{}/workspace", self.remote_box_path());
        let job_id = self.sync.queue_pull(&self.remote.name, &remote_path, &local);
        self.transfer("pull", &job_id)
    }

    fn transfer(&mut self, step: &str, job_id: &str) -> Result<()> {
        let job = self
            .sync
            .start_next(now_ms())
            .ok_or_else(|| Error::config("sync queue is busy").in_step(step))?
            .clone();
        let args = self.sync.build_rsync_args(&job, &self.remote);
        let cmd = format!("rsync {}", join_quoted(&args));

        match self.runner.run(&cmd) {
            Ok(_) => {
                self.sync.complete(job_id, now_ms()).map_err(Error::config)?;
                tracing::debug!(job = %job_id, step, "sync complete");
                Ok(())
            }
            Err(e) => {
                self.sync
                    .fail(job_id, &e.to_string(), now_ms())
                    .map_err(Error::config)?;
                Err(e.in_step(step))
            }
        }
    }

    fn execute(&mut self, step: &str, command: &str) -> Result<String> {
        self.remote_exec(step, command, false)
    }

    fn remote_exec(&mut self, step: &str, command: &str, capture: bool) -> Result<String> {
        let exec_id = self.executor.queue(&self.remote.name, step, command);
        let exec = self
            .executor
            .start(&exec_id, now_ms())
            .map_err(Error::config)?
            .clone();
        let mut words = vec!["ssh".to_string()];
        words.extend(self.executor.build_ssh_command(&exec, &self.remote));
        let cmd = join_quoted(&words);

        let result = if capture {
            self.runner.capture(&cmd)
        } else {
            self.runner.run(&cmd)
        };
        match result {
            Ok(output) => {
                self.executor
                    .complete(&exec_id, &output, now_ms())
                    .map_err(Error::config)?;
                Ok(output)
            }
            Err(e) => {
                self.executor
                    .fail(&exec_id, &e.to_string(), now_ms())
                    .map_err(Error::config)?;
                Err(e.in_step(step))
            }
        }
    }

    /// `cd <remote box> && [exports] <python> -m <package> <action> …`.
    fn runner_command(&self, action: &str, task: Option<&str>) -> String {
        let mut words = vec![
            "-m".to_string(),
            self.platform.runner.package.clone(),
            action.to_string(),
            "--mlbox=.".to_string(),
            format!("--platform={}", self.platform.runner.platform),
        ];
        if let Some(task) = task {
            words.push(format!("--task={}", task));
        }
        format!(
            "cd {} && {}{} {}",
            shell_quote(&self.remote_box_path()),
            self.platform.env_prefix(),
            shell_quote(&self.platform.interpreter.python_command()),
            join_quoted(&words)
        )
    }
}


fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
