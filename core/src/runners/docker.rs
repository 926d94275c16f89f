//! Local docker runner.
//!
//! `configure` builds the box image from `build/Dockerfile`; `run` mounts
//! every bound path into the container and passes the container-side paths
//! to the task entry point as `--<param>=<path>` arguments.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::infrastructure::{join_quoted, shell_quote, CommandRunner};
use crate::mlbox::{MLBox, MLBoxInvoke, MLBoxTask, ParamType};
use crate::runner_config::{RunnerConfig, CONTAINER_EXEC};


/// Host directory mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
}

impl Mount {
    /// `host:container` as given to `--volume`.
    pub fn volume_spec(&self) -> String {
        format!("{}:{}", self.host.display(), self.container)
    }
}


pub struct DockerRun<'a> {
    mlbox: &'a MLBox,
    config: RunnerConfig,
    runner: &'a dyn CommandRunner,
}

impl<'a> DockerRun<'a> {
    pub fn new(mlbox: &'a MLBox, config: RunnerConfig, runner: &'a dyn CommandRunner) -> Result<Self> {
        if config.exec.kind != CONTAINER_EXEC {
            return Err(Error::config(format!(
                "exec type must be \"{}\", got \"{}\"",
                CONTAINER_EXEC, config.exec.kind
            )));
        }
        Ok(DockerRun { mlbox, config, runner })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Build the image on the current host.
    pub fn configure(&self) -> Result<()> {
        let build_path = self.mlbox.build_path();
        let dockerfile = build_path.join("Dockerfile");
        if !dockerfile.is_file() {
            return Err(Error::not_found("Dockerfile", dockerfile));
        }

        let container = &self.config.exec.container;
        let mut words = vec!["docker".to_string(), "build".to_string()];
        for var in &container.env {
            words.push("--build-arg".to_string());
            words.push(format!("{}={}", var.name, var.value));
        }
        words.extend([
            "-t".to_string(),
            container.image.clone(),
            "-f".to_string(),
            "Dockerfile".to_string(),
            ".".to_string(),
        ]);

        let cmd = format!(
            "cd {} && {}",
            shell_quote(&build_path.to_string_lossy()),
            join_quoted(&words)
        );
        tracing::info!(image = %container.image, box_name = %self.mlbox.name, "building image");
        self.runner.run(&cmd)?;
        Ok(())
    }

    /// Run one task invocation in a fresh container.
    pub fn run(&self, invoke: &MLBoxInvoke, task: &MLBoxTask) -> Result<()> {
        invoke.check_against(task)?;
        let (mounts, args) = self.mounts_and_args(invoke, task)?;
        for mount in &mounts {
            tracing::debug!(host = %mount.host.display(), container = %mount.container, "mount");
        }

        let container = &self.config.exec.container;
        let mut words = vec!["docker".to_string(), "run".to_string(), "--rm".to_string()];
        if let Some(ref runtime) = container.runtime {
            words.push(format!("--runtime={}", runtime));
        }
        for mount in &mounts {
            words.push("--volume".to_string());
            words.push(mount.volume_spec());
        }
        for var in &container.env {
            words.push("-e".to_string());
            words.push(format!("{}={}", var.name, var.value));
        }
        words.push(container.image.clone());
        words.extend(args);

        tracing::info!(task = %invoke.task_name, image = %container.image, "running task");
        self.runner.run(&join_quoted(&words))?;
        Ok(())
    }

    /// Container mounts and task arguments for an invocation.
    ///
    /// Inputs come before outputs, each in binding-name order. Host
    /// directories are created so docker does not create them as root.
    /// Relative bindings are taken relative to the box root.
    pub fn mounts_and_args(
        &self,
        invoke: &MLBoxInvoke,
        task: &MLBoxTask,
    ) -> Result<(Vec<Mount>, Vec<String>)> {
        let mut mounts: Vec<Mount> = Vec::new();
        let mut args = vec![invoke.task_name.clone()];

        let bindings = invoke
            .input_binding
            .iter()
            .map(|(name, path)| (name, path, task.input(name)))
            .chain(
                invoke
                    .output_binding
                    .iter()
                    .map(|(name, path)| (name, path, task.output(name))),
            );

        for (name, raw_path, param) in bindings {
            let param = param.ok_or_else(|| {
                Error::config(format!(
                    "parameter '{}' is not declared by task '{}'",
                    name, invoke.task_name
                ))
            })?;
            let host_path = self.host_path(raw_path);

            let arg_value = match param.kind {
                ParamType::Directory => {
                    std::fs::create_dir_all(&host_path).map_err(|e| Error::io(&host_path, e))?;
                    mount_point(&mut mounts, &host_path)
                }
                ParamType::File => {
                    let file_name = host_path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .ok_or_else(|| {
                            Error::config(format!("'{}' does not name a file", raw_path))
                        })?;
                    let parent = host_path
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.mlbox.root().to_path_buf());
                    std::fs::create_dir_all(&parent).map_err(|e| Error::io(&parent, e))?;
                    format!("{}/{}", mount_point(&mut mounts, &parent), file_name)
                }
            };
            args.push(format!("--{}={}", name, arg_value));
        }

        Ok((mounts, args))
    }

    /// Bound path on this host: `$WORKSPACE` expanded, relative paths
    /// anchored at the box root so docker never sees a bare volume name.
    fn host_path(&self, raw_path: &str) -> PathBuf {
        let path = PathBuf::from(self.mlbox.expand_workspace(raw_path));
        if path.is_relative() {
            self.mlbox.root().join(path)
        } else {
            path
        }
    }
}


/// Container path for `host`, allocating `/mlbox_io<N>/<basename>` on first use.
fn mount_point(mounts: &mut Vec<Mount>, host: &Path) -> String {
    if let Some(existing) = mounts.iter().find(|m| m.host == host) {
        return existing.container.clone();
    }
    let base = host
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());
    let container = format!("/mlbox_io{}/{}", mounts.len(), base);
    mounts.push(Mount {
        host: host.to_path_buf(),
        container: container.clone(),
    });
    container
}
