//! MLBox layout and metadata.
//!
//! A box is a directory with a fixed layout:
//!
//! ```text
//! <root>/mlbox.yaml          name, version, description (optional)
//! <root>/build/Dockerfile    container build context
//! <root>/tasks/<task>.yaml   task definitions
//! <root>/run/<task>.yaml     invocations (parameter bindings)
//! <root>/platforms/*.yaml    platform files
//! <root>/workspace/          data referenced through $WORKSPACE
//! ```

pub mod invoke;
pub mod task;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use invoke::MLBoxInvoke;
pub use task::{MLBoxTask, ParamType, TaskParam};

pub const METADATA_FILE: &str = "mlbox.yaml";


/// Contents of `mlbox.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxMetadata {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
}


/// An opened box directory.
#[derive(Debug, Clone)]
pub struct MLBox {
    root: PathBuf,
    pub name: String,
    pub metadata: BoxMetadata,
}

impl MLBox {
    /// Open a box rooted at `root`. The name comes from `mlbox.yaml` when it
    /// sets one, else from the directory name.
    pub fn open(root: &Path) -> Result<MLBox> {
        if !root.is_dir() {
            return Err(Error::not_found("MLBox directory", root));
        }
        let root = root
            .canonicalize()
            .map_err(|e| Error::io(root, e))?;

        let meta_path = root.join(METADATA_FILE);
        let metadata = if meta_path.is_file() {
            let content = crate::error::read_to_string(&meta_path)?;
            if content.trim().is_empty() {
                BoxMetadata::default()
            } else {
                serde_yaml::from_str(&content).map_err(|e| Error::yaml(&meta_path, e))?
            }
        } else {
            BoxMetadata::default()
        };

        let name = match metadata.name {
            Some(ref n) => n.trim().to_string(),
            None => root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::config(format!("cannot derive a box name from '{}'", root.display())))?,
        };
        check_box_name(&name)?;

        Ok(MLBox { root, name, metadata })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn build_path(&self) -> PathBuf {
        self.root.join("build")
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.root.join("tasks")
    }

    pub fn run_path(&self) -> PathBuf {
        self.root.join("run")
    }

    pub fn platforms_path(&self) -> PathBuf {
        self.root.join("platforms")
    }

    pub fn workspace_path(&self) -> PathBuf {
        self.root.join("workspace")
    }

    /// `tasks/<name>.yaml`.
    pub fn task_file(&self, task_name: &str) -> PathBuf {
        self.tasks_path().join(format!("{}.yaml", task_name))
    }

    /// Load the definition of the task an invocation refers to.
    pub fn load_task(&self, invoke: &MLBoxInvoke) -> Result<MLBoxTask> {
        let path = self.task_file(&invoke.task_name);
        if !path.is_file() {
            return Err(Error::not_found(format!("task '{}'", invoke.task_name), path));
        }
        MLBoxTask::load(&path)
    }

    /// Path of `file` relative to the box root, failing if it lies outside.
    pub fn relative_path(&self, file: &Path) -> Result<PathBuf> {
        let absolute = file
            .canonicalize()
            .map_err(|e| Error::io(file, e))?;
        absolute
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .map_err(|_| {
                Error::config(format!(
                    "'{}' is not inside box '{}'",
                    file.display(),
                    self.root.display()
                ))
            })
    }

    /// Substitute `$WORKSPACE` in a bound path.
    pub fn expand_workspace(&self, path: &str) -> String {
        path.replace("$WORKSPACE", &self.workspace_path().to_string_lossy())
    }
}

/// A box name becomes a single directory under the remote root, so it must
/// be one real path component.
pub fn check_box_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name == "." || name == ".." {
        return Err(Error::config(format!("'{}' is not a valid box name", name)));
    }
    if name.contains('/') {
        return Err(Error::config(format!("box name '{}' must not contain '/'", name)));
    }
    Ok(())
}

impl fmt::Display for MLBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MLBox '{}' at {}", self.name, self.root.display())?;
        if let Some(ref v) = self.metadata.version {
            write!(f, " (version {})", v)?;
        }
        Ok(())
    }
}


#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;

    /// Write a small but complete box under `dir/<name>` and return its root.
    pub fn write_box(dir: &Path, name: &str) -> std::path::PathBuf {
        let root = dir.join(name);
        for sub in ["build", "tasks", "run", "platforms", "workspace"] {
            std::fs::create_dir_all(root.join(sub)).unwrap();
        }
        std::fs::write(root.join("mlbox.yaml"), format!("name: {}\nversion: 0.1.0\n", name)).unwrap();
        std::fs::write(root.join("build/Dockerfile"), "FROM python:3.8\n").unwrap();
        std::fs::write(
            root.join("tasks/train.yaml"),
            "inputs:\n  - {name: data_dir, type: directory}\n  - {name: hparams, type: file}\n\
             outputs:\n  - {name: model_dir, type: directory}\n",
        )
        .unwrap();
        std::fs::write(
            root.join("run/train.yaml"),
            "task_name: train\n\
             input_binding:\n  data_dir: $WORKSPACE/data\n  hparams: $WORKSPACE/hparams/base.yaml\n\
             output_binding:\n  model_dir: $WORKSPACE/model\n",
        )
        .unwrap();
        std::fs::write(
            root.join("platforms/docker.yaml"),
            "exec:\n  type: container\n  container:\n    image: mlbox/test:0.1\n",
        )
        .unwrap();
        root
    }
}
