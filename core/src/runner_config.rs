//! Container runner configuration.
//!
//! A docker platform file describes how a box runs in a container:
//!
//! ```yaml
//! exec:
//!   type: container
//!   container:
//!     image: mlbox/mnist:0.1
//!     runtime: nvidia
//!     env: [{name: PYTHONUNBUFFERED, value: 1}]
//! overrides:
//!   configure: {exec: {container: {env: [{name: PIP_INDEX_URL, value: "..."}]}}}
//!   run: {...}
//!   tasks:
//!     train: {exec: {container: {runtime: nvidia}}}
//! ```
//!
//! The effective configuration is layered: the box's own
//! `platforms/docker.yaml`, then the user's platform file, then the
//! override for the action, then the override for the task.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;

use crate::error::{Error, Result};
use crate::merge::Merge;
use crate::mlbox::MLBox;
use crate::platform::scalar_to_string;

/// File name of a box's default container platform.
pub const DEFAULT_PLATFORM_FILE: &str = "docker.yaml";

/// The only exec type the container runner accepts.
pub const CONTAINER_EXEC: &str = "container";


// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// What the runner is about to do; selects the action override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Configure,
    Run,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Configure => write!(f, "configure"),
            Action::Run => write!(f, "run"),
        }
    }
}


// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// An environment variable passed to docker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(deserialize_with = "scalar_value")]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerConfig {
    pub image: String,
    pub runtime: Option<String>,
    pub env: Vec<EnvVar>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub container: ContainerConfig,
}

/// Fully resolved runner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunnerConfig {
    pub exec: ExecConfig,
}


// ---------------------------------------------------------------------------
// Partial (file-level) documents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerSection {
    pub image: Option<String>,
    pub runtime: Option<String>,
    pub env: Vec<EnvVar>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecSection {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub container: Option<ContainerSection>,
}

/// A layer that can be applied on top of the base document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Layer {
    pub exec: Option<ExecSection>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Overrides {
    pub configure: Option<Layer>,
    pub run: Option<Layer>,
    pub tasks: BTreeMap<String, Layer>,
}

/// One platform file as written on disk.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlatformDoc {
    pub exec: Option<ExecSection>,
    pub overrides: Overrides,
}

impl Merge for ContainerSection {
    fn merge(&mut self, overlay: Self) {
        self.image.merge(overlay.image);
        self.runtime.merge(overlay.runtime);
        self.env.merge(overlay.env);
    }
}

impl Merge for ExecSection {
    fn merge(&mut self, overlay: Self) {
        self.kind.merge(overlay.kind);
        self.container.merge(overlay.container);
    }
}

impl Merge for Layer {
    fn merge(&mut self, overlay: Self) {
        self.exec.merge(overlay.exec);
    }
}

impl Merge for Overrides {
    fn merge(&mut self, overlay: Self) {
        self.configure.merge(overlay.configure);
        self.run.merge(overlay.run);
        self.tasks.merge(overlay.tasks);
    }
}

impl Merge for PlatformDoc {
    fn merge(&mut self, overlay: Self) {
        self.exec.merge(overlay.exec);
        self.overrides.merge(overlay.overrides);
    }
}

impl PlatformDoc {
    pub fn load(path: &Path) -> Result<PlatformDoc> {
        let content = crate::error::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(PlatformDoc::default());
        }
        serde_yaml::from_str(&content).map_err(|e| Error::yaml(path, e))
    }

    pub fn parse(content: &str) -> Result<PlatformDoc> {
        serde_yaml::from_str(content).map_err(|e| Error::yaml("<runner platform>", e))
    }

    /// Collapse the document for one action (and optionally one task) and
    /// resolve it into a [`RunnerConfig`].
    pub fn resolve(&self, action: Action, task: Option<&str>) -> Result<RunnerConfig> {
        let mut layer = Layer {
            exec: self.exec.clone(),
        };
        let action_layer = match action {
            Action::Configure => self.overrides.configure.clone(),
            Action::Run => self.overrides.run.clone(),
        };
        layer.merge(action_layer.unwrap_or_default());
        if let Some(task_name) = task {
            if let Some(task_layer) = self.overrides.tasks.get(task_name) {
                layer.merge(task_layer.clone());
            }
        }

        let exec = layer
            .exec
            .ok_or_else(|| Error::config("platform has no 'exec' section"))?;
        let kind = exec
            .kind
            .ok_or_else(|| Error::config("exec.type is not set"))?;
        let container = exec.container.unwrap_or_default();
        let image = container
            .image
            .filter(|i| !i.trim().is_empty())
            .ok_or_else(|| Error::config("exec.container.image is not set"))?;

        Ok(RunnerConfig {
            exec: ExecConfig {
                kind,
                container: ContainerConfig {
                    image,
                    runtime: container.runtime.filter(|r| !r.trim().is_empty()),
                    env: container.env,
                },
            },
        })
    }
}


/// Build the effective runner configuration for `action` (and `task`).
///
/// The box default `platforms/docker.yaml` is used as the base unless it is
/// the very file passed as `platform`.
pub fn build_runner_config(
    mlbox: &MLBox,
    platform: &Path,
    action: Action,
    task: Option<&str>,
) -> Result<RunnerConfig> {
    let user_doc = PlatformDoc::load(platform)?;
    let default_path = mlbox.platforms_path().join(DEFAULT_PLATFORM_FILE);

    let same_file = match (default_path.canonicalize(), platform.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    let mut doc = if default_path.is_file() && !same_file {
        tracing::debug!(base = %default_path.display(), "using box default platform");
        PlatformDoc::load(&default_path)?
    } else {
        PlatformDoc::default()
    };
    doc.merge(user_doc);

    let config = doc.resolve(action, task)?;
    tracing::debug!(
        action = %action,
        task = task.unwrap_or("-"),
        image = %config.exec.container.image,
        "runner config resolved"
    );
    Ok(config)
}


fn scalar_value<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    let value = Value::deserialize(deserializer)?;
    scalar_to_string(&value).ok_or_else(|| D::Error::custom("env value must be a scalar"))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlbox::testing::write_box;

    const DOC: &str = r#"
exec:
  type: container
  container:
    image: mlbox/mnist:0.1
    env:
      - {name: PYTHONUNBUFFERED, value: 1}
overrides:
  configure:
    exec:
      container:
        env:
          - {name: PIP_NO_CACHE_DIR, value: "off"}
  run:
    exec:
      container:
        runtime: nvidia
  tasks:
    download:
      exec:
        container:
          runtime: runc
"#;

    #[test]
    fn resolve_base() {
        let doc = PlatformDoc::parse("exec: {type: container, container: {image: a}}").unwrap();
        let cfg = doc.resolve(Action::Run, None).unwrap();
        assert_eq!(cfg.exec.kind, "container");
        assert_eq!(cfg.exec.container.image, "a");
        assert!(cfg.exec.container.runtime.is_none());
        assert!(cfg.exec.container.env.is_empty());
    }

    #[test]
    fn configure_override_appends_env() {
        let cfg = PlatformDoc::parse(DOC).unwrap().resolve(Action::Configure, None).unwrap();
        let names: Vec<&str> = cfg.exec.container.env.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["PYTHONUNBUFFERED", "PIP_NO_CACHE_DIR"]);
        assert_eq!(cfg.exec.container.env[0].value, "1");
        assert!(cfg.exec.container.runtime.is_none());
    }

    #[test]
    fn run_override_sets_runtime() {
        let cfg = PlatformDoc::parse(DOC).unwrap().resolve(Action::Run, Some("train")).unwrap();
        assert_eq!(cfg.exec.container.runtime.as_deref(), Some("nvidia"));
        assert_eq!(cfg.exec.container.env.len(), 1);
    }

    #[test]
    fn task_override_wins_over_action() {
        let cfg = PlatformDoc::parse(DOC).unwrap().resolve(Action::Run, Some("download")).unwrap();
        assert_eq!(cfg.exec.container.runtime.as_deref(), Some("runc"));
    }

    #[test]
    fn missing_image_is_config_error() {
        let doc = PlatformDoc::parse("exec: {type: container}").unwrap();
        let err = doc.resolve(Action::Run, None).unwrap_err();
        assert!(err.to_string().contains("image"));
    }

    #[test]
    fn missing_exec_is_config_error() {
        let err = PlatformDoc::default().resolve(Action::Configure, None).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn unknown_container_key_rejected() {
        assert!(PlatformDoc::parse("exec: {container: {imgae: x}}").is_err());
    }

    #[test]
    fn build_layers_user_file_over_box_default() {
        let dir = tempfile::tempdir().unwrap();
        let root = write_box(dir.path(), "mnist");
        let mlbox = MLBox::open(&root).unwrap();
        let user = dir.path().join("gpu.yaml");
        std::fs::write(
            &user,
            "exec:\n  container:\n    runtime: nvidia\n    env: [{name: A, value: x}]\n",
        )
        .unwrap();

        let cfg = build_runner_config(&mlbox, &user, Action::Run, Some("train")).unwrap();
        assert_eq!(cfg.exec.kind, "container");
        assert_eq!(cfg.exec.container.image, "mlbox/test:0.1");
        assert_eq!(cfg.exec.container.runtime.as_deref(), Some("nvidia"));
        assert_eq!(cfg.exec.container.env.len(), 1);
    }

    #[test]
    fn build_with_box_default_itself() {
        let dir = tempfile::tempdir().unwrap();
        let root = write_box(dir.path(), "mnist");
        let mlbox = MLBox::open(&root).unwrap();
        std::fs::write(
            root.join("platforms/docker.yaml"),
            "exec:\n  type: container\n  container:\n    image: i\n    env: [{name: A, value: x}]\n",
        )
        .unwrap();
        let cfg = build_runner_config(
            &mlbox,
            &root.join("platforms/docker.yaml"),
            Action::Configure,
            None,
        )
        .unwrap();
        // Not merged with itself, so the list is not doubled.
        assert_eq!(cfg.exec.container.env.len(), 1);
    }

    #[test]
    fn action_display() {
        assert_eq!(Action::Configure.to_string(), "configure");
        assert_eq!(Action::Run.to_string(), "run");
    }
}
