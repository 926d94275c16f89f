//! Task invocations (`run/<task>.yaml`).
//!
//! An invocation names a task and binds each of its parameters to a path.
//! Paths may start with `$WORKSPACE`, which is resolved against the box
//! workspace of whichever host the task runs on.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::task::MLBoxTask;
use crate::error::{Error, Result};


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MLBoxInvoke {
    /// Task to run; defaults to the invocation file stem.
    #[serde(default)]
    pub task_name: String,
    #[serde(default)]
    pub input_binding: BTreeMap<String, String>,
    #[serde(default)]
    pub output_binding: BTreeMap<String, String>,
}

impl MLBoxInvoke {
    pub fn load(path: &Path) -> Result<MLBoxInvoke> {
        let content = crate::error::read_to_string(path)?;
        let mut invoke: MLBoxInvoke =
            serde_yaml::from_str(&content).map_err(|e| Error::yaml(path, e))?;
        if invoke.task_name.trim().is_empty() {
            invoke.task_name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        if invoke.task_name.is_empty() || invoke.task_name.contains('/') {
            return Err(Error::config(format!(
                "{}: invalid task name '{}'",
                path.display(),
                invoke.task_name
            )));
        }
        Ok(invoke)
    }

    /// Every binding must be declared by the task, and every declared
    /// parameter must be bound.
    pub fn check_against(&self, task: &MLBoxTask) -> Result<()> {
        let mut issues = Vec::new();
        for name in self.input_binding.keys() {
            if task.input(name).is_none() {
                issues.push(format!("input '{}' is not declared by task '{}'", name, self.task_name));
            }
        }
        for name in self.output_binding.keys() {
            if task.output(name).is_none() {
                issues.push(format!("output '{}' is not declared by task '{}'", name, self.task_name));
            }
        }
        for param in &task.inputs {
            if !self.input_binding.contains_key(&param.name) {
                issues.push(format!("input '{}' is not bound", param.name));
            }
        }
        for param in &task.outputs {
            if !self.output_binding.contains_key(&param.name) {
                issues.push(format!("output '{}' is not bound", param.name));
            }
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation { issues })
        }
    }
}
