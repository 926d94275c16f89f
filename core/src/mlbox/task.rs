//! Task definitions (`tasks/<task>.yaml`).

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};


/// Whether a parameter names a single file or a whole directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    File,
    Directory,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::File => write!(f, "file"),
            ParamType::Directory => write!(f, "directory"),
        }
    }
}


/// One declared input or output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskParam {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
}


/// A task's declared inputs and outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MLBoxTask {
    pub inputs: Vec<TaskParam>,
    pub outputs: Vec<TaskParam>,
}

impl MLBoxTask {
    pub fn load(path: &Path) -> Result<MLBoxTask> {
        let content = crate::error::read_to_string(path)?;
        let task: MLBoxTask = if content.trim().is_empty() {
            MLBoxTask::default()
        } else {
            serde_yaml::from_str(&content).map_err(|e| Error::yaml(path, e))?
        };
        task.check_unique()?;
        Ok(task)
    }

    pub fn parse(content: &str) -> Result<MLBoxTask> {
        let task: MLBoxTask =
            serde_yaml::from_str(content).map_err(|e| Error::yaml("<task>", e))?;
        task.check_unique()?;
        Ok(task)
    }

    /// Names must be unique across inputs and outputs together, since both
    /// become `--name=value` container arguments.
    fn check_unique(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for param in self.inputs.iter().chain(&self.outputs) {
            if !seen.insert(param.name.as_str()) {
                return Err(Error::config(format!(
                    "parameter '{}' is declared more than once",
                    param.name
                )));
            }
        }
        Ok(())
    }

    pub fn input(&self, name: &str) -> Option<&TaskParam> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&TaskParam> {
        self.outputs.iter().find(|p| p.name == name)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_inputs_and_outputs() {
        let task = MLBoxTask::parse(
            "inputs:\n  - name: data_dir\n    type: directory\n  - name: parameters_file\n    type: file\n\
             outputs:\n  - name: model_dir\n    type: directory\n",
        )
        .unwrap();
        assert_eq!(task.inputs.len(), 2);
        assert_eq!(task.input("parameters_file").unwrap().kind, ParamType::File);
        assert_eq!(task.output("model_dir").unwrap().kind, ParamType::Directory);
        assert!(task.input("model_dir").is_none());
    }

    #[test]
    fn outputs_optional() {
        let task = MLBoxTask::parse("inputs:\n  - {name: a, type: file}\n").unwrap();
        assert!(task.outputs.is_empty());
    }

    #[test]
    fn unknown_type_rejected() {
        assert!(MLBoxTask::parse("inputs:\n  - {name: a, type: socket}\n").is_err());
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = MLBoxTask::parse(
            "inputs:\n  - {name: a, type: file}\noutputs:\n  - {name: a, type: directory}\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("'a'"));
    }

    #[test]
    fn load_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noop.yaml");
        std::fs::write(&path, "").unwrap();
        assert_eq!(MLBoxTask::load(&path).unwrap(), MLBoxTask::default());
    }

    #[test]
    fn param_type_display() {
        assert_eq!(ParamType::Directory.to_string(), "directory");
    }
}
