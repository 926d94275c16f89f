//! New-box scaffolding.
//!
//! `create_box` lays out a minimal working box: a Python entry point that
//! reads its hyperparameters and writes a model directory, one task with its
//! invocation, and a docker and an ssh platform file to start from.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::mlbox::check_box_name;


const DOCKERFILE: &str = "\
FROM python:3.8-slim

COPY mlbox.py /workspace/mlbox.py
RUN pip install --no-cache-dir pyyaml

ENTRYPOINT [\"python\", \"/workspace/mlbox.py\"]
";

const ENTRY_SCRIPT: &str = "\
import argparse
import os

import yaml


def main():
    parser = argparse.ArgumentParser()
    parser.add_argument('task')
    parser.add_argument('--parameters_file', required=True)
    parser.add_argument('--output_dir', required=True)
    args = parser.parse_args()

    with open(args.parameters_file) as f:
        params = yaml.safe_load(f) or {}
    os.makedirs(args.output_dir, exist_ok=True)
    with open(os.path.join(args.output_dir, 'result.yaml'), 'w') as f:
        yaml.safe_dump({'task': args.task, 'parameters': params}, f)


if __name__ == '__main__':
    main()
";

const TASK: &str = "\
inputs:
  - name: parameters_file
    type: file
outputs:
  - name: output_dir
    type: directory
";

const INVOCATION: &str = "\
task_name: main
input_binding:
  parameters_file: $WORKSPACE/parameters.yaml
output_binding:
  output_dir: $WORKSPACE/output
";

const SSH_PLATFORM: &str = "\
schema_type: mlbox_ssh
host: 127.0.0.1
user: ubuntu
port: 22
remote_root: /home/ubuntu/mlboxes
interpreter:
  type: system
  python: python3
  requirements: mlcommons-box-docker
runner:
  package: mlcommons_box_docker
  platform: platforms/docker.yaml
";

const PARAMETERS: &str = "\
learning_rate: 0.001
batch_size: 32
num_train_steps: 1000
";


/// Create a skeleton box at `root`. `name` defaults to the directory name.
/// Returns every file written, in creation order.
pub fn create_box(root: &Path, name: Option<&str>) -> Result<Vec<PathBuf>> {
    if root.exists() {
        return Err(Error::config(format!("path already exists: {}", root.display())));
    }
    let name = match name {
        Some(n) => n.trim().to_string(),
        None => root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::config(format!("cannot derive a box name from '{}'", root.display())))?,
    };
    check_box_name(&name)?;

    let image = format!("mlbox/{}:0.1", name.to_lowercase());
    let metadata = format!("name: {}\nversion: 0.1.0\ndescription: \"\"\n", name);
    let docker_platform = format!("exec:\n  type: container\n  container:\n    image: {}\n", image);

    let files: Vec<(&str, String)> = vec![
        ("mlbox.yaml", metadata),
        ("build/Dockerfile", DOCKERFILE.to_string()),
        ("build/mlbox.py", ENTRY_SCRIPT.to_string()),
        ("tasks/main.yaml", TASK.to_string()),
        ("run/main.yaml", INVOCATION.to_string()),
        ("platforms/docker.yaml", docker_platform),
        ("platforms/ssh.yaml", SSH_PLATFORM.to_string()),
        ("workspace/parameters.yaml", PARAMETERS.to_string()),
        ("workspace/.gitkeep", String::new()),
    ];

    let mut created = Vec::with_capacity(files.len());
    for (relative, content) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        std::fs::write(&path, content).map_err(|e| Error::io(&path, e))?;
        tracing::debug!(path = %path.display(), "created");
        created.push(path);
    }
    tracing::info!(root = %root.display(), box_name = %name, files = created.len(), "box created");
    Ok(created)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::hparams::HyperParams;
    use crate::mlbox::{MLBox, MLBoxInvoke};
    use crate::platform::PlatformConfig;
    use crate::runner_config::{build_runner_config, Action};

    #[test]
    fn creates_loadable_box() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("my_box");
        let created = create_box(&root, None).unwrap();
        assert!(created.iter().all(|p| p.is_file()));
        assert!(root.join("workspace/.gitkeep").is_file());

        let mlbox = MLBox::open(&root).unwrap();
        assert_eq!(mlbox.name, "my_box");

        let invoke = MLBoxInvoke::load(&mlbox.run_path().join("main.yaml")).unwrap();
        let task = mlbox.load_task(&invoke).unwrap();
        invoke.check_against(&task).unwrap();

        let cfg = build_runner_config(
            &mlbox,
            &mlbox.platforms_path().join("docker.yaml"),
            Action::Run,
            Some("main"),
        )
        .unwrap();
        assert_eq!(cfg.exec.container.image, "mlbox/my_box:0.1");
    }

    #[test]
    fn scaffolded_files_validate() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("b");
        create_box(&root, Some("Squad")).unwrap();

        let platform = PlatformConfig::load(&root.join("platforms/ssh.yaml")).unwrap();
        platform.validate().unwrap();

        let params = HyperParams::load(&root.join("workspace/parameters.yaml")).unwrap();
        assert!(params.validate().is_empty());

        let mlbox = MLBox::open(&root).unwrap();
        assert_eq!(mlbox.name, "Squad");
    }

    #[test]
    fn refuses_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = create_box(dir.path(), Some("x")).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn rejects_unusable_names() {
        let dir = tempfile::tempdir().unwrap();
        for bad in ["a/b", "..", ".", "   ", ""] {
            assert!(create_box(&dir.path().join("b"), Some(bad)).is_err(), "{:?}", bad);
            assert!(!dir.path().join("b").exists());
        }
    }
}
