//! SSH platform descriptors.
//!
//! A platform file names one remote target for the SSH runner: login
//! coordinates, the directory that holds synced boxes, rsync flags, the
//! remote Python interpreter used to drive the container runner, and
//! environment variables exported before every remote command.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;

use crate::error::{Error, Result};
use crate::infrastructure::shell_quote;
use crate::rig::RemoteConfig;

/// Expected `schema_type` when the field is present.
pub const SCHEMA_TYPE: &str = "mlbox_ssh";


/// Top-level SSH platform descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub schema_type: Option<String>,

    pub host: String,

    pub user: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Private key passed to ssh with `-i`.
    #[serde(default)]
    pub identity_file: Option<String>,

    /// Directory on the remote host where boxes are mirrored.
    pub remote_root: String,

    #[serde(default)]
    pub sync: SyncOptions,

    #[serde(default)]
    pub interpreter: Interpreter,

    #[serde(default)]
    pub runner: RemoteRunner,

    /// Variables exported before every remote command.
    #[serde(default, deserialize_with = "scalar_map")]
    pub env: BTreeMap<String, String>,
}


/// rsync behaviour for push and pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    pub flags: Vec<String>,
    /// Patterns appended to the default exclude list.
    pub exclude: Vec<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            flags: vec!["-a".to_string(), "-z".to_string()],
            exclude: Vec::new(),
        }
    }
}


/// Python interpreter used on the remote host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Interpreter {
    /// The host's own Python.
    System {
        #[serde(default = "default_python")]
        python: String,
        #[serde(default)]
        requirements: Option<String>,
    },
    /// A virtualenv at `<location>/<name>`, created on configure.
    Virtualenv {
        #[serde(default = "default_python")]
        python: String,
        #[serde(default)]
        requirements: Option<String>,
        location: String,
        name: String,
    },
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::System {
            python: default_python(),
            requirements: None,
        }
    }
}

impl Interpreter {
    /// The interpreter named in the descriptor (before any virtualenv).
    pub fn base_python(&self) -> &str {
        match self {
            Interpreter::System { python, .. } | Interpreter::Virtualenv { python, .. } => python,
        }
    }

    pub fn requirements(&self) -> Option<&str> {
        match self {
            Interpreter::System { requirements, .. }
            | Interpreter::Virtualenv { requirements, .. } => requirements.as_deref(),
        }
    }

    /// Command that runs Python for task execution.
    pub fn python_command(&self) -> String {
        match self {
            Interpreter::System { python, .. } => python.clone(),
            Interpreter::Virtualenv { location, name, .. } => {
                format!("{}/bin/python", venv_dir(location, name))
            }
        }
    }

    /// Shell commands that prepare the interpreter on a fresh host.
    pub fn provision_commands(&self) -> Vec<String> {
        let mut cmds = Vec::new();
        match self {
            Interpreter::System { python, requirements } => {
                if let Some(req) = requirements {
                    cmds.push(format!(
                        "{} -m pip install --user {}",
                        shell_quote(python),
                        req.split_whitespace().map(shell_quote).collect::<Vec<_>>().join(" ")
                    ));
                }
            }
            Interpreter::Virtualenv {
                python,
                requirements,
                location,
                name,
            } => {
                let dir = venv_dir(location, name);
                cmds.push(format!("mkdir -p {}", shell_quote(location)));
                cmds.push(format!(
                    "test -x {}/bin/python || {} -m venv {}",
                    shell_quote(&dir),
                    shell_quote(python),
                    shell_quote(&dir)
                ));
                if let Some(req) = requirements {
                    cmds.push(format!(
                        "{}/bin/python -m pip install {}",
                        shell_quote(&dir),
                        req.split_whitespace().map(shell_quote).collect::<Vec<_>>().join(" ")
                    ));
                }
            }
        }
        cmds
    }
}

fn venv_dir(location: &str, name: &str) -> String {
    format!("{}/{}", location.trim_end_matches('/'), name)
}


/// The container runner driven on the remote side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteRunner {
    /// Python module invoked as `python -m <package>`.
    pub package: String,
    /// Docker platform file passed to the remote runner, relative to the box root.
    pub platform: String,
}

impl Default for RemoteRunner {
    fn default() -> Self {
        RemoteRunner {
            package: "mlcommons_box_docker".to_string(),
            platform: "platforms/docker.yaml".to_string(),
        }
    }
}


fn default_port() -> u16 {
    22
}

fn default_python() -> String {
    "python3".to_string()
}


impl PlatformConfig {
    pub fn load(path: &Path) -> Result<PlatformConfig> {
        let content = crate::error::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| Error::yaml(path, e))
    }

    pub fn parse(content: &str) -> Result<PlatformConfig> {
        serde_yaml::from_str(content).map_err(|e| Error::yaml("<platform>", e))
    }

    /// Check the cross-field expectations serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();
        if let Some(ref schema) = self.schema_type {
            if schema != SCHEMA_TYPE {
                issues.push(format!("schema_type must be '{}', got '{}'", SCHEMA_TYPE, schema));
            }
        }
        for (field, value) in [
            ("host", &self.host),
            ("user", &self.user),
            ("remote_root", &self.remote_root),
        ] {
            if value.trim().is_empty() {
                issues.push(format!("'{}' must not be empty", field));
            }
        }
        if self.port == 0 {
            issues.push("'port' must be non-zero".to_string());
        }
        if !is_python_command(self.interpreter.base_python()) {
            issues.push(format!(
                "interpreter python '{}' is not a python executable",
                self.interpreter.base_python()
            ));
        }
        if let Interpreter::Virtualenv { location, name, .. } = &self.interpreter {
            if location.trim().is_empty() || name.trim().is_empty() {
                issues.push("virtualenv interpreter needs 'location' and 'name'".to_string());
            }
        }
        if self.runner.package.trim().is_empty() {
            issues.push("runner.package must not be empty".to_string());
        }
        if Path::new(&self.runner.platform).is_absolute() {
            issues.push("runner.platform must be relative to the box root".to_string());
        }
        for key in self.env.keys() {
            if !is_env_name(key) {
                issues.push(format!("'{}' is not a valid environment variable name", key));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation { issues })
        }
    }

    /// Connection view of this platform.
    pub fn remote_config(&self, name: &str, connect_timeout_secs: u32) -> RemoteConfig {
        RemoteConfig {
            name: name.to_string(),
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            identity_file: self.identity_file.clone(),
            remote_root: self.remote_root.clone(),
            connect_timeout_secs,
        }
    }

    /// `export K=V && ` prefix for remote commands (empty without variables).
    pub fn env_prefix(&self) -> String {
        if self.env.is_empty() {
            return String::new();
        }
        let assignments: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, shell_quote(v)))
            .collect();
        format!("export {} && ", assignments.join(" "))
    }
}


/// `python`, `python3`, `python3.6` or an absolute path to one.
fn is_python_command(cmd: &str) -> bool {
    let base = cmd.rsplit('/').next().unwrap_or(cmd);
    if cmd.contains('/') && !cmd.starts_with('/') && !cmd.starts_with('~') {
        return false;
    }
    let rest = match base.strip_prefix("python") {
        Some(r) => r,
        None => return false,
    };
    rest.is_empty()
        || rest
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}


/// Deserialize a mapping whose values may be any YAML scalar into strings.
pub(crate) fn scalar_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    for (key, value) in raw.unwrap_or_default() {
        let text = scalar_to_string(&value)
            .ok_or_else(|| D::Error::custom(format!("value of '{}' must be a scalar", key)))?;
        out.insert(key, text);
    }
    Ok(out)
}

/// Render a YAML scalar as text; `None` for null, sequences and mappings.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(t) => scalar_to_string(&t.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"
schema_type: mlbox_ssh
host: gpu-box.example.org
user: ubuntu
identity_file: ~/.ssh/gpu
remote_root: /home/ubuntu/mlboxes
sync:
  flags: ["-r", "-v"]
  exclude: ["workspace/data"]
interpreter:
  type: virtualenv
  python: python3.6
  requirements: mlcommons-box-docker
  location: /home/ubuntu/.virtualenvs
  name: mlbox
env:
  CUDA_VISIBLE_DEVICES: 0
  HTTP_PROXY: "http://proxy:3128"
"#;

    #[test]
    fn parse_full_template() {
        let p = PlatformConfig::parse(TEMPLATE).unwrap();
        assert_eq!(p.host, "gpu-box.example.org");
        assert_eq!(p.port, 22);
        assert_eq!(p.identity_file.as_deref(), Some("~/.ssh/gpu"));
        assert_eq!(p.sync.flags, vec!["-r".to_string(), "-v".to_string()]);
        assert_eq!(p.env["CUDA_VISIBLE_DEVICES"], "0");
        assert_eq!(p.runner, RemoteRunner::default());
        assert!(p.validate().is_ok());
        assert_eq!(
            p.interpreter.python_command(),
            "/home/ubuntu/.virtualenvs/mlbox/bin/python"
        );
    }

    #[test]
    fn parse_minimal_uses_defaults() {
        let p = PlatformConfig::parse("host: h\nuser: u\nremote_root: /r\n").unwrap();
        assert_eq!(p.port, 22);
        assert_eq!(p.sync, SyncOptions::default());
        assert_eq!(p.interpreter, Interpreter::default());
        assert_eq!(p.interpreter.python_command(), "python3");
        assert!(p.env.is_empty());
        assert!(p.validate().is_ok());
    }

    #[test]
    fn missing_host_is_parse_error() {
        let err = PlatformConfig::parse("user: u\nremote_root: /r\n").unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn virtualenv_without_location_is_parse_error() {
        let yaml = "host: h\nuser: u\nremote_root: /r\ninterpreter:\n  type: virtualenv\n  name: x\n";
        assert!(PlatformConfig::parse(yaml).is_err());
    }

    #[test]
    fn nested_env_value_rejected() {
        let yaml = "host: h\nuser: u\nremote_root: /r\nenv:\n  A: [1, 2]\n";
        assert!(PlatformConfig::parse(yaml).is_err());
    }

    #[test]
    fn validate_collects_issues() {
        let yaml = "schema_type: other\nhost: ''\nuser: u\nremote_root: /r\n\
                    interpreter:\n  type: system\n  python: ruby\nenv:\n  1BAD: x\n";
        let p = PlatformConfig::parse(yaml).unwrap();
        match p.validate().unwrap_err() {
            Error::Validation { issues } => {
                assert_eq!(issues.len(), 4, "{:?}", issues);
                assert!(issues.iter().any(|i| i.contains("schema_type")));
                assert!(issues.iter().any(|i| i.contains("'host'")));
                assert!(issues.iter().any(|i| i.contains("ruby")));
                assert!(issues.iter().any(|i| i.contains("1BAD")));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn python_command_forms() {
        assert!(is_python_command("python"));
        assert!(is_python_command("python3"));
        assert!(is_python_command("python3.6"));
        assert!(is_python_command("/usr/bin/python3.8"));
        assert!(!is_python_command("python3."));
        assert!(!is_python_command("pythonista"));
        assert!(!is_python_command("bin/python"));
    }

    #[test]
    fn system_provisioning() {
        let interp = Interpreter::System {
            python: "python3".into(),
            requirements: Some("mlcommons-box-docker==0.1".into()),
        };
        assert_eq!(
            interp.provision_commands(),
            vec!["python3 -m pip install --user mlcommons-box-docker==0.1".to_string()]
        );
        assert!(Interpreter::default().provision_commands().is_empty());
    }

    #[test]
    fn virtualenv_provisioning() {
        let p = PlatformConfig::parse(TEMPLATE).unwrap();
        let cmds = p.interpreter.provision_commands();
        assert_eq!(cmds.len(), 3);
        assert_eq!(cmds[0], "mkdir -p /home/ubuntu/.virtualenvs");
        assert!(cmds[1].contains("python3.6 -m venv /home/ubuntu/.virtualenvs/mlbox"));
        assert!(cmds[2].ends_with("pip install mlcommons-box-docker"));
    }

    #[test]
    fn home_relative_virtualenv_provisioning() {
        let interp = Interpreter::Virtualenv {
            python: "python3".into(),
            requirements: Some("mlcommons-box-docker".into()),
            location: "~/.virtualenvs".into(),
            name: "mlbox".into(),
        };
        let python = shell_quote(&interp.python_command());
        assert_eq!(python, "~/.virtualenvs/mlbox/bin/python");

        let cmds = interp.provision_commands();
        assert_eq!(cmds[0], "mkdir -p ~/.virtualenvs");
        assert_eq!(
            cmds[1],
            "test -x ~/.virtualenvs/mlbox/bin/python || python3 -m venv ~/.virtualenvs/mlbox"
        );
        assert_eq!(cmds[2], format!("{} -m pip install mlcommons-box-docker", python));
    }

    #[test]
    fn env_prefix_quotes_values() {
        let p = PlatformConfig::parse(TEMPLATE).unwrap();
        assert_eq!(
            p.env_prefix(),
            "export CUDA_VISIBLE_DEVICES=0 HTTP_PROXY=http://proxy:3128 && "
        );
        let mut q = p.clone();
        q.env.clear();
        assert_eq!(q.env_prefix(), "");
        q.env.insert("MSG".into(), "hello world".into());
        assert_eq!(q.env_prefix(), "export MSG='hello world' && ");
    }

    #[test]
    fn remote_config_copies_coordinates() {
        let p = PlatformConfig::parse(TEMPLATE).unwrap();
        let rc = p.remote_config("gpu", 15);
        assert_eq!(rc.name, "gpu");
        assert_eq!(rc.user_at_host(), "ubuntu@gpu-box.example.org");
        assert_eq!(rc.identity_file.as_deref(), Some("~/.ssh/gpu"));
        assert_eq!(rc.connect_timeout_secs, 15);
    }
}
