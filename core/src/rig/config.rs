//! SSH coordinates of a remote host.
//!
//! `RemoteConfig` is the connection-level view of a platform descriptor:
//! where to log in and where boxes live on the remote side. It builds the
//! base ssh arguments shared by remote execution and rsync transport.

use serde::{Deserialize, Serialize};


/// Configuration for a single remote host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteConfig {
    /// Name used in logs and job records (usually the platform file stem).
    pub name: String,
    /// Hostname or IP address.
    pub host: String,
    /// SSH port.
    pub port: u16,
    /// SSH user.
    pub user: String,
    /// Path to an SSH private key, if not using the default.
    pub identity_file: Option<String>,
    /// Directory on the remote host that holds synced boxes.
    pub remote_root: String,
    /// `ConnectTimeout` passed to ssh, in seconds.
    pub connect_timeout_secs: u32,
}

impl RemoteConfig {
    /// Build the `user@host` string used in SSH/rsync commands.
    pub fn user_at_host(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Base ssh options without the destination.
    ///
    /// `BatchMode=yes` makes ssh fail instead of prompting for a password
    /// when key authentication is not set up.
    pub fn ssh_options(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ];
        if let Some(ref key) = self.identity_file {
            args.push("-i".to_string());
            args.push(key.clone());
        }
        args
    }

    /// Build base SSH arguments (options then user@host) without a command.
    pub fn ssh_base_args(&self) -> Vec<String> {
        let mut args = self.ssh_options();
        args.push(self.user_at_host());
        args
    }

    /// `user@host:path` as understood by rsync.
    pub fn remote_spec(&self, path: &str) -> String {
        format!("{}:{}", self.user_at_host(), path)
    }

    /// Join a path below `remote_root`.
    pub fn remote_path(&self, relative: &str) -> String {
        let root = self.remote_root.trim_end_matches('/');
        let rel = relative.trim_start_matches('/');
        if rel.is_empty() {
            root.to_string()
        } else if root.is_empty() {
            format!("/{}", rel)
        } else {
            format!("{}/{}", root, rel)
        }
    }
}


#[cfg(test)]
pub(crate) fn test_remote() -> RemoteConfig {
    RemoteConfig {
        name: "r1".to_string(),
        host: "10.0.0.1".to_string(),
        port: 22,
        user: "ubuntu".to_string(),
        identity_file: None,
        remote_root: "/home/ubuntu/mlboxes".to_string(),
        connect_timeout_secs: 10,
    }
}
