//! Command-line flags and their merge with the config file.

use std::path::PathBuf;

use clap::{Args, ValueEnum};

use berth_core::{BerthConfig, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Flags accepted by every subcommand. Flags win over the config file.
#[derive(Debug, Clone, Args)]
pub struct SharedArgs {
    /// TOML config file. Built-in defaults apply when omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// etcd endpoint, tried in the order given. Repeatable.
    #[arg(long = "registry-endpoint", value_name = "URL")]
    pub registry_endpoints: Vec<String>,

    /// Docker Engine API socket.
    #[arg(long)]
    pub docker_socket: Option<PathBuf>,

    /// Use this host identifier instead of querying instance metadata.
    #[arg(long)]
    pub host_id: Option<String>,

    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

impl SharedArgs {
    pub fn load_settings(&self) -> anyhow::Result<Settings> {
        let config = match &self.config {
            Some(path) => BerthConfig::from_file(path)?,
            None => BerthConfig::default(),
        };
        Ok(self.apply(config).resolve()?)
    }

    fn apply(&self, mut config: BerthConfig) -> BerthConfig {
        if !self.registry_endpoints.is_empty() {
            config.registry.get_or_insert_with(Default::default).endpoints =
                Some(self.registry_endpoints.clone());
        }
        if let Some(socket) = &self.docker_socket {
            config.runtime.get_or_insert_with(Default::default).socket = Some(socket.clone());
        }
        if let Some(host_id) = &self.host_id {
            let host = config.host.get_or_insert_with(Default::default);
            host.identity = Some("static".to_string());
            host.fallback_id = Some(host_id.clone());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use berth_core::config::IdentitySource;

    fn args() -> SharedArgs {
        SharedArgs {
            config: None,
            registry_endpoints: Vec::new(),
            docker_socket: None,
            host_id: None,
            log_format: LogFormat::Text,
        }
    }

    #[test]
    fn flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[registry]
endpoints = ["http://10.0.0.1:2379"]
root = "/fleet"

[runtime]
socket = "/tmp/file.sock"
"#
        )
        .unwrap();

        let args = SharedArgs {
            config: Some(file.path().to_path_buf()),
            registry_endpoints: vec!["http://127.0.0.1:2379".to_string()],
            docker_socket: Some(PathBuf::from("/tmp/flag.sock")),
            ..args()
        };
        let settings = args.apply(BerthConfig::from_file(file.path()).unwrap())
            .resolve_with_env(|_| None)
            .unwrap();

        assert_eq!(settings.registry_endpoints, vec!["http://127.0.0.1:2379"]);
        assert_eq!(settings.registry_root, "/fleet");
        assert_eq!(settings.docker_socket, PathBuf::from("/tmp/flag.sock"));
    }

    #[test]
    fn host_id_flag_selects_static_identity() {
        let args = SharedArgs {
            host_id: Some("node-7".to_string()),
            ..args()
        };
        let settings = args
            .apply(BerthConfig::default())
            .resolve_with_env(|_| None)
            .unwrap();

        assert_eq!(settings.identity, IdentitySource::Static);
        assert_eq!(settings.fallback_host_id, "node-7");
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let args = SharedArgs {
            config: Some(PathBuf::from("/nonexistent/berth.toml")),
            ..args()
        };
        assert!(args.load_settings().is_err());
    }
}
