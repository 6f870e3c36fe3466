//! Runtime configuration for the daemon.
//!
//! Loaded once at startup from a TOML file; a missing file yields defaults so
//! a fresh install starts with enforcement off and sampling on.

use serde::Deserialize;
use std::path::PathBuf;

const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".gatehouse/config.toml";

pub const DEFAULT_SAMPLER_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct WhitelistConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub notify_admins: bool,
    #[serde(default = "default_notify_permission")]
    pub notify_permission: String,
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            notify_admins: false,
            notify_permission: default_notify_permission(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_sampler_interval")]
    pub interval_secs: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sampler_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Empty or absent means the default path under the state directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServersConfig {
    /// Backend servers registered with the proxy.
    #[serde(default)]
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesConfig {
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_denied_message")]
    pub denied: String,
    #[serde(default = "default_denied_notify_message")]
    pub denied_notify: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            denied: default_denied_message(),
            denied_notify: default_denied_notify_message(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub whitelist: WhitelistConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub servers: ServersConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
}

fn default_notify_permission() -> String {
    "gatehouse.whitelist.notify".to_string()
}

fn default_sampler_interval() -> u64 {
    DEFAULT_SAMPLER_INTERVAL_SECS
}

fn default_denied_message() -> String {
    "You are not on the allow-list of this proxy.".to_string()
}

fn default_denied_notify_message() -> String {
    "Denied connection attempt by".to_string()
}

pub fn default_config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(DEFAULT_CONFIG_RELATIVE_PATH))
}

pub fn load_runtime_config(path: Option<PathBuf>) -> Result<RuntimeConfig, String> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(RuntimeConfig::default());
    }

    let content = fs_err::read_to_string(&config_path)
        .map_err(|err| format!("Failed to read config {}: {}", config_path.display(), err))?;
    toml::from_str::<RuntimeConfig>(&content)
        .map_err(|err| format!("Failed to parse config {}: {}", config_path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("missing.toml");
        let config = load_runtime_config(Some(path)).expect("load config");
        assert!(!config.whitelist.enabled);
        assert!(!config.whitelist.notify_admins);
        assert_eq!(config.sampler.interval_secs, 30);
        assert!(config.servers.names.is_empty());
        assert!(config.database.path.is_none());
    }

    #[test]
    fn parses_full_file() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(
            &path,
            r#"
[whitelist]
enabled = true
notify_admins = true
notify_permission = "proxy.staff"

[sampler]
interval_secs = 10

[database]
path = "/var/lib/gatehouse/gatehouse.db"

[servers]
names = ["lobby", "arena"]

[messages]
prefix = "[proxy]"
denied = "No entry."
"#,
        )
        .expect("write config");

        let config = load_runtime_config(Some(path)).expect("load config");
        assert!(config.whitelist.enabled);
        assert!(config.whitelist.notify_admins);
        assert_eq!(config.whitelist.notify_permission, "proxy.staff");
        assert_eq!(config.sampler.interval_secs, 10);
        assert_eq!(
            config.database.path.as_deref(),
            Some(std::path::Path::new("/var/lib/gatehouse/gatehouse.db"))
        );
        assert_eq!(config.servers.names, vec!["lobby", "arena"]);
        assert_eq!(config.messages.prefix, "[proxy]");
        assert_eq!(config.messages.denied, "No entry.");
        assert_eq!(config.messages.denied_notify, "Denied connection attempt by");
    }

    #[test]
    fn missing_sections_keep_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(&path, "[whitelist]\nenabled = true\n").expect("write config");

        let config = load_runtime_config(Some(path)).expect("load config");
        assert!(config.whitelist.enabled);
        assert_eq!(
            config.whitelist.notify_permission,
            "gatehouse.whitelist.notify"
        );
        assert_eq!(config.sampler.interval_secs, 30);
    }

    #[test]
    fn rejects_malformed_file() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(&path, "[whitelist\nenabled").expect("write config");
        assert!(load_runtime_config(Some(path)).is_err());
    }
}
