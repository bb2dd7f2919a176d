//! Server configuration
//!
//! Manages server configuration settings and validation. Settings are read
//! from built-in defaults, an optional configuration file and `RAX_*`
//! environment variables, in that order of precedence.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use log::info;
use serde::Deserialize;

use crate::error::FtpServerError;
use crate::transfer::ModePolicy;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "rax.toml";
/// Environment variable overriding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "RAX_CONFIG";

/// One account accepted by USER/PASS.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UserCredential {
    pub username: String,
    pub password: String,
}

/// Server configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Address advertised in PASV replies; the bound address when unset.
    pub public_address: Option<IpAddr>,
    pub server_root: PathBuf,
    pub max_clients: usize,
    pub log_level: String,
    pub passive_port_min: u16,
    pub passive_port_max: u16,
    pub port_bind_retries: u32,
    pub mode_policy: ModePolicy,
    pub idle_timeout_ms: u64,
    pub grace_period_ms: u64,
    pub connection_timeout_ms: u64,
    /// Longest wait for the data layer to finish one transfer.
    pub transfer_timeout_ms: u64,
    pub shutdown_check_retries: u32,
    pub shutdown_check_interval_ms: u64,
    pub sweep_interval_ms: u64,
    pub users: Vec<UserCredential>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 2121,
            public_address: None,
            server_root: PathBuf::from("./server_root"),
            max_clients: 10,
            log_level: "info".to_string(),
            passive_port_min: 30000,
            passive_port_max: 30100,
            port_bind_retries: 3,
            mode_policy: ModePolicy::Both,
            idle_timeout_ms: 60_000,
            grace_period_ms: 2_000,
            connection_timeout_ms: 30_000,
            transfer_timeout_ms: 300_000,
            shutdown_check_retries: 3,
            shutdown_check_interval_ms: 30,
            sweep_interval_ms: 5_000,
            users: vec![UserCredential {
                username: "alice".to_string(),
                password: "alice123".to_string(),
            }],
        }
    }
}

impl ServerConfig {
    /// Loads the configuration from the file named by `RAX_CONFIG` (or
    /// `rax.toml` when present) and `RAX_*` environment overrides.
    pub fn load() -> Result<Self, FtpServerError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    /// Loads the configuration from an explicit file path. A missing file is
    /// not an error; defaults and environment still apply.
    pub fn load_from(path: &Path) -> Result<Self, FtpServerError> {
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("RAX").try_parsing(true))
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        info!("Configuration loaded (file: {})", path.display());
        Ok(config)
    }

    /// Checks the invariants the connection core relies on.
    pub fn validate(&self) -> Result<(), FtpServerError> {
        if self.passive_port_min > self.passive_port_max {
            return Err(FtpServerError::InvalidConfig(format!(
                "passive port range is empty: {} > {}",
                self.passive_port_min, self.passive_port_max
            )));
        }
        if self.port_bind_retries == 0 {
            return Err(FtpServerError::InvalidConfig(
                "port_bind_retries must be at least 1".into(),
            ));
        }
        if self.idle_timeout_ms == 0
            || self.grace_period_ms == 0
            || self.connection_timeout_ms == 0
            || self.transfer_timeout_ms == 0
        {
            return Err(FtpServerError::InvalidConfig(
                "timeouts must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Get the server root directory as a string
    pub fn server_root_str(&self) -> String {
        self.server_root.to_string_lossy().to_string()
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }

    pub fn shutdown_check_interval(&self) -> Duration {
        Duration::from_millis(self.shutdown_check_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port_bind_retries, 3);
        assert_eq!(config.mode_policy, ModePolicy::Both);
    }

    #[test]
    fn test_rejects_inverted_port_range() {
        let config = ServerConfig {
            passive_port_min: 40000,
            passive_port_max: 30000,
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FtpServerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
port = 2525
passive_port_min = 31000
passive_port_max = 31010
mode_policy = "passive"
grace_period_ms = 500

[[users]]
username = "carol"
password = "secret"
"#
        )
        .unwrap();

        let config = ServerConfig::load_from(file.path()).unwrap();
        assert_eq!(config.port, 2525);
        assert_eq!(config.passive_port_min, 31000);
        assert_eq!(config.passive_port_max, 31010);
        assert_eq!(config.mode_policy, ModePolicy::Passive);
        assert_eq!(config.grace_period(), Duration::from_millis(500));
        assert_eq!(config.users[0].username, "carol");
        // untouched keys keep their defaults
        assert_eq!(config.port_bind_retries, 3);
    }

    #[test]
    fn test_mode_policy_tristate_form() {
        for (value, expected) in [
            ("1", ModePolicy::Active),
            ("-1", ModePolicy::Passive),
            ("0", ModePolicy::Both),
        ] {
            let mut file = tempfile::Builder::new()
                .suffix(".toml")
                .tempfile()
                .unwrap();
            writeln!(file, "mode_policy = {value}").unwrap();
            let config = ServerConfig::load_from(file.path()).unwrap();
            assert_eq!(config.mode_policy, expected, "mode_policy = {value}");
        }
    }

    #[test]
    fn test_unknown_mode_policy_is_rejected() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, r#"mode_policy = "sideways""#).unwrap();
        assert!(matches!(
            ServerConfig::load_from(file.path()),
            Err(FtpServerError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.port, ServerConfig::default().port);
    }
}
