use crate::network::TransportKind;
use crate::p2p::ManagerConfig;
use crate::transport::TransportSettings;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variables `TRADENET__<FIELD>` (nested with `__`) override the config file.
pub const ENV_PREFIX: &str = "TRADENET";

fn default_transport() -> TransportKind {
    TransportKind::Clear
}
fn default_io_pool_workers() -> usize {
    4
}
fn default_maintenance_interval_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_transport")]
    pub transport: TransportKind,
    /// Listening port; the transport's default port when unset.
    #[serde(default)]
    pub port: Option<u16>,
    /// Root of all persisted state; `~/.tradenet` when unset.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    /// Peers dialed on start, as `PUBKEY@HOST:PORT`.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    #[serde(default)]
    pub transports: TransportSettings,
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default = "default_io_pool_workers")]
    pub io_pool_workers: usize,
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            transport: default_transport(),
            port: None,
            base_dir: None,
            bootstrap_peers: vec![],
            transports: TransportSettings::default(),
            network: NetworkSettings::default(),
            io_pool_workers: default_io_pool_workers(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
        }
    }
}

/// Connection manager timings.
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkSettings {
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_backoff_millis")]
    pub backoff_millis: u64,
    #[serde(default = "default_send_queue_size")]
    pub send_queue_size: usize,
    /// Connections quiet for longer are closed.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Connections quiet for longer are pinged.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_handshake_timeout_secs() -> u64 {
    30
}
fn default_connect_attempts() -> u32 {
    3
}
fn default_backoff_millis() -> u64 {
    1000
}
fn default_send_queue_size() -> usize {
    64
}
fn default_idle_timeout_secs() -> u64 {
    300
}
fn default_keep_alive_secs() -> u64 {
    60
}

impl Default for NetworkSettings {
    fn default() -> Self {
        NetworkSettings {
            handshake_timeout_secs: default_handshake_timeout_secs(),
            connect_attempts: default_connect_attempts(),
            backoff_millis: default_backoff_millis(),
            send_queue_size: default_send_queue_size(),
            idle_timeout_secs: default_idle_timeout_secs(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl NetworkSettings {
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            connect_attempts: self.connect_attempts,
            backoff_delta: Duration::from_millis(self.backoff_millis),
            send_queue_size: self.send_queue_size,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

impl Settings {
    /// Reads the optional config file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn base_dir(&self) -> PathBuf {
        match &self.base_dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".tradenet"),
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.transport.default_port())
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let settings: Settings = Config::builder().build().unwrap().try_deserialize().unwrap();
        assert_eq!(settings.transport, TransportKind::Clear);
        assert_eq!(settings.port(), 8000);
        assert_eq!(settings.network.idle_timeout(), Duration::from_secs(300));
        assert_eq!(settings.transports.tor.socks_port, 19050);
        assert!(settings.base_dir().ends_with(".tradenet"));
    }

    #[test]
    fn reads_a_toml_file() {
        let dir = std::env::temp_dir().join(format!("tradenet-settings-{}", crate::id::Id::generate()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("node.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "transport = \"tor\"\nbootstrap_peers = [\"a@b:1\"]\n\n[network]\nconnect_attempts = 7\n\n[transports.tor]\nsocks_port = 9150"
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.transport, TransportKind::Tor);
        assert_eq!(settings.port(), 9999);
        assert_eq!(settings.network.connect_attempts, 7);
        assert_eq!(settings.network.send_queue_size, 64);
        assert_eq!(settings.transports.tor.socks_port, 9150);
        assert_eq!(settings.bootstrap_peers, vec!["a@b:1".to_owned()]);
    }
}
