//! Hub configuration.
//!
//! Stored as TOML at `$SMARTHUB_CONFIG`, or else:
//! - Linux: `~/.config/smarthub/hub.toml`
//! - Windows: `%APPDATA%/smarthub/hub.toml`

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use smarthub_hub_server::HubConfig;
use smarthub_protocol::constants::{
    ACK_TIMEOUT, DEFAULT_COMMAND_PORT, DEFAULT_TELEMETRY_PORT, PACKETS_PER_CYCLE,
};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "SMARTHUB_CONFIG";

/// Hub configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address both channels bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port for device registration and commands.
    #[serde(default = "default_command_port")]
    pub command_port: u16,

    /// UDP port for telemetry.
    #[serde(default = "default_telemetry_port")]
    pub telemetry_port: u16,

    /// Readings per telemetry cycle.
    #[serde(default = "default_packets_per_cycle")]
    pub packets_per_cycle: usize,

    /// Seconds to wait for a device to acknowledge a command.
    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,

    /// Operational log for the command channel.
    #[serde(default = "default_command_log")]
    pub command_log: String,

    /// Operational log for the telemetry channel.
    #[serde(default = "default_telemetry_log")]
    pub telemetry_log: String,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_command_port() -> u16 {
    DEFAULT_COMMAND_PORT
}

fn default_telemetry_port() -> u16 {
    DEFAULT_TELEMETRY_PORT
}

fn default_packets_per_cycle() -> usize {
    PACKETS_PER_CYCLE
}

fn default_ack_timeout_secs() -> u64 {
    ACK_TIMEOUT.as_secs()
}

fn default_command_log() -> String {
    "server_log.txt".into()
}

fn default_telemetry_log() -> String {
    "sensor_data_log.txt".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            command_port: default_command_port(),
            telemetry_port: default_telemetry_port(),
            packets_per_cycle: default_packets_per_cycle(),
            ack_timeout_secs: default_ack_timeout_secs(),
            command_log: default_command_log(),
            telemetry_log: default_telemetry_log(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    /// Loads configuration from `path`, writing defaults there if missing.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Validates the file values and converts them for the server.
    pub fn hub_config(&self) -> anyhow::Result<HubConfig> {
        let host: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("invalid host address {:?}", self.host))?;
        anyhow::ensure!(self.packets_per_cycle > 0, "packets_per_cycle must be > 0");
        anyhow::ensure!(
            u32::try_from(self.packets_per_cycle).is_ok(),
            "packets_per_cycle must fit a sequence number (at most {})",
            u32::MAX
        );
        anyhow::ensure!(self.ack_timeout_secs > 0, "ack_timeout_secs must be > 0");

        Ok(HubConfig {
            command_addr: SocketAddr::new(host, self.command_port),
            telemetry_addr: SocketAddr::new(host, self.telemetry_port),
            packets_per_cycle: self.packets_per_cycle,
            ack_timeout: Duration::from_secs(self.ack_timeout_secs),
        })
    }
}

/// Returns the configuration file path.
fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("smarthub").join("hub.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("smarthub")
            .join("hub.toml")
    }
}
