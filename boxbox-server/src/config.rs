//! Server configuration
//!
//! Loaded from a JSON file (explicit `--config <path>` / `BOXBOX_CONFIG`, else
//! `<config_dir>/boxbox/config.json` when present), then overridden by a few
//! environment variables. Every field has a default, so an empty or missing
//! file is a valid configuration.

use crate::audio::QueueConfig;
use boxbox_core::trigger::DEFAULT_INTERRUPT_THRESHOLD;
use boxbox_core::{EngineConfig, SessionNumbering};
use boxbox_telemetry::DEFAULT_UDP_PORT;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_HTTP_PORT: u16 = 9120;

const CONFIG_ENV: &str = "BOXBOX_CONFIG";
const UDP_PORT_ENV: &str = "BOXBOX_UDP_PORT";
const HTTP_PORT_ENV: &str = "BOXBOX_HTTP_PORT";
const DEMO_ENV: &str = "BOXBOX_DEMO";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("missing value after --config")]
    MissingArgument,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub udp_bind: IpAddr,
    pub udp_port: u16,
    pub http_port: u16,

    pub tick_interval_secs: u64,
    pub grace_period_secs: u64,
    pub max_events_per_tick: usize,

    pub interrupt_threshold: u8,
    pub queue_capacity: usize,
    pub reconnect_delay_secs: u64,

    pub watchdog_interval_secs: u64,
    pub telemetry_timeout_secs: u64,
    /// 0 warns once per disconnect
    pub telemetry_lost_cooldown_secs: u64,

    pub generation_timeout_secs: u64,

    pub session_numbering: SessionNumbering,
    /// External account ids for the player slot and secondary player slot
    pub player_accounts: Vec<String>,
    pub lap_log_path: Option<PathBuf>,

    pub demo: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            udp_bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            udp_port: DEFAULT_UDP_PORT,
            http_port: DEFAULT_HTTP_PORT,
            tick_interval_secs: 3,
            grace_period_secs: 25,
            max_events_per_tick: 2,
            interrupt_threshold: DEFAULT_INTERRUPT_THRESHOLD,
            queue_capacity: 2,
            reconnect_delay_secs: 5,
            watchdog_interval_secs: 10,
            telemetry_timeout_secs: 30,
            telemetry_lost_cooldown_secs: 600,
            generation_timeout_secs: 8,
            session_numbering: SessionNumbering::Auto,
            player_accounts: Vec::new(),
            lap_log_path: None,
            demo: false,
        }
    }
}

impl Config {
    /// Load from the command line and process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let explicit = match config_path_from_args(std::env::args().skip(1))? {
            Some(path) => Some(path),
            None => std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        };
        let mut config = Self::load(explicit.as_deref())?;
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Read the config file. An explicit path must exist; the default
    /// location is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_config_path().filter(|path| path.exists()) {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_json(&raw).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw)
    }

    /// Apply `BOXBOX_*` overrides using `lookup` to read variables
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(UDP_PORT_ENV) {
            self.udp_port = parse_port(UDP_PORT_ENV, value)?;
        }
        if let Some(value) = lookup(HTTP_PORT_ENV) {
            self.http_port = parse_port(HTTP_PORT_ENV, value)?;
        }
        if let Some(value) = lookup(DEMO_ENV) {
            self.demo = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: DEMO_ENV,
                        value,
                    })
                }
            };
        }
        Ok(())
    }

    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.udp_bind, self.udp_port)
    }

    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.http_port))
    }

    /// Where the demo feed sends: loopback when bound to every interface
    pub fn demo_target(&self) -> SocketAddr {
        let ip = if self.udp_bind.is_unspecified() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.udp_bind
        };
        SocketAddr::new(ip, self.udp_port)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            grace_period: Duration::from_secs(self.grace_period_secs),
            max_events_per_tick: self.max_events_per_tick,
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            capacity: self.queue_capacity,
            interrupt_threshold: self.interrupt_threshold,
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
        }
    }

    pub fn lap_log_path(&self) -> PathBuf {
        self.lap_log_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("boxbox")
                .join("laps.ndjson")
        })
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("boxbox").join("config.json"))
}

/// Value of `--config <path>` or `--config=<path>`, if given
pub fn config_path_from_args(
    args: impl IntoIterator<Item = String>,
) -> Result<Option<PathBuf>, ConfigError> {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args
                .next()
                .map(|path| Some(PathBuf::from(path)))
                .ok_or(ConfigError::MissingArgument);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Ok(Some(PathBuf::from(path)));
        }
    }
    Ok(None)
}

fn parse_port(var: &'static str, value: String) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}
