//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration loading for the bridge.
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults
//! 2. A TOML file (`config/bridge.toml` unless another path is given)
//! 3. Environment variables prefixed with `SENSOR_BRIDGE_`, `__` separating sections
//!    (e.g. `SENSOR_BRIDGE_SERIAL__PORT=/dev/ttyUSB1`)
//! 4. The short variables understood by earlier deployments:
//!    `PORT_NAME`, `BAUD_RATE`, `HOST_NAME`, `HTTP_PORT`, `DB_PATH`
//!
//! Command-line arguments are applied on top by the binary.
//!
//! # Example
//! ```no_run
//! use sensor_bridge::config::BridgeConfig;
//!
//! let config = BridgeConfig::load()?;
//! config.validate()?;
//! println!("Serial port: {}", config.serial.port);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{AppResult, BridgeError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/bridge.toml";

/// Prefix of environment variables read by [`BridgeConfig::load_from`].
pub const ENV_PREFIX: &str = "SENSOR_BRIDGE_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Device link settings
    pub serial: SerialConfig,
    /// HTTP listener settings
    pub http: HttpConfig,
    /// Sample archive settings
    pub storage: StorageConfig,
    /// Initial device configuration
    pub device: DeviceConfig,
    /// Command exchange settings
    pub command: CommandConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Serial device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path tried first
    #[serde(default = "default_port")]
    pub port: String,
    /// Device path tried when `port` cannot be opened
    #[serde(default = "default_fallback_port")]
    pub fallback_port: String,
    /// Line speed; non-standard rates are allowed on Linux
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// How long a single read may block before the reader loop re-checks shutdown
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Create a pseudo-terminal when neither device path can be opened
    #[serde(default = "default_virtual_fallback")]
    pub virtual_fallback: bool,
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Host name or address to bind
    #[serde(default = "default_http_host")]
    pub host: String,
    /// TCP port to bind
    #[serde(default = "default_http_port")]
    pub port: u16,
}

/// Sample archive configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// CSV archive file
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

/// Device configuration assumed at start-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Sampling rate (1-255)
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: u8,
    /// Debug mode flag
    #[serde(default)]
    pub debug: bool,
}

/// Command exchange configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// How long a caller waits for the device to answer a command
    #[serde(default = "default_command_timeout")]
    pub timeout_ms: u64,
    /// Reader loop sleep when the device has nothing to say
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_port() -> String {
    "/dev/ttyS11".to_string()
}

fn default_fallback_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    115_000
}

fn default_read_timeout() -> u64 {
    100
}

fn default_virtual_fallback() -> bool {
    true
}

fn default_http_host() -> String {
    "localhost".to_string()
}

fn default_http_port() -> u16 {
    7099
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("database.csv")
}

fn default_sampling_rate() -> u8 {
    115
}

fn default_command_timeout() -> u64 {
    10_000
}

fn default_poll_interval() -> u64 {
    10
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            fallback_port: default_fallback_port(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout(),
            virtual_fallback: default_virtual_fallback(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sampling_rate: default_sampling_rate(),
            debug: false,
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_command_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl SerialConfig {
    /// Per-read blocking limit.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl CommandConfig {
    /// Deadline for one command exchange.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Idle sleep of the reader loop.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl BridgeConfig {
    /// Load configuration from `config/bridge.toml` and the environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path plus the environment.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// The layered provider chain, exposed so callers can merge further layers.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(BridgeConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(short_env())
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.serial.port.trim().is_empty() {
            return Err(invalid("serial.port must not be empty".to_string()));
        }

        if self.serial.baud_rate == 0 {
            return Err(invalid("serial.baud_rate must be positive".to_string()));
        }

        if self.storage.path.as_os_str().is_empty() {
            return Err(invalid("storage.path must not be empty".to_string()));
        }

        if self.device.sampling_rate == 0 {
            return Err(invalid(
                "device.sampling_rate must be between 1 and 255".to_string(),
            ));
        }

        if self.command.timeout_ms == 0 {
            return Err(invalid("command.timeout_ms must be positive".to_string()));
        }

        Ok(())
    }
}

/// Unprefixed variables mapped onto their nested keys.
fn short_env() -> Env {
    Env::raw()
        .only(&["PORT_NAME", "BAUD_RATE", "HOST_NAME", "HTTP_PORT", "DB_PATH"])
        .map(|key| match key.as_str().to_ascii_uppercase().as_str() {
            "PORT_NAME" => "serial.port".into(),
            "BAUD_RATE" => "serial.baud_rate".into(),
            "HOST_NAME" => "http.host".into(),
            "HTTP_PORT" => "http.port".into(),
            "DB_PATH" => "storage.path".into(),
            _ => key.into(),
        })
}

fn invalid(message: String) -> BridgeError {
    BridgeError::Configuration(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.serial.port, "/dev/ttyS11");
        assert_eq!(config.serial.fallback_port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 115_000);
        assert_eq!(config.http.host, "localhost");
        assert_eq!(config.http.port, 7099);
        assert_eq!(config.device.sampling_rate, 115);
        assert!(!config.device.debug);
        assert_eq!(config.command.timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = BridgeConfig::load_from("does-not-exist.toml")?;
            assert_eq!(config, BridgeConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bridge.toml",
                r#"
                [serial]
                port = "/dev/ttyACM0"
                baud_rate = 9600

                [command]
                timeout_ms = 2500
                "#,
            )?;

            let config = BridgeConfig::load_from("bridge.toml")?;
            assert_eq!(config.serial.port, "/dev/ttyACM0");
            assert_eq!(config.serial.baud_rate, 9600);
            assert_eq!(config.serial.fallback_port, "/dev/ttyUSB0");
            assert_eq!(config.command.timeout_ms, 2500);
            assert_eq!(config.http.port, 7099);
            Ok(())
        });
    }

    #[test]
    fn test_prefixed_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("bridge.toml", "[http]\nport = 8000\n")?;
            jail.set_env("SENSOR_BRIDGE_HTTP__PORT", "8100");
            jail.set_env("SENSOR_BRIDGE_DEVICE__DEBUG", "true");

            let config = BridgeConfig::load_from("bridge.toml")?;
            assert_eq!(config.http.port, 8100);
            assert!(config.device.debug);
            Ok(())
        });
    }

    #[test]
    fn test_short_env_names() {
        Jail::expect_with(|jail| {
            jail.set_env("PORT_NAME", "/dev/pts/7");
            jail.set_env("DB_PATH", "test_database.csv");
            jail.set_env("HTTP_PORT", "7100");

            let config = BridgeConfig::load_from("missing.toml")?;
            assert_eq!(config.serial.port, "/dev/pts/7");
            assert_eq!(config.storage.path, PathBuf::from("test_database.csv"));
            assert_eq!(config.http.port, 7100);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = BridgeConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(matches!(
            config.validate(),
            Err(BridgeError::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = BridgeConfig::default();
        config.serial.baud_rate = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.device.sampling_rate = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.command.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.application.log_format = "xml".to_string();
        assert!(config.validate().is_err());
    }
}
