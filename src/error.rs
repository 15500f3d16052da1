//! Custom error types for the bridge.
//!
//! This module defines the primary error type, `BridgeError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of errors that can occur, from configuration issues to transport
//! and storage failures.
//!
//! ## Error Hierarchy
//!
//! `BridgeError` consolidates the failure sources that can reach a caller:
//!
//! - **`Config`**: Wraps errors from `figment`, typically TOML parse errors or values of
//!   the wrong type in the configuration layers.
//! - **`Configuration`**: Semantic errors in a configuration that parsed fine but is
//!   logically invalid (an unknown log level, a zero baud rate, ...).
//! - **`PortUnavailable`**, **`TransportRead`**, **`TransportWrite`**: Device level
//!   failures. A read failure is fatal for the reader loop; a write failure is reported
//!   to whoever tried to issue a command.
//! - **`Storage`** / **`Csv`**: Failures of the sample archive. The reader loop logs
//!   these and keeps going; query endpoints surface them.
//! - **`SerialFeatureDisabled`**: Returned when a device is opened in a build without
//!   the `serial` feature, with a message on how to enable it.
//!
//! Frame-level problems (malformed telemetry, stray responses) never become a
//! `BridgeError`: they are logged and the frame is dropped so the stream keeps flowing.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, BridgeError>;

/// Every error the bridge can hand back to a caller.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration layers failed to parse or extract.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but holds invalid values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Neither the configured nor any fallback port could be opened.
    #[error("Failed to open serial port '{port}': {reason}")]
    PortUnavailable {
        /// Device path that was tried.
        port: String,
        /// Why opening failed.
        reason: String,
    },

    /// Error reported by the serial driver.
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Command bytes could not be written.
    #[error("Failed to write to serial port: {0}")]
    TransportWrite(std::io::Error),

    /// Reading from the device failed; fatal for the reader loop.
    #[error("Failed to read from serial port: {0}")]
    TransportRead(std::io::Error),

    /// Built without the `serial` feature.
    #[error("Serial support not enabled. Rebuild with --features serial")]
    SerialFeatureDisabled,

    /// Sample archive could not be opened or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// CSV encoding or decoding failed.
    #[error("CSV archive error: {0}")]
    Csv(#[from] csv::Error),

    /// Tracing subscriber setup failed.
    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    /// The reader thread panicked instead of returning.
    #[error("Reader thread panicked")]
    ReaderPanicked,
}

impl From<figment::Error> for BridgeError {
    fn from(value: figment::Error) -> Self {
        BridgeError::Config(Box::new(value))
    }
}

#[cfg(feature = "serial")]
impl From<serialport::Error> for BridgeError {
    fn from(value: serialport::Error) -> Self {
        BridgeError::Serial(value.to_string())
    }
}
