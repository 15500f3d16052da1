//! # Sensor Bridge Core Library
//!
//! Bridges a line-oriented serial sensor to a small HTTP API. The device streams
//! `$pressure,temperature,velocity` telemetry and answers `$0`/`$1`/`$2` commands on the
//! same line; this crate separates the two, archives the telemetry and turns each
//! command into a blocking, timeout-bounded request/response call.
//!
//! ## Crate Structure
//!
//! - **`protocol`**: Frame extraction from the raw byte stream, the command and response
//!   vocabulary, and telemetry decoding into half-precision samples.
//! - **`classifier`**: Decides whether a frame is a command response or telemetry.
//! - **`correlator`**: The single pending-command slot; matches responses to the command
//!   in flight and wakes its caller, or times out.
//! - **`reader`**: The dedicated thread that drives transport → extractor → classifier.
//! - **`transport`**: The `Transport` trait, the `serialport`-backed implementation with
//!   pseudo-terminal fallback, and an in-memory mock device.
//! - **`storage`**: The `SampleStore` trait, a CSV archive and an in-memory store.
//! - **`bridge`**: The facade the HTTP layer calls.
//! - **`http`**: The axum router and handlers.
//! - **`config`**, **`logging`**, **`error`**: Figment configuration, tracing setup and
//!   the crate error type.

pub mod bridge;
pub mod classifier;
pub mod config;
pub mod correlator;
pub mod error;
pub mod http;
pub mod logging;
pub mod protocol;
pub mod reader;
pub mod storage;
pub mod transport;

pub use bridge::Bridge;
pub use error::{AppResult, BridgeError};
