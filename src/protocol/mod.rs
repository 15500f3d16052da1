//! The device's line protocol.
//!
//! - [`frame`]: byte stream → `$`-anchored, newline-terminated frames
//! - [`command`]: command encoding and response status vocabulary
//! - [`telemetry`]: three-field sensor readings and their decoder

pub mod command;
pub mod frame;
pub mod telemetry;

pub use command::{CommandKind, ResponseStatus};
pub use frame::{Frame, FrameExtractor};
pub use telemetry::{DecodeOutcome, SensorSample, TelemetryDecoder, TelemetryError};
