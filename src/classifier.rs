//! Frame routing.
//!
//! Telemetry and command responses share the same `$...` syntax. The only thing that
//! tells them apart is whether a command is in flight, so the correlator's armed flag
//! acts as a priority gate: while armed, a frame starting with a command prefix
//! (`$0`, `$1`, `$2`) is taken to be the response, even if it is really telemetry that
//! happened to arrive at that moment. Everything else is telemetry.

use crate::protocol::{CommandKind, Frame};

/// Where a frame goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition<'a> {
    /// Nothing after the marker; drop it.
    Malformed,
    /// Offer to the correlator.
    CommandResponse,
    /// Decode the payload (marker stripped) as telemetry.
    Telemetry(&'a str),
}

/// Decide what to do with `frame` given whether a command is `armed`.
pub fn classify(frame: &Frame, armed: bool) -> Disposition<'_> {
    if frame.is_empty() {
        return Disposition::Malformed;
    }
    if armed && CommandKind::is_command_prefix(frame.prefix()) {
        Disposition::CommandResponse
    } else {
        Disposition::Telemetry(frame.payload())
    }
}
