//! Byte-stream link to the device.
//!
//! The bridge needs two handles on the same link: the reader loop reads from one, the
//! command correlator writes to the other. [`Transport::try_clone`] provides the second
//! handle.
//!
//! ## Read semantics
//!
//! `read` may block for at most the configured read timeout. "Nothing right now" is
//! reported as `Ok(0)` or as an error of kind `WouldBlock`/`TimedOut`; the reader loop
//! treats all three as idle. Any other error means the link is gone.
//!
//! ## Implementations
//!
//! - [`serial::SerialTransport`] (feature `serial`): physical ports and pseudo-terminals
//!   through the `serialport` crate.
//! - [`mock::MockTransport`]: scripted in-process device for tests.

pub mod mock;
#[cfg(feature = "serial")]
pub mod serial;

pub use mock::{MockDevice, MockTransport};
#[cfg(feature = "serial")]
pub use serial::SerialTransport;

use crate::config::SerialConfig;
use crate::error::{AppResult, BridgeError};
use std::io;
use tracing::warn;

/// A bidirectional byte stream to the device.
pub trait Transport: Send {
    /// Read whatever is available into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write `bytes`, returning how many were accepted.
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// `true` for pseudo-terminals and other links without a physical line.
    fn is_virtual(&self) -> bool;

    /// Change the line speed. Virtual links only record the new value.
    fn set_baud_rate(&mut self, baud_rate: u32) -> AppResult<()>;

    /// Current line speed.
    fn baud_rate(&self) -> u32;

    /// Device path or other identity, used as part of the archive key.
    fn port_name(&self) -> &str;

    /// A second handle on the same link.
    fn try_clone(&self) -> AppResult<Box<dyn Transport>>;
}

/// Write one encoded frame.
///
/// Best-effort: a single write call is made, and if the link accepts fewer bytes than
/// offered the shortfall is logged and not retried. Returns the number of bytes written.
pub fn write_frame(transport: &mut dyn Transport, frame: &[u8]) -> AppResult<usize> {
    match transport.write(frame) {
        Ok(written) if written == frame.len() => Ok(written),
        Ok(written) => {
            warn!(
                port = transport.port_name(),
                written,
                expected = frame.len(),
                "Not all bytes were written to serial port"
            );
            Ok(written)
        }
        Err(e) => Err(BridgeError::TransportWrite(e)),
    }
}

/// Open the device link described by `config`.
///
/// Tries `port`, then `fallback_port`, then (on Unix, if `virtual_fallback` is set) a
/// freshly created pseudo-terminal pair.
#[cfg(feature = "serial")]
pub fn open(config: &SerialConfig) -> AppResult<Box<dyn Transport>> {
    Ok(Box::new(SerialTransport::open_with_fallback(config)?))
}

/// Open the device link described by `config`.
#[cfg(not(feature = "serial"))]
pub fn open(_config: &SerialConfig) -> AppResult<Box<dyn Transport>> {
    Err(BridgeError::SerialFeatureDisabled)
}
