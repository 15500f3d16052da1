//! Serial transport over the `serialport` crate.
//!
//! Handles physical ports (`/dev/ttyUSB0`, `/dev/ttyS11`) and Unix pseudo-terminals,
//! which is what a software device emulator usually exposes. Pseudo-terminals are
//! recognised by their device major number; for those the baud rate is only recorded,
//! never programmed into hardware.

use super::Transport;
use crate::config::SerialConfig;
use crate::error::{AppResult, BridgeError};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

#[cfg(unix)]
use serialport::TTYPort;
#[cfg(unix)]
use std::sync::{Arc, Mutex};

/// Linux major number of `/dev/pts/*` devices.
pub const PTY_SLAVE_MAJOR: u64 = 136;

/// A serial port opened for the bridge.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
    baud_rate: u32,
    is_virtual: bool,
    /// Keeps the far end of a self-created pty open so reads don't fail with EIO
    /// before an emulator attaches.
    #[cfg(unix)]
    peer: Option<Arc<Mutex<TTYPort>>>,
}

impl SerialTransport {
    /// Open `path` at `baud_rate`, with `read_timeout` bounding each read.
    pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> AppResult<Self> {
        if !Path::new(path).exists() {
            return Err(BridgeError::PortUnavailable {
                port: path.to_string(),
                reason: "No such device".to_string(),
            });
        }

        let is_virtual = is_pseudo_terminal(path);
        // A rate of 0 tells serialport to skip speed setup; ptys have no line speed.
        let open_rate = if is_virtual { 0 } else { baud_rate };
        let port = serialport::new(path, open_rate)
            .timeout(read_timeout)
            .open()
            .map_err(|e| BridgeError::PortUnavailable {
                port: path.to_string(),
                reason: e.to_string(),
            })?;

        if is_virtual {
            info!(port = path, "Opened virtual serial port; baud rate is not applied");
        } else {
            info!(port = path, baud_rate, "Opened serial port");
        }

        Ok(Self {
            port,
            name: path.to_string(),
            baud_rate,
            is_virtual,
            #[cfg(unix)]
            peer: None,
        })
    }

    /// Open the configured port, falling back to the secondary port and then to a
    /// newly created pseudo-terminal.
    pub fn open_with_fallback(config: &SerialConfig) -> AppResult<Self> {
        let timeout = config.read_timeout();

        let primary_error = match Self::open(&config.port, config.baud_rate, timeout) {
            Ok(transport) => return Ok(transport),
            Err(e) => {
                warn!(port = %config.port, error = %e, "Primary serial port unavailable");
                e
            }
        };

        if config.fallback_port != config.port {
            match Self::open(&config.fallback_port, config.baud_rate, timeout) {
                Ok(transport) => {
                    info!(port = %config.fallback_port, "Using fallback serial port");
                    return Ok(transport);
                }
                Err(e) => {
                    warn!(port = %config.fallback_port, error = %e, "Fallback serial port unavailable");
                }
            }
        }

        #[cfg(unix)]
        {
            if config.virtual_fallback {
                let (transport, peer_path) = Self::create_virtual(config.baud_rate, timeout)?;
                info!(
                    peer = %peer_path,
                    "Created virtual serial port; connect the device emulator to the peer path"
                );
                return Ok(transport);
            }
        }

        Err(primary_error)
    }

    /// Create a pseudo-terminal pair and return our end plus the path of the other.
    #[cfg(unix)]
    pub fn create_virtual(baud_rate: u32, read_timeout: Duration) -> AppResult<(Self, String)> {
        let (mut master, mut slave) = TTYPort::pair()?;
        master.set_timeout(read_timeout)?;
        // Let the emulator open the peer path while we hold it.
        slave.set_exclusive(false)?;

        let peer_path = slave.name().ok_or_else(|| {
            BridgeError::Serial("pseudo-terminal pair has no peer path".to_string())
        })?;

        let transport = Self {
            port: Box::new(master),
            name: peer_path.clone(),
            baud_rate,
            is_virtual: true,
            peer: Some(Arc::new(Mutex::new(slave))),
        };
        Ok((transport, peer_path))
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let written = self.port.write(bytes)?;
        self.port.flush()?;
        Ok(written)
    }

    fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> AppResult<()> {
        if self.is_virtual {
            info!(port = %self.name, baud_rate, "Virtual port: recording baud rate only");
        } else {
            self.port.set_baud_rate(baud_rate)?;
            info!(port = %self.name, baud_rate, "Baud rate changed");
        }
        self.baud_rate = baud_rate;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn port_name(&self) -> &str {
        &self.name
    }

    fn try_clone(&self) -> AppResult<Box<dyn Transport>> {
        Ok(Box::new(Self {
            port: self.port.try_clone()?,
            name: self.name.clone(),
            baud_rate: self.baud_rate,
            is_virtual: self.is_virtual,
            #[cfg(unix)]
            peer: self.peer.clone(),
        }))
    }
}

/// `true` if `path` is a `/dev/pts/*` style pseudo-terminal.
#[cfg(unix)]
pub fn is_pseudo_terminal(path: &str) -> bool {
    use std::os::unix::fs::{FileTypeExt, MetadataExt};

    match std::fs::metadata(path) {
        Ok(meta) => meta.file_type().is_char_device() && device_major(meta.rdev()) == PTY_SLAVE_MAJOR,
        Err(_) => false,
    }
}

/// `true` if `path` is a `/dev/pts/*` style pseudo-terminal.
#[cfg(not(unix))]
pub fn is_pseudo_terminal(_path: &str) -> bool {
    false
}

/// Major number of a Linux `dev_t`.
fn device_major(rdev: u64) -> u64 {
    ((rdev >> 8) & 0xfff) | ((rdev >> 32) & !0xfff)
}
