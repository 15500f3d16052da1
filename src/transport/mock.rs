//! In-process device for tests.
//!
//! [`MockTransport`] is the bridge's end of the link; [`MockDevice`] is the test's end.
//! Bytes queued with [`MockDevice::send`] come out of `MockTransport::read`; bytes
//! written to the transport are captured and can be answered automatically by a
//! responder closure, which is how tests play the part of the firmware:
//!
//! ```
//! use sensor_bridge::transport::{MockTransport, Transport};
//!
//! let (mut link, device) = MockTransport::pair("mock0");
//! device.set_responder(|line| (line == "$0").then(|| "$0,ok\n".to_string()));
//!
//! link.write(b"$0\n").unwrap();
//! let mut buf = [0u8; 16];
//! let n = link.read(&mut buf).unwrap();
//! assert_eq!(&buf[..n], b"$0,ok\n");
//! ```

use super::Transport;
use crate::error::AppResult;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Closure answering one written line (without its `\n`).
pub type Responder = Box<dyn FnMut(&str) -> Option<String> + Send>;

#[derive(Default)]
struct MockLink {
    inbound: Mutex<VecDeque<u8>>,
    outbound: Mutex<Vec<u8>>,
    pending_line: Mutex<Vec<u8>>,
    responder: Mutex<Option<Responder>>,
    fail_next_write: AtomicBool,
    short_writes: AtomicBool,
    fail_reads: AtomicBool,
    read_chunk: AtomicUsize,
}

impl MockLink {
    fn answer(&self, accepted: &[u8]) {
        let mut pending = self.pending_line.lock().unwrap_or_else(PoisonError::into_inner);
        pending.extend_from_slice(accepted);

        let mut replies = Vec::new();
        {
            let mut responder = self.responder.lock().unwrap_or_else(PoisonError::into_inner);
            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line[..pos]).into_owned();
                if let Some(responder) = responder.as_mut() {
                    if let Some(reply) = responder(&line) {
                        replies.push(reply);
                    }
                }
            }
        }

        let mut inbound = self.inbound.lock().unwrap_or_else(PoisonError::into_inner);
        for reply in replies {
            inbound.extend(reply.into_bytes());
        }
    }
}

/// The bridge's end of an in-process link.
#[derive(Clone)]
pub struct MockTransport {
    link: Arc<MockLink>,
    name: String,
    baud_rate: u32,
}

impl MockTransport {
    /// Create a connected transport/device pair.
    pub fn pair(name: impl Into<String>) -> (MockTransport, MockDevice) {
        let link = Arc::new(MockLink::default());
        let transport = MockTransport {
            link: link.clone(),
            name: name.into(),
            baud_rate: 115_000,
        };
        (transport, MockDevice { link })
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.link.fail_reads.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock device unplugged"));
        }

        let mut inbound = self.link.inbound.lock().unwrap_or_else(PoisonError::into_inner);
        if inbound.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }

        let limit = match self.link.read_chunk.load(Ordering::SeqCst) {
            0 => buf.len(),
            chunk => chunk.min(buf.len()),
        };
        let count = limit.min(inbound.len());
        for (slot, byte) in buf.iter_mut().zip(inbound.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        if self.link.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }

        let accepted = if self.link.short_writes.load(Ordering::SeqCst) {
            &bytes[..bytes.len().saturating_sub(1)]
        } else {
            bytes
        };

        self.link
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(accepted);
        self.link.answer(accepted);
        Ok(accepted.len())
    }

    fn is_virtual(&self) -> bool {
        true
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> AppResult<()> {
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
        Ok(Box::new(self.clone()))
    }
}

/// The test's end of an in-process link.
#[derive(Clone)]
pub struct MockDevice {
    link: Arc<MockLink>,
}

impl MockDevice {
    /// Queue bytes for the bridge to read.
    pub fn send(&self, bytes: impl AsRef<[u8]>) {
        self.link
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(bytes.as_ref());
    }

    /// Everything the bridge has written so far.
    pub fn written(&self) -> Vec<u8> {
        self.link
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Written bytes split into lines, terminators removed.
    pub fn written_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.written())
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Bytes queued but not yet read by the bridge.
    pub fn unread(&self) -> usize {
        self.link
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Answer each written line with the closure's reply, if any.
    ///
    /// The closure runs inside the bridge's write call and must not call back into
    /// this device's configuration methods.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&str) -> Option<String> + Send + 'static,
    {
        *self.link.responder.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Box::new(responder));
    }

    /// Make the next write fail with `BrokenPipe`.
    pub fn fail_next_write(&self) {
        self.link.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Accept one byte less than offered on every write.
    pub fn short_writes(&self, enabled: bool) {
        self.link.short_writes.store(enabled, Ordering::SeqCst);
    }

    /// Make every read fail, as if the device had been unplugged.
    pub fn unplug(&self) {
        self.link.fail_reads.store(true, Ordering::SeqCst);
    }

    /// Hand out at most `bytes` per read (0 restores unlimited reads).
    pub fn set_read_chunk(&self, bytes: usize) {
        self.link.read_chunk.store(bytes, Ordering::SeqCst);
    }
}
