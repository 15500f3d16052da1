//! Single-slot command/response correlation.
//!
//! The device answers commands on the same line it streams telemetry on, and carries no
//! request id. The correlator therefore allows exactly one command in flight:
//!
//! ```text
//!   Idle ──issue()──▶ Awaiting ──on_frame_match()──▶ Idle  (Ok | InvalidCommand |
//!                        │                                  UndefinedStatus | Mismatch)
//!                        └──deadline──▶ caller gets Timeout, slot stays armed
//! ```
//!
//! ## Locking
//!
//! - `link` serialises whole exchanges. A second caller blocks in `issue` until the
//!   first one has its answer (or has timed out), so one caller can never be woken by
//!   the other's response.
//! - `slot` guards the pending prefix and the result. It is held while arming and
//!   writing, released while waiting on the condvar, and is the only lock the reader
//!   loop ever takes.
//!
//! After a timeout the slot is left armed. A late response is then consumed by the
//! next matching frame and discarded; the next `issue` re-arms the slot anyway.

use crate::error::AppResult;
use crate::protocol::{CommandKind, Frame, ResponseStatus};
use crate::transport::{self, Transport};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long a caller waits for the device to answer.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
struct PendingSlot {
    /// Command in flight; `None` when idle.
    armed: Option<CommandKind>,
    response_received: bool,
    status: Option<ResponseStatus>,
}

/// Matches device responses to the one outstanding command.
pub struct CommandCorrelator {
    link: Mutex<Box<dyn Transport>>,
    slot: Mutex<PendingSlot>,
    resolved: Condvar,
    timeout: Duration,
}

impl CommandCorrelator {
    /// Create a correlator that writes commands through `link`.
    pub fn new(link: Box<dyn Transport>) -> Self {
        Self {
            link: Mutex::new(link),
            slot: Mutex::new(PendingSlot::default()),
            resolved: Condvar::new(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Set the response deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `true` while a command is waiting for (or has given up on) its response.
    pub fn is_armed(&self) -> bool {
        self.lock_slot().armed.is_some()
    }

    /// Send `command` and block until the device answers or the deadline passes.
    ///
    /// The deadline starts once the command is written. Time spent queued behind another
    /// caller's exchange is not counted, so with `k` callers ahead the worst-case total
    /// wait is roughly `(k + 1)` deadlines.
    ///
    /// Returns `Err` only if the command could not be written; in that case the slot is
    /// disarmed again. Every other outcome, including `Timeout`, is an `Ok` status.
    pub fn issue(&self, command: CommandKind) -> AppResult<ResponseStatus> {
        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);

        let mut slot = self.lock_slot();
        if let Some(stale) = slot.armed {
            debug!(%stale, "Replacing unanswered command");
        }
        slot.armed = Some(command);
        slot.response_received = false;
        slot.status = None;

        if let Err(e) = transport::write_frame(&mut **link, command.encode().as_bytes()) {
            slot.armed = None;
            warn!(%command, error = %e, "Failed to send command");
            return Err(e);
        }
        debug!(%command, "Command sent, awaiting response");

        let (mut slot, _) = self
            .resolved
            .wait_timeout_while(slot, self.timeout, |slot| !slot.response_received)
            .unwrap_or_else(PoisonError::into_inner);

        if !slot.response_received {
            warn!(%command, timeout = ?self.timeout, "No response from device");
            return Ok(ResponseStatus::Timeout);
        }

        let status = slot.status.take().unwrap_or(ResponseStatus::UndefinedStatus);
        slot.armed = None;
        info!(%command, %status, "Command resolved");
        Ok(status)
    }

    /// Offer a frame routed here by the classifier.
    ///
    /// Resolves the pending command and wakes its caller. Returns `false` (and leaves the
    /// frame unconsumed) if nothing is armed.
    pub fn on_frame_match(&self, frame: &Frame) -> bool {
        let mut slot = self.lock_slot();
        let Some(armed) = slot.armed else {
            return false;
        };

        let expected = armed.wire_prefix();
        let received = frame.prefix();
        let status = if received == expected {
            if !armed.echo_matches(frame.as_str()) {
                warn!(
                    sent = %armed,
                    response = %frame,
                    "Device echoed different configure parameters"
                );
            }
            ResponseStatus::from_status_text(CommandKind::status_field(expected, frame.as_str()))
        } else {
            warn!(expected, received, "Response does not match pending command");
            ResponseStatus::Mismatch
        };
        debug!(frame = %frame, %status, "Response matched");

        slot.status = Some(status);
        slot.response_received = true;
        slot.armed = None;
        drop(slot);

        self.resolved.notify_one();
        true
    }

    fn lock_slot(&self) -> MutexGuard<'_, PendingSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
