//! The reader loop: transport → extractor → classifier → correlator | decoder.
//!
//! Runs on its own thread for the life of the bridge. It owns the frame extractor and
//! is the only reader of the transport, so neither needs a lock. Frames are handled
//! strictly in arrival order.
//!
//! A read that returns nothing (`Ok(0)`, `WouldBlock`, `TimedOut`) is followed by a
//! short sleep. Any other read error stops the loop and is returned from
//! [`ReaderHandle::shutdown`]; there is no reconnect.

use crate::classifier::{classify, Disposition};
use crate::correlator::CommandCorrelator;
use crate::error::{AppResult, BridgeError};
use crate::protocol::{DecodeOutcome, Frame, FrameExtractor, TelemetryDecoder};
use crate::transport::Transport;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Bytes requested per read.
pub const READ_BUFFER_SIZE: usize = 256;

/// Default sleep between reads when the device is quiet.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Counters kept by the reader loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    /// Frames extracted from the stream.
    pub frames: u64,
    /// Telemetry samples persisted.
    pub samples_stored: u64,
    /// Frames consumed as command responses.
    pub responses: u64,
    /// Frames dropped as malformed (empty or undecodable).
    pub malformed: u64,
    /// Decoded samples the store refused.
    pub store_failures: u64,
}

/// Drives one transport until told to stop.
pub struct ReaderLoop {
    transport: Box<dyn Transport>,
    extractor: FrameExtractor,
    correlator: Arc<CommandCorrelator>,
    decoder: TelemetryDecoder,
    poll_interval: Duration,
    stats: ReaderStats,
}

impl ReaderLoop {
    /// Create a loop reading from `transport`.
    pub fn new(
        transport: Box<dyn Transport>,
        correlator: Arc<CommandCorrelator>,
        decoder: TelemetryDecoder,
    ) -> Self {
        Self {
            transport,
            extractor: FrameExtractor::new(),
            correlator,
            decoder,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stats: ReaderStats::default(),
        }
    }

    /// Set the idle sleep.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Counters so far.
    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Feed one chunk of raw bytes through the pipeline.
    pub fn process_chunk(&mut self, bytes: &[u8]) {
        for frame in self.extractor.push(bytes) {
            self.route(&frame);
        }
    }

    fn route(&mut self, frame: &Frame) {
        self.stats.frames += 1;
        trace!(frame = %frame, "Frame received");

        match classify(frame, self.correlator.is_armed()) {
            Disposition::Malformed => {
                self.stats.malformed += 1;
                warn!(frame = %frame, "Dropping empty frame");
            }
            Disposition::CommandResponse => {
                if self.correlator.on_frame_match(frame) {
                    self.stats.responses += 1;
                } else {
                    // Disarmed between classification and matching.
                    self.decode(frame.payload());
                }
            }
            Disposition::Telemetry(payload) => self.decode(payload),
        }
    }

    fn decode(&mut self, payload: &str) {
        match self.decoder.handle(payload) {
            DecodeOutcome::Stored => self.stats.samples_stored += 1,
            DecodeOutcome::Malformed => self.stats.malformed += 1,
            DecodeOutcome::StoreFailed => self.stats.store_failures += 1,
        }
    }

    /// Run on the current thread until `shutdown` is set or the transport fails.
    pub fn run(mut self, shutdown: &AtomicBool) -> AppResult<ReaderStats> {
        info!(port = self.transport.port_name(), "Reader loop started");
        let mut buf = [0u8; READ_BUFFER_SIZE];

        while !shutdown.load(Ordering::SeqCst) {
            match self.transport.read(&mut buf) {
                Ok(0) => thread::sleep(self.poll_interval),
                Ok(n) => self.process_chunk(&buf[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    thread::sleep(self.poll_interval)
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(port = self.transport.port_name(), error = %e, "Serial read failed; reader loop stopping");
                    return Err(BridgeError::TransportRead(e));
                }
            }
        }

        info!(stats = ?self.stats, "Reader loop stopped");
        Ok(self.stats)
    }

    /// Start the loop on a thread named `serial-reader`.
    pub fn spawn(self) -> AppResult<ReaderHandle> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let join = thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || self.run(&flag))?;
        debug!("Reader thread spawned");
        Ok(ReaderHandle { shutdown, join })
    }
}

/// Control handle for a spawned [`ReaderLoop`].
pub struct ReaderHandle {
    shutdown: Arc<AtomicBool>,
    join: JoinHandle<AppResult<ReaderStats>>,
}

impl ReaderHandle {
    /// `true` once the loop has exited, either on request or on a read error.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Ask the loop to stop without waiting for it.
    pub fn request_stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for it, returning its counters or its fatal error.
    pub fn shutdown(self) -> AppResult<ReaderStats> {
        self.request_stop();
        self.join.join().map_err(|_| BridgeError::ReaderPanicked)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CommandKind, ResponseStatus};
    use crate::storage::{DeviceProfile, MemoryStore, SampleStore};
    use crate::transport::{MockDevice, MockTransport};
    use std::time::Instant;
    use tracing_test::traced_test;

    struct Fixture {
        reader: ReaderLoop,
        correlator: Arc<CommandCorrelator>,
        store: Arc<MemoryStore>,
        device: MockDevice,
    }

    fn fixture() -> Fixture {
        let (link, device) = MockTransport::pair("mock0");
        let writer = link.try_clone().unwrap();
        let correlator = Arc::new(
            CommandCorrelator::new(writer).with_timeout(Duration::from_secs(5)),
        );
        let store = Arc::new(MemoryStore::new(DeviceProfile::default().shared()));
        let decoder = TelemetryDecoder::new(store.clone());
        let reader = ReaderLoop::new(Box::new(link), correlator.clone(), decoder)
            .with_poll_interval(Duration::from_millis(1));
        Fixture {
            reader,
            correlator,
            store,
            device,
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_telemetry_is_stored_while_idle() {
        let mut f = fixture();
        f.reader.process_chunk(b"$12.3,45.6,78.9\n$1.0,2.0,3.0\n");

        let stats = f.reader.stats();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.samples_stored, 2);
        assert_eq!(f.store.len(), 2);
    }

    #[test]
    fn test_response_like_frame_while_idle_is_telemetry() {
        let mut f = fixture();
        f.reader.process_chunk(b"$0,ok\n");

        let stats = f.reader.stats();
        assert_eq!(stats.responses, 0);
        assert_eq!(stats.malformed, 1);
        assert!(f.store.is_empty());
    }

    #[traced_test]
    #[test]
    fn test_malformed_frames_are_logged_and_skipped() {
        let mut f = fixture();
        f.reader.process_chunk(b"$\n$abc,1,2\n$1,2\n$4.0,5.0,6.0\n");

        let stats = f.reader.stats();
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.malformed, 3);
        assert_eq!(stats.samples_stored, 1);
        assert!(logs_contain("Dropping empty frame"));
        assert!(logs_contain("Dropping malformed telemetry frame"));
    }

    #[test]
    fn test_store_failures_are_counted() {
        let mut f = fixture();
        f.store.fail_writes(true);
        f.reader.process_chunk(b"$1.0,2.0,3.0\n");
        assert_eq!(f.reader.stats().store_failures, 1);
    }

    #[test]
    fn test_spawned_loop_resolves_command_and_stores_telemetry() {
        let f = fixture();
        f.device
            .set_responder(|line| (line == "$0").then(|| "$5.0,6.0,7.0\n$0,ok\n".to_string()));
        let handle = f.reader.spawn().unwrap();

        let status = f.correlator.issue(CommandKind::Start).unwrap();
        assert_eq!(status, ResponseStatus::Ok);

        wait_for(|| f.store.len() == 1);
        let stats = handle.shutdown().unwrap();
        assert_eq!(stats.responses, 1);
        assert_eq!(stats.samples_stored, 1);
        assert_eq!(f.store.query_last_n(1).unwrap()[0].values(), [5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_byte_at_a_time_delivery() {
        let f = fixture();
        f.device.set_read_chunk(1);
        f.device
            .set_responder(|line| (line == "$2,50,1").then(|| "noise$2,50,1,ok\n".to_string()));
        let handle = f.reader.spawn().unwrap();

        let status = f
            .correlator
            .issue(CommandKind::Configure {
                sampling_rate: 50,
                debug: true,
            })
            .unwrap();
        assert_eq!(status, ResponseStatus::Ok);
        handle.shutdown().unwrap();
    }

    #[test]
    fn test_read_error_stops_loop() {
        let f = fixture();
        let handle = f.reader.spawn().unwrap();
        f.device.unplug();

        wait_for(|| handle.is_finished());
        assert!(matches!(
            handle.shutdown(),
            Err(BridgeError::TransportRead(_))
        ));
    }

    #[test]
    fn test_shutdown_of_idle_loop() {
        let f = fixture();
        let handle = f.reader.spawn().unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());
        assert_eq!(handle.shutdown().unwrap(), ReaderStats::default());
    }
}
