//! Facade used by the HTTP layer.
//!
//! [`Bridge::connect`] wires one transport into the full pipeline: it clones the link
//! for the command writer, builds the correlator and decoder, and hands back the
//! [`ReaderLoop`] for the caller to spawn.

use crate::config::CommandConfig;
use crate::correlator::CommandCorrelator;
use crate::error::AppResult;
use crate::protocol::{CommandKind, ResponseStatus, SensorSample, TelemetryDecoder};
use crate::reader::ReaderLoop;
use crate::storage::{DeviceProfile, SampleStore, SampleSummary, SharedProfile, SUMMARY_WINDOW};
use crate::transport::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Command and query surface shared by all request handlers.
pub struct Bridge {
    correlator: Arc<CommandCorrelator>,
    store: Arc<dyn SampleStore>,
    profile: SharedProfile,
    reading: AtomicBool,
}

impl Bridge {
    /// Create a bridge around an existing correlator and store.
    pub fn new(
        correlator: Arc<CommandCorrelator>,
        store: Arc<dyn SampleStore>,
        profile: SharedProfile,
    ) -> Self {
        Self {
            correlator,
            store,
            profile,
            reading: AtomicBool::new(false),
        }
    }

    /// Build the bridge and its reader loop on top of `transport`.
    pub fn connect(
        transport: Box<dyn Transport>,
        store: Arc<dyn SampleStore>,
        profile: SharedProfile,
        command: &CommandConfig,
    ) -> AppResult<(Arc<Bridge>, ReaderLoop)> {
        let writer = transport.try_clone()?;
        let correlator = Arc::new(CommandCorrelator::new(writer).with_timeout(command.timeout()));
        let decoder = TelemetryDecoder::new(store.clone());
        let reader = ReaderLoop::new(transport, correlator.clone(), decoder)
            .with_poll_interval(command.poll_interval());
        let bridge = Arc::new(Bridge::new(correlator, store, profile));
        Ok((bridge, reader))
    }

    /// The correlator commands go through.
    pub fn correlator(&self) -> &Arc<CommandCorrelator> {
        &self.correlator
    }

    /// Ask the device to start streaming. `Ok` marks the bridge as reading.
    pub fn issue_start(&self) -> AppResult<ResponseStatus> {
        let status = self.correlator.issue(CommandKind::Start)?;
        if status.is_ok() {
            self.reading.store(true, Ordering::SeqCst);
            info!("Reading started");
        }
        Ok(status)
    }

    /// Ask the device to stop streaming. `Ok` clears the reading flag.
    pub fn issue_stop(&self) -> AppResult<ResponseStatus> {
        let status = self.correlator.issue(CommandKind::Stop)?;
        if status.is_ok() {
            self.reading.store(false, Ordering::SeqCst);
            info!("Reading stopped");
        }
        Ok(status)
    }

    /// Reconfigure the device. `Ok` switches the archive to the new profile.
    pub fn issue_configure(&self, sampling_rate: u8, debug_mode: bool) -> AppResult<ResponseStatus> {
        let status = self.correlator.issue(CommandKind::Configure {
            sampling_rate,
            debug: debug_mode,
        })?;
        if status.is_ok() {
            self.profile.update(sampling_rate, debug_mode);
            info!(sampling_rate, debug_mode, "Device configuration updated");
        }
        Ok(status)
    }

    /// Whether the last acknowledged Start has not been followed by an acknowledged Stop.
    pub fn is_reading(&self) -> bool {
        self.reading.load(Ordering::SeqCst)
    }

    /// Current device profile.
    pub fn profile(&self) -> DeviceProfile {
        self.profile.get()
    }

    /// Newest `n` samples of the current profile.
    pub fn recent_samples(&self, n: usize) -> AppResult<Vec<SensorSample>> {
        self.store.query_last_n(n)
    }

    /// Latest sample and short-window mean for the current profile.
    pub fn summary(&self) -> AppResult<SampleSummary> {
        let samples = self.store.query_last_n(SUMMARY_WINDOW)?;
        Ok(SampleSummary::from_newest_first(&samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::transport::{MockDevice, MockTransport};
    use crate::reader::ReaderHandle;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn running_bridge() -> (Arc<Bridge>, MockDevice, ReaderHandle) {
        let (link, device) = MockTransport::pair("mock0");
        let profile = DeviceProfile::new("mock0", 115, false).shared();
        let store = Arc::new(MemoryStore::new(profile.clone()));
        let command = CommandConfig {
            timeout_ms: 200,
            poll_interval_ms: 1,
        };
        let (bridge, reader) = Bridge::connect(Box::new(link), store, profile, &command).unwrap();
        (bridge, device, reader.spawn().unwrap())
    }

    fn echo_ok(device: &MockDevice) {
        device.set_responder(|line| Some(format!("{line},ok\n")));
    }

    #[test]
    fn test_start_and_stop_toggle_reading() {
        let (bridge, device, reader) = running_bridge();
        echo_ok(&device);

        assert_eq!(bridge.issue_start().unwrap(), ResponseStatus::Ok);
        assert!(bridge.is_reading());
        assert_eq!(bridge.issue_stop().unwrap(), ResponseStatus::Ok);
        assert!(!bridge.is_reading());

        reader.shutdown().unwrap();
    }

    #[test]
    fn test_rejected_start_keeps_state() {
        let (bridge, device, reader) = running_bridge();
        device.set_responder(|line| Some(format!("{line},invalid command\n")));

        assert_eq!(
            bridge.issue_start().unwrap(),
            ResponseStatus::InvalidCommand
        );
        assert!(!bridge.is_reading());

        reader.shutdown().unwrap();
    }

    #[test]
    fn test_configure_ok_updates_profile() {
        let (bridge, device, reader) = running_bridge();
        echo_ok(&device);

        assert_eq!(bridge.issue_configure(50, true).unwrap(), ResponseStatus::Ok);
        assert_eq!(bridge.profile(), DeviceProfile::new("mock0", 50, true));
        assert_eq!(device.written_lines(), vec!["$2,50,1"]);

        reader.shutdown().unwrap();
    }

    #[test]
    #[traced_test]
    fn test_configure_ok_logs_new_settings() {
        let (bridge, device, reader) = running_bridge();
        echo_ok(&device);

        assert_eq!(bridge.issue_configure(20, true).unwrap(), ResponseStatus::Ok);
        assert!(logs_contain("Device configuration updated"));
        assert!(logs_contain("debug_mode=true"));

        reader.shutdown().unwrap();
    }

    #[test]
    fn test_configure_timeout_keeps_profile() {
        let (bridge, _device, reader) = running_bridge();

        assert_eq!(
            bridge.issue_configure(50, true).unwrap(),
            ResponseStatus::Timeout
        );
        assert_eq!(bridge.profile(), DeviceProfile::new("mock0", 115, false));

        reader.shutdown().unwrap();
    }

    #[test]
    fn test_summary_follows_profile() {
        let (bridge, device, reader) = running_bridge();
        echo_ok(&device);

        device.send("$1.0,2.0,3.0\n$3.0,4.0,5.0\n");
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while bridge.recent_samples(10).unwrap().len() < 2 {
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(1));
        }

        let summary = bridge.summary().unwrap();
        assert!(summary.latest.is_some());
        assert_eq!(summary.mean, Some([2.0, 3.0, 4.0]));

        bridge.issue_configure(10, false).unwrap();
        assert!(bridge.summary().unwrap().latest.is_none());

        reader.shutdown().unwrap();
    }
}
