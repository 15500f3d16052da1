//! Sample archive.
//!
//! The reader loop only needs "store this sample"; the HTTP layer only needs "give me
//! the newest N". Both go through [`SampleStore`], so the archive can be swapped for
//! an in-memory store in tests.
//!
//! Samples are keyed by a [`DeviceProfile`]: the transport they came from plus the
//! sampling rate and debug flag the device was configured with at the time. Queries
//! only see samples recorded under the *current* profile, so a successful Configure
//! starts a fresh series.

pub mod csv_archive;
pub mod memory;

pub use csv_archive::CsvArchive;
pub use memory::MemoryStore;

use crate::error::AppResult;
use crate::protocol::SensorSample;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};

/// Number of samples averaged for the device summary.
pub const SUMMARY_WINDOW: usize = 10;

/// Persistence collaborator for decoded telemetry.
pub trait SampleStore: Send + Sync {
    /// Persist one sample under the current profile.
    fn store(&self, sample: &SensorSample) -> AppResult<()>;

    /// Newest `n` samples recorded under the current profile, newest first.
    fn query_last_n(&self, n: usize) -> AppResult<Vec<SensorSample>>;
}

/// Archive key: which device, configured how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceProfile {
    /// Transport identity (device path).
    pub port: String,
    /// Sampling rate last acknowledged by the device.
    pub sampling_rate: u8,
    /// Debug flag last acknowledged by the device.
    pub debug: bool,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            port: "/dev/ttyS11".to_string(),
            sampling_rate: 115,
            debug: false,
        }
    }
}

impl DeviceProfile {
    /// Create a profile.
    pub fn new(port: impl Into<String>, sampling_rate: u8, debug: bool) -> Self {
        Self {
            port: port.into(),
            sampling_rate,
            debug,
        }
    }

    /// Wrap in a handle shared between the bridge and the archive.
    pub fn shared(self) -> SharedProfile {
        SharedProfile(Arc::new(RwLock::new(self)))
    }
}

/// Profile handle shared by the bridge (writer) and the stores (readers).
#[derive(Debug, Clone)]
pub struct SharedProfile(Arc<RwLock<DeviceProfile>>);

impl SharedProfile {
    /// Snapshot of the current profile.
    pub fn get(&self) -> DeviceProfile {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Record a configuration the device acknowledged.
    pub fn update(&self, sampling_rate: u8, debug: bool) {
        let mut profile = self.0.write().unwrap_or_else(PoisonError::into_inner);
        profile.sampling_rate = sampling_rate;
        profile.debug = debug;
    }
}

/// Latest reading plus a short moving average, for the device status endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSummary {
    /// Most recent sample, if any.
    pub latest: Option<SensorSample>,
    /// Mean pressure, temperature and velocity over up to [`SUMMARY_WINDOW`] samples.
    pub mean: Option<[f64; 3]>,
}

impl SampleSummary {
    /// Summarise samples ordered newest first.
    pub fn from_newest_first(samples: &[SensorSample]) -> Self {
        let window = &samples[..samples.len().min(SUMMARY_WINDOW)];
        if window.is_empty() {
            return Self {
                latest: None,
                mean: None,
            };
        }

        let mut sums = [0.0f64; 3];
        for sample in window {
            for (sum, value) in sums.iter_mut().zip(sample.values()) {
                *sum += f64::from(value);
            }
        }
        let count = window.len() as f64;

        Self {
            latest: window.first().copied(),
            mean: Some(sums.map(|sum| sum / count)),
        }
    }
}

/// Order matching samples newest first: by timestamp, later insertions first on ties.
pub(crate) fn newest_first<I>(matching_in_insertion_order: I, n: usize) -> Vec<SensorSample>
where
    I: DoubleEndedIterator<Item = SensorSample>,
{
    let mut samples: Vec<SensorSample> = matching_in_insertion_order.rev().collect();
    samples.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    samples.truncate(n);
    samples
}
