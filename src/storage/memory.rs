//! In-memory sample store for tests and dry runs.

use super::{newest_first, DeviceProfile, SampleStore, SharedProfile};
use crate::error::{AppResult, BridgeError};
use crate::protocol::SensorSample;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Keeps every sample in a `Vec`, keyed like the on-disk archive.
///
/// # Example
///
/// ```
/// use sensor_bridge::protocol::SensorSample;
/// use sensor_bridge::storage::{DeviceProfile, MemoryStore, SampleStore};
///
/// let store = MemoryStore::new(DeviceProfile::default().shared());
/// store.store(&SensorSample::new(1.0, 2.0, 3.0, 42)).unwrap();
/// assert_eq!(store.query_last_n(5).unwrap().len(), 1);
/// ```
pub struct MemoryStore {
    profile: SharedProfile,
    samples: Mutex<Vec<(DeviceProfile, SensorSample)>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store keyed by `profile`.
    pub fn new(profile: SharedProfile) -> Self {
        Self {
            profile,
            samples: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `store` call fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Total samples held, across all profiles.
    pub fn len(&self) -> usize {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `true` when nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SampleStore for MemoryStore {
    fn store(&self, sample: &SensorSample) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BridgeError::Storage("memory store rejected write".into()));
        }
        let key = self.profile.get();
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key, *sample));
        Ok(())
    }

    fn query_last_n(&self, n: usize) -> AppResult<Vec<SensorSample>> {
        let key = self.profile.get();
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let matching = samples
            .iter()
            .filter(|(profile, _)| *profile == key)
            .map(|(_, sample)| *sample);
        Ok(newest_first(matching, n))
    }
}
