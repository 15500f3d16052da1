//! Append-only CSV archive of telemetry samples.
//!
//! One file holds every series; each row carries its [`DeviceProfile`] key:
//!
//! ```text
//! port,sampling_rate,debug,pressure,temperature,velocity,timestamp
//! /dev/ttyS11,115,0,12.296875,45.59375,78.875,1718000000
//! ```
//!
//! Rows are flushed one by one, so a crash loses at most the sample being written.
//! Queries scan the whole file; the archive is sized for a single device's history.

use super::{newest_first, SampleStore, SharedProfile};
use crate::error::{AppResult, BridgeError};
use crate::protocol::SensorSample;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::info;

/// Column names, in file order.
pub const CSV_HEADER: [&str; 7] = [
    "port",
    "sampling_rate",
    "debug",
    "pressure",
    "temperature",
    "velocity",
    "timestamp",
];

/// System directories the archive refuses to write into.
const RESTRICTED_DIRS: &[&str] = &[
    "/bin", "/boot", "/dev", "/etc", "/lib", "/lib32", "/lib64", "/proc", "/root", "/run",
    "/sbin", "/snap", "/sys", "/usr", "/var",
];

#[derive(Debug, Serialize, Deserialize)]
struct ArchiveRecord {
    port: String,
    sampling_rate: u8,
    debug: u8,
    pressure: f32,
    temperature: f32,
    velocity: f32,
    timestamp: i64,
}

/// CSV-backed [`SampleStore`].
pub struct CsvArchive {
    path: PathBuf,
    profile: SharedProfile,
    writer: Mutex<csv::Writer<File>>,
}

impl CsvArchive {
    /// Open (or create) the archive at `path`, keyed by `profile`.
    ///
    /// The parent directory must already exist and must not be a system directory.
    pub fn open<P: AsRef<Path>>(path: P, profile: SharedProfile) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        if is_path_restricted(&path) {
            return Err(BridgeError::Storage(format!(
                "Refusing to write archive into system directory: {}",
                path.display()
            )));
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                BridgeError::Storage(format!(
                    "Failed to open archive '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        let is_new = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(CSV_HEADER)?;
            writer.flush()?;
        }

        info!(path = %path.display(), created = is_new, "Sample archive ready");

        Ok(Self {
            path,
            profile,
            writer: Mutex::new(writer),
        })
    }

    /// Location of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SampleStore for CsvArchive {
    fn store(&self, sample: &SensorSample) -> AppResult<()> {
        let key = self.profile.get();
        let [pressure, temperature, velocity] = sample.values();
        let record = ArchiveRecord {
            port: key.port,
            sampling_rate: key.sampling_rate,
            debug: u8::from(key.debug),
            pressure,
            temperature,
            velocity,
            timestamp: sample.timestamp,
        };

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.serialize(&record)?;
        writer.flush()?;
        Ok(())
    }

    fn query_last_n(&self, n: usize) -> AppResult<Vec<SensorSample>> {
        let key = self.profile.get();

        // Hold the writer so no half-written row is visible to the scan.
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut matching = Vec::new();
        for row in reader.deserialize::<ArchiveRecord>() {
            let record = row?;
            if record.port == key.port
                && record.sampling_rate == key.sampling_rate
                && (record.debug != 0) == key.debug
            {
                matching.push(SensorSample::new(
                    record.pressure,
                    record.temperature,
                    record.velocity,
                    record.timestamp,
                ));
            }
        }

        Ok(newest_first(matching.into_iter(), n))
    }
}

/// `true` if `path` lands inside a system directory once made absolute and resolved.
///
/// Relative paths are resolved against the working directory. The parent is
/// canonicalised when it exists, so `..` and symlinks cannot step around the check.
/// A path that cannot be made absolute is treated as restricted.
fn is_path_restricted(path: &Path) -> bool {
    let Some(resolved) = resolve_path(path) else {
        return true;
    };
    RESTRICTED_DIRS
        .iter()
        .any(|dir| resolved.starts_with(Path::new(dir)))
}

fn resolve_path(path: &Path) -> Option<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };

    if let (Some(parent), Some(name)) = (absolute.parent(), absolute.file_name()) {
        if let Ok(parent) = std::fs::canonicalize(parent) {
            return Some(parent.join(name));
        }
    }
    Some(normalize_lexically(&absolute))
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DeviceProfile;

    fn archive_in(dir: &tempfile::TempDir) -> (CsvArchive, SharedProfile) {
        let profile = DeviceProfile::new("/dev/pts/3", 115, false).shared();
        let archive = CsvArchive::open(dir.path().join("samples.csv"), profile.clone()).unwrap();
        (archive, profile)
    }

    #[test]
    fn test_new_archive_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let (archive, _) = archive_in(&dir);

        let contents = std::fs::read_to_string(archive.path()).unwrap();
        assert_eq!(contents.trim_end(), CSV_HEADER.join(","));
    }

    #[test]
    fn test_store_and_query_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let (archive, _) = archive_in(&dir);

        for ts in 1..=5 {
            archive
                .store(&SensorSample::new(ts as f32, 20.5, 1.5, ts))
                .unwrap();
        }

        let newest = archive.query_last_n(3).unwrap();
        let stamps: Vec<i64> = newest.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![5, 4, 3]);
        assert_eq!(newest[0].values(), [5.0, 20.5, 1.5]);
    }

    #[test]
    fn test_query_filters_by_profile() {
        let dir = tempfile::tempdir().unwrap();
        let (archive, profile) = archive_in(&dir);

        archive.store(&SensorSample::new(1.0, 1.0, 1.0, 1)).unwrap();
        profile.update(50, true);
        archive.store(&SensorSample::new(2.0, 2.0, 2.0, 2)).unwrap();
        archive.store(&SensorSample::new(3.0, 3.0, 3.0, 3)).unwrap();

        let current = archive.query_last_n(10).unwrap();
        assert_eq!(current.len(), 2);
        assert!(current.iter().all(|s| s.timestamp >= 2));
    }

    #[test]
    fn test_reopen_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.csv");
        let profile = DeviceProfile::default().shared();

        {
            let archive = CsvArchive::open(&path, profile.clone()).unwrap();
            archive.store(&SensorSample::new(1.0, 2.0, 3.0, 10)).unwrap();
        }
        let archive = CsvArchive::open(&path, profile).unwrap();
        archive.store(&SensorSample::new(4.0, 5.0, 6.0, 11)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("port,sampling_rate").count(), 1);
        assert_eq!(archive.query_last_n(10).unwrap().len(), 2);
    }

    #[test]
    fn test_restricted_directory_is_refused() {
        let profile = DeviceProfile::default().shared();
        let result = CsvArchive::open("/etc/sensor_bridge.csv", profile);
        assert!(matches!(result, Err(BridgeError::Storage(_))));
    }

    #[test]
    fn test_missing_parent_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let profile = DeviceProfile::default().shared();
        let result = CsvArchive::open(dir.path().join("missing/samples.csv"), profile);
        assert!(result.is_err());
    }

    #[test]
    fn test_restricted_directories() {
        assert!(is_path_restricted(Path::new("/var/lib/samples.csv")));
        assert!(is_path_restricted(Path::new("/etc/x.csv")));
        assert!(!is_path_restricted(Path::new("/variant/samples.csv")));
        assert!(!is_path_restricted(Path::new("/tmp/samples.csv")));
    }

    #[test]
    fn test_parent_dir_components_are_resolved() {
        assert!(is_path_restricted(Path::new("/tmp/../etc/x.csv")));
        assert!(is_path_restricted(Path::new("/tmp/./../etc/x.csv")));
        assert!(is_path_restricted(Path::new("/no-such-dir/../../etc/x.csv")));
        assert!(!is_path_restricted(Path::new("/etc/../tmp/x.csv")));
    }

    #[test]
    fn test_relative_paths_resolve_against_working_dir() {
        let cwd = std::env::current_dir().unwrap();
        let escape = "../".repeat(cwd.components().count() + 1);

        assert!(is_path_restricted(Path::new(&format!("{escape}etc/x.csv"))));
        assert_eq!(
            is_path_restricted(Path::new("database.csv")),
            is_path_restricted(&cwd.join("database.csv"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_into_system_dir_is_restricted() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("etc-link");
        std::os::unix::fs::symlink("/etc", &link).unwrap();

        assert!(is_path_restricted(&link.join("x.csv")));
    }

    #[test]
    fn test_open_refuses_escaped_system_path() {
        let profile = DeviceProfile::default().shared();
        let result = CsvArchive::open("/tmp/../etc/sensor_bridge_samples.csv", profile);
        assert!(matches!(result, Err(BridgeError::Storage(_))));
    }
}
