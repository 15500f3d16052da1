//! Telemetry frames: `$<pressure>,<temperature>,<velocity>`.
//!
//! Values arrive as decimal text and are kept at half precision, which is all the
//! device resolution carries (one meaningful decimal place, magnitude below 65504).
//! The timestamp is the bridge's wall clock at decode time, not device time.

use crate::storage::SampleStore;
use half::f16;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Number of comma-separated fields in a telemetry payload.
pub const TELEMETRY_FIELDS: usize = 3;

/// Why a telemetry payload was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    /// Payload did not split into exactly three fields.
    #[error("expected {TELEMETRY_FIELDS} fields, got {0}")]
    FieldCount(usize),

    /// A field did not parse as a decimal.
    #[error("field {index} ('{text}') is not a decimal number")]
    NotANumber {
        /// Zero-based field position.
        index: usize,
        /// The offending text.
        text: String,
    },

    /// A field was NaN, infinite or beyond the f16 range.
    #[error("field {index} ({value}) does not fit half precision")]
    OutOfRange {
        /// Zero-based field position.
        index: usize,
        /// The parsed value, as text.
        value: String,
    },
}

/// One decoded reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    /// Pressure reading.
    pub pressure: f16,
    /// Temperature reading.
    pub temperature: f16,
    /// Flow velocity reading.
    pub velocity: f16,
    /// UNIX epoch seconds assigned when the frame was decoded.
    pub timestamp: i64,
}

impl SensorSample {
    /// Build a sample from full-precision values, narrowing each to half precision.
    pub fn new(pressure: f32, temperature: f32, velocity: f32, timestamp: i64) -> Self {
        Self {
            pressure: f16::from_f32(pressure),
            temperature: f16::from_f32(temperature),
            velocity: f16::from_f32(velocity),
            timestamp,
        }
    }

    /// Parse a payload (leading `$` already stripped) and stamp it with `timestamp`.
    pub fn parse(payload: &str, timestamp: i64) -> Result<Self, TelemetryError> {
        let fields: Vec<&str> = payload.split(',').collect();
        if fields.len() != TELEMETRY_FIELDS {
            return Err(TelemetryError::FieldCount(fields.len()));
        }

        let mut values = [f16::ZERO; TELEMETRY_FIELDS];
        for (index, (slot, text)) in values.iter_mut().zip(&fields).enumerate() {
            let text = text.trim();
            let value: f32 = text
                .parse()
                .ok()
                .filter(|v: &f32| v.is_finite())
                .ok_or_else(|| TelemetryError::NotANumber {
                    index,
                    text: text.to_string(),
                })?;
            let narrowed = f16::from_f32(value);
            if !narrowed.is_finite() {
                return Err(TelemetryError::OutOfRange {
                    index,
                    value: text.to_string(),
                });
            }
            *slot = narrowed;
        }

        Ok(Self {
            pressure: values[0],
            temperature: values[1],
            velocity: values[2],
            timestamp,
        })
    }

    /// Readings widened back to `f32`, in wire order.
    pub fn values(&self) -> [f32; TELEMETRY_FIELDS] {
        [
            self.pressure.to_f32(),
            self.temperature.to_f32(),
            self.velocity.to_f32(),
        ]
    }
}

/// Current wall clock as UNIX epoch seconds.
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Decodes telemetry payloads and hands the samples to the archive.
///
/// Errors never escape: malformed payloads and store failures are logged and the
/// sample is dropped, so the reader loop keeps running.
#[derive(Clone)]
pub struct TelemetryDecoder {
    store: Arc<dyn SampleStore>,
}

/// What happened to one payload offered to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// Decoded and persisted.
    Stored,
    /// Rejected by the parser.
    Malformed,
    /// Decoded, but the store refused it.
    StoreFailed,
}

impl TelemetryDecoder {
    /// Create a decoder that persists into `store`.
    pub fn new(store: Arc<dyn SampleStore>) -> Self {
        Self { store }
    }

    /// Decode one payload, stamp it with the current time and store it.
    pub fn handle(&self, payload: &str) -> DecodeOutcome {
        let sample = match SensorSample::parse(payload, now_timestamp()) {
            Ok(sample) => sample,
            Err(err) => {
                warn!(payload, error = %err, "Dropping malformed telemetry frame");
                return DecodeOutcome::Malformed;
            }
        };

        match self.store.store(&sample) {
            Ok(()) => {
                let [p, t, v] = sample.values();
                debug!(pressure = p, temperature = t, velocity = v, "Data stored");
                DecodeOutcome::Stored
            }
            Err(err) => {
                warn!(error = %err, "Failed to store telemetry sample");
                DecodeOutcome::StoreFailed
            }
        }
    }
}
