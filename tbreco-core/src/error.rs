//! Error types for tbreco-core.

use thiserror::Error;

/// Result type alias for tbreco operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for tbreco operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Channel index has no entry in a per-channel table.
    #[error("channel index {index} outside table of {len} entries")]
    ChannelOutOfRange { index: i32, len: usize },

    /// Calibration factor that cannot be divided out later.
    #[error("invalid calibration factor {factor} for channel {channel}")]
    InvalidCalibrationFactor { channel: usize, factor: f64 },

    /// Waveform does not have the fixed sample count.
    #[error("waveform has {actual} samples, expected {expected}")]
    WaveformLength { expected: usize, actual: usize },

    /// Unrecognised gain level name.
    #[error("unknown gain level: {0}")]
    UnknownGainLevel(String),

    /// Channel not covered by the channel map at the given time.
    #[error("channel {index} is not mapped at timestamp {timestamp}")]
    UnmappedChannel { index: i32, timestamp: u64 },

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
