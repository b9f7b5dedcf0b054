//! Raw digitizer samples for one readout channel in one event.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of ADC samples in every PADE waveform.
pub const N_SAMPLES: usize = 120;

/// Number of readout channels in the detector.
pub const N_CHANNELS: usize = 128;

/// Samples at or below this value are treated as baseline by the peak search.
pub const NOISE_FLOOR: u16 = 200;

/// Leading samples used for the pedestal/noise estimate.
pub const PEDESTAL_SAMPLES: usize = 20;

/// Event timestamp, used to select the channel-map epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Creates a new timestamp.
    #[inline]
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw timestamp value.
    #[inline]
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Peak sample of a waveform, ignoring anything at or below [`NOISE_FLOOR`].
///
/// Returns 0 when no sample clears the floor.
#[must_use]
pub fn peak_sample(samples: &[u16]) -> u16 {
    samples
        .iter()
        .copied()
        .filter(|&s| s > NOISE_FLOOR)
        .max()
        .unwrap_or(0)
}

/// Mean and RMS of the first `window` samples.
///
/// Returns `(0.0, 0.0)` for an empty waveform.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pedestal_and_noise(samples: &[u16], window: usize) -> (f64, f64) {
    let head = &samples[..window.min(samples.len())];
    if head.is_empty() {
        return (0.0, 0.0);
    }
    let n = head.len() as f64;
    let mean = head.iter().map(|&s| f64::from(s)).sum::<f64>() / n;
    let var = head
        .iter()
        .map(|&s| {
            let d = f64::from(s) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean, var.sqrt())
}

/// One channel's digitized waveform plus the quantities the DAQ derives from it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawChannelSample {
    /// Channel index (0..127).
    pub channel_index: i32,
    /// Digitizer board id.
    pub board_id: u16,
    /// Channel id on the board.
    pub channel_id: u16,
    /// ADC samples, always [`N_SAMPLES`] long.
    pub samples: Vec<u16>,
    /// Precomputed maximum sample value.
    pub max_adc: u16,
    /// Pedestal estimate.
    pub pedestal: f64,
    /// Noise (RMS) estimate.
    pub noise: f64,
    /// Event timestamp.
    pub timestamp: Timestamp,
}

impl RawChannelSample {
    /// Creates a sample with externally computed peak and pedestal values.
    ///
    /// # Errors
    /// Returns [`Error::WaveformLength`] if `samples` is not [`N_SAMPLES`] long.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channel_index: i32,
        board_id: u16,
        channel_id: u16,
        samples: Vec<u16>,
        max_adc: u16,
        pedestal: f64,
        noise: f64,
        timestamp: Timestamp,
    ) -> Result<Self> {
        if samples.len() != N_SAMPLES {
            return Err(Error::WaveformLength {
                expected: N_SAMPLES,
                actual: samples.len(),
            });
        }
        Ok(Self {
            channel_index,
            board_id,
            channel_id,
            samples,
            max_adc,
            pedestal,
            noise,
            timestamp,
        })
    }

    /// Creates a sample from a bare waveform, deriving the peak and the
    /// pedestal/noise pair the way the DAQ does.
    ///
    /// # Errors
    /// Returns [`Error::WaveformLength`] if `samples` is not [`N_SAMPLES`] long.
    pub fn from_waveform(
        channel_index: i32,
        board_id: u16,
        channel_id: u16,
        samples: Vec<u16>,
        timestamp: Timestamp,
    ) -> Result<Self> {
        let max_adc = peak_sample(&samples);
        let (pedestal, noise) = pedestal_and_noise(&samples, PEDESTAL_SAMPLES);
        Self::new(
            channel_index,
            board_id,
            channel_id,
            samples,
            max_adc,
            pedestal,
            noise,
            timestamp,
        )
    }

    /// Board/channel pair as a single id (`board * 100 + channel`).
    #[must_use]
    pub fn pade_id(&self) -> u32 {
        u32::from(self.board_id) * 100 + u32::from(self.channel_id)
    }
}
