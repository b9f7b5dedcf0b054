//! Reconstructed hit type.

use std::fmt;

use crate::error::Result;
use crate::mapping::ChannelMapper;
use crate::sample::Timestamp;
use crate::status::HitStatus;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Channel index of a hit built without a sample.
pub const UNSET_CHANNEL: i32 = -1;
/// Raw peak of a hit built without a sample.
pub const UNSET_MAX_ADC: i32 = -1;
/// Pedestal, noise and amplitude before they are computed.
pub const UNSET_VALUE: f64 = -999.0;
/// Rise time before it is computed.
pub const UNSET_RISE_TIME: f64 = -1.0;

/// Calibration state of a hit.
///
/// The factor stored in `Calibrated` is absolute: it is the net scale between
/// the raw amplitude/noise values and the current ones.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CalibrationState {
    /// No calibration applied (factor 1).
    #[default]
    Raw,
    /// Calibrated with the given factor.
    Calibrated(f64),
}

impl CalibrationState {
    /// Net scale factor applied so far.
    #[inline]
    #[must_use]
    pub fn factor(self) -> f64 {
        match self {
            Self::Raw => 1.0,
            Self::Calibrated(factor) => factor,
        }
    }
}

/// A hit reconstructed from one channel's waveform in one event.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReconstructedHit {
    pub(crate) channel_index: i32,
    pub(crate) max_adc: i32,
    pub(crate) pedestal: f64,
    pub(crate) noise: f64,
    pub(crate) amplitude: f64,
    pub(crate) amplitude_error: f64,
    pub(crate) rise_time: f64,
    pub(crate) rise_time_error: f64,
    pub(crate) chi2: f64,
    pub(crate) ndof: u32,
    pub(crate) zs_threshold: f64,
    pub(crate) status: HitStatus,
    pub(crate) calibration: CalibrationState,
    pub(crate) timestamp: Timestamp,
}

impl Default for ReconstructedHit {
    fn default() -> Self {
        Self {
            channel_index: UNSET_CHANNEL,
            max_adc: UNSET_MAX_ADC,
            pedestal: UNSET_VALUE,
            noise: UNSET_VALUE,
            amplitude: UNSET_VALUE,
            amplitude_error: 0.0,
            rise_time: UNSET_RISE_TIME,
            rise_time_error: 0.0,
            chi2: 0.0,
            ndof: 0,
            zs_threshold: 0.0,
            status: HitStatus::CLEAN,
            calibration: CalibrationState::Raw,
            timestamp: Timestamp::default(),
        }
    }
}

impl ReconstructedHit {
    /// Channel index, -1 if the hit was built without a sample.
    #[inline]
    #[must_use]
    pub fn channel_index(&self) -> i32 {
        self.channel_index
    }

    /// Raw peak sample value, -1 if unset.
    #[inline]
    #[must_use]
    pub fn max_adc(&self) -> i32 {
        self.max_adc
    }

    #[inline]
    #[must_use]
    pub fn pedestal(&self) -> f64 {
        self.pedestal
    }

    #[inline]
    #[must_use]
    pub fn noise(&self) -> f64 {
        self.noise
    }

    #[inline]
    #[must_use]
    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    #[inline]
    #[must_use]
    pub fn amplitude_error(&self) -> f64 {
        self.amplitude_error
    }

    #[inline]
    #[must_use]
    pub fn rise_time(&self) -> f64 {
        self.rise_time
    }

    #[inline]
    #[must_use]
    pub fn rise_time_error(&self) -> f64 {
        self.rise_time_error
    }

    #[inline]
    #[must_use]
    pub fn chi2(&self) -> f64 {
        self.chi2
    }

    #[inline]
    #[must_use]
    pub fn ndof(&self) -> u32 {
        self.ndof
    }

    /// Chi-square per degree of freedom, infinite when `ndof` is 0.
    #[must_use]
    pub fn chi2_per_ndof(&self) -> f64 {
        if self.ndof == 0 {
            f64::INFINITY
        } else {
            self.chi2 / f64::from(self.ndof)
        }
    }

    /// Significance threshold the hit was built with.
    #[inline]
    #[must_use]
    pub fn zs_threshold(&self) -> f64 {
        self.zs_threshold
    }

    #[inline]
    #[must_use]
    pub fn status(&self) -> HitStatus {
        self.status
    }

    #[inline]
    #[must_use]
    pub fn calibration(&self) -> CalibrationState {
        self.calibration
    }

    /// Net calibration factor applied to amplitude, amplitude error and noise.
    #[inline]
    #[must_use]
    pub fn calibration_factor(&self) -> f64 {
        self.calibration.factor()
    }

    /// Returns true if the net calibration factor differs from 1.
    #[inline]
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_calibrated(&self) -> bool {
        self.calibration_factor() != 1.0
    }

    /// Returns true if `amplitude` still holds the unset sentinel because
    /// the hit was never fit.
    #[inline]
    #[must_use]
    pub fn amplitude_is_unset(&self) -> bool {
        self.status.is_zero_suppressed() || self.status.is_no_fit()
    }

    #[inline]
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Copy of this hit under a new channel index, with extra status flags.
    #[must_use]
    pub fn reindexed(&self, channel_index: i32, extra_status: HitStatus) -> Self {
        Self {
            channel_index,
            status: self.status | extra_status,
            ..self.clone()
        }
    }
}

/// One rendered output line: `index,x,y,z,noise,amplitude,rise_time,chi2`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HitRecord {
    pub index: i32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub noise: f64,
    pub amplitude: f64,
    pub rise_time: f64,
    pub chi2: f64,
}

impl HitRecord {
    /// Column names matching the [`fmt::Display`] output.
    pub const HEADER: &'static str = "index,x,y,z,noise,amplitude,rise_time,chi2";

    /// Resolves the hit's position through the channel mapper.
    ///
    /// # Errors
    /// Returns an error if the mapper does not know the hit's channel at the
    /// hit's timestamp.
    pub fn from_hit<M: ChannelMapper + ?Sized>(hit: &ReconstructedHit, mapper: &M) -> Result<Self> {
        let (x, y, z) = mapper.channel_xyz(hit.channel_index, hit.timestamp)?;
        Ok(Self {
            index: hit.channel_index,
            x,
            y,
            z,
            noise: hit.noise,
            amplitude: hit.amplitude,
            rise_time: hit.rise_time,
            chi2: hit.chi2,
        })
    }
}

impl fmt::Display for HitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{},{}",
            self.index,
            self.x,
            self.y,
            self.z,
            self.noise,
            self.amplitude,
            self.rise_time,
            self.chi2
        )
    }
}
