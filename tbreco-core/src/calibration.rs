//! Per-channel calibration of reconstructed hits.
//!
//! A hit remembers the absolute factor it was last calibrated with. Applying
//! a table first divides that factor out, so reapplying the same table is a
//! no-op and applying a second table is equivalent to applying it directly
//! to the raw hit.

use crate::error::{Error, Result};
use crate::hit::{CalibrationState, ReconstructedHit};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Scale factors indexed by channel index.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "Vec<f64>", into = "Vec<f64>"))]
pub struct CalibrationTable {
    factors: Vec<f64>,
}

impl CalibrationTable {
    /// Creates a table from per-channel factors.
    ///
    /// # Errors
    /// Returns [`Error::InvalidCalibrationFactor`] for a factor that is zero,
    /// negative, or not finite.
    pub fn new(factors: Vec<f64>) -> Result<Self> {
        if let Some((channel, &factor)) = factors
            .iter()
            .enumerate()
            .find(|(_, &f)| !(f.is_finite() && f > 0.0))
        {
            return Err(Error::InvalidCalibrationFactor { channel, factor });
        }
        Ok(Self { factors })
    }

    /// Identity table covering `channels` channels.
    #[must_use]
    pub fn identity(channels: usize) -> Self {
        Self {
            factors: vec![1.0; channels],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Factor for a channel index.
    ///
    /// # Errors
    /// Returns [`Error::ChannelOutOfRange`] if the table has no entry for
    /// `index`.
    pub fn factor(&self, index: i32) -> Result<f64> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.factors.get(i))
            .copied()
            .ok_or(Error::ChannelOutOfRange {
                index,
                len: self.factors.len(),
            })
    }

    /// Factors as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.factors
    }
}

impl TryFrom<Vec<f64>> for CalibrationTable {
    type Error = Error;

    fn try_from(factors: Vec<f64>) -> Result<Self> {
        Self::new(factors)
    }
}

impl From<CalibrationTable> for Vec<f64> {
    fn from(table: CalibrationTable) -> Self {
        table.factors
    }
}

/// Calibrates one hit in place.
///
/// Amplitude, amplitude error and noise are scaled. A zero-suppressed or
/// unfit hit keeps its amplitude sentinel; its noise is still scaled. A
/// factor of exactly 1 leaves the hit [`CalibrationState::Raw`].
///
/// # Errors
/// Returns [`Error::ChannelOutOfRange`] if the table does not cover the hit's
/// channel index. The hit is left unchanged in that case.
#[allow(clippy::float_cmp)]
pub fn calibrate(hit: &mut ReconstructedHit, table: &CalibrationTable) -> Result<()> {
    let factor = table.factor(hit.channel_index)?;
    let incremental = factor / hit.calibration.factor();
    if !hit.amplitude_is_unset() {
        hit.amplitude *= incremental;
        hit.amplitude_error *= incremental;
    }
    hit.noise *= incremental;
    hit.calibration = if factor == 1.0 {
        CalibrationState::Raw
    } else {
        CalibrationState::Calibrated(factor)
    };
    Ok(())
}

/// Calibrates every hit in order.
///
/// All channel indices are checked before any hit is modified, so on error
/// the collection is untouched.
///
/// # Errors
/// Returns [`Error::ChannelOutOfRange`] for the first hit whose channel index
/// the table does not cover.
pub fn calibrate_all(hits: &mut [ReconstructedHit], table: &CalibrationTable) -> Result<()> {
    for hit in hits.iter() {
        table.factor(hit.channel_index)?;
    }
    for hit in hits.iter_mut() {
        calibrate(hit, table)?;
    }
    Ok(())
}
