//! Pulse fitter interface.

use crate::sample::RawChannelSample;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Result bundle returned by a pulse fitter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PulseFit {
    /// Fitted pedestal.
    pub pedestal: f64,
    /// Noise estimate used by the fit.
    pub noise: f64,
    /// Pedestal-subtracted peak amplitude.
    pub amplitude: f64,
    /// Uncertainty on `amplitude`.
    pub amplitude_error: f64,
    /// Onset-to-peak time.
    pub rise_time: f64,
    /// Uncertainty on `rise_time`.
    pub rise_time_error: f64,
    /// Goodness of fit.
    pub chi2: f64,
    /// Degrees of freedom of the fit.
    pub ndof: u32,
    /// Fit quality code, 0 when the fit converged cleanly.
    pub status: u32,
}

impl PulseFit {
    /// Returns true if the fitter flagged the result.
    #[inline]
    #[must_use]
    pub fn is_poor(&self) -> bool {
        self.status != 0
    }
}

/// Trait for pulse-shape fitting routines.
///
/// Implementations are treated as black boxes by the hit builder: they see
/// the raw waveform and return a [`PulseFit`].
pub trait PulseFitter: Send + Sync {
    /// Fitter name.
    fn name(&self) -> &'static str;

    /// Fits the pulse in one channel's waveform.
    fn fit(&self, sample: &RawChannelSample) -> PulseFit;
}

impl<F: PulseFitter + ?Sized> PulseFitter for &F {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn fit(&self, sample: &RawChannelSample) -> PulseFit {
        (**self).fit(sample)
    }
}
