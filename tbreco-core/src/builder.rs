//! Waveform-to-hit construction.
//!
//! The builder copies the DAQ's raw estimates into a [`ReconstructedHit`],
//! decides whether the peak is significant above the noise, and only then
//! runs the pulse fitter.

use log::trace;

use crate::fit::PulseFitter;
use crate::hit::ReconstructedHit;
use crate::sample::RawChannelSample;
use crate::status::HitStatus;

/// Added to the noise in the significance test so dead channels
/// (noise 0) do not divide by zero.
pub const SIGNIFICANCE_EPSILON: f64 = 1e-6;

/// Configuration for hit reconstruction.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconstructionConfig {
    /// Zero-suppression significance threshold in units of the noise.
    pub zs_threshold: f64,
    /// Skip pulse fitting entirely.
    pub skip_fit: bool,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            zs_threshold: 5.0,
            skip_fit: false,
        }
    }
}

impl ReconstructionConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the zero-suppression threshold.
    #[must_use]
    pub fn with_zs_threshold(mut self, threshold: f64) -> Self {
        self.zs_threshold = threshold;
        self
    }

    /// Sets whether fitting is skipped.
    #[must_use]
    pub fn with_skip_fit(mut self, skip: bool) -> Self {
        self.skip_fit = skip;
        self
    }
}

/// Peak significance `|max_adc - pedestal| / (noise + epsilon)`.
#[inline]
#[must_use]
pub fn significance(max_adc: f64, pedestal: f64, noise: f64) -> f64 {
    (max_adc - pedestal).abs() / (noise + SIGNIFICANCE_EPSILON)
}

/// Builds reconstructed hits using a pulse fitter.
#[derive(Clone, Debug, Default)]
pub struct HitBuilder<F> {
    fitter: F,
}

impl<F: PulseFitter> HitBuilder<F> {
    /// Creates a builder around a fitter.
    #[must_use]
    pub fn new(fitter: F) -> Self {
        Self { fitter }
    }

    /// The fitter used for significant pulses.
    #[must_use]
    pub fn fitter(&self) -> &F {
        &self.fitter
    }

    /// Builds a hit from one channel's sample.
    ///
    /// An absent sample gives a hit with every field at its sentinel value.
    #[must_use]
    pub fn build(
        &self,
        sample: Option<&RawChannelSample>,
        zs_threshold: f64,
        skip_fit: bool,
    ) -> ReconstructedHit {
        let mut hit = ReconstructedHit {
            zs_threshold,
            ..ReconstructedHit::default()
        };
        let Some(sample) = sample else {
            return hit;
        };

        hit.channel_index = sample.channel_index;
        hit.timestamp = sample.timestamp;
        hit.max_adc = i32::from(sample.max_adc);
        hit.pedestal = sample.pedestal;
        hit.noise = sample.noise;

        if skip_fit {
            hit.status |= HitStatus::NO_FIT;
            return hit;
        }

        let sig = significance(f64::from(sample.max_adc), sample.pedestal, sample.noise);
        if sig < zs_threshold {
            trace!(
                "channel {} zero-suppressed (significance {sig:.2} < {zs_threshold})",
                sample.channel_index
            );
            hit.status |= HitStatus::ZERO_SUPPRESSED;
            return hit;
        }

        let fit = self.fitter.fit(sample);
        hit.pedestal = fit.pedestal;
        hit.noise = fit.noise;
        hit.amplitude = fit.amplitude;
        hit.amplitude_error = fit.amplitude_error;
        hit.rise_time = fit.rise_time;
        hit.rise_time_error = fit.rise_time_error;
        hit.chi2 = fit.chi2;
        hit.ndof = fit.ndof;
        if fit.is_poor() {
            trace!(
                "channel {} fit by {} returned status {}",
                sample.channel_index,
                self.fitter.name(),
                fit.status
            );
            hit.status |= HitStatus::POOR_FIT;
        }
        hit
    }

    /// Builds a hit with the settings from a [`ReconstructionConfig`].
    #[must_use]
    pub fn build_with(
        &self,
        sample: Option<&RawChannelSample>,
        config: &ReconstructionConfig,
    ) -> ReconstructedHit {
        self.build(sample, config.zs_threshold, config.skip_fit)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::fit::PulseFit;
    use crate::hit::{UNSET_RISE_TIME, UNSET_VALUE};
    use crate::sample::{Timestamp, N_SAMPLES};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingFitter {
        calls: AtomicUsize,
        status: u32,
    }

    impl PulseFitter for CountingFitter {
        fn name(&self) -> &'static str {
            "Counting"
        }

        fn fit(&self, sample: &RawChannelSample) -> PulseFit {
            self.calls.fetch_add(1, Ordering::SeqCst);
            PulseFit {
                pedestal: sample.pedestal + 1.0,
                noise: 4.0,
                amplitude: 512.0,
                amplitude_error: 3.0,
                rise_time: 6.0,
                rise_time_error: 0.25,
                chi2: 40.0,
                ndof: 20,
                status: self.status,
            }
        }
    }

    impl CountingFitter {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn sample(max_adc: u16, pedestal: f64, noise: f64) -> RawChannelSample {
        RawChannelSample::new(
            12,
            112,
            12,
            vec![100; N_SAMPLES],
            max_adc,
            pedestal,
            noise,
            Timestamp(99),
        )
        .unwrap()
    }

    #[test]
    fn test_absent_sample() {
        let builder = HitBuilder::new(CountingFitter::default());
        let hit = builder.build(None, 3.0, false);
        assert_eq!(hit.channel_index(), -1);
        assert_eq!(hit.max_adc(), -1);
        assert_eq!(hit.pedestal(), UNSET_VALUE);
        assert_eq!(hit.zs_threshold(), 3.0);
        assert!(hit.status().is_clean());
        assert_eq!(builder.fitter().calls(), 0);
    }

    #[test]
    fn test_skip_fit_never_calls_fitter() {
        let builder = HitBuilder::new(CountingFitter::default());
        let hit = builder.build(Some(&sample(900, 100.0, 2.0)), 3.0, true);
        assert_eq!(builder.fitter().calls(), 0);
        assert!(hit.status().is_no_fit());
        assert_eq!(hit.channel_index(), 12);
        assert_eq!(hit.max_adc(), 900);
        assert_eq!(hit.pedestal(), 100.0);
        assert_eq!(hit.noise(), 2.0);
        assert_eq!(hit.amplitude(), UNSET_VALUE);
        assert_eq!(hit.timestamp(), Timestamp(99));
    }

    #[test]
    fn test_zero_suppressed_keeps_unfit_defaults() {
        let builder = HitBuilder::new(CountingFitter::default());
        // (120 - 100) / 5 = 4 sigma
        let hit = builder.build(Some(&sample(120, 100.0, 5.0)), 5.0, false);
        assert_eq!(builder.fitter().calls(), 0);
        assert!(hit.status().is_zero_suppressed());
        assert_eq!(hit.amplitude(), UNSET_VALUE);
        assert_eq!(hit.amplitude_error(), 0.0);
        assert_eq!(hit.rise_time(), UNSET_RISE_TIME);
        assert_eq!(hit.chi2(), 0.0);
        assert_eq!(hit.ndof(), 0);
    }

    #[test]
    fn test_significant_pulse_is_fit() {
        let builder = HitBuilder::new(CountingFitter::default());
        let hit = builder.build(Some(&sample(900, 100.0, 5.0)), 5.0, false);
        assert_eq!(builder.fitter().calls(), 1);
        assert!(hit.status().is_clean());
        assert_eq!(hit.pedestal(), 101.0);
        assert_eq!(hit.noise(), 4.0);
        assert_eq!(hit.amplitude(), 512.0);
        assert_eq!(hit.amplitude_error(), 3.0);
        assert_eq!(hit.rise_time(), 6.0);
        assert_eq!(hit.rise_time_error(), 0.25);
        assert_eq!(hit.chi2(), 40.0);
        assert_eq!(hit.ndof(), 20);
        assert_eq!(hit.chi2_per_ndof(), 2.0);
    }

    #[test]
    fn test_negative_pulse_uses_absolute_significance() {
        let builder = HitBuilder::new(CountingFitter::default());
        // peak 100 below the pedestal is still 20 sigma
        let hit = builder.build(Some(&sample(0, 100.0, 5.0)), 5.0, false);
        assert_eq!(builder.fitter().calls(), 1);
        assert!(!hit.status().is_zero_suppressed());
    }

    #[test]
    fn test_dead_channel_does_not_divide_by_zero() {
        let builder = HitBuilder::new(CountingFitter::default());
        let hit = builder.build(Some(&sample(100, 100.0, 0.0)), 5.0, false);
        assert!(hit.status().is_zero_suppressed());

        let hit = builder.build(Some(&sample(101, 100.0, 0.0)), 5.0, false);
        assert!(!hit.status().is_zero_suppressed());
        assert_eq!(builder.fitter().calls(), 1);
    }

    #[test]
    fn test_poor_fit_flagged() {
        let builder = HitBuilder::new(CountingFitter {
            status: 4,
            ..CountingFitter::default()
        });
        let config = ReconstructionConfig::new().with_zs_threshold(3.0);
        let hit = builder.build_with(Some(&sample(900, 100.0, 5.0)), &config);
        assert!(hit.status().is_poor_fit());
        // values still copied from the fit
        assert_eq!(hit.amplitude(), 512.0);
    }

    #[test]
    fn test_config_builder() {
        let config = ReconstructionConfig::new()
            .with_zs_threshold(30.0)
            .with_skip_fit(true);
        assert_eq!(config.zs_threshold, 30.0);
        assert!(config.skip_fit);
        assert_eq!(ReconstructionConfig::default().zs_threshold, 5.0);
    }
}
