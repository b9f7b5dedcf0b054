//! High-level helpers that build, calibrate and classify whole events.

use log::debug;
use rayon::prelude::*;
use tbreco_core::builder::{HitBuilder, ReconstructionConfig};
use tbreco_core::calibration::{calibrate, CalibrationTable};
use tbreco_core::error::Result;
use tbreco_core::fit::PulseFitter;
use tbreco_core::hit::ReconstructedHit;
use tbreco_core::quality::{GainSetting, QualityCuts};
use tbreco_core::sample::RawChannelSample;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Builds one hit per sample, in parallel, keeping the sample order.
pub fn reconstruct_event<F: PulseFitter>(
    samples: &[RawChannelSample],
    builder: &HitBuilder<F>,
    config: &ReconstructionConfig,
) -> Vec<ReconstructedHit> {
    samples
        .par_iter()
        .map(|sample| builder.build_with(Some(sample), config))
        .collect()
}

/// Parallel form of [`tbreco_core::calibrate_all`].
///
/// Channel indices are validated before any hit is modified.
///
/// # Errors
/// Returns `ChannelOutOfRange` if the table does not cover a hit's channel.
pub fn calibrate_all_par(hits: &mut [ReconstructedHit], table: &CalibrationTable) -> Result<()> {
    hits.par_iter()
        .try_for_each(|hit| table.factor(hit.channel_index()).map(|_| ()))?;
    hits.par_iter_mut().try_for_each(|hit| calibrate(hit, table))
}

/// Good/bad verdict for every sample, in sample order.
pub fn classify_event<F: PulseFitter>(
    samples: &[RawChannelSample],
    builder: &HitBuilder<F>,
    cuts: &QualityCuts,
    setting: &GainSetting,
) -> Vec<bool> {
    samples
        .par_iter()
        .map(|sample| cuts.is_good_pulse(builder, sample, setting))
        .collect()
}

/// Counts of hits by reconstruction outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReconstructionStatistics {
    /// Hits seen.
    pub total: usize,
    /// Hits fit without any flag.
    pub clean: usize,
    /// Hits below the significance threshold.
    pub zero_suppressed: usize,
    /// Hits whose fit was flagged.
    pub poor_fit: usize,
    /// Hits built without fitting.
    pub no_fit: usize,
    /// Hits that passed the quality cuts.
    pub good: usize,
}

impl ReconstructionStatistics {
    /// Tallies a set of hits.
    #[must_use]
    pub fn from_hits(hits: &[ReconstructedHit]) -> Self {
        let mut stats = Self::default();
        for hit in hits {
            stats.record(hit);
        }
        stats
    }

    /// Adds one hit to the tally.
    pub fn record(&mut self, hit: &ReconstructedHit) {
        let status = hit.status();
        self.total += 1;
        if status.is_clean() {
            self.clean += 1;
        }
        if status.is_zero_suppressed() {
            self.zero_suppressed += 1;
        }
        if status.is_poor_fit() {
            self.poor_fit += 1;
        }
        if status.is_no_fit() {
            self.no_fit += 1;
        }
    }

    /// Adds another tally to this one.
    pub fn merge(&mut self, other: &Self) {
        self.total += other.total;
        self.clean += other.clean;
        self.zero_suppressed += other.zero_suppressed;
        self.poor_fit += other.poor_fit;
        self.no_fit += other.no_fit;
        self.good += other.good;
    }
}

/// A reconstructed hit with its quality verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedHit {
    /// The calibrated hit.
    pub hit: ReconstructedHit,
    /// Quality verdict; `true` when no gain setting was configured.
    pub good: bool,
}

/// Build, calibrate and classify pipeline for one run.
#[derive(Debug, Clone)]
pub struct ReconstructionPipeline<F> {
    builder: HitBuilder<F>,
    config: ReconstructionConfig,
    calibration: Option<CalibrationTable>,
    cuts: QualityCuts,
    gains: Option<GainSetting>,
}

impl<F: PulseFitter> ReconstructionPipeline<F> {
    /// Pipeline with the standard cut table, no calibration and no gain
    /// setting.
    #[must_use]
    pub fn new(fitter: F, config: ReconstructionConfig) -> Self {
        Self {
            builder: HitBuilder::new(fitter),
            config,
            calibration: None,
            cuts: QualityCuts::standard(),
            gains: None,
        }
    }

    /// Set the calibration table.
    #[must_use]
    pub fn with_calibration(mut self, table: CalibrationTable) -> Self {
        self.calibration = Some(table);
        self
    }

    /// Set the quality cut table.
    #[must_use]
    pub fn with_cuts(mut self, cuts: QualityCuts) -> Self {
        self.cuts = cuts;
        self
    }

    /// Set the gain setting used for quality classification.
    #[must_use]
    pub fn with_gains(mut self, gains: GainSetting) -> Self {
        self.gains = Some(gains);
        self
    }

    /// The hit builder.
    #[must_use]
    pub fn builder(&self) -> &HitBuilder<F> {
        &self.builder
    }

    /// The reconstruction settings.
    #[must_use]
    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Processes one event's channels.
    ///
    /// # Errors
    /// Returns `ChannelOutOfRange` if the calibration table does not cover a
    /// channel in the event.
    pub fn process_event(
        &self,
        samples: &[RawChannelSample],
        stats: &mut ReconstructionStatistics,
    ) -> Result<Vec<ProcessedHit>> {
        let mut hits = reconstruct_event(samples, &self.builder, &self.config);
        if let Some(table) = &self.calibration {
            calibrate_all_par(&mut hits, table)?;
        }
        let verdicts = match &self.gains {
            Some(gains) => classify_event(samples, &self.builder, &self.cuts, gains),
            None => vec![true; hits.len()],
        };

        let mut event_stats = ReconstructionStatistics::from_hits(&hits);
        event_stats.good = verdicts.iter().filter(|&&good| good).count();
        debug!(
            "event: {} channels, {} fit, {} zero-suppressed, {} poor fits, {} good",
            event_stats.total,
            event_stats.clean,
            event_stats.zero_suppressed,
            event_stats.poor_fit,
            event_stats.good
        );
        stats.merge(&event_stats);

        Ok(hits
            .into_iter()
            .zip(verdicts)
            .map(|(hit, good)| ProcessedHit { hit, good })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tbreco_core::fit::PulseFit;
    use tbreco_core::quality::GainLevel;
    use tbreco_core::sample::{Timestamp, N_SAMPLES};

    struct FlatFitter;

    impl PulseFitter for FlatFitter {
        fn name(&self) -> &'static str {
            "Flat"
        }

        fn fit(&self, sample: &RawChannelSample) -> PulseFit {
            PulseFit {
                pedestal: sample.pedestal,
                noise: sample.noise,
                amplitude: f64::from(sample.max_adc) - sample.pedestal,
                amplitude_error: 1.0,
                rise_time: 4.0,
                rise_time_error: 0.5,
                chi2: 10.0,
                ndof: 10,
                status: u32::from(sample.max_adc > 3000),
            }
        }
    }

    fn sample(channel: i32, max_adc: u16) -> RawChannelSample {
        RawChannelSample::new(
            channel,
            112,
            channel as u16,
            vec![100; N_SAMPLES],
            max_adc,
            100.0,
            2.0,
            Timestamp(5),
        )
        .unwrap()
    }

    fn event() -> Vec<RawChannelSample> {
        vec![sample(0, 104), sample(1, 350), sample(2, 3500), sample(3, 700)]
    }

    #[test]
    fn test_reconstruct_event_keeps_order() {
        let builder = HitBuilder::new(FlatFitter);
        let hits = reconstruct_event(&event(), &builder, &ReconstructionConfig::default());
        let indices: Vec<i32> = hits.iter().map(ReconstructedHit::channel_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(hits[0].status().is_zero_suppressed());
        assert!(hits[1].status().is_clean());
        assert!(hits[2].status().is_poor_fit());
    }

    #[test]
    fn test_calibrate_all_par() {
        let builder = HitBuilder::new(FlatFitter);
        let mut hits = reconstruct_event(&event(), &builder, &ReconstructionConfig::default());
        let table = CalibrationTable::new(vec![1.0, 2.0, 1.0, 0.5]).unwrap();
        calibrate_all_par(&mut hits, &table).unwrap();
        assert!((hits[1].amplitude() - 500.0).abs() < 1e-9);
        assert!((hits[3].amplitude() - 300.0).abs() < 1e-9);

        let short = CalibrationTable::identity(2);
        let mut fresh = reconstruct_event(&event(), &builder, &ReconstructionConfig::default());
        assert!(calibrate_all_par(&mut fresh, &short).is_err());
        assert!(fresh.iter().all(|h| !h.is_calibrated()));
    }

    #[test]
    fn test_pipeline_statistics() {
        let pipeline = ReconstructionPipeline::new(FlatFitter, ReconstructionConfig::default())
            .with_calibration(CalibrationTable::identity(4))
            .with_gains(GainSetting::new(GainLevel::Low, GainLevel::Low, 0x100));

        let mut stats = ReconstructionStatistics::default();
        let processed = pipeline.process_event(&event(), &mut stats).unwrap();
        assert_eq!(processed.len(), 4);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.zero_suppressed, 1);
        assert_eq!(stats.poor_fit, 1);
        assert_eq!(stats.clean, 2);

        // Low/Low/100 cuts amplitude at 300: 250 passes, 600 and 3400 fail,
        // the 2 sigma pulse is judged with the suppressed sentinels
        let verdicts: Vec<bool> = processed.iter().map(|p| p.good).collect();
        assert_eq!(verdicts, vec![false, true, false, false]);
        assert_eq!(stats.good, 1);
    }

    #[test]
    fn test_pipeline_without_gains_accepts_all() {
        let pipeline = ReconstructionPipeline::new(FlatFitter, ReconstructionConfig::default());
        let mut stats = ReconstructionStatistics::default();
        let processed = pipeline.process_event(&event(), &mut stats).unwrap();
        assert!(processed.iter().all(|p| p.good));
        assert_eq!(stats.good, 4);
    }
}
