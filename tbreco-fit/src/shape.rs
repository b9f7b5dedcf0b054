//! Semi-Gaussian pulse-shape fitter.
//!
//! The shaper output is modelled as a CR-RC^n pulse on a flat pedestal:
//!
//! ```text
//! y(t) = p + A * g((t - t0) / tau),   g(x) = (x / n)^n * exp(n - x) for x > 0
//! ```
//!
//! `g` peaks at `x = n` with value 1, so `A` is the pedestal-subtracted peak
//! amplitude and `n * tau` is the onset-to-peak (rise) time. For fixed
//! `(t0, tau)` the model is linear in `(p, A)`, which is solved exactly; the
//! two nonlinear parameters are scanned on a grid around the peak sample.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use tbreco_core::error::{Error, Result};
use tbreco_core::fit::{PulseFit, PulseFitter};
use tbreco_core::sample::{pedestal_and_noise, RawChannelSample, N_SAMPLES};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Best shaping time is at the edge of the scanned range.
pub const STATUS_TAU_AT_LIMIT: u32 = 1;
/// Best onset is at the edge of the scanned range.
pub const STATUS_ONSET_AT_LIMIT: u32 = 1 << 1;
/// Fitted amplitude is not positive.
pub const STATUS_NONPOSITIVE_AMPLITUDE: u32 = 1 << 2;
/// Too few samples in the fit window.
pub const STATUS_TOO_FEW_POINTS: u32 = 1 << 3;

const FREE_PARAMETERS: usize = 4;
/// Upper bound on grid steps along either scan axis.
const MAX_GRID_STEPS: f64 = 10_000.0;

/// Configuration for [`ShapeFitter`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ShapeFitConfig {
    /// Shaper order `n`.
    pub shaping_order: u32,
    /// Leading samples used for the noise estimate.
    pub pedestal_samples: usize,
    /// Smallest shaping time scanned (samples).
    pub min_tau: f64,
    /// Largest shaping time scanned (samples).
    pub max_tau: f64,
    /// Shaping-time grid step (samples).
    pub tau_step: f64,
    /// Onset is scanned within this distance of the expected onset (samples).
    pub onset_half_width: f64,
    /// Onset grid step (samples).
    pub onset_step: f64,
    /// Samples before the peak included in the fit.
    pub window_before: usize,
    /// Samples after the peak included in the fit.
    pub window_after: usize,
    /// Duration of one sample; rise times are reported in these units.
    pub sample_period: f64,
    /// Lower bound on the per-sample noise used to weight the fit.
    pub min_noise: f64,
}

impl Default for ShapeFitConfig {
    fn default() -> Self {
        Self {
            shaping_order: 2,
            pedestal_samples: 20,
            min_tau: 1.0,
            max_tau: 8.0,
            tau_step: 0.25,
            onset_half_width: 3.0,
            onset_step: 0.25,
            window_before: 15,
            window_after: 25,
            sample_period: 1.0,
            min_noise: 1.0,
        }
    }
}

impl ShapeFitConfig {
    /// Set the shaper order.
    #[must_use]
    pub fn with_shaping_order(mut self, order: u32) -> Self {
        self.shaping_order = order;
        self
    }

    /// Set the scanned shaping-time range and step.
    #[must_use]
    pub fn with_tau_range(mut self, min: f64, max: f64, step: f64) -> Self {
        self.min_tau = min;
        self.max_tau = max;
        self.tau_step = step;
        self
    }

    /// Set the fit window around the peak sample.
    #[must_use]
    pub fn with_window(mut self, before: usize, after: usize) -> Self {
        self.window_before = before;
        self.window_after = after;
        self
    }

    /// Set the sample period.
    #[must_use]
    pub fn with_sample_period(mut self, period: f64) -> Self {
        self.sample_period = period;
        self
    }

    /// Checks that the scan grid and fit window are usable.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        let invalid = |what: String| Err(Error::ConfigError(what));
        let positive = |x: f64| x.is_finite() && x > 0.0;

        if self.shaping_order == 0 {
            return invalid("shaping_order must be at least 1".into());
        }
        if self.pedestal_samples == 0 || self.pedestal_samples > N_SAMPLES {
            return invalid(format!(
                "pedestal_samples {} outside 1..={N_SAMPLES}",
                self.pedestal_samples
            ));
        }
        if !(positive(self.min_tau) && positive(self.tau_step))
            || !self.max_tau.is_finite()
            || self.max_tau < self.min_tau
        {
            return invalid(format!(
                "invalid shaping-time scan {}..{} step {}",
                self.min_tau, self.max_tau, self.tau_step
            ));
        }
        if !(self.onset_half_width.is_finite() && self.onset_half_width >= 0.0)
            || !positive(self.onset_step)
        {
            return invalid(format!(
                "invalid onset scan half-width {} step {}",
                self.onset_half_width, self.onset_step
            ));
        }
        if (self.max_tau - self.min_tau) / self.tau_step > MAX_GRID_STEPS
            || 2.0 * self.onset_half_width / self.onset_step > MAX_GRID_STEPS
        {
            return invalid(format!("scan grid exceeds {MAX_GRID_STEPS} steps per axis"));
        }
        if self.window_before > N_SAMPLES
            || self.window_after > N_SAMPLES
            || self.window_before + self.window_after + 1 <= FREE_PARAMETERS
        {
            return invalid(format!(
                "fit window {}+{} must hold more than {FREE_PARAMETERS} samples and at most {N_SAMPLES} on each side",
                self.window_before, self.window_after
            ));
        }
        if !positive(self.sample_period) {
            return invalid(format!("sample_period {} must be positive", self.sample_period));
        }
        if !positive(self.min_noise) {
            return invalid(format!("min_noise {} must be positive", self.min_noise));
        }
        Ok(())
    }
}

/// Normalised CR-RC^n shape, 1 at `x = n`.
#[inline]
#[must_use]
pub fn pulse_shape(x: f64, order: u32) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    let n = f64::from(order);
    (x / n).powi(order as i32) * (n - x).exp()
}

#[derive(Clone, Copy, Debug)]
struct LinearSolution {
    pedestal: f64,
    amplitude: f64,
    sum_sq: f64,
    det: f64,
}

#[derive(Clone, Copy, Debug)]
struct GridPoint {
    onset: f64,
    tau: f64,
    tau_index: usize,
    tau_count: usize,
    onset_index: usize,
    onset_count: usize,
    solution: LinearSolution,
}

/// Grid-scan fitter for shaped calorimeter pulses.
#[derive(Clone, Debug, Default)]
pub struct ShapeFitter {
    config: ShapeFitConfig,
}

impl ShapeFitter {
    /// Create with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ShapeFitConfig::default(),
        }
    }

    /// Create with custom configuration.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if the configuration fails
    /// [`ShapeFitConfig::validate`].
    pub fn with_config(config: ShapeFitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get current configuration.
    #[must_use]
    pub fn config(&self) -> &ShapeFitConfig {
        &self.config
    }

    /// Least-squares pedestal and amplitude for fixed onset and shaping time.
    fn solve(&self, times: &[f64], values: &[f64], onset: f64, tau: f64) -> Option<LinearSolution> {
        let order = self.config.shaping_order;
        let n = times.len() as f64;
        let (mut sg, mut sgg, mut sy, mut sgy) = (0.0, 0.0, 0.0, 0.0);
        for (&t, &y) in times.iter().zip(values) {
            let g = pulse_shape((t - onset) / tau, order);
            sg += g;
            sgg += g * g;
            sy += y;
            sgy += g * y;
        }
        let det = n * sgg - sg * sg;
        if det <= f64::EPSILON {
            return None;
        }
        let amplitude = (n * sgy - sg * sy) / det;
        let pedestal = (sgg * sy - sg * sgy) / det;
        let sum_sq = times
            .iter()
            .zip(values)
            .map(|(&t, &y)| {
                let r = y - pedestal - amplitude * pulse_shape((t - onset) / tau, order);
                r * r
            })
            .sum();
        Some(LinearSolution {
            pedestal,
            amplitude,
            sum_sq,
            det,
        })
    }

    fn scan(&self, times: &[f64], values: &[f64], peak: f64) -> Option<GridPoint> {
        let cfg = &self.config;
        let order = f64::from(cfg.shaping_order);
        let tau_count = ((cfg.max_tau - cfg.min_tau) / cfg.tau_step).round().max(0.0) as usize + 1;
        let onset_count = (2.0 * cfg.onset_half_width / cfg.onset_step).round().max(0.0) as usize + 1;

        let mut best: Option<GridPoint> = None;
        for tau_index in 0..tau_count {
            let tau = cfg.min_tau + tau_index as f64 * cfg.tau_step;
            let first_onset = peak - order * tau - cfg.onset_half_width;
            for onset_index in 0..onset_count {
                let onset = first_onset + onset_index as f64 * cfg.onset_step;
                let Some(solution) = self.solve(times, values, onset, tau) else {
                    continue;
                };
                if best.map_or(true, |b| solution.sum_sq < b.solution.sum_sq) {
                    best = Some(GridPoint {
                        onset,
                        tau,
                        tau_index,
                        tau_count,
                        onset_index,
                        onset_count,
                        solution,
                    });
                }
            }
        }
        best
    }

    /// Shaping-time uncertainty from the chi2 curvature along tau.
    fn tau_error(&self, times: &[f64], values: &[f64], best: &GridPoint, sigma2: f64) -> f64 {
        let h = self.config.tau_step;
        let fallback = h / 12f64.sqrt();
        if best.tau - h <= 0.0 {
            return fallback;
        }
        let lo = self.solve(times, values, best.onset, best.tau - h);
        let hi = self.solve(times, values, best.onset, best.tau + h);
        match (lo, hi) {
            (Some(lo), Some(hi)) => {
                let curvature =
                    (lo.sum_sq + hi.sum_sq - 2.0 * best.solution.sum_sq) / (sigma2 * h * h);
                if curvature > 0.0 {
                    (2.0 / curvature).sqrt()
                } else {
                    fallback
                }
            }
            _ => fallback,
        }
    }
}

impl PulseFitter for ShapeFitter {
    fn name(&self) -> &'static str {
        "ShapeFit"
    }

    fn fit(&self, sample: &RawChannelSample) -> PulseFit {
        let cfg = &self.config;
        let (baseline, noise) = pedestal_and_noise(&sample.samples, cfg.pedestal_samples);
        let sigma = noise.max(cfg.min_noise);
        let sigma2 = sigma * sigma;

        let failed = |status: u32| PulseFit {
            pedestal: baseline,
            noise,
            status,
            ..PulseFit::default()
        };

        let Some(peak_index) = sample
            .samples
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(i, _)| i)
        else {
            return failed(STATUS_TOO_FEW_POINTS);
        };

        let lo = peak_index.saturating_sub(cfg.window_before);
        let hi = (peak_index + cfg.window_after + 1).min(sample.samples.len());
        if hi - lo <= FREE_PARAMETERS {
            return failed(STATUS_TOO_FEW_POINTS);
        }
        let times: Vec<f64> = (lo..hi).map(|i| i as f64).collect();
        let values: Vec<f64> = sample.samples[lo..hi].iter().map(|&s| f64::from(s)).collect();

        let Some(best) = self.scan(&times, &values, peak_index as f64) else {
            return failed(STATUS_TOO_FEW_POINTS);
        };

        let mut status = 0;
        if best.tau_index == 0 || best.tau_index + 1 == best.tau_count {
            status |= STATUS_TAU_AT_LIMIT;
        }
        if best.onset_index == 0 || best.onset_index + 1 == best.onset_count {
            status |= STATUS_ONSET_AT_LIMIT;
        }
        if best.solution.amplitude <= 0.0 {
            status |= STATUS_NONPOSITIVE_AMPLITUDE;
        }

        let n = times.len() as f64;
        let order = f64::from(cfg.shaping_order);
        let amplitude_error = (sigma2 * n / best.solution.det).sqrt();
        let tau_error = self.tau_error(&times, &values, &best, sigma2);

        PulseFit {
            pedestal: best.solution.pedestal,
            noise,
            amplitude: best.solution.amplitude,
            amplitude_error,
            rise_time: order * best.tau * cfg.sample_period,
            rise_time_error: order * tau_error * cfg.sample_period,
            chi2: best.solution.sum_sq / sigma2,
            ndof: (times.len() - FREE_PARAMETERS) as u32,
            status,
        }
    }
}
