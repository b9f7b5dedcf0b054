//! JSON run configuration.
//!
//! Every section is optional:
//!
//! ```text
//! {
//!   "reconstruction": {"zs_threshold": 5.0, "skip_fit": false},
//!   "gains": {"pga": "mid", "lna": "high", "vga": "300"},
//!   "calibration": [1.0, 0.98, ...],
//!   "quality_cuts": [{"pga": "mid", "lna": "high", "vga": "0x500",
//!                     "max_amplitude": 1800.0, "max_chi2_per_ndof": 2000.0}],
//!   "replace_standard_cuts": false,
//!   "fit": {"shaping_order": 2, "max_tau": 10.0}
//! }
//! ```
//!
//! A VGA setting given as a string is hexadecimal; given as a number it is
//! the register value itself.

use crate::Result;
use serde::Deserialize;
use std::path::Path;
use tbreco_core::{
    parse_vga, CalibrationTable, GainLevel, GainSetting, QualityCut, QualityCuts,
    ReconstructionConfig,
};
use tbreco_fit::ShapeFitConfig;

#[derive(Deserialize)]
#[serde(untagged)]
enum VgaValue {
    Register(u16),
    Hex(String),
}

impl VgaValue {
    fn resolve(self) -> tbreco_core::Result<u16> {
        match self {
            Self::Register(value) => Ok(value),
            Self::Hex(text) => parse_vga(&text),
        }
    }
}

#[derive(Deserialize)]
struct GainEntry {
    pga: GainLevel,
    lna: GainLevel,
    vga: VgaValue,
}

impl GainEntry {
    fn resolve(self) -> tbreco_core::Result<GainSetting> {
        Ok(GainSetting::new(self.pga, self.lna, self.vga.resolve()?))
    }
}

#[derive(Deserialize)]
struct CutEntry {
    #[serde(flatten)]
    gains: GainEntry,
    max_amplitude: f64,
    max_chi2_per_ndof: f64,
}

#[derive(Deserialize)]
#[serde(default)]
struct ReconstructionSection {
    zs_threshold: f64,
    skip_fit: bool,
}

impl Default for ReconstructionSection {
    fn default() -> Self {
        let defaults = ReconstructionConfig::default();
        Self {
            zs_threshold: defaults.zs_threshold,
            skip_fit: defaults.skip_fit,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RunConfigFile {
    reconstruction: ReconstructionSection,
    gains: Option<GainEntry>,
    calibration: Option<CalibrationTable>,
    quality_cuts: Vec<CutEntry>,
    replace_standard_cuts: bool,
    fit: ShapeFitConfig,
}

/// Settings for one reconstruction run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Zero-suppression and fit switches.
    pub reconstruction: ReconstructionConfig,
    /// Gain setting used to pick the quality cut, if known.
    pub gains: Option<GainSetting>,
    /// Per-channel calibration factors.
    pub calibration: Option<CalibrationTable>,
    /// Quality cut table: the standard table with any overrides applied.
    pub cuts: QualityCuts,
    /// Shape fitter settings.
    pub fit: ShapeFitConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            reconstruction: ReconstructionConfig::default(),
            gains: None,
            calibration: None,
            cuts: QualityCuts::standard(),
            fit: ShapeFitConfig::default(),
        }
    }
}

impl RunConfig {
    /// Parses a run configuration from JSON text.
    ///
    /// # Errors
    /// Returns an error for malformed JSON, an invalid VGA setting, an
    /// invalid calibration factor, or fit settings that fail
    /// [`ShapeFitConfig::validate`].
    pub fn from_json(json: &str) -> Result<Self> {
        let file: RunConfigFile = serde_json::from_str(json)?;

        let mut cuts = if file.replace_standard_cuts {
            QualityCuts::empty()
        } else {
            QualityCuts::standard()
        };
        for entry in file.quality_cuts {
            cuts.insert(
                entry.gains.resolve()?,
                QualityCut::new(entry.max_amplitude, entry.max_chi2_per_ndof),
            );
        }

        let fit = file.fit;
        fit.validate()?;

        Ok(Self {
            reconstruction: ReconstructionConfig::new()
                .with_zs_threshold(file.reconstruction.zs_threshold)
                .with_skip_fit(file.reconstruction.skip_fit),
            gains: file.gains.map(GainEntry::resolve).transpose()?,
            calibration: file.calibration,
            cuts,
            fit,
        })
    }

    /// Reads a run configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RunConfig::from_json("{}").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.cuts.len(), 14);
    }

    #[test]
    fn test_full_config() {
        let config = RunConfig::from_json(
            r#"{
                "reconstruction": {"zs_threshold": 8.0},
                "gains": {"pga": "mid", "lna": "high", "vga": "300"},
                "calibration": [1.0, 0.5, 2.0],
                "quality_cuts": [
                    {"pga": "mid", "lna": "high", "vga": 1280,
                     "max_amplitude": 2500.0, "max_chi2_per_ndof": 100.0},
                    {"pga": "vhigh", "lna": "low", "vga": "0x100",
                     "max_amplitude": 50.0, "max_chi2_per_ndof": 5.0}
                ],
                "fit": {"shaping_order": 3}
            }"#,
        )
        .unwrap();

        assert!((config.reconstruction.zs_threshold - 8.0).abs() < f64::EPSILON);
        assert!(!config.reconstruction.skip_fit);
        assert_eq!(
            config.gains,
            Some(GainSetting::new(GainLevel::Mid, GainLevel::High, 0x300))
        );
        assert_eq!(config.calibration.as_ref().map(CalibrationTable::len), Some(3));
        assert_eq!(config.cuts.len(), 15);
        let overridden = config
            .cuts
            .get(&GainSetting::new(GainLevel::Mid, GainLevel::High, 0x500))
            .unwrap();
        assert!((overridden.max_amplitude - 2500.0).abs() < f64::EPSILON);
        assert_eq!(config.fit.shaping_order, 3);
        assert_eq!(config.fit.window_after, ShapeFitConfig::default().window_after);
    }

    #[test]
    fn test_replace_standard_cuts() {
        let config = RunConfig::from_json(
            r#"{"replace_standard_cuts": true,
                "quality_cuts": [{"pga": "low", "lna": "low", "vga": "100",
                                  "max_amplitude": 1.0, "max_chi2_per_ndof": 1.0}]}"#,
        )
        .unwrap();
        assert_eq!(config.cuts.len(), 1);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(RunConfig::from_json(r#"{"gains": {"pga": "huge", "lna": "low", "vga": 1}}"#).is_err());
        assert!(RunConfig::from_json(r#"{"gains": {"pga": "low", "lna": "low", "vga": "xyz"}}"#).is_err());
        assert!(RunConfig::from_json(r#"{"calibration": [1.0, 0.0]}"#).is_err());
        assert!(RunConfig::from_json(r#"{"fit": {"tau_step": 0.0}}"#).is_err());
    }

    #[test]
    fn test_unusable_fit_settings_rejected() {
        for fit in [
            r#"{"onset_step": 0.0}"#,
            r#"{"onset_half_width": -2.0}"#,
            r#"{"min_noise": 0.0}"#,
            r#"{"window_before": 1, "window_after": 1}"#,
            r#"{"window_after": 18446744073709551615}"#,
        ] {
            let json = format!(r#"{{"fit": {fit}}}"#);
            assert!(
                matches!(
                    RunConfig::from_json(&json),
                    Err(Error::CoreError(tbreco_core::Error::ConfigError(_)))
                ),
                "{json} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"reconstruction": {{"skip_fit": true}}}}"#).unwrap();
        file.flush().unwrap();
        let config = RunConfig::from_file(file.path()).unwrap();
        assert!(config.reconstruction.skip_fit);
    }
}
