//! Gain-dependent pulse quality cuts.
//!
//! The amplifier chain has three stages: a programmable gain amplifier (PGA),
//! a low-noise amplifier (LNA) and a variable gain amplifier (VGA). Cuts on
//! the fitted amplitude and chi2/ndof are only defined for some combinations;
//! every other combination passes.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::builder::HitBuilder;
use crate::error::Error;
use crate::fit::PulseFitter;
use crate::sample::RawChannelSample;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Significance threshold used when re-deriving a hit for classification.
pub const CLASSIFY_ZS_THRESHOLD: f64 = 30.0;

/// Amplitude assumed for a zero-suppressed pulse.
pub const SUPPRESSED_AMPLITUDE: f64 = 9999.0;
/// Chi2 assumed for a zero-suppressed pulse.
pub const SUPPRESSED_CHI2: f64 = 99999.0;
/// Ndof assumed for a zero-suppressed pulse.
pub const SUPPRESSED_NDOF: u32 = 1;

/// Gain level of the PGA or LNA stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum GainLevel {
    Low,
    Mid,
    High,
    VHigh,
}

impl GainLevel {
    /// Lower-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
            Self::VHigh => "vhigh",
        }
    }
}

impl fmt::Display for GainLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GainLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "mid" => Ok(Self::Mid),
            "high" => Ok(Self::High),
            "vhigh" => Ok(Self::VHigh),
            _ => Err(Error::UnknownGainLevel(s.to_string())),
        }
    }
}

/// Gain settings active when an event was recorded.
///
/// `vga` is the VGA register value; it is conventionally written in
/// hexadecimal, so the setting labelled "300" is `0x300`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GainSetting {
    pub pga: GainLevel,
    pub lna: GainLevel,
    pub vga: u16,
}

impl GainSetting {
    #[must_use]
    pub fn new(pga: GainLevel, lna: GainLevel, vga: u16) -> Self {
        Self { pga, lna, vga }
    }
}

impl fmt::Display for GainSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{:x}", self.pga, self.lna, self.vga)
    }
}

/// Parses a VGA value written in hexadecimal, with or without `0x`.
///
/// # Errors
/// Returns [`Error::ConfigError`] if `s` is not a hexadecimal `u16`.
pub fn parse_vga(s: &str) -> Result<u16, Error> {
    let digits = s
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u16::from_str_radix(digits, 16)
        .map_err(|e| Error::ConfigError(format!("invalid VGA setting '{s}': {e}")))
}

/// Upper bounds a good pulse must stay strictly below.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QualityCut {
    pub max_amplitude: f64,
    pub max_chi2_per_ndof: f64,
}

impl QualityCut {
    #[must_use]
    pub fn new(max_amplitude: f64, max_chi2_per_ndof: f64) -> Self {
        Self {
            max_amplitude,
            max_chi2_per_ndof,
        }
    }

    /// Returns true if both quantities are strictly below the cut.
    #[inline]
    #[must_use]
    pub fn passes(&self, amplitude: f64, chi2_per_ndof: f64) -> bool {
        amplitude < self.max_amplitude && chi2_per_ndof < self.max_chi2_per_ndof
    }
}

/// Cut table keyed by gain setting.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityCuts {
    cuts: HashMap<GainSetting, QualityCut>,
}

impl Default for QualityCuts {
    fn default() -> Self {
        Self::standard()
    }
}

impl QualityCuts {
    /// Table with no entries; every pulse passes.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            cuts: HashMap::new(),
        }
    }

    /// Cuts tuned on the 2014 test-beam gain scans.
    #[must_use]
    pub fn standard() -> Self {
        use GainLevel::{High, Low, Mid};
        let entries = [
            (Low, Low, 0x100, 300.0, 80.0),
            (Low, Low, 0x200, 9999.0, 9999.0),
            (Low, Low, 0x300, 650.0, 200.0),
            (Low, High, 0x100, 300.0, 300.0),
            (Low, High, 0x200, 9999.0, 9999.0),
            (Low, High, 0x300, 500.0, 500.0),
            (Mid, Low, 0x100, 500.0, 80.0),
            (Mid, Low, 0x200, 9999.0, 9999.0),
            (Mid, Low, 0x300, 800.0, 200.0),
            (Mid, Low, 0x500, 1700.0, 200.0),
            (Mid, High, 0x100, 450.0, 300.0),
            (Mid, High, 0x200, 700.0, 80.0),
            (Mid, High, 0x300, 1200.0, 2000.0),
            (Mid, High, 0x500, 1800.0, 2000.0),
        ];
        entries
            .into_iter()
            .map(|(pga, lna, vga, amp, chi2)| {
                (GainSetting::new(pga, lna, vga), QualityCut::new(amp, chi2))
            })
            .collect()
    }

    /// Adds or replaces the cut for a gain setting.
    pub fn insert(&mut self, setting: GainSetting, cut: QualityCut) {
        self.cuts.insert(setting, cut);
    }

    /// Cut for a gain setting, if one is defined.
    #[must_use]
    pub fn get(&self, setting: &GainSetting) -> Option<&QualityCut> {
        self.cuts.get(setting)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cuts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    /// Entries sorted by gain setting.
    #[must_use]
    pub fn entries(&self) -> Vec<(GainSetting, QualityCut)> {
        let mut entries: Vec<_> = self.cuts.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by_key(|(k, _)| (k.pga, k.lna, k.vga));
        entries
    }

    /// Verdict for fitted quantities. Settings without a cut pass.
    #[must_use]
    pub fn passes(&self, setting: &GainSetting, amplitude: f64, chi2: f64, ndof: u32) -> bool {
        let chi2_per_ndof = if ndof == 0 {
            f64::INFINITY
        } else {
            chi2 / f64::from(ndof)
        };
        self.get(setting)
            .map_or(true, |cut| cut.passes(amplitude, chi2_per_ndof))
    }

    /// Re-derives a hit from `sample` at 30 sigma and classifies it.
    ///
    /// A zero-suppressed pulse is judged with the suppressed sentinels
    /// (amplitude 9999, chi2 99999, ndof 1), not skipped.
    #[must_use]
    pub fn is_good_pulse<F: PulseFitter>(
        &self,
        builder: &HitBuilder<F>,
        sample: &RawChannelSample,
        setting: &GainSetting,
    ) -> bool {
        if self.get(setting).is_none() {
            return true;
        }
        let hit = builder.build(Some(sample), CLASSIFY_ZS_THRESHOLD, false);
        if hit.status().is_zero_suppressed() {
            self.passes(
                setting,
                SUPPRESSED_AMPLITUDE,
                SUPPRESSED_CHI2,
                SUPPRESSED_NDOF,
            )
        } else {
            self.passes(setting, hit.amplitude(), hit.chi2(), hit.ndof())
        }
    }
}

impl FromIterator<(GainSetting, QualityCut)> for QualityCuts {
    fn from_iter<I: IntoIterator<Item = (GainSetting, QualityCut)>>(iter: I) -> Self {
        Self {
            cuts: iter.into_iter().collect(),
        }
    }
}
