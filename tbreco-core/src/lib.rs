//! tbreco-core: Core types and algorithms for test-beam hit reconstruction.
//!
//! This crate turns one channel's digitized waveform into a
//! [`ReconstructedHit`], applies per-channel calibration, and classifies
//! pulses with gain-dependent quality cuts. The pulse fitter and the channel
//! mapper are consumed through the [`PulseFitter`] and [`ChannelMapper`]
//! traits.
//!

pub mod builder;
pub mod calibration;
pub mod error;
pub mod fit;
pub mod hit;
pub mod mapping;
pub mod quality;
pub mod sample;
pub mod status;

pub use builder::{significance, HitBuilder, ReconstructionConfig, SIGNIFICANCE_EPSILON};
pub use calibration::{calibrate, calibrate_all, CalibrationTable};
pub use error::{Error, Result};
pub use fit::{PulseFit, PulseFitter};
pub use hit::{CalibrationState, HitRecord, ReconstructedHit};
pub use mapping::ChannelMapper;
pub use quality::{parse_vga, GainLevel, GainSetting, QualityCut, QualityCuts};
pub use sample::{RawChannelSample, Timestamp, N_CHANNELS, N_SAMPLES};
pub use status::HitStatus;
