//! tbreco-fit: Pulse fitting and event-level reconstruction.
//!
//! This crate provides:
//! - **`ShapeFitter`** - CR-RC^n pulse-shape fit (grid scan + linear solve)
//! - **Processing helpers** - parallel per-event hit building, calibration
//!   and quality classification
//!
#![warn(missing_docs)]

mod processing;
pub mod shape;

pub use processing::{
    calibrate_all_par, classify_event, reconstruct_event, ProcessedHit, ReconstructionPipeline,
    ReconstructionStatistics,
};
pub use shape::{pulse_shape, ShapeFitConfig, ShapeFitter};

// Re-export core reconstruction types
pub use tbreco_core::builder::{HitBuilder, ReconstructionConfig};
