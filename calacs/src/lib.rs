//! calacs - bias level, overscan and stripe correction for ACS CCD exposures.
//!
//! Covers the `BLEVCORR` step of the ACS pipeline for WFC and HRC:
//! - Overscan bias fit per amplifier with optional drift correction
//! - Full-frame WFC destriping from the prescan columns
//! - Signal-dependent bias shift and amplifier cross talk
//! - The policy choosing between them per exposure
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use calacs::{perform_blev_corr, CalacsConfig, CalibrationTables, ChipExposure};
//!
//! let tables = CalibrationTables::load("oscntab.yaml", "ccdtab.yaml")?;
//! let config = CalacsConfig::default();
//! let mut chips: Vec<ChipExposure> = read_exposure("j8xi01010_raw")?;
//!
//! let outcome = perform_blev_corr(&mut chips, &tables, &config)?;
//! for line in &outcome.history {
//!     println!("HISTORY {line}");
//! }
//! ```

pub mod bias_shift;
pub mod blev;
pub mod config;
pub mod cross_talk;
pub mod destripe;
pub mod detector;
pub mod driver;
pub mod error;
pub mod geometry;
pub mod image;
pub mod noise;
pub mod overscan;
pub mod stats;
pub mod tables;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Entry points
// ============================================================================

pub use driver::{
    do_destripe, perform_blev_corr, BlevOutcome, CalibrationTables, ChipExposure, ChipReport,
    Policy,
};

// ============================================================================
// Data model
// ============================================================================

pub use config::CalacsConfig;
pub use detector::{Amp, AmpString, Detector, NAMPS};
pub use error::{Error, Result};
pub use image::{ExposureHeader, PixelImage};
pub use noise::SegmentNoise;
pub use overscan::OverscanRegions;
pub use tables::{CcdParams, CcdTable, OscnTable};
