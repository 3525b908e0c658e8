//! Hard failures of the bias-level step.
//!
//! Degenerate data (no overscan row, empty bias lines, singular fits) is not
//! an error; those paths fall back to table defaults and log a warning.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort calibration of one exposure.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read calibration table '{path}': {source}")]
    TableLoad {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed calibration table '{path}': {source}")]
    TableFormat {
        path: PathBuf,
        #[source]
        source: common::SerdeFormatError,
    },

    #[error(
        "Matching row not found in CCDTAB: CCDAMP {ccdamp}, CCDGAIN {ccdgain:.1}, CCDCHIP {chip}, CCDOFST {offsets:?}"
    )]
    CcdRowNotFound {
        ccdamp: String,
        ccdgain: f32,
        chip: i32,
        offsets: [i32; 4],
    },

    #[error("Bin size must be 1, 2, or 4, got ({binx}, {biny})")]
    InvalidBinning { binx: i32, biny: i32 },

    #[error("Invalid CCDAMP '{0}': expected one or more of A, B, C, D")]
    InvalidAmpString(String),

    #[error("Dimension mismatch for {what}: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Correction needs {needed} chip image(s), got {got}")]
    MissingChip { needed: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
