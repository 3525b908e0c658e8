//! Fixtures shared by the unit tests: headers, table rows and synthetic chips.

#![allow(dead_code)]

use std::path::PathBuf;

use common::Buffer2;
use rand::prelude::*;

use crate::detector::{AmpString, Detector};
use crate::image::{ExposureHeader, PixelImage, MAX_DQ};
use crate::tables::{CcdRow, OscnRow, TableGain};

/// Initialize tracing for tests. Safe to call more than once.
pub fn init_tracing() {
    common::init_test_logging();
}

/// Per-process path in the temp dir so parallel test binaries don't collide.
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("calacs_test_{}_{name}", std::process::id()))
}

pub fn amps(s: &str) -> AmpString {
    s.parse().unwrap()
}

/// Post-SM4 full-frame WFC exposure read through all four amps, gain 2.
pub fn wfc_header(chip: i32) -> ExposureHeader {
    ExposureHeader {
        detector: Detector::Wfc,
        chip,
        ccdamp: amps("ABCD"),
        ccdgain: 2.0,
        ccdofst: [3, 3, 3, 3],
        bin: [1, 1],
        ltv: [0.0, 0.0],
        subarray: false,
        aperture: "WFC".to_string(),
        expstart: 55000.0,
        readout_mode: "DS_INT".to_string(),
        sdqflags: MAX_DQ,
    }
}

/// Single-amp HRC exposure.
pub fn hrc_header() -> ExposureHeader {
    ExposureHeader {
        detector: Detector::Hrc,
        chip: 1,
        ccdamp: amps("C"),
        ccdgain: 2.0,
        ccdofst: [3, 3, 3, 3],
        bin: [1, 1],
        ltv: [0.0, 0.0],
        subarray: false,
        aperture: "HRC".to_string(),
        expstart: 52500.0,
        readout_mode: String::new(),
        sdqflags: MAX_DQ,
    }
}

/// Full-frame WFC OSCNTAB row: 24 physical overscan columns per side and 20
/// virtual overscan rows at the top.
pub fn wfc_oscn_row(ccdamp: &str, chip: i32) -> OscnRow {
    OscnRow {
        ccdamp: amps(ccdamp),
        ccdchip: chip,
        binx: 1,
        biny: 1,
        nx: 4144,
        ny: 2068,
        trimx1: 24,
        trimx2: 24,
        trimy1: 0,
        trimy2: 20,
        vx1: 25,
        vx2: 4120,
        vy1: 2049,
        vy2: 2068,
        biassecta1: 19,
        biassecta2: 24,
        biassectb1: 4121,
        biassectb2: 4126,
    }
}

/// CCDTAB row matching [`wfc_header`].
pub fn wfc_ccd_row(chip: i32) -> CcdRow {
    CcdRow {
        ccdamp: amps("ABCD"),
        ccdchip: chip,
        ccdgain: TableGain::Float(2.0),
        binaxis1: 1,
        binaxis2: 1,
        ccdofst: [3, 3, 3, 3],
        ccdbias: [2100.0, 2200.0, 2300.0, 2400.0],
        atodgn: [2.0, 2.0, 2.0, 2.0],
        readnse: [4.0, 4.5, 5.0, 5.5],
        ampx: 2048,
        ampy: 0,
        atodsat: 65535,
        saturate: 84700.0,
        pedigree: Some("INFLIGHT 01/03/2002 01/03/2010".to_string()),
        descrip: None,
    }
}

/// CCDTAB row matching [`hrc_header`].
pub fn hrc_ccd_row() -> CcdRow {
    CcdRow {
        ccdamp: amps("C"),
        ccdchip: 1,
        ccdgain: TableGain::Int(2),
        ampx: 0,
        ampy: 0,
        ..wfc_ccd_row(1)
    }
}

pub fn constant_image(nx: usize, ny: usize, value: f32) -> PixelImage {
    PixelImage::from_sci(Buffer2::new_filled(nx, ny, value))
}

/// Standard normal sample via Box-Muller.
pub fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.random_range(f64::EPSILON..1.0);
    let u2: f64 = rng.random_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Image of `mean` plus Gaussian noise of `sigma`.
pub fn noisy_image(nx: usize, ny: usize, mean: f64, sigma: f64, seed: u64) -> PixelImage {
    let mut rng = StdRng::seed_from_u64(seed);
    PixelImage::from_sci(Buffer2::from_fn(nx, ny, |_, _| {
        (mean + sigma * gaussian(&mut rng)) as f32
    }))
}

pub fn assert_close(actual: f64, expected: f64, tolerance: f64, what: &str) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "{what}: expected {expected}, got {actual} (tolerance {tolerance})"
    );
}
