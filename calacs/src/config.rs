//! Tuning constants of the bias-level step.
//!
//! Every value defaults to what the pipeline was validated with. Each clip
//! site keeps its own multiplier and round count.

use std::path::Path;

use anyhow::{ensure, Context};
use common::FileFormat;
use serde::{Deserialize, Serialize};

use crate::detector::NAMPS;

/// Per-line bias estimation of the legacy path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlevTuning {
    /// Rejection multiplier for per-line bias values.
    pub line_clip_sigma: f64,
}

impl Default for BlevTuning {
    fn default() -> Self {
        Self {
            line_clip_sigma: 3.0,
        }
    }
}

/// Full-frame WFC destriping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestripeTuning {
    /// Prescan columns at the start of each amp-local row.
    pub bias_cols: usize,
    /// Virtual overscan rows at the end of each amp-local column, left out of
    /// the amp means.
    pub virtual_rows: usize,
    /// First bias column of the per-row reference mean.
    pub row_reference_start: usize,
    pub col_clip_sigma: f64,
    pub col_clip_rounds: usize,
    pub global_clip_sigma: f64,
    pub global_min_rounds: usize,
    pub global_max_rounds: usize,
    /// A row's bias columns with at least this spread are unusable.
    pub row_std_limit: f64,
    /// Rows whose science mean departs this far from the amp mean are unusable.
    pub row_deviation_limit: f64,
    /// Science columns next to the prescan checked for saturation, inclusive.
    pub sentinel_cols: [usize; 2],
    /// Saturation level excluding a row from the bias column statistics.
    pub col_stats_saturation: f64,
    /// Saturation level excluding a row from the good rows.
    pub good_row_saturation: f64,
    /// Row stripes need this many good amps to be measured.
    pub min_good_amps: usize,
    /// Column of the interpolation zero point.
    pub skew_zero_col: f64,
    /// Extra serial pixels per row in the row/column timing skew.
    pub skew_extra_cols: f64,
}

impl Default for DestripeTuning {
    fn default() -> Self {
        Self {
            bias_cols: 24,
            virtual_rows: 20,
            row_reference_start: 12,
            col_clip_sigma: 5.0,
            col_clip_rounds: 4,
            global_clip_sigma: 6.0,
            global_min_rounds: 5,
            global_max_rounds: 10,
            row_std_limit: 15.0,
            row_deviation_limit: 100.0,
            sentinel_cols: [24, 29],
            col_stats_saturation: 50000.0,
            good_row_saturation: 70000.0,
            min_good_amps: 2,
            skew_zero_col: 11.5,
            skew_extra_cols: 146.0,
        }
    }
}

/// Readout-electronics model of the bias shift (ACS ISR 2012-02).
///
/// Per-amp arrays are in A, B, C, D order and are empirical calibration
/// data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasShiftParams {
    /// Serial pixel frequency, pixels per microsecond.
    pub serial_freq: f64,
    /// Parallel shift time, microseconds.
    pub parallel_shift: f64,
    /// Time constant of the pre-amp AC high-pass filter, microseconds.
    pub time_const: [f64; NAMPS],
    /// DC offset shift per unit pixel signal.
    pub dc_ratio: [f64; NAMPS],
    /// DSI sensitivity.
    pub dsi_sens: [f64; NAMPS],
    /// Scale of the AC-coupling differentiation term.
    pub ac_coupling: f64,
    /// Fat-zero reference rows, counted back from the last amp-local row:
    /// rows `ny - first ..= ny - last`.
    pub magic_square_rows_from_end: [usize; 2],
    /// Fat-zero reference columns, inclusive.
    pub magic_square_cols: [usize; 2],
}

impl Default for BiasShiftParams {
    fn default() -> Self {
        Self {
            serial_freq: 1000.0 / 22.0,
            parallel_shift: 3.212,
            time_const: [37.290251, 36.180001, 37.867770, 42.461249],
            dc_ratio: [0.3; NAMPS],
            dsi_sens: [2.9188919e-3, 10.805754e-3, 12.432145e-3, 3.8596253e-3],
            ac_coupling: 10.0 / 22.0,
            magic_square_rows_from_end: [11, 2],
            magic_square_cols: [13, 22],
        }
    }
}

impl BiasShiftParams {
    /// Virtual pixels clocked at the end of each row during the parallel shift.
    pub fn gap_pixels(&self) -> usize {
        (self.serial_freq * self.parallel_shift + 0.5) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossTalkParams {
    /// Fraction of the mirrored pixel that leaks into a pixel. Negative: the
    /// leak is an undershoot, so removing it raises the pixel.
    pub coefficient: f64,
}

impl Default for CrossTalkParams {
    fn default() -> Self {
        Self {
            coefficient: -9.1e-5,
        }
    }
}

/// Inputs of the correction policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyParams {
    /// Start of Servicing Mission 4 operations, MJD.
    pub sm4_mjd: f64,
    /// Subarrays with virtual overscan that get the bias-shift correction.
    pub bias_shift_apertures: Vec<String>,
    /// `JWROTYPE` needed for bias-shift and cross-talk corrections.
    pub bias_shift_readout_mode: String,
    pub bias_shift_gain: f32,
}

impl Default for PolicyParams {
    fn default() -> Self {
        Self {
            sm4_mjd: 54967.0,
            bias_shift_apertures: ["WFC1A-2K", "WFC1B-2K", "WFC2C-2K", "WFC2D-2K"]
                .map(String::from)
                .to_vec(),
            bias_shift_readout_mode: "DS_INT".to_string(),
            bias_shift_gain: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalacsConfig {
    pub blev: BlevTuning,
    pub destripe: DestripeTuning,
    pub bias_shift: BiasShiftParams,
    pub cross_talk: CrossTalkParams,
    pub policy: PolicyParams,
}

impl CalacsConfig {
    /// Read a YAML or JSON config; missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = common::deserialize_for_path(&bytes, path)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let format = FileFormat::from_path(path)?;
        let text = common::serialize(self, format)?;
        std::fs::write(path, text).with_context(|| format!("writing config {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let d = &self.destripe;
        ensure!(self.blev.line_clip_sigma > 0.0, "blev.line_clip_sigma must be positive");
        ensure!(d.bias_cols >= 2, "destripe.bias_cols must be at least 2");
        ensure!(
            d.row_reference_start < d.bias_cols,
            "destripe.row_reference_start must be a bias column"
        );
        ensure!(
            d.sentinel_cols[0] <= d.sentinel_cols[1],
            "destripe.sentinel_cols must be ordered"
        );
        ensure!(
            d.global_min_rounds <= d.global_max_rounds,
            "destripe.global_min_rounds must not exceed global_max_rounds"
        );
        ensure!(d.min_good_amps >= 1, "destripe.min_good_amps must be at least 1");
        let b = &self.bias_shift;
        ensure!(
            b.serial_freq > 0.0 && b.time_const.iter().all(|&t| t > 0.0),
            "bias_shift timing constants must be positive"
        );
        ensure!(
            b.magic_square_rows_from_end[0] >= b.magic_square_rows_from_end[1]
                && b.magic_square_rows_from_end[1] >= 1,
            "bias_shift.magic_square_rows_from_end must be ordered and inside the array"
        );
        ensure!(
            b.magic_square_cols[0] <= b.magic_square_cols[1],
            "bias_shift.magic_square_cols must be ordered"
        );
        Ok(())
    }
}
