//! Bias and stripe removal for post-SM4 full-frame WFC (`doDestripe`).
//!
//! The four amplifiers share row-correlated readout noise. Each amp is
//! viewed in its own orientation (readout corner at the origin, prescan
//! columns first), and the prescan columns of all four measure one stripe
//! value per row.


use common::Buffer2;

use crate::config::DestripeTuning;
use crate::detector::{Amp, NAMPS};
use crate::error::{Error, Result};
use crate::geometry::{extract_amp_array, restore_amp_array};
use crate::image::PixelImage;
use crate::stats;

/// What destriping removed.
#[derive(Debug, Clone, PartialEq)]
pub struct DestripeOutcome {
    /// Uniform bias subtracted per amp, electrons.
    pub bias: [f64; NAMPS],
    /// `MEANBLEV` of chip 1 (A, B) and chip 2 (C, D).
    pub meanblev: [f64; 2],
    pub rows_fixed: usize,
    pub rows_skipped: usize,
    pub history: Vec<String>,
}

/// Remove the bias level and row stripes from both chips of a full-frame
/// exposure. Rewrites `sci` of both chips.
pub fn destripe(
    chip1: &mut PixelImage,
    chip2: &mut PixelImage,
    tuning: &DestripeTuning,
) -> Result<DestripeOutcome> {
    check_shapes(chip1, chip2, tuning)?;

    let arr_cols = chip2.width() / 2;
    let mut arrays = Amp::ALL.map(|amp| {
        let chip = if amp.wfc_chip() == 1 { &*chip1 } else { &*chip2 };
        extract_amp_array(&chip.sci, amp, arr_cols)
    });

    for array in arrays.iter_mut() {
        let col_means = bias_col_means(array, tuning);
        for row in 0..array.height() {
            for (value, col_mean) in array.row_mut(row).iter_mut().zip(&col_means) {
                *value -= col_mean;
            }
        }
    }

    let mut good_rows = arrays.each_ref().map(|array| find_good_rows(array, tuning));

    let mut bias = [0.0; NAMPS];
    for amp in Amp::ALL {
        let i = amp.index();
        let stats = global_bias(&arrays[i], &good_rows[i], tuning);
        arrays[i].iter_mut().for_each(|v| *v -= stats.mean);
        tracing::info!(
            "     bias level of {:.6} electrons was subtracted for AMP {}.",
            stats.mean,
            amp
        );
        bias[i] = stats.mean;
    }

    let (rows_fixed, rows_skipped) = remove_stripes(&mut arrays, &mut good_rows, tuning);
    let history = vec![
        format!("DESTRIPE: number of rows fixed per amp: {rows_fixed}"),
        format!("DESTRIPE: number of rows skipped per amp: {rows_skipped}"),
    ];
    for line in &history {
        tracing::info!("{line}");
    }

    for amp in Amp::ALL {
        let chip = if amp.wfc_chip() == 1 { &mut *chip1 } else { &mut *chip2 };
        restore_amp_array(&mut chip.sci, amp, &arrays[amp.index()]);
    }

    Ok(DestripeOutcome {
        bias,
        meanblev: [(bias[0] + bias[1]) / 2.0, (bias[2] + bias[3]) / 2.0],
        rows_fixed,
        rows_skipped,
        history,
    })
}

pub(crate) fn check_shapes(
    chip1: &PixelImage,
    chip2: &PixelImage,
    tuning: &DestripeTuning,
) -> Result<()> {
    if chip1.dimensions() != chip2.dimensions() {
        return Err(Error::DimensionMismatch {
            what: "chip 1 of destripe pair",
            expected: chip2.dimensions(),
            actual: chip1.dimensions(),
        });
    }
    let min_cols = tuning.bias_cols.max(tuning.sentinel_cols[1]) + 1;
    let min_rows = tuning.virtual_rows + 2;
    let (nx, ny) = chip2.dimensions();
    if nx / 2 < min_cols || ny < min_rows {
        return Err(Error::DimensionMismatch {
            what: "destripe amp array",
            expected: (min_cols, min_rows),
            actual: (nx / 2, ny),
        });
    }
    Ok(())
}

fn sentinels_below(row: &[f64], tuning: &DestripeTuning, limit: f64) -> bool {
    row[tuning.sentinel_cols[0]..=tuning.sentinel_cols[1]]
        .iter()
        .all(|&v| v < limit)
}

#[inline]
fn row_mean(values: &[f64]) -> f64 {
    stats::mean(values).unwrap_or(0.0)
}

/// Clipped mean of every prescan column after removing each row's mean,
/// leaving out rows next to saturated pixels.
fn bias_col_means(array: &Buffer2<f64>, tuning: &DestripeTuning) -> Vec<f64> {
    let nbias = tuning.bias_cols;
    let usable_rows: Vec<usize> = (0..array.height())
        .filter(|&row| sentinels_below(array.row(row), tuning, tuning.col_stats_saturation))
        .collect();

    let minus_row_mean: Vec<Vec<f64>> = usable_rows
        .iter()
        .map(|&row| {
            let bias = &array.row(row)[..nbias];
            let mean = row_mean(&bias[tuning.row_reference_start..]);
            bias.iter().map(|v| v - mean).collect()
        })
        .collect();

    (0..nbias)
        .map(|col| {
            let column: Vec<f64> = minus_row_mean.iter().map(|row| row[col]).collect();
            stats::iterative_clip(&column, tuning.col_clip_sigma, tuning.col_clip_rounds).mean
        })
        .collect()
}

/// Rows usable for the bias and stripe estimates.
///
/// The first row is never used. A row is rejected when its science mean,
/// relative to the local prescan level, strays from the amp's overall mean,
/// or when the science pixels next to the prescan are saturated.
fn find_good_rows(array: &Buffer2<f64>, tuning: &DestripeTuning) -> Vec<bool> {
    let nbias = tuning.bias_cols;
    let (cols, rows) = (array.width(), array.height());
    let real_rows = rows - tuning.virtual_rows;

    let bias_mean = (0..real_rows)
        .map(|row| array.row(row)[..nbias].iter().sum::<f64>())
        .sum::<f64>()
        / (real_rows * nbias) as f64;
    let amp_mean = (0..real_rows)
        .map(|row| {
            array.row(row)[nbias..]
                .iter()
                .map(|v| v - bias_mean)
                .sum::<f64>()
        })
        .sum::<f64>()
        / ((cols - nbias) * real_rows) as f64;

    let mut good = vec![false; rows];
    for row in 1..rows {
        let current = array.row(row);
        let previous = array.row(row - 1);
        let row_ref = (current[..nbias].iter().sum::<f64>()
            + previous[..nbias].iter().sum::<f64>())
            / (2 * nbias) as f64;
        let science_mean = current[nbias..].iter().map(|v| v - row_ref).sum::<f64>()
            / (cols - nbias) as f64;

        good[row] = (science_mean - amp_mean).abs() <= tuning.row_deviation_limit
            && !current[tuning.sentinel_cols[0]..=tuning.sentinel_cols[1]]
                .iter()
                .any(|&v| v > tuning.good_row_saturation);
    }
    good
}

/// Clipped mean of the prescan pixels on good rows.
fn global_bias(
    array: &Buffer2<f64>,
    good_rows: &[bool],
    tuning: &DestripeTuning,
) -> stats::ClipStats {
    let nbias = tuning.bias_cols;
    let mut values = Vec::with_capacity(array.height() * nbias);
    let mut keep = Vec::with_capacity(array.height() * nbias);
    for (row, &good) in good_rows.iter().enumerate() {
        values.extend_from_slice(&array.row(row)[..nbias]);
        keep.extend(std::iter::repeat(good).take(nbias));
    }
    stats::abs_deviation_clip(
        &values,
        &mut keep,
        tuning.global_clip_sigma,
        tuning.global_min_rounds,
        tuning.global_max_rounds,
    )
}

/// Stripe value per row: mean prescan level over the amps that are good on
/// that row, zero where too few are.
///
/// Amps whose prescan scatter on a row reaches the limit are dropped from
/// that row. Returns the values with the fixed and skipped row counts.
fn stripe_profile(
    arrays: &[Buffer2<f64>; NAMPS],
    good_rows: &mut [Vec<bool>; NAMPS],
    tuning: &DestripeTuning,
) -> (Vec<f64>, usize, usize) {
    let nbias = tuning.bias_cols;
    let rows = arrays[0].height();
    let mut profile = vec![0.0; rows];
    let (mut fixed, mut skipped) = (0, 0);

    for (row, value) in profile.iter_mut().enumerate() {
        let mut sum = 0.0;
        let mut n_good = 0;
        for (array, good) in arrays.iter().zip(good_rows.iter_mut()) {
            let bias = &array.row(row)[..nbias];
            let (mean, std) = stats::mean_std(bias).unwrap_or((0.0, 0.0));
            if std >= tuning.row_std_limit {
                good[row] = false;
            }
            if good[row] {
                sum += mean;
                n_good += 1;
            }
        }

        if n_good >= tuning.min_good_amps {
            *value = sum / n_good as f64;
            fixed += 1;
        } else {
            skipped += 1;
        }
    }
    (profile, fixed, skipped)
}

/// Stripe value under pixel (`col`, `row`). Rows are read out while the
/// serial register clocks, so the sampled row position advances with column.
fn interpolate_stripe(
    profile: &[f64],
    col: usize,
    row: usize,
    cols: usize,
    tuning: &DestripeTuning,
) -> f64 {
    let skew = (col as f64 - tuning.skew_zero_col) / (cols as f64 + tuning.skew_extra_cols);
    let point = row as f64 + skew;
    let lower = (point.floor().max(0.0) as usize).min(profile.len() - 2);
    let dist = point - lower as f64;
    profile[lower] + dist * (profile[lower + 1] - profile[lower])
}

fn remove_stripes(
    arrays: &mut [Buffer2<f64>; NAMPS],
    good_rows: &mut [Vec<bool>; NAMPS],
    tuning: &DestripeTuning,
) -> (usize, usize) {
    let (profile, fixed, skipped) = stripe_profile(arrays, good_rows, tuning);
    let (cols, rows) = (arrays[0].width(), arrays[0].height());

    for row in 0..rows {
        for col in 0..cols {
            let stripe = interpolate_stripe(&profile, col, row, cols, tuning);
            for array in arrays.iter_mut() {
                array[(col, row)] -= stripe;
            }
        }
    }
    (fixed, skipped)
}
