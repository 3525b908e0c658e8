//! Signal-dependent bias shift of post-SM4 WFC readouts (ACS ISR 2012-02).
//!
//! The external pre-amp is AC coupled, so the DC bias level seen by each
//! pixel follows the recent signal through a single-pole filter. The
//! filter runs over every pixel in readout order, including the virtual
//! pixels clocked during each parallel shift, which read the fat-zero level.

use common::Buffer2;

use crate::config::BiasShiftParams;
use crate::detector::{Amp, NAMPS};
use crate::error::{Error, Result};
use crate::geometry::{extract_amp_array, restore_amp_array};
use crate::image::PixelImage;

/// Amplifier named in a subarray aperture such as `WFC1A-2K`.
pub fn subarray_amp(aperture: &str) -> Option<Amp> {
    let rest = aperture.trim().to_ascii_uppercase();
    let rest = rest.strip_prefix("WFC")?;
    let mut chars = rest.chars();
    let chip = chars.next()?;
    let amp = Amp::from_letter(chars.next()?)?;
    (chip.to_digit(10) == Some(amp.wfc_chip() as u32)).then_some(amp)
}

/// Correct both chips of a full-frame exposure. Returns the bias level
/// removed from each amp, electrons.
pub fn correct_full_frame(
    chip1: &mut PixelImage,
    chip2: &mut PixelImage,
    params: &BiasShiftParams,
) -> Result<[f64; NAMPS]> {
    check_full_frame(chip1, chip2, params)?;
    let arr_cols = chip2.width() / 2;

    let mut levels = [0.0; NAMPS];
    for amp in Amp::ALL {
        let chip = if amp.wfc_chip() == 1 { &mut *chip1 } else { &mut *chip2 };
        let mut array = extract_amp_array(&chip.sci, amp, arr_cols);
        levels[amp.index()] = correct_amp(&mut array, amp, params);
        restore_amp_array(&mut chip.sci, amp, &array);
    }
    Ok(levels)
}

/// Correct a single-amp subarray read through `amp`. Returns the bias level
/// removed, electrons.
pub fn correct_subarray(
    image: &mut PixelImage,
    amp: Amp,
    params: &BiasShiftParams,
) -> Result<f64> {
    let (nx, ny) = image.dimensions();
    check_amp_shape(nx, ny, params)?;

    let mut array = extract_amp_array(&image.sci, amp, nx);
    let level = correct_amp(&mut array, amp, params);
    restore_amp_array(&mut image.sci, amp, &array);
    Ok(level)
}

/// Shape requirements of [`correct_full_frame`].
pub(crate) fn check_full_frame(
    chip1: &PixelImage,
    chip2: &PixelImage,
    params: &BiasShiftParams,
) -> Result<()> {
    if chip1.dimensions() != chip2.dimensions() {
        return Err(Error::DimensionMismatch {
            what: "chip 1 of bias shift pair",
            expected: chip2.dimensions(),
            actual: chip1.dimensions(),
        });
    }
    check_amp_shape(chip2.width() / 2, chip2.height(), params)
}

fn check_amp_shape(cols: usize, rows: usize, params: &BiasShiftParams) -> Result<()> {
    let min = (
        params.magic_square_cols[1] + 1,
        params.magic_square_rows_from_end[0],
    );
    if cols < min.0 || rows < min.1 {
        return Err(Error::DimensionMismatch {
            what: "bias shift amp array",
            expected: min,
            actual: (cols, rows),
        });
    }
    Ok(())
}

/// Mean of the fat-zero reference square near the end of readout.
fn magic_square_mean(array: &Buffer2<f64>, params: &BiasShiftParams) -> f64 {
    let rows = array.height();
    let [first, last] = params.magic_square_rows_from_end;
    let [c0, c1] = params.magic_square_cols;
    let mut sum = 0.0;
    let mut n = 0usize;
    for row in rows - first..=rows - last {
        for &value in &array.row(row)[c0..=c1] {
            sum += value;
            n += 1;
        }
    }
    sum / n as f64
}

/// Correct one amp-local array in place and remove its fat-zero level.
/// Returns the level removed.
fn correct_amp(array: &mut Buffer2<f64>, amp: Amp, params: &BiasShiftParams) -> f64 {
    let i = amp.index();
    let cols = array.width();
    let ngap = params.gap_pixels();
    let fat_zero = magic_square_mean(array, params);

    let factor = 1.0 - (-1.0 / (params.time_const[i] * params.serial_freq)).exp();
    let dc_ratio = params.dc_ratio[i];
    let dsi = params.dsi_sens[i];

    // DC level before the pixel being read.
    let mut dc = fat_zero * dc_ratio;
    for row in 0..array.height() {
        let data = array.row_mut(row);
        for k in 0..cols + ngap {
            let value = if k < cols { data[k] } else { fat_zero };
            let next = value * factor * dc_ratio + (1.0 - factor) * dc;
            if k < cols {
                data[k] = (value - dsi * next) - params.ac_coupling * (next - dc);
            }
            dc = next;
        }
    }

    let level = magic_square_mean(array, params);
    array.iter_mut().for_each(|v| *v -= level);
    tracing::info!(
        "Bias shift correcting for bias level in Amp {} of {:.4} electrons.",
        amp,
        level
    );
    level
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_close, constant_image, init_tracing};

    #[test]
    fn test_subarray_amp_from_aperture() {
        assert_eq!(subarray_amp("WFC1A-2K"), Some(Amp::A));
        assert_eq!(subarray_amp("WFC1B-512"), Some(Amp::B));
        assert_eq!(subarray_amp(" wfc2d-1k "), Some(Amp::D));
        assert_eq!(subarray_amp("WFC2A-2K"), None, "amp A does not read chip 2");
        assert_eq!(subarray_amp("WFC"), None);
        assert_eq!(subarray_amp("WFC1-IRAMPQ"), None);
        assert_eq!(subarray_amp("HRC"), None);
    }

    #[test]
    fn test_flat_field_reduces_to_zero() {
        init_tracing();
        let params = BiasShiftParams::default();
        let mut chip1 = constant_image(128, 40, 1000.0);
        let mut chip2 = constant_image(128, 40, 1000.0);

        let levels = correct_full_frame(&mut chip1, &mut chip2, &params).unwrap();

        for amp in Amp::ALL {
            let i = amp.index();
            // Steady state: the DC level is constant, only the DSI term remains.
            let expected = 1000.0 * (1.0 - params.dsi_sens[i] * params.dc_ratio[i]);
            assert_close(levels[i], expected, 1e-9, &format!("amp {amp} level"));
        }
        for chip in [&chip1, &chip2] {
            assert!(chip.sci.iter().all(|v| v.abs() < 1e-6), "flat field leaves no residual");
        }
    }

    #[test]
    fn test_correction_only_follows_the_signal() {
        let params = BiasShiftParams::default();
        let (cols, rows) = (64, 60);
        let flat = Buffer2::new_filled(cols, rows, 1000.0);
        let mut spiked = flat.clone();
        spiked[(30, 2)] = 50000.0;

        let mut flat_out = flat.clone();
        let mut spiked_out = spiked.clone();
        correct_amp(&mut flat_out, Amp::C, &params);
        correct_amp(&mut spiked_out, Amp::C, &params);

        let delta = |col: usize, row: usize| spiked_out[(col, row)] - flat_out[(col, row)];
        let before = delta(0, 0);
        for row in 0..=2 {
            let end = if row == 2 { 30 } else { cols };
            for col in 0..end {
                assert_close(delta(col, row), before, 1e-9, "pixels read before the spike");
            }
        }
        assert!(
            (delta(31, 2) - before).abs() > 1e-3,
            "pixel after the spike is corrected, delta {}",
            delta(31, 2) - before
        );
    }

    #[test]
    fn test_subarray_uses_whole_width() {
        let params = BiasShiftParams::default();
        let mut image = constant_image(40, 30, 500.0);
        let level = correct_subarray(&mut image, Amp::A, &params).unwrap();
        assert_close(
            level,
            500.0 * (1.0 - params.dsi_sens[0] * params.dc_ratio[0]),
            1e-9,
            "level",
        );
        assert!(image.sci.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_shape_errors() {
        let params = BiasShiftParams::default();
        let mut chip1 = constant_image(128, 40, 0.0);
        let mut chip2 = constant_image(130, 40, 0.0);
        assert!(matches!(
            correct_full_frame(&mut chip1, &mut chip2, &params),
            Err(Error::DimensionMismatch { .. })
        ));

        let mut tiny = constant_image(20, 8, 0.0);
        match correct_subarray(&mut tiny, Amp::C, &params) {
            Err(Error::DimensionMismatch { expected, actual, .. }) => {
                assert_eq!(expected, (23, 11));
                assert_eq!(actual, (20, 8));
            }
            other => panic!("expected DimensionMismatch, got {other:?}"),
        }
    }
}
