//! Bias drift along a line, from the virtual overscan (`BlevDrift`).

use crate::image::PixelImage;
use crate::stats;

/// Drift of the bias level with column, relative to the bias section.
///
/// Only the slope of the virtual overscan is kept. Its intercept is already
/// part of the per-line bias level, so the drift is zero at the column where
/// that level was measured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftFit {
    pub slope: f64,
    pub zero_column: f64,
}

impl DriftFit {
    /// No drift.
    pub fn flat(zero_column: f64) -> Self {
        Self {
            slope: 0.0,
            zero_column,
        }
    }

    #[inline]
    pub fn eval(&self, column: f64) -> f64 {
        (column - self.zero_column) * self.slope
    }

    /// Drift averaged over a line of `width` columns. Linear, so this is the
    /// value at the middle column.
    pub fn mean(&self, width: f64) -> f64 {
        self.eval(width / 2.0)
    }
}

/// Sums of one unweighted line fit. Built fresh for every amplifier.
struct DriftAccumulator {
    middle_col: i64,
    n: f64,
    sum_x: f64,
    sum_y: f64,
    sum_xy: f64,
    sum_xx: f64,
}

impl DriftAccumulator {
    fn new(middle_col: i64) -> Self {
        Self {
            middle_col,
            n: 0.0,
            sum_x: 0.0,
            sum_y: 0.0,
            sum_xy: 0.0,
            sum_xx: 0.0,
        }
    }

    fn accumulate(&mut self, column: i64, value: f64) {
        let x = (column - self.middle_col) as f64;
        self.n += 1.0;
        self.sum_x += x;
        self.sum_y += value;
        self.sum_xy += x * value;
        self.sum_xx += x * x;
    }

    fn slope(&self) -> Option<f64> {
        if self.n < 1.0 {
            return None;
        }
        let d = self.sum_xx - self.sum_x * self.sum_x / self.n;
        if d == 0.0 {
            return None;
        }
        let xmean = self.sum_x / self.n;
        let ymean = self.sum_y / self.n;
        Some((self.sum_xy - xmean * ymean * self.n) / d)
    }
}

/// Fit the virtual overscan (inclusive ranges `vx` × `vy`) against column.
///
/// Each column contributes the median of its unflagged pixels. Returns the
/// fit and whether a drift correction could be determined; an empty window
/// or a singular fit gives a flat fit.
pub fn fit_drift(
    image: &PixelImage,
    vx: [i32; 2],
    vy: [i32; 2],
    bias_section: [usize; 2],
    sdqflags: u16,
) -> (DriftFit, bool) {
    let zero_column = (bias_section[0] + bias_section[1]) as f64 / 2.0;

    if vx[1] <= vx[0] || vy[1] <= vy[0] {
        tracing::info!("(blevcorr) No virtual overscan region; No correction for slope will be applied.");
        return (DriftFit::flat(zero_column), false);
    }

    let (nx, ny) = image.dimensions();
    let columns = vx[0].max(0) as usize..=(vx[1].max(0) as usize).min(nx.saturating_sub(1));
    let rows = vy[0].max(0) as usize..=(vy[1].max(0) as usize).min(ny.saturating_sub(1));

    let mut acc = DriftAccumulator::new(((vx[0] + vx[1]) / 2) as i64);
    let mut scratch = Vec::with_capacity(rows.clone().count());
    for x in columns {
        scratch.clear();
        scratch.extend(
            rows.clone()
                .filter(|&y| image.is_good(x, y, sdqflags))
                .map(|y| image.sci[(x, y)] as f64),
        );
        if let Some(value) = stats::median(&mut scratch) {
            acc.accumulate(x as i64, value);
        }
    }

    match acc.slope() {
        Some(slope) => (DriftFit { slope, zero_column }, true),
        None => {
            tracing::warn!(
                "(blevcorr) Singular fit to virtual overscan; No correction for slope will be applied."
            );
            (DriftFit::flat(zero_column), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::constant_image;

    fn ramp_image(nx: usize, ny: usize, slope: f64) -> PixelImage {
        let mut image = constant_image(nx, ny, 0.0);
        for y in 0..ny {
            for x in 0..nx {
                image.sci[(x, y)] = (10.0 + slope * x as f64) as f32;
            }
        }
        image
    }

    #[test]
    fn test_drift_recovers_slope() {
        let image = ramp_image(64, 40, 0.05);
        let (fit, applied) = fit_drift(&image, [8, 55], [30, 39], [2, 5], u16::MAX);
        assert!(applied);
        assert!((fit.slope - 0.05).abs() < 1e-5, "slope {}", fit.slope);
        assert_eq!(fit.zero_column, 3.5);
    }

    #[test]
    fn test_drift_is_zero_at_bias_section_midpoint() {
        for (slope, section) in [(0.05, [2, 5]), (-1.5, [60, 63]), (3.0, [0, 0])] {
            let image = ramp_image(64, 20, slope);
            let (fit, applied) = fit_drift(&image, [4, 59], [10, 19], section, u16::MAX);
            assert!(applied);
            let mid = (section[0] + section[1]) as f64 / 2.0;
            assert_eq!(fit.eval(mid), 0.0, "slope {slope}, section {section:?}");
        }
    }

    #[test]
    fn test_flagged_pixels_are_ignored() {
        let mut image = ramp_image(32, 10, 0.25);
        for y in 5..10 {
            image.sci[(12, y)] = 1e6;
            image.dq[(12, y)] = 4;
        }
        let (fit, applied) = fit_drift(&image, [4, 27], [5, 9], [0, 1], 4);
        assert!(applied);
        assert!((fit.slope - 0.25).abs() < 1e-5, "slope {}", fit.slope);
    }

    #[test]
    fn test_empty_or_singular_window_gives_flat_fit() {
        let image = ramp_image(16, 8, 1.0);
        let (fit, applied) = fit_drift(&image, [0, 0], [0, 0], [2, 4], u16::MAX);
        assert!(!applied);
        assert_eq!(fit.slope, 0.0);

        let mut flagged = image.clone();
        flagged.dq.fill(1);
        let (fit, applied) = fit_drift(&flagged, [1, 14], [2, 6], [2, 4], 1);
        assert!(!applied, "no unflagged pixel in the window");
        assert_eq!(fit.eval(100.0), 0.0);
    }
}
