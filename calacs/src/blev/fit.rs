//! Per-line bias estimates and the straight-line fit through them.

/// Least-squares line through (row, bias) points.
///
/// Rows are recentred on `center` while accumulating so large row numbers
/// don't cost precision.
#[derive(Debug, Clone)]
pub struct LineFitter {
    center: f64,
    n: f64,
    sum_x: f64,
    sum_y: f64,
    sum_xy: f64,
    sum_xx: f64,
}

/// Fitted bias as a function of detector row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
    center: f64,
}

impl LineFit {
    /// Fit that evaluates to `value` on every row.
    pub fn constant(value: f64) -> Self {
        Self {
            slope: 0.0,
            intercept: value,
            center: 0.0,
        }
    }

    #[inline]
    pub fn eval(&self, row: f64) -> f64 {
        self.intercept + self.slope * (row - self.center)
    }
}

impl LineFitter {
    pub fn new(center: f64) -> Self {
        Self {
            center,
            n: 0.0,
            sum_x: 0.0,
            sum_y: 0.0,
            sum_xy: 0.0,
            sum_xx: 0.0,
        }
    }

    pub fn accumulate(&mut self, row: f64, value: f64) {
        let x = row - self.center;
        self.n += 1.0;
        self.sum_x += x;
        self.sum_y += value;
        self.sum_xy += x * value;
        self.sum_xx += x * x;
    }

    /// `None` without points or when every point sits on the same row.
    pub fn fit(&self) -> Option<LineFit> {
        if self.n < 1.0 {
            return None;
        }
        let d = self.sum_xx - self.sum_x * self.sum_x / self.n;
        if d == 0.0 {
            return None;
        }
        let xmean = self.sum_x / self.n;
        let ymean = self.sum_y / self.n;
        let slope = (self.sum_xy - xmean * ymean * self.n) / d;
        Some(LineFit {
            slope,
            intercept: ymean - slope * xmean,
            center: self.center,
        })
    }
}

/// Reject per-line bias values that sit high: cosmic rays and bleeding from
/// bright sources only ever push the overscan up.
///
/// The first pass clips at `clip` times the scatter of the values, capped at
/// the Poisson width of their mean. The second clips at `clip` times the read
/// noise around the mean of the survivors. Returns the number rejected.
pub fn clean_bias_fit(values: &[f64], keep: &mut [bool], readnoise: f64, clip: f64) -> usize {
    debug_assert_eq!(values.len(), keep.len());

    let kept_mean = |keep: &[bool]| {
        let (sum, n) = values
            .iter()
            .zip(keep)
            .filter(|(_, k)| **k)
            .fold((0.0, 0usize), |(sum, n), (v, _)| (sum + v, n + 1));
        (n > 0).then(|| sum / n as f64)
    };

    let Some(mean) = kept_mean(keep) else {
        return 0;
    };
    let n = keep.iter().filter(|&&k| k).count();
    let mut sdev = if n > 1 {
        let ss: f64 = values
            .iter()
            .zip(keep.iter())
            .filter(|(_, k)| **k)
            .map(|(v, _)| (v - mean).powi(2))
            .sum();
        (ss / (n - 1) as f64).sqrt()
    } else {
        0.0
    };
    if mean > 0.0 {
        sdev = sdev.min(mean.sqrt());
    }

    let mut rejected = reject_above(values, keep, (clip * sdev + mean).abs());
    if let Some(mean) = kept_mean(keep) {
        rejected += reject_above(values, keep, (clip * readnoise + mean).abs());
    }

    tracing::info!("(blevcorr) Rejected {} bias values from fit.", rejected);
    rejected
}

fn reject_above(values: &[f64], keep: &mut [bool], limit: f64) -> usize {
    let mut rejected = 0;
    for (v, k) in values.iter().zip(keep.iter_mut()) {
        if *k && *v > limit {
            *k = false;
            rejected += 1;
        }
    }
    rejected
}
