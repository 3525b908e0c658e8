//! Order statistics and sigma-clipped estimators shared by every correction.
//!
//! All routines work in `f64`; image pixels are widened on the way in.


/// Mean and spread of the values that survived clipping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipStats {
    pub mean: f64,
    pub stddev: f64,
    pub n_used: usize,
}

/// Exact median via full sort. `None` when there is no data.
///
/// Even-length input averages the two middle values. Reorders `values`.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some(0.5 * (values[mid - 1] + values[mid]))
    }
}

#[inline]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Mean and sample standard deviation (n - 1). Spread of one value is 0.
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    let mean = mean(values)?;
    if values.len() < 2 {
        return Some((mean, 0.0));
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some((mean, (ss / (values.len() - 1) as f64).sqrt()))
}

fn masked_mean_std(values: &[f64], keep: &[bool]) -> Option<ClipStats> {
    let n_used = keep.iter().filter(|&&k| k).count();
    if n_used == 0 {
        return None;
    }
    let kept = || values.iter().zip(keep).filter(|(_, k)| **k).map(|(&v, _)| v);
    let mean = kept().sum::<f64>() / n_used as f64;
    let stddev = if n_used > 1 {
        (kept().map(|v| (v - mean).powi(2)).sum::<f64>() / (n_used - 1) as f64).sqrt()
    } else {
        0.0
    };
    Some(ClipStats {
        mean,
        stddev,
        n_used,
    })
}

/// Iterative clip: start from the plain mean/std, then for `rounds` rounds keep
/// only values within `sigma_mult * stddev` of the current mean and recompute.
///
/// Returns the final statistics and the keep mask. A round that would keep
/// nothing ends clipping with the previous statistics. Empty input yields
/// zero statistics.
pub fn iterative_clip_mask(
    values: &[f64],
    sigma_mult: f64,
    rounds: usize,
) -> (ClipStats, Vec<bool>) {
    let mut keep = vec![true; values.len()];
    let Some(mut stats) = masked_mean_std(values, &keep) else {
        return (
            ClipStats {
                mean: 0.0,
                stddev: 0.0,
                n_used: 0,
            },
            keep,
        );
    };

    for _ in 0..rounds {
        let limit = sigma_mult * stats.stddev;
        let next: Vec<bool> = values.iter().map(|v| (v - stats.mean).abs() <= limit).collect();
        match masked_mean_std(values, &next) {
            Some(next_stats) => {
                let converged = next == keep;
                stats = next_stats;
                keep = next;
                if converged {
                    break;
                }
            }
            None => break,
        }
    }
    (stats, keep)
}

/// [`iterative_clip_mask`] without the mask.
pub fn iterative_clip(values: &[f64], sigma_mult: f64, rounds: usize) -> ClipStats {
    iterative_clip_mask(values, sigma_mult, rounds).0
}

/// Clipping on mean absolute deviation, for large bias-pixel populations.
///
/// Starts from the pixels flagged in `keep`. Each round rejects pixels whose
/// distance from the mean exceeds `sigma_mult` mean absolute deviations.
/// Rounds continue while no more than `min_rounds` have run, then up to
/// `max_rounds` for as long as the population keeps shrinking. The returned
/// spread is the sample standard deviation of the survivors; with no
/// survivors mean and spread are 0.
pub fn abs_deviation_clip(
    values: &[f64],
    keep: &mut [bool],
    sigma_mult: f64,
    min_rounds: usize,
    max_rounds: usize,
) -> ClipStats {
    debug_assert_eq!(values.len(), keep.len());

    let mut n_used = keep.iter().filter(|&&k| k).count();
    let mut rounds = 0;
    loop {
        let before = n_used;
        rounds += 1;

        let (mean, abs_dev) = if n_used == 0 {
            (0.0, 0.0)
        } else {
            let kept = || values.iter().zip(keep.iter()).filter(|(_, k)| **k);
            let mean = kept().map(|(v, _)| v).sum::<f64>() / n_used as f64;
            let dev = kept().map(|(v, _)| (v - mean).abs()).sum::<f64>() / n_used as f64;
            (mean, dev)
        };

        n_used = 0;
        for (v, k) in values.iter().zip(keep.iter_mut()) {
            if *k && (v - mean).abs() > sigma_mult * abs_dev {
                *k = false;
            } else if *k {
                n_used += 1;
            }
        }

        let keep_going = rounds <= min_rounds || (rounds <= max_rounds && n_used < before);
        if !keep_going {
            break;
        }
    }

    masked_mean_std(values, keep).unwrap_or(ClipStats {
        mean: 0.0,
        stddev: 0.0,
        n_used: 0,
    })
}
