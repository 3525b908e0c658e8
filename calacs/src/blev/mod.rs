//! Legacy bias level subtraction from the physical overscan (`doBlev`).
//!
//! Each amplifier's bias is measured line by line in its overscan columns,
//! cleaned of high outliers and fit with a straight line in row. When the
//! exposure has virtual overscan rows, a drift along the line is fit there
//! and subtracted as well.

mod drift;
mod fit;

use std::ops::RangeInclusive;

pub use drift::{fit_drift, DriftFit};
pub use fit::{clean_bias_fit, LineFit, LineFitter};

use crate::config::BlevTuning;
use crate::detector::Amp;
use crate::error::Result;
use crate::geometry::{AmpLayout, AmplifierRegion};
use crate::image::{ExposureHeader, PixelImage};
use crate::overscan::OverscanRegions;
use crate::stats;
use crate::tables::CcdParams;

/// Bias removed from one chip.
#[derive(Debug, Clone, PartialEq)]
pub struct ChipBlev {
    /// Mean bias subtracted per amplifier, electrons.
    pub amp_levels: Vec<(Amp, f64)>,
    /// Mean over the chip's amplifiers (`MEANBLEV`).
    pub meanblev: f64,
    /// The bias came from overscan rather than CCDTAB.
    pub overscan: bool,
    pub driftcorr: bool,
}

/// Overscan columns measured for one amplifier, clamped to the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiasSections {
    pub primary: Option<RangeInclusive<usize>>,
    pub secondary: Option<RangeInclusive<usize>>,
}

impl BiasSections {
    /// With both sections present each amp uses the one on its own side, and
    /// a lone amp reading the whole line uses both. Otherwise whichever
    /// section exists is used.
    pub fn select(regions: &OverscanRegions, side_x: usize, single_amp: bool, nx: usize) -> Self {
        let a = clamp_section(regions.biassecta, nx);
        let b = clamp_section(regions.biassectb, nx);
        match (a, b) {
            (Some(a), Some(b)) => {
                let (near, far) = if side_x == 0 { (a, b) } else { (b, a) };
                Self {
                    primary: Some(near),
                    secondary: single_amp.then_some(far),
                }
            }
            (a, b) => Self {
                primary: a.or(b),
                secondary: None,
            },
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = usize> {
        self.primary
            .clone()
            .into_iter()
            .chain(self.secondary.clone())
            .flatten()
    }

    /// Middle of the primary section; the drift is zero there.
    fn reference_bounds(&self) -> [usize; 2] {
        self.primary
            .as_ref()
            .map_or([0, 0], |range| [*range.start(), *range.end()])
    }
}

fn clamp_section(section: [i32; 2], nx: usize) -> Option<RangeInclusive<usize>> {
    if section[1] <= 0 || nx == 0 {
        return None;
    }
    let start = section[0].max(0) as usize;
    let end = (section[1] as usize).min(nx - 1);
    (start <= end).then_some(start..=end)
}

/// Median of the unflagged overscan pixels on `row` (`FindBlev`).
fn line_bias(
    image: &PixelImage,
    row: usize,
    sections: &BiasSections,
    sdqflags: u16,
    scratch: &mut Vec<f64>,
) -> Option<f64> {
    scratch.clear();
    scratch.extend(
        sections
            .columns()
            .filter(|&x| image.is_good(x, row, sdqflags))
            .map(|x| image.sci[(x, row)] as f64),
    );
    stats::median(scratch)
}

/// Per-line bias of the amplifier's rows, cleaned and fit against row.
/// Falls back to `default_bias` when nothing usable remains.
fn fit_to_overscan(
    image: &PixelImage,
    region: &AmplifierRegion,
    sections: &BiasSections,
    default_bias: f64,
    readnoise: f64,
    header: &ExposureHeader,
    tuning: &BlevTuning,
) -> LineFit {
    let nrows = region.height();
    let mut values = vec![0.0; nrows];
    let mut keep = vec![false; nrows];
    let mut scratch = Vec::new();
    let mut too_few = 0;

    for (i, row) in (region.ybeg..region.yend).enumerate() {
        match line_bias(image, row, sections, header.sdqflags, &mut scratch) {
            Some(bias) => {
                values[i] = bias;
                keep[i] = true;
            }
            None => too_few += 1,
        }
    }
    tracing::debug!(
        amp = %region.amp,
        primary = ?sections.primary,
        secondary = ?sections.secondary,
        "(FitToOverscan) bias sections"
    );

    clean_bias_fit(&values, &mut keep, readnoise, tuning.line_clip_sigma);

    let mut fitter = LineFitter::new(region.ybeg as f64 + nrows as f64 / 2.0);
    for (i, row) in (region.ybeg..region.yend).enumerate() {
        if keep[i] {
            fitter.accumulate(row as f64, values[i]);
        }
    }

    if too_few > 0 {
        let verb = if too_few == 1 { "line has" } else { "lines have" };
        tracing::warn!(
            "(blevcorr) {} image {} too few usable overscan pixels.",
            too_few,
            verb
        );
    }

    fitter.fit().unwrap_or_else(|| {
        tracing::warn!(
            "No bias level data, or singular fit; bias from CCDTAB of {} will be subtracted.",
            default_bias
        );
        LineFit::constant(default_bias)
    })
}

/// Subtract the bias level from every amplifier region of one chip.
///
/// Without overscan the CCDTAB default bias of the readout is subtracted
/// from the whole chip. Rewrites `sci` only.
pub fn subtract_bias_level(
    image: &mut PixelImage,
    header: &ExposureHeader,
    regions: &OverscanRegions,
    ccd: &CcdParams,
    tuning: &BlevTuning,
) -> Result<ChipBlev> {
    header.validate_binning()?;

    let slot = header.ccdamp.default_bias_slot(header.detector, header.chip);
    let default_bias = (ccd.ccdbias[slot] * ccd.atodgain[slot]) as f64;

    if !regions.overscan {
        tracing::warn!(
            "Overscan region is too small to do BLEVCORR; bias from CCDTAB of {} will be subtracted.",
            default_bias
        );
        let bias = default_bias as f32;
        image.sci.iter_mut().for_each(|v| *v -= bias);
        return Ok(ChipBlev {
            amp_levels: vec![(Amp::ALL[slot], default_bias)],
            meanblev: default_bias,
            overscan: false,
            driftcorr: false,
        });
    }

    let layout = AmpLayout::for_chip(
        header.detector,
        header.chip,
        &header.ccdamp,
        ccd.ampx,
        ccd.ampy,
    );
    let (nx, ny) = image.dimensions();
    let single_amp = layout.amps.len() == 1;

    let dodrift = regions.has_drift_window();
    if !dodrift {
        tracing::info!(
            "(blevcorr) No virtual overscan region specified. Bias drift correction will not be applied."
        );
    }

    let mut amp_levels = Vec::with_capacity(layout.amps.len());
    let mut driftcorr = false;
    for region in layout.regions(nx, ny, &regions.trim).into_iter().flatten() {
        let sections = BiasSections::select(regions, region.side_x, single_amp, nx);

        let (drift, averagedrift) = if dodrift {
            let (drift, applied) = fit_drift(
                image,
                regions.vx,
                regions.vy,
                sections.reference_bounds(),
                header.sdqflags,
            );
            driftcorr = applied;
            (Some(drift), drift.mean(region.width() as f64))
        } else {
            (None, 0.0)
        };

        let readnoise = ccd.readnoise[region.amp.index()] as f64;
        let fit = fit_to_overscan(
            image,
            &region,
            &sections,
            default_bias,
            readnoise,
            header,
            tuning,
        );

        let mut sumbias = 0.0;
        for y in region.ybeg..region.yend {
            let bias = fit.eval(y as f64);
            sumbias += bias + averagedrift;
            let row = image.sci.row_mut(y);
            for (x, pixel) in row
                .iter_mut()
                .enumerate()
                .take(region.xend)
                .skip(region.xbeg)
            {
                let deval = drift.map_or(0.0, |d| d.eval(x as f64));
                *pixel = (*pixel as f64 - bias - deval) as f32;
            }
        }
        let level = sumbias / region.height() as f64;
        tracing::debug!(amp = %region.amp, level, slope = fit.slope, "bias level fit");
        amp_levels.push((region.amp, level));
    }

    let meanblev = if amp_levels.is_empty() {
        tracing::warn!(chip = header.chip, "No amplifier of CCDAMP reads this chip.");
        0.0
    } else {
        amp_levels.iter().map(|(_, level)| level).sum::<f64>() / amp_levels.len() as f64
    };

    Ok(ChipBlev {
        amp_levels,
        meanblev,
        overscan: true,
        driftcorr,
    })
}
