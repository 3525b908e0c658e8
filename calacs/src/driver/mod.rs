//! Chooses and runs the bias-level correction of one exposure
//! (`performBlevCorr`).
//!
//! | Detector | Epoch    | Readout                                     | Policy                        |
//! |----------|----------|---------------------------------------------|-------------------------------|
//! | HRC      | any      | any                                         | legacy per amp                |
//! | WFC      | pre-SM4  | any                                         | legacy per amp                |
//! | WFC      | post-SM4 | full frame, overscan on both chips          | [bias shift, cross talk,] destripe |
//! | WFC      | post-SM4 | full frame, overscan missing                | skip                          |
//! | WFC      | post-SM4 | supported subarray with virtual overscan    | bias shift                    |
//! | WFC      | post-SM4 | other subarray                              | legacy per amp                |
//!
//! Bias shift and cross talk need `DS_INT` readout at gain 2.


use std::path::Path;

use strum_macros::Display;

use crate::bias_shift::{check_full_frame, correct_full_frame, correct_subarray, subarray_amp};
use crate::blev::subtract_bias_level;
use crate::config::{CalacsConfig, DestripeTuning, PolicyParams};
use crate::cross_talk::correct_cross_talk;
use crate::destripe::{check_shapes, destripe, DestripeOutcome};
use crate::detector::{Amp, Detector, NAMPS};
use crate::error::{Error, Result};
use crate::image::{ExposureHeader, PixelImage};
use crate::noise::SegmentNoise;
use crate::overscan::OverscanRegions;
use crate::tables::{CcdParams, CcdTable, OscnTable};

const GAIN_TOLERANCE: f32 = 1e-5;

/// One imset of an exposure: a chip's pixels with its header.
#[derive(Debug, Clone)]
pub struct ChipExposure {
    pub header: ExposureHeader,
    pub image: PixelImage,
}

/// Reference tables named by `OSCNTAB` and `CCDTAB`.
#[derive(Debug, Clone, Default)]
pub struct CalibrationTables {
    pub oscn: OscnTable,
    pub ccd: CcdTable,
}

impl CalibrationTables {
    pub fn load(oscntab: impl AsRef<Path>, ccdtab: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            oscn: OscnTable::load(oscntab)?,
            ccd: CcdTable::load(ccdtab)?,
        })
    }
}

/// Bias correction chosen for an exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Policy {
    /// Overscan fit per amplifier (`doBlev`) on every chip.
    LegacyPerAmp,
    /// Full-frame WFC: optional bias shift and cross talk, then destriping.
    DestripeFull { bias_shift: bool },
    /// Single-amp WFC subarray with virtual overscan.
    BiasShiftSubarray { amp: Amp },
    /// Full-frame WFC without overscan; nothing can be done.
    Skip,
}

impl Policy {
    /// Decide from the primary header and the overscan resolved per chip.
    ///
    /// Fails only when a full-frame WFC policy gets a single chip.
    pub fn select(
        header: &ExposureHeader,
        overscan: &[OverscanRegions],
        params: &PolicyParams,
    ) -> Result<Self> {
        if header.detector != Detector::Wfc || header.expstart < params.sm4_mjd {
            return Ok(Policy::LegacyPerAmp);
        }

        let mode_matches = header.readout_mode.trim() == params.bias_shift_readout_mode
            && (header.ccdgain - params.bias_shift_gain).abs() <= GAIN_TOLERANCE;

        if !header.subarray {
            let [chip_a, chip_b, ..] = overscan else {
                return Err(Error::MissingChip {
                    needed: 2,
                    got: overscan.len(),
                });
            };
            return Ok(if chip_a.overscan && chip_b.overscan {
                Policy::DestripeFull {
                    bias_shift: mode_matches,
                }
            } else {
                Policy::Skip
            });
        }

        let supported = params
            .bias_shift_apertures
            .iter()
            .any(|name| name.eq_ignore_ascii_case(header.aperture.trim()));
        let virtual_overscan = overscan.first().is_some_and(|r| r.virtual_overscan);
        match subarray_amp(&header.aperture) {
            Some(amp) if supported && virtual_overscan && mode_matches => {
                Ok(Policy::BiasShiftSubarray { amp })
            }
            _ => Ok(Policy::LegacyPerAmp),
        }
    }
}

/// Calibration inputs and results of one chip.
#[derive(Debug, Clone, PartialEq)]
pub struct ChipReport {
    /// `CCDCHIP`
    pub chip: i32,
    pub regions: OverscanRegions,
    pub ccd: CcdParams,
    /// Gain and read noise per segment, for the error-array initialisation.
    pub noise: SegmentNoise,
    /// `MEANBLEV`, when the policy measures one for this chip.
    pub meanblev: Option<f64>,
}

/// What the bias-level step did to an exposure.
#[derive(Debug, Clone, PartialEq)]
pub struct BlevOutcome {
    pub policy: Policy,
    /// `BLEVCORR` ran; the overscan-trimmed image can be written.
    pub complete: bool,
    /// The bias came from overscan rather than the CCDTAB default.
    pub from_overscan: bool,
    pub driftcorr: bool,
    /// Total bias removed per amp, electrons. Bias shift and destripe add.
    pub blev: [f64; NAMPS],
    pub chips: Vec<ChipReport>,
    pub destripe: Option<DestripeOutcome>,
    /// `HISTORY` lines for the primary header.
    pub history: Vec<String>,
    /// Trailer-file messages, in emission order.
    pub trailer: Vec<String>,
}

impl BlevOutcome {
    fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.trailer.push(message);
    }
}

/// Subtract the bias level from every chip of one exposure.
///
/// The config, both tables and the shapes a correction needs are checked
/// before any pixel changes, so a hard failure leaves the images untouched.
/// Rewrites `sci` only.
pub fn perform_blev_corr(
    chips: &mut [ChipExposure],
    tables: &CalibrationTables,
    config: &CalacsConfig,
) -> Result<BlevOutcome> {
    config
        .validate()
        .map_err(|e| Error::InvalidConfig(format!("{e:#}")))?;
    let Some(primary) = chips.first() else {
        return Err(Error::MissingChip { needed: 1, got: 0 });
    };
    let header = primary.header.clone();

    let mut reports = Vec::with_capacity(chips.len());
    for chip in chips.iter() {
        chip.header.validate_binning()?;
        let (nx, ny) = chip.image.dimensions();
        let regions = OverscanRegions::resolve(&tables.oscn, &chip.header, nx, ny);
        let ccd = tables.ccd.select(&chip.header, nx)?;
        let noise = SegmentNoise::for_chip(chip.header.detector, chip.header.chip, &ccd);
        reports.push(ChipReport {
            chip: chip.header.chip,
            regions,
            ccd,
            noise,
            meanblev: None,
        });
    }

    let overscan: Vec<OverscanRegions> = reports.iter().map(|r| r.regions).collect();
    let policy = Policy::select(&header, &overscan, &config.policy)?;
    tracing::debug!(%policy, chips = chips.len(), "bias level policy");

    let mut outcome = BlevOutcome {
        policy,
        complete: false,
        from_overscan: false,
        driftcorr: false,
        blev: [0.0; NAMPS],
        chips: Vec::new(),
        destripe: None,
        history: Vec::new(),
        trailer: Vec::new(),
    };

    match policy {
        Policy::LegacyPerAmp => {
            if header.detector == Detector::Wfc
                && header.subarray
                && header.expstart >= config.policy.sm4_mjd
            {
                outcome.note(
                    "WFC readout is not a supported subarray or type/gain not set as needed for new bias level algorithm for subarray data.",
                );
                outcome.note("Data to be processed with original bias level algorithm.");
            }
            for (chip, report) in chips.iter_mut().zip(reports.iter_mut()) {
                let result = subtract_bias_level(
                    &mut chip.image,
                    &chip.header,
                    &report.regions,
                    &report.ccd,
                    &config.blev,
                )?;
                if !result.overscan {
                    outcome.note("Default bias level from CCDTAB was subtracted.");
                }
                for &(amp, level) in &result.amp_levels {
                    outcome.blev[amp.index()] = level;
                }
                outcome.from_overscan = result.overscan;
                outcome.driftcorr = result.driftcorr;
                report.meanblev = Some(result.meanblev);

                let summary = blev_summary(result.overscan, result.meanblev, &result.amp_levels);
                for line in summary {
                    outcome.note(line);
                }
            }
            outcome.complete = true;
        }

        Policy::DestripeFull { bias_shift } => {
            let (chip1, chip2) = chip_pair(chips)?;
            // All shape checks of the branch run before the first pixel changes.
            check_shapes(chip1, chip2, &config.destripe)?;
            if bias_shift {
                check_full_frame(chip1, chip2, &config.bias_shift)?;
            }

            if bias_shift {
                outcome.note("Performing bias-shift and cross talk corrections for full frame data.");
                let levels = correct_full_frame(chip1, chip2, &config.bias_shift)?;
                for (total, level) in outcome.blev.iter_mut().zip(levels) {
                    *total += level;
                }
                correct_cross_talk(chip1, &config.cross_talk);
                correct_cross_talk(chip2, &config.cross_talk);
            } else {
                outcome.note(
                    "WFC readout type/gain not set as needed, no bias shift nor cross talk correction done for full frame data.",
                );
            }

            outcome.note("Performing stripe removal and bias level subtraction for full frame data.");
            let result = destripe(chip1, chip2, &config.destripe)?;
            for (total, level) in outcome.blev.iter_mut().zip(result.bias) {
                *total += level;
            }
            for report in reports.iter_mut() {
                report.meanblev = match report.chip {
                    1 => Some(result.meanblev[0]),
                    2 => Some(result.meanblev[1]),
                    _ => None,
                };
            }
            outcome.from_overscan = true;
            outcome.complete = true;
            outcome.destripe = Some(result);
        }

        Policy::BiasShiftSubarray { amp } => {
            outcome.note("Performing bias-shift correction for subarray data.");
            let level = correct_subarray(&mut chips[0].image, amp, &config.bias_shift)?;
            outcome.blev[amp.index()] += level;
            outcome.from_overscan = reports[0].regions.overscan;
            outcome.complete = true;
        }

        Policy::Skip => {
            tracing::warn!(
                "Overscan missing, no destriping or bias level subtraction possible for full frame data."
            );
            outcome.trailer.push(
                "Overscan missing, no destriping or bias level subtraction possible for full frame data."
                    .to_string(),
            );
        }
    }

    if outcome.complete {
        outcome.history = blev_history(&outcome);
    }
    outcome.chips = reports;
    Ok(outcome)
}

/// Destripe a full-frame WFC exposure on its own (`doDestripe`).
pub fn do_destripe(
    chips: &mut [ChipExposure],
    tuning: &DestripeTuning,
) -> Result<DestripeOutcome> {
    let (chip1, chip2) = chip_pair(chips)?;
    destripe(chip1, chip2, tuning)
}

/// Chip 1 and chip 2 of a two-imset exposure, whatever their imset order.
fn chip_pair(chips: &mut [ChipExposure]) -> Result<(&mut PixelImage, &mut PixelImage)> {
    let got = chips.len();
    let [first, second, ..] = chips else {
        return Err(Error::MissingChip { needed: 2, got });
    };
    if first.header.chip == 1 {
        Ok((&mut first.image, &mut second.image))
    } else {
        Ok((&mut second.image, &mut first.image))
    }
}

/// Trailer lines after a legacy subtraction on one chip (`blevSubTrlMessage`).
fn blev_summary(overscan: bool, meanblev: f64, amp_levels: &[(Amp, f64)]) -> Vec<String> {
    let mut lines = Vec::new();
    if overscan {
        lines.push("Bias level from overscan has been subtracted;".to_string());
        lines.push(format!("     mean of bias levels subtracted was {meanblev:.6}."));
    }
    lines.extend(
        amp_levels
            .iter()
            .filter(|(_, level)| *level != 0.0)
            .map(|(amp, level)| format!("     bias level of {level:.6} was subtracted for AMP {amp}.")),
    );
    lines
}

fn blev_history(outcome: &BlevOutcome) -> Vec<String> {
    let mut history = vec![
        if outcome.from_overscan {
            "BLEVCORR complete; bias level from overscan was subtracted."
        } else {
            "BLEVCORR complete, but default bias level was subtracted."
        }
        .to_string(),
        if outcome.driftcorr {
            "BLEVCORR includes correction for drift along lines."
        } else {
            "BLEVCORR does not include correction for drift along lines."
        }
        .to_string(),
    ];
    if let Some(destripe) = &outcome.destripe {
        history.extend(destripe.history.iter().cloned());
    }
    history
}
