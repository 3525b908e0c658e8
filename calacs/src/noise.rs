//! Gain and read noise per readout segment (`get_nsegn`).

use crate::detector::{Amp, Detector, NAMPS};
use crate::tables::CcdParams;

/// Per-segment gain and read noise laid out for pixel lookup by `ampx`/`ampy`.
///
/// Segments follow the region slots: 0 and 2 left of `ampx`, 1 and 3 right
/// of it (or everything, when `ampx` is 0). WFC only needs slots 0 and 1; a
/// single-amp HRC readout lives in slot 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentNoise {
    pub gain: [f32; NAMPS],
    pub readnoise: [f32; NAMPS],
}

impl Default for SegmentNoise {
    fn default() -> Self {
        Self {
            gain: [1.0; NAMPS],
            readnoise: [0.0; NAMPS],
        }
    }
}

impl SegmentNoise {
    pub fn for_chip(detector: Detector, chip: i32, params: &CcdParams) -> Self {
        let gain = &params.atodgain;
        let noise = &params.readnoise;
        let pick = |order: [Amp; NAMPS]| Self {
            gain: order.map(|amp| gain[amp.index()]),
            readnoise: order.map(|amp| noise[amp.index()]),
        };

        match detector {
            Detector::Wfc if chip == 2 => pick([Amp::C, Amp::D, Amp::C, Amp::D]),
            Detector::Wfc if chip == 1 => pick([Amp::A, Amp::B, Amp::A, Amp::B]),
            _ if params.ampx == 0 && params.ampy == 0 => {
                let mut segments = Self::default();
                if let Some(i) = gain.iter().position(|&g| g > 0.0) {
                    segments.gain[1] = gain[i];
                    segments.readnoise[1] = noise[i];
                }
                segments
            }
            // Diagonal readouts mirror the used amp into the empty slot on
            // its own side of the chip.
            _ if gain[Amp::A.index()] == 0.0 && gain[Amp::D.index()] == 0.0 => {
                pick([Amp::C, Amp::B, Amp::C, Amp::B])
            }
            _ if gain[Amp::B.index()] == 0.0 && gain[Amp::C.index()] == 0.0 => {
                pick([Amp::A, Amp::D, Amp::A, Amp::D])
            }
            _ => Self {
                gain: *gain,
                readnoise: *noise,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(gain: [f32; NAMPS], ampx: usize, ampy: usize) -> CcdParams {
        CcdParams {
            atodgain: gain,
            readnoise: gain.map(|g| g * 10.0),
            ccdbias: [0.0; NAMPS],
            ampx,
            ampy,
            atodsat: 65535,
            saturate: 80000.0,
            dummy: false,
        }
    }

    #[test]
    fn test_wfc_chips_use_their_own_amps() {
        let p = params([1.0, 2.0, 3.0, 4.0], 2048, 0);
        let chip2 = SegmentNoise::for_chip(Detector::Wfc, 2, &p);
        assert_eq!(chip2.gain, [3.0, 4.0, 3.0, 4.0]);
        assert_eq!(chip2.readnoise, [30.0, 40.0, 30.0, 40.0]);
        let chip1 = SegmentNoise::for_chip(Detector::Wfc, 1, &p);
        assert_eq!(chip1.gain, [1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn test_hrc_single_amp_goes_to_slot_one() {
        let p = params([0.0, 0.0, 4.0, 0.0], 0, 0);
        let segments = SegmentNoise::for_chip(Detector::Hrc, 1, &p);
        assert_eq!(segments.gain, [1.0, 4.0, 1.0, 1.0]);
        assert_eq!(segments.readnoise, [0.0, 40.0, 0.0, 0.0]);
    }

    #[test]
    fn test_hrc_diagonal_readouts() {
        let bc = SegmentNoise::for_chip(Detector::Hrc, 1, &params([0.0, 2.0, 3.0, 0.0], 512, 512));
        assert_eq!(bc.gain, [3.0, 2.0, 3.0, 2.0], "BC builds CBCB");
        let ad = SegmentNoise::for_chip(Detector::Hrc, 1, &params([1.0, 0.0, 0.0, 4.0], 512, 512));
        assert_eq!(ad.gain, [1.0, 4.0, 1.0, 4.0], "AD builds ADAD");
    }

    #[test]
    fn test_hrc_four_amps_pass_through() {
        let p = params([1.0, 2.0, 3.0, 4.0], 512, 512);
        let segments = SegmentNoise::for_chip(Detector::Hrc, 1, &p);
        assert_eq!(segments.gain, p.atodgain);
        assert_eq!(segments.readnoise, p.readnoise);
    }
}
