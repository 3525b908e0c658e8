//! In-memory exposure data handed over by the I/O layer.

use common::Buffer2;
use serde::{Deserialize, Serialize};

use crate::detector::{AmpString, Detector, NAMPS};
use crate::error::{Error, Result};

/// Data-quality value of an unflagged pixel.
pub const GOOD_PIXEL: u16 = 0;

/// All 16 data-quality bits; the default "serious" mask.
pub const MAX_DQ: u16 = u16::MAX;

/// One chip of an exposure: science, error and data-quality planes.
///
/// All three planes share a shape. Corrections in this crate rewrite `sci`
/// only; `dq` is read to exclude flagged pixels and `err` is never touched.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelImage {
    pub sci: Buffer2<f32>,
    pub err: Buffer2<f32>,
    pub dq: Buffer2<u16>,
}

impl PixelImage {
    pub fn new(sci: Buffer2<f32>, err: Buffer2<f32>, dq: Buffer2<u16>) -> Result<Self> {
        for (what, width, height) in [
            ("err plane", err.width(), err.height()),
            ("dq plane", dq.width(), dq.height()),
        ] {
            if (width, height) != (sci.width(), sci.height()) {
                return Err(Error::DimensionMismatch {
                    what,
                    expected: (sci.width(), sci.height()),
                    actual: (width, height),
                });
            }
        }
        Ok(Self { sci, err, dq })
    }

    /// Science plane with zero error and no flags.
    pub fn from_sci(sci: Buffer2<f32>) -> Self {
        let (width, height) = (sci.width(), sci.height());
        Self {
            sci,
            err: Buffer2::new_default(width, height),
            dq: Buffer2::new_default(width, height),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.sci.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.sci.height()
    }

    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    /// A pixel is usable unless one of its flags is in `sdqflags`.
    #[inline]
    pub fn is_good(&self, x: usize, y: usize, sdqflags: u16) -> bool {
        let dq = self.dq[(x, y)];
        dq == GOOD_PIXEL || dq & sdqflags == 0
    }
}

/// Header keywords the bias-level step consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureHeader {
    pub detector: Detector,
    /// `CCDCHIP`
    pub chip: i32,
    /// `CCDAMP`
    pub ccdamp: AmpString,
    /// `CCDGAIN`
    pub ccdgain: f32,
    /// `CCDOFSTA..D`, commanded bias offsets.
    pub ccdofst: [i32; NAMPS],
    /// `BINAXIS1`, `BINAXIS2`
    pub bin: [i32; 2],
    /// `LTV1`, `LTV2`
    pub ltv: [f64; 2],
    /// `SUBARRAY`
    pub subarray: bool,
    /// `APERTURE`
    pub aperture: String,
    /// `EXPSTART`, MJD.
    pub expstart: f64,
    /// `JWROTYPE`, WFC readout electronics mode.
    pub readout_mode: String,
    /// Data-quality bits treated as serious.
    pub sdqflags: u16,
}

impl ExposureHeader {
    /// Leading overscan columns and rows included in a subarray.
    pub fn offsets(&self) -> (i32, i32) {
        (self.ltv[0] as i32, self.ltv[1] as i32)
    }

    pub fn bin_factors(&self) -> (i32, i32) {
        (self.bin[0], self.bin[1])
    }

    /// Fails unless both bin factors are 1, 2 or 4.
    pub fn validate_binning(&self) -> Result<()> {
        let valid = |b: i32| matches!(b, 1 | 2 | 4);
        let (binx, biny) = self.bin_factors();
        if valid(binx) && valid(biny) {
            Ok(())
        } else {
            Err(Error::InvalidBinning { binx, biny })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::wfc_header;

    #[test]
    fn test_new_rejects_mismatched_planes() {
        let sci = Buffer2::new_default(4, 3);
        let err = Buffer2::new_default(4, 3);
        let dq = Buffer2::new_default(3, 4);
        let result = PixelImage::new(sci, err, dq);
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch {
                what: "dq plane",
                ..
            })
        ));
    }

    #[test]
    fn test_is_good_honours_serious_flags() {
        let mut image = PixelImage::from_sci(Buffer2::new_filled(2, 1, 1.0));
        image.dq[(0, 0)] = 0b0100;
        image.dq[(1, 0)] = 0b1000;
        let sdqflags = 0b0100;
        assert!(!image.is_good(0, 0, sdqflags), "flag in mask excludes pixel");
        assert!(image.is_good(1, 0, sdqflags), "flag outside mask is ignored");
        assert!(!image.is_good(1, 0, MAX_DQ));
    }

    #[test]
    fn test_binning_validation() {
        let mut header = wfc_header(1);
        for bin in [[1, 1], [2, 4], [4, 4]] {
            header.bin = bin;
            assert!(header.validate_binning().is_ok(), "{bin:?} is valid");
        }
        header.bin = [3, 1];
        assert!(matches!(
            header.validate_binning(),
            Err(Error::InvalidBinning { binx: 3, biny: 1 })
        ));
    }

    #[test]
    fn test_offsets_follow_ltv() {
        let mut header = wfc_header(2);
        header.ltv = [24.0, 0.0];
        assert_eq!(header.offsets(), (24, 0));
    }
}
