//! Amplifier regions of a chip and amp-local reflected views.
//!
//! Row 0 is the bottom of the array. On a four-amp layout A and B read the
//! bottom half and C and D the top half; A and C sit left of `ampx`.

use common::Buffer2;

use crate::detector::{Amp, AmpString, Detector, NAMPS};

/// Slot order of `bias_orderx` / `bias_ordery`: which side of `ampx`/`ampy`
/// each position of the chip's amp string lies on.
const BIAS_ORDER_X: [usize; NAMPS] = [0, 1, 0, 1];
const BIAS_ORDER_Y: [usize; NAMPS] = [0, 0, 1, 1];

/// Pixels discarded from each image edge after overscan use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Trim {
    pub x: [usize; 2],
    pub y: [usize; 2],
}

/// Half-open rectangle `[xbeg, xend) × [ybeg, yend)` read out by one amplifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmplifierRegion {
    pub amp: Amp,
    pub xbeg: usize,
    pub xend: usize,
    pub ybeg: usize,
    pub yend: usize,
    /// 0 when the region is left of `ampx`, 1 when right of it.
    pub side_x: usize,
}

impl AmplifierRegion {
    #[inline]
    pub fn width(&self) -> usize {
        self.xend - self.xbeg
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.yend - self.ybeg
    }

    #[inline]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        (self.xbeg..self.xend).contains(&x) && (self.ybeg..self.yend).contains(&y)
    }
}

/// Amplifiers reading one chip plus the boundary columns from CCDTAB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmpLayout {
    pub amps: Vec<Amp>,
    /// First column (after trim) read by the second amp along x; 0 = one amp.
    pub ampx: usize,
    /// First row (after trim) read by the second amp pair along y; 0 = one pair.
    pub ampy: usize,
}

impl AmpLayout {
    pub fn for_chip(
        detector: Detector,
        chip: i32,
        ccdamp: &AmpString,
        ampx: usize,
        ampy: usize,
    ) -> Self {
        Self {
            amps: ccdamp.for_chip(detector, chip),
            ampx,
            ampy,
        }
    }

    /// Position of `amp` relative to the first amp of the chip string.
    fn slot(&self, amp: Amp) -> Option<usize> {
        let first = self.amps.first()?.index();
        amp.index()
            .checked_sub(first)
            .filter(|&slot| slot < NAMPS)
    }

    /// Region of every amplifier reading this chip, indexed by [`Amp::index`].
    ///
    /// Slots of unused amps, and amps whose rectangle would be empty, are `None`.
    pub fn regions(
        &self,
        nx: usize,
        ny: usize,
        trim: &Trim,
    ) -> [Option<AmplifierRegion>; NAMPS] {
        let mut regions = [None; NAMPS];
        for &amp in &self.amps {
            let Some(slot) = self.slot(amp) else {
                continue;
            };
            let side_x = BIAS_ORDER_X[slot];
            let side_y = BIAS_ORDER_Y[slot];

            let xbeg = trim.x[0] + self.ampx * side_x;
            let xend = if side_x == 0 && self.ampx != 0 {
                self.ampx + trim.x[0]
            } else {
                nx.saturating_sub(trim.x[1])
            }
            .min(nx);
            let ybeg = trim.y[0] + self.ampy * side_y;
            let yend = if side_y == 0 && self.ampy != 0 {
                self.ampy + trim.y[0]
            } else {
                ny.saturating_sub(trim.y[1])
            }
            .min(ny);

            if xend > xbeg && yend > ybeg {
                regions[amp.index()] = Some(AmplifierRegion {
                    amp,
                    xbeg,
                    xend,
                    ybeg,
                    yend,
                    side_x,
                });
            }
        }
        regions
    }
}

/// Map amp-local `(col, row)` to image `(x, y)`: the amp's readout corner
/// becomes the origin, serial direction along columns.
#[inline]
fn amp_to_image(amp: Amp, col: usize, row: usize, nx: usize, ny: usize) -> (usize, usize) {
    match amp {
        Amp::A => (col, ny - row - 1),
        Amp::B => (nx - col - 1, ny - row - 1),
        Amp::C => (col, row),
        Amp::D => (nx - col - 1, row),
    }
}

/// Copy the `cols` columns nearest `amp`'s corner into amp-local orientation.
pub fn extract_amp_array(sci: &Buffer2<f32>, amp: Amp, cols: usize) -> Buffer2<f64> {
    let (nx, ny) = (sci.width(), sci.height());
    assert!(cols <= nx, "amp view wider than image");
    Buffer2::from_fn(cols, ny, |col, row| {
        let (x, y) = amp_to_image(amp, col, row, nx, ny);
        sci[(x, y)] as f64
    })
}

/// Inverse of [`extract_amp_array`].
pub fn restore_amp_array(sci: &mut Buffer2<f32>, amp: Amp, array: &Buffer2<f64>) {
    let (nx, ny) = (sci.width(), sci.height());
    assert!(
        array.width() <= nx && array.height() == ny,
        "amp view does not fit image"
    );
    for row in 0..array.height() {
        for col in 0..array.width() {
            let (x, y) = amp_to_image(amp, col, row, nx, ny);
            sci[(x, y)] = array[(col, row)] as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;

    use super::*;

    fn layout(amps: &str, ampx: usize, ampy: usize) -> AmpLayout {
        AmpLayout {
            amps: amps.parse::<AmpString>().unwrap().iter().collect(),
            ampx,
            ampy,
        }
    }

    fn coverage(regions: &[Option<AmplifierRegion>; NAMPS], nx: usize, ny: usize) -> Vec<u32> {
        let mut hits = vec![0u32; nx * ny];
        for region in regions.iter().flatten() {
            for y in region.ybeg..region.yend {
                for x in region.xbeg..region.xend {
                    hits[y * nx + x] += 1;
                }
            }
        }
        hits
    }

    #[test]
    fn test_regions_partition_image() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let nx = rng.random_range(2..60);
            let ny = rng.random_range(2..60);
            let ampx = rng.random_range(1..nx);
            let ampy = rng.random_range(1..ny);
            for chip in [
                layout("A", 0, 0),
                layout("D", 0, 0),
                layout("AB", ampx, 0),
                layout("CD", ampx, 0),
                layout("ABCD", ampx, ampy),
            ] {
                let regions = chip.regions(nx, ny, &Trim::default());
                let hits = coverage(&regions, nx, ny);
                assert!(
                    hits.iter().all(|&h| h == 1),
                    "{chip:?} with nx={nx} ny={ny} does not partition the image"
                );
            }
        }
    }

    #[test]
    fn test_regions_partition_trimmed_area() {
        let trim = Trim {
            x: [3, 2],
            y: [1, 4],
        };
        let (nx, ny) = (20, 16);
        let regions = layout("ABCD", 7, 5).regions(nx, ny, &trim);
        let hits = coverage(&regions, nx, ny);
        for y in 0..ny {
            for x in 0..nx {
                let inside = (3..nx - 2).contains(&x) && (1..ny - 4).contains(&y);
                assert_eq!(hits[y * nx + x], inside as u32, "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_four_amp_quadrants() {
        let regions = layout("ABCD", 10, 8).regions(20, 16, &Trim::default());
        let a = regions[Amp::A.index()].unwrap();
        let d = regions[Amp::D.index()].unwrap();
        assert_eq!((a.xbeg, a.xend, a.ybeg, a.yend), (0, 10, 0, 8));
        assert_eq!((d.xbeg, d.xend, d.ybeg, d.yend), (10, 20, 8, 16));
        assert_eq!(d.side_x, 1);

        let b = regions[Amp::B.index()].unwrap();
        let c = regions[Amp::C.index()].unwrap();
        assert_eq!((b.ybeg, b.yend), (0, 8), "B shares the bottom half with A");
        assert_eq!((c.xbeg, c.ybeg), (0, 8), "C sits top left");
    }

    #[test]
    fn test_unused_amps_have_no_region() {
        let regions = layout("CD", 10, 0).regions(20, 16, &Trim::default());
        assert!(regions[Amp::A.index()].is_none());
        assert!(regions[Amp::B.index()].is_none());
        assert_eq!(regions[Amp::C.index()].unwrap().width(), 10);
        assert_eq!(regions[Amp::D.index()].unwrap().xbeg, 10);
    }

    #[test]
    fn test_ampx_beyond_image_is_clamped() {
        let regions = layout("AB", 50, 0).regions(20, 4, &Trim::default());
        assert_eq!(regions[Amp::A.index()].unwrap().xend, 20);
        assert!(regions[Amp::B.index()].is_none(), "B region is empty");
    }

    #[test]
    fn test_amp_views_put_readout_corner_at_origin() {
        let sci = Buffer2::from_fn(6, 4, |x, y| (y * 10 + x) as f32);
        let corner = |amp| extract_amp_array(&sci, amp, 3)[(0, 0)];
        assert_eq!(corner(Amp::A), 30.0);
        assert_eq!(corner(Amp::B), 35.0);
        assert_eq!(corner(Amp::C), 0.0);
        assert_eq!(corner(Amp::D), 5.0);
    }

    #[test]
    fn test_restore_inverts_extract() {
        let sci = Buffer2::from_fn(8, 5, |x, y| (y * 8 + x) as f32 * 0.5);
        for pair in [[Amp::A, Amp::B], [Amp::C, Amp::D]] {
            let mut out = Buffer2::new_default(8, 5);
            for amp in pair {
                let view = extract_amp_array(&sci, amp, 4);
                restore_amp_array(&mut out, amp, &view);
            }
            assert_eq!(out, sci, "{pair:?} half-width views tile the chip");
        }
    }
}
