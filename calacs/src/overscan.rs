//! Overscan layout of one exposure (`FindOverscan`).
//!
//! ```text
//!       A                         B
//!    +---+-------------------+---+
//!    |   |     virtual       |   |  } trimy2
//!    |   +---------+---------+   |
//!    |   |         |         |   |
//!    |   |         |         |   |
//!    |   +---------+---------+   |  } trimy1
//!    +---+-------------------+---+
//!       C  ^ biassecta  ampx ^    biassectb ^  D
//! ```
//!
//! Table columns are 1-indexed; everything resolved here is 0-indexed.

use crate::geometry::Trim;
use crate::image::ExposureHeader;
use crate::tables::{OscnRow, OscnTable};

/// Subarray apertures (FSW change of May 2016) that can include virtual
/// overscan rows.
pub const VIRTUAL_OVERSCAN_APERTURES: [&str; 12] = [
    "WFC1A-512",
    "WFC1A-1K",
    "WFC1A-2K",
    "WFC1B-512",
    "WFC1B-1K",
    "WFC1B-2K",
    "WFC2C-512",
    "WFC2C-1K",
    "WFC2C-2K",
    "WFC2D-512",
    "WFC2D-1K",
    "WFC2D-2K",
];

/// Trim widths, bias sections and virtual overscan of one exposure.
///
/// Bias sections and virtual-overscan ranges are inclusive column/row
/// pairs; an empty section has its end `<= 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverscanRegions {
    pub trim: Trim,
    pub biassecta: [i32; 2],
    pub biassectb: [i32; 2],
    pub vx: [i32; 2],
    pub vy: [i32; 2],
    /// Physical overscan columns are present.
    pub overscan: bool,
    /// Virtual overscan rows are present.
    pub virtual_overscan: bool,
}

impl OverscanRegions {
    /// Layout of an exposure without usable overscan.
    pub fn none() -> Self {
        Self::default()
    }

    /// Virtual overscan window is specified (`vy` not both `<= 0`).
    pub fn has_drift_window(&self) -> bool {
        !(self.vy[0] <= 0 && self.vy[1] <= 0)
    }

    /// Look up the exposure in OSCNTAB. A missing row is not an error: the
    /// step falls back to the CCDTAB default bias.
    pub fn resolve(table: &OscnTable, header: &ExposureHeader, nx: usize, ny: usize) -> Self {
        let (binx, biny) = header.bin_factors();
        let Some(row) = table.find(&header.ccdamp, header.chip, binx, biny) else {
            tracing::warn!(
                ccdamp = %header.ccdamp,
                chip = header.chip,
                "Could not find appropriate row from OSCNTAB."
            );
            return Self::none();
        };

        let regions = if header.subarray {
            Self::for_subarray(row, header, nx as i32, ny as i32)
        } else {
            Self::for_full_frame(row)
        };
        tracing::debug!(
            "Found trim values of: x({},{}) y({},{})",
            regions.trim.x[0],
            regions.trim.x[1],
            regions.trim.y[0],
            regions.trim.y[1]
        );
        regions
    }

    fn for_full_frame(row: &OscnRow) -> Self {
        let trim = Trim {
            x: [to_width(row.trimx1), to_width(row.trimx2)],
            y: [to_width(row.trimy1), to_width(row.trimy2)],
        };
        Self {
            trim,
            biassecta: [row.biassecta1 - 1, row.biassecta2 - 1],
            biassectb: [row.biassectb1 - 1, row.biassectb2 - 1],
            vx: [row.vx1 - 1, row.vx2 - 1],
            vy: [row.vy1 - 1, row.vy2 - 1],
            overscan: true,
            virtual_overscan: trim.y[0] + trim.y[1] > 0,
        }
    }

    /// Subarrays carry overscan only where they overlap the full-frame
    /// overscan strips; the overlap follows from the subarray offsets.
    fn for_subarray(row: &OscnRow, header: &ExposureHeader, nx: i32, ny: i32) -> Self {
        let (offsetx, offsety) = header.offsets();
        let new_subarray = VIRTUAL_OVERSCAN_APERTURES
            .iter()
            .any(|name| name.eq_ignore_ascii_case(header.aperture.trim()));

        let mut trimy = [0, 0];
        if new_subarray {
            let ty1 = ny - offsety;
            let cy1 = row.ny - row.trimy2 - row.trimy1;
            if offsety > 0 {
                trimy[0] = offsety.min(row.trimy1);
                let full_ny = row.ny - (row.trimy1 + row.trimy2);
                trimy[1] = (ny - trimy[0] - full_ny).max(0);
            } else if ty1 > cy1 && ty1 <= row.ny {
                trimy[1] = ty1 - cy1;
            }
        }

        let tx1 = nx - offsetx;
        let cx1 = row.nx - row.trimx2 - row.trimx1;
        let cx0 = row.trimx1 - offsetx;

        let mut regions = Self {
            trim: Trim {
                x: [0, 0],
                y: [to_width(trimy[0]), to_width(trimy[1])],
            },
            overscan: true,
            ..Self::default()
        };
        regions.virtual_overscan = regions.trim.y[0] + regions.trim.y[1] > 0;

        if offsetx > 0 {
            // Starts in the leading overscan, may run into the trailing one.
            let trimx0 = offsetx.min(row.trimx1);
            let full_nx = row.nx - (row.trimx1 + row.trimx2);
            regions.trim.x = [to_width(trimx0), to_width(nx - trimx0 - full_nx)];
            regions.biassecta = [
                (row.biassecta1 - 1 - cx0).max(0),
                row.biassecta2 - 1 - cx0,
            ];
        } else if tx1 > cx1 && tx1 <= row.nx {
            // Overlaps only the trailing overscan.
            regions.trim.x = [0, to_width(tx1 - cx1)];
            regions.biassectb = [nx - (tx1 - cx1), nx - 1];
        } else {
            regions.overscan = false;
        }
        regions
    }
}

#[inline]
fn to_width(value: i32) -> usize {
    value.max(0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wfc_header, wfc_oscn_row};

    fn table(chip: i32) -> OscnTable {
        OscnTable {
            rows: vec![wfc_oscn_row("ABCD", chip)],
        }
    }

    #[test]
    fn test_full_frame_converts_to_zero_indexed() {
        let header = wfc_header(1);
        let regions = OverscanRegions::resolve(&table(1), &header, 4144, 2068);
        assert!(regions.overscan);
        assert_eq!(regions.trim.x, [24, 24]);
        assert_eq!(regions.trim.y, [0, 20]);
        assert_eq!(regions.biassecta, [18, 23]);
        assert_eq!(regions.biassectb, [4120, 4125]);
        assert_eq!(regions.vy, [2048, 2067]);
        assert!(regions.virtual_overscan);
        assert!(regions.has_drift_window());
    }

    #[test]
    fn test_no_matching_row_means_no_overscan() {
        let mut header = wfc_header(1);
        header.bin = [2, 2];
        let regions = OverscanRegions::resolve(&table(1), &header, 2072, 1034);
        assert_eq!(regions, OverscanRegions::none());
        assert!(!regions.overscan);
        assert!(!regions.has_drift_window());
    }

    #[test]
    fn test_subarray_in_leading_overscan() {
        let mut header = wfc_header(2);
        header.subarray = true;
        header.aperture = "WFC2-POL0V".to_string();
        header.ltv = [22.0, 0.0];
        let regions = OverscanRegions::resolve(&table(2), &header, 1046, 1024);
        assert!(regions.overscan);
        assert_eq!(regions.trim.x, [22, 0]);
        // Table section 19..24 (1-indexed) shifted by cx0 = 24 - 22.
        assert_eq!(regions.biassecta, [16, 21]);
        assert_eq!(regions.biassectb, [0, 0]);
        assert_eq!(regions.vx, [0, 0], "subarrays never carry a drift window");
        assert_eq!(regions.trim.y, [0, 0]);
        assert!(!regions.virtual_overscan);
    }

    #[test]
    fn test_subarray_in_trailing_overscan() {
        let mut header = wfc_header(1);
        header.subarray = true;
        header.aperture = "WFC1-IRAMPQ".to_string();
        // Starts 3072 columns into the science area and runs 1024 + 24 wide.
        header.ltv = [-3072.0, 0.0];
        let nx = 1048;
        let regions = OverscanRegions::resolve(&table(1), &header, nx, 1024);
        assert!(regions.overscan);
        assert_eq!(regions.trim.x, [0, 24]);
        assert_eq!(regions.biassectb, [1024, 1047]);
        assert_eq!(regions.biassecta, [0, 0]);
    }

    #[test]
    fn test_subarray_without_physical_overscan() {
        let mut header = wfc_header(1);
        header.subarray = true;
        header.aperture = "WFC1-512".to_string();
        header.ltv = [-1000.0, -1000.0];
        let regions = OverscanRegions::resolve(&table(1), &header, 512, 512);
        assert!(!regions.overscan);
        assert_eq!(regions.trim, Trim::default());
    }

    #[test]
    fn test_new_subarray_reaches_virtual_overscan() {
        let mut header = wfc_header(1);
        header.subarray = true;
        header.aperture = "WFC1A-2K".to_string();
        header.ltv = [24.0, -20.0];
        // 2048 rows starting 20 rows up end on the chip's last row, so the top
        // 20 rows of the subarray are virtual overscan.
        let regions = OverscanRegions::resolve(&table(1), &header, 2072, 2048);
        assert!(regions.overscan);
        assert_eq!(regions.trim.y, [0, 20]);
        assert!(regions.virtual_overscan);
        assert_eq!(regions.vy, [0, 0]);
    }
}
