//! OSCNTAB and CCDTAB reference tables.
//!
//! Tables are serde documents (YAML or JSON, picked by file extension) holding
//! a list of rows with the original column names in lower case. Overscan
//! columns keep the 1-indexed inclusive convention of the reference files.


use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::detector::{AmpString, NAMPS};
use crate::error::{Error, Result};
use crate::image::ExposureHeader;

fn load_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let bytes = std::fs::read(path).map_err(|source| Error::TableLoad {
        path: path.to_path_buf(),
        source,
    })?;
    common::deserialize_for_path(&bytes, path).map_err(|source| Error::TableFormat {
        path: path.to_path_buf(),
        source,
    })
}

/// One OSCNTAB row: overscan layout for an (amp, chip, binning) readout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscnRow {
    pub ccdamp: AmpString,
    pub ccdchip: i32,
    pub binx: i32,
    pub biny: i32,
    /// Full raw chip size, overscan included.
    pub nx: i32,
    pub ny: i32,
    pub trimx1: i32,
    pub trimx2: i32,
    pub trimy1: i32,
    pub trimy2: i32,
    pub vx1: i32,
    pub vx2: i32,
    pub vy1: i32,
    pub vy2: i32,
    pub biassecta1: i32,
    pub biassecta2: i32,
    pub biassectb1: i32,
    pub biassectb2: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OscnTable {
    pub rows: Vec<OscnRow>,
}

impl OscnTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            rows: load_rows(path.as_ref())?,
        })
    }

    /// First row matching the readout. Overscan geometry depends only on the
    /// full chip, so image size is not part of the key.
    pub fn find(
        &self,
        ccdamp: &AmpString,
        chip: i32,
        binx: i32,
        biny: i32,
    ) -> Option<&OscnRow> {
        self.rows.iter().find(|row| {
            row.ccdamp == *ccdamp && row.ccdchip == chip && row.binx == binx && row.biny == biny
        })
    }
}

/// Commanded gain column. Pre-SM4 tables store integers, later ones floats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableGain {
    Int(i64),
    Float(f64),
}

impl TableGain {
    const FLOAT_TOLERANCE: f64 = 1e-5;

    pub fn matches(self, ccdgain: f32) -> bool {
        match self {
            TableGain::Int(gain) => gain == ccdgain as i64,
            TableGain::Float(gain) => (gain - ccdgain as f64).abs() <= Self::FLOAT_TOLERANCE,
        }
    }
}

/// One CCDTAB row. Per-amp arrays are in A, B, C, D order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CcdRow {
    pub ccdamp: AmpString,
    pub ccdchip: i32,
    pub ccdgain: TableGain,
    pub binaxis1: i32,
    pub binaxis2: i32,
    pub ccdofst: [i32; NAMPS],
    pub ccdbias: [f32; NAMPS],
    pub atodgn: [f32; NAMPS],
    pub readnse: [f32; NAMPS],
    pub ampx: i32,
    pub ampy: i32,
    pub atodsat: i32,
    pub saturate: f32,
    #[serde(default)]
    pub pedigree: Option<String>,
    #[serde(default)]
    pub descrip: Option<String>,
}

impl CcdRow {
    fn is_dummy(&self) -> bool {
        self.pedigree
            .as_deref()
            .is_some_and(|p| p.trim_start().to_ascii_uppercase().starts_with("DUMMY"))
    }
}

/// Detector parameters selected for one chip of an exposure.
#[derive(Debug, Clone, PartialEq)]
pub struct CcdParams {
    /// Electrons per DN; zero for amps not in `CCDAMP`.
    pub atodgain: [f32; NAMPS],
    /// Read noise in electrons; zero for amps not in `CCDAMP`.
    pub readnoise: [f32; NAMPS],
    /// Default bias level in DN; zero for amps not in `CCDAMP`.
    pub ccdbias: [f32; NAMPS],
    /// Boundary column, clamped to the exposure width.
    pub ampx: usize,
    pub ampy: usize,
    pub atodsat: i32,
    pub saturate: f32,
    /// Row was delivered with a DUMMY pedigree.
    pub dummy: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CcdTable {
    pub rows: Vec<CcdRow>,
}

impl CcdTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            rows: load_rows(path.as_ref())?,
        })
    }

    /// Row matching amp string, gain, chip and all four commanded offsets.
    ///
    /// No match is a hard failure: without gain and read noise nothing
    /// downstream can run.
    pub fn select(&self, header: &ExposureHeader, dimx: usize) -> Result<CcdParams> {
        let (index, row) = self
            .rows
            .iter()
            .enumerate()
            .find(|(_, row)| {
                row.ccdamp == header.ccdamp
                    && row.ccdgain.matches(header.ccdgain)
                    && row.ccdchip == header.chip
                    && row.ccdofst == header.ccdofst
            })
            .ok_or_else(|| Error::CcdRowNotFound {
                ccdamp: header.ccdamp.to_string(),
                ccdgain: header.ccdgain,
                chip: header.chip,
                offsets: header.ccdofst,
            })?;

        let dummy = row.is_dummy();
        if dummy {
            tracing::warn!("Row {} of CCDTAB is DUMMY.", index + 1);
        }

        let mut params = CcdParams {
            atodgain: [0.0; NAMPS],
            readnoise: [0.0; NAMPS],
            ccdbias: [0.0; NAMPS],
            ampx: (row.ampx.max(0) as usize).min(dimx),
            ampy: row.ampy.max(0) as usize,
            atodsat: row.atodsat,
            saturate: row.saturate,
            dummy,
        };
        for amp in header.ccdamp.iter() {
            let i = amp.index();
            params.atodgain[i] = row.atodgn[i];
            params.readnoise[i] = row.readnse[i];
            params.ccdbias[i] = row.ccdbias[i];
        }
        Ok(params)
    }
}
