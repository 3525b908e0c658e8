//! Detectors, amplifiers and the commanded `CCDAMP` readout string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::{Error, Result};

/// Number of amplifier slots on an ACS CCD.
pub const NAMPS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum Detector {
    #[strum(serialize = "WFC")]
    #[serde(rename = "WFC")]
    Wfc,
    #[strum(serialize = "HRC")]
    #[serde(rename = "HRC")]
    Hrc,
}

/// Readout amplifier, in `AMPSORDER` ("ABCD").
///
/// On WFC, A and B read chip 1 (top of the focal plane), C and D chip 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString)]
pub enum Amp {
    A,
    B,
    C,
    D,
}

impl Amp {
    pub const ALL: [Amp; NAMPS] = [Amp::A, Amp::B, Amp::C, Amp::D];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'A' => Some(Amp::A),
            'B' => Some(Amp::B),
            'C' => Some(Amp::C),
            'D' => Some(Amp::D),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        (b'A' + self as u8) as char
    }

    /// WFC chip the amplifier reads out.
    pub fn wfc_chip(self) -> i32 {
        match self {
            Amp::A | Amp::B => 1,
            Amp::C | Amp::D => 2,
        }
    }
}

/// An ordered, duplicate-free set of amplifiers, as written in `CCDAMP`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AmpString(Vec<Amp>);

impl AmpString {
    pub fn new(amps: Vec<Amp>) -> Result<Self> {
        let mut seen = [false; NAMPS];
        for amp in &amps {
            if std::mem::replace(&mut seen[amp.index()], true) {
                return Err(Error::InvalidAmpString(letters(&amps)));
            }
        }
        if amps.is_empty() {
            return Err(Error::InvalidAmpString(String::new()));
        }
        Ok(Self(amps))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn first(&self) -> Amp {
        self.0[0]
    }

    pub fn contains(&self, amp: Amp) -> bool {
        self.0.contains(&amp)
    }

    pub fn iter(&self) -> impl Iterator<Item = Amp> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[Amp] {
        &self.0
    }

    /// Amplifiers of `self` that read out `chip` (`parseWFCamps`).
    ///
    /// WFC chip 1 keeps A/B, chip 2 keeps C/D. HRC has one chip and keeps all.
    /// Empty when the exposure did not read the chip.
    pub fn for_chip(&self, detector: Detector, chip: i32) -> Vec<Amp> {
        match detector {
            Detector::Wfc => self.iter().filter(|amp| amp.wfc_chip() == chip).collect(),
            Detector::Hrc => self.0.clone(),
        }
    }

    /// Slot holding the default bias for this readout (`selectBias`).
    ///
    /// First listed amp, shifted by two on WFC chip 2 multi-amp readouts where
    /// the string starts with the chip 1 amps.
    pub fn default_bias_slot(&self, detector: Detector, chip: i32) -> usize {
        let mut slot = self.first().index();
        if self.len() > 1 && detector == Detector::Wfc && chip == 2 {
            slot += 2;
        }
        slot.min(NAMPS - 1)
    }
}

fn letters(amps: &[Amp]) -> String {
    amps.iter().map(|amp| amp.letter()).collect()
}

impl FromStr for AmpString {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let amps = trimmed
            .chars()
            .map(|c| Amp::from_letter(c.to_ascii_uppercase()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::InvalidAmpString(s.to_string()))?;
        Self::new(amps)
    }
}

impl fmt::Display for AmpString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&letters(&self.0))
    }
}

impl Serialize for AmpString {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AmpString {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
