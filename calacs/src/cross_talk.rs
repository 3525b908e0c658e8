//! Amplifier cross talk of full-frame WFC chips.
//!
//! The two amps of a chip read out simultaneously, mirrored about the chip
//! center, and each leaks a small fraction of its signal into the other.

use crate::config::CrossTalkParams;
use crate::image::PixelImage;

/// Remove the leak of each pixel's mirrored partner `(width - 1 - x, y)`.
/// Every pixel is corrected from the uncorrected mirror value. Rewrites
/// `sci` only.
pub fn correct_cross_talk(image: &mut PixelImage, params: &CrossTalkParams) {
    let mut mirror = Vec::with_capacity(image.width());
    for row in 0..image.height() {
        let data = image.sci.row_mut(row);
        mirror.clear();
        mirror.extend(data.iter().rev().map(|&v| v as f64));
        for (pixel, &partner) in data.iter_mut().zip(&mirror) {
            *pixel = (*pixel as f64 - params.coefficient * partner) as f32;
        }
    }
}
