// THEORY:
// The `wavelet` module is the compression collaborator. The engine itself
// never looks inside a coder: it hands over an image and a depth and gets
// back a reconstruction with the same dimensions. `depth` is the number of
// decomposition levels whose detail coefficients are discarded before
// reconstruction, so a higher depth is a lossier round trip.
//
// `HaarCoder` is the working implementation shipped with the crate. For a
// Haar basis, zeroing every detail band and reconstructing is equivalent to
// recursive 2x2 block averaging followed by block replication on the way
// back up, which is exactly how it is implemented here: no transform
// machinery, just the pooling the basis reduces to.

use image::{DynamicImage, Rgb, RgbImage};

/// Contract for a lossy wavelet round trip. Pure and deterministic for
/// fixed inputs; the output has the input's dimensions and channels.
pub trait WaveletCoder: Send + Sync {
    fn encode_decode(&self, image: &DynamicImage, depth: u32) -> DynamicImage;
}

/// Haar-basis coder: discards every detail band down to `depth` levels and
/// reconstructs the approximation.
#[derive(Debug, Default, Clone, Copy)]
pub struct HaarCoder;

impl HaarCoder {
    pub fn new() -> Self {
        Self
    }
}

impl WaveletCoder for HaarCoder {
    fn encode_decode(&self, image: &DynamicImage, depth: u32) -> DynamicImage {
        let rgb = image.to_rgb8();
        let (width, height) = (rgb.width(), rgb.height());

        // Analysis: each level halves both dimensions, keeping only the
        // approximation band. Levels stop early once a dimension can no
        // longer be split.
        let mut approx = rgb;
        let mut levels = 0u32;
        while levels < depth && approx.width() >= 2 && approx.height() >= 2 {
            approx = halve(&approx);
            levels += 1;
        }

        // Synthesis with zeroed details: each coefficient spreads back
        // over the 2^levels x 2^levels block it summarized.
        let block = 1u32 << levels;
        let mut out = RgbImage::new(width, height);
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let sx = (x / block).min(approx.width() - 1);
            let sy = (y / block).min(approx.height() - 1);
            *pixel = *approx.get_pixel(sx, sy);
        }
        DynamicImage::ImageRgb8(out)
    }
}

/// One analysis level: 2x2 average pooling per channel.
fn halve(src: &RgbImage) -> RgbImage {
    let (w, h) = (src.width() / 2, src.height() / 2);
    let mut dst = RgbImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut sum = [0u32; 3];
            for dy in 0..2 {
                for dx in 0..2 {
                    let p = src.get_pixel(x * 2 + dx, y * 2 + dy);
                    for c in 0..3 {
                        sum[c] += p[c] as u32;
                    }
                }
            }
            dst.put_pixel(x, y, Rgb([(sum[0] / 4) as u8, (sum[1] / 4) as u8, (sum[2] / 4) as u8]));
        }
    }
    dst
}
