// THEORY:
// The `classifier` module defines the uniform prediction contract that the
// rest of the engine is written against. Pretrained models differ wildly in
// input shape and preprocessing, so the pipeline never touches a concrete
// model type: it sees `dyn Classifier`, feeds it an image already resized
// to the shape the model asked for, and receives a ranked list of
// `Prediction`s. Everything model-specific lives behind the trait.
//
// Key architectural principles:
// 1.  **Uniform contract**: `predict` must return the model's full ranked
//     output, descending by score, deterministically for a fixed image.
//     Top-K is always a prefix slice taken by the caller, never a concern
//     of the model.
// 2.  **Statelessness**: a classifier handle is immutable across
//     predictions. This is what makes the sweep cacheable (the original
//     image is predicted once and reused across depths) and what makes an
//     image-parallel sweep safe.
// 3.  **Preprocessing split**: the model declares its input shape; the
//     pipeline owns the resize (and its interpolation policy), so one
//     configuration knob governs preprocessing for every model in a run.

use crate::error::Result;
use image::{DynamicImage, imageops};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One ranked class prediction for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Human-readable class label.
    pub label: String,
    /// Confidence score, typically in 0.0..=1.0.
    pub score: f32,
}

impl Prediction {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Returns the K highest-confidence predictions as an owned vector.
/// `ranked` must already be sorted descending by score.
pub fn top_k(ranked: &[Prediction], k: usize) -> Vec<Prediction> {
    ranked[..ranked.len().min(k)].to_vec()
}

/// The uniform contract every model variant is wrapped in.
pub trait Classifier: Send + Sync {
    /// The (width, height) the model expects its input resized to.
    fn input_shape(&self) -> (u32, u32);

    /// Runs inference on an already-preprocessed image and returns the
    /// full ranked prediction list, descending by score. Must be
    /// deterministic for a fixed image.
    fn predict(&self, image: &DynamicImage) -> Result<Vec<Prediction>>;
}

/// Shared, immutable handle to one loaded model.
pub type ClassifierHandle = Arc<dyn Classifier>;

/// An ordered name -> handle mapping. Insertion order is processing order,
/// so a run over an unchanged set is directly comparable to the last one.
pub type ClassifierSet = Vec<(String, ClassifierHandle)>;

/// Resize strategy applied when adapting an image to a model's input
/// shape. Maps onto the `image` crate's filter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl Interpolation {
    pub fn filter(self) -> imageops::FilterType {
        match self {
            Interpolation::Nearest => imageops::FilterType::Nearest,
            Interpolation::Triangle => imageops::FilterType::Triangle,
            Interpolation::CatmullRom => imageops::FilterType::CatmullRom,
            Interpolation::Gaussian => imageops::FilterType::Gaussian,
            Interpolation::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

/// Adapts an image to a model's declared input shape.
pub fn preprocess(
    image: &DynamicImage,
    shape: (u32, u32),
    interpolation: Interpolation,
) -> DynamicImage {
    if (image.width(), image.height()) == shape {
        return image.clone();
    }
    image.resize_exact(shape.0, shape.1, interpolation.filter())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(n: usize) -> Vec<Prediction> {
        (0..n)
            .map(|i| Prediction::new(format!("class_{i:03}"), 1.0 - i as f32 * 0.1))
            .collect()
    }

    #[test]
    fn top_k_is_a_prefix() {
        let all = ranked(10);
        let top = top_k(&all, 5);
        assert_eq!(top.len(), 5);
        assert_eq!(top[..], all[..5]);
    }

    #[test]
    fn top_k_clamps_to_available() {
        let all = ranked(3);
        assert_eq!(top_k(&all, 5).len(), 3);
    }

    #[test]
    fn preprocess_resizes_to_declared_shape() {
        let img = DynamicImage::new_rgb8(64, 48);
        let out = preprocess(&img, (224, 224), Interpolation::Triangle);
        assert_eq!((out.width(), out.height()), (224, 224));
    }

    #[test]
    fn preprocess_passes_matching_shape_through() {
        let img = DynamicImage::new_rgb8(224, 224);
        let out = preprocess(&img, (224, 224), Interpolation::Nearest);
        assert_eq!((out.width(), out.height()), (224, 224));
    }
}
