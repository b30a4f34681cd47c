// THEORY:
// This file is the main entry point for the `wavelet_probe` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the
// public API exposed to external consumers (like the bundled probe binary).
//
// The crate measures how lossy wavelet compression shifts the predictions
// of pretrained image classifiers. The building blocks (`core_modules`)
// stay encapsulated; consumers interact with the `ClassifierProcessor`
// (runs the sweeps), the `ResultManager` (persists and compares the
// resulting summaries), and the collaborator traits (`Classifier`,
// `WaveletCoder`) they plug their own models and coders into.

pub mod core_modules;
pub mod error;
pub(crate) mod parallel_sweep;
pub mod processor;
pub mod result_manager;

pub use core_modules::classifier::{
    Classifier, ClassifierHandle, ClassifierSet, Interpolation, Prediction,
};
pub use core_modules::model_loader::{ModelSpec, load_models};
pub use core_modules::wavelet::{HaarCoder, WaveletCoder};
pub use error::{Error, Result};
pub use processor::{ClassifierInput, ClassifierProcessor, ProcessorConfig};
pub use result_manager::{
    ComparisonRow, ComparisonTable, DepthResult, Reducer, ResultManager, RunStatus,
    SIMILAR_BEST_CLASS, SIMILAR_CLASSES_PCT, Summary,
};
