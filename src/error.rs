// THEORY:
// Every fallible operation in the engine funnels into a single crate-wide
// error type. The variants mirror the contract boundaries of the system:
// `Usage` for malformed calls (programming errors, surfaced immediately),
// `NotFound`/`Corrupt` for persistence problems, `MissingData` for
// comparisons over summaries that were never written (or whose run failed
// outright), and `UnknownMetric` for extraction of a column that does not
// exist. Timeouts and inference failures are deliberately NOT here: they
// are converted into a summary status at the per-classifier boundary and
// never abort a batch.

use thiserror::Error;

/// Result type for wavelet_probe operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A call was made with the wrong shape (bare handle where a named
    /// mapping is required, a name-less single-classifier call, ...).
    #[error("usage error: {0}")]
    Usage(String),

    /// A corpus image or persisted artifact does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A persisted artifact exists but cannot be parsed.
    #[error("corrupt artifact at {path}: {reason}")]
    Corrupt { path: String, reason: String },

    /// A comparison was requested for a (classifier, depth) pair with no
    /// usable summary on disk.
    #[error("missing data: no usable summary for classifier '{classifier}' at depth {depth}")]
    MissingData { classifier: String, depth: u32 },

    /// Extraction of a metric column the comparison table does not carry.
    #[error("unknown metric: '{0}'")]
    UnknownMetric(String),

    /// A classifier raised during prediction. Fatal for that classifier's
    /// sweep, never for the batch.
    #[error("inference failure in classifier '{classifier}': {reason}")]
    Inference { classifier: String, reason: String },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn usage(msg: impl Into<String>) -> Self {
        Error::Usage(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn corrupt(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_data(classifier: impl Into<String>, depth: u32) -> Self {
        Error::MissingData {
            classifier: classifier.into(),
            depth,
        }
    }

    pub fn inference(classifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Inference {
            classifier: classifier.into(),
            reason: reason.into(),
        }
    }
}
