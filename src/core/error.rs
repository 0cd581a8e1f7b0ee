use thiserror::Error;

/// Everything that can go wrong between loading a connectome and writing a
/// result table.
///
/// Errors are raised where they are detected; nothing in the crate coerces a
/// bad value into a default.
#[derive(Debug, Error)]
pub enum Error {
    #[error("degenerate connectivity matrix: {0}")]
    DegenerateMatrix(String),

    #[error("unknown node partition `{0}`")]
    UnknownPartition(String),

    #[error("readout module `{module}` has no nodes")]
    EmptyModule { module: String },

    #[error("unsupported metric `{0}`")]
    UnsupportedMetric(String),

    #[error("dimension mismatch in {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("numerical failure: {0}")]
    Numerical(String),

    #[error("sweep aborted at alpha = {alpha}: {source}")]
    SweepAborted {
        alpha: f64,
        #[source]
        source: Box<Error>,
    },

    #[error("worker job panicked: {0}")]
    JobPanicked(String),

    #[error("{failed} of {total} workflow jobs failed")]
    BatchFailed { failed: usize, total: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("npy read failed: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),

    #[error("npy write failed: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn mismatch(what: &'static str, expected: usize, got: usize) -> Self {
        Error::DimensionMismatch {
            what,
            expected,
            got,
        }
    }
}
