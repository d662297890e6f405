use crate::metrics::ComputationError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that end an evaluation or a dataset preparation. None of them is recovered from: a
/// skipped record would break the positional alignment between gold data and predictions.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A file or directory could not be read or written.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line of a JSON-lines file is not a valid record.
    #[error("malformed record at {path}:{line}: {source}")]
    MalformedRecord {
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        #[source]
        source: std::io::Error,
    },

    /// A record holds a different number of tokens and tags.
    #[error("record at {path}:{line} has {tokens} tokens but {tags} tags")]
    RecordLengthMismatch {
        path: PathBuf,
        line: usize,
        tokens: usize,
        tags: usize,
    },

    /// A tag index is outside of the tag vocabulary.
    #[error("record at {path}:{line} uses the unknown tag index {index}")]
    UnknownTagIndex {
        path: PathBuf,
        line: usize,
        index: u64,
    },

    /// No prediction file was found. Evaluating zero runs is meaningless.
    #[error("no prediction file ending with `{suffix}` matching `{filter}` under {dir}")]
    NoRuns {
        dir: PathBuf,
        filter: String,
        suffix: &'static str,
    },

    /// A prediction run is not aligned with the gold data.
    #[error("run `{run}`: {source}")]
    MisalignedRun {
        run: String,
        #[source]
        source: ComputationError,
    },

    #[error(transparent)]
    Computation(#[from] ComputationError),
}

impl EvalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for tagscore operations.
pub type Result<T> = std::result::Result<T, EvalError>;
