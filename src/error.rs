use std::path::PathBuf;

/// Errors raised while validating candidate insertions.
///
/// `MalformedRecord` is the one recoverable variant: the reader skips the
/// offending line and counts it in QC. Everything else aborts the affected
/// sample (or the whole run, for `Config`).
#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    #[error("malformed position mapping {path}, line {line}: {reason}")]
    MalformedMapping {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("malformed alignment record at line {line_number}: {reason}")]
    MalformedRecord { line_number: usize, reason: String },

    #[error("missing input: {path}")]
    MissingInput { path: PathBuf },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("region table header mismatch in {path}")]
    HeaderMismatch { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ValidateError {
    pub fn mapping(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedMapping {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }

    pub fn record(line_number: usize, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line_number,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ValidateError>;
