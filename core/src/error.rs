use crate::{DocId, TermId};
use std::path::PathBuf;

/// Errors returned by the retrieval core.
///
/// Absent terms and documents at query time are not errors; they simply
/// contribute nothing to a ranking.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown document: {0}")]
    UnknownDocument(DocId),

    #[error("out-of-order posting for term {term_id}: doc {doc_id} does not follow doc {last}")]
    OrderViolation { term_id: TermId, doc_id: DocId, last: DocId },

    #[error("document {doc_id} registered out of order, expected {expected}")]
    DocumentOrder { doc_id: DocId, expected: DocId },

    #[error("invalid parameter {name} = {value}: {reason}")]
    InvalidParameter { name: &'static str, value: f64, reason: &'static str },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("cannot encode {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("unsupported index version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("inconsistent index: {0}")]
    Inconsistent(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Decode { path: path.into(), reason: reason.to_string() }
    }

    pub(crate) fn encode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Encode { path: path.into(), reason: reason.to_string() }
    }
}
