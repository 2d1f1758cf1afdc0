use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::data::DataError;
use crate::format::Format;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not a recognised resource file", .path.display())]
    UnrecognisedFormat { path: PathBuf },
    #[error("type code {code:?} is not exactly 4 MacRoman bytes")]
    InvalidTypeCode { code: String },
    #[error("{format} files cannot store attributes (type {code:?})")]
    AttributesUnsupported { format: Format, code: String },
    #[error("resource id {id} of type {code:?} does not fit the {format} format")]
    IdOutOfRange { format: Format, code: String, id: i64 },
    #[error("{format} format limit exceeded: {what}")]
    LimitExceeded { format: Format, what: &'static str },
    #[error("query result is finalized")]
    ResultFinalized,
    #[error(transparent)]
    Data(DataError),
}

pub type Result<T> = std::result::Result<T, ResourceError>;

impl From<DataError> for ResourceError {
    /// I/O failures keep their path at the top level; everything else is
    /// wrapped.
    fn from(error: DataError) -> Self {
        match error {
            DataError::Io { path, source } => ResourceError::Io { path, source },
            other => ResourceError::Data(other),
        }
    }
}
