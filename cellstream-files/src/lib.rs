use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("The file's magic value does not match the expectation {magic}")]
    InvalidMagicValue { magic: u32 },

    #[error("The file is violating the expected format, because: {reason}")]
    FormatError { reason: &'static str },

    #[error("The file is missing the mandatory {magic} chunk")]
    MissingChunk { magic: &'static str },

    /// Represents an empty source, e.g. a zero-length asset blob.
    #[error("Source contains no data")]
    EmptySource,

    /// Represents all other cases of `std::io::Error`.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

pub mod cell;
pub mod common;
pub mod environment;
pub mod ids;
pub mod surface;
