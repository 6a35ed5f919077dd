//! Error type shared by every container.
//!
//! Lookups that miss are not errors: they return `end()` or `None`. The
//! variants below cover misuse of positions and the get-or-fail accessors.

use thiserror::Error;

/// Broad class of an [`Error`], mirroring the logic-error split of the
/// classic container libraries.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorCategory {
    /// The caller passed something the container cannot act on.
    InvalidArgument,
    /// The caller asked for something outside the container's contents.
    OutOfRange,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("position belongs to a different container")]
    ForeignPosition,
    #[error("position refers to an erased entry")]
    StalePosition,
    #[error("the end position holds no entry")]
    EndPosition,
    #[error("range end does not follow range start")]
    InvertedRange,
    #[error("max load factor must be finite and at least 1/64, got {0}")]
    BadLoadFactor(f32),
    #[error("key not found")]
    KeyNotFound,
    #[error("cannot step before the first position")]
    BeforeBegin,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ForeignPosition
            | Error::StalePosition
            | Error::EndPosition
            | Error::InvertedRange
            | Error::BadLoadFactor(_) => ErrorCategory::InvalidArgument,
            Error::KeyNotFound | Error::BeforeBegin => ErrorCategory::OutOfRange,
        }
    }
}
