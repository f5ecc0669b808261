//! Unified error type for the library.
//!
//! Each stage reports through its own error type; this module provides a
//! single [`Error`] that wraps them all, so application code can use one
//! error type end to end.

use thiserror::Error;

use crate::decode::DecodeError;
use crate::encode::EncodeError;
use crate::validate::ValidationErrors;

/// Unified error type for all module operations.
///
/// # Example
///
/// ```
/// use wasmod::decode;
///
/// // Four bytes of magic but no version.
/// let err = decode(&[0x00, 0x61, 0x73, 0x6D]).unwrap_err();
/// assert!(err.is_decode());
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The input bytes are not a well-formed binary module.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The module is well-formed but structurally or type invalid.
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// The module holds something the binary format cannot carry.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// A [`Result`] type alias using the unified [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns `true` if this is a decoding error.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    /// Returns `true` if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns `true` if this is an encoding error.
    pub fn is_encode(&self) -> bool {
        matches!(self, Self::Encode(_))
    }

    /// The accumulated validation problems, when this wraps validation.
    pub fn as_validation(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}
