//! Error types for Strata containers.
//!
//! Organised by origin: the allocator capability ([`AllocError`]),
//! container operations ([`SoaError`]), and per-field construction
//! ([`ConstructError`]).

use std::error::Error;
use std::fmt;

/// The allocator refused a request.
///
/// Carries no detail; the container that issued the request reports the
/// layout in [`SoaError::AllocationFailed`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocError;

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory allocation failed")
    }
}

impl Error for AllocError {}

/// Errors from container operations.
///
/// Every operation that returns one of these leaves the container in the
/// state it had before the call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SoaError {
    /// The allocator refused to provide a block.
    AllocationFailed {
        /// Size of the refused block in bytes.
        bytes: usize,
        /// Alignment of the refused block.
        align: usize,
    },
    /// The requested capacity does not fit in the address space.
    CapacityOverflow {
        /// Requested capacity in rows.
        capacity: usize,
        /// Bytes per row summed over every field.
        row_bytes: usize,
    },
    /// A checked accessor was given an index past the logical end.
    OutOfRange {
        /// The offending index.
        index: usize,
        /// Logical size at the time of the call.
        len: usize,
    },
    /// An allocator configuration was rejected by validation.
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}

impl fmt::Display for SoaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailed { bytes, align } => {
                write!(f, "allocation of {bytes} bytes (align {align}) failed")
            }
            Self::CapacityOverflow {
                capacity,
                row_bytes,
            } => {
                write!(
                    f,
                    "capacity overflow: {capacity} rows of {row_bytes} bytes exceed the address space"
                )
            }
            Self::OutOfRange { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid allocator configuration: {reason}")
            }
        }
    }
}

impl Error for SoaError {}

/// A field constructor failed while building a row.
///
/// By the time this is returned every element built for the failed
/// operation has been destroyed again, and the container's size is
/// unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstructError<E> {
    /// Row that was being built.
    pub row: usize,
    /// Declared index of the failing field, when construction was per field.
    pub field: Option<usize>,
    /// The constructor's error.
    pub source: E,
}

impl<E> ConstructError<E> {
    /// Unwrap the constructor's error, discarding the position.
    pub fn into_source(self) -> E {
        self.source
    }
}

impl<E: fmt::Display> fmt::Display for ConstructError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field {
            Some(field) => write!(
                f,
                "constructing field {field} of row {} failed: {}",
                self.row, self.source
            ),
            None => write!(f, "constructing row {} failed: {}", self.row, self.source),
        }
    }
}

impl<E: Error + 'static> Error for ConstructError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}
