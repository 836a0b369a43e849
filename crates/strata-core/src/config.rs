//! Allocator configuration parameters.

use crate::error::SoaError;

/// Configuration for the [`Budgeted`](crate::allocator::Budgeted) allocator.
///
/// Validated when the allocator is created; immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocConfig {
    /// Upper bound on bytes held by one pool at a time.
    ///
    /// Default: `None` (unbounded). Allocations that would exceed the
    /// limit are refused.
    pub byte_limit: Option<usize>,

    /// Minimum alignment applied to every block.
    ///
    /// Default: 1. Must be a power of two.
    pub min_align: usize,
}

impl AllocConfig {
    /// Default byte limit: unbounded.
    pub const DEFAULT_BYTE_LIMIT: Option<usize> = None;

    /// Default minimum alignment.
    pub const DEFAULT_MIN_ALIGN: usize = 1;

    /// Create a config with default values.
    pub fn new() -> Self {
        Self {
            byte_limit: Self::DEFAULT_BYTE_LIMIT,
            min_align: Self::DEFAULT_MIN_ALIGN,
        }
    }

    /// Set the byte limit.
    pub fn with_byte_limit(mut self, bytes: usize) -> Self {
        self.byte_limit = Some(bytes);
        self
    }

    /// Set the minimum block alignment.
    pub fn with_min_align(mut self, align: usize) -> Self {
        self.min_align = align;
        self
    }

    /// Check the configuration for values no allocator can honour.
    pub fn validate(&self) -> Result<(), SoaError> {
        if !self.min_align.is_power_of_two() {
            return Err(SoaError::InvalidConfig {
                reason: format!("min_align {} is not a power of two", self.min_align),
            });
        }
        if self.min_align > isize::MAX as usize / 2 + 1 {
            return Err(SoaError::InvalidConfig {
                reason: format!("min_align {} exceeds the largest alignment", self.min_align),
            });
        }
        if let Some(limit) = self.byte_limit {
            if limit > isize::MAX as usize {
                return Err(SoaError::InvalidConfig {
                    reason: format!("byte_limit {limit} exceeds isize::MAX"),
                });
            }
        }
        Ok(())
    }
}

impl Default for AllocConfig {
    fn default() -> Self {
        Self::new()
    }
}
