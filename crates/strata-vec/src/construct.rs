//! Multi-field construction with rollback.
//!
//! Rows are built field-major: every row of field 0, then every row of
//! field 1, and so on. [`Fieldwise`] records how far it got; if a step
//! fails or panics it destroys what it built, the interrupted field first
//! and then earlier fields in reverse order. Building a single row this way
//! runs the per-field constructors in declaration order and undoes them in
//! reverse.

#![allow(unsafe_code)]

use std::mem;

use strata_core::{Fields, RawAlloc};

/// Destroy rows `start..end` of every field.
///
/// # Safety
///
/// Those rows must be live in every field and are not used again.
pub(crate) unsafe fn destroy_rows<F: Fields, A: RawAlloc>(
    alloc: &A,
    ptrs: F::Ptrs,
    start: usize,
    end: usize,
) {
    if start >= end {
        return;
    }
    for field in 0..F::COUNT {
        // SAFETY: forwarded caller contract.
        unsafe { F::destroy(alloc, ptrs, field, start, end) };
    }
}

/// Field-major builder for rows `start..end`.
pub(crate) struct Fieldwise<'a, F: Fields, A: RawAlloc> {
    alloc: &'a A,
    ptrs: F::Ptrs,
    start: usize,
    end: usize,
    field: usize,
    next_row: usize,
}

impl<'a, F: Fields, A: RawAlloc> Fieldwise<'a, F, A> {
    /// # Safety
    ///
    /// Rows `start..end` must be in bounds and uninitialised in every field,
    /// and must stay that way except through this builder.
    pub(crate) unsafe fn new(alloc: &'a A, ptrs: F::Ptrs, start: usize, end: usize) -> Self {
        Self {
            alloc,
            ptrs,
            start,
            end,
            field: 0,
            next_row: start,
        }
    }

    /// Run `emit(alloc, ptrs, field, row)` for every element. `emit` must
    /// leave the element initialised when it returns `Ok` and untouched
    /// otherwise. On error everything built so far is destroyed before the
    /// error is returned.
    pub(crate) fn run<E>(
        mut self,
        mut emit: impl FnMut(&A, F::Ptrs, usize, usize) -> Result<(), E>,
    ) -> Result<(), E> {
        for field in 0..F::COUNT {
            self.field = field;
            self.next_row = self.start;
            for row in self.start..self.end {
                emit(self.alloc, self.ptrs, field, row)?;
                self.next_row = row + 1;
            }
        }
        mem::forget(self);
        Ok(())
    }
}

impl<F: Fields, A: RawAlloc> Drop for Fieldwise<'_, F, A> {
    fn drop(&mut self) {
        // SAFETY: exactly these elements were built by `run`.
        unsafe {
            F::destroy(self.alloc, self.ptrs, self.field, self.start, self.next_row);
            for field in (0..self.field).rev() {
                F::destroy(self.alloc, self.ptrs, field, self.start, self.end);
            }
        }
    }
}
