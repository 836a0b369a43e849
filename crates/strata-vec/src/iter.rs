//! Row cursors.
//!
//! A cursor stores one pointer per field, each aimed one past the last row
//! it will visit, and a single signed offset counting up from `-remaining`
//! to zero. Dereferencing reads every field at `end[offset]`, so advancing
//! touches one integer no matter how many fields there are. An exhausted
//! cursor has offset zero and compares equal to the stateless sentinel
//! returned by [`Iter::end`].

#![allow(unsafe_code)]

use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ptr;

use strata_core::Fields;

/// Cursor over shared rows.
pub struct Iter<'a, F: Fields> {
    ends: F::Ptrs,
    offset: isize,
    _marker: PhantomData<&'a F>,
}

impl<'a, F: Fields> Iter<'a, F> {
    /// Cursor over rows `start..end` of the arrays at `ptrs`.
    pub(crate) fn new(ptrs: F::Ptrs, start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self {
            ends: F::offset(ptrs, end as isize),
            offset: start as isize - end as isize,
            _marker: PhantomData,
        }
    }

    /// The sentinel: already exhausted and tied to no container.
    pub fn end() -> Self {
        Self {
            ends: F::ptrs(ptr::null_mut(), 0),
            offset: 0,
            _marker: PhantomData,
        }
    }

    /// Whether every row has been visited.
    pub fn is_end(&self) -> bool {
        self.offset == 0
    }
}

impl<'a, F: Fields + 'a> Iterator for Iter<'a, F> {
    type Item = F::Ref<'a>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.offset == 0 {
            return None;
        }
        // SAFETY: offsets in `-remaining..0` address live rows below `ends`,
        // borrowed shared for `'a`.
        let row = unsafe { F::row(self.ends, self.offset) };
        self.offset += 1;
        Some(row)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.offset.unsigned_abs();
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        if n >= self.offset.unsigned_abs() {
            self.offset = 0;
            return None;
        }
        self.offset += n as isize;
        self.next()
    }
}

impl<'a, F: Fields + 'a> ExactSizeIterator for Iter<'a, F> {}

impl<'a, F: Fields + 'a> FusedIterator for Iter<'a, F> {}

impl<F: Fields> Clone for Iter<'_, F> {
    fn clone(&self) -> Self {
        Self {
            ends: self.ends,
            offset: self.offset,
            _marker: PhantomData,
        }
    }
}

impl<F: Fields> PartialEq for Iter<'_, F> {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset && (self.offset == 0 || self.ends == other.ends)
    }
}

impl<F: Fields> Eq for Iter<'_, F> {}

impl<F: Fields> fmt::Debug for Iter<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("remaining", &self.offset.unsigned_abs())
            .finish()
    }
}

// SAFETY: an `Iter` only hands out shared references to rows.
unsafe impl<F: Fields + Sync> Send for Iter<'_, F> {}
// SAFETY: as above.
unsafe impl<F: Fields + Sync> Sync for Iter<'_, F> {}

/// Cursor over mutable rows.
pub struct IterMut<'a, F: Fields> {
    ends: F::Ptrs,
    offset: isize,
    _marker: PhantomData<&'a mut F>,
}

impl<'a, F: Fields> IterMut<'a, F> {
    pub(crate) fn new(ptrs: F::Ptrs, start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self {
            ends: F::offset(ptrs, end as isize),
            offset: start as isize - end as isize,
            _marker: PhantomData,
        }
    }

    /// The sentinel: already exhausted and tied to no container.
    pub fn end() -> Self {
        Self {
            ends: F::ptrs(ptr::null_mut(), 0),
            offset: 0,
            _marker: PhantomData,
        }
    }

    /// Whether every row has been visited.
    pub fn is_end(&self) -> bool {
        self.offset == 0
    }

    /// Reborrow the remaining rows as a shared cursor.
    pub fn as_iter(&self) -> Iter<'_, F> {
        Iter {
            ends: self.ends,
            offset: self.offset,
            _marker: PhantomData,
        }
    }
}

impl<'a, F: Fields + 'a> Iterator for IterMut<'a, F> {
    type Item = F::Mut<'a>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.offset == 0 {
            return None;
        }
        // SAFETY: each live row is handed out once, and the cursor holds the
        // container's exclusive borrow for `'a`.
        let row = unsafe { F::row_mut(self.ends, self.offset) };
        self.offset += 1;
        Some(row)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.offset.unsigned_abs();
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        if n >= self.offset.unsigned_abs() {
            self.offset = 0;
            return None;
        }
        self.offset += n as isize;
        self.next()
    }
}

impl<'a, F: Fields + 'a> ExactSizeIterator for IterMut<'a, F> {}

impl<'a, F: Fields + 'a> FusedIterator for IterMut<'a, F> {}

impl<F: Fields> PartialEq for IterMut<'_, F> {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset && (self.offset == 0 || self.ends == other.ends)
    }
}

impl<F: Fields> Eq for IterMut<'_, F> {}

impl<F: Fields> fmt::Debug for IterMut<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterMut")
            .field("remaining", &self.offset.unsigned_abs())
            .finish()
    }
}

// SAFETY: an `IterMut` hands out unique references, like `&mut [F]`.
unsafe impl<F: Fields + Send> Send for IterMut<'_, F> {}
// SAFETY: shared access to the cursor exposes no rows.
unsafe impl<F: Fields + Sync> Sync for IterMut<'_, F> {}
