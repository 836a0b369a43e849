//! Reinterpreting a vector's storage under another field list.
//!
//! Two field lists can share storage when their arrays line up slot for
//! slot: the same number of fields, the same element size in every slot,
//! and no stricter alignment. Equal-size fields are matched in declaration
//! order on both sides. The check is made at compile time; a view between
//! incompatible lists fails to build.
//!
//! A view borrows the vector, so the vector cannot grow, shrink or be
//! dropped while the view is alive. Views never run destructors.

#![allow(unsafe_code)]

use std::marker::PhantomData;

use strata_core::{Fields, RawAlloc};

use crate::iter::{Iter, IterMut};
use crate::vec::SoaVec;

impl<F: Fields, A: RawAlloc> SoaVec<F, A> {
    /// View the rows as field list `G`.
    ///
    /// ```
    /// use strata_vec::SoaVec;
    ///
    /// let mut v: SoaVec<(f32, u16)> = SoaVec::with_capacity(1)?;
    /// v.push((1.0, 7));
    /// // SAFETY: every bit pattern is a valid `u32` and `i16`.
    /// let bits = unsafe { v.cast::<(u32, i16)>() };
    /// assert_eq!(bits.row(0), (&0x3f80_0000, &7));
    /// # Ok::<(), strata_core::SoaError>(())
    /// ```
    ///
    /// Lists whose sorted sizes differ are rejected when the call is
    /// compiled:
    ///
    /// ```compile_fail
    /// use strata_vec::SoaVec;
    ///
    /// let v: SoaVec<(u32, u16)> = SoaVec::new();
    /// let _ = unsafe { v.cast::<(u32, u32)>() };
    /// ```
    ///
    /// # Safety
    ///
    /// Every live value of each source field must be a valid value of the
    /// target field it is matched with.
    pub unsafe fn cast<G: Fields>(&self) -> CastView<'_, G> {
        const { assert!(F::PLAN.can_alias(&G::PLAN), "field lists are not layout-compatible") };
        CastView {
            ptrs: G::ptrs(self.block.base(), self.capacity()),
            len: self.len(),
            _marker: PhantomData,
        }
    }

    /// View the rows as field list `G`, with write access.
    ///
    /// # Safety
    ///
    /// As [`cast`](Self::cast), in both directions: every value written
    /// through the view must also be a valid value of the source field.
    pub unsafe fn cast_mut<G: Fields>(&mut self) -> CastViewMut<'_, G> {
        const { assert!(F::PLAN.can_alias(&G::PLAN), "field lists are not layout-compatible") };
        CastViewMut {
            ptrs: G::ptrs(self.block.base(), self.capacity()),
            len: self.len(),
            _marker: PhantomData,
        }
    }
}

/// Shared view of a vector's rows under another field list.
pub struct CastView<'a, G: Fields> {
    ptrs: G::Ptrs,
    len: usize,
    _marker: PhantomData<&'a G>,
}

impl<'a, G: Fields + 'a> CastView<'a, G> {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow a row, or `None` if out of range.
    pub fn get(&self, index: usize) -> Option<G::Ref<'a>> {
        // SAFETY: bounds checked; the view holds a shared borrow for `'a`.
        (index < self.len).then(|| unsafe { G::row(self.ptrs, index as isize) })
    }

    /// Borrow a row.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn row(&self, index: usize) -> G::Ref<'a> {
        let len = self.len;
        assert!(index < len, "row index {index} out of range for length {len}");
        // SAFETY: bounds checked.
        unsafe { G::row(self.ptrs, index as isize) }
    }

    /// Cursor over the rows.
    pub fn iter(&self) -> Iter<'a, G> {
        Iter::new(self.ptrs, 0, self.len)
    }

    /// One slice per field.
    pub fn as_slices(&self) -> G::Slices<'a> {
        // SAFETY: rows `0..len` are live and pointers aligned.
        unsafe { G::slices(self.ptrs, self.len) }
    }
}

impl<G: Fields> Clone for CastView<'_, G> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<G: Fields> Copy for CastView<'_, G> {}

// SAFETY: a `CastView` only hands out shared references.
unsafe impl<G: Fields + Sync> Send for CastView<'_, G> {}
// SAFETY: as above.
unsafe impl<G: Fields + Sync> Sync for CastView<'_, G> {}

/// Mutable view of a vector's rows under another field list.
pub struct CastViewMut<'a, G: Fields> {
    ptrs: G::Ptrs,
    len: usize,
    _marker: PhantomData<&'a mut G>,
}

impl<'a, G: Fields + 'a> CastViewMut<'a, G> {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow a row, or `None` if out of range.
    pub fn get(&self, index: usize) -> Option<G::Ref<'_>> {
        // SAFETY: bounds checked; `&self` prevents concurrent writes.
        (index < self.len).then(|| unsafe { G::row(self.ptrs, index as isize) })
    }

    /// Mutably borrow a row, or `None` if out of range.
    pub fn get_mut(&mut self, index: usize) -> Option<G::Mut<'_>> {
        // SAFETY: bounds checked; `&mut self` is exclusive.
        (index < self.len).then(|| unsafe { G::row_mut(self.ptrs, index as isize) })
    }

    /// Borrow a row.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn row(&self, index: usize) -> G::Ref<'_> {
        let len = self.len;
        assert!(index < len, "row index {index} out of range for length {len}");
        // SAFETY: bounds checked.
        unsafe { G::row(self.ptrs, index as isize) }
    }

    /// Mutably borrow a row.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn row_mut(&mut self, index: usize) -> G::Mut<'_> {
        let len = self.len;
        assert!(index < len, "row index {index} out of range for length {len}");
        // SAFETY: bounds checked; `&mut self` is exclusive.
        unsafe { G::row_mut(self.ptrs, index as isize) }
    }

    /// Cursor over the rows.
    pub fn iter(&self) -> Iter<'_, G> {
        Iter::new(self.ptrs, 0, self.len)
    }

    /// Cursor over mutable rows.
    pub fn iter_mut(&mut self) -> IterMut<'_, G> {
        IterMut::new(self.ptrs, 0, self.len)
    }

    /// One slice per field.
    pub fn as_slices(&self) -> G::Slices<'_> {
        // SAFETY: rows `0..len` are live and pointers aligned.
        unsafe { G::slices(self.ptrs, self.len) }
    }

    /// One mutable slice per field.
    pub fn as_mut_slices(&mut self) -> G::SlicesMut<'_> {
        // SAFETY: as `as_slices`; `&mut self` is exclusive.
        unsafe { G::slices_mut(self.ptrs, self.len) }
    }
}

// SAFETY: a `CastViewMut` behaves like `&mut [G]`.
unsafe impl<G: Fields + Send> Send for CastViewMut<'_, G> {}
// SAFETY: shared access only hands out shared references.
unsafe impl<G: Fields + Sync> Sync for CastViewMut<'_, G> {}

#[cfg(test)]
mod tests {
    use crate::SoaVec;

    #[test]
    fn same_types_reordered() {
        let mut v = SoaVec::<(u16, u64)>::with_capacity(3).unwrap();
        v.push((1, 10));
        v.push((2, 20));
        // SAFETY: identical types, listed in a different order.
        let view = unsafe { v.cast::<(u64, u16)>() };
        assert_eq!(view.len(), 2);
        assert_eq!(view.row(1), (&20, &2));
        assert_eq!(view.as_slices().0, &[10, 20]);
    }

    #[test]
    fn float_bits_round_trip() {
        let values = [1.5f64, -0.0, f64::INFINITY, 3.25e-300];
        let v: SoaVec<(f64, f32)> = values.iter().map(|&x| (x, x as f32)).collect();
        // SAFETY: every bit pattern is a valid integer.
        let bits = unsafe { v.cast::<(u64, u32)>() };
        for (i, (wide, narrow)) in bits.iter().enumerate() {
            assert_eq!(*wide, values[i].to_bits());
            assert_eq!(*narrow, (values[i] as f32).to_bits());
        }
    }

    #[test]
    fn equal_sizes_match_in_declaration_order() {
        let mut v = SoaVec::<(u32, i32, u8)>::with_capacity(1).unwrap();
        v.push((7, -1, 3));
        // SAFETY: integers of equal width.
        let view = unsafe { v.cast::<(i32, u32, i8)>() };
        assert_eq!(view.row(0), (&7, &u32::MAX, &3));
    }

    #[test]
    fn mutable_view_writes_through() {
        let mut v = SoaVec::<(u32, u8)>::with_capacity(2).unwrap();
        v.push((0, 0));
        v.push((0, 0));
        {
            // SAFETY: integers of equal width in both directions.
            let mut view = unsafe { v.cast_mut::<(i32, i8)>() };
            *view.row_mut(1).0 = -1;
            for (_, b) in view.iter_mut() {
                *b = -2;
            }
            assert_eq!(view.get(1).map(|r| *r.0), Some(-1));
        }
        assert_eq!(v.as_slices().0, &[0, u32::MAX]);
        assert_eq!(v.as_slices().1, &[254, 254]);
    }

    #[test]
    fn empty_vector_yields_empty_view() {
        let v = SoaVec::<(u64,)>::new();
        // SAFETY: same width integers.
        let view = unsafe { v.cast::<(i64,)>() };
        assert!(view.is_empty());
        assert!(view.get(0).is_none());
        assert_eq!(view.as_slices().0.len(), 0);
    }
}
