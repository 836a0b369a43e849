//! The structure-of-arrays vector.

#![allow(unsafe_code)]

use std::alloc::{handle_alloc_error, Layout};
use std::fmt;
use std::ops::{Bound, RangeBounds};

use strata_core::{
    CloneFields, ConstructError, DefaultFields, EqFields, FieldVisitor, FieldVisitorMut, Fields,
    Global, IntoRowInit, Propagation, RawAlloc, RowInit, SoaError,
};
use tracing::debug;

use crate::construct::{destroy_rows, Fieldwise};
use crate::iter::{Iter, IterMut};
use crate::raw::RawBlock;

/// A vector of rows stored as one array per field inside a single
/// allocation.
///
/// `F` is a tuple of element types; rows go in and come out as tuples
/// (`(T0, T1, ..)` by value, `(&T0, &T1, ..)` by reference) in declaration
/// order. Physically the arrays are ordered by element size, see
/// [`strata_core::layout`].
///
/// Capacity never grows implicitly: [`push`](Self::push),
/// [`try_emplace`](Self::try_emplace) and [`resize`](Self::resize) require
/// room reserved up front with [`reserve`](Self::reserve). Growing moves
/// every field at once because each array's start depends on the capacity.
///
/// ```
/// use strata_vec::SoaVec;
///
/// let mut particles: SoaVec<(f32, u8)> = SoaVec::with_capacity(2)?;
/// particles.push((1.5, 3));
/// particles.push((-0.5, 7));
///
/// let (mass, kind) = particles.as_slices();
/// assert_eq!(mass, &[1.5, -0.5]);
/// assert_eq!(kind, &[3, 7]);
/// # Ok::<(), strata_core::SoaError>(())
/// ```
pub struct SoaVec<F: Fields, A: RawAlloc = Global> {
    pub(crate) block: RawBlock<F, A>,
}

// SAFETY: a `SoaVec` uniquely owns its rows and allocator, like `Vec<F>`.
unsafe impl<F: Fields + Send, A: RawAlloc + Send> Send for SoaVec<F, A> {}
// SAFETY: shared access only hands out shared references.
unsafe impl<F: Fields + Sync, A: RawAlloc + Sync> Sync for SoaVec<F, A> {}

impl<F: Fields> SoaVec<F> {
    /// An empty vector on the global heap. Does not allocate.
    pub fn new() -> Self {
        Self::new_in(Global)
    }

    /// An empty vector with room for `capacity` rows on the global heap.
    pub fn with_capacity(capacity: usize) -> Result<Self, SoaError> {
        Self::with_capacity_in(capacity, Global)
    }
}

impl<F: Fields, A: RawAlloc> SoaVec<F, A> {
    /// An empty vector using `alloc`. Does not allocate.
    pub fn new_in(alloc: A) -> Self {
        Self {
            block: RawBlock::new_in(alloc),
        }
    }

    /// An empty vector with room for `capacity` rows from `alloc`.
    pub fn with_capacity_in(capacity: usize, alloc: A) -> Result<Self, SoaError> {
        Ok(Self {
            block: RawBlock::with_capacity_in(capacity, alloc)?,
        })
    }

    /// The allocator.
    pub fn allocator(&self) -> &A {
        self.block.allocator()
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.block.len()
    }

    /// Whether there are no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows that fit without reallocating.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.block.capacity()
    }

    /// Make room for at least `capacity` rows in total.
    ///
    /// Does nothing if the capacity already suffices; never shrinks. On
    /// error the vector is unchanged.
    pub fn reserve(&mut self, capacity: usize) -> Result<(), SoaError> {
        if capacity <= self.capacity() {
            return Ok(());
        }
        self.relocate(capacity)
    }

    /// Reallocate to exactly `len()` rows.
    ///
    /// # Panics
    ///
    /// Panics if the vector is empty.
    pub fn shrink_to_fit(&mut self) -> Result<(), SoaError> {
        assert!(!self.is_empty(), "shrink_to_fit on an empty SoaVec");
        self.relocate(self.len())
    }

    fn relocate(&mut self, capacity: usize) -> Result<(), SoaError> {
        let alloc = self.block.allocator().clone();
        let fresh = self.block.move_into(capacity, alloc)?;
        self.block = fresh;
        Ok(())
    }

    /// Append a row.
    ///
    /// # Panics
    ///
    /// Panics if the vector is full. Capacity is never added implicitly.
    pub fn push(&mut self, row: F) {
        assert!(
            self.len() < self.capacity(),
            "push on a full SoaVec (capacity {}); reserve first",
            self.capacity()
        );
        // SAFETY: checked above.
        unsafe { self.push_unchecked(row) }
    }

    /// Append a row if there is room, otherwise hand it back.
    pub fn push_within_capacity(&mut self, row: F) -> Result<(), F> {
        if self.len() == self.capacity() {
            return Err(row);
        }
        // SAFETY: checked above.
        unsafe { self.push_unchecked(row) };
        Ok(())
    }

    /// Append a row without checking capacity.
    ///
    /// # Safety
    ///
    /// `len() < capacity()`.
    pub unsafe fn push_unchecked(&mut self, row: F) {
        let len = self.len();
        debug_assert!(len < self.capacity());
        // SAFETY: row `len` is within capacity and uninitialised.
        unsafe {
            F::write(self.block.allocator(), self.block.ptrs(), len, row);
            self.block.set_len(len + 1);
        }
    }

    /// Append a row built by one constructor per field.
    ///
    /// Constructors run in declaration order. If one fails, the fields
    /// already built for this row are destroyed in reverse order, later
    /// constructors never run, and the error is returned with the vector
    /// unchanged.
    ///
    /// ```
    /// use strata_vec::SoaVec;
    ///
    /// let mut v: SoaVec<(String, u32)> = SoaVec::with_capacity(1)?;
    /// let failed = v.try_emplace((
    ///     || Ok("name".to_string()),
    ///     || "x".parse::<u32>(),
    /// ));
    /// assert_eq!(failed.unwrap_err().field, Some(1));
    /// assert!(v.is_empty());
    /// # Ok::<(), strata_core::SoaError>(())
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the vector is full.
    pub fn try_emplace<I>(&mut self, init: I) -> Result<F::Mut<'_>, ConstructError<I::Error>>
    where
        I: IntoRowInit<F>,
    {
        let len = self.len();
        assert!(
            len < self.capacity(),
            "try_emplace on a full SoaVec (capacity {}); reserve first",
            self.capacity()
        );
        let mut init = init.into_row_init();
        let ptrs = self.block.ptrs();
        // SAFETY: row `len` is within capacity and uninitialised.
        let builder = unsafe { Fieldwise::<F, A>::new(self.block.allocator(), ptrs, len, len + 1) };
        builder.run(|alloc, ptrs, field, row| {
            // SAFETY: the builder visits each uninitialised element once.
            unsafe { init.init_field(alloc, ptrs, field, row) }.map_err(|source| {
                ConstructError {
                    row,
                    field: Some(field),
                    source,
                }
            })
        })?;
        // SAFETY: every field of row `len` is now initialised.
        unsafe {
            self.block.set_len(len + 1);
            Ok(F::row_mut(ptrs, len as isize))
        }
    }

    /// Remove and return the last row.
    pub fn pop(&mut self) -> Option<F> {
        let len = self.len().checked_sub(1)?;
        // SAFETY: row `len` was live; lowering the length gives it up.
        unsafe {
            self.block.set_len(len);
            Some(F::read(self.block.ptrs(), len))
        }
    }

    /// Drop rows from the end until at most `len` remain.
    pub fn truncate(&mut self, len: usize) {
        let old = self.len();
        if len >= old {
            return;
        }
        // SAFETY: rows `len..old` are live; the length is lowered first so a
        // panicking destructor leaks instead of double-dropping.
        unsafe {
            self.block.set_len(len);
            destroy_rows::<F, A>(self.block.allocator(), self.block.ptrs(), len, old);
        }
    }

    /// Drop every row. Capacity is kept.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Remove a contiguous range of rows, closing the gap.
    ///
    /// Returns a cursor positioned at the row that followed the range.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn erase<R: RangeBounds<usize>>(&mut self, range: R) -> IterMut<'_, F> {
        let len = self.len();
        let (start, end) = resolve(range, len);
        let tail = len - end;
        // SAFETY: rows `start..end` are live and dropped once; the tail is
        // moved down over them. The length stays at `start` while
        // destructors run.
        unsafe {
            self.block.set_len(start);
            destroy_rows::<F, A>(self.block.allocator(), self.block.ptrs(), start, end);
            self.block.shift_rows(end, start, tail);
            self.block.set_len(start + tail);
        }
        IterMut::new(self.block.ptrs(), start, start + tail)
    }

    /// Remove one row, closing the gap.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn erase_at(&mut self, index: usize) -> IterMut<'_, F> {
        self.erase(index..=index)
    }

    /// Grow to `len` rows with default values, or truncate.
    ///
    /// New rows are built field by field; a panicking `Default` destroys the
    /// values built so far and leaves the length unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `len > capacity()`.
    pub fn resize(&mut self, len: usize)
    where
        F: DefaultFields,
    {
        let old = self.len();
        if len <= old {
            self.truncate(len);
            return;
        }
        assert!(
            len <= self.capacity(),
            "resize to {len} exceeds capacity {}; reserve first",
            self.capacity()
        );
        let ptrs = self.block.ptrs();
        // SAFETY: rows `old..len` are within capacity and uninitialised.
        let builder = unsafe { Fieldwise::<F, A>::new(self.block.allocator(), ptrs, old, len) };
        let Ok(()) = builder.run::<std::convert::Infallible>(|alloc, ptrs, field, row| {
            // SAFETY: the builder visits each uninitialised element once.
            unsafe { F::default_field(alloc, ptrs, field, row) };
            Ok(())
        });
        // SAFETY: every field of rows `old..len` is initialised.
        unsafe { self.block.set_len(len) };
    }

    /// Append one default-constructed row and borrow it.
    ///
    /// # Panics
    ///
    /// Panics if the vector is full.
    pub fn emplace_default(&mut self) -> F::Mut<'_>
    where
        F: DefaultFields,
    {
        let len = self.len();
        assert!(
            len < self.capacity(),
            "emplace_default on a full SoaVec (capacity {}); reserve first",
            self.capacity()
        );
        self.resize(len + 1);
        // SAFETY: row `len` was just initialised and `&mut self` is exclusive.
        unsafe { F::row_mut(self.block.ptrs(), len as isize) }
    }

    /// Grow to `len` rows built by `make(index)`, or truncate.
    ///
    /// If `make` fails, the rows appended by this call are dropped and the
    /// error is returned.
    ///
    /// # Panics
    ///
    /// Panics if `len > capacity()`.
    pub fn try_resize_with<E>(
        &mut self,
        len: usize,
        mut make: impl FnMut(usize) -> Result<F, E>,
    ) -> Result<(), ConstructError<E>> {
        let old = self.len();
        if len <= old {
            self.truncate(len);
            return Ok(());
        }
        assert!(
            len <= self.capacity(),
            "resize to {len} exceeds capacity {}; reserve first",
            self.capacity()
        );
        for row in old..len {
            match make(row) {
                // SAFETY: `row < len <= capacity`.
                Ok(value) => unsafe { self.push_unchecked(value) },
                Err(source) => {
                    self.truncate(old);
                    return Err(ConstructError {
                        row,
                        field: None,
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Borrow a row, or `None` if out of range.
    #[inline]
    pub fn get(&self, index: usize) -> Option<F::Ref<'_>> {
        if index < self.len() {
            // SAFETY: bounds checked.
            Some(unsafe { F::row(self.block.ptrs(), index as isize) })
        } else {
            None
        }
    }

    /// Mutably borrow a row, or `None` if out of range.
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<F::Mut<'_>> {
        if index < self.len() {
            // SAFETY: bounds checked; `&mut self` is exclusive.
            Some(unsafe { F::row_mut(self.block.ptrs(), index as isize) })
        } else {
            None
        }
    }

    /// Borrow a row, or fail with [`SoaError::OutOfRange`].
    pub fn at(&self, index: usize) -> Result<F::Ref<'_>, SoaError> {
        let len = self.len();
        self.get(index).ok_or(SoaError::OutOfRange { index, len })
    }

    /// Mutably borrow a row, or fail with [`SoaError::OutOfRange`].
    pub fn at_mut(&mut self, index: usize) -> Result<F::Mut<'_>, SoaError> {
        let len = self.len();
        self.get_mut(index).ok_or(SoaError::OutOfRange { index, len })
    }

    /// Borrow a row.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    #[inline]
    pub fn row(&self, index: usize) -> F::Ref<'_> {
        let len = self.len();
        assert!(index < len, "row index {index} out of range for length {len}");
        // SAFETY: bounds checked.
        unsafe { F::row(self.block.ptrs(), index as isize) }
    }

    /// Mutably borrow a row.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    #[inline]
    pub fn row_mut(&mut self, index: usize) -> F::Mut<'_> {
        let len = self.len();
        assert!(index < len, "row index {index} out of range for length {len}");
        // SAFETY: bounds checked; `&mut self` is exclusive.
        unsafe { F::row_mut(self.block.ptrs(), index as isize) }
    }

    /// Borrow a row without bounds checking.
    ///
    /// # Safety
    ///
    /// `index < len()`.
    #[inline]
    pub unsafe fn row_unchecked(&self, index: usize) -> F::Ref<'_> {
        debug_assert!(index < self.len());
        // SAFETY: forwarded caller contract.
        unsafe { F::row(self.block.ptrs(), index as isize) }
    }

    /// The first row.
    pub fn first(&self) -> Option<F::Ref<'_>> {
        self.get(0)
    }

    /// The last row.
    pub fn last(&self) -> Option<F::Ref<'_>> {
        self.get(self.len().checked_sub(1)?)
    }

    /// One slice per field, each `len()` long.
    pub fn as_slices(&self) -> F::Slices<'_> {
        // SAFETY: rows `0..len` are live; pointers are aligned and non-null
        // even without an allocation.
        unsafe { F::slices(self.block.ptrs(), self.len()) }
    }

    /// One mutable slice per field, each `len()` long.
    pub fn as_mut_slices(&mut self) -> F::SlicesMut<'_> {
        // SAFETY: as `as_slices`; `&mut self` is exclusive.
        unsafe { F::slices_mut(self.block.ptrs(), self.len()) }
    }

    /// Hand every field's array to `visitor`, in storage order: largest
    /// element size first, ties in declaration order.
    ///
    /// ```
    /// use strata_core::FieldVisitor;
    /// use strata_vec::SoaVec;
    ///
    /// struct Bytes(Vec<(usize, usize)>);
    ///
    /// impl FieldVisitor for Bytes {
    ///     fn visit<T>(&mut self, field: usize, elements: &[T]) {
    ///         self.0.push((field, std::mem::size_of_val(elements)));
    ///     }
    /// }
    ///
    /// let v: SoaVec<(u8, u64)> = [(1, 10), (2, 20)].into_iter().collect();
    /// let mut bytes = Bytes(Vec::new());
    /// v.visit_fields(&mut bytes);
    /// assert_eq!(bytes.0, vec![(1, 16), (0, 2)]);
    /// ```
    pub fn visit_fields<V: FieldVisitor>(&self, visitor: &mut V) {
        for slot in 0..F::COUNT {
            // SAFETY: rows `0..len` are live and only shared borrows exist.
            unsafe { F::visit_field(self.block.ptrs(), self.len(), F::PLAN.field_of(slot), visitor) }
        }
    }

    /// Hand every field's array to `visitor` in declaration order.
    pub fn visit_fields_declared<V: FieldVisitor>(&self, visitor: &mut V) {
        for field in 0..F::COUNT {
            // SAFETY: as `visit_fields`.
            unsafe { F::visit_field(self.block.ptrs(), self.len(), field, visitor) }
        }
    }

    /// Mutable [`visit_fields`](Self::visit_fields).
    pub fn visit_fields_mut<V: FieldVisitorMut>(&mut self, visitor: &mut V) {
        for slot in 0..F::COUNT {
            // SAFETY: `&mut self` is exclusive and each field is lent once
            // at a time.
            unsafe {
                F::visit_field_mut(self.block.ptrs(), self.len(), F::PLAN.field_of(slot), visitor)
            }
        }
    }

    /// Mutable [`visit_fields_declared`](Self::visit_fields_declared).
    pub fn visit_fields_declared_mut<V: FieldVisitorMut>(&mut self, visitor: &mut V) {
        for field in 0..F::COUNT {
            // SAFETY: as `visit_fields_mut`.
            unsafe { F::visit_field_mut(self.block.ptrs(), self.len(), field, visitor) }
        }
    }

    /// Start of every field's array. Valid for reads of `len()` elements
    /// while the vector is not modified.
    pub fn as_ptrs(&self) -> F::Ptrs {
        self.block.ptrs()
    }

    /// Start of every field's array, for writes through `&mut self`.
    pub fn as_mut_ptrs(&mut self) -> F::Ptrs {
        self.block.ptrs()
    }

    /// Cursor over the rows.
    pub fn iter(&self) -> Iter<'_, F> {
        Iter::new(self.block.ptrs(), 0, self.len())
    }

    /// Cursor over mutable rows.
    pub fn iter_mut(&mut self) -> IterMut<'_, F> {
        IterMut::new(self.block.ptrs(), 0, self.len())
    }

    /// The end sentinel; equal to any exhausted cursor.
    pub fn end(&self) -> Iter<'_, F> {
        Iter::end()
    }

    /// Clone into a new vector on `alloc`, with capacity equal to `len()`.
    pub fn clone_in(&self, alloc: A) -> Result<Self, SoaError>
    where
        F: CloneFields,
    {
        let mut out = Self::with_capacity_in(self.len(), alloc)?;
        // SAFETY: `out` is empty with room for every row of `self`.
        unsafe { out.extend_cloned(self, 0) };
        Ok(out)
    }

    /// Clone using the allocator chosen by [`RawAlloc::select_on_copy`].
    pub fn try_clone(&self) -> Result<Self, SoaError>
    where
        F: CloneFields,
    {
        self.clone_in(self.allocator().select_on_copy())
    }

    /// Clone rows `start..source.len()` into this vector's uninitialised
    /// rows at the same indices.
    ///
    /// # Safety
    ///
    /// `len() == start` and `capacity() >= source.len()`.
    pub(crate) unsafe fn extend_cloned(&mut self, source: &Self, start: usize)
    where
        F: CloneFields,
    {
        let end = source.len();
        let src = source.block.ptrs();
        let dst = self.block.ptrs();
        // SAFETY: forwarded caller contract.
        let builder = unsafe { Fieldwise::<F, A>::new(self.block.allocator(), dst, start, end) };
        let Ok(()) = builder.run::<std::convert::Infallible>(|alloc, dst, field, row| {
            // SAFETY: the source row is live; the destination is not.
            unsafe { F::clone_field(alloc, src, dst, field, row) };
            Ok(())
        });
        // SAFETY: rows `start..end` are now initialised.
        unsafe { self.block.set_len(end) };
    }

    /// Move every row into a new vector that uses `alloc`, leaving this one
    /// empty.
    ///
    /// When `alloc` shares a pool with the current allocator the block is
    /// handed over without touching the rows. Otherwise a block is
    /// allocated from `alloc` and the rows are moved into it; if that
    /// allocation fails this vector is unchanged.
    pub fn relocate_in(&mut self, alloc: A) -> Result<Self, SoaError> {
        let flags = Propagation::of::<A>();
        if flags.equal(self.allocator().same_pool(&alloc)) {
            let mut block = self.block.take();
            // SAFETY: the allocators share a pool.
            unsafe { block.replace_allocator(alloc) };
            return Ok(Self { block });
        }
        debug!(rows = self.len(), "relocating rows into a foreign allocator");
        let block = self.block.move_into(self.len(), alloc)?;
        Ok(Self { block })
    }
}

fn resolve<R: RangeBounds<usize>>(range: R, len: usize) -> (usize, usize) {
    let start = match range.start_bound() {
        Bound::Included(&start) => start,
        Bound::Excluded(&start) => start
            .checked_add(1)
            .unwrap_or_else(|| panic!("erase range start overflows")),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&end) => end
            .checked_add(1)
            .unwrap_or_else(|| panic!("erase range end overflows")),
        Bound::Excluded(&end) => end,
        Bound::Unbounded => len,
    };
    assert!(
        start <= end && end <= len,
        "erase range {start}..{end} out of bounds for length {len}"
    );
    (start, end)
}

/// Panic the way `Vec` does when an infallible entry point cannot allocate.
pub(crate) fn infallible<T>(result: Result<T, SoaError>) -> T {
    match result {
        Ok(value) => value,
        Err(SoaError::AllocationFailed { bytes, align }) => {
            match Layout::from_size_align(bytes, align) {
                Ok(layout) => handle_alloc_error(layout),
                Err(_) => panic!("allocation of {bytes} bytes failed"),
            }
        }
        Err(err) => panic!("{err}"),
    }
}

impl<F: Fields, A: RawAlloc> Drop for SoaVec<F, A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<F: CloneFields, A: RawAlloc> Clone for SoaVec<F, A> {
    fn clone(&self) -> Self {
        infallible(self.try_clone())
    }

    fn clone_from(&mut self, source: &Self) {
        infallible(self.assign_from(source));
    }
}

impl<F: EqFields, A: RawAlloc, B: RawAlloc> PartialEq<SoaVec<F, B>> for SoaVec<F, A> {
    fn eq(&self, other: &SoaVec<F, B>) -> bool {
        let len = self.len();
        if len != other.len() {
            return false;
        }
        let (a, b) = (self.block.ptrs(), other.block.ptrs());
        // SAFETY: both sides hold `len` live rows.
        (0..F::COUNT).all(|field| unsafe { F::field_eq(a, b, field, len) })
    }
}

impl<F: EqFields + Eq, A: RawAlloc> Eq for SoaVec<F, A> {}

impl<F: Fields, A: RawAlloc + Default> Default for SoaVec<F, A> {
    fn default() -> Self {
        Self::new_in(A::default())
    }
}

impl<F: Fields, A: RawAlloc> fmt::Debug for SoaVec<F, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoaVec")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("row_bytes", &F::PLAN.row_bytes())
            .finish()
    }
}

impl<F: Fields> FromIterator<F> for SoaVec<F> {
    fn from_iter<I: IntoIterator<Item = F>>(iter: I) -> Self {
        let rows: Vec<F> = iter.into_iter().collect();
        let mut out = infallible(Self::with_capacity(rows.len()));
        for row in rows {
            // SAFETY: capacity equals the number of rows.
            unsafe { out.push_unchecked(row) };
        }
        out
    }
}

impl<'a, F: Fields + 'a, A: RawAlloc> IntoIterator for &'a SoaVec<F, A> {
    type Item = F::Ref<'a>;
    type IntoIter = Iter<'a, F>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, F: Fields + 'a, A: RawAlloc> IntoIterator for &'a mut SoaVec<F, A> {
    type Item = F::Mut<'a>;
    type IntoIter = IterMut<'a, F>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::Budgeted;
    use strata_test_utils::{Counted, Injected, TrackingAlloc};

    fn numbered(n: u32) -> SoaVec<(u32, u64, u8)> {
        (0..n).map(|i| (i, i as u64 * 100, i as u8)).collect()
    }

    fn firsts(v: &SoaVec<(u32, u64, u8)>) -> Vec<u32> {
        v.as_slices().0.to_vec()
    }

    #[test]
    fn new_does_not_allocate() {
        let alloc = TrackingAlloc::new();
        let v = SoaVec::<(u32, u16), _>::new_in(alloc.clone());
        assert!(v.is_empty());
        assert_eq!(v.capacity(), 0);
        drop(v);
        assert_eq!(alloc.stats().allocations, 0);
    }

    #[test]
    fn reserve_is_exact_and_never_shrinks() {
        let mut v = SoaVec::<(u32, u16)>::new();
        v.reserve(10).unwrap();
        assert_eq!(v.capacity(), 10);
        v.reserve(4).unwrap();
        assert_eq!(v.capacity(), 10);
    }

    #[test]
    fn reserve_preserves_rows() {
        let mut v = numbered(5);
        v.reserve(64).unwrap();
        assert_eq!(v.len(), 5);
        assert_eq!(firsts(&v), vec![0, 1, 2, 3, 4]);
        assert_eq!(v.as_slices().1, &[0, 100, 200, 300, 400]);
    }

    #[test]
    fn shrink_to_fit_matches_len() {
        let mut v = SoaVec::<(u32, u64, u8)>::with_capacity(32).unwrap();
        v.push((1, 2, 3));
        v.shrink_to_fit().unwrap();
        assert_eq!(v.capacity(), 1);
        assert_eq!(v.row(0), (&1, &2, &3));
    }

    #[test]
    #[should_panic(expected = "empty SoaVec")]
    fn shrink_to_fit_on_empty_panics() {
        let mut v = SoaVec::<(u32,)>::with_capacity(4).unwrap();
        let _ = v.shrink_to_fit();
    }

    #[test]
    fn failed_shrink_leaves_vector_unchanged() {
        let alloc = TrackingAlloc::new();
        let mut v = SoaVec::<(u32, String), _>::with_capacity_in(8, alloc.clone()).unwrap();
        v.push((7, "seven".into()));
        let base = v.as_ptrs();

        alloc.refuse_next(1);
        assert!(v.shrink_to_fit().is_err());

        assert_eq!(v.capacity(), 8);
        assert_eq!(v.as_ptrs(), base);
        assert_eq!(v.row(0), (&7, &"seven".to_string()));
        let stats = alloc.stats();
        assert_eq!(stats.refused, 1);
        assert_eq!(stats.deallocations, 0);

        v.shrink_to_fit().unwrap();
        assert_eq!(v.capacity(), 1);
    }

    #[test]
    #[should_panic(expected = "reserve first")]
    fn push_does_not_grow() {
        let mut v = SoaVec::<(u32,)>::with_capacity(1).unwrap();
        v.push((1,));
        v.push((2,));
    }

    #[test]
    fn push_within_capacity_hands_row_back() {
        let mut v = SoaVec::<(u32, u8)>::with_capacity(1).unwrap();
        assert!(v.push_within_capacity((1, 1)).is_ok());
        assert_eq!(v.push_within_capacity((2, 2)), Err((2, 2)));
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn pop_returns_rows_in_reverse() {
        let mut v = numbered(3);
        assert_eq!(v.pop(), Some((2, 200, 2)));
        assert_eq!(v.pop(), Some((1, 100, 1)));
        assert_eq!(v.len(), 1);
        v.clear();
        assert_eq!(v.pop(), None);
    }

    #[test]
    fn checked_access() {
        let v = numbered(2);
        assert_eq!(v.at(1).unwrap(), (&1, &100, &1));
        assert_eq!(v.at(2).unwrap_err(), SoaError::OutOfRange { index: 2, len: 2 });
        assert!(v.get(2).is_none());
        assert_eq!(v.first().map(|r| *r.0), Some(0));
        assert_eq!(v.last().map(|r| *r.0), Some(1));
        assert!(SoaVec::<(u8,)>::new().last().is_none());
    }

    #[test]
    fn row_mut_writes_every_field() {
        let mut v = numbered(2);
        let (a, b, c) = v.row_mut(1);
        *a = 7;
        *b = 8;
        *c = 9;
        assert_eq!(v.row(1), (&7, &8, &9));
        let (a, _, _) = v.at_mut(0).unwrap();
        *a = 42;
        assert_eq!(firsts(&v), vec![42, 7]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn row_out_of_range_panics() {
        let v = numbered(2);
        let _ = v.row(2);
    }

    #[test]
    fn erase_middle_range() {
        let mut v = numbered(6);
        let mut next = v.erase(1..3);
        assert_eq!(next.next().map(|r| *r.0), Some(3));
        assert_eq!(firsts(&v), vec![0, 3, 4, 5]);
        assert_eq!(v.as_slices().1, &[0, 300, 400, 500]);
        assert_eq!(v.as_slices().2, &[0, 3, 4, 5]);
    }

    #[test]
    fn erase_tail_returns_end() {
        let mut v = numbered(4);
        let next = v.erase(2..);
        assert!(next.is_end());
        assert_eq!(firsts(&v), vec![0, 1]);
    }

    #[test]
    fn erase_empty_range_is_noop() {
        let mut v = numbered(3);
        let next = v.erase(1..1);
        assert_eq!(next.len(), 2);
        assert_eq!(v.len(), 3);
    }

    #[test]
    fn erase_at_single_row() {
        let mut v = numbered(3);
        v.erase_at(0);
        assert_eq!(firsts(&v), vec![1, 2]);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn erase_past_end_panics() {
        let mut v = numbered(3);
        v.erase(2..5);
    }

    #[test]
    fn resize_extends_with_defaults_and_shrinks() {
        let mut v = SoaVec::<(u32, String)>::with_capacity(4).unwrap();
        v.push((5, "five".into()));
        v.resize(3);
        assert_eq!(v.as_slices().0, &[5, 0, 0]);
        assert_eq!(v.row(2).1, "");
        v.resize(1);
        assert_eq!(v.len(), 1);
        assert_eq!(v.row(0).1, "five");
    }

    #[test]
    #[should_panic(expected = "exceeds capacity")]
    fn resize_past_capacity_panics() {
        let mut v = SoaVec::<(u32,)>::with_capacity(2).unwrap();
        v.resize(3);
    }

    #[test]
    fn try_resize_with_rolls_back_on_error() {
        Counted::<20>::reset();
        let mut v = SoaVec::<(Counted<20>, u8)>::with_capacity(8).unwrap();
        v.push((Counted::new(0), 0));
        let err = v
            .try_resize_with(6, |i| {
                if i == 4 {
                    Err(Injected::new("row four"))
                } else {
                    Ok((Counted::new(i as u64), i as u8))
                }
            })
            .unwrap_err();
        assert_eq!(err.row, 4);
        assert_eq!(err.field, None);
        assert_eq!(v.len(), 1);
        assert_eq!(Counted::<20>::counts().created, 4);
        assert_eq!(Counted::<20>::counts().dropped, 3);
    }

    #[test]
    fn try_emplace_builds_in_declaration_order() {
        let mut v = SoaVec::<(u8, u64)>::with_capacity(1).unwrap();
        let mut order = Vec::new();
        let row = v
            .try_emplace((
                || {
                    order.push(0);
                    Ok::<_, Injected>(1u8)
                },
                || Ok::<_, Injected>(2u64),
            ))
            .unwrap();
        *row.1 += 1;
        assert_eq!(v.row(0), (&1, &3));
        assert_eq!(order, vec![0]);
    }

    #[test]
    fn clone_gets_exact_capacity() {
        let mut v = numbered(3);
        v.reserve(50).unwrap();
        let c = v.clone();
        assert_eq!(c, v);
        assert_eq!(c.capacity(), 3);
    }

    #[test]
    fn equality_is_field_wise() {
        let a = numbered(4);
        let mut b = numbered(4);
        assert_eq!(a, b);
        *b.row_mut(2).1 = 1;
        assert_ne!(a, b);
        assert_ne!(a, numbered(3));
    }

    #[test]
    fn equality_ignores_capacity_and_allocator() {
        let a = numbered(2);
        let mut b = SoaVec::with_capacity_in(9, TrackingAlloc::new()).unwrap();
        b.push((0, 0, 0));
        b.push((1, 100, 1));
        assert!(a == b);
    }

    #[test]
    fn budget_exhaustion_leaves_vector_unchanged() {
        // (u32, u64, u8) rows are 13 bytes.
        let pool = Budgeted::with_limit(13 * 4).unwrap();
        let mut v = SoaVec::<(u32, u64, u8), _>::with_capacity_in(4, pool.clone()).unwrap();
        v.push((1, 1, 1));
        let err = v.reserve(5).unwrap_err();
        assert!(matches!(err, SoaError::AllocationFailed { bytes: 65, .. }));
        assert_eq!(v.capacity(), 4);
        assert_eq!(v.row(0), (&1, &1, &1));
        assert!(v.try_clone().is_err());
        drop(v);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn relocate_in_same_pool_keeps_block() {
        let alloc = TrackingAlloc::new();
        let mut v = SoaVec::<(u32, u8), _>::with_capacity_in(4, alloc.clone()).unwrap();
        v.push((1, 2));
        let base = v.as_ptrs();
        let moved = v.relocate_in(alloc.clone()).unwrap();
        assert_eq!(moved.as_ptrs(), base);
        assert!(v.is_empty());
        assert_eq!(v.capacity(), 0);
        assert_eq!(alloc.stats().allocations, 1);
    }

    #[test]
    fn relocate_in_foreign_pool_moves_rows() {
        let home = TrackingAlloc::new();
        let away = TrackingAlloc::new();
        let mut v = SoaVec::<(u32, String), _>::with_capacity_in(4, home.clone()).unwrap();
        v.push((1, "one".into()));
        v.push((2, "two".into()));
        let moved = v.relocate_in(away.clone()).unwrap();
        assert!(v.is_empty());
        assert_eq!(moved.row(1), (&2, &"two".to_string()));
        assert_eq!(away.stats().allocations, 1);
        assert_eq!(moved.capacity(), 2);
    }

    #[test]
    fn hooks_see_every_construct_and_destroy() {
        let alloc = TrackingAlloc::new();
        let mut v = SoaVec::<(u32, u16, u8), _>::with_capacity_in(4, alloc.clone()).unwrap();
        v.push((1, 1, 1));
        v.resize(3);
        v.erase_at(1);
        drop(v);
        let stats = alloc.stats();
        assert_eq!(stats.constructs, 9);
        assert_eq!(stats.destroys, 9);
        assert_eq!(stats.live_bytes, 0);
    }

    #[test]
    fn zero_sized_fields_work() {
        let mut v = SoaVec::<((), u32)>::with_capacity(3).unwrap();
        v.push(((), 1));
        v.push(((), 2));
        assert_eq!(v.as_slices().0.len(), 2);
        assert_eq!(v.pop(), Some(((), 2)));
    }

    #[test]
    fn over_aligned_zero_sized_field_works() {
        let mut v = SoaVec::<(u8, [u64; 0])>::with_capacity(5).unwrap();
        v.push((1, []));
        v.push((2, []));
        let (bytes, empty) = v.as_ptrs();
        assert_eq!(empty as usize % 8, 0);
        assert_eq!(bytes as usize % 8, 0);
        assert_eq!(v.as_slices().0, &[1, 2]);
        assert_eq!(v.as_slices().1.len(), 2);
        v.reserve(9).unwrap();
        assert_eq!(v.row(1), (&2, &[]));
    }

    struct Shapes(Vec<(usize, &'static str, usize)>);

    impl FieldVisitor for Shapes {
        fn visit<T>(&mut self, field: usize, elements: &[T]) {
            self.0.push((field, std::any::type_name::<T>(), elements.len()));
        }
    }

    #[test]
    fn visit_fields_follows_storage_order() {
        let v = numbered(3);
        let mut shapes = Shapes(Vec::new());
        v.visit_fields(&mut shapes);
        assert_eq!(shapes.0, vec![(1, "u64", 3), (0, "u32", 3), (2, "u8", 3)]);
    }

    #[test]
    fn visit_fields_declared_follows_declaration_order() {
        let v = numbered(2);
        let mut shapes = Shapes(Vec::new());
        v.visit_fields_declared(&mut shapes);
        assert_eq!(shapes.0, vec![(0, "u32", 2), (1, "u64", 2), (2, "u8", 2)]);
    }

    #[test]
    fn visit_fields_mut_can_reset_every_array() {
        struct Reverse(Vec<usize>);

        impl FieldVisitorMut for Reverse {
            fn visit<T>(&mut self, field: usize, elements: &mut [T]) {
                elements.reverse();
                self.0.push(field);
            }
        }

        let mut v = numbered(3);
        let mut reverse = Reverse(Vec::new());
        v.visit_fields_mut(&mut reverse);
        assert_eq!(reverse.0, vec![1, 0, 2]);
        assert_eq!(v.row(0), (&2, &200, &2));

        reverse.0.clear();
        v.visit_fields_declared_mut(&mut reverse);
        assert_eq!(reverse.0, vec![0, 1, 2]);
        assert_eq!(v.row(0), (&0, &0, &0));
    }

    #[test]
    fn visiting_an_empty_vector_sees_empty_arrays() {
        let v = SoaVec::<(u16, String)>::new();
        let mut shapes = Shapes(Vec::new());
        v.visit_fields(&mut shapes);
        assert_eq!(shapes.0.len(), 2);
        assert!(shapes.0.iter().all(|&(_, _, len)| len == 0));
    }

    #[test]
    fn emplace_default_appends_one_row() {
        Counted::<40>::reset();
        let mut v = SoaVec::<(Counted<40>, String)>::with_capacity(2).unwrap();
        v.push((Counted::new(1), "one".into()));
        let (_, name) = v.emplace_default();
        name.push_str("fresh");
        assert_eq!(v.len(), 2);
        assert_eq!(v.row(1).1, "fresh");
        assert_eq!(Counted::<40>::counts().defaulted, 1);
    }

    #[test]
    #[should_panic(expected = "reserve first")]
    fn emplace_default_does_not_grow() {
        let mut v = SoaVec::<(u32,)>::with_capacity(1).unwrap();
        v.emplace_default();
        v.emplace_default();
    }

    #[test]
    fn debug_reports_shape() {
        let v = numbered(2);
        let text = format!("{v:?}");
        assert!(text.contains("len: 2"));
        assert!(text.contains("row_bytes: 13"));
    }
}
