//! The raw storage block behind a container.
//!
//! A block owns one allocation of `capacity * row_bytes` bytes and records
//! how many rows are live. It moves element bytes during relocation and
//! erase but never constructs, clones or drops an element; that is the
//! container's job.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};

use strata_core::allocator::dangling;
use strata_core::{Fields, RawAlloc, SoaError};
use tracing::{debug, trace};

pub(crate) struct RawBlock<F: Fields, A: RawAlloc> {
    ptr: NonNull<u8>,
    len: usize,
    cap: usize,
    alloc: A,
    _fields: PhantomData<F>,
}

impl<F: Fields, A: RawAlloc> RawBlock<F, A> {
    /// An empty block. Never allocates.
    pub(crate) fn new_in(alloc: A) -> Self {
        Self {
            ptr: dangling(F::PLAN.align()),
            len: 0,
            cap: 0,
            alloc,
            _fields: PhantomData,
        }
    }

    pub(crate) fn with_capacity_in(capacity: usize, alloc: A) -> Result<Self, SoaError> {
        let ptr = Self::allocate(&alloc, capacity)?;
        Ok(Self {
            ptr,
            len: 0,
            cap: capacity,
            alloc,
            _fields: PhantomData,
        })
    }

    fn layout(capacity: usize) -> Result<Layout, SoaError> {
        let plan = F::PLAN;
        let overflow = SoaError::CapacityOverflow {
            capacity,
            row_bytes: plan.row_bytes(),
        };
        let bytes = plan.block_bytes(capacity).ok_or_else(|| overflow.clone())?;
        Layout::from_size_align(bytes, plan.align()).map_err(|_| overflow)
    }

    fn allocate(alloc: &A, capacity: usize) -> Result<NonNull<u8>, SoaError> {
        let layout = Self::layout(capacity)?;
        if layout.size() == 0 {
            return Ok(dangling(layout.align()));
        }
        match alloc.allocate(layout) {
            Ok(ptr) => {
                trace!(capacity, bytes = layout.size(), "soa block allocated");
                Ok(ptr)
            }
            Err(_) => {
                debug!(capacity, bytes = layout.size(), "soa block allocation refused");
                Err(SoaError::AllocationFailed {
                    bytes: layout.size(),
                    align: layout.align(),
                })
            }
        }
    }

    fn allocated_layout(&self) -> Option<Layout> {
        Self::layout(self.cap).ok().filter(|layout| layout.size() != 0)
    }

    #[inline]
    pub(crate) fn ptrs(&self) -> F::Ptrs {
        F::ptrs(self.ptr.as_ptr(), self.cap)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.cap
    }

    #[inline]
    pub(crate) fn allocator(&self) -> &A {
        &self.alloc
    }

    #[inline]
    pub(crate) fn base(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// # Safety
    ///
    /// `len <= capacity`, and rows `0..len` must be live in every field.
    #[inline]
    pub(crate) unsafe fn set_len(&mut self, len: usize) {
        debug_assert!(len <= self.cap);
        self.len = len;
    }

    /// Swap in another allocator, returning the old one.
    ///
    /// # Safety
    ///
    /// `alloc` must share a pool with the current allocator.
    pub(crate) unsafe fn replace_allocator(&mut self, alloc: A) -> A {
        mem::replace(&mut self.alloc, alloc)
    }

    /// Move the live rows into a fresh block of `capacity` rows from
    /// `alloc`. On success this block is left empty with its storage
    /// intact; on failure nothing changes.
    pub(crate) fn move_into(&mut self, capacity: usize, alloc: A) -> Result<Self, SoaError> {
        debug_assert!(capacity >= self.len);
        let mut fresh = Self::with_capacity_in(capacity, alloc)?;
        // SAFETY: the fresh block is empty and has room for every live row.
        unsafe { fresh.absorb(self) };
        if fresh.len != 0 {
            debug!(rows = fresh.len, from = self.cap, to = capacity, "soa block relocated");
        }
        Ok(fresh)
    }

    /// Move every live row of `other` into this block, leaving `other`
    /// empty with its storage intact.
    ///
    /// # Safety
    ///
    /// This block must be empty, distinct from `other`, and have capacity
    /// for `other.len()` rows.
    pub(crate) unsafe fn absorb(&mut self, other: &mut Self) {
        debug_assert!(self.len == 0 && self.cap >= other.len);
        // SAFETY: forwarded caller contract; the moved rows are forgotten in
        // `other` by zeroing its length.
        unsafe { copy_rows::<F>(other.base(), other.cap, self.base(), self.cap, other.len) };
        self.len = other.len;
        other.len = 0;
    }

    /// Move rows `from..from + count` down to start at `to`, field by field.
    ///
    /// # Safety
    ///
    /// Both ranges must lie within capacity. Rows in the source range become
    /// logically uninitialised and rows previously in the destination range
    /// are overwritten without being dropped.
    pub(crate) unsafe fn shift_rows(&mut self, from: usize, to: usize, count: usize) {
        for field in 0..F::COUNT {
            let size = F::PLAN.size(field);
            if size == 0 || count == 0 {
                continue;
            }
            let start = F::PLAN.field_start(field, self.cap);
            // SAFETY: both ranges are within this field's array.
            unsafe {
                let array = self.base().add(start);
                ptr::copy(array.add(from * size), array.add(to * size), count * size);
            }
        }
    }

    /// Hand over the storage, leaving an empty block with a clone of the
    /// allocator.
    pub(crate) fn take(&mut self) -> Self {
        let empty = Self::new_in(self.alloc.clone());
        mem::replace(self, empty)
    }

    /// Exchange storage but not allocators.
    pub(crate) fn swap_storage(&mut self, other: &mut Self) {
        mem::swap(&mut self.ptr, &mut other.ptr);
        mem::swap(&mut self.len, &mut other.len);
        mem::swap(&mut self.cap, &mut other.cap);
    }
}

impl<F: Fields, A: RawAlloc> Drop for RawBlock<F, A> {
    fn drop(&mut self) {
        if let Some(layout) = self.allocated_layout() {
            // SAFETY: the block was allocated with this layout by an allocator
            // sharing a pool with `self.alloc`.
            unsafe { self.alloc.deallocate(self.ptr, layout) };
            trace!(capacity = self.cap, bytes = layout.size(), "soa block released");
        }
    }
}

/// Copy `len` rows of every field between blocks of different capacity.
///
/// # Safety
///
/// Both blocks must have room for `len` rows and must not overlap.
unsafe fn copy_rows<F: Fields>(
    src: *const u8,
    src_cap: usize,
    dst: *mut u8,
    dst_cap: usize,
    len: usize,
) {
    for field in 0..F::COUNT {
        let size = F::PLAN.size(field);
        if size == 0 || len == 0 {
            continue;
        }
        // SAFETY: each field array holds at least `len` elements in both
        // blocks.
        unsafe {
            ptr::copy_nonoverlapping(
                src.add(F::PLAN.field_start(field, src_cap)),
                dst.add(F::PLAN.field_start(field, dst_cap)),
                len * size,
            );
        }
    }
}
