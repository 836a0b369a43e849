//! The allocator capability consumed by Strata containers.
//!
//! A container needs four things from its allocator: raw blocks sized and
//! aligned by [`Layout`], hooks that construct and destroy single elements,
//! a copy of itself for a cloned container, and four flags that drive the
//! copy/move/swap decisions in [`propagation`](crate::propagation).
//!
//! Two allocators are provided: [`Global`] (the process heap, zero-sized)
//! and [`Budgeted`] (a shared byte budget configured by [`AllocConfig`]).

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::AllocConfig;
use crate::error::{AllocError, SoaError};

/// An allocator usable by Strata containers.
///
/// # Safety
///
/// Implementors guarantee that a block returned by [`allocate`] is valid
/// for reads and writes of `layout.size()` bytes, is aligned to
/// `layout.align()`, and stays valid until passed to [`deallocate`] on this
/// instance or on any instance for which [`same_pool`] returns `true`.
/// Every clone of an allocator must share its pool.
///
/// [`allocate`]: RawAlloc::allocate
/// [`deallocate`]: RawAlloc::deallocate
/// [`same_pool`]: RawAlloc::same_pool
pub unsafe trait RawAlloc: Clone {
    /// Copy-assignment adopts the source container's allocator.
    const PROPAGATE_ON_COPY: bool = false;
    /// Move-assignment adopts the source container's allocator.
    const PROPAGATE_ON_MOVE: bool = false;
    /// Swapping containers swaps their allocators.
    const PROPAGATE_ON_SWAP: bool = false;
    /// Every instance shares one pool; identity is never compared.
    const ALWAYS_EQUAL: bool = false;

    /// Allocate a block for `layout`.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Release a block.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`allocate`](RawAlloc::allocate) on an instance
    /// sharing this pool, called with the same `layout`, and must not have
    /// been released already.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Whether blocks from `other` may be released through `self`.
    fn same_pool(&self, other: &Self) -> bool;

    /// The allocator a cloned container should use.
    fn select_on_copy(&self) -> Self {
        self.clone()
    }

    /// Move `value` into uninitialised memory.
    ///
    /// # Safety
    ///
    /// `slot` must be valid for a write of `T` and properly aligned.
    unsafe fn construct<T>(&self, slot: *mut T, value: T) {
        // SAFETY: forwarded caller contract.
        unsafe { slot.write(value) }
    }

    /// Drop the value at `slot` in place.
    ///
    /// # Safety
    ///
    /// `slot` must hold a live `T` that is not used again.
    unsafe fn destroy<T>(&self, slot: *mut T) {
        // SAFETY: forwarded caller contract.
        unsafe { ptr::drop_in_place(slot) }
    }
}

/// A well-aligned, non-null pointer for zero-byte blocks.
pub fn dangling(align: usize) -> NonNull<u8> {
    NonNull::new(ptr::without_provenance_mut(align)).unwrap_or(NonNull::dangling())
}

/// The process heap.
///
/// Zero-sized, always equal, and carried along on move-assignment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Global;

// SAFETY: blocks come from the global allocator, which is one pool.
unsafe impl RawAlloc for Global {
    const PROPAGATE_ON_MOVE: bool = true;
    const ALWAYS_EQUAL: bool = true;

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Ok(dangling(layout.align()));
        }
        // SAFETY: the layout has a non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            // SAFETY: the caller passes a live block allocated with `layout`.
            unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
        }
    }

    fn same_pool(&self, _other: &Self) -> bool {
        true
    }
}

#[derive(Debug)]
struct Pool {
    config: AllocConfig,
    in_use: AtomicUsize,
}

/// A heap allocator that enforces a byte budget.
///
/// Clones share one pool and one budget. Distinct pools are never equal
/// and no propagation flag is set, so containers never exchange storage
/// across pools.
#[derive(Clone, Debug)]
pub struct Budgeted {
    pool: Arc<Pool>,
}

impl Budgeted {
    /// Create a pool with the given configuration.
    pub fn new(config: AllocConfig) -> Result<Self, SoaError> {
        config.validate()?;
        Ok(Self {
            pool: Arc::new(Pool {
                config,
                in_use: AtomicUsize::new(0),
            }),
        })
    }

    /// Create a pool with a byte limit and default alignment.
    pub fn with_limit(bytes: usize) -> Result<Self, SoaError> {
        Self::new(AllocConfig::new().with_byte_limit(bytes))
    }

    /// The pool's configuration.
    pub fn config(&self) -> &AllocConfig {
        &self.pool.config
    }

    /// Bytes currently allocated from the pool.
    pub fn in_use(&self) -> usize {
        self.pool.in_use.load(Ordering::Acquire)
    }

    /// Bytes left before the limit, or `None` when unbounded.
    pub fn remaining(&self) -> Option<usize> {
        self.pool
            .config
            .byte_limit
            .map(|limit| limit.saturating_sub(self.in_use()))
    }

    fn effective(&self, layout: Layout) -> Result<Layout, AllocError> {
        layout
            .align_to(self.pool.config.min_align)
            .map_err(|_| AllocError)
    }
}

// SAFETY: blocks come from the global allocator; the pool only does
// bookkeeping, and clones share it through the `Arc`.
unsafe impl RawAlloc for Budgeted {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let layout = self.effective(layout)?;
        let bytes = layout.size();
        let limit = self.pool.config.byte_limit;
        let reserved = self
            .pool
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                let next = used.checked_add(bytes)?;
                match limit {
                    Some(limit) if next > limit => None,
                    _ => Some(next),
                }
            });
        if let Err(used) = reserved {
            debug!(bytes, used, ?limit, "budgeted allocation refused");
            return Err(AllocError);
        }
        match Global.allocate(layout) {
            Ok(ptr) => {
                trace!(bytes, align = layout.align(), "budgeted block allocated");
                Ok(ptr)
            }
            Err(err) => {
                self.pool.in_use.fetch_sub(bytes, Ordering::AcqRel);
                Err(err)
            }
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // Cannot fail: the same adjustment succeeded in `allocate`.
        let Ok(layout) = self.effective(layout) else {
            return;
        };
        // SAFETY: the block came from `Global` with this adjusted layout.
        unsafe { Global.deallocate(ptr, layout) };
        self.pool.in_use.fetch_sub(layout.size(), Ordering::AcqRel);
        trace!(bytes = layout.size(), "budgeted block released");
    }

    fn same_pool(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pool, &other.pool)
    }
}
