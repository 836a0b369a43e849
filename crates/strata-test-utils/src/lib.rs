//! Test utilities and mock allocators for Strata development.
//!
//! Provides instrumented element types ([`fixtures`]) and two allocators
//! implementing [`RawAlloc`]:
//!
//! - [`TrackingAlloc`] counts allocations and construct/destroy hooks and
//!   can be told to refuse the next request.
//! - [`FlagAlloc`] carries its four propagation flags as const generics and
//!   checks that every block returns to the pool it came from.

#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod fixtures;

pub use fixtures::{Counted, Counts, Injected};

use std::alloc::Layout;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;
use std::rc::Rc;

use strata_core::{AllocError, Global, RawAlloc};

/// Totals recorded by [`TrackingAlloc`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocStats {
    pub allocations: usize,
    pub deallocations: usize,
    pub refused: usize,
    pub constructs: usize,
    pub destroys: usize,
    pub live_bytes: usize,
}

#[derive(Debug, Default)]
struct Tracker {
    stats: Cell<AllocStats>,
    refuse_next: Cell<usize>,
}

impl Tracker {
    fn update(&self, f: impl FnOnce(&mut AllocStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

/// A heap allocator that records what containers ask of it.
///
/// Clones share one set of counters and count as the same pool. No
/// propagation flag is set.
#[derive(Clone, Debug, Default)]
pub struct TrackingAlloc {
    tracker: Rc<Tracker>,
}

impl TrackingAlloc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> AllocStats {
        self.tracker.stats.get()
    }

    /// Refuse the next `n` allocation requests.
    pub fn refuse_next(&self, n: usize) {
        self.tracker.refuse_next.set(n);
    }
}

// SAFETY: blocks come from `Global`; clones share the tracker and pool.
unsafe impl RawAlloc for TrackingAlloc {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let refuse = self.tracker.refuse_next.get();
        if refuse > 0 {
            self.tracker.refuse_next.set(refuse - 1);
            self.tracker.update(|s| s.refused += 1);
            return Err(AllocError);
        }
        let ptr = Global.allocate(layout)?;
        self.tracker.update(|s| {
            s.allocations += 1;
            s.live_bytes += layout.size();
        });
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded caller contract.
        unsafe { Global.deallocate(ptr, layout) };
        self.tracker.update(|s| {
            s.deallocations += 1;
            s.live_bytes -= layout.size();
        });
    }

    fn same_pool(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.tracker, &other.tracker)
    }

    unsafe fn construct<T>(&self, slot: *mut T, value: T) {
        self.tracker.update(|s| s.constructs += 1);
        // SAFETY: forwarded caller contract.
        unsafe { slot.write(value) }
    }

    unsafe fn destroy<T>(&self, slot: *mut T) {
        self.tracker.update(|s| s.destroys += 1);
        // SAFETY: forwarded caller contract.
        unsafe { std::ptr::drop_in_place(slot) }
    }
}

thread_local! {
    static POOLS: RefCell<HashMap<u32, HashSet<usize>>> = RefCell::new(HashMap::new());
}

/// An allocator whose propagation flags are type parameters.
///
/// Instances with the same pool id are the same pool. Every block is
/// registered with its pool; releasing it through another pool panics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlagAlloc<const COPY: bool, const MOVE: bool, const SWAP: bool, const EQ: bool> {
    pool: u32,
    copies: Rc<Cell<usize>>,
}

impl<const COPY: bool, const MOVE: bool, const SWAP: bool, const EQ: bool>
    FlagAlloc<COPY, MOVE, SWAP, EQ>
{
    pub fn pool(pool: u32) -> Self {
        Self {
            pool,
            copies: Rc::new(Cell::new(0)),
        }
    }

    pub fn id(&self) -> u32 {
        self.pool
    }

    /// How often `select_on_copy` was called on this instance or its clones.
    pub fn copies(&self) -> usize {
        self.copies.get()
    }

    /// Blocks currently held by a pool on this thread.
    pub fn live_blocks(pool: u32) -> usize {
        POOLS.with(|pools| pools.borrow().get(&pool).map_or(0, HashSet::len))
    }
}

// SAFETY: blocks come from `Global`, which serves every pool id, and the
// registry rejects cross-pool releases before they reach `Global`.
unsafe impl<const COPY: bool, const MOVE: bool, const SWAP: bool, const EQ: bool> RawAlloc
    for FlagAlloc<COPY, MOVE, SWAP, EQ>
{
    const PROPAGATE_ON_COPY: bool = COPY;
    const PROPAGATE_ON_MOVE: bool = MOVE;
    const PROPAGATE_ON_SWAP: bool = SWAP;
    const ALWAYS_EQUAL: bool = EQ;

    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let ptr = Global.allocate(layout)?;
        if layout.size() != 0 {
            POOLS.with(|pools| {
                pools
                    .borrow_mut()
                    .entry(self.pool)
                    .or_default()
                    .insert(ptr.as_ptr() as usize)
            });
        }
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() != 0 {
            let known = POOLS.with(|pools| {
                pools
                    .borrow_mut()
                    .get_mut(&self.pool)
                    .is_some_and(|blocks| blocks.remove(&(ptr.as_ptr() as usize)))
            });
            assert!(
                known || EQ,
                "block released through pool {} that did not allocate it",
                self.pool
            );
            if !known {
                POOLS.with(|pools| {
                    for blocks in pools.borrow_mut().values_mut() {
                        blocks.remove(&(ptr.as_ptr() as usize));
                    }
                });
            }
        }
        // SAFETY: forwarded caller contract.
        unsafe { Global.deallocate(ptr, layout) }
    }

    fn same_pool(&self, other: &Self) -> bool {
        self.pool == other.pool
    }

    fn select_on_copy(&self) -> Self {
        self.copies.set(self.copies.get() + 1);
        self.clone()
    }
}
