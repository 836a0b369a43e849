//! Copy-assignment, move-assignment and swap between vectors.
//!
//! What happens to the allocator, and whether storage can change hands, is
//! decided by [`strata_core::propagation`] from the allocator type's flags
//! and whether the two allocators share a pool. This module carries the
//! decisions out.

#![allow(unsafe_code)]

use std::mem;

use strata_core::{
    copy_plan, move_plan, swap_plan, CloneFields, Fields, MovePlan, Propagation, RawAlloc,
    SoaError, SwapPlan,
};
use tracing::debug;

use crate::vec::SoaVec;

impl<F: Fields, A: RawAlloc> SoaVec<F, A> {
    /// Make this vector a copy of `source`.
    ///
    /// If the allocator propagates on copy, `source`'s allocator is adopted;
    /// the current block survives only if the adopted allocator can release
    /// it. Otherwise the current allocator is kept. When the kept block is
    /// large enough, existing rows are overwritten with `clone_from`, missing
    /// rows are cloned in and extra rows are dropped. When a new block is
    /// needed it is fully built before the old one is released, so an
    /// allocation failure leaves this vector unchanged.
    pub fn assign_from(&mut self, source: &Self) -> Result<(), SoaError>
    where
        F: CloneFields,
    {
        let plan = copy_plan(
            Propagation::of::<A>(),
            self.allocator().same_pool(source.allocator()),
        );
        if !plan.reuse_storage || source.len() > self.capacity() {
            let alloc = if plan.adopt_source {
                source.allocator().clone()
            } else {
                self.allocator().clone()
            };
            *self = source.clone_in(alloc)?;
            return Ok(());
        }
        if plan.adopt_source {
            // SAFETY: storage is only reused when the allocators share a pool.
            unsafe { self.block.replace_allocator(source.allocator().clone()) };
        }

        let common = self.len().min(source.len());
        let (src, dst) = (source.block.ptrs(), self.block.ptrs());
        for field in 0..F::COUNT {
            for row in 0..common {
                // SAFETY: both rows are live and belong to different vectors.
                unsafe { F::clone_assign_field(src, dst, field, row) };
            }
        }
        if source.len() > common {
            // SAFETY: `len() == common` and the capacity was checked above.
            unsafe { self.extend_cloned(source, common) };
        } else {
            self.truncate(source.len());
        }
        Ok(())
    }

    /// Move every row of `source` into this vector, leaving `source` empty.
    ///
    /// The block changes hands in O(1) when the allocator propagates on
    /// move, is always equal, or shares a pool with `source`'s. Otherwise the
    /// rows are moved one by one into storage from this vector's own
    /// allocator; this is the only case that can fail, and on failure both
    /// vectors are unchanged.
    pub fn take_from(&mut self, source: &mut Self) -> Result<(), SoaError> {
        let plan = move_plan(
            Propagation::of::<A>(),
            self.allocator().same_pool(source.allocator()),
        );
        match plan {
            MovePlan::Transfer { adopt_allocator } => {
                let mut block = source.block.take();
                if !adopt_allocator {
                    // SAFETY: `move_plan` keeps allocators only when they
                    // share a pool.
                    unsafe { block.replace_allocator(self.allocator().clone()) };
                }
                *self = Self { block };
            }
            MovePlan::ElementWise => {
                debug!(rows = source.len(), "allocators differ; moving rows one by one");
                if source.len() <= self.capacity() {
                    self.clear();
                    // SAFETY: this vector is now empty with room for every
                    // row of `source`, in a different block.
                    unsafe { self.block.absorb(&mut source.block) };
                } else {
                    let alloc = self.allocator().clone();
                    let block = source.block.move_into(source.len(), alloc)?;
                    *self = Self { block };
                }
            }
        }
        Ok(())
    }

    /// Exchange contents with `other`.
    ///
    /// Allocators travel with their blocks when the allocator propagates on
    /// swap or is always equal; otherwise each vector keeps its allocator,
    /// which requires the two to share a pool.
    ///
    /// # Panics
    ///
    /// Panics if the allocators neither travel nor share a pool.
    pub fn swap_with(&mut self, other: &mut Self) {
        let plan = swap_plan(
            Propagation::of::<A>(),
            self.allocator().same_pool(other.allocator()),
        );
        assert!(
            plan != SwapPlan::Mismatch,
            "swap_with: allocators neither share a pool nor propagate on swap"
        );
        match plan {
            SwapPlan::SwapAllocators => mem::swap(&mut self.block, &mut other.block),
            SwapPlan::KeepAllocators | SwapPlan::Mismatch => {
                self.block.swap_storage(&mut other.block)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::SoaVec;
    use strata_core::Budgeted;
    use strata_test_utils::{Counted, TrackingAlloc};

    #[test]
    fn assign_reuses_block_when_large_enough() {
        Counted::<30>::reset();
        let mut target = SoaVec::<(Counted<30>, u8)>::with_capacity(8).unwrap();
        for i in 0..5 {
            target.push((Counted::new(i), i as u8));
        }
        let source: SoaVec<(Counted<30>, u8)> =
            (10..13).map(|i| (Counted::new(i), i as u8)).collect();
        let base = target.as_ptrs();
        Counted::<30>::reset();

        target.assign_from(&source).unwrap();
        assert_eq!(target.as_ptrs(), base);
        assert_eq!(target.capacity(), 8);
        assert_eq!(target, source);
        // Three overwritten in place by clone_from, two surplus rows dropped.
        let counts = Counted::<30>::counts();
        assert_eq!(counts.cloned, 3);
        assert_eq!(counts.dropped, 3 + 2);
    }

    #[test]
    fn assign_grows_when_too_small() {
        let mut target = SoaVec::<(u32, u16)>::with_capacity(1).unwrap();
        target.push((9, 9));
        let source: SoaVec<(u32, u16)> = (0..4).map(|i| (i, i as u16)).collect();
        target.assign_from(&source).unwrap();
        assert_eq!(target, source);
        assert_eq!(target.capacity(), 4);
    }

    #[test]
    fn failed_assign_keeps_target() {
        let pool = Budgeted::with_limit(6 * 3).unwrap();
        let mut target = SoaVec::<(u32, u16), _>::with_capacity_in(1, pool.clone()).unwrap();
        target.push((7, 7));
        let mut source = SoaVec::<(u32, u16), _>::with_capacity_in(2, pool.clone()).unwrap();
        source.push((1, 1));
        source.push((2, 2));
        assert!(target.assign_from(&source).is_err());
        assert_eq!(target.len(), 1);
        assert_eq!(target.row(0), (&7, &7));
    }

    #[test]
    fn take_from_same_pool_moves_block() {
        let alloc = TrackingAlloc::new();
        let mut source = SoaVec::<(u64, u8), _>::with_capacity_in(3, alloc.clone()).unwrap();
        source.push((1, 1));
        let base = source.as_ptrs();
        let mut target = SoaVec::new_in(alloc.clone());
        target.take_from(&mut source).unwrap();
        assert_eq!(target.as_ptrs(), base);
        assert!(source.is_empty());
        assert_eq!(source.capacity(), 0);
        assert_eq!(alloc.stats().allocations, 1);
    }

    #[test]
    fn take_from_foreign_pool_reuses_target_block() {
        let mine = TrackingAlloc::new();
        let theirs = TrackingAlloc::new();
        let mut target = SoaVec::<(u64, String), _>::with_capacity_in(4, mine.clone()).unwrap();
        target.push((0, "old".into()));
        let mut source = SoaVec::with_capacity_in(2, theirs.clone()).unwrap();
        source.push((1, "a".to_string()));
        source.push((2, "b".to_string()));

        target.take_from(&mut source).unwrap();
        assert_eq!(target.len(), 2);
        assert_eq!(target.capacity(), 4);
        assert_eq!(target.row(1), (&2, &"b".to_string()));
        assert!(source.is_empty());
        assert_eq!(source.capacity(), 2);
        assert_eq!(mine.stats().allocations, 1);
    }

    #[test]
    fn swap_with_shared_pool_keeps_allocators() {
        let alloc = TrackingAlloc::new();
        let mut a = SoaVec::<(u32,), _>::with_capacity_in(2, alloc.clone()).unwrap();
        let mut b = SoaVec::<(u32,), _>::with_capacity_in(5, alloc.clone()).unwrap();
        a.push((1,));
        b.push((2,));
        b.push((3,));
        a.swap_with(&mut b);
        assert_eq!(a.as_slices().0, &[2, 3]);
        assert_eq!(a.capacity(), 5);
        assert_eq!(b.as_slices().0, &[1]);
    }

    #[test]
    #[should_panic(expected = "neither share a pool")]
    fn swap_with_foreign_pool_panics() {
        let mut a = SoaVec::<(u32,), _>::new_in(TrackingAlloc::new());
        let mut b = SoaVec::<(u32,), _>::new_in(TrackingAlloc::new());
        a.swap_with(&mut b);
    }

    #[test]
    fn clone_from_uses_assignment() {
        let source: SoaVec<(u8, u32)> = (0..3).map(|i| (i, i as u32)).collect();
        let mut target = SoaVec::with_capacity(10).unwrap();
        target.push((9, 9));
        target.clone_from(&source);
        assert_eq!(target, source);
        assert_eq!(target.capacity(), 10);
    }
}
