//! Allocator propagation decisions for copy, move and swap.
//!
//! Each decision is a pure function of an allocator type's four flags and
//! whether the two allocators involved share a pool. Containers consult
//! these and then carry out the resulting plan.

use crate::allocator::RawAlloc;

/// The four propagation flags of an allocator type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Propagation {
    /// See [`RawAlloc::PROPAGATE_ON_COPY`].
    pub on_copy: bool,
    /// See [`RawAlloc::PROPAGATE_ON_MOVE`].
    pub on_move: bool,
    /// See [`RawAlloc::PROPAGATE_ON_SWAP`].
    pub on_swap: bool,
    /// See [`RawAlloc::ALWAYS_EQUAL`].
    pub always_equal: bool,
}

impl Propagation {
    /// The flags declared by `A`.
    pub const fn of<A: RawAlloc>() -> Self {
        Self {
            on_copy: A::PROPAGATE_ON_COPY,
            on_move: A::PROPAGATE_ON_MOVE,
            on_swap: A::PROPAGATE_ON_SWAP,
            always_equal: A::ALWAYS_EQUAL,
        }
    }

    /// All sixteen flag combinations, in binary counting order.
    pub fn all() -> impl Iterator<Item = Propagation> {
        (0u8..16).map(|bits| Propagation {
            on_copy: bits & 1 != 0,
            on_move: bits & 2 != 0,
            on_swap: bits & 4 != 0,
            always_equal: bits & 8 != 0,
        })
    }

    /// Whether two allocators must be treated as equal: always-equal types
    /// never compare identity.
    pub const fn equal(&self, same_pool: bool) -> bool {
        self.always_equal || same_pool
    }
}

/// Outcome of a copy-assignment decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopyPlan {
    /// The target takes a copy of the source's allocator.
    pub adopt_source: bool,
    /// The target's current block may be kept and refilled.
    pub reuse_storage: bool,
}

/// Outcome of a move-assignment decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MovePlan {
    /// The source's block is handed over in O(1).
    Transfer {
        /// The target also takes the source's allocator.
        adopt_allocator: bool,
    },
    /// The target allocates its own block and elements move one by one.
    ElementWise,
}

/// Outcome of a swap decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapPlan {
    /// Blocks and allocators trade places.
    SwapAllocators,
    /// Blocks trade places; each container keeps its allocator.
    KeepAllocators,
    /// The allocators differ and may not travel: the swap is a caller error.
    Mismatch,
}

/// Decide a copy-assignment.
///
/// With propagation the source's allocator is adopted, and the old block can
/// only be kept if the adopted allocator is able to release it.
pub const fn copy_plan(flags: Propagation, same_pool: bool) -> CopyPlan {
    CopyPlan {
        adopt_source: flags.on_copy,
        reuse_storage: !flags.on_copy || flags.equal(same_pool),
    }
}

/// Decide a move-assignment.
pub const fn move_plan(flags: Propagation, same_pool: bool) -> MovePlan {
    if flags.always_equal || flags.on_move {
        MovePlan::Transfer {
            adopt_allocator: true,
        }
    } else if same_pool {
        MovePlan::Transfer {
            adopt_allocator: false,
        }
    } else {
        MovePlan::ElementWise
    }
}

/// Decide a swap.
pub const fn swap_plan(flags: Propagation, same_pool: bool) -> SwapPlan {
    if flags.on_swap || flags.always_equal {
        SwapPlan::SwapAllocators
    } else if same_pool {
        SwapPlan::KeepAllocators
    } else {
        SwapPlan::Mismatch
    }
}
