//! Structure-of-arrays vector for Strata.
//!
//! [`SoaVec`] stores each field of its row type in its own contiguous
//! array, all carved out of a single allocation. Rows are addressed by
//! index and borrowed as tuples of references, one per field.
//!
//! # Architecture
//!
//! ```text
//! SoaVec<F, A>
//! └── RawBlock (one allocation, len, capacity, allocator)
//!     ├── field array, largest element size first
//!     ├── ...
//!     └── field array, smallest element size last
//! ```
//!
//! The block never grows on its own: `push` and `resize` require capacity
//! obtained through `reserve`. Construction that can fail is rolled back
//! field by field, so a failed row leaves no partially built values behind.
//!
//! `unsafe` is denied at the crate root and allowed per module where raw
//! storage is touched (`raw`, `construct`, `vec`, `iter`, `cast`,
//! `propagate`). Outside this crate, unsafe code lives in the trait layer
//! of `strata-core` (`fields`, `allocator`) and in the test allocators of
//! `strata-test-utils`. Every unsafe block carries a `SAFETY` comment
//! naming the invariant it relies on.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod cast;
mod construct;
pub mod iter;
mod propagate;
mod raw;
pub mod vec;

// Public re-exports for the primary API surface.
pub use cast::{CastView, CastViewMut};
pub use iter::{Iter, IterMut};
pub use vec::SoaVec;
