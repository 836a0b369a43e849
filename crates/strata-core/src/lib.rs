//! Core types and traits for Strata structure-of-arrays containers.
//!
//! This is the leaf crate of the workspace. It defines the pieces a
//! container is assembled from:
//!
//! - [`layout`]: the compile-time [`Plan`] mapping a field list to byte
//!   offsets within one block.
//! - [`fields`]: the [`Fields`] trait and its capability traits, implemented
//!   for tuples of up to twelve element types.
//! - [`allocator`]: the [`RawAlloc`] capability plus the [`Global`] and
//!   [`Budgeted`] allocators.
//! - [`propagation`]: pure copy/move/swap decisions driven by allocator
//!   flags.
//! - [`config`] and [`error`]: allocator configuration and error types.
//!
//! `unsafe` is denied here except in [`fields`] and [`allocator`], whose
//! traits carry implementor contracts that the storage crate relies on.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod allocator;
pub mod config;
pub mod error;
pub mod fields;
pub mod layout;
pub mod propagation;

pub use allocator::{Budgeted, Global, RawAlloc};
pub use config::AllocConfig;
pub use error::{AllocError, ConstructError, SoaError};
pub use fields::{
    CloneFields, DefaultFields, EqFields, FieldVisitor, FieldVisitorMut, Fields, IntoRowInit,
    RowInit,
};
pub use layout::{Plan, MAX_FIELDS};
pub use propagation::{copy_plan, move_plan, swap_plan, CopyPlan, MovePlan, Propagation, SwapPlan};
