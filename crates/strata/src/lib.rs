//! Strata: structure-of-arrays containers with a single backing allocation.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Strata sub-crates. For most users, adding `strata` as a single dependency
//! is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use strata::prelude::*;
//!
//! // Position, velocity and a tag per particle, each in its own array.
//! let mut particles: SoaVec<(f32, f32, u8)> = SoaVec::new();
//! particles.reserve(3)?;
//! particles.push((0.0, 1.0, b'a'));
//! particles.push((5.0, -1.0, b'b'));
//! particles.push((9.0, 0.5, b'c'));
//!
//! // Update two fields through slices, one array at a time.
//! let (pos, vel, _) = particles.as_mut_slices();
//! for (p, v) in pos.iter_mut().zip(vel.iter()) {
//!     *p += *v;
//! }
//! assert_eq!(particles.row(1), (&4.0, &-1.0, &b'b'));
//!
//! // Rows still read back as tuples in declaration order.
//! particles.erase_at(0);
//! let tags: Vec<u8> = particles.iter().map(|(_, _, t)| *t).collect();
//! assert_eq!(tags, b"bc");
//!
//! // A bounded pool refuses what does not fit, leaving the vector as it was.
//! let pool = Budgeted::with_limit(64)?;
//! let mut bounded: SoaVec<(u64, u32), Budgeted> = SoaVec::new_in(pool);
//! assert!(bounded.reserve(100).is_err());
//! assert_eq!(bounded.capacity(), 0);
//! # Ok::<(), SoaError>(())
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `strata-core` | Layout plans, field traits, allocators, errors |
//! | [`vec`] | `strata-vec` | `SoaVec`, cursors and cast views |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits and allocators (`strata-core`).
///
/// Contains the layout [`types::Plan`], the [`types::Fields`] trait and its
/// capability traits, the [`types::RawAlloc`] capability with the
/// [`types::Global`] and [`types::Budgeted`] allocators, and the propagation
/// decisions in [`types::propagation`].
pub use strata_core as types;

/// The structure-of-arrays vector (`strata-vec`).
///
/// [`vec::SoaVec`] plus its row cursors ([`vec::Iter`], [`vec::IterMut`])
/// and the reinterpreting views returned by `cast`.
pub use strata_vec as vec;

/// Common imports for typical Strata usage.
///
/// ```rust
/// use strata::prelude::*;
/// ```
pub mod prelude {
    // Container
    pub use strata_vec::{Iter, IterMut, SoaVec};

    // Field traits
    pub use strata_core::{
        CloneFields, DefaultFields, EqFields, FieldVisitor, FieldVisitorMut, Fields,
    };

    // Allocators
    pub use strata_core::{AllocConfig, Budgeted, Global, RawAlloc};

    // Errors
    pub use strata_core::{ConstructError, SoaError};
}
