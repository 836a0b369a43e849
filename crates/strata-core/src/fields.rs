//! Compile-time field lists.
//!
//! A field list is a tuple of 1 to 12 element types, for example
//! `(u32, f64, bool)`. [`Fields`] gives a container everything it needs to
//! address and move whole rows; the capability traits ([`CloneFields`],
//! [`DefaultFields`], [`EqFields`]) add per-field operations that exist only
//! when every element type supports them. All of them are implemented for
//! tuples by one macro.
//!
//! Per-field operations take a declared field index and dispatch on it, so
//! containers can drive field-major loops and undo partial work in reverse
//! field order.

#![allow(unsafe_code)]

use std::fmt;
use std::mem::{align_of, size_of};
use std::ptr;
use std::slice;

use crate::allocator::RawAlloc;
use crate::layout::Plan;

/// An ordered list of element types stored as parallel arrays.
///
/// # Safety
///
/// `PLAN` must describe the element types exactly, and every method must
/// address field `i` through element `i` of [`Fields::Ptrs`]. Implemented
/// for tuples; there is no reason to implement it by hand.
pub unsafe trait Fields: Sized {
    /// Number of fields.
    const COUNT: usize;

    /// Layout of a block holding this list.
    const PLAN: Plan;

    /// One typed pointer per field, in declaration order.
    type Ptrs: Copy + Eq + fmt::Debug;

    /// Shared references to one row.
    type Ref<'a>
    where
        Self: 'a;

    /// Mutable references to one row.
    type Mut<'a>
    where
        Self: 'a;

    /// One shared slice per field.
    type Slices<'a>
    where
        Self: 'a;

    /// One mutable slice per field.
    type SlicesMut<'a>
    where
        Self: 'a;

    /// Array starts within a block at `base` holding `capacity` rows.
    fn ptrs(base: *mut u8, capacity: usize) -> Self::Ptrs;

    /// Move every pointer by `count` elements, with wrapping arithmetic.
    fn offset(ptrs: Self::Ptrs, count: isize) -> Self::Ptrs;

    /// Borrow the row at `index` relative to `ptrs`.
    ///
    /// # Safety
    ///
    /// Every field must hold a live element at `index`, and no mutable
    /// borrow of it may exist for `'a`.
    unsafe fn row<'a>(ptrs: Self::Ptrs, index: isize) -> Self::Ref<'a>
    where
        Self: 'a;

    /// Mutably borrow the row at `index` relative to `ptrs`.
    ///
    /// # Safety
    ///
    /// As [`Fields::row`], and no other borrow of the row may exist for
    /// `'a`.
    unsafe fn row_mut<'a>(ptrs: Self::Ptrs, index: isize) -> Self::Mut<'a>
    where
        Self: 'a;

    /// Borrow the first `len` elements of every field.
    ///
    /// # Safety
    ///
    /// Elements `0..len` of every field must be live and not mutably
    /// borrowed for `'a`. Pointers must be non-null and aligned.
    unsafe fn slices<'a>(ptrs: Self::Ptrs, len: usize) -> Self::Slices<'a>
    where
        Self: 'a;

    /// Mutably borrow the first `len` elements of every field.
    ///
    /// # Safety
    ///
    /// As [`Fields::slices`], and no other borrow may exist for `'a`.
    unsafe fn slices_mut<'a>(ptrs: Self::Ptrs, len: usize) -> Self::SlicesMut<'a>
    where
        Self: 'a;

    /// Move a row into uninitialised storage through the allocator's
    /// construct hook.
    ///
    /// # Safety
    ///
    /// Row `index` must be in bounds and uninitialised in every field.
    unsafe fn write<A: RawAlloc>(alloc: &A, ptrs: Self::Ptrs, index: usize, row: Self);

    /// Move a row out, leaving its storage uninitialised.
    ///
    /// # Safety
    ///
    /// Row `index` must be live in every field and is not used again.
    unsafe fn read(ptrs: Self::Ptrs, index: usize) -> Self;

    /// Destroy elements `start..end` of one field through the allocator's
    /// destroy hook.
    ///
    /// # Safety
    ///
    /// Those elements must be live and are not used again.
    unsafe fn destroy<A: RawAlloc>(
        alloc: &A,
        ptrs: Self::Ptrs,
        field: usize,
        start: usize,
        end: usize,
    );

    /// Hand the first `len` elements of `field` to `visitor`.
    ///
    /// # Safety
    ///
    /// As [`Fields::slices`].
    unsafe fn visit_field<V: FieldVisitor>(ptrs: Self::Ptrs, len: usize, field: usize, visitor: &mut V);

    /// Hand the first `len` elements of `field` to `visitor` mutably.
    ///
    /// # Safety
    ///
    /// As [`Fields::slices_mut`].
    unsafe fn visit_field_mut<V: FieldVisitorMut>(
        ptrs: Self::Ptrs,
        len: usize,
        field: usize,
        visitor: &mut V,
    );
}

/// Callback receiving one field's array at a time.
///
/// The element type differs from field to field, so the callback is generic
/// over it rather than a closure.
pub trait FieldVisitor {
    /// Visit the live elements of declared field `field`.
    fn visit<T>(&mut self, field: usize, elements: &[T]);
}

/// Mutable counterpart of [`FieldVisitor`].
pub trait FieldVisitorMut {
    /// Visit the live elements of declared field `field`.
    fn visit<T>(&mut self, field: usize, elements: &mut [T]);
}

/// Field lists whose element types are all `Clone`.
///
/// # Safety
///
/// Implementations must address fields exactly as the [`Fields`] impl does.
pub unsafe trait CloneFields: Fields {
    /// Clone element `index` of `field` from `src` into uninitialised `dst`.
    ///
    /// # Safety
    ///
    /// The source element must be live and the destination uninitialised.
    unsafe fn clone_field<A: RawAlloc>(
        alloc: &A,
        src: Self::Ptrs,
        dst: Self::Ptrs,
        field: usize,
        index: usize,
    );

    /// Overwrite live element `index` of `field` in `dst` with a clone of
    /// the one in `src`.
    ///
    /// # Safety
    ///
    /// Both elements must be live and distinct.
    unsafe fn clone_assign_field(src: Self::Ptrs, dst: Self::Ptrs, field: usize, index: usize);
}

/// Field lists whose element types are all `Default`.
///
/// # Safety
///
/// Implementations must address fields exactly as the [`Fields`] impl does.
pub unsafe trait DefaultFields: Fields {
    /// Default-construct element `index` of `field`.
    ///
    /// # Safety
    ///
    /// The element must be in bounds and uninitialised.
    unsafe fn default_field<A: RawAlloc>(alloc: &A, dst: Self::Ptrs, field: usize, index: usize);
}

/// Field lists whose element types are all `PartialEq`.
///
/// # Safety
///
/// Implementations must address fields exactly as the [`Fields`] impl does.
pub unsafe trait EqFields: Fields {
    /// Compare the first `len` elements of one field.
    ///
    /// # Safety
    ///
    /// Elements `0..len` must be live on both sides.
    unsafe fn field_eq(a: Self::Ptrs, b: Self::Ptrs, field: usize, len: usize) -> bool;
}

/// Per-field constructors for one row, run one field at a time.
///
/// # Safety
///
/// A successful `init_field` must leave exactly that field's element
/// initialised; a failing one must leave it uninitialised.
pub unsafe trait RowInit<F: Fields> {
    /// Error returned by a failing constructor.
    type Error;

    /// Run the constructor for `field` and place its value at `index`.
    /// Each field's constructor runs at most once.
    ///
    /// # Safety
    ///
    /// Element `index` of `field` must be in bounds and uninitialised.
    unsafe fn init_field<A: RawAlloc>(
        &mut self,
        alloc: &A,
        dst: F::Ptrs,
        field: usize,
        index: usize,
    ) -> Result<(), Self::Error>;
}

/// Conversion from a tuple of constructor closures into a [`RowInit`].
///
/// Implemented for `(M0, M1, ..)` where each `Mi: FnOnce() -> Result<Ti, E>`.
pub trait IntoRowInit<F: Fields> {
    /// Error shared by every constructor.
    type Error;
    /// The driver produced.
    type Init: RowInit<F, Error = Self::Error>;

    /// Wrap the constructors.
    fn into_row_init(self) -> Self::Init;
}

macro_rules! impl_fields {
    ($count:literal; $($idx:tt $T:ident $M:ident),+) => {
        // SAFETY: `PLAN` is computed from the element types themselves and
        // field `$idx` is always addressed through pointer `$idx`.
        unsafe impl<$($T),+> Fields for ($($T,)+) {
            const COUNT: usize = $count;
            const PLAN: Plan = Plan::new(&[$(size_of::<$T>()),+], &[$(align_of::<$T>()),+]);

            type Ptrs = ($(*mut $T,)+);
            type Ref<'a> = ($(&'a $T,)+) where Self: 'a;
            type Mut<'a> = ($(&'a mut $T,)+) where Self: 'a;
            type Slices<'a> = ($(&'a [$T],)+) where Self: 'a;
            type SlicesMut<'a> = ($(&'a mut [$T],)+) where Self: 'a;

            #[inline]
            fn ptrs(base: *mut u8, capacity: usize) -> Self::Ptrs {
                ($(base.wrapping_add(Self::PLAN.field_start($idx, capacity)).cast::<$T>(),)+)
            }

            #[inline]
            fn offset(ptrs: Self::Ptrs, count: isize) -> Self::Ptrs {
                ($(ptrs.$idx.wrapping_offset(count),)+)
            }

            #[inline]
            unsafe fn row<'a>(ptrs: Self::Ptrs, index: isize) -> Self::Ref<'a>
            where
                Self: 'a,
            {
                // SAFETY: the caller guarantees a live row at `index`.
                unsafe { ($(&*ptrs.$idx.offset(index),)+) }
            }

            #[inline]
            unsafe fn row_mut<'a>(ptrs: Self::Ptrs, index: isize) -> Self::Mut<'a>
            where
                Self: 'a,
            {
                // SAFETY: the caller guarantees a live, unborrowed row.
                unsafe { ($(&mut *ptrs.$idx.offset(index),)+) }
            }

            #[inline]
            unsafe fn slices<'a>(ptrs: Self::Ptrs, len: usize) -> Self::Slices<'a>
            where
                Self: 'a,
            {
                // SAFETY: the caller guarantees `len` live elements per field.
                unsafe { ($(slice::from_raw_parts(ptrs.$idx.cast_const(), len),)+) }
            }

            #[inline]
            unsafe fn slices_mut<'a>(ptrs: Self::Ptrs, len: usize) -> Self::SlicesMut<'a>
            where
                Self: 'a,
            {
                // SAFETY: the caller guarantees `len` live, unborrowed elements.
                unsafe { ($(slice::from_raw_parts_mut(ptrs.$idx, len),)+) }
            }

            #[inline]
            unsafe fn write<A: RawAlloc>(alloc: &A, ptrs: Self::Ptrs, index: usize, row: Self) {
                // SAFETY: the caller guarantees an uninitialised row in bounds.
                unsafe { $(alloc.construct(ptrs.$idx.add(index), row.$idx);)+ }
            }

            #[inline]
            unsafe fn read(ptrs: Self::Ptrs, index: usize) -> Self {
                // SAFETY: the caller guarantees a live row it gives up.
                unsafe { ($(ptr::read(ptrs.$idx.add(index)),)+) }
            }

            unsafe fn destroy<A: RawAlloc>(
                alloc: &A,
                ptrs: Self::Ptrs,
                field: usize,
                start: usize,
                end: usize,
            ) {
                match field {
                    $($idx => {
                        for index in start..end {
                            // SAFETY: the caller guarantees these elements are live.
                            unsafe { alloc.destroy(ptrs.$idx.add(index)) }
                        }
                    })+
                    _ => unreachable!("field {field} out of range for {} fields", $count),
                }
            }

            unsafe fn visit_field<V: FieldVisitor>(
                ptrs: Self::Ptrs,
                len: usize,
                field: usize,
                visitor: &mut V,
            ) {
                match field {
                    // SAFETY: the caller guarantees `len` live elements.
                    $($idx => visitor.visit($idx, unsafe {
                        slice::from_raw_parts(ptrs.$idx.cast_const(), len)
                    }),)+
                    _ => unreachable!("field {field} out of range for {} fields", $count),
                }
            }

            unsafe fn visit_field_mut<V: FieldVisitorMut>(
                ptrs: Self::Ptrs,
                len: usize,
                field: usize,
                visitor: &mut V,
            ) {
                match field {
                    // SAFETY: the caller guarantees `len` live, unborrowed elements.
                    $($idx => visitor.visit($idx, unsafe {
                        slice::from_raw_parts_mut(ptrs.$idx, len)
                    }),)+
                    _ => unreachable!("field {field} out of range for {} fields", $count),
                }
            }
        }

        // SAFETY: dispatches on the same pointer indices as `Fields`.
        unsafe impl<$($T: Clone),+> CloneFields for ($($T,)+) {
            unsafe fn clone_field<A: RawAlloc>(
                alloc: &A,
                src: Self::Ptrs,
                dst: Self::Ptrs,
                field: usize,
                index: usize,
            ) {
                match field {
                    $($idx => {
                        // SAFETY: the caller guarantees a live source element
                        // and an uninitialised destination.
                        unsafe {
                            let value = (*src.$idx.add(index)).clone();
                            alloc.construct(dst.$idx.add(index), value)
                        }
                    })+
                    _ => unreachable!("field {field} out of range for {} fields", $count),
                }
            }

            unsafe fn clone_assign_field(src: Self::Ptrs, dst: Self::Ptrs, field: usize, index: usize) {
                match field {
                    $($idx => {
                        // SAFETY: the caller guarantees two distinct live elements.
                        unsafe { (*dst.$idx.add(index)).clone_from(&*src.$idx.add(index)) }
                    })+
                    _ => unreachable!("field {field} out of range for {} fields", $count),
                }
            }
        }

        // SAFETY: dispatches on the same pointer indices as `Fields`.
        unsafe impl<$($T: Default),+> DefaultFields for ($($T,)+) {
            unsafe fn default_field<A: RawAlloc>(alloc: &A, dst: Self::Ptrs, field: usize, index: usize) {
                match field {
                    $($idx => {
                        // SAFETY: the caller guarantees an uninitialised element.
                        unsafe { alloc.construct(dst.$idx.add(index), <$T as Default>::default()) }
                    })+
                    _ => unreachable!("field {field} out of range for {} fields", $count),
                }
            }
        }

        // SAFETY: dispatches on the same pointer indices as `Fields`.
        unsafe impl<$($T: PartialEq),+> EqFields for ($($T,)+) {
            unsafe fn field_eq(a: Self::Ptrs, b: Self::Ptrs, field: usize, len: usize) -> bool {
                match field {
                    $($idx => {
                        // SAFETY: the caller guarantees `len` live elements on both sides.
                        unsafe {
                            slice::from_raw_parts(a.$idx.cast_const(), len)
                                == slice::from_raw_parts(b.$idx.cast_const(), len)
                        }
                    })+
                    _ => unreachable!("field {field} out of range for {} fields", $count),
                }
            }
        }

        // SAFETY: each constructor is taken once and its value is written
        // only on success.
        unsafe impl<E, $($T, $M),+> RowInit<($($T,)+)> for ($(Option<$M>,)+)
        where
            $($M: FnOnce() -> Result<$T, E>),+
        {
            type Error = E;

            unsafe fn init_field<A: RawAlloc>(
                &mut self,
                alloc: &A,
                dst: ($(*mut $T,)+),
                field: usize,
                index: usize,
            ) -> Result<(), E> {
                match field {
                    $($idx => {
                        if let Some(make) = self.$idx.take() {
                            let value = make()?;
                            // SAFETY: the caller guarantees an uninitialised element.
                            unsafe { alloc.construct(dst.$idx.add(index), value) }
                        }
                        Ok(())
                    })+
                    _ => unreachable!("field {field} out of range for {} fields", $count),
                }
            }
        }

        impl<E, $($T, $M),+> IntoRowInit<($($T,)+)> for ($($M,)+)
        where
            $($M: FnOnce() -> Result<$T, E>),+
        {
            type Error = E;
            type Init = ($(Option<$M>,)+);

            fn into_row_init(self) -> Self::Init {
                ($(Some(self.$idx),)+)
            }
        }
    };
}

impl_fields!(1; 0 T0 M0);
impl_fields!(2; 0 T0 M0, 1 T1 M1);
impl_fields!(3; 0 T0 M0, 1 T1 M1, 2 T2 M2);
impl_fields!(4; 0 T0 M0, 1 T1 M1, 2 T2 M2, 3 T3 M3);
impl_fields!(5; 0 T0 M0, 1 T1 M1, 2 T2 M2, 3 T3 M3, 4 T4 M4);
impl_fields!(6; 0 T0 M0, 1 T1 M1, 2 T2 M2, 3 T3 M3, 4 T4 M4, 5 T5 M5);
impl_fields!(7; 0 T0 M0, 1 T1 M1, 2 T2 M2, 3 T3 M3, 4 T4 M4, 5 T5 M5, 6 T6 M6);
impl_fields!(8; 0 T0 M0, 1 T1 M1, 2 T2 M2, 3 T3 M3, 4 T4 M4, 5 T5 M5, 6 T6 M6, 7 T7 M7);
impl_fields!(9; 0 T0 M0, 1 T1 M1, 2 T2 M2, 3 T3 M3, 4 T4 M4, 5 T5 M5, 6 T6 M6, 7 T7 M7, 8 T8 M8);
impl_fields!(10; 0 T0 M0, 1 T1 M1, 2 T2 M2, 3 T3 M3, 4 T4 M4, 5 T5 M5, 6 T6 M6, 7 T7 M7, 8 T8 M8, 9 T9 M9);
impl_fields!(11; 0 T0 M0, 1 T1 M1, 2 T2 M2, 3 T3 M3, 4 T4 M4, 5 T5 M5, 6 T6 M6, 7 T7 M7, 8 T8 M8, 9 T9 M9, 10 T10 M10);
impl_fields!(12; 0 T0 M0, 1 T1 M1, 2 T2 M2, 3 T3 M3, 4 T4 M4, 5 T5 M5, 6 T6 M6, 7 T7 M7, 8 T8 M8, 9 T9 M9, 10 T10 M10, 11 T11 M11);
