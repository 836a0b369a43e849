//! Integration test: element lifecycle accounting.
//!
//! Every value a container constructs must be destroyed exactly once, and
//! no operation may construct or destroy more than it has to. These tests
//! count constructions and drops through `Counted` fields and check the
//! totals after each operation, including operations interrupted by a
//! failing constructor or a panicking clone.

use std::panic::{catch_unwind, AssertUnwindSafe};

use strata_test_utils::{Counted, Injected, TrackingAlloc};
use strata_vec::SoaVec;

// ── Growth ──────────────────────────────────────────────────────────

#[test]
fn reserve_then_resize_defaults_each_row_once() {
    Counted::<1>::reset();
    let mut v = SoaVec::<(Counted<1>, u32)>::new();
    v.reserve(10).unwrap();
    v.resize(10);

    let counts = Counted::<1>::counts();
    assert_eq!(counts.defaulted, 10);
    assert_eq!(counts.cloned, 0);
    assert_eq!(counts.dropped, 0);

    v.resize(0);
    assert_eq!(Counted::<1>::counts().dropped, 10);
    assert_eq!(v.capacity(), 10);
}

#[test]
fn relocation_neither_clones_nor_drops() {
    Counted::<2>::reset();
    let mut v = SoaVec::<(u8, Counted<2>)>::with_capacity(3).unwrap();
    for i in 0..3 {
        v.push((i as u8, Counted::new(i)));
    }
    v.reserve(100).unwrap();
    v.shrink_to_fit().unwrap();

    let counts = Counted::<2>::counts();
    assert_eq!(counts.created, 3);
    assert_eq!(counts.cloned, 0);
    assert_eq!(counts.dropped, 0);
    let values: Vec<u64> = v.iter().map(|(_, c)| c.value).collect();
    assert_eq!(values, vec![0, 1, 2]);
}

// ── Removal ─────────────────────────────────────────────────────────

#[test]
fn erase_drops_only_the_erased_rows() {
    Counted::<3>::reset();
    let mut v = SoaVec::<(Counted<3>, u16)>::with_capacity(6).unwrap();
    for i in 0..6 {
        v.push((Counted::new(i), i as u16));
    }
    v.erase(1..4);

    let counts = Counted::<3>::counts();
    assert_eq!(counts.dropped, 3);
    assert_eq!(counts.live(), 3);
    let kept: Vec<u64> = v.as_slices().0.iter().map(|c| c.value).collect();
    assert_eq!(kept, vec![0, 4, 5]);
    assert_eq!(v.as_slices().1, &[0, 4, 5]);
}

#[test]
fn pop_and_truncate_account_for_every_row() {
    Counted::<4>::reset();
    let mut v = SoaVec::<(Counted<4>,)>::with_capacity(5).unwrap();
    for i in 0..5 {
        v.push((Counted::new(i),));
    }
    let popped = v.pop();
    assert_eq!(Counted::<4>::counts().dropped, 0);
    drop(popped);
    assert_eq!(Counted::<4>::counts().dropped, 1);

    v.truncate(1);
    assert_eq!(Counted::<4>::counts().dropped, 4);
    v.clear();
    assert_eq!(Counted::<4>::counts().dropped, 5);
    assert_eq!(Counted::<4>::counts().live(), 0);
}

#[test]
fn drop_destroys_every_live_row() {
    Counted::<5>::reset();
    let alloc = TrackingAlloc::new();
    let mut v = SoaVec::<(Counted<5>, String), _>::with_capacity_in(8, alloc.clone()).unwrap();
    for i in 0..7 {
        v.push((Counted::new(i), format!("row {i}")));
    }
    drop(v);

    assert_eq!(Counted::<5>::counts().dropped, 7);
    let stats = alloc.stats();
    assert_eq!(stats.destroys, 14);
    assert_eq!(stats.deallocations, 1);
    assert_eq!(stats.live_bytes, 0);
}

// ── Failing construction ────────────────────────────────────────────

#[test]
fn failed_field_constructor_unwinds_the_row() {
    Counted::<6>::reset();
    Counted::<7>::reset();
    Counted::<8>::reset();
    Counted::<9>::reset();
    let mut v = SoaVec::<(Counted<6>, Counted<7>, Counted<8>, Counted<9>)>::with_capacity(2)
        .unwrap();

    let err = v
        .try_emplace((
            || Ok(Counted::<6>::new(1)),
            || Ok(Counted::<7>::new(2)),
            || Err(Injected::new("third field")),
            || Ok(Counted::<9>::new(4)),
        ))
        .unwrap_err();

    assert_eq!(err.row, 0);
    assert_eq!(err.field, Some(2));
    assert_eq!(err.source, Injected::new("third field"));
    assert!(v.is_empty());

    // Two constructed, the same two destroyed, the fourth never attempted.
    let built = Counted::<6>::counts().created + Counted::<7>::counts().created;
    let dropped = Counted::<6>::counts().dropped + Counted::<7>::counts().dropped;
    assert_eq!(built, 2);
    assert_eq!(dropped, 2);
    assert_eq!(Counted::<8>::counts().constructed(), 0);
    assert_eq!(Counted::<9>::counts().constructed(), 0);
}

#[test]
fn container_is_usable_after_failed_emplace() {
    let mut v = SoaVec::<(u32, String)>::with_capacity(1).unwrap();
    let failed = v.try_emplace((|| Ok(1), || Err(Injected::new("nope"))));
    assert!(failed.is_err());

    let row = v
        .try_emplace((|| Ok::<_, Injected>(2), || Ok("two".to_string())))
        .unwrap();
    row.1.push('!');
    assert_eq!(v.row(0), (&2, &"two!".to_string()));
}

#[test]
fn panicking_default_leaves_length_unchanged() {
    struct Fragile;

    impl Default for Fragile {
        fn default() -> Self {
            panic!("fragile default");
        }
    }

    Counted::<10>::reset();
    let mut v = SoaVec::<(Counted<10>, Fragile)>::with_capacity(4).unwrap();
    let result = catch_unwind(AssertUnwindSafe(|| v.resize(4)));

    assert!(result.is_err());
    assert!(v.is_empty());
    let counts = Counted::<10>::counts();
    assert_eq!(counts.defaulted, 4);
    assert_eq!(counts.dropped, 4);
}

// ── Failing copy ────────────────────────────────────────────────────

#[test]
fn clone_panic_rolls_back_cloned_values() {
    Counted::<11>::reset();
    let source: SoaVec<(Counted<11>, String)> =
        (0..5).map(|i| (Counted::new(i), i.to_string())).collect();
    Counted::<11>::fail_clone_after(3);

    let result = catch_unwind(AssertUnwindSafe(|| source.clone()));

    assert!(result.is_err());
    let counts = Counted::<11>::counts();
    assert_eq!(counts.cloned, 3);
    // Only the three clones were destroyed; the source is intact.
    assert_eq!(counts.dropped, 3);
    assert_eq!(source.len(), 5);
    assert_eq!(source.row(4).0.value, 4);
}

#[test]
fn clone_panic_releases_the_new_block() {
    Counted::<12>::reset();
    let alloc = TrackingAlloc::new();
    let mut source = SoaVec::<(Counted<12>,), _>::with_capacity_in(4, alloc.clone()).unwrap();
    for i in 0..4 {
        source.push((Counted::new(i),));
    }
    Counted::<12>::fail_clone_after(0);

    let result = catch_unwind(AssertUnwindSafe(|| source.clone()));

    assert!(result.is_err());
    let stats = alloc.stats();
    assert_eq!(stats.allocations, 2);
    assert_eq!(stats.deallocations, 1);
    assert_eq!(Counted::<12>::counts().cloned, 0);
}

#[test]
fn assignment_overwrites_then_extends() {
    Counted::<13>::reset();
    let source: SoaVec<(Counted<13>,)> = (0..4).map(|i| (Counted::new(i),)).collect();
    let mut target = SoaVec::<(Counted<13>,)>::with_capacity(6).unwrap();
    target.push((Counted::new(99),));
    Counted::<13>::reset();

    target.clone_from(&source);

    let counts = Counted::<13>::counts();
    // One overwrite through clone_from plus three appended clones.
    assert_eq!(counts.cloned, 4);
    assert_eq!(counts.dropped, 1);
    assert_eq!(target, source);
}
