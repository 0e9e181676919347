//! Tests for the feature bitset algebra.

use crate::{disable_deps, enable_deps, FeatureDep, FeatureSet, NO_FEATURE};

#[test]
fn set_clear_test_roundtrip() {
    let mut s = FeatureSet::<2>::empty();
    assert!(s.is_empty());

    s.set(0);
    s.set(31);
    s.set(32);
    s.set(63);
    assert!(s.test(0));
    assert!(s.test(31));
    assert!(s.test(32));
    assert!(s.test(63));
    assert!(!s.test(1));
    assert_eq!(s.count(), 4);

    s.clear(31);
    assert!(!s.test(31));
    assert_eq!(s.count(), 3);
}

#[test]
fn no_feature_sentinel_is_ignored() {
    let mut s = FeatureSet::<2>::empty();
    s.set(NO_FEATURE);
    assert!(s.is_empty());
    assert!(!s.test(NO_FEATURE));
    s.set(5);
    s.clear(NO_FEATURE);
    assert_eq!(s.count(), 1);
}

#[test]
fn from_bits_matches_set() {
    let a = FeatureSet::<2>::from_bits(&[3, 40, NO_FEATURE, 7]);
    let mut b = FeatureSet::<2>::empty();
    b.set(3);
    b.set(40);
    b.set(7);
    assert_eq!(a, b);
}

#[test]
fn bit_ops_are_elementwise() {
    let a = FeatureSet::<2>::from_bits(&[1, 2, 40]);
    let b = FeatureSet::<2>::from_bits(&[2, 3, 41]);

    assert_eq!(a | b, FeatureSet::from_bits(&[1, 2, 3, 40, 41]));
    assert_eq!(a & b, FeatureSet::from_bits(&[2]));
    assert_eq!(a & !b, FeatureSet::from_bits(&[1, 40]));
}

#[test]
fn subset_test_matches_definition() {
    // features_le(a, b) ⇔ (a & !b) is empty, over a spread of cases.
    let cases = [
        (vec![], vec![]),
        (vec![0], vec![0, 1]),
        (vec![0, 1], vec![0]),
        (vec![5, 33], vec![5, 33, 40]),
        (vec![5, 34], vec![5, 33, 40]),
        (vec![63], vec![63]),
        (vec![31, 32], vec![32]),
    ];
    for (xs, ys) in cases {
        let a = FeatureSet::<2>::from_bits(&xs);
        let b = FeatureSet::<2>::from_bits(&ys);
        assert_eq!(a.is_subset_of(&b), (a & !b).is_empty(), "{xs:?} ⊆ {ys:?}");
    }
}

// Chain: 2 -> 1 -> 0, plus an independent edge 5 -> 4.
const EDGES: &[FeatureDep] = &[
    FeatureDep { feature: 1, dep: 0 },
    FeatureDep { feature: 2, dep: 1 },
    FeatureDep { feature: 5, dep: 4 },
];

#[test]
fn enable_deps_closes_transitively() {
    let mut s = FeatureSet::<1>::from_bits(&[2]);
    enable_deps(&mut s, EDGES);
    assert_eq!(s, FeatureSet::from_bits(&[0, 1, 2]));
}

#[test]
fn enable_deps_only_adds() {
    let before = FeatureSet::<1>::from_bits(&[2, 4]);
    let mut after = before;
    enable_deps(&mut after, EDGES);
    assert!(before.is_subset_of(&after));
}

#[test]
fn enable_deps_is_idempotent() {
    let mut once = FeatureSet::<1>::from_bits(&[2, 5]);
    enable_deps(&mut once, EDGES);
    let mut twice = once;
    enable_deps(&mut twice, EDGES);
    assert_eq!(once, twice);
}

#[test]
fn disable_deps_cascades_removal() {
    // 0 is absent, so 1 drops, so 2 drops. 4 present keeps 5.
    let mut s = FeatureSet::<1>::from_bits(&[1, 2, 4, 5]);
    disable_deps(&mut s, EDGES);
    assert_eq!(s, FeatureSet::from_bits(&[4, 5]));
}

#[test]
fn disable_deps_only_removes() {
    let before = FeatureSet::<1>::from_bits(&[1, 2, 5]);
    let mut after = before;
    disable_deps(&mut after, EDGES);
    assert!(after.is_subset_of(&before));
}

#[test]
fn disable_deps_is_idempotent() {
    let mut once = FeatureSet::<1>::from_bits(&[1, 2, 5]);
    disable_deps(&mut once, EDGES);
    let mut twice = once;
    disable_deps(&mut twice, EDGES);
    assert_eq!(once, twice);
}

#[test]
fn closed_set_is_stable_under_both_sweeps() {
    let mut s = FeatureSet::<1>::from_bits(&[3]);
    enable_deps(&mut s, EDGES);
    let closed = s;
    disable_deps(&mut s, EDGES);
    assert_eq!(s, closed);
}
