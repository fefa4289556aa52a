//! Tests for `metrics` module

use super::metrics::*;
use super::node::{BitSplit, Hyperplane};
use super::random::XorShiftRng;

#[test]
fn test_normalized_distances() {
    assert!((Angular::normalized_distance(4.0) - 2.0).abs() < 1e-6);
    assert!((Euclidean::normalized_distance(25.0) - 5.0).abs() < 1e-6);
    assert!((Manhattan::normalized_distance(3.5) - 3.5).abs() < 1e-6);
    assert_eq!(Hamming::normalized_distance(128.0), 128);
}

#[test]
fn test_normalized_distance_clamps_rounding_noise() {
    assert_eq!(Angular::normalized_distance(-1e-7), 0.0);
    assert_eq!(Euclidean::normalized_distance(-1e-7), 0.0);
}

#[test]
fn test_euclidean_split_separates_two_points() {
    let left = [-10.0f32, 0.0];
    let right = [10.0f32, 0.0];
    let points: Vec<&[f32]> = vec![&left, &right];

    let mut rng = XorShiftRng::new(3);
    let split = Euclidean::create_split(&points, &mut rng);

    assert!(split.offset.abs() < 1e-4, "plane should pass through the midpoint");
    assert_ne!(
        Euclidean::side(&split, &left, &mut rng),
        Euclidean::side(&split, &right, &mut rng)
    );
}

#[test]
fn test_manhattan_split_separates_two_points() {
    let low = [0.0f32, 0.0, 0.0];
    let high = [4.0f32, 4.0, 4.0];
    let points: Vec<&[f32]> = vec![&low, &high];

    let mut rng = XorShiftRng::new(8);
    let split = Manhattan::create_split(&points, &mut rng);

    assert!(Manhattan::margin(&split, &low) * Manhattan::margin(&split, &high) < 0.0);
}

#[test]
fn test_angular_split_has_unit_normal_and_no_offset() {
    let a = [1.0f32, 0.1, 0.0];
    let b = [0.0f32, 1.0, 0.1];
    let c = [0.9f32, 0.0, 0.1];
    let d = [0.1f32, 0.9, 0.0];
    let points: Vec<&[f32]> = vec![&a, &b, &c, &d];

    let split = Angular::create_split(&points, &mut XorShiftRng::new(11));

    let norm: f32 = split.normal.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-4);
    assert_eq!(split.offset, 0.0);
}

#[test]
fn test_hyperplane_margin_and_priority() {
    let split = Hyperplane {
        normal: vec![1.0, 0.0],
        offset: -1.0,
    };
    let v = [3.0f32, 5.0];

    let margin = Euclidean::margin(&split, &v);
    assert!((margin - 2.0).abs() < 1e-6);

    assert!((Euclidean::pq_distance(f32::INFINITY, margin, 1) - 2.0).abs() < 1e-6);
    assert!((Euclidean::pq_distance(f32::INFINITY, margin, 0) + 2.0).abs() < 1e-6);
    assert!((Euclidean::pq_distance(1.0, margin, 1) - 1.0).abs() < 1e-6);
}

#[test]
fn test_hamming_split_picks_separating_bit() {
    let a = [0b0001u64, 0];
    let b = [0b0000u64, 0];
    let c = [0b0001u64, 0];
    let points: Vec<&[u64]> = vec![&a, &b, &c];

    let split = Hamming::create_split(&points, &mut XorShiftRng::new(5));

    assert_eq!(split.bit, 0);
}

#[test]
fn test_hamming_split_identical_points_falls_back() {
    let a = [7u64];
    let points: Vec<&[u64]> = vec![&a, &a, &a];

    let split = Hamming::create_split(&points, &mut XorShiftRng::new(5));

    assert!(split.bit < 64);
}

#[test]
fn test_hamming_side_and_priority() {
    let split = BitSplit { bit: 65 };
    let v = [0u64, 0b10];
    let mut rng = XorShiftRng::new(1);

    assert_eq!(Hamming::side(&split, &v, &mut rng), 1);
    assert_eq!(Hamming::margin(&split, &v), 1.0);
    assert_eq!(Hamming::pq_distance(10.0, 1.0, 1), 10.0);
    assert_eq!(Hamming::pq_distance(10.0, 1.0, 0), 9.0);
    assert_eq!(Hamming::pq_distance(10.0, 0.0, 0), 10.0);
}

#[test]
fn test_split_fits() {
    let plane = Hyperplane {
        normal: vec![0.0; 4],
        offset: 0.0,
    };
    let mut stored = vec![0u32; Angular::split_words(4)];
    Angular::encode_split(&plane, &mut stored);
    assert!(Angular::split_fits(&stored, 4));
    assert!(!Angular::split_fits(&stored, 5));

    assert!(Hamming::split_fits(&[127], 2));
    assert!(!Hamming::split_fits(&[128], 2));
    assert!(!Hamming::split_fits(&[], 2));
}

#[test]
fn test_stored_margin_matches_split_margin() {
    let plane = Hyperplane {
        normal: vec![0.6, 0.8, 0.0],
        offset: -1.5,
    };
    let v = [2.0f32, 1.0, 7.0];

    let mut stored = vec![0u32; Euclidean::split_words(3)];
    Euclidean::encode_split(&plane, &mut stored);

    assert_eq!(stored[0], (-1.5f32).to_bits());
    assert_eq!(
        Euclidean::stored_margin(&stored, &v),
        Euclidean::margin(&plane, &v)
    );
    assert_eq!(
        Manhattan::stored_margin(&stored, &v),
        Manhattan::margin(&plane, &v)
    );
}

#[test]
fn test_stored_bit_split() {
    let split = BitSplit { bit: 70 };
    let mut stored = [0u32; 1];
    Hamming::encode_split(&split, &mut stored);

    assert_eq!(stored, [70]);
    assert_eq!(Hamming::stored_margin(&stored, &[0, 1 << 6]), 1.0);
    assert_eq!(Hamming::stored_margin(&stored, &[u64::MAX, 0]), 0.0);
}
