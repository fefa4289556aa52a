//! Tests for `distance` module

use super::distance::*;

#[test]
fn test_dot_product() {
    let a = vec![1.0, 2.0, 3.0, 4.0, 5.0];
    let b = vec![5.0, 4.0, 3.0, 2.0, 1.0];
    assert!((dot(&a, &b) - 35.0).abs() < 1e-6);
}

#[test]
fn test_euclidean_squared() {
    let a = vec![0.0, 0.0, 0.0];
    let b = vec![3.0, 4.0, 0.0];
    assert!((euclidean_squared(&a, &b) - 25.0).abs() < 1e-6);
}

#[test]
fn test_manhattan() {
    let a = vec![1.0, -1.0, 2.0];
    let b = vec![0.0, 1.0, 5.0];
    assert!((manhattan(&a, &b) - 6.0).abs() < 1e-6);
}

#[test]
fn test_angular_squared_identical_and_orthogonal() {
    let a = vec![1.0, 0.0, 0.0];
    let b = vec![2.0, 0.0, 0.0];
    let c = vec![0.0, 1.0, 0.0];
    let d = vec![-1.0, 0.0, 0.0];

    assert!(angular_squared(&a, &b).abs() < 1e-6);
    assert!((angular_squared(&a, &c) - 2.0).abs() < 1e-6);
    assert!((angular_squared(&a, &d) - 4.0).abs() < 1e-6);
}

#[test]
fn test_angular_squared_zero_vector() {
    let zero = vec![0.0, 0.0];
    let a = vec![1.0, 1.0];
    assert!((angular_squared(&zero, &a) - 2.0).abs() < 1e-6);
}

#[test]
fn test_hamming_packed() {
    let a = vec![0u64, u64::MAX];
    let b = vec![0b1011u64, u64::MAX];
    assert_eq!(hamming_packed(&a, &b), 3);
    assert_eq!(hamming_packed(&a, &a), 0);
    assert_eq!(hamming_packed(&[0], &[u64::MAX]), 64);
}

#[test]
fn test_normalize() {
    let mut v = vec![3.0, 4.0];
    normalize(&mut v);
    assert!((norm(&v) - 1.0).abs() < 1e-6);

    let mut zero = vec![0.0, 0.0];
    normalize(&mut zero);
    assert_eq!(zero, vec![0.0, 0.0]);
}
