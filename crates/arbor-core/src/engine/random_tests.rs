//! Tests for `random` module

use super::random::XorShiftRng;

#[test]
fn test_same_seed_same_sequence() {
    let mut a = XorShiftRng::new(42);
    let mut b = XorShiftRng::new(42);
    for _ in 0..100 {
        assert_eq!(a.next_u64(), b.next_u64());
    }
}

#[test]
fn test_different_seeds_diverge() {
    let mut a = XorShiftRng::new(1);
    let mut b = XorShiftRng::new(2);
    let same = (0..32).filter(|_| a.next_u64() == b.next_u64()).count();
    assert!(same < 32);
}

#[test]
fn test_zero_seed_uses_default() {
    let mut zero = XorShiftRng::new(0);
    let mut default = XorShiftRng::default();
    assert_eq!(zero.next_u64(), default.next_u64());
}

#[test]
fn test_index_in_range() {
    let mut rng = XorShiftRng::new(7);
    for n in 1..50 {
        for _ in 0..20 {
            assert!(rng.index(n) < n);
        }
    }
}

#[test]
fn test_flip_produces_both_sides() {
    let mut rng = XorShiftRng::new(99);
    let ones: usize = (0..1000).map(|_| rng.flip()).sum();
    assert!(ones > 350 && ones < 650, "biased coin: {ones}/1000");
}
