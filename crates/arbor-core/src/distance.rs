//! Raw distance kernels.
//!
//! These return the engine-internal distance for each metric. Conversion to
//! the value reported to callers (square roots, clamping) happens in the
//! engine metric, so comparisons during search stay cheap.

/// Dot product of two equal-length slices.
///
/// Uses 4-wide unrolling so the compiler can vectorize the loop.
#[inline]
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let chunks = a.len() / 4;
    let mut acc = [0.0f32; 4];
    for i in 0..chunks {
        let base = i * 4;
        acc[0] += a[base] * b[base];
        acc[1] += a[base + 1] * b[base + 1];
        acc[2] += a[base + 2] * b[base + 2];
        acc[3] += a[base + 3] * b[base + 3];
    }

    let mut sum = acc[0] + acc[1] + acc[2] + acc[3];
    for i in chunks * 4..a.len() {
        sum += a[i] * b[i];
    }
    sum
}

/// Squared Euclidean distance.
#[inline]
#[must_use]
pub fn euclidean_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Manhattan (L1) distance.
#[inline]
#[must_use]
pub fn manhattan(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

/// Squared chord length between the normalized inputs, `2 - 2 * cos(a, b)`.
///
/// A zero-norm input is treated as maximally distant (returns 2.0).
#[inline]
#[must_use]
pub fn angular_squared(a: &[f32], b: &[f32]) -> f32 {
    let pp = dot(a, a);
    let qq = dot(b, b);
    let pq = dot(a, b);
    let ppqq = pp * qq;
    if ppqq > 0.0 {
        2.0 - 2.0 * pq / ppqq.sqrt()
    } else {
        2.0
    }
}

/// Hamming distance between packed bit vectors (POPCNT on `u64`).
#[inline]
#[must_use]
pub fn hamming_packed(a: &[u64], b: &[u64]) -> u32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// L2 norm of a vector.
#[inline]
#[must_use]
pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Scales `v` to unit length in place. Zero vectors are left unchanged.
#[inline]
pub fn normalize(v: &mut [f32]) {
    let n = norm(v);
    if n > 0.0 {
        for x in v.iter_mut() {
            *x /= n;
        }
    }
}
