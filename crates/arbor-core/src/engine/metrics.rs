//! Per-metric behavior plugged into [`ForestIndex`](super::ForestIndex).
//!
//! A [`Metric`] decides how items are stored, compared and partitioned.
//! Angular, Euclidean and Manhattan share the hyperplane machinery and store
//! `f32`; Hamming stores packed `u64` words and splits on single bits.

use super::node::{BitSplit, Hyperplane};
use super::random::XorShiftRng;
use crate::distance;
use crate::metric::{MetricKind, BITS_PER_WORD};
use bytemuck::Pod;
use std::fmt::Debug;

/// Number of refinement steps in two-means split selection.
const TWO_MEANS_STEPS: usize = 200;

/// Attempts at finding a bit that separates a Hamming bucket before
/// falling back to a linear scan.
const BIT_SPLIT_ATTEMPTS: usize = 20;

/// Starting priority for Hamming search. Finite so that each mismatched
/// split can lower it by exactly one.
const HAMMING_PQ_INITIAL: f32 = 1_048_576.0;

/// Distance metric plugged into the forest engine.
pub trait Metric: Send + Sync + Debug + 'static {
    /// Stored element type; laid out as raw words in index files.
    type Element: Pod + Default + PartialEq + Debug + Send + Sync;
    /// Split description chosen while building.
    type Split: Clone + Debug + Send + Sync;

    /// Metric tag written into persisted indexes.
    const KIND: MetricKind;

    /// Engine-internal distance; monotonic in the reported distance.
    fn distance(a: &[Self::Element], b: &[Self::Element]) -> f32;

    /// Converts an internal distance into the value reported to callers.
    fn normalized_distance(raw: f32) -> Self::Element;

    /// Picks a split for a set of at least two points.
    fn create_split(points: &[&[Self::Element]], rng: &mut XorShiftRng) -> Self::Split;

    /// Arena words taken by one split over items of `dimension` elements.
    fn split_words(dimension: usize) -> usize;

    /// Writes `split` into `out`, which is [`split_words`](Self::split_words)
    /// long.
    fn encode_split(split: &Self::Split, out: &mut [u32]);

    /// Whether an encoded split can be applied to items of `dimension`
    /// elements.
    fn split_fits(stored: &[u32], dimension: usize) -> bool;

    /// Signed position of `v` relative to `split`.
    fn margin(split: &Self::Split, v: &[Self::Element]) -> f32;

    /// Signed position of `v` relative to an encoded split.
    fn stored_margin(stored: &[u32], v: &[Self::Element]) -> f32;

    /// Child side (0 or 1) for `v`; ties are broken at random.
    fn side(split: &Self::Split, v: &[Self::Element], rng: &mut XorShiftRng) -> usize {
        let margin = Self::margin(split, v);
        if margin > 0.0 {
            1
        } else if margin < 0.0 {
            0
        } else {
            rng.flip()
        }
    }

    /// Priority given to the roots at the start of a search.
    fn pq_initial() -> f32 {
        f32::INFINITY
    }

    /// Priority of descending into `side` of a split with the given margin.
    fn pq_distance(priority: f32, margin: f32, side: usize) -> f32 {
        let margin = if side == 0 { -margin } else { margin };
        priority.min(margin)
    }
}

/// Angular distance over `f32` vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Angular;

/// Euclidean distance over `f32` vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

/// Manhattan distance over `f32` vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Manhattan;

/// Hamming distance over packed `u64` words.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hamming;

impl Metric for Angular {
    type Element = f32;
    type Split = Hyperplane;

    const KIND: MetricKind = MetricKind::Angular;

    fn split_words(dimension: usize) -> usize {
        dimension + 1
    }

    fn encode_split(split: &Hyperplane, out: &mut [u32]) {
        encode_plane(split, out);
    }

    fn split_fits(stored: &[u32], dimension: usize) -> bool {
        stored.len() == dimension + 1
    }

    fn stored_margin(stored: &[u32], v: &[f32]) -> f32 {
        plane_margin(stored, v)
    }

    fn distance(a: &[f32], b: &[f32]) -> f32 {
        distance::angular_squared(a, b)
    }

    fn normalized_distance(raw: f32) -> f32 {
        raw.max(0.0).sqrt()
    }

    fn create_split(points: &[&[f32]], rng: &mut XorShiftRng) -> Hyperplane {
        let (p, q) = two_means::<Self>(points, true, rng);
        let mut normal: Vec<f32> = p.iter().zip(&q).map(|(a, b)| a - b).collect();
        distance::normalize(&mut normal);
        Hyperplane {
            normal,
            offset: 0.0,
        }
    }

    fn margin(split: &Hyperplane, v: &[f32]) -> f32 {
        distance::dot(&split.normal, v)
    }
}

impl Metric for Euclidean {
    type Element = f32;
    type Split = Hyperplane;

    const KIND: MetricKind = MetricKind::Euclidean;

    fn split_words(dimension: usize) -> usize {
        dimension + 1
    }

    fn encode_split(split: &Hyperplane, out: &mut [u32]) {
        encode_plane(split, out);
    }

    fn split_fits(stored: &[u32], dimension: usize) -> bool {
        stored.len() == dimension + 1
    }

    fn stored_margin(stored: &[u32], v: &[f32]) -> f32 {
        plane_margin(stored, v)
    }

    fn distance(a: &[f32], b: &[f32]) -> f32 {
        distance::euclidean_squared(a, b)
    }

    fn normalized_distance(raw: f32) -> f32 {
        raw.max(0.0).sqrt()
    }

    fn create_split(points: &[&[f32]], rng: &mut XorShiftRng) -> Hyperplane {
        offset_hyperplane::<Self>(points, rng)
    }

    fn margin(split: &Hyperplane, v: &[f32]) -> f32 {
        split.offset + distance::dot(&split.normal, v)
    }
}

impl Metric for Manhattan {
    type Element = f32;
    type Split = Hyperplane;

    const KIND: MetricKind = MetricKind::Manhattan;

    fn split_words(dimension: usize) -> usize {
        dimension + 1
    }

    fn encode_split(split: &Hyperplane, out: &mut [u32]) {
        encode_plane(split, out);
    }

    fn split_fits(stored: &[u32], dimension: usize) -> bool {
        stored.len() == dimension + 1
    }

    fn stored_margin(stored: &[u32], v: &[f32]) -> f32 {
        plane_margin(stored, v)
    }

    fn distance(a: &[f32], b: &[f32]) -> f32 {
        distance::manhattan(a, b)
    }

    fn normalized_distance(raw: f32) -> f32 {
        raw.max(0.0)
    }

    fn create_split(points: &[&[f32]], rng: &mut XorShiftRng) -> Hyperplane {
        offset_hyperplane::<Self>(points, rng)
    }

    fn margin(split: &Hyperplane, v: &[f32]) -> f32 {
        split.offset + distance::dot(&split.normal, v)
    }
}

impl Metric for Hamming {
    type Element = u64;
    type Split = BitSplit;

    const KIND: MetricKind = MetricKind::Hamming;

    fn split_words(_dimension: usize) -> usize {
        1
    }

    fn encode_split(split: &BitSplit, out: &mut [u32]) {
        out[0] = split.bit;
    }

    fn split_fits(stored: &[u32], dimension: usize) -> bool {
        matches!(stored, [bit] if (*bit as usize) < dimension * BITS_PER_WORD)
    }

    fn stored_margin(stored: &[u32], v: &[u64]) -> f32 {
        let split = BitSplit {
            bit: stored.first().copied().unwrap_or(0),
        };
        Self::margin(&split, v)
    }

    fn distance(a: &[u64], b: &[u64]) -> f32 {
        distance::hamming_packed(a, b) as f32
    }

    fn normalized_distance(raw: f32) -> u64 {
        raw.max(0.0) as u64
    }

    fn create_split(points: &[&[u64]], rng: &mut XorShiftRng) -> BitSplit {
        let bits = points.first().map_or(0, |p| p.len() * BITS_PER_WORD);
        if bits == 0 {
            return BitSplit { bit: 0 };
        }

        let separates = |bit: usize| {
            let set = points.iter().filter(|p| bit_is_set(p, bit)).count();
            set > 0 && set < points.len()
        };

        for _ in 0..BIT_SPLIT_ATTEMPTS {
            let bit = rng.index(bits);
            if separates(bit) {
                return BitSplit { bit: bit as u32 };
            }
        }

        // Identical points fall through to bit 0; the builder then assigns
        // sides at random.
        let bit = (0..bits).find(|&bit| separates(bit)).unwrap_or(0);
        BitSplit { bit: bit as u32 }
    }

    fn margin(split: &BitSplit, v: &[u64]) -> f32 {
        if bit_is_set(v, split.bit as usize) {
            1.0
        } else {
            0.0
        }
    }

    fn side(split: &BitSplit, v: &[u64], _rng: &mut XorShiftRng) -> usize {
        usize::from(bit_is_set(v, split.bit as usize))
    }

    fn pq_initial() -> f32 {
        HAMMING_PQ_INITIAL
    }

    fn pq_distance(priority: f32, margin: f32, side: usize) -> f32 {
        let query_side = usize::from(margin > 0.5);
        if query_side == side {
            priority
        } else {
            priority - 1.0
        }
    }
}

#[inline]
fn bit_is_set(words: &[u64], bit: usize) -> bool {
    (words[bit / BITS_PER_WORD] >> (bit % BITS_PER_WORD)) & 1 == 1
}

/// Writes a plane as `[offset, normal...]`.
fn encode_plane(plane: &Hyperplane, out: &mut [u32]) {
    let floats: &mut [f32] = bytemuck::cast_slice_mut(out);
    floats[0] = plane.offset;
    floats[1..].copy_from_slice(&plane.normal);
}

fn plane_margin(stored: &[u32], v: &[f32]) -> f32 {
    let floats: &[f32] = bytemuck::cast_slice(stored);
    match floats.split_first() {
        Some((offset, normal)) => offset + distance::dot(normal, v),
        None => 0.0,
    }
}

/// Hyperplane bisecting the two-means centroids, used by Euclidean and
/// Manhattan.
fn offset_hyperplane<M: Metric<Element = f32>>(
    points: &[&[f32]],
    rng: &mut XorShiftRng,
) -> Hyperplane {
    let (p, q) = two_means::<M>(points, false, rng);
    let mut normal: Vec<f32> = p.iter().zip(&q).map(|(a, b)| a - b).collect();
    distance::normalize(&mut normal);
    let midpoint: Vec<f32> = p.iter().zip(&q).map(|(a, b)| (a + b) / 2.0).collect();
    let offset = -distance::dot(&normal, &midpoint);
    Hyperplane { normal, offset }
}

/// Approximate two-means clustering over a random sample of `points`.
///
/// Returns the two centroids. With `cosine`, points are weighted by their
/// inverse norm so only direction matters.
fn two_means<M: Metric<Element = f32>>(
    points: &[&[f32]],
    cosine: bool,
    rng: &mut XorShiftRng,
) -> (Vec<f32>, Vec<f32>) {
    let count = points.len();
    debug_assert!(count >= 2);

    let i = rng.index(count);
    let mut j = rng.index(count - 1);
    if j >= i {
        j += 1;
    }

    let mut p = points[i].to_vec();
    let mut q = points[j].to_vec();
    if cosine {
        distance::normalize(&mut p);
        distance::normalize(&mut q);
    }

    let mut ic = 1.0f32;
    let mut jc = 1.0f32;
    for _ in 0..TWO_MEANS_STEPS {
        let k = rng.index(count);
        let point = points[k];
        let di = ic * M::distance(&p, point);
        let dj = jc * M::distance(&q, point);
        let norm = if cosine { distance::norm(point) } else { 1.0 };
        if norm.is_nan() || norm <= 0.0 {
            continue;
        }

        if di < dj {
            update_mean(&mut p, point, norm, ic);
            ic += 1.0;
        } else if dj < di {
            update_mean(&mut q, point, norm, jc);
            jc += 1.0;
        }
    }

    (p, q)
}

#[inline]
fn update_mean(mean: &mut [f32], point: &[f32], norm: f32, count: f32) {
    for (m, x) in mean.iter_mut().zip(point) {
        *m = (*m * count + x / norm) / (count + 1.0);
    }
}
