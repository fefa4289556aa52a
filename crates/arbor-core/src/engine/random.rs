//! Seedable PRNG driving split decisions.

/// xorshift64* generator.
///
/// Small, fast and fully reproducible for a given seed, which is all the
/// forest builder needs. Not suitable for anything security related.
#[derive(Debug, Clone)]
pub struct XorShiftRng {
    state: u64,
}

impl XorShiftRng {
    /// Seed used when none is given. xorshift cannot run from a zero state.
    pub const DEFAULT_SEED: u64 = 0x5DEE_CE66_D1A4_B5B5;

    /// Creates a generator; a zero seed is replaced by [`Self::DEFAULT_SEED`].
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { Self::DEFAULT_SEED } else { seed },
        }
    }

    /// Next 64 random bits.
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform index in `0..n`. `n` must be non-zero.
    pub fn index(&mut self, n: usize) -> usize {
        debug_assert!(n > 0);
        (self.next_u64() % n as u64) as usize
    }

    /// Fair coin, returned as a child side (0 or 1).
    pub fn flip(&mut self) -> usize {
        (self.next_u64() >> 63) as usize
    }
}

impl Default for XorShiftRng {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SEED)
    }
}
