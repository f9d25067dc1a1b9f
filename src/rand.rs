// Linear congruential generator parameters
const MUL: u64 = 6364136223846793005; // Knuth section 3.3.4 (p.108)
const INC: u64 = 1442695040888963407;

/// Single-stream PCG32. Turns user-facing `f64` seeds into the integer seeds that the noise
/// permutation tables want, and builds reproducible test fixtures.
#[derive(Clone, PartialEq)]
pub struct Rng {
    state: u64,
}

impl Rng {
    /// Seeds from the bit pattern of `seed`, so `0.0` and `-0.0` are distinct seeds while any
    /// two equal non-NaN values give the same stream.
    pub fn from_f64_seed(seed: f64) -> Rng {
        let mut rng = Rng { state: 0 };
        rng.next_u32();
        rng.state = rng.state.wrapping_add(seed.to_bits());
        rng.next_u32();
        rng
    }

    /// Advances the generator and returns 32 uniformly distributed bits.
    pub fn next_u32(&mut self) -> u32 {
        let old_state = self.state;
        self.state = old_state.wrapping_mul(MUL).wrapping_add(INC);
        // XSH-RR output function on the old state.
        let xorshifted = (((old_state >> 18) ^ old_state) >> 27) as u32;
        xorshifted.rotate_right((old_state >> 59) as u32)
    }

    /// Picks a random value uniformly distributed between `0.0` (inclusive) and `1.0` (exclusive).
    pub fn rnd(&mut self) -> f64 {
        2.0f64.powi(-32) * f64::from(self.next_u32())
    }

    /// Picks a random value uniformly distributed between `min` (inclusive) and `max` (exclusive).
    pub fn uniform(&mut self, min: f64, max: f64) -> f64 {
        self.rnd() * (max - min) + min
    }
}

/// Derives the 32-bit seed for a simplex permutation table from a user-facing seed.
pub fn noise_seed(seed: f64) -> u32 {
    Rng::from_f64_seed(seed).next_u32()
}
