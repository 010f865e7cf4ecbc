//! Color Rotator
//!
//! Picks a fresh random brush color on every color tick. Pure local
//! computation, so there is no error path.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::color::HexColor;

pub struct ColorRotator<R = StdRng> {
    rng: R,
}

impl ColorRotator<StdRng> {
    /// Rotator seeded from the operating system
    pub fn new() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    /// Deterministic rotator, for tests and reproducible sessions
    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl<R: Rng> ColorRotator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Next color; consecutive draws are independent and may repeat
    pub fn next_color(&mut self) -> HexColor {
        HexColor::random(&mut self.rng)
    }
}

impl Default for ColorRotator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}
