// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pseudo-random source for the fail-roll, injectable so tests can force a
//! deterministic outcome instead of drawing from the process-wide RNG.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Draws a single uniform sample in `[0, 1)` for the fail-roll.
pub trait FailRoll: Send + Sync {
    fn roll(&mut self) -> f64;
}

/// Seeded `StdRng`-backed source used in production.
pub struct SeededRoll(StdRng);

impl SeededRoll {
    /// Seed from OS entropy.
    pub fn from_entropy() -> Self {
        Self(StdRng::from_rng(&mut rand::rng()))
    }

    /// Seed deterministically (used by tests that need reproducibility
    /// across runs without hard-coding the fail/succeed outcome).
    pub fn from_seed(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl FailRoll for SeededRoll {
    fn roll(&mut self) -> f64 {
        self.0.random::<f64>()
    }
}

/// Fixed-sequence source for scenario tests (§8): returns each value in
/// `sequence` once, in order, then repeats the last value forever.
pub struct FixedRoll {
    sequence: Vec<f64>,
    next: usize,
}

impl FixedRoll {
    pub fn new(sequence: Vec<f64>) -> Self {
        assert!(!sequence.is_empty(), "FixedRoll requires at least one value");
        Self { sequence, next: 0 }
    }

    pub fn always(value: f64) -> Self {
        Self::new(vec![value])
    }
}

impl FailRoll for FixedRoll {
    fn roll(&mut self) -> f64 {
        let v = self.sequence[self.next.min(self.sequence.len() - 1)];
        if self.next < self.sequence.len() - 1 {
            self.next += 1;
        }
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_roll_repeats_last_value() {
        let mut roll = FixedRoll::new(vec![0.1, 0.9]);
        assert_eq!(roll.roll(), 0.1);
        assert_eq!(roll.roll(), 0.9);
        assert_eq!(roll.roll(), 0.9);
    }

    #[test]
    fn seeded_roll_is_in_unit_range() {
        let mut roll = SeededRoll::from_seed(42);
        for _ in 0..100 {
            let v = roll.roll();
            assert!((0.0..1.0).contains(&v));
        }
    }
}
