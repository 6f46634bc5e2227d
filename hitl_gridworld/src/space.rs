//! Finite discrete spaces for actions and observations.

use crate::error::{GridError, Result};
use rand::Rng;

/// A space of `n` values `0..n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discrete {
    n: usize,
}

impl Discrete {
    pub fn new(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(GridError::config("discrete space size must be positive"));
        }
        Ok(Self { n })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn contains(&self, value: usize) -> bool {
        value < self.n
    }

    /// Draw a value uniformly from `0..n`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        rng.gen_range(0..self.n)
    }
}
