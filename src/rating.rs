#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{MU, SIGMA};

/// Gaussian belief over a single player's skill, exposed as `(mu, sigma)`.
///
/// Ratings are plain values: rating a match never mutates its inputs, it
/// returns fresh ones.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rating {
    mu: f64,
    sigma: f64,
}

impl Eq for Rating {}

impl Rating {
    #[inline]
    pub const fn new(mu: f64, sigma: f64) -> Self {
        Self { mu, sigma }
    }

    #[inline]
    pub const fn mu(&self) -> f64 {
        self.mu
    }

    #[inline]
    pub const fn sigma(&self) -> f64 {
        self.sigma
    }

    #[inline]
    pub fn variance(&self) -> f64 {
        self.sigma * self.sigma
    }
}

impl Default for Rating {
    #[inline]
    fn default() -> Self {
        Self::new(MU, SIGMA)
    }
}
