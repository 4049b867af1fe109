use core::f64::consts::SQRT_2;

use statrs::consts::SQRT_2PI;
use statrs::distribution::{Continuous, InverseCDF, Normal, Univariate};
use statrs::function::erf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Denominators below this are treated as collapsed rather than divided by.
const MIN_DENOM: f64 = f64::MIN_POSITIVE;

/// Provider of the standard-normal primitives Φ, φ and Φ⁻¹.
///
/// `Internal` evaluates them straight from the error function, `Statrs` goes
/// through [`statrs::distribution::Normal`]. Both run at f64 precision; a
/// caller hitting [`Error::FloatingPoint`] on one can retry with the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Backend {
    Internal,
    Statrs,
}

impl Default for Backend {
    #[inline]
    fn default() -> Self {
        Backend::Internal
    }
}

impl Backend {
    /// Cumulative distribution function Φ.
    #[inline]
    pub fn cdf(self, x: f64) -> f64 {
        match self {
            Backend::Internal => 0.5 * erf::erfc(-x / SQRT_2),
            Backend::Statrs => Normal::new(0.0, 1.0).unwrap().cdf(x),
        }
    }

    /// Probability density function φ.
    #[inline]
    pub fn pdf(self, x: f64) -> f64 {
        match self {
            Backend::Internal => (-0.5 * x * x).exp() / SQRT_2PI,
            Backend::Statrs => Normal::new(0.0, 1.0).unwrap().pdf(x),
        }
    }

    /// Inverse cumulative distribution function Φ⁻¹.
    #[inline]
    pub fn inverse_cdf(self, x: f64) -> f64 {
        match self {
            Backend::Internal => -SQRT_2 * erf::erfc_inv(2.0 * x),
            Backend::Statrs => Normal::new(0.0, 1.0).unwrap().inverse_cdf(x),
        }
    }
}

/// Margin ε such that a performance difference within ±ε counts as a draw,
/// for a match with `n` players in total.
pub(crate) fn draw_margin(draw_probability: f64, n: f64, beta: f64, backend: Backend) -> f64 {
    backend.inverse_cdf((draw_probability + 1.0) / 2.0) * n.sqrt() * beta
}

/// Mean correction of a Gaussian truncated to a win, at normalized distance
/// `t` and margin `eps`.
pub(crate) fn v_win(t: f64, eps: f64, backend: Backend) -> Result<f64, Error> {
    let x = t - eps;
    let denom = backend.cdf(x);
    if denom < MIN_DENOM {
        return Err(Error::FloatingPoint("cdf collapsed in win correction"));
    }
    Ok(backend.pdf(x) / denom)
}

/// Variance correction of a Gaussian truncated to a win.
pub(crate) fn w_win(t: f64, eps: f64, backend: Backend) -> Result<f64, Error> {
    let x = t - eps;
    let v = v_win(t, eps, backend)?;
    let w = v * (v + x);
    if !(w > 0.0 && w < 1.0) {
        return Err(Error::FloatingPoint("win variance correction left (0, 1)"));
    }
    Ok(w)
}

/// Mean correction of a Gaussian truncated to a draw. Odd in `t`, so the
/// computation runs on |t| and restores the sign at the end.
pub(crate) fn v_draw(t: f64, eps: f64, backend: Backend) -> Result<f64, Error> {
    let abs_t = t.abs();
    let a = eps - abs_t;
    let b = -eps - abs_t;
    let denom = backend.cdf(a) - backend.cdf(b);
    if denom < MIN_DENOM {
        return Err(Error::FloatingPoint("cdf collapsed in draw correction"));
    }
    let v = (backend.pdf(b) - backend.pdf(a)) / denom;
    Ok(if t < 0.0 { -v } else { v })
}

/// Variance correction of a Gaussian truncated to a draw. Even in `t`.
pub(crate) fn w_draw(t: f64, eps: f64, backend: Backend) -> Result<f64, Error> {
    let abs_t = t.abs();
    let a = eps - abs_t;
    let b = -eps - abs_t;
    let denom = backend.cdf(a) - backend.cdf(b);
    if denom < MIN_DENOM {
        return Err(Error::FloatingPoint("cdf collapsed in draw correction"));
    }
    let v = v_draw(abs_t, eps, backend)?;
    Ok(v * v + (a * backend.pdf(a) - b * backend.pdf(b)) / denom)
}
