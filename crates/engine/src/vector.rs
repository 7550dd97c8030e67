//! Scalar helpers over the four-dimensional profiles.
//!
//! Everything here is pure.  Absent dimensions are already `0.0` by the time
//! a profile reaches these functions (see [`crate::profile`]).

use crate::profile::{AlchemicalProfile, ElementalProfile};

/// Floor applied to the base of [`safe_pow`].
pub const POW_EPSILON: f64 = 0.001;

/// `Σ aᵢ·bᵢ` over two elemental profiles.
pub fn dot(a: &ElementalProfile, b: &ElementalProfile) -> f64 {
    a.as_array()
        .iter()
        .zip(b.as_array().iter())
        .map(|(x, y)| x * y)
        .sum()
}

/// `Σ aᵢ·bᵢ` over two alchemical profiles.
pub fn alchemical_dot(a: &AlchemicalProfile, b: &AlchemicalProfile) -> f64 {
    a.as_array()
        .iter()
        .zip(b.as_array().iter())
        .map(|(x, y)| x * y)
        .sum()
}

/// `Σ vᵢ·wᵢ`.  Extra entries in the longer slice are ignored.
pub fn weighted_sum(values: &[f64], weights: &[f64]) -> f64 {
    values.iter().zip(weights.iter()).map(|(v, w)| v * w).sum()
}

pub fn sum_of_squares(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

/// `Σ |aᵢ − bᵢ|` over two elemental profiles.
pub fn l1_distance(a: &ElementalProfile, b: &ElementalProfile) -> f64 {
    a.as_array()
        .iter()
        .zip(b.as_array().iter())
        .map(|(x, y)| (x - y).abs())
        .sum()
}

/// `base^exponent` with `base` floored to [`POW_EPSILON`].
///
/// The alchemical formulas raise values to themselves, so `0^0` and friends
/// show up routinely.  The result is still passed through [`finite_or`] so a
/// huge exponent cannot leak an infinity.
pub fn safe_pow(base: f64, exponent: f64) -> f64 {
    let base = if base.is_finite() { base.max(POW_EPSILON) } else { POW_EPSILON };
    let exponent = if exponent.is_finite() { exponent } else { 0.0 };
    finite_or(base.powf(exponent), 1.0)
}

/// `numerator / denominator`, or `fallback` when the denominator is zero or
/// the quotient is not finite.
pub fn safe_div(numerator: f64, denominator: f64, fallback: f64) -> f64 {
    if denominator == 0.0 {
        return fallback;
    }
    finite_or(numerator / denominator, fallback)
}

pub fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

/// Clamp into `[0, 1]`, mapping NaN to `fallback`.
pub fn clamp_unit(value: f64, fallback: f64) -> f64 {
    finite_or(value, fallback).clamp(0.0, 1.0)
}
