//! Thermodynamic-style metrics for a single item.
//!
//! All formulas read eight scalars: the alchemical `S E M U` (Spirit,
//! Essence, Matter, Substance) and the elemental `F W Ea Ai`.
//!
//! ```text
//! heat        = (S² + F²) / (U + E + M + W + Ai + Ea)²
//! entropy     = (S² + U² + F² + Ai²) / (E + M + Ea + W)²
//! reactivity  = (S² + U² + E² + F² + Ai² + W²) / (M + Ea)²
//! gregsEnergy = heat − entropy·reactivity
//! kalchm      = (S^S · E^E) / (M^M · U^U)
//! monica      = −gregsEnergy / (reactivity · ln kalchm)
//! ```
//!
//! Nothing here can fail.  Zero denominators and undefined logarithms fall
//! back to `0.0`, which classifies as [`MonicaClassification::Stable`].
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::profile::{AlchemicalProfile, ElementalProfile};
use crate::vector::{finite_or, safe_div, safe_pow, sum_of_squares};

/// Value reported for the Monica constant when it is undefined.
pub const MONICA_SENTINEL: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MonicaClassification {
    #[serde(rename = "Highly Transformative")]
    HighlyTransformative,
    Transformative,
    #[serde(rename = "Moderately Active")]
    ModeratelyActive,
    Stable,
}

impl MonicaClassification {
    /// Bucket `|monica|`: `>10`, `>5`, `>1`, otherwise stable.
    pub fn from_monica(monica: f64) -> Self {
        if !monica.is_finite() {
            return Self::Stable;
        }
        let magnitude = monica.abs();
        if magnitude > 10.0 {
            Self::HighlyTransformative
        } else if magnitude > 5.0 {
            Self::Transformative
        } else if magnitude > 1.0 {
            Self::ModeratelyActive
        } else {
            Self::Stable
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::HighlyTransformative => "Highly Transformative",
            Self::Transformative => "Transformative",
            Self::ModeratelyActive => "Moderately Active",
            Self::Stable => "Stable",
        }
    }

    /// 0.0 for stable up to 1.0 for highly transformative.
    pub fn intensity(self) -> f64 {
        match self {
            Self::HighlyTransformative => 1.0,
            Self::Transformative => 2.0 / 3.0,
            Self::ModeratelyActive => 1.0 / 3.0,
            Self::Stable => 0.0,
        }
    }
}

impl fmt::Display for MonicaClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermodynamicMetrics {
    pub heat: f64,
    pub entropy: f64,
    pub reactivity: f64,
    pub gregs_energy: f64,
    pub kalchm: f64,
    pub monica_constant: f64,
    pub monica_classification: MonicaClassification,
    /// Share of heat in `heat + entropy + reactivity`, in `[0, 1]`.
    pub efficiency: f64,
}

pub fn calculate_thermodynamics(
    alchemical: &AlchemicalProfile,
    elemental: &ElementalProfile,
) -> ThermodynamicMetrics {
    let AlchemicalProfile {
        spirit: s,
        essence: e,
        matter: m,
        substance: u,
    } = alchemical.sanitized();
    let ElementalProfile {
        fire: f,
        water: w,
        earth: ea,
        air: ai,
    } = elemental.sanitized();

    let heat = safe_div(sum_of_squares(&[s, f]), (u + e + m + w + ai + ea).powi(2), 0.0);
    let entropy = safe_div(sum_of_squares(&[s, u, f, ai]), (e + m + ea + w).powi(2), 0.0);
    let reactivity = safe_div(sum_of_squares(&[s, u, e, f, ai, w]), (m + ea).powi(2), 0.0);
    let gregs_energy = finite_or(heat - entropy * reactivity, 0.0);

    let kalchm = safe_div(
        safe_pow(s, s) * safe_pow(e, e),
        safe_pow(m, m) * safe_pow(u, u),
        1.0,
    );
    let monica_constant = monica(gregs_energy, reactivity, kalchm);
    let monica_classification = MonicaClassification::from_monica(monica_constant);
    let efficiency = safe_div(heat, heat + entropy + reactivity, 0.0).clamp(0.0, 1.0);

    trace!(
        heat,
        entropy,
        reactivity,
        gregs_energy,
        kalchm,
        monica_constant,
        classification = monica_classification.label(),
        "thermodynamics computed"
    );

    ThermodynamicMetrics {
        heat,
        entropy,
        reactivity,
        gregs_energy,
        kalchm,
        monica_constant,
        monica_classification,
        efficiency,
    }
}

fn monica(gregs_energy: f64, reactivity: f64, kalchm: f64) -> f64 {
    if kalchm <= 0.0 || reactivity == 0.0 {
        return MONICA_SENTINEL;
    }
    let ln_kalchm = kalchm.ln();
    if ln_kalchm == 0.0 || !ln_kalchm.is_finite() {
        return MONICA_SENTINEL;
    }
    finite_or(-gregs_energy / (reactivity * ln_kalchm), MONICA_SENTINEL)
}
