//! Elemental compatibility between a candidate (recipe, cuisine, method) and
//! a reference profile (usually the user).
//!
//! Scoring model:
//! ```text
//! similarity    = 1 − Σ|rᵢ − uᵢ| / 2                       (clamped to [0, 1])
//! compatibility = FLOOR + (1 − FLOOR) · similarity           (FLOOR = 0.7)
//! balance       = mean over W of rᵢ / max r                W = argmin u (all ties)
//! ```
//! Every element is self-compatible or complementary, so no pairing scores
//! below the floor.  Identical profiles score 1.0.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::profile::{Element, ElementalProfile};
use crate::vector::{clamp_unit, l1_distance, safe_div};

/// No valid pairing scores below this.
pub const COMPATIBILITY_FLOOR: f64 = 0.7;

/// Identical profiles always reach at least this.
pub const IDENTICAL_PROFILE_MINIMUM: f64 = 0.88;

/// Balance score used when the reference profile has no weak side.
const NEUTRAL_BALANCE: f64 = 0.5;

/// Elements within this of the reference minimum count as tied for weakest.
const TIE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityResult {
    pub compatibility: f64,
    pub balance_score: f64,
    pub recommendation: String,
}

/// Score `recipe` against `user`.  Never fails; partial profiles are scored
/// with their missing dimensions at zero.
pub fn calculate_elemental_compatibility(
    recipe: &ElementalProfile,
    user: &ElementalProfile,
) -> CompatibilityResult {
    let recipe = recipe.sanitized();
    let user = user.sanitized();

    let similarity = clamp_unit(1.0 - l1_distance(&recipe, &user) / 2.0, 0.0);
    let compatibility = clamp_unit(
        COMPATIBILITY_FLOOR + (1.0 - COMPATIBILITY_FLOOR) * similarity,
        COMPATIBILITY_FLOOR,
    );
    let balance_score = balance_score(&recipe, &user);
    let recommendation = recommendation(compatibility, balance_score).to_string();

    trace!(similarity, compatibility, balance_score, "elemental compatibility scored");

    CompatibilityResult {
        compatibility,
        balance_score,
        recommendation,
    }
}

/// `1 − mean |Δ|` over the four elements, in `[0, 1]`.
pub fn elemental_harmony(a: &ElementalProfile, b: &ElementalProfile) -> f64 {
    clamp_unit(1.0 - l1_distance(&a.sanitized(), &b.sanitized()) / 4.0, 0.0)
}

/// How strongly `candidate` covers the weak side of `reference`.
///
/// The reference's weakest element (every element tied for weakest) is read
/// off the candidate, relative to the candidate's own peak.  A reference
/// with no weak side yields the neutral 0.5; an empty candidate covers
/// nothing.
pub fn balance_score(candidate: &ElementalProfile, reference: &ElementalProfile) -> f64 {
    let candidate = candidate.sanitized();
    let reference = reference.sanitized();

    let floor = reference.get(reference.weakest_element());
    let peak = reference.get(reference.dominant_element());
    if peak - floor <= TIE_TOLERANCE {
        return NEUTRAL_BALANCE;
    }
    let candidate_peak = candidate.get(candidate.dominant_element());
    if candidate_peak <= 0.0 {
        return 0.0;
    }

    let weakest: Vec<Element> = Element::ALL
        .into_iter()
        .filter(|element| reference.get(*element) - floor <= TIE_TOLERANCE)
        .collect();
    let covered: f64 = weakest
        .iter()
        .map(|element| candidate.get(*element) / candidate_peak)
        .sum();
    clamp_unit(safe_div(covered, weakest.len() as f64, NEUTRAL_BALANCE), NEUTRAL_BALANCE)
}

fn recommendation(compatibility: f64, balance_score: f64) -> &'static str {
    if compatibility >= 0.95 {
        "Excellent elemental harmony: this choice mirrors your current balance."
    } else if balance_score >= 0.6 {
        "Strong complementary match: it supplies the elements you are currently lacking."
    } else if compatibility >= 0.85 {
        "Good elemental harmony with a gentle touch of contrast."
    } else {
        "Contrasting elemental profile: enjoy it as a bold change of pace that \
         broadens your balance."
    }
}
