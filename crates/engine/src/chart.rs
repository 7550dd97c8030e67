//! Chart model and the chart-comparison collaborator contracts.
//!
//! The ranking core treats a [`ChartComparison`] as opaque input produced by
//! a [`ChartComparator`].  [`ElementalChartComparator`] is the built-in
//! comparator for deployments without an external astrology service: it
//! reduces both charts to element shares and alchemical quantities and
//! measures how close they are.

use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::profile::{AlchemicalProfile, Element, ElementalProfile};
use crate::vector::{clamp_unit, l1_distance};

/// Share at or above which a natal element counts as a strength.
const FAVORABLE_SHARE: f64 = 0.25;

const NEUTRAL_SCORE: f64 = 0.5;

/// One body's position in a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanetPlacement {
    pub body: String,
    pub sign: String,
    #[serde(default)]
    pub degree: f64,
}

impl PlanetPlacement {
    pub fn new(body: impl Into<String>, sign: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            sign: sign.into(),
            degree: 0.0,
        }
    }
}

/// A user's birth chart.  `calculated_at` doubles as its cache identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NatalChart {
    pub calculated_at: String,
    #[serde(default)]
    pub placements: Vec<PlanetPlacement>,
}

/// The sky at a given moment, compared against a [`NatalChart`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MomentChart {
    pub calculated_at: String,
    #[serde(default)]
    pub placements: Vec<PlanetPlacement>,
}

impl From<&NatalChart> for MomentChart {
    fn from(chart: &NatalChart) -> Self {
        Self {
            calculated_at: chart.calculated_at.clone(),
            placements: chart.placements.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartInsights {
    #[serde(default)]
    pub favorable_elements: BTreeSet<Element>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartComparison {
    pub calculated_at: DateTime<Utc>,
    /// `[0, 1]`
    pub overall_harmony: f64,
    /// `[0, 1]`
    pub alchemical_alignment: f64,
    #[serde(default)]
    pub insights: ChartInsights,
}

impl ChartComparison {
    /// Copy with harmony and alignment forced into `[0, 1]` (NaN ⇒ 0.5).
    pub fn sanitized(&self) -> Self {
        Self {
            calculated_at: self.calculated_at,
            overall_harmony: clamp_unit(self.overall_harmony, NEUTRAL_SCORE),
            alchemical_alignment: clamp_unit(self.alchemical_alignment, NEUTRAL_SCORE),
            insights: self.insights.clone(),
        }
    }

    pub fn is_favorable(&self, element: Element) -> bool {
        self.insights.favorable_elements.contains(&element)
    }
}

/// Computes a [`ChartComparison`].  Usually backed by an external service.
#[async_trait]
pub trait ChartComparator: Send + Sync {
    async fn compare(
        &self,
        natal: &NatalChart,
        moment: Option<&MomentChart>,
    ) -> Result<ChartComparison>;
}

/// Supplies the chart for "now" when a caller does not pass one explicitly.
#[async_trait]
pub trait MomentChartSource: Send + Sync {
    async fn current_moment_chart(&self) -> Result<MomentChart>;
}

/// A [`MomentChartSource`] that always returns the same chart.
#[derive(Debug, Clone)]
pub struct FixedMomentChart(pub MomentChart);

#[async_trait]
impl MomentChartSource for FixedMomentChart {
    async fn current_moment_chart(&self) -> Result<MomentChart> {
        Ok(self.0.clone())
    }
}

// ── Natal alchemy ─────────────────────────────────────────────────────────────

/// Element shares and alchemical quantities derived from a chart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartAlchemy {
    /// Normalized element shares (all zero when no placement is recognized).
    pub elemental_balance: ElementalProfile,
    pub quantities: AlchemicalProfile,
}

pub fn sign_element(sign: &str) -> Option<Element> {
    match sign.trim().to_ascii_lowercase().as_str() {
        "aries" | "leo" | "sagittarius" => Some(Element::Fire),
        "taurus" | "virgo" | "capricorn" => Some(Element::Earth),
        "gemini" | "libra" | "aquarius" => Some(Element::Air),
        "cancer" | "scorpio" | "pisces" => Some(Element::Water),
        _ => None,
    }
}

/// Weight of a body in the element tally.  The luminaries and the ascendant
/// dominate, outer planets barely register, unknown bodies count once.
pub fn body_weight(body: &str) -> f64 {
    match body.trim() {
        "Sun" | "Moon" | "Ascendant" => 3.0,
        "Mercury" | "Venus" | "Mars" => 1.5,
        "Jupiter" | "Saturn" => 1.0,
        "Uranus" | "Neptune" | "Pluto" | "North Node" => 0.5,
        _ => 1.0,
    }
}

pub fn chart_alchemy(placements: &[PlanetPlacement]) -> ChartAlchemy {
    let mut tally = ElementalProfile::default();
    for placement in placements {
        if let Some(element) = sign_element(&placement.sign) {
            let current = tally.get(element);
            tally.set(element, current + body_weight(&placement.body));
        }
    }
    let balance = tally.normalized();

    let quantities = AlchemicalProfile::new(
        balance.fire * 0.6 + balance.air * 0.4,
        balance.water * 0.6 + balance.air * 0.4,
        balance.earth * 0.6 + balance.water * 0.4,
        balance.earth * 0.6 + balance.fire * 0.4,
    );

    ChartAlchemy {
        elemental_balance: balance,
        quantities,
    }
}

// ── Built-in comparator ───────────────────────────────────────────────────────

/// Compares charts by element balance and alchemical quantities.
///
/// * `overall_harmony`      = `1 − Σ|Δ element share| / 2`
/// * `alchemical_alignment` = `1 − mean |Δ quantity|`
/// * favorable elements     = natal strengths plus the moment's dominant
///   element when the natal chart holds any of it
#[derive(Debug, Clone, Copy, Default)]
pub struct ElementalChartComparator;

#[async_trait]
impl ChartComparator for ElementalChartComparator {
    async fn compare(
        &self,
        natal: &NatalChart,
        moment: Option<&MomentChart>,
    ) -> Result<ChartComparison> {
        Ok(compare_charts(natal, moment))
    }
}

pub fn compare_charts(natal: &NatalChart, moment: Option<&MomentChart>) -> ChartComparison {
    let natal_alchemy = chart_alchemy(&natal.placements);
    let natal_balance = natal_alchemy.elemental_balance;

    let mut favorable: BTreeSet<Element> = Element::ALL
        .into_iter()
        .filter(|element| natal_balance.get(*element) >= FAVORABLE_SHARE)
        .collect();

    let moment_alchemy = moment.map(|chart| chart_alchemy(&chart.placements));
    let (overall_harmony, alchemical_alignment) = match moment_alchemy {
        Some(moment_alchemy)
            if natal_balance.total() > 0.0 && moment_alchemy.elemental_balance.total() > 0.0 =>
        {
            let moment_balance = moment_alchemy.elemental_balance;
            let dominant = moment_balance.dominant_element();
            if natal_balance.get(dominant) > 0.0 {
                favorable.insert(dominant);
            }
            // Shares sum to 1, so halving the L1 distance lands in [0, 1]; the
            // quantities do not, so they use the per-dimension mean instead.
            let harmony = clamp_unit(
                1.0 - l1_distance(&natal_balance, &moment_balance) / 2.0,
                NEUTRAL_SCORE,
            );
            let alignment =
                quantity_alignment(&natal_alchemy.quantities, &moment_alchemy.quantities);
            (harmony, alignment)
        }
        _ => (NEUTRAL_SCORE, NEUTRAL_SCORE),
    };

    debug!(
        natal = %natal.calculated_at,
        moment = moment.map(|m| m.calculated_at.as_str()).unwrap_or("-"),
        overall_harmony,
        alchemical_alignment,
        favorable = favorable.len(),
        "charts compared"
    );

    ChartComparison {
        calculated_at: Utc::now(),
        overall_harmony,
        alchemical_alignment,
        insights: ChartInsights {
            favorable_elements: favorable,
        },
    }
}

fn quantity_alignment(a: &AlchemicalProfile, b: &AlchemicalProfile) -> f64 {
    let diff: f64 = a
        .as_array()
        .iter()
        .zip(b.as_array().iter())
        .map(|(x, y)| (x - y).abs())
        .sum();
    clamp_unit(1.0 - diff / 4.0, NEUTRAL_SCORE)
}
