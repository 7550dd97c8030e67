//! Chart-aware personalization of candidate scores.
//!
//! Boost model (clamped to `[0.7, 1.3]`):
//! ```text
//! boost = 1
//!       + 0.3 · (harmony − 0.5)                          chart vs. current sky
//!       + 0.2 · (favorable share − 0.5)                  candidate's elements the chart favors
//!       + 0.1 · (alignment − 0.5) · (1 + intensity)      alchemy, amplified by Monica intensity
//! personalizedScore = baseScore · boost
//! ```
//! The favorable-share term is dropped when the chart names no favorable
//! element or the candidate has no elemental weight.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use alchm_config::EngineConfig;

use crate::cache::ChartComparisonCache;
use crate::chart::{ChartComparator, ChartComparison, MomentChart, MomentChartSource, NatalChart};
use crate::profile::{AlchemicalProfile, ElementalProfile};
use crate::thermo::calculate_thermodynamics;
use crate::vector::{clamp_unit, finite_or};

pub const MIN_BOOST: f64 = 0.7;
pub const MAX_BOOST: f64 = 1.3;
pub const DEFAULT_BASE_SCORE: f64 = 0.5;
pub const DEFAULT_LIMIT: usize = 10;

/// An item that can be recommended: a cuisine, recipe or cooking method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub elemental_profile: ElementalProfile,
    #[serde(default)]
    pub alchemical_profile: AlchemicalProfile,
    /// `[0, 1]`; the ranker's default applies when absent.
    #[serde(default)]
    pub base_score: Option<f64>,
}

impl Candidate {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        elemental_profile: ElementalProfile,
        alchemical_profile: AlchemicalProfile,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            elemental_profile,
            alchemical_profile,
            base_score: None,
        }
    }

    pub fn with_base_score(mut self, base_score: f64) -> Self {
        self.base_score = Some(base_score);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    pub id: String,
    pub name: String,
    pub base_score: f64,
    pub personalized_score: f64,
    pub personalization_boost: f64,
    pub reasons: Vec<String>,
    pub elemental_profile: ElementalProfile,
    pub alchemical_profile: AlchemicalProfile,
}

#[derive(Debug, Clone)]
pub struct RankingContext {
    pub natal_chart: NatalChart,
    /// When `None` the ranker asks its [`MomentChartSource`].
    pub moment_chart: Option<MomentChart>,
    pub include_reasons: bool,
}

impl RankingContext {
    pub fn new(natal_chart: NatalChart) -> Self {
        Self {
            natal_chart,
            moment_chart: None,
            include_reasons: true,
        }
    }

    pub fn with_moment(mut self, moment_chart: MomentChart) -> Self {
        self.moment_chart = Some(moment_chart);
        self
    }

    pub fn with_reasons(mut self, include_reasons: bool) -> Self {
        self.include_reasons = include_reasons;
        self
    }
}

pub struct PersonalizationRanker {
    cache: Arc<ChartComparisonCache>,
    comparator: Arc<dyn ChartComparator>,
    moments: Arc<dyn MomentChartSource>,
    default_limit: usize,
    default_base_score: f64,
}

impl PersonalizationRanker {
    pub fn new(
        cache: Arc<ChartComparisonCache>,
        comparator: Arc<dyn ChartComparator>,
        moments: Arc<dyn MomentChartSource>,
    ) -> Self {
        Self {
            cache,
            comparator,
            moments,
            default_limit: DEFAULT_LIMIT,
            default_base_score: DEFAULT_BASE_SCORE,
        }
    }

    /// Build a ranker with its own cache sized and tuned from `config`.
    pub fn from_config(
        config: &EngineConfig,
        comparator: Arc<dyn ChartComparator>,
        moments: Arc<dyn MomentChartSource>,
    ) -> Self {
        Self {
            cache: Arc::new(ChartComparisonCache::from_config(config)),
            comparator,
            moments,
            default_limit: config.ranking.default_limit,
            default_base_score: clamp_unit(config.ranking.default_base_score, DEFAULT_BASE_SCORE),
        }
    }

    pub fn cache(&self) -> &Arc<ChartComparisonCache> {
        &self.cache
    }

    /// Cached comparison for the context's natal chart.  The moment chart is
    /// only resolved when the cache misses.
    pub async fn chart_comparison(&self, context: &RankingContext) -> Result<ChartComparison> {
        let comparison = self
            .cache
            .get_or_compare(
                &context.natal_chart,
                context.moment_chart.as_ref(),
                self.moments.as_ref(),
                self.comparator.as_ref(),
            )
            .await?;
        Ok(comparison.sanitized())
    }

    #[instrument(skip_all, fields(candidate = %candidate.id))]
    pub async fn score_item(
        &self,
        candidate: &Candidate,
        context: &RankingContext,
    ) -> Result<ScoredCandidate> {
        let comparison = self.chart_comparison(context).await?;
        Ok(score_with_comparison(
            candidate,
            &comparison,
            context.include_reasons,
            self.default_base_score,
        ))
    }

    /// Score every candidate against one shared comparison, best first.
    /// Equal scores keep their input order.
    #[instrument(skip_all, fields(count = candidates.len()))]
    pub async fn score_items(
        &self,
        candidates: &[Candidate],
        context: &RankingContext,
    ) -> Result<Vec<ScoredCandidate>> {
        let comparison = self.chart_comparison(context).await?;
        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .map(|candidate| {
                score_with_comparison(
                    candidate,
                    &comparison,
                    context.include_reasons,
                    self.default_base_score,
                )
            })
            .collect();

        // `sort_by` is stable.
        scored.sort_by(|a, b| b.personalized_score.total_cmp(&a.personalized_score));
        debug!(
            scored = scored.len(),
            top = scored.first().map(|s| s.id.as_str()).unwrap_or("-"),
            "candidates ranked"
        );
        Ok(scored)
    }

    /// [`Self::score_items`] truncated to `limit` (the configured default
    /// when `None`).
    pub async fn top_recommendations(
        &self,
        candidates: &[Candidate],
        context: &RankingContext,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredCandidate>> {
        let limit = limit.unwrap_or(self.default_limit);
        let mut scored = self.score_items(candidates, context).await?;
        scored.truncate(limit);
        Ok(scored)
    }

    /// Boost mapped linearly from `[0.7, 1.3]` onto `[0, 1]`, independent of
    /// any base score.
    pub async fn calculate_compatibility(
        &self,
        candidate: &Candidate,
        natal_chart: &NatalChart,
    ) -> Result<f64> {
        let context = RankingContext::new(natal_chart.clone()).with_reasons(false);
        let comparison = self.chart_comparison(&context).await?;
        let boost = personalization_boost(
            &candidate.elemental_profile,
            &candidate.alchemical_profile,
            &comparison,
        );
        Ok(boost_to_compatibility(boost))
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }
}

/// Score one candidate against an already-fetched comparison.
pub fn score_with_comparison(
    candidate: &Candidate,
    comparison: &ChartComparison,
    include_reasons: bool,
    default_base_score: f64,
) -> ScoredCandidate {
    let base_score = candidate
        .base_score
        .map(|score| clamp_unit(score, default_base_score))
        .unwrap_or(default_base_score);
    let boost = personalization_boost(
        &candidate.elemental_profile,
        &candidate.alchemical_profile,
        comparison,
    );
    let personalized_score = finite_or(base_score * boost, base_score);

    let reasons = if include_reasons {
        generate_reasons(
            &candidate.elemental_profile,
            &candidate.alchemical_profile,
            comparison,
            boost,
        )
    } else {
        Vec::new()
    };

    trace!(id = %candidate.id, base_score, boost, personalized_score, "candidate scored");

    ScoredCandidate {
        id: candidate.id.clone(),
        name: candidate.name.clone(),
        base_score,
        personalized_score,
        personalization_boost: boost,
        reasons,
        elemental_profile: candidate.elemental_profile,
        alchemical_profile: candidate.alchemical_profile,
    }
}

pub fn personalization_boost(
    elemental: &ElementalProfile,
    alchemical: &AlchemicalProfile,
    comparison: &ChartComparison,
) -> f64 {
    let comparison = comparison.sanitized();
    let elemental = elemental.sanitized();

    let harmony_term = 0.3 * (comparison.overall_harmony - 0.5);

    let favorable = &comparison.insights.favorable_elements;
    let total = elemental.total();
    let element_term = if favorable.is_empty() || total <= 0.0 {
        0.0
    } else {
        let favored: f64 = favorable.iter().map(|element| elemental.get(*element)).sum();
        let share = favored / total;
        0.2 * (share - 0.5)
    };

    let intensity = calculate_thermodynamics(alchemical, &elemental)
        .monica_classification
        .intensity();
    let alchemy_term = 0.1 * (comparison.alchemical_alignment - 0.5) * (1.0 + intensity);

    finite_or(1.0 + harmony_term + element_term + alchemy_term, 1.0).clamp(MIN_BOOST, MAX_BOOST)
}

/// `(boost − 0.7) / 0.6`, clamped to `[0, 1]`.
pub fn boost_to_compatibility(boost: f64) -> f64 {
    clamp_unit((boost - MIN_BOOST) / (MAX_BOOST - MIN_BOOST), 0.5)
}

/// Ordered, human-readable explanations for a boost.
pub fn generate_reasons(
    elemental: &ElementalProfile,
    alchemical: &AlchemicalProfile,
    comparison: &ChartComparison,
    boost: f64,
) -> Vec<String> {
    let comparison = comparison.sanitized();
    let mut reasons = Vec::new();

    if comparison.overall_harmony > 0.7 {
        reasons.push("Strong harmony between your natal chart and the current sky".to_string());
    } else if comparison.overall_harmony > 0.5 {
        reasons.push("Favorable alignment with today's celestial energies".to_string());
    }

    if elemental.sanitized().total() > 0.0 {
        let dominant = elemental.dominant_element();
        if comparison.is_favorable(dominant) {
            reasons.push(format!("Rich in {dominant}, one of your favorable elements"));
        }
    }

    if comparison.alchemical_alignment > 0.6 {
        let property = alchemical.dominant_property();
        reasons.push(format!("{property}-forward alchemy resonates with your chart"));
    }

    if boost > 1.15 {
        reasons.push("Highly personalized match for your chart".to_string());
    } else if boost > 1.05 {
        reasons.push("Well-suited to your astrological profile".to_string());
    } else if boost < 0.85 {
        reasons.push("Consider alternatives better aligned with your chart right now".to_string());
    }

    reasons
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::chart::{ChartInsights, ElementalChartComparator, FixedMomentChart, PlanetPlacement};
    use crate::profile::Element;

    fn comparison(harmony: f64, alignment: f64, favorable: &[Element]) -> ChartComparison {
        ChartComparison {
            calculated_at: Utc::now(),
            overall_harmony: harmony,
            alchemical_alignment: alignment,
            insights: ChartInsights {
                favorable_elements: favorable.iter().copied().collect::<BTreeSet<_>>(),
            },
        }
    }

    fn elemental(values: [f64; 4]) -> ElementalProfile {
        let [fire, water, earth, air] = values;
        ElementalProfile::new(fire, water, earth, air)
    }

    fn alchemical(values: [f64; 4]) -> AlchemicalProfile {
        let [spirit, essence, matter, substance] = values;
        AlchemicalProfile::new(spirit, essence, matter, substance)
    }

    fn candidate(id: &str, e: [f64; 4], a: [f64; 4]) -> Candidate {
        Candidate::new(id, format!("Dish {id}"), elemental(e), alchemical(a))
    }

    fn natal(key: &str) -> NatalChart {
        NatalChart {
            calculated_at: key.to_string(),
            placements: vec![PlanetPlacement::new("Sun", "Leo")],
        }
    }

    fn moment(key: &str) -> MomentChart {
        MomentChart {
            calculated_at: key.to_string(),
            placements: vec![PlanetPlacement::new("Sun", "Libra")],
        }
    }

    /// Returns a fixed comparison and records every call.
    struct StubComparator {
        comparison: ChartComparison,
        calls: AtomicUsize,
        moments_seen: Mutex<Vec<Option<String>>>,
    }

    impl StubComparator {
        fn new(comparison: ChartComparison) -> Self {
            Self {
                comparison,
                calls: AtomicUsize::new(0),
                moments_seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChartComparator for StubComparator {
        async fn compare(
            &self,
            _natal: &NatalChart,
            moment: Option<&MomentChart>,
        ) -> Result<ChartComparison> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.moments_seen
                .lock()
                .unwrap()
                .push(moment.map(|m| m.calculated_at.clone()));
            Ok(self.comparison.clone())
        }
    }

    struct FailingComparator;

    #[async_trait]
    impl ChartComparator for FailingComparator {
        async fn compare(
            &self,
            _natal: &NatalChart,
            _moment: Option<&MomentChart>,
        ) -> Result<ChartComparison> {
            bail!("upstream timeout")
        }
    }

    struct CountingMoments {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MomentChartSource for CountingMoments {
        async fn current_moment_chart(&self) -> Result<MomentChart> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(moment("now"))
        }
    }

    fn ranker_with(comparator: Arc<dyn ChartComparator>) -> PersonalizationRanker {
        PersonalizationRanker::new(
            Arc::new(ChartComparisonCache::default()),
            comparator,
            Arc::new(FixedMomentChart(moment("fixed-now"))),
        )
    }

    fn five_candidates() -> Vec<Candidate> {
        let e = [0.25; 4];
        let a = [0.25; 4];
        vec![
            candidate("c1", e, a).with_base_score(0.3),
            candidate("c2", e, a).with_base_score(0.9),
            candidate("c3", e, a).with_base_score(0.5),
            candidate("c4", e, a).with_base_score(0.7),
            candidate("c5", e, a).with_base_score(0.1),
        ]
    }

    // ── Boost ─────────────────────────────────────────────────────────────

    #[test]
    fn neutral_comparison_gives_unit_boost() {
        let boost = personalization_boost(
            &ElementalProfile::balanced(),
            &alchemical([0.25; 4]),
            &comparison(0.5, 0.5, &[]),
        );
        assert!((boost - 1.0).abs() < 1e-12, "boost = {boost}");
    }

    #[test]
    fn boost_is_clamped_to_upper_bound() {
        let boost = personalization_boost(
            &elemental([1.0, 0.0, 0.0, 0.0]),
            &alchemical([0.7, 0.1, 0.1, 0.1]),
            &comparison(1.0, 1.0, &[Element::Fire]),
        );
        assert_eq!(boost, MAX_BOOST);
    }

    #[test]
    fn boost_is_clamped_to_lower_bound() {
        let boost = personalization_boost(
            &elemental([1.0, 0.0, 0.0, 0.0]),
            &alchemical([0.7, 0.1, 0.1, 0.1]),
            &comparison(0.0, 0.0, &[Element::Water]),
        );
        assert_eq!(boost, MIN_BOOST);
    }

    #[test]
    fn favorable_dominant_element_lifts_boost() {
        let chart = comparison(0.8, 0.7, &[Element::Fire]);
        let fiery = personalization_boost(
            &elemental([0.6, 0.2, 0.1, 0.1]),
            &alchemical([0.4, 0.3, 0.2, 0.1]),
            &chart,
        );
        let watery = personalization_boost(
            &elemental([0.1, 0.6, 0.2, 0.1]),
            &alchemical([0.4, 0.3, 0.2, 0.1]),
            &chart,
        );
        assert!((fiery - (1.0 + 0.09 + 0.02 + 0.02 * (4.0 / 3.0))).abs() < 1e-9, "fiery = {fiery}");
        assert!((watery - 1.03).abs() < 1e-9, "watery = {watery}");
    }

    #[test]
    fn degenerate_comparison_values_still_give_finite_boost() {
        let boost = personalization_boost(
            &ElementalProfile::default(),
            &AlchemicalProfile::default(),
            &comparison(f64::NAN, f64::INFINITY, &[Element::Air]),
        );
        assert!(boost.is_finite());
        assert!((MIN_BOOST..=MAX_BOOST).contains(&boost));
    }

    #[test]
    fn boost_to_compatibility_is_linear_over_range() {
        assert_eq!(boost_to_compatibility(0.7), 0.0);
        assert!((boost_to_compatibility(1.0) - 0.5).abs() < 1e-12);
        assert!((boost_to_compatibility(1.3) - 1.0).abs() < 1e-12);
        assert_eq!(boost_to_compatibility(0.2), 0.0);
        assert_eq!(boost_to_compatibility(2.0), 1.0);
        assert!(boost_to_compatibility(0.9) < boost_to_compatibility(1.1));
    }

    // ── Reasons ───────────────────────────────────────────────────────────

    #[test]
    fn reasons_for_highly_personalized_candidate_are_ordered() {
        let e = elemental([1.0, 0.0, 0.0, 0.0]);
        let a = alchemical([0.7, 0.1, 0.1, 0.1]);
        let chart = comparison(1.0, 1.0, &[Element::Fire]);
        let boost = personalization_boost(&e, &a, &chart);
        let reasons = generate_reasons(&e, &a, &chart, boost);
        assert_eq!(
            reasons,
            vec![
                "Strong harmony between your natal chart and the current sky".to_string(),
                "Rich in Fire, one of your favorable elements".to_string(),
                "Spirit-forward alchemy resonates with your chart".to_string(),
                "Highly personalized match for your chart".to_string(),
            ]
        );
    }

    #[test]
    fn moderate_match_is_well_suited() {
        let e = elemental([0.6, 0.2, 0.1, 0.1]);
        let a = alchemical([0.4, 0.3, 0.2, 0.1]);
        let chart = comparison(0.6, 0.5, &[]);
        let reasons = generate_reasons(&e, &a, &chart, 1.1);
        assert_eq!(
            reasons,
            vec![
                "Favorable alignment with today's celestial energies".to_string(),
                "Well-suited to your astrological profile".to_string(),
            ]
        );
    }

    #[test]
    fn weak_match_suggests_alternatives() {
        let e = elemental([0.1, 0.1, 0.2, 0.6]);
        let a = alchemical([0.1, 0.1, 0.4, 0.4]);
        let chart = comparison(0.2, 0.3, &[Element::Fire]);
        let boost = personalization_boost(&e, &a, &chart);
        assert!(boost < 0.85, "boost = {boost}");
        let reasons = generate_reasons(&e, &a, &chart, boost);
        assert_eq!(
            reasons,
            vec!["Consider alternatives better aligned with your chart right now".to_string()]
        );
    }

    #[test]
    fn empty_profile_never_claims_a_favorable_element() {
        let chart = comparison(0.5, 0.5, &[Element::Fire]);
        let reasons = generate_reasons(
            &ElementalProfile::default(),
            &AlchemicalProfile::default(),
            &chart,
            1.0,
        );
        assert!(reasons.is_empty(), "{reasons:?}");
    }

    // ── Scoring ───────────────────────────────────────────────────────────

    #[test]
    fn base_score_defaults_and_clamps() {
        let chart = comparison(0.5, 0.5, &[]);
        let plain = candidate("x", [0.25; 4], [0.25; 4]);
        let scored = score_with_comparison(&plain, &chart, false, DEFAULT_BASE_SCORE);
        assert_eq!(scored.base_score, DEFAULT_BASE_SCORE);
        assert!((scored.personalized_score - 0.5).abs() < 1e-12);
        assert!(scored.reasons.is_empty());

        let inflated = plain.clone().with_base_score(3.0);
        assert_eq!(score_with_comparison(&inflated, &chart, false, 0.5).base_score, 1.0);

        let broken = plain.with_base_score(f64::NAN);
        assert_eq!(score_with_comparison(&broken, &chart, false, 0.5).base_score, 0.5);
    }

    #[tokio::test]
    async fn score_items_sorts_descending() -> Result<()> {
        let ranker = ranker_with(Arc::new(StubComparator::new(comparison(0.5, 0.5, &[]))));
        let context = RankingContext::new(natal("n1"));

        let scored = ranker.score_items(&five_candidates(), &context).await?;
        let ids: Vec<&str> = scored.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c4", "c3", "c1", "c5"]);
        for pair in scored.windows(2) {
            assert!(pair[0].personalized_score > pair[1].personalized_score);
        }
        Ok(())
    }

    #[tokio::test]
    async fn equal_scores_keep_input_order() -> Result<()> {
        let ranker = ranker_with(Arc::new(StubComparator::new(comparison(0.5, 0.5, &[]))));
        let context = RankingContext::new(natal("n1"));
        let candidates = vec![
            candidate("first", [0.25; 4], [0.25; 4]),
            candidate("second", [0.25; 4], [0.25; 4]),
            candidate("third", [0.25; 4], [0.25; 4]),
        ];

        let scored = ranker.score_items(&candidates, &context).await?;
        let ids: Vec<&str> = scored.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
        Ok(())
    }

    #[tokio::test]
    async fn chart_alignment_reorders_equal_base_scores() -> Result<()> {
        let ranker = ranker_with(Arc::new(StubComparator::new(comparison(
            0.8,
            0.7,
            &[Element::Fire],
        ))));
        let context = RankingContext::new(natal("n1"));
        let candidates = vec![
            candidate("watery", [0.1, 0.6, 0.2, 0.1], [0.4, 0.3, 0.2, 0.1]),
            candidate("fiery", [0.6, 0.2, 0.1, 0.1], [0.4, 0.3, 0.2, 0.1]),
        ];

        let scored = ranker.score_items(&candidates, &context).await?;
        assert_eq!(scored[0].id, "fiery");
        assert!(scored[0].reasons.iter().any(|r| r.contains("Rich in Fire")));
        Ok(())
    }

    #[tokio::test]
    async fn top_recommendations_returns_best_two() -> Result<()> {
        let ranker = ranker_with(Arc::new(StubComparator::new(comparison(0.5, 0.5, &[]))));
        let context = RankingContext::new(natal("n1"));

        let top = ranker
            .top_recommendations(&five_candidates(), &context, Some(2))
            .await?;
        let ids: Vec<&str> = top.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c4"]);
        Ok(())
    }

    #[tokio::test]
    async fn top_recommendations_defaults_to_ten() -> Result<()> {
        let ranker = ranker_with(Arc::new(StubComparator::new(comparison(0.5, 0.5, &[]))));
        let context = RankingContext::new(natal("n1"));
        let candidates: Vec<Candidate> = (0..15)
            .map(|i| candidate(&format!("c{i}"), [0.25; 4], [0.25; 4]))
            .collect();

        let top = ranker.top_recommendations(&candidates, &context, None).await?;
        assert_eq!(top.len(), DEFAULT_LIMIT);
        Ok(())
    }

    #[tokio::test]
    async fn batch_shares_one_comparison_and_cache_serves_repeats() -> Result<()> {
        let stub = Arc::new(StubComparator::new(comparison(0.5, 0.5, &[])));
        let ranker = ranker_with(stub.clone());
        let context = RankingContext::new(natal("n1"));

        ranker.score_items(&five_candidates(), &context).await?;
        ranker.score_item(&five_candidates()[0], &context).await?;
        ranker.calculate_compatibility(&five_candidates()[0], &natal("n1")).await?;
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);

        ranker.clear_cache().await;
        ranker.score_item(&five_candidates()[0], &context).await?;
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn explicit_moment_bypasses_moment_source() -> Result<()> {
        let stub = Arc::new(StubComparator::new(comparison(0.5, 0.5, &[])));
        let moments = Arc::new(CountingMoments {
            calls: AtomicUsize::new(0),
        });
        let ranker = PersonalizationRanker::new(
            Arc::new(ChartComparisonCache::default()),
            stub.clone(),
            moments.clone(),
        );

        let explicit = RankingContext::new(natal("a")).with_moment(moment("explicit"));
        ranker.score_item(&five_candidates()[0], &explicit).await?;
        assert_eq!(moments.calls.load(Ordering::SeqCst), 0);

        let implicit = RankingContext::new(natal("b"));
        ranker.score_item(&five_candidates()[0], &implicit).await?;
        ranker.score_item(&five_candidates()[0], &implicit).await?;
        // Second call is a cache hit, so the moment is not fetched again.
        assert_eq!(moments.calls.load(Ordering::SeqCst), 1);

        let seen = stub.moments_seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![Some("explicit".to_string()), Some("now".to_string())]
        );
        Ok(())
    }

    #[tokio::test]
    async fn comparator_failure_fails_the_whole_batch() {
        let ranker = ranker_with(Arc::new(FailingComparator));
        let context = RankingContext::new(natal("n1"));

        let err = ranker
            .score_items(&five_candidates(), &context)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("upstream timeout"));
        assert!(ranker.cache().is_empty().await);

        assert!(ranker.score_item(&five_candidates()[0], &context).await.is_err());
        assert!(
            ranker
                .calculate_compatibility(&five_candidates()[0], &natal("n1"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn calculate_compatibility_ignores_base_score() -> Result<()> {
        let ranker = ranker_with(Arc::new(StubComparator::new(comparison(0.5, 0.5, &[]))));
        let low = candidate("low", [0.25; 4], [0.25; 4]).with_base_score(0.1);
        let high = candidate("high", [0.25; 4], [0.25; 4]).with_base_score(0.9);

        let a = ranker.calculate_compatibility(&low, &natal("n1")).await?;
        let b = ranker.calculate_compatibility(&high, &natal("n1")).await?;
        assert!((a - 0.5).abs() < 1e-12);
        assert_eq!(a, b);
        Ok(())
    }

    #[tokio::test]
    async fn built_in_comparator_ranks_end_to_end() -> Result<()> {
        let config = EngineConfig::default();
        let fire_sky = MomentChart {
            calculated_at: "sky".to_string(),
            placements: vec![
                PlanetPlacement::new("Sun", "Aries"),
                PlanetPlacement::new("Moon", "Leo"),
            ],
        };
        let ranker = PersonalizationRanker::from_config(
            &config,
            Arc::new(ElementalChartComparator),
            Arc::new(FixedMomentChart(fire_sky)),
        );
        let natal = NatalChart {
            calculated_at: "1988-07-30T06:00:00Z".to_string(),
            placements: vec![
                PlanetPlacement::new("Sun", "Leo"),
                PlanetPlacement::new("Moon", "Sagittarius"),
            ],
        };
        let candidates = vec![
            candidate("sushi", [0.1, 0.6, 0.2, 0.1], [0.2, 0.4, 0.2, 0.2]),
            candidate("grill", [0.7, 0.1, 0.1, 0.1], [0.5, 0.2, 0.2, 0.1]),
        ];

        let scored = ranker
            .top_recommendations(&candidates, &RankingContext::new(natal), Some(1))
            .await?;
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].id, "grill");
        assert!(scored[0].personalization_boost > 1.0);
        assert!(!scored[0].reasons.is_empty());
        Ok(())
    }
}
