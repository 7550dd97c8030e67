pub mod cache;
pub mod chart;
pub mod compatibility;
pub mod profile;
pub mod ranker;
pub mod thermo;
pub mod vector;

pub use cache::ChartComparisonCache;
pub use chart::{
    ChartComparator, ChartComparison, ChartInsights, ElementalChartComparator, FixedMomentChart,
    MomentChart, MomentChartSource, NatalChart, PlanetPlacement,
};
pub use compatibility::{
    CompatibilityResult, calculate_elemental_compatibility, elemental_harmony,
};
pub use profile::{AlchemicalProfile, AlchemicalProperty, Element, ElementalProfile};
pub use ranker::{Candidate, PersonalizationRanker, RankingContext, ScoredCandidate};
pub use thermo::{MonicaClassification, ThermodynamicMetrics, calculate_thermodynamics};
