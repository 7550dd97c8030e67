use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use alchm_config::EngineConfig;
use alchm_engine::{
    Candidate, ElementalChartComparator, ElementalProfile, FixedMomentChart, MomentChart,
    NatalChart, PersonalizationRanker, RankingContext, ThermodynamicMetrics,
    CompatibilityResult, calculate_elemental_compatibility, calculate_thermodynamics,
    elemental_harmony,
};

#[derive(Debug, Clone)]
pub struct RankRequest {
    pub candidates: PathBuf,
    pub natal: PathBuf,
    pub moment: Option<PathBuf>,
    pub limit: Option<usize>,
    pub include_reasons: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CandidateThermodynamics<'a> {
    id: &'a str,
    name: &'a str,
    #[serde(flatten)]
    metrics: ThermodynamicMetrics,
}

#[derive(Debug, Serialize)]
struct CompatibilityReport {
    #[serde(flatten)]
    result: CompatibilityResult,
    /// Symmetric `1 − mean |Δ|` between the two profiles.
    harmony: f64,
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading {what} from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {what} in {}", path.display()))
}

pub async fn run_rank(config: &EngineConfig, request: &RankRequest) -> Result<String> {
    let candidates: Vec<Candidate> = read_json(&request.candidates, "candidates")?;
    let natal: NatalChart = read_json(&request.natal, "natal chart")?;
    let moment = match &request.moment {
        Some(path) => read_json(path, "moment chart")?,
        None => MomentChart::from(&natal),
    };

    let ranker = PersonalizationRanker::from_config(
        config,
        Arc::new(ElementalChartComparator),
        Arc::new(FixedMomentChart(moment.clone())),
    );
    let context = RankingContext::new(natal)
        .with_moment(moment)
        .with_reasons(request.include_reasons && config.ranking.include_reasons);

    let ranked = ranker
        .top_recommendations(&candidates, &context, request.limit)
        .await?;
    info!(candidates = candidates.len(), returned = ranked.len(), "ranking complete");
    Ok(serde_json::to_string_pretty(&ranked)?)
}

pub fn run_thermo(candidates: &Path) -> Result<String> {
    let candidates: Vec<Candidate> = read_json(candidates, "candidates")?;
    let rows: Vec<CandidateThermodynamics<'_>> = candidates
        .iter()
        .map(|candidate| CandidateThermodynamics {
            id: &candidate.id,
            name: &candidate.name,
            metrics: calculate_thermodynamics(
                &candidate.alchemical_profile,
                &candidate.elemental_profile,
            ),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}

pub fn run_compat(recipe: &Path, user: &Path) -> Result<String> {
    let recipe: ElementalProfile = read_json(recipe, "recipe profile")?;
    let user: ElementalProfile = read_json(user, "user profile")?;
    let report = CompatibilityReport {
        result: calculate_elemental_compatibility(&recipe, &user),
        harmony: elemental_harmony(&recipe, &user),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}
