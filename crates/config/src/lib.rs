use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Overrides `[cache] ttl_secs`.
pub const ENV_CACHE_TTL_SECS: &str = "ALCHM_CACHE_TTL_SECS";
/// Overrides `[ranking] default_limit`.
pub const ENV_DEFAULT_LIMIT: &str = "ALCHM_DEFAULT_LIMIT";

// ── Cache ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a chart comparison, counted from when it was stored.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

// ── Ranking ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Result count for `top_recommendations` when the caller gives none.
    pub default_limit: usize,
    /// Base score for candidates that carry none.  Clamped to `[0, 1]` by
    /// the ranker.
    pub default_base_score: f64,
    pub include_reasons: bool,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            default_base_score: 0.5,
            include_reasons: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub ranking: RankingConfig,
    pub telemetry: TelemetryConfig,
}

impl EngineConfig {
    /// Read `path` (defaults when it does not exist) and apply the
    /// `ALCHM_*` environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)
                .with_context(|| format!("invalid config file {}", path.display()))?;
        }

        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from `lookup`.  Empty or unparsable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ttl) = parse_override::<u64>(lookup(ENV_CACHE_TTL_SECS)) {
            self.cache.ttl_secs = ttl;
        }
        if let Some(limit) = parse_override::<usize>(lookup(ENV_DEFAULT_LIMIT)) {
            self.ranking.default_limit = limit;
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)
            .with_context(|| format!("writing config file {}", path.display()))?;
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}

fn parse_override<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| raw.parse().ok())
}

// ── Tests ────────────────────────────────────────────────────────────────────
