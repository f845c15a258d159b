use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::PlanError;
use crate::targets::MacroConfig;

pub const ENV_CACHE_TTL_SECS: &str = "NUTRI_CACHE_TTL_SECS";
pub const ENV_WORKER_WIDTH: &str = "NUTRI_WORKER_WIDTH";
pub const ENV_WAVE_TIMEOUT_MS: &str = "NUTRI_WAVE_TIMEOUT_MS";
pub const ENV_RECENCY_DAYS: &str = "NUTRI_RECENCY_DAYS";

/// Top-level engine settings. Every section falls back to its defaults when
/// absent from the JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub search: SearchConfig,
    pub scoring: ScoringWeights,
    pub assembly: AssemblyConfig,
    pub macros: MacroConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a completed entry, counted from completion.
    pub ttl_secs: u64,
    /// Safety cap; the oldest completed entries go first.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 512,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum number of sub-queries in flight at once.
    pub worker_width: usize,
    /// Deadline for a whole `search_many` wave.
    pub wave_timeout_ms: u64,
    /// Deadline for a single index call.
    pub index_timeout_ms: u64,
    pub max_retries: u32,
    pub base_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    /// Candidates requested from the index per requested result.
    pub oversample_factor: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            worker_width: 4,
            wave_timeout_ms: 10_000,
            index_timeout_ms: 3_000,
            max_retries: 2,
            base_retry_delay_ms: 100,
            max_retry_delay_ms: 2_000,
            oversample_factor: 3,
        }
    }
}

impl SearchConfig {
    pub fn wave_timeout(&self) -> Duration {
        Duration::from_millis(self.wave_timeout_ms)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_millis(self.index_timeout_ms)
    }

    /// Exponential backoff for the given zero-based retry attempt, capped.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_retry_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_retry_delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub calorie: f64,
    pub preference: f64,
    pub similarity: f64,
    /// Subtracted from preference fit for every disliked ingredient present.
    pub dislike_penalty: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            calorie: 0.4,
            preference: 0.35,
            similarity: 0.25,
            dislike_penalty: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    pub min_scale: f64,
    pub max_scale: f64,
    /// A recipe used within this many previous days counts as recent.
    pub recency_window_days: u32,
    pub calorie_tolerance_pct: f64,
    pub macro_tolerance_pct: f64,
    /// Alternatives requested per meal slot.
    pub alternatives_per_slot: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.5,
            max_scale: 2.0,
            recency_window_days: 2,
            calorie_tolerance_pct: 5.0,
            macro_tolerance_pct: 5.0,
            alternatives_per_slot: 5,
        }
    }
}

impl EngineConfig {
    /// Loads `.env`, then the optional JSON file, then environment overrides,
    /// and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();
        let config = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        info!(path = %path.display(), "loaded engine configuration");
        Ok(config)
    }

    pub fn with_env_overrides(mut self) -> Result<Self, PlanError> {
        if let Some(ttl) = env_override::<u64>(ENV_CACHE_TTL_SECS)? {
            self.cache.ttl_secs = ttl;
        }
        if let Some(width) = env_override::<usize>(ENV_WORKER_WIDTH)? {
            self.search.worker_width = width;
        }
        if let Some(timeout) = env_override::<u64>(ENV_WAVE_TIMEOUT_MS)? {
            self.search.wave_timeout_ms = timeout;
        }
        if let Some(days) = env_override::<u32>(ENV_RECENCY_DAYS)? {
            self.assembly.recency_window_days = days;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        let weights = &self.scoring;
        let weight_sum = weights.calorie + weights.preference + weights.similarity;
        if (weight_sum - 1.0).abs() > 0.01 {
            return Err(PlanError::Config(format!(
                "scoring weights must sum to 1.0, got {weight_sum:.3}"
            )));
        }
        if [weights.calorie, weights.preference, weights.similarity, weights.dislike_penalty]
            .iter()
            .any(|w| *w < 0.0)
        {
            return Err(PlanError::Config("scoring weights must be non-negative".into()));
        }
        if self.search.worker_width == 0 {
            return Err(PlanError::Config("worker width must be at least 1".into()));
        }
        if self.search.oversample_factor == 0 {
            return Err(PlanError::Config("oversample factor must be at least 1".into()));
        }
        if self.cache.max_entries == 0 {
            return Err(PlanError::Config("cache max entries must be at least 1".into()));
        }
        let assembly = &self.assembly;
        if !(assembly.min_scale > 0.0 && assembly.min_scale <= assembly.max_scale) {
            return Err(PlanError::Config(format!(
                "portion scale bounds [{}, {}] are inverted or non-positive",
                assembly.min_scale, assembly.max_scale
            )));
        }
        if assembly.calorie_tolerance_pct <= 0.0 || assembly.macro_tolerance_pct <= 0.0 {
            return Err(PlanError::Config("tolerances must be positive".into()));
        }
        if assembly.alternatives_per_slot == 0 {
            return Err(PlanError::Config("alternatives per slot must be at least 1".into()));
        }
        Ok(())
    }
}

fn env_override<T: FromStr>(name: &str) -> Result<Option<T>, PlanError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| PlanError::Config(format!("{name}='{raw}' is not a valid value"))),
        Err(_) => Ok(None),
    }
}
