use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::errors::PlanError;
use crate::followup::{self, AdjustedTarget, ControlData, ProgressReport};
use crate::plan::{meal_layout, Plan, PlanAssembler};
use crate::profile::PatientProfile;
use crate::recipe::MealType;
use crate::search::cache::{CacheStats, Clock, SearchCache, SystemClock};
use crate::search::index::RecipeIndex;
use crate::search::orchestrator::{Alternatives, SearchOrchestrator};
use crate::search::query::SearchQuery;
use crate::search::scorer::{RecipeScorer, ScoredCandidate};
use crate::targets::{self, MacroTarget};

#[derive(Debug, Clone, Serialize)]
pub struct PlanResponse {
    pub target: MacroTarget,
    pub plan: Plan,
}

/// Outcome of a control visit: the progress analysis, the shifted target
/// and a fresh plan built against it.
#[derive(Debug, Clone, Serialize)]
pub struct FollowUpResponse {
    pub progress: ProgressReport,
    pub adjustment: AdjustedTarget,
    pub plan: Plan,
}

/// Meal replacement request: a search plus the recipes the patient wants swapped out.
#[derive(Debug, Clone, Deserialize)]
pub struct AlternativesRequest {
    #[serde(flatten)]
    pub query: SearchQuery,
    #[serde(default)]
    pub exclude_recipe_ids: BTreeSet<String>,
}

impl From<SearchQuery> for AlternativesRequest {
    fn from(query: SearchQuery) -> Self {
        Self {
            query,
            exclude_recipe_ids: BTreeSet::new(),
        }
    }
}

/// Wires the calculator, search engine and assembler together.
pub struct NutritionPlanner {
    config: EngineConfig,
    orchestrator: SearchOrchestrator,
    assembler: PlanAssembler,
}

impl NutritionPlanner {
    pub fn new(index: Arc<dyn RecipeIndex>, config: EngineConfig) -> Result<Self, PlanError> {
        Self::with_clock(index, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        index: Arc<dyn RecipeIndex>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PlanError> {
        config.validate()?;
        let cache = Arc::new(SearchCache::new(&config.cache, clock));
        let scorer = Arc::new(RecipeScorer::new(config.scoring.clone()));
        let orchestrator = SearchOrchestrator::new(index, scorer, cache, config.search.clone());
        let assembler = PlanAssembler::new(config.assembly.clone());
        Ok(Self {
            config,
            orchestrator,
            assembler,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.orchestrator.cache().stats()
    }

    pub fn compute_target(&self, profile: &PatientProfile) -> Result<MacroTarget, PlanError> {
        targets::compute(profile, &self.config.macros)
    }

    /// One query per distinct meal type in the day layout, sized to that
    /// slot's share of the daily calories.
    pub fn slot_queries(&self, profile: &PatientProfile, target: &MacroTarget) -> Vec<SearchQuery> {
        let avoid = profile.avoid_set();
        let preferred = profile.normalized_preferences();
        let disliked = profile.normalized_dislikes();
        let k = self
            .config
            .assembly
            .alternatives_per_slot
            .max(self.config.assembly.recency_window_days as usize + 1);

        let mut seen = BTreeSet::new();
        meal_layout(profile.meals_per_day, profile.distribution)
            .into_iter()
            .filter(|slot| seen.insert(slot.meal_type))
            .map(|slot| {
                let kcal = (target.daily_calories as f64 * slot.share).round() as u32;
                SearchQuery::new(slot.meal_type)
                    .avoiding(avoid.iter().cloned())
                    .preferring(preferred.iter().cloned())
                    .disliking(disliked.iter().cloned())
                    .economic(profile.economic_tier)
                    .targeting(kcal)
                    .limit(k)
            })
            .collect()
    }

    pub async fn plan(&self, profile: &PatientProfile) -> Result<PlanResponse, PlanError> {
        let target = self.compute_target(profile)?;
        info!(
            daily_calories = target.daily_calories,
            protein_pct = target.protein_pct,
            carb_pct = target.carb_pct,
            fat_pct = target.fat_pct,
            "macro target computed"
        );
        let plan = self.plan_for_target(profile, &target).await?;
        Ok(PlanResponse { target, plan })
    }

    /// Re-plans after a control visit with the current weight, any new
    /// pathologies and the progress-adjusted calorie budget.
    pub async fn follow_up(&self, control: &ControlData) -> Result<FollowUpResponse, PlanError> {
        let progress = followup::analyze_progress(control)?;
        let adjustment = followup::adjust_target(control, &progress, &self.config.macros)?;
        let profile = control.updated_profile();
        let plan = self.plan_for_target(&profile, &adjustment.target).await?;
        Ok(FollowUpResponse {
            progress,
            adjustment,
            plan,
        })
    }

    async fn plan_for_target(
        &self,
        profile: &PatientProfile,
        target: &MacroTarget,
    ) -> Result<Plan, PlanError> {
        let queries = self.slot_queries(profile, target);
        let batch = self.orchestrator.search_many(queries).await?;

        // Failed searches surface their own error; only unfilled slots of
        // successful searches become InsufficientAlternatives.
        let mut results: HashMap<MealType, Alternatives> = HashMap::new();
        let mut first_failure = None;
        for entry in batch.into_entries() {
            match entry.outcome {
                Ok(alternatives) => {
                    results.insert(entry.query.meal_type, alternatives);
                }
                Err(err) => {
                    warn!(meal_type = %entry.query.meal_type, error = %err, "meal search failed");
                    first_failure.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_failure {
            return Err(err);
        }

        let plan = self.assembler.assemble(
            target,
            profile.days_requested,
            profile.meals_per_day,
            profile.distribution,
            &results,
        )?;
        info!(days = plan.days.len(), warnings = plan.warnings.len(), "plan assembled");
        Ok(plan)
    }

    /// Ranked replacements for a single meal, minus the excluded recipes.
    pub async fn find_alternatives(
        &self,
        request: &AlternativesRequest,
    ) -> Result<Vec<ScoredCandidate>, PlanError> {
        let k = request.query.k;
        let widened = request
            .query
            .clone()
            .limit(k + request.exclude_recipe_ids.len());
        let alternatives = self.orchestrator.search_one(&widened).await?;
        Ok(alternatives
            .iter()
            .filter(|c| !request.exclude_recipe_ids.contains(c.id()))
            .take(k)
            .cloned()
            .collect())
    }
}
