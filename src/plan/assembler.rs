use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::AssemblyConfig;
use crate::errors::{PlanError, SlotRef};
use crate::plan::slots::{meal_layout, MealSlot};
use crate::profile::MealDistribution;
use crate::recipe::{MacroGrams, MealType, RecipeDocument};
use crate::search::orchestrator::Alternatives;
use crate::search::scorer::ScoredCandidate;
use crate::targets::calculator::grams_for;
use crate::targets::{MacroTarget, Macronutrient};

#[derive(Debug, Clone, Serialize)]
pub struct PlannedMeal {
    pub position: usize,
    pub meal_type: MealType,
    pub recipe: Arc<RecipeDocument>,
    pub score: f64,
    pub portion_scale: f64,
    pub target_calories: f64,
    pub calories: f64,
    pub macros: MacroGrams,
    /// True when macros were derived from the target split rather than the recipe.
    pub macros_estimated: bool,
    pub repeated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanDay {
    pub day: u32,
    pub meals: Vec<PlannedMeal>,
    pub total_calories: f64,
    pub total_macros: MacroGrams,
    pub calorie_deviation_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanWarning {
    RepeatedRecipe {
        day: u32,
        meal_type: MealType,
        recipe_id: String,
    },
    MacroDrift {
        day: u32,
        nutrient: Macronutrient,
        target_g: f64,
        actual_g: f64,
        deviation_pct: f64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub daily_calories: u32,
    pub days: Vec<PlanDay>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PlanWarning>,
}

/// Portion multiplier needed to hit `target_kcal`, if it lies within `[min, max]`.
pub fn portion_scale(target_kcal: f64, candidate_kcal: f64, min: f64, max: f64) -> Option<f64> {
    if !(candidate_kcal.is_finite() && candidate_kcal > 0.0) {
        return None;
    }
    let scale = target_kcal / candidate_kcal;
    (min..=max).contains(&scale).then_some(scale)
}

pub struct PlanAssembler {
    config: AssemblyConfig,
}

impl PlanAssembler {
    pub fn new(config: AssemblyConfig) -> Self {
        Self { config }
    }

    /// Builds `days` days of meals from the ranked alternatives of each meal type.
    ///
    /// Each slot takes the best candidate whose portion scale is acceptable and
    /// that was not used within the recency window; failing that, the best
    /// acceptable candidate is reused and flagged. Every slot left without a
    /// candidate is reported together.
    pub fn assemble(
        &self,
        target: &MacroTarget,
        days: u32,
        meals_per_day: u32,
        distribution: MealDistribution,
        results: &HashMap<MealType, Alternatives>,
    ) -> Result<Plan, PlanError> {
        let layout = meal_layout(meals_per_day, distribution);
        let daily = target.daily_calories as f64;

        let mut history: HashMap<String, Vec<u32>> = HashMap::new();
        let mut unfilled = Vec::new();
        let mut warnings = Vec::new();
        let mut plan_days = Vec::with_capacity(days as usize);

        for day in 1..=days {
            let mut meals = Vec::with_capacity(layout.len());
            for slot in &layout {
                let candidates = results.get(&slot.meal_type).map(|c| c.as_slice()).unwrap_or(&[]);
                match self.pick(slot, daily, candidates, &history, day) {
                    Some(selection) => {
                        let meal = self.portion(selection, target);
                        if meal.repeated {
                            warn!(day, meal_type = %slot.meal_type, recipe = %meal.recipe.id, "reusing recent recipe");
                            warnings.push(PlanWarning::RepeatedRecipe {
                                day,
                                meal_type: slot.meal_type,
                                recipe_id: meal.recipe.id.clone(),
                            });
                        }
                        history.entry(meal.recipe.id.clone()).or_default().push(day);
                        meals.push(meal);
                    }
                    None => {
                        warn!(day, meal_type = %slot.meal_type, "no viable recipe for slot");
                        unfilled.push(SlotRef {
                            day,
                            meal_type: slot.meal_type,
                        });
                    }
                }
            }

            let complete = meals.len() == layout.len();
            let plan_day = summarize_day(day, meals, daily);
            if complete {
                self.check_day(&plan_day, target, &mut warnings)?;
            }
            plan_days.push(plan_day);
        }

        if !unfilled.is_empty() {
            return Err(PlanError::InsufficientAlternatives { slots: unfilled });
        }

        debug!(days, meals_per_day, warnings = warnings.len(), "assembled plan");
        Ok(Plan {
            daily_calories: target.daily_calories,
            days: plan_days,
            warnings,
        })
    }

    fn pick<'a>(
        &self,
        slot: &MealSlot,
        daily: f64,
        candidates: &'a [ScoredCandidate],
        history: &HashMap<String, Vec<u32>>,
        day: u32,
    ) -> Option<Selection<'a>> {
        let target_calories = daily * slot.share;
        let viable: Vec<(&ScoredCandidate, f64)> = candidates
            .iter()
            .filter_map(|candidate| {
                let kcal = candidate.calories?;
                portion_scale(target_calories, kcal, self.config.min_scale, self.config.max_scale)
                    .map(|scale| (candidate, scale))
            })
            .collect();

        let recently_used = |id: &str| {
            history.get(id).is_some_and(|used| {
                used.iter()
                    .any(|&d| d <= day && day - d <= self.config.recency_window_days)
            })
        };

        let fresh = viable.iter().find(|(c, _)| !recently_used(c.id()));
        let (candidate, scale, repeated) = match fresh {
            Some(&(c, s)) => (c, s, false),
            None => {
                let &(c, s) = viable.first()?;
                (c, s, true)
            }
        };

        Some(Selection {
            slot: *slot,
            candidate,
            scale,
            target_calories,
            repeated,
        })
    }

    fn portion(&self, selection: Selection<'_>, target: &MacroTarget) -> PlannedMeal {
        let candidate = selection.candidate;
        let calories = candidate.calories.unwrap_or(0.0) * selection.scale;
        let (macros, macros_estimated) = match candidate.recipe.macros {
            Some(per_portion) => (per_portion.scaled(selection.scale), false),
            None => (
                MacroGrams {
                    protein_g: grams_for(target.split(), Macronutrient::Protein, calories),
                    carb_g: grams_for(target.split(), Macronutrient::Carbohydrate, calories),
                    fat_g: grams_for(target.split(), Macronutrient::Fat, calories),
                },
                true,
            ),
        };
        PlannedMeal {
            position: selection.slot.position,
            meal_type: selection.slot.meal_type,
            recipe: Arc::clone(&candidate.recipe),
            score: candidate.score,
            portion_scale: selection.scale,
            target_calories: selection.target_calories,
            calories,
            macros,
            macros_estimated,
            repeated: selection.repeated,
        }
    }

    fn check_day(
        &self,
        day: &PlanDay,
        target: &MacroTarget,
        warnings: &mut Vec<PlanWarning>,
    ) -> Result<(), PlanError> {
        if day.calorie_deviation_pct.abs() > self.config.calorie_tolerance_pct {
            return Err(PlanError::ToleranceViolated {
                day: day.day,
                actual_kcal: day.total_calories,
                target_kcal: target.daily_calories,
                tolerance_pct: self.config.calorie_tolerance_pct,
            });
        }

        // Drift only means something when every meal carries real macros.
        if day.meals.iter().any(|m| m.macros_estimated) {
            return Ok(());
        }
        let actual = [
            (Macronutrient::Protein, day.total_macros.protein_g),
            (Macronutrient::Carbohydrate, day.total_macros.carb_g),
            (Macronutrient::Fat, day.total_macros.fat_g),
        ];
        for (nutrient, actual_g) in actual {
            let target_g = target.grams(nutrient);
            if target_g <= 0.0 {
                continue;
            }
            let deviation_pct = (actual_g - target_g) / target_g * 100.0;
            if deviation_pct.abs() > self.config.macro_tolerance_pct {
                debug!(day = day.day, ?nutrient, target_g, actual_g, "macro drift");
                warnings.push(PlanWarning::MacroDrift {
                    day: day.day,
                    nutrient,
                    target_g,
                    actual_g,
                    deviation_pct,
                });
            }
        }
        Ok(())
    }
}

struct Selection<'a> {
    slot: MealSlot,
    candidate: &'a ScoredCandidate,
    scale: f64,
    target_calories: f64,
    repeated: bool,
}

fn summarize_day(day: u32, meals: Vec<PlannedMeal>, daily: f64) -> PlanDay {
    let total_calories: f64 = meals.iter().map(|m| m.calories).sum();
    let total_macros = meals
        .iter()
        .fold(MacroGrams::default(), |acc, m| acc.add(&m.macros));
    let calorie_deviation_pct = if daily > 0.0 {
        (total_calories - daily) / daily * 100.0
    } else {
        0.0
    };
    PlanDay {
        day,
        meals,
        total_calories,
        total_macros,
        calorie_deviation_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::EconomicTier;
    use crate::search::calorie_extraction::CalorieSource;
    use crate::search::scorer::ScoreBreakdown;

    fn target(daily: u32) -> MacroTarget {
        MacroTarget {
            daily_calories: daily,
            protein_pct: 30.0,
            carb_pct: 40.0,
            fat_pct: 30.0,
            bmr: 0.0,
            tdee: 0.0,
            daily_adjustment: 0,
            adjustments: vec![],
        }
    }

    fn candidate(id: &str, meal: MealType, kcal: Option<f64>, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            recipe: Arc::new(RecipeDocument {
                id: id.into(),
                name: id.into(),
                meal_types: vec![meal],
                category: String::new(),
                calorie_estimate: kcal,
                ingredients: vec![],
                economic_tier: EconomicTier::Standard,
                raw_text: String::new(),
                macros: None,
            }),
            calories: kcal,
            score,
            breakdown: ScoreBreakdown {
                calorie_fit: 0.5,
                preference_fit: 0.5,
                index_similarity: 0.5,
                restriction_violation: false,
                calorie_estimated: kcal.is_some(),
                calorie_source: CalorieSource::Metadata,
            },
        }
    }

    fn results(entries: Vec<(MealType, Vec<ScoredCandidate>)>) -> HashMap<MealType, Alternatives> {
        entries
            .into_iter()
            .map(|(meal, candidates)| (meal, Arc::new(candidates)))
            .collect()
    }

    #[test]
    fn portion_scale_band() {
        assert_eq!(portion_scale(500.0, 400.0, 0.5, 2.0), Some(1.25));
        assert_eq!(portion_scale(500.0, 100.0, 0.5, 2.0), None);
        assert_eq!(portion_scale(500.0, 0.0, 0.5, 2.0), None);
    }

    #[test]
    fn single_meal_day_scales_to_target() {
        let assembler = PlanAssembler::new(AssemblyConfig::default());
        let results = results(vec![(
            MealType::Lunch,
            vec![candidate("stew", MealType::Lunch, Some(400.0), 0.9)],
        )]);
        let plan = assembler
            .assemble(&target(500), 1, 1, MealDistribution::Traditional, &results)
            .unwrap();
        let meal = &plan.days[0].meals[0];
        assert_eq!(meal.portion_scale, 1.25);
        assert!((meal.calories - 500.0).abs() < 1e-9);
        assert!(meal.macros_estimated);
        assert!((plan.days[0].total_macros.protein_g - 37.5).abs() < 1e-9);
    }

    #[test]
    fn recency_window_rotates_then_repeats() {
        let assembler = PlanAssembler::new(AssemblyConfig::default());
        let results = results(vec![(
            MealType::Lunch,
            vec![
                candidate("a", MealType::Lunch, Some(500.0), 0.9),
                candidate("b", MealType::Lunch, Some(500.0), 0.8),
            ],
        )]);
        let plan = assembler
            .assemble(&target(500), 3, 1, MealDistribution::Traditional, &results)
            .unwrap();
        let picks: Vec<&str> = plan.days.iter().map(|d| d.meals[0].recipe.id.as_str()).collect();
        // Day 3 sees both used within two days and falls back to the best.
        assert_eq!(picks, vec!["a", "b", "a"]);
        assert!(plan.days[2].meals[0].repeated);
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn unfilled_slots_are_all_reported() {
        let assembler = PlanAssembler::new(AssemblyConfig::default());
        let results = results(vec![
            (MealType::Breakfast, vec![candidate("toast", MealType::Breakfast, Some(600.0), 0.7)]),
            (MealType::Lunch, vec![candidate("tiny", MealType::Lunch, Some(100.0), 0.9)]),
            (MealType::Dinner, vec![candidate("soup", MealType::Dinner, None, 0.9)]),
        ]);
        let err = assembler
            .assemble(&target(2000), 2, 3, MealDistribution::Traditional, &results)
            .unwrap_err();
        match err {
            PlanError::InsufficientAlternatives { slots } => {
                assert_eq!(slots.len(), 4);
                assert!(slots.contains(&SlotRef { day: 2, meal_type: MealType::Dinner }));
                assert!(!slots.iter().any(|s| s.meal_type == MealType::Breakfast));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn macro_drift_is_a_warning() {
        let assembler = PlanAssembler::new(AssemblyConfig::default());
        let mut fatty = candidate("fatty", MealType::Lunch, Some(1000.0), 0.9);
        Arc::make_mut(&mut fatty.recipe).macros = Some(MacroGrams {
            protein_g: 20.0,
            carb_g: 50.0,
            fat_g: 80.0,
        });
        let results = results(vec![(MealType::Lunch, vec![fatty])]);
        let plan = assembler
            .assemble(&target(1000), 1, 1, MealDistribution::Traditional, &results)
            .unwrap();
        assert!(plan
            .warnings
            .iter()
            .any(|w| matches!(w, PlanWarning::MacroDrift { nutrient: Macronutrient::Fat, .. })));
    }
}
