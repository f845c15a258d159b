use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::config::ScoringWeights;
use crate::recipe::RecipeDocument;
use crate::search::calorie_extraction::{resolve_calories, CalorieSource};
use crate::search::index::IndexHit;
use crate::search::query::SearchQuery;

/// Neutral component value used when there is nothing to compare against.
pub const NEUTRAL_FIT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub calorie_fit: f64,
    pub preference_fit: f64,
    pub index_similarity: f64,
    /// Always false for returned candidates; violators never reach scoring.
    pub restriction_violation: bool,
    pub calorie_estimated: bool,
    pub calorie_source: CalorieSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub recipe: Arc<RecipeDocument>,
    /// Calories per portion, from metadata or text.
    pub calories: Option<f64>,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

impl ScoredCandidate {
    pub fn id(&self) -> &str {
        &self.recipe.id
    }
}

/// What a candidate is scored against. Built from a normalized query.
#[derive(Debug, Clone, Default)]
pub struct ScoringTarget {
    pub target_calories: Option<f64>,
    pub avoid: BTreeSet<String>,
    pub preferred: BTreeSet<String>,
    pub disliked: BTreeSet<String>,
    pub k: usize,
}

impl From<&SearchQuery> for ScoringTarget {
    fn from(query: &SearchQuery) -> Self {
        let normalized = query.normalized();
        Self {
            target_calories: normalized.target_calories.map(f64::from),
            avoid: normalized.avoid_ingredients,
            preferred: normalized.preferred_ingredients,
            disliked: normalized.disliked_ingredients,
            k: normalized.k,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecipeScorer {
    weights: ScoringWeights,
}

impl RecipeScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Drops candidates mentioning an avoided term, scores the rest and
    /// returns the best `k`, ordered by score then recipe id.
    pub fn score(&self, hits: Vec<IndexHit>, target: &ScoringTarget) -> Vec<ScoredCandidate> {
        let total = hits.len();
        // Keep the strongest hit per recipe id.
        let mut unique: HashMap<String, IndexHit> = HashMap::with_capacity(hits.len());
        for hit in hits {
            match unique.get(&hit.id) {
                Some(existing) if existing.similarity >= hit.similarity => {}
                _ => {
                    unique.insert(hit.id.clone(), hit);
                }
            }
        }

        let admissible: Vec<IndexHit> = unique
            .into_values()
            .filter(|hit| match violated_restriction(&hit.document, &target.avoid) {
                Some(term) => {
                    debug!(recipe = %hit.id, term, "candidate excluded by restriction");
                    false
                }
                None => true,
            })
            .collect();
        let excluded = total - admissible.len();

        let mut scored: Vec<ScoredCandidate> = admissible
            .into_par_iter()
            .map(|hit| self.score_one(hit, target))
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.recipe.id.cmp(&b.recipe.id))
        });
        scored.truncate(target.k);
        debug!(
            candidates = total,
            excluded,
            returned = scored.len(),
            "scored index candidates"
        );
        scored
    }

    fn score_one(&self, hit: IndexHit, target: &ScoringTarget) -> ScoredCandidate {
        let (calories, calorie_source) = resolve_calories(&hit.document);
        let calorie_fit = calorie_fit(calories, target.target_calories);
        let preference_fit = preference_fit(
            &hit.document,
            &target.preferred,
            &target.disliked,
            self.weights.dislike_penalty,
        );
        let index_similarity = (hit.similarity as f64).clamp(0.0, 1.0);
        let score = self.weights.calorie * calorie_fit
            + self.weights.preference * preference_fit
            + self.weights.similarity * index_similarity;

        ScoredCandidate {
            recipe: hit.document,
            calories,
            score,
            breakdown: ScoreBreakdown {
                calorie_fit,
                preference_fit,
                index_similarity,
                restriction_violation: false,
                calorie_estimated: calories.is_some(),
                calorie_source,
            },
        }
    }
}

/// First avoided term the recipe mentions, if any.
pub fn violated_restriction<'a>(
    document: &RecipeDocument,
    avoid: &'a BTreeSet<String>,
) -> Option<&'a str> {
    avoid
        .iter()
        .find(|term| document.mentions(term))
        .map(String::as_str)
}

/// `1 - min(1, |c - t| / t)`, neutral when either side is unknown.
pub fn calorie_fit(calories: Option<f64>, target: Option<f64>) -> f64 {
    match (calories, target) {
        (Some(c), Some(t)) if t > 0.0 => 1.0 - ((c - t).abs() / t).min(1.0),
        _ => NEUTRAL_FIT,
    }
}

pub fn preference_fit(
    document: &RecipeDocument,
    preferred: &BTreeSet<String>,
    disliked: &BTreeSet<String>,
    dislike_penalty: f64,
) -> f64 {
    let base = if preferred.is_empty() {
        NEUTRAL_FIT
    } else {
        let matched = preferred.iter().filter(|p| document.mentions(p)).count();
        matched as f64 / preferred.len() as f64
    };
    let dislikes = disliked.iter().filter(|d| document.mentions(d)).count();
    (base - dislike_penalty * dislikes as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::{EconomicTier, MealType};

    fn hit(id: &str, ingredients: &[&str], kcal: Option<f64>, similarity: f32) -> IndexHit {
        IndexHit {
            id: id.into(),
            similarity,
            document: Arc::new(RecipeDocument {
                id: id.into(),
                name: format!("Dish {id}"),
                meal_types: vec![MealType::Breakfast],
                category: String::new(),
                calorie_estimate: kcal,
                ingredients: ingredients.iter().map(|s| s.to_string()).collect(),
                economic_tier: EconomicTier::Standard,
                raw_text: String::new(),
                macros: None,
            }),
        }
    }

    fn target(avoid: &[&str], kcal: Option<f64>, k: usize) -> ScoringTarget {
        ScoringTarget {
            target_calories: kcal,
            avoid: avoid.iter().map(|s| s.to_string()).collect(),
            k,
            ..Default::default()
        }
    }

    #[test]
    fn avoided_ingredient_is_filtered_before_scoring() {
        let scorer = RecipeScorer::default();
        let hits = vec![
            hit("omelette", &["Eggs", "cheese"], Some(400.0), 0.9),
            hit("porridge", &["oats", "milk"], Some(380.0), 0.6),
        ];
        let scored = scorer.score(hits, &target(&["egg"], Some(400.0), 5));
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].id(), "porridge");
        assert!(!scored[0].breakdown.restriction_violation);
    }

    #[test]
    fn calorie_fit_formula_and_neutral_cases() {
        assert_eq!(calorie_fit(Some(400.0), Some(400.0)), 1.0);
        assert!((calorie_fit(Some(300.0), Some(400.0)) - 0.75).abs() < 1e-9);
        assert_eq!(calorie_fit(Some(1200.0), Some(400.0)), 0.0);
        assert_eq!(calorie_fit(None, Some(400.0)), NEUTRAL_FIT);
        assert_eq!(calorie_fit(Some(400.0), None), NEUTRAL_FIT);
    }

    #[test]
    fn missing_calories_are_flagged() {
        let scorer = RecipeScorer::default();
        let scored = scorer.score(vec![hit("x", &[], None, 0.5)], &target(&[], Some(500.0), 5));
        assert!(!scored[0].breakdown.calorie_estimated);
        assert_eq!(scored[0].breakdown.calorie_source, CalorieSource::Unknown);
        assert_eq!(scored[0].breakdown.calorie_fit, NEUTRAL_FIT);
    }

    #[test]
    fn preferences_and_dislikes_shift_fit() {
        let doc = hit("x", &["spinach", "feta", "olives"], None, 0.0).document;
        let preferred: BTreeSet<String> = ["spinach".into(), "tomato".into()].into();
        let disliked: BTreeSet<String> = ["olive".into()].into();
        assert_eq!(preference_fit(&doc, &BTreeSet::new(), &BTreeSet::new(), 0.25), NEUTRAL_FIT);
        assert_eq!(preference_fit(&doc, &preferred, &BTreeSet::new(), 0.25), 0.5);
        assert_eq!(preference_fit(&doc, &preferred, &disliked, 0.25), 0.25);
        assert_eq!(preference_fit(&doc, &BTreeSet::new(), &disliked, 0.75), 0.0);
    }

    #[test]
    fn ordering_is_by_score_then_id_and_truncated() {
        let scorer = RecipeScorer::default();
        let hits = vec![
            hit("b", &[], Some(500.0), 0.5),
            hit("a", &[], Some(500.0), 0.5),
            hit("c", &[], Some(500.0), 0.9),
            hit("d", &[], Some(100.0), 0.5),
        ];
        let scored = scorer.score(hits, &target(&[], Some(500.0), 3));
        let ids: Vec<&str> = scored.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn similarity_is_clamped_and_duplicates_collapse() {
        let scorer = RecipeScorer::default();
        let hits = vec![hit("a", &[], None, 1.7), hit("a", &[], None, -0.3)];
        let scored = scorer.score(hits, &target(&[], None, 5));
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].breakdown.index_similarity, 1.0);
    }
}
