use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::PlanError;
use crate::recipe::{normalize_term, EconomicTier, MealType, RecipeDocument};

/// Structured filters applied by the index alongside the free-text query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meal_type: Option<MealType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub economic_level: Option<EconomicTier>,
}

impl IndexFilters {
    pub fn matches(&self, document: &RecipeDocument) -> bool {
        if let Some(meal_type) = self.meal_type {
            if !document.serves(meal_type) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if normalize_term(&document.category) != normalize_term(category) {
                return false;
            }
        }
        if let Some(level) = self.economic_level {
            if document.economic_tier != level {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub struct IndexHit {
    pub id: String,
    /// Similarity reported by the index; not guaranteed to be within [0, 1].
    pub similarity: f32,
    pub document: Arc<RecipeDocument>,
}

/// Read-only view over the recipe corpus.
#[async_trait]
pub trait RecipeIndex: Send + Sync {
    /// Returns up to `k` hits ranked by similarity. Transport and backend
    /// failures surface as `PlanError::IndexUnavailable`.
    async fn query(
        &self,
        text: &str,
        filters: &IndexFilters,
        k: usize,
    ) -> Result<Vec<IndexHit>, PlanError>;

    fn name(&self) -> &str {
        "recipe-index"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(tier: EconomicTier) -> RecipeDocument {
        RecipeDocument {
            id: "r".into(),
            name: "Lentil stew".into(),
            meal_types: vec![MealType::Lunch, MealType::Dinner],
            category: "Legumes".into(),
            calorie_estimate: None,
            ingredients: vec![],
            economic_tier: tier,
            raw_text: String::new(),
            macros: None,
        }
    }

    #[test]
    fn filters_check_every_field() {
        let economic = doc(EconomicTier::Economic);
        let filters = IndexFilters {
            meal_type: Some(MealType::Dinner),
            category: Some("legumes".into()),
            economic_level: Some(EconomicTier::Economic),
        };
        assert!(filters.matches(&economic));
        assert!(!filters.matches(&doc(EconomicTier::Standard)));
        assert!(IndexFilters::default().matches(&economic));

        let breakfast = IndexFilters {
            meal_type: Some(MealType::Breakfast),
            ..Default::default()
        };
        assert!(!breakfast.matches(&economic));
    }
}
