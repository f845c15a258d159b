use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::recipe::{normalize_term, EconomicTier, MealType};
use crate::search::index::IndexFilters;

pub const DEFAULT_K: usize = 5;
/// Calorie targets are bucketed to this granularity in cache keys.
pub const CALORIE_BUCKET_KCAL: u32 = 50;

fn default_k() -> usize {
    DEFAULT_K
}

/// One meal-slot search. Also accepted as the JSON body of an alternatives request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchQuery {
    pub meal_type: MealType,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub avoid_ingredients: BTreeSet<String>,
    #[serde(default)]
    pub preferred_ingredients: BTreeSet<String>,
    #[serde(default)]
    pub disliked_ingredients: BTreeSet<String>,
    #[serde(default)]
    pub economic_level: EconomicTier,
    #[serde(default)]
    pub target_calories: Option<u32>,
    #[serde(default = "default_k")]
    pub k: usize,
}

/// Normalized query used as the cache key; two queries with the same key
/// produce the same ranked result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(SearchQuery);

impl CacheKey {
    pub fn query(&self) -> &SearchQuery {
        &self.0
    }
}

impl SearchQuery {
    pub fn new(meal_type: MealType) -> Self {
        Self {
            meal_type,
            category: None,
            avoid_ingredients: BTreeSet::new(),
            preferred_ingredients: BTreeSet::new(),
            disliked_ingredients: BTreeSet::new(),
            economic_level: EconomicTier::Standard,
            target_calories: None,
            k: DEFAULT_K,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn avoiding<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.avoid_ingredients.extend(terms.into_iter().map(Into::into));
        self
    }

    pub fn preferring<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_ingredients.extend(terms.into_iter().map(Into::into));
        self
    }

    pub fn disliking<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disliked_ingredients.extend(terms.into_iter().map(Into::into));
        self
    }

    pub fn economic(mut self, level: EconomicTier) -> Self {
        self.economic_level = level;
        self
    }

    pub fn targeting(mut self, kcal: u32) -> Self {
        self.target_calories = Some(kcal);
        self
    }

    pub fn limit(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Case-folded, trimmed, empty terms dropped, calories bucketed.
    pub fn normalized(&self) -> SearchQuery {
        SearchQuery {
            meal_type: self.meal_type,
            category: self
                .category
                .as_deref()
                .map(normalize_term)
                .filter(|c| !c.is_empty()),
            avoid_ingredients: normalize_set(&self.avoid_ingredients),
            preferred_ingredients: normalize_set(&self.preferred_ingredients),
            disliked_ingredients: normalize_set(&self.disliked_ingredients),
            economic_level: self.economic_level,
            target_calories: self.target_calories.map(bucket_calories),
            k: self.k,
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey(self.normalized())
    }

    /// Free text sent to the index.
    pub fn query_text(&self) -> String {
        let mut parts = vec![self.meal_type.search_phrase().to_string()];
        if let Some(category) = &self.category {
            parts.push(category.clone());
        }
        parts.extend(self.preferred_ingredients.iter().cloned());
        parts.join(" ")
    }

    /// Economic queries only accept economic recipes; standard accepts every tier.
    pub fn index_filters(&self) -> IndexFilters {
        IndexFilters {
            meal_type: Some(self.meal_type),
            category: self.category.clone(),
            economic_level: match self.economic_level {
                EconomicTier::Economic => Some(EconomicTier::Economic),
                EconomicTier::Standard => None,
            },
        }
    }
}

fn normalize_set(terms: &BTreeSet<String>) -> BTreeSet<String> {
    terms
        .iter()
        .map(|t| normalize_term(t))
        .filter(|t| !t.is_empty())
        .collect()
}

fn bucket_calories(kcal: u32) -> u32 {
    let bucket = CALORIE_BUCKET_KCAL as f64;
    ((kcal as f64 / bucket).round() * bucket) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equivalent_queries_share_a_cache_key() {
        let a = SearchQuery::new(MealType::Breakfast)
            .with_category(" Oats ")
            .avoiding(["Egg", "peanut"])
            .targeting(510);
        let b = SearchQuery::new(MealType::Breakfast)
            .with_category("oats")
            .avoiding(["peanut ", "EGG", ""])
            .targeting(490);
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key().query().target_calories, Some(500));
    }

    #[test]
    fn different_k_or_meal_changes_the_key() {
        let base = SearchQuery::new(MealType::Lunch);
        assert_ne!(base.cache_key(), base.clone().limit(10).cache_key());
        assert_ne!(base.cache_key(), SearchQuery::new(MealType::Dinner).cache_key());
    }

    #[test]
    fn economic_queries_filter_the_index() {
        let standard = SearchQuery::new(MealType::Lunch);
        assert_eq!(standard.index_filters().economic_level, None);
        let economic = standard.economic(EconomicTier::Economic);
        assert_eq!(
            economic.index_filters().economic_level,
            Some(EconomicTier::Economic)
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let query: SearchQuery =
            serde_json::from_str(r#"{"meal_type": "dinner", "avoid_ingredients": ["fish"]}"#)
                .unwrap();
        assert_eq!(query.k, DEFAULT_K);
        assert!(query.avoid_ingredients.contains("fish"));
        assert_eq!(query.economic_level, EconomicTier::Standard);
    }
}
