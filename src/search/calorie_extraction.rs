use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::recipe::RecipeDocument;

// "350 kcal", "~350 cal", "1,200 calorías"
const VALUE_THEN_UNIT: &str = r"(?i)~?\s*(\d{1,3}(?:[.,]\d{3})+|\d{2,4}(?:[.,]\d+)?)\s*(?:kcal|kilocalor[ií]as?|calor[ií]as?|calories|cal)\b";
// "calorías: 350", "Calories = ~350", "energía 1.200"
const UNIT_THEN_VALUE: &str = r"(?i)(?:calor[ií]as?|calories|kcal|energ[ií]a|energy)\s*[:=]?\s*~?\s*(\d{1,3}(?:[.,]\d{3})+|\d{2,4}(?:[.,]\d+)?)";
// "1,200" and "1.200" are thousands, not decimals.
const GROUPED_THOUSANDS: &str = r"^\d{1,3}(?:[.,]\d{3})+$";

/// Values outside this range are treated as noise (years, gram weights).
const PLAUSIBLE_KCAL: std::ops::RangeInclusive<f64> = 20.0..=3000.0;

lazy_static! {
    static ref VALUE_THEN_UNIT_REGEX: Regex =
        Regex::new(VALUE_THEN_UNIT).expect("Calorie value-unit pattern should be valid");
    static ref UNIT_THEN_VALUE_REGEX: Regex =
        Regex::new(UNIT_THEN_VALUE).expect("Calorie unit-value pattern should be valid");
    static ref GROUPED_THOUSANDS_REGEX: Regex =
        Regex::new(GROUPED_THOUSANDS).expect("Thousands grouping pattern should be valid");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalorieSource {
    /// Taken from the document's calorie field.
    Metadata,
    /// Recovered from the raw recipe text.
    Text,
    Unknown,
}

/// First plausible calorie figure mentioned in free text.
pub fn extract_calories(text: &str) -> Option<f64> {
    [&*VALUE_THEN_UNIT_REGEX, &*UNIT_THEN_VALUE_REGEX]
        .iter()
        .flat_map(|regex| regex.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| parse_amount(m.as_str()))
        .find(|kcal| PLAUSIBLE_KCAL.contains(kcal))
}

fn parse_amount(raw: &str) -> Option<f64> {
    if GROUPED_THOUSANDS_REGEX.is_match(raw) {
        raw.replace(['.', ','], "").parse().ok()
    } else {
        raw.replace(',', ".").parse().ok()
    }
}

/// Calories per portion, preferring metadata over text extraction.
pub fn resolve_calories(document: &RecipeDocument) -> (Option<f64>, CalorieSource) {
    if let Some(kcal) = document.calorie_estimate.filter(|k| k.is_finite() && *k > 0.0) {
        return (Some(kcal), CalorieSource::Metadata);
    }
    match extract_calories(&document.raw_text) {
        Some(kcal) => (Some(kcal), CalorieSource::Text),
        None => (None, CalorieSource::Unknown),
    }
}
