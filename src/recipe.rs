use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ParseEnumError;

/// Case-folds and trims a free-text term so set membership and substring
/// checks behave the same everywhere.
pub fn normalize_term(term: &str) -> String {
    term.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum MealType {
    Breakfast,
    MorningSnack,
    Lunch,
    AfternoonSnack,
    Dinner,
    EveningSnack,
}

impl MealType {
    pub const ALL: [MealType; 6] = [
        MealType::Breakfast,
        MealType::MorningSnack,
        MealType::Lunch,
        MealType::AfternoonSnack,
        MealType::Dinner,
        MealType::EveningSnack,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::MorningSnack => "morning_snack",
            MealType::Lunch => "lunch",
            MealType::AfternoonSnack => "afternoon_snack",
            MealType::Dinner => "dinner",
            MealType::EveningSnack => "evening_snack",
        }
    }

    /// Words used when the meal type is turned into query text.
    pub fn search_phrase(self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::MorningSnack | MealType::AfternoonSnack | MealType::EveningSnack => "snack",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
        }
    }

    pub fn is_snack(self) -> bool {
        matches!(
            self,
            MealType::MorningSnack | MealType::AfternoonSnack | MealType::EveningSnack
        )
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Corpus exports use both English and Spanish labels.
        match normalize_term(s).replace([' ', '-'], "_").as_str() {
            "breakfast" | "desayuno" => Ok(MealType::Breakfast),
            "morning_snack" | "snack_am" | "colacion" | "colación" | "colacion_am"
            | "colación_am" | "media_manana" | "media_mañana" => Ok(MealType::MorningSnack),
            "lunch" | "almuerzo" | "comida" => Ok(MealType::Lunch),
            "afternoon_snack" | "snack" | "merienda" | "once" => Ok(MealType::AfternoonSnack),
            "dinner" | "cena" => Ok(MealType::Dinner),
            "evening_snack" | "snack_pm" | "colacion_pm" => Ok(MealType::EveningSnack),
            other => Err(ParseEnumError::new("meal type", other)),
        }
    }
}

impl TryFrom<String> for MealType {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum EconomicTier {
    #[default]
    Standard,
    Economic,
}

impl FromStr for EconomicTier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_term(s).as_str() {
            "" | "standard" | "medio" | "sin_restricciones" => Ok(EconomicTier::Standard),
            "economic" | "economico" | "económico" | "limitado" | "low_cost" => {
                Ok(EconomicTier::Economic)
            }
            other => Err(ParseEnumError::new("economic tier", other)),
        }
    }
}

impl TryFrom<String> for EconomicTier {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// True when `term` occurs in `text` as a word or phrase, optionally followed
/// by a plural `s`/`es`. "egg" matches "2 eggs" but "sal" does not match "salmon".
pub fn contains_word(text: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    text.match_indices(term).any(|(start, _)| {
        let before_ok = text[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let rest = &text[start + term.len()..];
        let rest = rest
            .strip_prefix("es")
            .filter(|r| !r.starts_with(char::is_alphanumeric))
            .or_else(|| rest.strip_prefix('s'))
            .unwrap_or(rest);
        before_ok && !rest.starts_with(char::is_alphanumeric)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MacroGrams {
    pub protein_g: f64,
    pub carb_g: f64,
    pub fat_g: f64,
}

impl MacroGrams {
    pub fn kcal(&self) -> f64 {
        self.protein_g * 4.0 + self.carb_g * 4.0 + self.fat_g * 9.0
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            protein_g: self.protein_g * factor,
            carb_g: self.carb_g * factor,
            fat_g: self.fat_g * factor,
        }
    }

    pub fn add(&self, other: &MacroGrams) -> Self {
        Self {
            protein_g: self.protein_g + other.protein_g,
            carb_g: self.carb_g + other.carb_g,
            fat_g: self.fat_g + other.fat_g,
        }
    }
}

/// A recipe as stored in the corpus index. Immutable once indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeDocument {
    pub id: String,
    pub name: String,
    pub meal_types: Vec<MealType>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub calorie_estimate: Option<f64>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub economic_tier: EconomicTier,
    #[serde(default)]
    pub raw_text: String,
    /// Per-portion macros, when the corpus carries them.
    #[serde(default)]
    pub macros: Option<MacroGrams>,
}

impl RecipeDocument {
    pub fn serves(&self, meal_type: MealType) -> bool {
        self.meal_types.contains(&meal_type)
    }

    /// Whole-word match (plurals included) of an already-normalized term
    /// against the name and every ingredient.
    pub fn mentions(&self, normalized_term: &str) -> bool {
        if normalized_term.is_empty() {
            return false;
        }
        contains_word(&self.name.to_lowercase(), normalized_term)
            || self
                .ingredients
                .iter()
                .any(|ingredient| contains_word(&ingredient.to_lowercase(), normalized_term))
    }

    /// Text fed to the embedder when the recipe is indexed.
    pub fn embedding_text(&self) -> String {
        let meal_types = self
            .meal_types
            .iter()
            .map(|m| m.search_phrase())
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "{} {} {} {} {}",
            self.name,
            meal_types,
            self.category,
            self.ingredients.join(" "),
            self.raw_text
        )
    }
}
