use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ParseEnumError, PlanError};
use crate::recipe::{normalize_term, EconomicTier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
    VeryActive,
}

impl ActivityLevel {
    /// Maps weekly training sessions to a level.
    pub fn from_weekly_sessions(sessions: u8) -> Self {
        match sessions {
            0 => ActivityLevel::Sedentary,
            1..=2 => ActivityLevel::Light,
            3..=4 => ActivityLevel::Moderate,
            5 => ActivityLevel::Active,
            _ => ActivityLevel::VeryActive,
        }
    }
}

impl FromStr for ActivityLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_term(s).replace([' ', '-'], "_").as_str() {
            "sedentary" | "sedentario" => Ok(ActivityLevel::Sedentary),
            "light" | "ligero" => Ok(ActivityLevel::Light),
            "moderate" | "moderado" => Ok(ActivityLevel::Moderate),
            "active" | "activo" => Ok(ActivityLevel::Active),
            "very_active" | "muy_activo" => Ok(ActivityLevel::VeryActive),
            other => Err(ParseEnumError::new("activity level", other)),
        }
    }
}

impl TryFrom<String> for ActivityLevel {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalBucket {
    Loss,
    Maintenance,
    Gain,
}

/// Weekly weight-change goal. Only the five fixed deltas are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum WeightGoal {
    LoseFast,
    LoseSlow,
    Maintain,
    GainSlow,
    GainFast,
}

impl WeightGoal {
    pub fn kg_per_week(self) -> f64 {
        match self {
            WeightGoal::LoseFast => -0.75,
            WeightGoal::LoseSlow => -0.25,
            WeightGoal::Maintain => 0.0,
            WeightGoal::GainSlow => 0.25,
            WeightGoal::GainFast => 0.75,
        }
    }

    pub fn bucket(self) -> GoalBucket {
        match self {
            WeightGoal::LoseFast | WeightGoal::LoseSlow => GoalBucket::Loss,
            WeightGoal::Maintain => GoalBucket::Maintenance,
            WeightGoal::GainSlow | WeightGoal::GainFast => GoalBucket::Gain,
        }
    }
}

impl TryFrom<f64> for WeightGoal {
    type Error = PlanError;

    fn try_from(delta: f64) -> Result<Self, Self::Error> {
        const GOALS: [WeightGoal; 5] = [
            WeightGoal::LoseFast,
            WeightGoal::LoseSlow,
            WeightGoal::Maintain,
            WeightGoal::GainSlow,
            WeightGoal::GainFast,
        ];
        GOALS
            .into_iter()
            .find(|goal| (goal.kg_per_week() - delta).abs() < 1e-6)
            .ok_or_else(|| {
                PlanError::invalid_profile(format!(
                    "weight goal {delta} kg/week is not one of -0.75, -0.25, 0, 0.25, 0.75"
                ))
            })
    }
}

impl From<WeightGoal> for f64 {
    fn from(goal: WeightGoal) -> Self {
        goal.kg_per_week()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProteinTier {
    VeryLow,
    Low,
    Conserved,
    Moderate,
    High,
    VeryHigh,
    Extreme,
}

impl ProteinTier {
    pub fn grams_per_kg(self) -> f64 {
        match self {
            ProteinTier::VeryLow => 0.5,
            ProteinTier::Low => 0.8,
            ProteinTier::Conserved => 1.2,
            ProteinTier::Moderate => 1.6,
            ProteinTier::High => 2.2,
            ProteinTier::VeryHigh => 2.8,
            ProteinTier::Extreme => 3.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MacroOverrides {
    #[serde(default)]
    pub protein_tier: Option<ProteinTier>,
    /// Multiplicative adjustment of the base carbohydrate share, -50..=50 in steps of 5.
    #[serde(default)]
    pub carb_adjustment_pct: Option<i32>,
    #[serde(default)]
    pub fat_pct: Option<f64>,
}

impl MacroOverrides {
    pub fn is_empty(&self) -> bool {
        self.protein_tier.is_none() && self.carb_adjustment_pct.is_none() && self.fat_pct.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealDistribution {
    #[default]
    Traditional,
    Equitable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub age: u32,
    pub sex: Sex,
    pub height_cm: f64,
    pub weight_kg: f64,
    #[serde(default)]
    pub activity_level: Option<ActivityLevel>,
    /// Used to derive the activity level when none is given.
    #[serde(default)]
    pub weekly_training_sessions: Option<u8>,
    #[serde(default)]
    pub pathologies: BTreeSet<String>,
    #[serde(default)]
    pub allergies: BTreeSet<String>,
    #[serde(default)]
    pub excluded_foods: BTreeSet<String>,
    #[serde(default)]
    pub preferences: BTreeSet<String>,
    #[serde(default)]
    pub dislikes: BTreeSet<String>,
    #[serde(default)]
    pub economic_tier: EconomicTier,
    pub meals_per_day: u32,
    pub days_requested: u32,
    #[serde(rename = "weight_goal_kg_per_week")]
    pub weight_goal: WeightGoal,
    #[serde(default)]
    pub overrides: MacroOverrides,
    #[serde(default)]
    pub distribution: MealDistribution,
}

impl PatientProfile {
    /// Parses a profile, mapping every decoding failure to `InvalidProfile`.
    pub fn from_json(raw: &str) -> Result<Self, PlanError> {
        let profile: PatientProfile = serde_json::from_str(raw)
            .map_err(|e| PlanError::invalid_profile(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.age == 0 {
            return Err(PlanError::invalid_profile("age must be positive"));
        }
        if !(self.height_cm.is_finite() && self.height_cm > 0.0) {
            return Err(PlanError::invalid_profile("height must be positive"));
        }
        if !(self.weight_kg.is_finite() && self.weight_kg > 0.0) {
            return Err(PlanError::invalid_profile("weight must be positive"));
        }
        if self.meals_per_day < 1 {
            return Err(PlanError::invalid_profile("meals per day must be at least 1"));
        }
        if self.days_requested < 1 {
            return Err(PlanError::invalid_profile("days requested must be at least 1"));
        }
        self.resolved_activity()?;
        Ok(())
    }

    pub fn resolved_activity(&self) -> Result<ActivityLevel, PlanError> {
        match (self.activity_level, self.weekly_training_sessions) {
            (Some(level), _) => Ok(level),
            (None, Some(sessions)) => Ok(ActivityLevel::from_weekly_sessions(sessions)),
            (None, None) => Err(PlanError::invalid_profile(
                "activity level or weekly training sessions required",
            )),
        }
    }

    pub fn bmi(&self) -> f64 {
        let meters = self.height_cm / 100.0;
        self.weight_kg / (meters * meters)
    }

    pub fn bmi_category(&self) -> BmiCategory {
        BmiCategory::from_bmi(self.bmi())
    }

    /// Hard exclusions: allergies, excluded foods and the restrictions implied
    /// by each pathology, all normalized.
    pub fn avoid_set(&self) -> BTreeSet<String> {
        let mut avoid: BTreeSet<String> = self
            .allergies
            .iter()
            .chain(self.excluded_foods.iter())
            .map(|term| normalize_term(term))
            .filter(|term| !term.is_empty())
            .collect();
        for pathology in &self.pathologies {
            avoid.extend(pathology_restrictions(pathology).iter().map(|t| t.to_string()));
        }
        avoid
    }

    pub fn normalized_preferences(&self) -> BTreeSet<String> {
        normalize_set(&self.preferences)
    }

    pub fn normalized_dislikes(&self) -> BTreeSet<String> {
        normalize_set(&self.dislikes)
    }
}

fn normalize_set(terms: &BTreeSet<String>) -> BTreeSet<String> {
    terms
        .iter()
        .map(|t| normalize_term(t))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Ingredients a pathology rules out, in English and Spanish since corpora
/// come in both. Unknown pathologies add nothing.
pub fn pathology_restrictions(pathology: &str) -> &'static [&'static str] {
    let key = normalize_term(pathology);
    let has = |stems: &[&str]| stems.iter().any(|stem| key.contains(stem));
    if has(&["diabet"]) {
        &["sugar", "honey", "jam", "syrup", "sweets", "azúcar", "dulce", "mermelada", "miel"]
    } else if has(&["hypertens", "hipertens", "blood pressure", "presión alta"]) {
        &[
            "salt", "sausage", "cold cuts", "bacon", "chips", "sal", "embutido", "fiambre",
            "snack",
        ]
    } else if has(&["cholesterol", "colesterol", "dyslipid", "dislipid"]) {
        &[
            "butter", "lard", "fried", "egg yolk", "cream", "manteca", "grasa", "fritura", "yema",
        ]
    } else if has(&["celiac", "coeliac", "celíac", "celiaqu"]) {
        &[
            "gluten", "wheat", "flour", "bread", "barley", "rye", "trigo", "harina", "pan",
        ]
    } else if has(&["gout", "gota"]) {
        &[
            "shellfish", "offal", "anchovy", "sardine", "mariscos", "vísceras", "anchoas",
        ]
    } else if has(&["renal", "kidney", "riñón"]) {
        &["salt", "potassium", "phosphorus", "banana", "sal", "potasio", "fósforo"]
    } else {
        &[]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl BmiCategory {
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi < 18.5 {
            BmiCategory::Underweight
        } else if bmi < 25.0 {
            BmiCategory::Normal
        } else if bmi < 30.0 {
            BmiCategory::Overweight
        } else {
            BmiCategory::Obese
        }
    }
}

impl fmt::Display for BmiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BmiCategory::Underweight => "underweight",
            BmiCategory::Normal => "normal",
            BmiCategory::Overweight => "overweight",
            BmiCategory::Obese => "obese",
        };
        f.write_str(label)
    }
}
