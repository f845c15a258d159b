use serde::{Deserialize, Serialize};

use crate::profile::{ActivityLevel, GoalBucket, Sex};

/// Percentage split of the calorie budget across the three macronutrients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroSplit {
    pub protein_pct: f64,
    pub carb_pct: f64,
    pub fat_pct: f64,
}

impl MacroSplit {
    pub const fn new(protein_pct: f64, carb_pct: f64, fat_pct: f64) -> Self {
        Self {
            protein_pct,
            carb_pct,
            fat_pct,
        }
    }

    pub fn sum(&self) -> f64 {
        self.protein_pct + self.carb_pct + self.fat_pct
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityFactors {
    pub sedentary: f64,
    pub light: f64,
    pub moderate: f64,
    pub active: f64,
    pub very_active: f64,
}

impl Default for ActivityFactors {
    fn default() -> Self {
        Self {
            sedentary: 1.2,
            light: 1.375,
            moderate: 1.55,
            active: 1.725,
            very_active: 1.9,
        }
    }
}

impl ActivityFactors {
    pub fn factor(&self, level: ActivityLevel) -> f64 {
        match level {
            ActivityLevel::Sedentary => self.sedentary,
            ActivityLevel::Light => self.light,
            ActivityLevel::Moderate => self.moderate,
            ActivityLevel::Active => self.active,
            ActivityLevel::VeryActive => self.very_active,
        }
    }
}

/// Constants used by the macro calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroConfig {
    /// Mifflin-St Jeor coefficients: `w*kg + h*cm + a*years + sex constant`.
    pub bmr_weight_coef: f64,
    pub bmr_height_coef: f64,
    pub bmr_age_coef: f64,
    pub bmr_male_constant: f64,
    pub bmr_female_constant: f64,
    pub activity_factors: ActivityFactors,
    /// Energy stored in one kilogram of body weight.
    pub kcal_per_kg: f64,
    pub loss_split: MacroSplit,
    pub maintenance_split: MacroSplit,
    pub gain_split: MacroSplit,
}

impl Default for MacroConfig {
    fn default() -> Self {
        Self {
            bmr_weight_coef: 10.0,
            bmr_height_coef: 6.25,
            bmr_age_coef: -5.0,
            bmr_male_constant: 5.0,
            bmr_female_constant: -161.0,
            activity_factors: ActivityFactors::default(),
            kcal_per_kg: 7700.0,
            loss_split: MacroSplit::new(30.0, 40.0, 30.0),
            maintenance_split: MacroSplit::new(25.0, 45.0, 30.0),
            gain_split: MacroSplit::new(25.0, 50.0, 25.0),
        }
    }
}

impl MacroConfig {
    pub fn base_split(&self, bucket: GoalBucket) -> MacroSplit {
        match bucket {
            GoalBucket::Loss => self.loss_split,
            GoalBucket::Maintenance => self.maintenance_split,
            GoalBucket::Gain => self.gain_split,
        }
    }

    pub fn sex_constant(&self, sex: Sex) -> f64 {
        match sex {
            Sex::Male => self.bmr_male_constant,
            Sex::Female => self.bmr_female_constant,
        }
    }
}
