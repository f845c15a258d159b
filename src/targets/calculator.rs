use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::PlanError;
use crate::profile::PatientProfile;
use crate::targets::split::{resolve_split, MacroBoundsAdjusted, Macronutrient};
use crate::targets::tables::{MacroConfig, MacroSplit};

/// Daily calorie budget and its percentage split, derived once per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroTarget {
    pub daily_calories: u32,
    pub protein_pct: f64,
    pub carb_pct: f64,
    pub fat_pct: f64,
    pub bmr: f64,
    pub tdee: f64,
    pub daily_adjustment: i32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub adjustments: Vec<MacroBoundsAdjusted>,
}

impl MacroTarget {
    pub fn split(&self) -> MacroSplit {
        MacroSplit::new(self.protein_pct, self.carb_pct, self.fat_pct)
    }

    pub fn grams(&self, nutrient: Macronutrient) -> f64 {
        grams_for(self.split(), nutrient, self.daily_calories as f64)
    }

    pub fn protein_g(&self) -> f64 {
        self.grams(Macronutrient::Protein)
    }

    pub fn carb_g(&self) -> f64 {
        self.grams(Macronutrient::Carbohydrate)
    }

    pub fn fat_g(&self) -> f64 {
        self.grams(Macronutrient::Fat)
    }
}

/// Grams of a nutrient in `kcal` calories distributed according to `split`.
pub fn grams_for(split: MacroSplit, nutrient: Macronutrient, kcal: f64) -> f64 {
    let pct = match nutrient {
        Macronutrient::Protein => split.protein_pct,
        Macronutrient::Carbohydrate => split.carb_pct,
        Macronutrient::Fat => split.fat_pct,
    };
    pct / 100.0 * kcal / nutrient.kcal_per_gram()
}

pub fn mifflin_st_jeor(profile: &PatientProfile, config: &MacroConfig) -> f64 {
    config.bmr_weight_coef * profile.weight_kg
        + config.bmr_height_coef * profile.height_cm
        + config.bmr_age_coef * profile.age as f64
        + config.sex_constant(profile.sex)
}

/// Weekly weight delta converted to a daily calorie offset, rounded to the nearest 10 kcal.
pub fn daily_adjustment(kg_per_week: f64, kcal_per_kg: f64) -> i32 {
    let raw = kg_per_week * kcal_per_kg / 7.0;
    ((raw / 10.0).round() * 10.0) as i32
}

/// Computes the daily macro target for a patient.
///
/// # Errors
/// `InvalidProfile` when the profile fails validation, an override is out of
/// its domain, or the resulting energy budget is not positive.
pub fn compute(profile: &PatientProfile, config: &MacroConfig) -> Result<MacroTarget, PlanError> {
    profile.validate()?;
    let activity = profile.resolved_activity()?;

    let bmr = mifflin_st_jeor(profile, config);
    if bmr <= 0.0 {
        return Err(PlanError::invalid_profile(format!(
            "basal metabolic rate {bmr:.0} kcal is not positive"
        )));
    }
    let tdee = bmr * config.activity_factors.factor(activity);
    let adjustment = daily_adjustment(profile.weight_goal.kg_per_week(), config.kcal_per_kg);
    let daily = (tdee + adjustment as f64).round();
    if daily <= 0.0 {
        return Err(PlanError::invalid_profile(format!(
            "daily budget {daily:.0} kcal is not positive"
        )));
    }

    let base = config.base_split(profile.weight_goal.bucket());
    let (split, adjustments) = resolve_split(base, &profile.overrides, profile.weight_kg, daily)?;
    for adjusted in &adjustments {
        warn!(
            nutrient = ?adjusted.nutrient,
            requested = adjusted.requested_pct,
            applied = adjusted.applied_pct,
            reason = ?adjusted.reason,
            "macro percentage adjusted"
        );
    }

    debug!(
        sex = ?profile.sex,
        bmr,
        tdee,
        adjustment,
        daily,
        "computed daily energy budget"
    );

    Ok(MacroTarget {
        daily_calories: daily as u32,
        protein_pct: split.protein_pct,
        carb_pct: split.carb_pct,
        fat_pct: split.fat_pct,
        bmr,
        tdee,
        daily_adjustment: adjustment,
        adjustments,
    })
}
