use serde::Serialize;

use crate::errors::PlanError;
use crate::profile::MacroOverrides;
use crate::targets::tables::MacroSplit;

pub const PROTEIN_MAX_PCT: f64 = 40.0;
pub const CARB_MIN_PCT: f64 = 20.0;
pub const CARB_MAX_PCT: f64 = 65.0;
pub const FAT_MIN_PCT: f64 = 15.0;
pub const FAT_MAX_PCT: f64 = 45.0;
/// Allowed distance of the split sum from 100.
pub const SUM_TOLERANCE_PCT: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Macronutrient {
    Protein,
    Carbohydrate,
    Fat,
}

impl Macronutrient {
    fn bounds(self) -> (f64, f64) {
        match self {
            Macronutrient::Protein => (0.0, PROTEIN_MAX_PCT),
            Macronutrient::Carbohydrate => (CARB_MIN_PCT, CARB_MAX_PCT),
            Macronutrient::Fat => (FAT_MIN_PCT, FAT_MAX_PCT),
        }
    }

    pub fn kcal_per_gram(self) -> f64 {
        match self {
            Macronutrient::Protein | Macronutrient::Carbohydrate => 4.0,
            Macronutrient::Fat => 9.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    /// Value was outside its allowed range.
    Clamped,
    /// Value absorbed part of the residual so the split sums to ~100.
    Rebalanced,
}

/// Non-fatal warning attached to a macro target whenever a percentage was moved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MacroBoundsAdjusted {
    pub nutrient: Macronutrient,
    pub requested_pct: f64,
    pub applied_pct: f64,
    pub reason: AdjustmentReason,
}

pub fn validate_carb_adjustment(adjustment: i32) -> Result<(), PlanError> {
    if !(-50..=50).contains(&adjustment) || adjustment % 5 != 0 {
        return Err(PlanError::invalid_profile(format!(
            "carbohydrate adjustment {adjustment}% must be within -50..=50 in steps of 5"
        )));
    }
    Ok(())
}

/// Resolves the final split from the goal's base split, the overrides and the
/// daily budget. Protein tiers are converted from g/kg into a share of calories.
pub fn resolve_split(
    base: MacroSplit,
    overrides: &MacroOverrides,
    weight_kg: f64,
    daily_calories: f64,
) -> Result<(MacroSplit, Vec<MacroBoundsAdjusted>), PlanError> {
    let protein = match overrides.protein_tier {
        Some(tier) => tier.grams_per_kg() * weight_kg * 4.0 / daily_calories * 100.0,
        None => base.protein_pct,
    };

    let carb = match overrides.carb_adjustment_pct {
        Some(adjustment) => {
            validate_carb_adjustment(adjustment)?;
            base.carb_pct * (1.0 + adjustment as f64 / 100.0)
        }
        None => base.carb_pct,
    };

    if let Some(fat) = overrides.fat_pct {
        if !(fat.is_finite() && fat > 0.0 && fat < 100.0) {
            return Err(PlanError::invalid_profile(format!(
                "fat percentage {fat} must be between 0 and 100"
            )));
        }
    }

    let mut adjustments = Vec::new();
    let protein = clamp_reported(Macronutrient::Protein, protein, &mut adjustments);
    let carb = clamp_reported(Macronutrient::Carbohydrate, carb, &mut adjustments);
    let fat = clamp_reported(
        Macronutrient::Fat,
        overrides.fat_pct.unwrap_or(100.0 - protein - carb),
        &mut adjustments,
    );

    let mut split = MacroSplit::new(protein, carb, fat);
    rebalance(&mut split, &mut adjustments);
    Ok((split, adjustments))
}

fn clamp_reported(
    nutrient: Macronutrient,
    value: f64,
    adjustments: &mut Vec<MacroBoundsAdjusted>,
) -> f64 {
    let (min, max) = nutrient.bounds();
    let clamped = value.clamp(min, max);
    if (clamped - value).abs() > f64::EPSILON {
        adjustments.push(MacroBoundsAdjusted {
            nutrient,
            requested_pct: value,
            applied_pct: clamped,
            reason: AdjustmentReason::Clamped,
        });
    }
    clamped
}

/// Pushes the residual into carbohydrate, then fat, then protein, each within bounds.
fn rebalance(split: &mut MacroSplit, adjustments: &mut Vec<MacroBoundsAdjusted>) {
    let mut residual = 100.0 - split.sum();
    if residual.abs() <= SUM_TOLERANCE_PCT {
        return;
    }

    for nutrient in [
        Macronutrient::Carbohydrate,
        Macronutrient::Fat,
        Macronutrient::Protein,
    ] {
        if residual.abs() < 1e-9 {
            break;
        }
        let (min, max) = nutrient.bounds();
        let slot = match nutrient {
            Macronutrient::Protein => &mut split.protein_pct,
            Macronutrient::Carbohydrate => &mut split.carb_pct,
            Macronutrient::Fat => &mut split.fat_pct,
        };
        let room = if residual > 0.0 { max - *slot } else { *slot - min };
        let delta = residual.signum() * residual.abs().min(room.max(0.0));
        if delta.abs() < 1e-9 {
            continue;
        }
        let before = *slot;
        *slot += delta;
        residual -= delta;
        adjustments.push(MacroBoundsAdjusted {
            nutrient,
            requested_pct: before,
            applied_pct: *slot,
            reason: AdjustmentReason::Rebalanced,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProteinTier;

    const LOSS: MacroSplit = MacroSplit::new(30.0, 40.0, 30.0);

    #[test]
    fn base_split_passes_through_untouched() {
        let (split, adjustments) =
            resolve_split(LOSS, &MacroOverrides::default(), 70.0, 1920.0).unwrap();
        assert_eq!(split, LOSS);
        assert!(adjustments.is_empty());
    }

    #[test]
    fn carb_adjustment_is_multiplicative() {
        let overrides = MacroOverrides {
            carb_adjustment_pct: Some(-25),
            ..Default::default()
        };
        let (split, _) = resolve_split(LOSS, &overrides, 70.0, 2000.0).unwrap();
        assert!((split.carb_pct - 30.0).abs() < 1e-9);
        assert!((split.fat_pct - 40.0).abs() < 1e-9);
    }

    #[test]
    fn carb_adjustment_domain_is_enforced() {
        for bad in [-55, 55, 7] {
            let overrides = MacroOverrides {
                carb_adjustment_pct: Some(bad),
                ..Default::default()
            };
            assert!(matches!(
                resolve_split(LOSS, &overrides, 70.0, 2000.0),
                Err(PlanError::InvalidProfile(_))
            ));
        }
    }

    #[test]
    fn extreme_protein_is_clamped_and_reported() {
        let overrides = MacroOverrides {
            protein_tier: Some(ProteinTier::Extreme),
            ..Default::default()
        };
        // 3.5 g/kg * 100 kg * 4 / 1500 kcal = 93%
        let (split, adjustments) = resolve_split(LOSS, &overrides, 100.0, 1500.0).unwrap();
        assert_eq!(split.protein_pct, PROTEIN_MAX_PCT);
        assert!(adjustments.iter().any(|a| a.nutrient == Macronutrient::Protein
            && a.reason == AdjustmentReason::Clamped));
        assert!((split.sum() - 100.0).abs() <= SUM_TOLERANCE_PCT);
    }

    #[test]
    fn explicit_fat_forces_rebalance() {
        let overrides = MacroOverrides {
            fat_pct: Some(45.0),
            ..Default::default()
        };
        // 30 + 40 + 45 = 115, carb absorbs the excess.
        let (split, adjustments) = resolve_split(LOSS, &overrides, 70.0, 2000.0).unwrap();
        assert!((split.carb_pct - 25.0).abs() < 1e-9);
        assert!((split.sum() - 100.0).abs() < 1e-9);
        assert!(adjustments
            .iter()
            .any(|a| a.nutrient == Macronutrient::Carbohydrate
                && a.reason == AdjustmentReason::Rebalanced));
    }

    #[test]
    fn every_override_combination_stays_in_bounds() {
        let tiers = [
            None,
            Some(ProteinTier::VeryLow),
            Some(ProteinTier::Moderate),
            Some(ProteinTier::VeryHigh),
            Some(ProteinTier::Extreme),
        ];
        let fats = [None, Some(10.0), Some(30.0), Some(60.0)];
        for tier in tiers {
            for adjustment in (-50..=50).step_by(25) {
                for fat in fats {
                    for (weight, kcal) in [(45.0, 1300.0), (70.0, 1900.0), (120.0, 3400.0)] {
                        let overrides = MacroOverrides {
                            protein_tier: tier,
                            carb_adjustment_pct: Some(adjustment),
                            fat_pct: fat,
                        };
                        let (split, _) = resolve_split(LOSS, &overrides, weight, kcal).unwrap();
                        assert!((split.sum() - 100.0).abs() <= SUM_TOLERANCE_PCT, "{split:?}");
                        assert!(split.protein_pct <= PROTEIN_MAX_PCT);
                        assert!((CARB_MIN_PCT..=CARB_MAX_PCT).contains(&split.carb_pct));
                        assert!((FAT_MIN_PCT..=FAT_MAX_PCT).contains(&split.fat_pct));
                    }
                }
            }
        }
    }
}
