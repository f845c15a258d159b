use serde::Serialize;

use crate::profile::MealDistribution;
use crate::recipe::MealType;

/// One meal position within a day and its share of the daily calories.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MealSlot {
    pub position: usize,
    pub meal_type: MealType,
    pub share: f64,
}

const SNACK_ROTATION: [MealType; 3] = [
    MealType::MorningSnack,
    MealType::AfternoonSnack,
    MealType::EveningSnack,
];

fn traditional(meals_per_day: u32) -> Option<Vec<(MealType, f64)>> {
    use MealType::*;
    let layout = match meals_per_day {
        1 => vec![(Lunch, 1.0)],
        2 => vec![(Lunch, 0.5), (Dinner, 0.5)],
        3 => vec![(Breakfast, 0.30), (Lunch, 0.40), (Dinner, 0.30)],
        4 => vec![(Breakfast, 0.25), (Lunch, 0.35), (AfternoonSnack, 0.15), (Dinner, 0.25)],
        5 => vec![
            (Breakfast, 0.20),
            (MorningSnack, 0.10),
            (Lunch, 0.35),
            (AfternoonSnack, 0.15),
            (Dinner, 0.20),
        ],
        6 => vec![
            (Breakfast, 0.20),
            (MorningSnack, 0.10),
            (Lunch, 0.30),
            (AfternoonSnack, 0.10),
            (Dinner, 0.20),
            (EveningSnack, 0.10),
        ],
        _ => return None,
    };
    Some(layout)
}

/// Slot layout for a day. Beyond six meals the extra slots rotate through the
/// snack types and every slot gets an equal share.
pub fn meal_layout(meals_per_day: u32, distribution: MealDistribution) -> Vec<MealSlot> {
    let meals_per_day = meals_per_day.max(1);
    let (types, shares): (Vec<MealType>, Vec<f64>) = match traditional(meals_per_day) {
        Some(layout) => layout.into_iter().unzip(),
        None => {
            let mut types: Vec<MealType> = MealType::ALL.to_vec();
            types.extend(
                SNACK_ROTATION
                    .iter()
                    .cycle()
                    .take(meals_per_day as usize - MealType::ALL.len()),
            );
            let share = 1.0 / meals_per_day as f64;
            let shares = vec![share; types.len()];
            (types, shares)
        }
    };

    let equal_share = 1.0 / types.len() as f64;
    types
        .into_iter()
        .zip(shares)
        .enumerate()
        .map(|(position, (meal_type, share))| MealSlot {
            position,
            meal_type,
            share: match distribution {
                MealDistribution::Traditional => share,
                MealDistribution::Equitable => equal_share,
            },
        })
        .collect()
}
