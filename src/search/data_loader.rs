use std::path::Path;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use tracing::{info, warn};

use crate::recipe::{EconomicTier, MacroGrams, MealType, RecipeDocument};

const ID_COL: &str = "id";
const NAME_COL: &str = "name";
const MEAL_TYPES_COL: &str = "meal_types";
const CATEGORY_COL: &str = "category";
const CALORIES_COL: &str = "calories";
const INGREDIENTS_COL: &str = "ingredients";
const ECONOMIC_TIER_COL: &str = "economic_tier";
const TEXT_COL: &str = "text";
// Optional per-portion macro columns.
const PROTEIN_COL: &str = "protein_g";
const CARB_COL: &str = "carb_g";
const FAT_COL: &str = "fat_g";

const MEAL_TYPE_SEPARATOR: char = '|';
const INGREDIENT_SEPARATOR: char = ';';

fn parse_optional_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn column(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| anyhow::anyhow!("Column '{}' not found", name))
}

fn optional_column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
}

/// Loads the recipe corpus from CSV. Rows without an id or name are skipped;
/// unparseable meal types or tiers fail the load with the offending row.
pub fn load_recipe_corpus(csv_path: &Path) -> Result<Vec<RecipeDocument>> {
    if !csv_path.exists() {
        return Err(anyhow::anyhow!("Recipe corpus CSV not found at: {:?}", csv_path));
    }

    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open recipe corpus CSV at {:?}", csv_path))?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers = rdr.headers()?.clone();
    let id_idx = column(&headers, ID_COL)?;
    let name_idx = column(&headers, NAME_COL)?;
    let meal_idx = column(&headers, MEAL_TYPES_COL)?;
    let category_idx = column(&headers, CATEGORY_COL)?;
    let calories_idx = column(&headers, CALORIES_COL)?;
    let ingredients_idx = column(&headers, INGREDIENTS_COL)?;
    let tier_idx = column(&headers, ECONOMIC_TIER_COL)?;
    let text_idx = column(&headers, TEXT_COL)?;
    let macro_idx = match (
        optional_column(&headers, PROTEIN_COL),
        optional_column(&headers, CARB_COL),
        optional_column(&headers, FAT_COL),
    ) {
        (Some(p), Some(c), Some(f)) => Some((p, c, f)),
        _ => None,
    };

    let mut recipes = Vec::new();
    for (row_index, result) in rdr.records().enumerate() {
        let record =
            result.with_context(|| format!("Failed to read record at row index {}", row_index))?;
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();

        let id = field(id_idx).to_string();
        let name = field(name_idx).to_string();
        if id.is_empty() || name.is_empty() {
            warn!(row = row_index + 1, "skipping recipe row without id or name");
            continue;
        }

        let meal_types = field(meal_idx)
            .split(MEAL_TYPE_SEPARATOR)
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(|m| m.parse::<MealType>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Invalid meal type for recipe '{}' at row {}", id, row_index + 1))?;

        let economic_tier = field(tier_idx)
            .parse::<EconomicTier>()
            .with_context(|| format!("Invalid economic tier for recipe '{}' at row {}", id, row_index + 1))?;

        let macros = macro_idx.and_then(|(p, c, f)| {
            Some(MacroGrams {
                protein_g: parse_optional_f64(field(p))?,
                carb_g: parse_optional_f64(field(c))?,
                fat_g: parse_optional_f64(field(f))?,
            })
        });

        recipes.push(RecipeDocument {
            id,
            name,
            meal_types,
            category: field(category_idx).to_string(),
            calorie_estimate: parse_optional_f64(field(calories_idx)).filter(|kcal| *kcal > 0.0),
            ingredients: field(ingredients_idx)
                .split(INGREDIENT_SEPARATOR)
                .map(str::trim)
                .filter(|i| !i.is_empty())
                .map(String::from)
                .collect(),
            economic_tier,
            raw_text: field(text_idx).to_string(),
            macros,
        });
    }

    if recipes.is_empty() {
        return Err(anyhow::anyhow!("No valid recipes loaded from {:?}", csv_path));
    }
    info!(count = recipes.len(), path = ?csv_path, "loaded recipe corpus");
    Ok(recipes)
}
