pub mod assembler;
pub mod slots;

pub use assembler::{portion_scale, Plan, PlanAssembler, PlanDay, PlanWarning, PlannedMeal};
pub use slots::{meal_layout, MealSlot};
