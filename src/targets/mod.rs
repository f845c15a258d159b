pub mod calculator;
pub mod split;
pub mod tables;

pub use calculator::{compute, MacroTarget};
pub use split::{AdjustmentReason, MacroBoundsAdjusted, Macronutrient};
pub use tables::{MacroConfig, MacroSplit};
