pub mod cli;
pub mod config;
pub mod errors;
pub mod followup;
pub mod plan;
pub mod planner;
pub mod profile;
pub mod recipe;
pub mod search;
pub mod targets;

pub use config::EngineConfig;
pub use errors::PlanError;
pub use followup::{ControlData, ProgressReport};
pub use planner::{AlternativesRequest, FollowUpResponse, NutritionPlanner, PlanResponse};
pub use profile::PatientProfile;
pub use targets::MacroTarget;
