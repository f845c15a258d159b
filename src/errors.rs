use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::recipe::MealType;

/// A (day, meal) coordinate inside a plan. Days are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SlotRef {
    pub day: u32,
    pub meal_type: MealType,
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day {} {}", self.day, self.meal_type.as_str())
    }
}

fn join_slots(slots: &[SlotRef]) -> String {
    slots
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Error)]
pub enum PlanError {
    #[error("invalid patient profile: {0}")]
    InvalidProfile(String),

    #[error("recipe index unavailable: {0}")]
    IndexUnavailable(String),

    /// The index answered but refused the request (bad query, credentials).
    #[error("recipe index rejected the request with status {status}: {message}")]
    IndexRejected { status: u16, message: String },

    #[error("no viable recipe alternatives for {}", join_slots(.slots))]
    InsufficientAlternatives { slots: Vec<SlotRef> },

    #[error("search wave timed out after {0:?}")]
    SearchTimedOut(Duration),

    #[error("all {count} search queries failed; first failure: {first}")]
    AllQueriesFailed {
        count: usize,
        #[source]
        first: Box<PlanError>,
    },

    #[error("day {day} totals {actual_kcal:.0} kcal, outside ±{tolerance_pct}% of {target_kcal} kcal")]
    ToleranceViolated {
        day: u32,
        actual_kcal: f64,
        target_kcal: u32,
        tolerance_pct: f64,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PlanError {
    /// Only transient index failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlanError::IndexUnavailable(_))
    }

    pub fn invalid_profile(message: impl Into<String>) -> Self {
        PlanError::InvalidProfile(message.into())
    }
}

/// Raised when a textual enum value (meal type, tier, activity level) is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl From<ParseEnumError> for PlanError {
    fn from(err: ParseEnumError) -> Self {
        PlanError::InvalidProfile(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_index_failures_are_retryable() {
        assert!(PlanError::IndexUnavailable("down".into()).is_retryable());
        assert!(!PlanError::invalid_profile("age").is_retryable());
        assert!(!PlanError::SearchTimedOut(Duration::from_secs(1)).is_retryable());
        assert!(!PlanError::IndexRejected { status: 401, message: "bad key".into() }.is_retryable());
    }

    #[test]
    fn insufficient_alternatives_lists_every_slot() {
        let err = PlanError::InsufficientAlternatives {
            slots: vec![
                SlotRef { day: 1, meal_type: MealType::Lunch },
                SlotRef { day: 2, meal_type: MealType::Dinner },
            ],
        };
        let message = err.to_string();
        assert!(message.contains("day 1 lunch"));
        assert!(message.contains("day 2 dinner"));
    }
}
