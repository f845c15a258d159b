//! Follow-up consultations: progress since the plan started and the
//! recalculated calorie target that answers it.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::PlanError;
use crate::profile::PatientProfile;
use crate::targets::{self, MacroConfig, MacroTarget};

const MAX_WEIGHT_KG: f64 = 500.0;
const RAPID_LOSS_KG_PER_WEEK: f64 = -1.0;
const GOOD_LOSS_KG_PER_WEEK: f64 = -0.5;
const RAPID_GAIN_KG_PER_WEEK: f64 = 0.5;

fn default_adherence() -> f64 {
    80.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Data collected at a control visit. `profile` is the patient as planned,
/// so its weight is the baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlData {
    pub profile: PatientProfile,
    pub current_weight_kg: f64,
    pub days_on_plan: u32,
    #[serde(default = "default_adherence")]
    pub adherence_pct: f64,
    #[serde(default)]
    pub reported_issues: Vec<String>,
    #[serde(default)]
    pub requested_changes: Vec<String>,
    #[serde(default)]
    pub new_pathologies: BTreeSet<String>,
    #[serde(default)]
    pub new_medications: Vec<String>,
}

impl ControlData {
    pub fn from_json(raw: &str) -> Result<Self, PlanError> {
        let control: ControlData = serde_json::from_str(raw)
            .map_err(|e| PlanError::invalid_profile(e.to_string()))?;
        control.validate()?;
        Ok(control)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        self.profile.validate()?;
        if !(self.current_weight_kg.is_finite()
            && self.current_weight_kg > 0.0
            && self.current_weight_kg <= MAX_WEIGHT_KG)
        {
            return Err(PlanError::invalid_profile(format!(
                "current weight must be in (0, {MAX_WEIGHT_KG}] kg"
            )));
        }
        if self.days_on_plan < 1 {
            return Err(PlanError::invalid_profile("days on plan must be at least 1"));
        }
        if !(0.0..=100.0).contains(&self.adherence_pct) {
            return Err(PlanError::invalid_profile("adherence must be between 0 and 100"));
        }
        Ok(())
    }

    /// Kilograms gained (positive) or lost (negative), to two decimals.
    pub fn weight_change_kg(&self) -> f64 {
        round2(self.current_weight_kg - self.profile.weight_kg)
    }

    pub fn weight_change_pct(&self) -> f64 {
        round2(self.weight_change_kg() / self.profile.weight_kg * 100.0)
    }

    pub fn weekly_rate_kg(&self) -> f64 {
        self.weight_change_kg() / self.days_on_plan as f64 * 7.0
    }

    pub fn current_bmi(&self) -> f64 {
        let meters = self.profile.height_cm / 100.0;
        round2(self.current_weight_kg / (meters * meters))
    }

    fn reports(&self, issue: &str) -> bool {
        self.reported_issues
            .iter()
            .any(|reported| reported.to_lowercase().contains(issue))
    }

    /// The profile to plan with from now on: current weight, every
    /// pathology known so far.
    pub fn updated_profile(&self) -> PatientProfile {
        let mut profile = self.profile.clone();
        profile.weight_kg = self.current_weight_kg;
        profile
            .pathologies
            .extend(self.new_pathologies.iter().cloned());
        profile
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    RapidLoss,
    GoodLoss,
    SlowLoss,
    Stable,
    ModerateGain,
    RapidGain,
}

impl ProgressStatus {
    pub fn classify(weight_change_kg: f64, weekly_rate_kg: f64) -> Self {
        if weight_change_kg < 0.0 {
            if weekly_rate_kg < RAPID_LOSS_KG_PER_WEEK {
                ProgressStatus::RapidLoss
            } else if weekly_rate_kg < GOOD_LOSS_KG_PER_WEEK {
                ProgressStatus::GoodLoss
            } else {
                ProgressStatus::SlowLoss
            }
        } else if weight_change_kg > 0.0 {
            if weekly_rate_kg > RAPID_GAIN_KG_PER_WEEK {
                ProgressStatus::RapidGain
            } else {
                ProgressStatus::ModerateGain
            }
        } else {
            ProgressStatus::Stable
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ProgressStatus::RapidLoss => "Weight loss is too rapid",
            ProgressStatus::GoodLoss => "Weight loss is on track",
            ProgressStatus::SlowLoss => "Weight loss is slower than expected",
            ProgressStatus::Stable => "Weight is stable",
            ProgressStatus::ModerateGain => "Slight weight gain observed",
            ProgressStatus::RapidGain => "Weight gain is too rapid",
        }
    }

    /// Daily kcal added to the recalculated target.
    pub fn calorie_delta(self) -> i32 {
        match self {
            ProgressStatus::RapidLoss => 250,
            ProgressStatus::SlowLoss => -150,
            ProgressStatus::RapidGain => -250,
            _ => 0,
        }
    }

    fn is_rapid(self) -> bool {
        matches!(self, ProgressStatus::RapidLoss | ProgressStatus::RapidGain)
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdherenceStatus {
    Excellent,
    Good,
    Moderate,
    Poor,
}

impl AdherenceStatus {
    pub fn from_pct(pct: f64) -> Self {
        if pct >= 90.0 {
            AdherenceStatus::Excellent
        } else if pct >= 70.0 {
            AdherenceStatus::Good
        } else if pct >= 50.0 {
            AdherenceStatus::Moderate
        } else {
            AdherenceStatus::Poor
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    pub weight_change_kg: f64,
    pub weight_change_pct: f64,
    pub weekly_rate_kg: f64,
    pub status: ProgressStatus,
    pub status_message: String,
    pub adherence: AdherenceStatus,
    pub adherence_pct: f64,
    pub current_bmi: f64,
    pub issues_reported: bool,
    pub changes_requested: bool,
    pub recommendations: Vec<String>,
    /// Days until the next control visit.
    pub next_control_days: u32,
}

pub fn analyze_progress(control: &ControlData) -> Result<ProgressReport, PlanError> {
    control.validate()?;
    let weight_change_kg = control.weight_change_kg();
    let weekly_rate = control.weekly_rate_kg();
    let status = ProgressStatus::classify(weight_change_kg, weekly_rate);
    let adherence = AdherenceStatus::from_pct(control.adherence_pct);

    let report = ProgressReport {
        weight_change_kg,
        weight_change_pct: control.weight_change_pct(),
        weekly_rate_kg: round2(weekly_rate),
        status,
        status_message: status.message().to_string(),
        adherence,
        adherence_pct: control.adherence_pct,
        current_bmi: control.current_bmi(),
        issues_reported: !control.reported_issues.is_empty(),
        changes_requested: !control.requested_changes.is_empty(),
        recommendations: recommendations(control, status, adherence),
        next_control_days: next_control_days(control, status, adherence),
    };
    info!(
        status = ?report.status,
        weekly_rate_kg = report.weekly_rate_kg,
        adherence = ?report.adherence,
        next_control_days = report.next_control_days,
        "progress analyzed"
    );
    Ok(report)
}

fn recommendations(
    control: &ControlData,
    status: ProgressStatus,
    adherence: AdherenceStatus,
) -> Vec<String> {
    let mut out: Vec<&str> = Vec::new();
    match status {
        ProgressStatus::RapidLoss => out.extend([
            "Increase caloric intake by 200-300 kcal/day",
            "Ensure adequate protein intake to preserve muscle mass",
        ]),
        ProgressStatus::SlowLoss => out.extend([
            "Review portion sizes and ensure accurate tracking",
            "Consider increasing physical activity",
        ]),
        ProgressStatus::RapidGain => out.extend([
            "Reduce caloric intake by 200-300 kcal/day",
            "Focus on nutrient-dense, lower-calorie foods",
        ]),
        _ => {}
    }
    match adherence {
        AdherenceStatus::Poor => out.extend([
            "Simplify meal preparation with batch cooking",
            "Consider meal prep services or simpler recipes",
        ]),
        AdherenceStatus::Moderate => out.extend([
            "Identify specific challenges with plan adherence",
            "Consider flexibility in meal timing or choices",
        ]),
        _ => {}
    }
    if control.reports("hunger") || control.reports("hambre") {
        out.extend([
            "Increase fiber and protein content in meals",
            "Add healthy snacks between meals",
        ]);
    }
    if control.reports("fatigue") || control.reports("cansancio") {
        out.extend([
            "Ensure adequate iron and B-vitamin intake",
            "Review meal timing for energy optimization",
        ]);
    }
    if !control.new_pathologies.is_empty() {
        out.extend([
            "Adjust plan for new medical conditions",
            "Consult with medical team for specific restrictions",
        ]);
    }
    out.into_iter().map(String::from).collect()
}

fn next_control_days(control: &ControlData, status: ProgressStatus, adherence: AdherenceStatus) -> u32 {
    if status.is_rapid() {
        7
    } else if adherence == AdherenceStatus::Poor {
        10
    } else if !control.new_pathologies.is_empty() || !control.new_medications.is_empty() {
        14
    } else {
        21
    }
}

/// Recalculated target plus the notes explaining what changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustedTarget {
    pub target: MacroTarget,
    pub calorie_delta: i32,
    pub adjustments: Vec<String>,
}

/// Recomputes the target from the baseline profile, then shifts the daily
/// calories by the progress status. The split percentages are kept.
pub fn adjust_target(
    control: &ControlData,
    report: &ProgressReport,
    config: &MacroConfig,
) -> Result<AdjustedTarget, PlanError> {
    let mut baseline = control.profile.clone();
    baseline
        .pathologies
        .extend(control.new_pathologies.iter().cloned());
    let mut target = targets::compute(&baseline, config)?;

    let delta = report.status.calorie_delta();
    let adjusted = target.daily_calories as i64 + delta as i64;
    if adjusted <= 0 {
        return Err(PlanError::invalid_profile(format!(
            "adjusted daily budget {adjusted} kcal is not positive"
        )));
    }
    target.daily_calories = adjusted as u32;
    target.daily_adjustment += delta;

    let mut adjustments: Vec<String> = Vec::new();
    match report.status {
        ProgressStatus::RapidLoss => {
            adjustments.push("Increased daily calories by 200-300 kcal".into())
        }
        ProgressStatus::SlowLoss => {
            adjustments.push("Reduced daily calories by 100-200 kcal".into())
        }
        ProgressStatus::RapidGain => {
            adjustments.push("Reduced daily calories by 200-300 kcal".into())
        }
        _ => {}
    }
    if control.reports("hunger") || control.reports("hambre") {
        adjustments.push("Added more high-fiber foods for satiety".into());
        adjustments.push("Increased protein portions".into());
    }
    if control.reports("fatigue") || control.reports("cansancio") {
        adjustments.push("Added iron-rich foods".into());
        adjustments.push("Improved meal timing for energy".into());
    }
    if !control.new_pathologies.is_empty() {
        let conditions: Vec<&str> = control.new_pathologies.iter().map(String::as_str).collect();
        adjustments.push(format!("Adapted for new conditions: {}", conditions.join(", ")));
    }
    for change in &control.requested_changes {
        adjustments.push(format!("Accommodated request: {change}"));
    }

    info!(
        daily_calories = target.daily_calories,
        calorie_delta = delta,
        adjustments = adjustments.len(),
        "target adjusted"
    );
    Ok(AdjustedTarget {
        target,
        calorie_delta: delta,
        adjustments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::tests::sample_profile;

    fn control(current_weight_kg: f64, days_on_plan: u32) -> ControlData {
        ControlData {
            profile: sample_profile(),
            current_weight_kg,
            days_on_plan,
            adherence_pct: 80.0,
            reported_issues: Vec::new(),
            requested_changes: Vec::new(),
            new_pathologies: BTreeSet::new(),
            new_medications: Vec::new(),
        }
    }

    #[test]
    fn weight_change_is_rounded_to_two_decimals() {
        let c = control(68.333, 14);
        assert_eq!(c.weight_change_kg(), -1.67);
        assert_eq!(c.weight_change_pct(), -2.39);
    }

    #[test]
    fn classifies_weekly_rate() {
        // 70 kg baseline.
        let cases = [
            (67.0, 14, ProgressStatus::RapidLoss),
            (68.5, 14, ProgressStatus::GoodLoss),
            (69.5, 14, ProgressStatus::SlowLoss),
            (70.0, 14, ProgressStatus::Stable),
            (70.5, 14, ProgressStatus::ModerateGain),
            (72.0, 14, ProgressStatus::RapidGain),
        ];
        for (weight, days, expected) in cases {
            let report = analyze_progress(&control(weight, days)).unwrap();
            assert_eq!(report.status, expected, "{weight} kg after {days} days");
        }
    }

    #[test]
    fn adherence_thresholds() {
        assert_eq!(AdherenceStatus::from_pct(95.0), AdherenceStatus::Excellent);
        assert_eq!(AdherenceStatus::from_pct(70.0), AdherenceStatus::Good);
        assert_eq!(AdherenceStatus::from_pct(50.0), AdherenceStatus::Moderate);
        assert_eq!(AdherenceStatus::from_pct(49.9), AdherenceStatus::Poor);
    }

    #[test]
    fn next_control_follows_urgency() {
        assert_eq!(analyze_progress(&control(67.0, 14)).unwrap().next_control_days, 7);

        let mut poor = control(69.5, 14);
        poor.adherence_pct = 30.0;
        assert_eq!(analyze_progress(&poor).unwrap().next_control_days, 10);

        let mut medicated = control(69.5, 14);
        medicated.new_medications.push("metformin".into());
        assert_eq!(analyze_progress(&medicated).unwrap().next_control_days, 14);

        assert_eq!(analyze_progress(&control(69.5, 14)).unwrap().next_control_days, 21);
    }

    #[test]
    fn recommendations_cover_status_adherence_and_issues() {
        let mut c = control(67.0, 14);
        c.adherence_pct = 55.0;
        c.reported_issues.push("Hunger in the afternoon".into());
        let report = analyze_progress(&c).unwrap();
        let recs = &report.recommendations;
        assert_eq!(recs[0], "Increase caloric intake by 200-300 kcal/day");
        assert!(recs.iter().any(|r| r == "Identify specific challenges with plan adherence"));
        assert!(recs.iter().any(|r| r == "Add healthy snacks between meals"));
        assert!(report.issues_reported);
        assert!(!report.changes_requested);
    }

    #[test]
    fn adjust_target_shifts_the_recomputed_budget() {
        let config = MacroConfig::default();
        let base = targets::compute(&sample_profile(), &config).unwrap();

        let c = control(69.5, 14);
        let report = analyze_progress(&c).unwrap();
        let adjusted = adjust_target(&c, &report, &config).unwrap();
        assert_eq!(report.status, ProgressStatus::SlowLoss);
        assert_eq!(adjusted.calorie_delta, -150);
        assert_eq!(adjusted.target.daily_calories, base.daily_calories - 150);
        assert_eq!(adjusted.target.carb_pct, base.carb_pct);
        assert_eq!(adjusted.adjustments, vec!["Reduced daily calories by 100-200 kcal"]);

        let c = control(67.0, 14);
        let report = analyze_progress(&c).unwrap();
        let adjusted = adjust_target(&c, &report, &config).unwrap();
        assert_eq!(adjusted.target.daily_calories, base.daily_calories + 250);
    }

    #[test]
    fn adjust_target_notes_conditions_and_requests() {
        let mut c = control(70.0, 21);
        c.new_pathologies.insert("Hipertensión".into());
        c.requested_changes.push("more fish".into());
        c.reported_issues.push("fatigue".into());
        let report = analyze_progress(&c).unwrap();
        let adjusted = adjust_target(&c, &report, &MacroConfig::default()).unwrap();
        assert_eq!(adjusted.calorie_delta, 0);
        assert_eq!(
            adjusted.adjustments,
            vec![
                "Added iron-rich foods",
                "Improved meal timing for energy",
                "Adapted for new conditions: Hipertensión",
                "Accommodated request: more fish",
            ]
        );
        assert!(c.updated_profile().avoid_set().contains("sal"));
        assert_eq!(c.updated_profile().weight_kg, 70.0);
    }

    #[test]
    fn rejects_out_of_range_control_data() {
        assert!(analyze_progress(&control(0.0, 14)).is_err());
        assert!(analyze_progress(&control(501.0, 14)).is_err());
        assert!(analyze_progress(&control(70.0, 0)).is_err());
        let mut c = control(70.0, 7);
        c.adherence_pct = 120.0;
        assert!(matches!(analyze_progress(&c), Err(PlanError::InvalidProfile(_))));
    }

    #[test]
    fn parses_control_json_with_default_adherence() {
        let raw = r#"{
            "profile": {
                "age": 30, "sex": "female", "height_cm": 165, "weight_kg": 70,
                "activity_level": "moderate", "meals_per_day": 3, "days_requested": 7,
                "weight_goal_kg_per_week": -0.25
            },
            "current_weight_kg": 69.2,
            "days_on_plan": 14,
            "new_pathologies": ["diabetes"]
        }"#;
        let c = ControlData::from_json(raw).unwrap();
        assert_eq!(c.adherence_pct, 80.0);
        assert_eq!(c.weight_change_kg(), -0.8);
        assert!(c.updated_profile().pathologies.contains("diabetes"));
    }
}
