//! Calorie and macro math checks against caller-supplied targets.
//!
//! Checks run per day, in order, and stop at the first violation:
//! 1. daily calories within ±`daily_kcal_tolerance_pct` of the target;
//! 2. daily protein, carbs and fats within ±`macro_tolerance_g` each;
//! 3. with exactly two meals per day, every meal within
//!    ±`two_meal_tolerance_kcal` of half the daily target.
//!
//! Tolerances are inclusive at the boundary.

pub mod feedback;

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::PipelineConfig;
use crate::plan::{Macros, NutritionPlan};

pub use feedback::{build_meal_guidance, compose_retry_feedback, format_number};

/// Absorbs float noise from `target * pct`.
const EPSILON: f64 = 1e-9;

/// Daily macro targets in grams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroTargets {
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fats_g: f64,
}

/// Numeric constraints a nutrition plan must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionTargets {
    pub target_kcal: u32,
    pub meals_per_day: u32,
    pub macro_targets: MacroTargets,
}

impl NutritionTargets {
    /// Expected calories per meal, rounded to the nearest kcal
    /// (2399 kcal over 2 meals is 1200 per meal).
    pub fn per_meal_kcal(&self) -> f64 {
        if self.meals_per_day == 0 {
            return f64::from(self.target_kcal);
        }
        (f64::from(self.target_kcal) / f64::from(self.meals_per_day)).round()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationReason {
    DailyCaloriesMismatch,
    DailyMacrosMismatch,
    TwoMealSplitMismatch,
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DailyCaloriesMismatch => "DAILY_CALORIES_MISMATCH",
            Self::DailyMacrosMismatch => "DAILY_MACROS_MISMATCH",
            Self::TwoMealSplitMismatch => "TWO_MEAL_SPLIT_MISMATCH",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nutrient {
    Protein,
    Carbs,
    Fats,
}

impl fmt::Display for Nutrient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Protein => "protein",
            Self::Carbs => "carbs",
            Self::Fats => "fats",
        })
    }
}

/// Where in the plan a violation was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationLocation {
    pub day_index: usize,
    pub date: Option<NaiveDate>,
    pub day_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrient: Option<Nutrient>,
}

impl fmt::Display for ValidationLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day {} ({})", self.day_index + 1, self.day_label)?;
        if let Some(title) = &self.meal_title {
            write!(f, ", meal {title:?}")?;
        }
        if let Some(nutrient) = self.nutrient {
            write!(f, ", {nutrient}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationDiff {
    pub expected: f64,
    pub actual: f64,
    pub tolerance: f64,
    /// Always false on a returned failure; kept for log symmetry.
    pub within_tolerance: bool,
}

/// The first math invariant a plan violated. Recoverable via retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error(
    "{reason} at {location}: expected {}, actual {}, tolerance ±{}",
    format_number(.diff.expected),
    format_number(.diff.actual),
    format_number(.diff.tolerance)
)]
pub struct ValidationFailure {
    pub reason: ValidationReason,
    pub location: ValidationLocation,
    pub diff: ValidationDiff,
}

/// Validate a normalized plan. `None` means the plan is accepted.
pub fn validate_nutrition_plan(
    plan: &NutritionPlan,
    targets: &NutritionTargets,
    config: &PipelineConfig,
) -> Option<ValidationFailure> {
    let target_kcal = f64::from(targets.target_kcal);
    let kcal_tolerance = target_kcal * config.daily_kcal_tolerance_pct;

    for (day_index, day) in plan.days.iter().enumerate() {
        let location = ValidationLocation {
            day_index,
            date: day.date,
            day_label: day.day_label.clone(),
            meal_index: None,
            meal_title: None,
            nutrient: None,
        };

        let daily_kcal: f64 = day.meals.iter().map(|m| m.macros.calories).sum();
        if let Some(diff) = check(target_kcal, daily_kcal, kcal_tolerance) {
            return Some(fail(ValidationReason::DailyCaloriesMismatch, location, diff));
        }

        let macro_checks: [(Nutrient, f64, fn(&Macros) -> f64); 3] = [
            (Nutrient::Protein, targets.macro_targets.protein_g, |m| m.protein),
            (Nutrient::Carbs, targets.macro_targets.carbs_g, |m| m.carbs),
            (Nutrient::Fats, targets.macro_targets.fats_g, |m| m.fats),
        ];
        for (nutrient, expected, pick) in macro_checks {
            let actual: f64 = day.meals.iter().map(|m| pick(&m.macros)).sum();
            if let Some(diff) = check(expected, actual, config.macro_tolerance_g) {
                let location = ValidationLocation {
                    nutrient: Some(nutrient),
                    ..location.clone()
                };
                return Some(fail(ValidationReason::DailyMacrosMismatch, location, diff));
            }
        }

        // Only the two-meal policy carries a per-meal check.
        if targets.meals_per_day == 2 {
            let per_meal = targets.per_meal_kcal();
            for (meal_index, meal) in day.meals.iter().enumerate() {
                if let Some(diff) =
                    check(per_meal, meal.macros.calories, config.two_meal_tolerance_kcal)
                {
                    let location = ValidationLocation {
                        meal_index: Some(meal_index),
                        meal_title: Some(meal.title.clone()),
                        ..location.clone()
                    };
                    return Some(fail(ValidationReason::TwoMealSplitMismatch, location, diff));
                }
            }
        }
    }

    None
}

fn check(expected: f64, actual: f64, tolerance: f64) -> Option<ValidationDiff> {
    let within_tolerance = (actual - expected).abs() <= tolerance + EPSILON;
    (!within_tolerance).then_some(ValidationDiff {
        expected,
        actual,
        tolerance,
        within_tolerance,
    })
}

fn fail(
    reason: ValidationReason,
    location: ValidationLocation,
    diff: ValidationDiff,
) -> ValidationFailure {
    info!(
        %reason,
        day = location.day_index,
        expected = diff.expected,
        actual = diff.actual,
        tolerance = diff.tolerance,
        "plan failed math validation"
    );
    ValidationFailure {
        reason,
        location,
        diff,
    }
}
