//! Pure transitions between pipeline states.
//!
//! raw text → parsed plan → normalized → validated → resolved. The caller
//! owns the model call and the retry loop: on a retryable error it asks the
//! model again with [`PipelineError::retry_instruction`] appended, and after
//! its own attempt budget it switches to the fallback builder.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::{Catalog, UnresolvedReference, resolve_exercise_references, resolve_recipe_references};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::extract::{ParseError, extract_json, extract_largest_json};
use crate::plan::{
    AlignmentIssue, NormalizeOptions, NutritionPlan, TrainingPlan, normalize_nutrition_plan,
    normalize_training_plan, parse_nutrition_plan, parse_training_plan,
};
use crate::validate::{NutritionTargets, validate_nutrition_plan};

/// Which JSON value to take from a model response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtractMode {
    /// The first balanced value that parses.
    #[default]
    First,
    /// The longest balanced value, for responses that carry a small
    /// unrelated fragment before the plan.
    Largest,
}

impl ExtractMode {
    pub fn extract(self, raw: &str) -> Result<Value, ParseError> {
        match self {
            Self::First => extract_json(raw),
            Self::Largest => extract_largest_json(raw),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionRequest {
    pub start_date: NaiveDate,
    pub day_count: usize,
    pub targets: NutritionTargets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRequest {
    pub start_date: NaiveDate,
    pub day_count: usize,
}

fn options(start_date: NaiveDate, day_count: usize, config: &PipelineConfig) -> NormalizeOptions {
    NormalizeOptions {
        start_date,
        day_count,
        locale: config.locale,
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Extract and shape a nutrition plan from raw model text.
pub fn parse_nutrition_response(raw: &str, mode: ExtractMode) -> Result<NutritionPlan, PipelineError> {
    let value = mode.extract(raw)?;
    Ok(parse_nutrition_plan(&value)?)
}

/// Extract and shape a training plan from raw model text.
pub fn parse_training_response(raw: &str, mode: ExtractMode) -> Result<TrainingPlan, PipelineError> {
    let value = mode.extract(raw)?;
    Ok(parse_training_plan(&value)?)
}

// ---------------------------------------------------------------------------
// Acceptance
// ---------------------------------------------------------------------------

/// A nutrition plan ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedNutritionPlan {
    pub plan: NutritionPlan,
    pub alignment_issues: Vec<AlignmentIssue>,
    /// Meals pointed at the fallback recipe.
    pub invalid_references: Vec<UnresolvedReference>,
    pub has_catalog: bool,
}

/// Normalize, validate and resolve recipes for a nutrition plan.
///
/// A math failure is returned as [`PipelineError::Validation`]. Unmatched
/// recipes never fail the plan; they are replaced and reported.
pub fn accept_nutrition_plan(
    plan: &NutritionPlan,
    request: &NutritionRequest,
    recipes: &Catalog,
    config: &PipelineConfig,
) -> Result<AcceptedNutritionPlan, PipelineError> {
    let normalized = normalize_nutrition_plan(
        plan,
        &options(request.start_date, request.day_count, config),
    )?;

    if let Some(failure) = validate_nutrition_plan(&normalized.plan, &request.targets, config) {
        return Err(failure.into());
    }

    let resolution = resolve_recipe_references(&normalized.plan, recipes);
    if !resolution.invalid_references.is_empty() {
        warn!(
            count = resolution.invalid_references.len(),
            "nutrition plan accepted with fallback recipes"
        );
    }
    debug!(days = resolution.plan.days.len(), "nutrition plan accepted");

    Ok(AcceptedNutritionPlan {
        plan: resolution.plan,
        alignment_issues: normalized.alignment_issues,
        invalid_references: resolution.invalid_references,
        has_catalog: resolution.has_catalog,
    })
}

/// A training plan ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedTrainingPlan {
    pub plan: TrainingPlan,
    pub alignment_issues: Vec<AlignmentIssue>,
    pub catalog_available: bool,
}

/// Normalize a training plan and resolve every exercise.
///
/// Any unresolved exercise rejects the whole plan with
/// [`PipelineError::UnresolvedCatalogReference`]. With no catalog to match
/// against the plan is accepted unresolved.
pub fn accept_training_plan(
    plan: &TrainingPlan,
    request: &TrainingRequest,
    exercises: &Catalog,
    config: &PipelineConfig,
) -> Result<AcceptedTrainingPlan, PipelineError> {
    let normalized = normalize_training_plan(
        plan,
        &options(request.start_date, request.day_count, config),
    )?;

    let resolution = resolve_exercise_references(&normalized.plan, exercises);
    if !resolution.unresolved.is_empty() {
        return Err(PipelineError::UnresolvedCatalogReference(resolution.unresolved));
    }
    if !resolution.catalog_available {
        warn!("exercise catalog unavailable; training plan accepted without references");
    }

    Ok(AcceptedTrainingPlan {
        plan: resolution.plan,
        alignment_issues: normalized.alignment_issues,
        catalog_available: resolution.catalog_available,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogItem;
    use crate::validate::{MacroTargets, ValidationReason};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn nutrition_request(day_count: usize) -> NutritionRequest {
        NutritionRequest {
            start_date: start(),
            day_count,
            targets: NutritionTargets {
                target_kcal: 2000,
                meals_per_day: 3,
                macro_targets: MacroTargets {
                    protein_g: 150.0,
                    carbs_g: 200.0,
                    fats_g: 67.0,
                },
            },
        }
    }

    // 150 P / 200 C / 67 F = 600 + 800 + 603 = 2003 kcal
    const BALANCED_DAY: &str = r#"{"days":[{"meals":[
        {"title":"Desayuno","protein":40,"carbs":60,"fats":20},
        {"title":"Almuerzo","protein":60,"carbs":80,"fats":25},
        {"title":"Cena","protein":50,"carbs":60,"fats":22}
    ]}]}"#;

    #[test]
    fn parse_reports_extraction_failure() {
        let err = parse_nutrition_response("lo siento, no puedo", ExtractMode::First).unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn largest_mode_skips_leading_fragment() {
        let raw = format!("{{\"note\":1}} y el plan: {BALANCED_DAY}");
        assert!(parse_nutrition_response(&raw, ExtractMode::First).is_err());
        let plan = parse_nutrition_response(&raw, ExtractMode::Largest).unwrap();
        assert_eq!(plan.days[0].meals.len(), 3);
    }

    #[test]
    fn balanced_plan_is_accepted_for_every_day() {
        let plan = parse_nutrition_response(BALANCED_DAY, ExtractMode::First).unwrap();
        let out = accept_nutrition_plan(
            &plan,
            &nutrition_request(7),
            &Catalog::default(),
            &PipelineConfig::default(),
        )
        .unwrap();
        assert_eq!(out.plan.days.len(), 7);
        assert!(!out.has_catalog);
        assert_eq!(out.plan.days[0].totals.calories, 2003.0);
    }

    #[test]
    fn math_failure_is_a_validation_error() {
        let mut request = nutrition_request(1);
        request.targets.target_kcal = 2400;
        let plan = parse_nutrition_response(BALANCED_DAY, ExtractMode::First).unwrap();
        let err = accept_nutrition_plan(&plan, &request, &Catalog::default(), &PipelineConfig::default())
            .unwrap_err();
        match &err {
            PipelineError::Validation(f) => {
                assert_eq!(f.reason, ValidationReason::DailyCaloriesMismatch)
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(err.retry_instruction(PipelineConfig::default().locale).is_some());
    }

    #[test]
    fn unresolved_exercise_rejects_training_plan() {
        let raw = r#"{"days":[{"exercises":[
            {"name":"Sentadilla","sets":4,"reps":"8"},
            {"name":"Curl raro","sets":3,"reps":"12"}
        ]}]}"#;
        let plan = parse_training_response(raw, ExtractMode::First).unwrap();
        let catalog = Catalog::new(vec![CatalogItem {
            id: "ex-1".into(),
            name: "Sentadilla".into(),
            equipment: None,
            media: None,
        }]);
        let request = TrainingRequest {
            start_date: start(),
            day_count: 2,
        };
        let err = accept_training_plan(&plan, &request, &catalog, &PipelineConfig::default())
            .unwrap_err();
        match err {
            PipelineError::UnresolvedCatalogReference(report) => {
                // The single source day is cycled into both requested days.
                assert_eq!(report.len(), 2);
                assert!(report.iter().all(|r| r.title == "Curl raro"));
            }
            other => panic!("expected unresolved references, got {other:?}"),
        }
    }

    #[test]
    fn training_without_catalog_is_accepted() {
        let raw = r#"[{"exercises":[{"name":"Sentadilla","sets":4,"reps":"8"}]}]"#;
        let plan = parse_training_response(raw, ExtractMode::First).unwrap();
        let request = TrainingRequest {
            start_date: start(),
            day_count: 3,
        };
        let out =
            accept_training_plan(&plan, &request, &Catalog::default(), &PipelineConfig::default())
                .unwrap();
        assert!(!out.catalog_available);
        assert_eq!(out.plan.days.len(), 3);
    }
}
