//! File-driven pipeline commands: `extract`, `nutrition`, `training`,
//! `guidance` and `fallback`.
//!
//! These never touch the database. Each reads a model response or catalog
//! from disk, runs the pure pipeline stages and prints JSON to stdout.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;

use fitplan_core::catalog::{Catalog, CatalogItem};
use fitplan_core::fallback::{
    Equipment, FallbackRequest, Goal, Level, build_fallback_plan, plan_fingerprint,
};
use fitplan_core::pipeline::{
    ExtractMode, NutritionRequest, TrainingRequest, accept_nutrition_plan, accept_training_plan,
    parse_nutrition_response, parse_training_response,
};
use fitplan_core::validate::{MacroTargets, NutritionTargets, build_meal_guidance};
use fitplan_core::{PipelineConfig, PipelineError};

/// Read a model response from `path`, or stdin when `path` is `-`.
fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read model response from stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))
}

/// Load a catalog JSON array. No path means an empty catalog.
pub fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    let Some(path) = path else {
        return Ok(Catalog::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog {}", path.display()))?;
    let items: Vec<CatalogItem> = serde_json::from_str(&contents)
        .with_context(|| format!("catalog {} is not a JSON array of items", path.display()))?;
    Ok(Catalog::new(items))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{out}");
    Ok(())
}

/// Report a pipeline failure on stderr and convert it for `main`.
///
/// Retryable failures print the instruction to append to the next attempt.
pub fn report_failure(err: PipelineError, config: &PipelineConfig) -> anyhow::Error {
    match &err {
        PipelineError::UnresolvedCatalogReference(report) => {
            for entry in report {
                eprintln!("  unresolved: {entry}");
            }
        }
        _ if err.is_retryable() => {
            if let Some(instruction) = err.retry_instruction(config.locale) {
                eprintln!("retry instruction: {instruction}");
            }
        }
        _ => {}
    }
    anyhow::Error::new(err)
}

fn extract_mode(largest: bool) -> ExtractMode {
    if largest {
        ExtractMode::Largest
    } else {
        ExtractMode::First
    }
}

/// `fitplan extract`
pub fn run_extract(path: &str, largest: bool, config: &PipelineConfig) -> Result<()> {
    let raw = read_input(path)?;
    let value = extract_mode(largest)
        .extract(&raw)
        .map_err(|e| report_failure(e.into(), config))?;
    print_json(&value)
}

pub struct NutritionArgs<'a> {
    pub path: &'a str,
    pub start: NaiveDate,
    pub days: usize,
    pub targets: NutritionTargets,
    pub recipes: Option<&'a Path>,
    pub largest: bool,
}

/// `fitplan nutrition`
pub fn run_nutrition(args: NutritionArgs<'_>, config: &PipelineConfig) -> Result<()> {
    let raw = read_input(args.path)?;
    let recipes = load_catalog(args.recipes)?;
    let request = NutritionRequest {
        start_date: args.start,
        day_count: args.days,
        targets: args.targets,
    };

    let accepted = parse_nutrition_response(&raw, extract_mode(args.largest))
        .and_then(|plan| accept_nutrition_plan(&plan, &request, &recipes, config))
        .map_err(|e| report_failure(e, config))?;

    for entry in &accepted.invalid_references {
        eprintln!("  fallback recipe used: {entry}");
    }
    print_json(&accepted)
}

/// `fitplan training`
pub fn run_training(
    path: &str,
    start: NaiveDate,
    days: usize,
    catalog: Option<&Path>,
    largest: bool,
    config: &PipelineConfig,
) -> Result<()> {
    let raw = read_input(path)?;
    let catalog = load_catalog(catalog)?;
    let request = TrainingRequest {
        start_date: start,
        day_count: days,
    };

    let accepted = parse_training_response(&raw, extract_mode(largest))
        .and_then(|plan| accept_training_plan(&plan, &request, &catalog, config))
        .map_err(|e| report_failure(e, config))?;
    print_json(&accepted)
}

/// `fitplan guidance`
pub fn run_guidance(
    target_kcal: u32,
    meals_per_day: u32,
    macros: MacroTargets,
    config: &PipelineConfig,
) -> Result<()> {
    let targets = NutritionTargets {
        target_kcal,
        meals_per_day,
        macro_targets: macros,
    };
    println!("{}", build_meal_guidance(&targets, config));
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FallbackOutput {
    fingerprint: String,
    plan: fitplan_core::plan::TrainingPlan,
}

/// `fitplan fallback`
pub fn run_fallback(
    request: &FallbackRequest,
    catalog: &Path,
    config: &PipelineConfig,
) -> Result<()> {
    let catalog = load_catalog(Some(catalog))?;
    let plan = build_fallback_plan(request, &catalog, config)
        .map_err(|e| report_failure(e.into(), config))?;
    let fingerprint = plan_fingerprint(&plan).context("failed to fingerprint fallback plan")?;
    print_json(&FallbackOutput { fingerprint, plan })
}

/// Assemble a fallback request from CLI values.
pub fn fallback_request(
    days_per_week: u32,
    level: Level,
    goal: Goal,
    start: NaiveDate,
    equipment: Equipment,
) -> FallbackRequest {
    FallbackRequest {
        days_per_week,
        level,
        goal,
        start_date: start,
        equipment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_catalog_path_is_empty() {
        assert!(load_catalog(None).unwrap().is_empty());
    }

    #[test]
    fn loads_catalog_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("exercises.json");
        std::fs::write(
            &path,
            r#"[
                {"id":"ex-1","name":"Sentadilla","equipment":"Bodyweight","media_url":"s.mp4"},
                {"id":"ex-2","name":"Press banca"}
            ]"#,
        )
        .unwrap();

        let catalog = load_catalog(Some(&path)).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("ex-1").unwrap().media.as_deref(), Some("s.mp4"));
        assert_eq!(catalog.find_by_name("press BANCA").unwrap().id, "ex-2");
    }

    #[test]
    fn malformed_catalog_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, r#"{"id":"x"}"#).unwrap();

        let err = load_catalog(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("not a JSON array"));
    }

    #[test]
    fn report_failure_keeps_pipeline_error() {
        let err = report_failure(
            PipelineError::UnresolvedCatalogReference(Vec::new()),
            &PipelineConfig::default(),
        );
        assert!(err.downcast_ref::<PipelineError>().is_some());
    }
}
