//! Deterministic training plan builder used when generation is unavailable
//! or its retry budget is spent.
//!
//! Output depends only on the request, the catalog contents and the config.
//! The catalog is ordered by id before use so its incoming order never
//! changes the result.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::catalog::{Catalog, CatalogItem};
use crate::config::{Locale, PipelineConfig};
use crate::plan::{Exercise, TrainingDay, TrainingPlan};

/// Catalog equipment tag that home workouts are restricted to.
pub const HOME_EQUIPMENT_TAG: &str = "Bodyweight";

#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    #[error("no catalog exercises available for a fallback plan")]
    EmptyCatalog,

    #[error("no catalog exercises match the {tag} equipment tag")]
    NoEquipmentMatch { tag: &'static str },

    #[error("days per week must be between 1 and 7, got {0}")]
    InvalidDaysPerWeek(u32),

    #[error("plan dates starting at {0} fall outside the supported calendar")]
    DateOutOfRange(NaiveDate),
}

/// Error returned when a fallback option string is not recognized.
#[derive(Debug, Clone)]
pub struct FallbackOptionParseError {
    pub field: &'static str,
    pub value: String,
}

impl fmt::Display for FallbackOptionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}", self.field, self.value)
    }
}

impl std::error::Error for FallbackOptionParseError {}

// ---------------------------------------------------------------------------
// Request options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        })
    }
}

impl FromStr for Level {
    type Err = FallbackOptionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(FallbackOptionParseError {
                field: "level",
                value: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    Strength,
    Hypertrophy,
    FatLoss,
    Endurance,
    General,
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strength => "strength",
            Self::Hypertrophy => "hypertrophy",
            Self::FatLoss => "fat_loss",
            Self::Endurance => "endurance",
            Self::General => "general",
        })
    }
}

impl FromStr for Goal {
    type Err = FallbackOptionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strength" => Ok(Self::Strength),
            "hypertrophy" => Ok(Self::Hypertrophy),
            "fat_loss" => Ok(Self::FatLoss),
            "endurance" => Ok(Self::Endurance),
            "general" => Ok(Self::General),
            other => Err(FallbackOptionParseError {
                field: "goal",
                value: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Equipment {
    Home,
    Gym,
}

impl fmt::Display for Equipment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Home => "home",
            Self::Gym => "gym",
        })
    }
}

impl FromStr for Equipment {
    type Err = FallbackOptionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home" => Ok(Self::Home),
            "gym" => Ok(Self::Gym),
            other => Err(FallbackOptionParseError {
                field: "equipment",
                value: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackRequest {
    pub days_per_week: u32,
    pub level: Level,
    pub goal: Goal,
    pub start_date: NaiveDate,
    pub equipment: Equipment,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Day offsets from the start date for each weekly frequency. Training days
/// are spread across the week rather than packed together.
fn cadence(days_per_week: u32) -> Option<&'static [u64]> {
    Some(match days_per_week {
        1 => &[0],
        2 => &[0, 3],
        3 => &[0, 2, 4],
        4 => &[0, 1, 3, 4],
        5 => &[0, 1, 2, 4, 5],
        6 => &[0, 1, 2, 3, 4, 5],
        7 => &[0, 1, 2, 3, 4, 5, 6],
        _ => return None,
    })
}

struct Prescription {
    sets: u32,
    reps: &'static str,
    rest: &'static str,
}

fn prescription(goal: Goal) -> Prescription {
    let (sets, reps, rest) = match goal {
        Goal::Strength => (5, "5", "180s"),
        Goal::Hypertrophy => (4, "8-12", "90s"),
        Goal::FatLoss => (3, "12-15", "45s"),
        Goal::Endurance => (3, "15-20", "30s"),
        Goal::General => (3, "10-12", "60s"),
    };
    Prescription { sets, reps, rest }
}

fn exercises_per_day(level: Level, config: &PipelineConfig) -> usize {
    let n = match level {
        Level::Beginner => config.fallback.beginner_exercises,
        Level::Intermediate => config.fallback.intermediate_exercises,
        Level::Advanced => config.fallback.advanced_exercises,
    };
    n.max(1)
}

fn focus(index: usize, total: usize, locale: Locale) -> &'static str {
    #[derive(Clone, Copy)]
    enum Split {
        Full,
        Upper,
        Lower,
    }

    let split = if total <= 3 || (total % 2 == 1 && index == total - 1) {
        Split::Full
    } else if index % 2 == 0 {
        Split::Upper
    } else {
        Split::Lower
    };

    match (locale, split) {
        (Locale::Es, Split::Full) => "Cuerpo completo",
        (Locale::Es, Split::Upper) => "Tren superior",
        (Locale::Es, Split::Lower) => "Tren inferior",
        (Locale::En, Split::Full) => "Full body",
        (Locale::En, Split::Upper) => "Upper body",
        (Locale::En, Split::Lower) => "Lower body",
    }
}

fn title(request: &FallbackRequest, locale: Locale) -> String {
    match locale {
        Locale::Es => format!("Plan base de {} días por semana", request.days_per_week),
        Locale::En => format!("{}-day-per-week starter plan", request.days_per_week),
    }
}

/// Catalog items usable for the requested equipment, ordered by id.
fn exercise_pool<'a>(catalog: &'a Catalog, equipment: Equipment) -> Vec<&'a CatalogItem> {
    let mut pool = match equipment {
        Equipment::Home => catalog.with_equipment(HOME_EQUIPMENT_TAG),
        Equipment::Gym => catalog.items().iter().collect(),
    };
    pool.sort_by(|a, b| a.id.cmp(&b.id));
    pool
}

/// Build a complete training plan without calling the model.
///
/// Every exercise slot is filled from the (equipment-filtered) catalog, so
/// every exercise carries a catalog id.
pub fn build_fallback_plan(
    request: &FallbackRequest,
    catalog: &Catalog,
    config: &PipelineConfig,
) -> Result<TrainingPlan, FallbackError> {
    let offsets =
        cadence(request.days_per_week).ok_or(FallbackError::InvalidDaysPerWeek(request.days_per_week))?;
    if catalog.is_empty() {
        return Err(FallbackError::EmptyCatalog);
    }
    let pool = exercise_pool(catalog, request.equipment);
    if pool.is_empty() {
        warn!(tag = HOME_EQUIPMENT_TAG, "no catalog items match home equipment");
        return Err(FallbackError::NoEquipmentMatch {
            tag: HOME_EQUIPMENT_TAG,
        });
    }

    info!(
        days_per_week = request.days_per_week,
        level = %request.level,
        goal = %request.goal,
        equipment = %request.equipment,
        pool = pool.len(),
        "building fallback training plan"
    );

    let locale = config.locale;
    let rx = prescription(request.goal);
    let per_day = exercises_per_day(request.level, config).min(pool.len());

    let days = offsets
        .iter()
        .enumerate()
        .map(|(day_index, &offset)| {
            let Some(date) = request.start_date.checked_add_days(Days::new(offset)) else {
                return Err(FallbackError::DateOutOfRange(request.start_date));
            };
            let exercises = (0..per_day)
                .map(|slot| {
                    let item = pool[(day_index * per_day + slot) % pool.len()];
                    Exercise {
                        name: item.name.clone(),
                        exercise_id: Some(item.id.clone()),
                        sets: rx.sets,
                        reps: rx.reps.to_string(),
                        rest: Some(rx.rest.to_string()),
                        media_url: item.media.clone(),
                        ..Default::default()
                    }
                })
                .collect();
            Ok(TrainingDay {
                date: Some(date),
                day_label: locale.weekday_name(date.weekday()).to_string(),
                focus: Some(focus(day_index, offsets.len(), locale).to_string()),
                exercises,
            })
        })
        .collect::<Result<Vec<_>, FallbackError>>()?;

    Ok(TrainingPlan {
        title: Some(title(request, locale)),
        days,
    })
}

/// Hex SHA-256 of a plan's canonical JSON encoding.
pub fn plan_fingerprint<T: Serialize>(plan: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(plan)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
