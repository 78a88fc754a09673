//! Plan normalization: fixed day count, contiguous dates, weekday labels,
//! and recomputed macros.
//!
//! Normalization never trusts the source math and never mutates its input.
//! Applying it to an already-normalized plan returns an equal plan.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::{Macros, NutritionPlan, PlanDay, TrainingPlan};
use super::shape::PlanShapeError;
use crate::config::Locale;

/// Longest plan the normalizer will build, one leap year of days.
pub const MAX_DAY_COUNT: usize = 366;

/// Caller-supplied calendar frame for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub start_date: NaiveDate,
    pub day_count: usize,
    pub locale: Locale,
}

/// A day whose source date did not match its expected position.
///
/// Diagnostic only; never blocks output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentIssue {
    pub index: usize,
    pub incoming_date: Option<NaiveDate>,
    pub expected_date: NaiveDate,
}

/// A normalized plan plus the alignment diagnostics gathered on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<P> {
    pub plan: P,
    pub alignment_issues: Vec<AlignmentIssue>,
}

/// Normalize a nutrition plan: align days, round grams, derive calories,
/// and recompute every day's totals.
pub fn normalize_nutrition_plan(
    plan: &NutritionPlan,
    opts: &NormalizeOptions,
) -> Result<Normalized<NutritionPlan>, PlanShapeError> {
    let (mut days, alignment_issues) = align_days(&plan.days, opts)?;

    for day in &mut days {
        for meal in &mut day.meals {
            meal.macros = meal.macros.rounded();
        }
        day.totals = day.meals.iter().map(|m| m.macros).sum::<Macros>();
    }

    Ok(Normalized {
        plan: NutritionPlan {
            title: plan.title.clone(),
            days,
        },
        alignment_issues,
    })
}

/// Normalize a training plan's calendar frame. Exercises are untouched.
pub fn normalize_training_plan(
    plan: &TrainingPlan,
    opts: &NormalizeOptions,
) -> Result<Normalized<TrainingPlan>, PlanShapeError> {
    let (days, alignment_issues) = align_days(&plan.days, opts)?;
    Ok(Normalized {
        plan: TrainingPlan {
            title: plan.title.clone(),
            days,
        },
        alignment_issues,
    })
}

/// Build exactly `opts.day_count` days by cycling through `source`, dated
/// contiguously from `opts.start_date` and labelled with the weekday name.
fn align_days<D: PlanDay>(
    source: &[D],
    opts: &NormalizeOptions,
) -> Result<(Vec<D>, Vec<AlignmentIssue>), PlanShapeError> {
    if opts.day_count == 0 || opts.day_count > MAX_DAY_COUNT {
        return Err(PlanShapeError::InvalidDayCount {
            count: opts.day_count,
        });
    }
    if source.is_empty() {
        return Err(PlanShapeError::NoDays);
    }
    if source.len() != opts.day_count {
        debug!(
            incoming = source.len(),
            target = opts.day_count,
            "cycling plan days to match requested count"
        );
    }

    let mut days = Vec::with_capacity(opts.day_count);
    let mut issues = Vec::new();

    for index in 0..opts.day_count {
        let expected_date = opts
            .start_date
            .checked_add_days(Days::new(index as u64))
            .ok_or(PlanShapeError::DateOutOfRange {
                start: opts.start_date,
                count: opts.day_count,
            })?;
        let mut day = source[index % source.len()].clone();

        let incoming_date = day.date();
        if incoming_date != Some(expected_date) {
            issues.push(AlignmentIssue {
                index,
                incoming_date,
                expected_date,
            });
        }

        day.set_date(expected_date);
        day.set_day_label(opts.locale.weekday_name(expected_date.weekday()).to_string());
        days.push(day);
    }

    if !issues.is_empty() {
        debug!(count = issues.len(), "plan days realigned to requested dates");
    }

    Ok((days, issues))
}
