//! Retry instructions and standing prompt guidance built from the
//! validator's tolerances.

use crate::config::{Locale, PipelineConfig};

use super::{NutritionTargets, ValidationFailure, ValidationReason};

/// Turn a validation failure into an instruction for the next attempt.
///
/// Two-meal split failures get a surgical instruction that names the one
/// meal to change. When the failure lacks a day label or meal title the
/// instruction cannot target a single meal and an empty string is returned.
pub fn compose_retry_feedback(failure: &ValidationFailure, locale: Locale) -> String {
    if failure.reason == ValidationReason::TwoMealSplitMismatch {
        return two_meal_instruction(failure, locale).unwrap_or_default();
    }

    let loc = &failure.location;
    let preposition = match locale {
        Locale::Es => "en",
        Locale::En => "in",
    };
    let mut message = format!(
        "{} {preposition} {}: expected={}, actual={}, tolerance=±{}",
        failure.reason,
        loc.day_label,
        format_number(failure.diff.expected),
        format_number(failure.diff.actual),
        format_number(failure.diff.tolerance),
    );
    if let Some(nutrient) = loc.nutrient {
        message.push_str(&format!(", nutrient={nutrient}"));
    }
    message
}

fn two_meal_instruction(failure: &ValidationFailure, locale: Locale) -> Option<String> {
    let day = failure.location.day_label.trim();
    let meal = failure.location.meal_title.as_deref()?.trim();
    if day.is_empty() || meal.is_empty() {
        return None;
    }

    let expected = format_number(failure.diff.expected);
    let actual = format_number(failure.diff.actual);
    let tolerance = format_number(failure.diff.tolerance);

    Some(match locale {
        Locale::Es => format!(
            "Ajusta SOLO la comida \"{meal}\" del {day}: debe aportar {expected} kcal \
             (±{tolerance} kcal) y ahora aporta {actual} kcal. Cambia únicamente las \
             cantidades de esa comida y recalcula sus calorías como \
             4×proteína + 4×carbohidratos + 9×grasas. No modifiques ninguna otra comida \
             ni ningún otro día."
        ),
        Locale::En => format!(
            "Adjust ONLY the meal \"{meal}\" on {day}: it must provide {expected} kcal \
             (±{tolerance} kcal) and currently provides {actual} kcal. Change only that \
             meal's quantities and recompute its calories as \
             4×protein + 4×carbs + 9×fats. Do not modify any other meal or day."
        ),
    })
}

/// Standing instruction for the initial prompt: the per-meal calorie
/// budget and the tolerances the validator will apply.
pub fn build_meal_guidance(targets: &NutritionTargets, config: &PipelineConfig) -> String {
    let kcal = format_number(f64::from(targets.target_kcal));
    let pct = format_number(config.daily_kcal_tolerance_pct * 100.0);
    let per_meal = format_number(targets.per_meal_kcal());
    let macro_tol = format_number(config.macro_tolerance_g);
    let m = &targets.macro_targets;
    let (protein, carbs, fats) = (
        format_number(m.protein_g),
        format_number(m.carbs_g),
        format_number(m.fats_g),
    );
    let meals = targets.meals_per_day;
    let split_tol = format_number(config.two_meal_tolerance_kcal);

    match config.locale {
        Locale::Es => {
            let mut text = format!(
                "Objetivo diario: {kcal} kcal (±{pct}%). Reparte {meals} comidas de \
                 ~{per_meal} kcal cada una"
            );
            if meals == 2 {
                text.push_str(&format!(" (tolerancia ±{split_tol} kcal por comida)"));
            }
            text.push_str(&format!(
                ". Macros diarios: proteína {protein} g, carbohidratos {carbs} g, \
                 grasas {fats} g (±{macro_tol} g cada uno). Calcula las calorías de cada \
                 comida como 4×proteína + 4×carbohidratos + 9×grasas."
            ));
            text
        }
        Locale::En => {
            let mut text = format!(
                "Daily target: {kcal} kcal (±{pct}%). Plan {meals} meals of \
                 ~{per_meal} kcal each"
            );
            if meals == 2 {
                text.push_str(&format!(" (tolerance ±{split_tol} kcal per meal)"));
            }
            text.push_str(&format!(
                ". Daily macros: protein {protein} g, carbs {carbs} g, fats {fats} g \
                 (±{macro_tol} g each). Compute each meal's calories as \
                 4×protein + 4×carbs + 9×fats."
            ));
            text
        }
    }
}

/// Whole numbers print without a fraction; others keep up to two decimals.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let s = format!("{value:.2}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
