//! Lenient conversion from the untyped JSON tree to typed plans.
//!
//! Model output is loosely shaped: days may be a bare array or nested under
//! `days`/`plan.days`, numbers may be strings with unit suffixes, and keys
//! come in snake_case or camelCase. Nothing here checks plan math; that is
//! the normalizer's and validator's job.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use thiserror::Error;

use super::model::{
    Exercise, Ingredient, Macros, Meal, NutritionDay, NutritionPlan, TrainingDay, TrainingPlan,
};

/// Errors from interpreting a JSON value as a plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanShapeError {
    #[error("plan has no `days` array")]
    MissingDays,

    #[error("day {index} is not a JSON object")]
    InvalidDay { index: usize },

    #[error("entry {index} of day {day} is not a JSON object")]
    InvalidEntry { day: usize, index: usize },

    #[error("plan contains no days to normalize")]
    NoDays,

    #[error("requested day count must be between 1 and {max}, got {count}", max = super::normalize::MAX_DAY_COUNT)]
    InvalidDayCount { count: usize },

    #[error("{count} days from {start} fall outside the supported calendar")]
    DateOutOfRange { start: NaiveDate, count: usize },
}

/// Interpret a parsed model response as a nutrition plan.
pub fn parse_nutrition_plan(value: &Value) -> Result<NutritionPlan, PlanShapeError> {
    let days = days_array(value)?
        .iter()
        .enumerate()
        .map(|(index, day)| {
            let obj = day.as_object().ok_or(PlanShapeError::InvalidDay { index })?;
            let meals = array_field(obj, &["meals", "comidas"])
                .iter()
                .enumerate()
                .map(|(m, meal)| {
                    meal.as_object()
                        .map(parse_meal)
                        .ok_or(PlanShapeError::InvalidEntry { day: index, index: m })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(NutritionDay {
                date: date_field(obj),
                day_label: day_label(obj),
                meals,
                totals: Macros::default(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NutritionPlan {
        title: plan_title(value),
        days,
    })
}

/// Interpret a parsed model response as a training plan.
pub fn parse_training_plan(value: &Value) -> Result<TrainingPlan, PlanShapeError> {
    let days = days_array(value)?
        .iter()
        .enumerate()
        .map(|(index, day)| {
            let obj = day.as_object().ok_or(PlanShapeError::InvalidDay { index })?;
            let exercises = array_field(obj, &["exercises", "ejercicios"])
                .iter()
                .enumerate()
                .map(|(e, exercise)| {
                    exercise
                        .as_object()
                        .map(parse_exercise)
                        .ok_or(PlanShapeError::InvalidEntry { day: index, index: e })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(TrainingDay {
                date: date_field(obj),
                day_label: day_label(obj),
                focus: str_field(obj, &["focus", "enfoque"]),
                exercises,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TrainingPlan {
        title: plan_title(value),
        days,
    })
}

fn parse_meal(obj: &Map<String, Value>) -> Meal {
    let meal_type = str_field(obj, &["mealType", "meal_type", "type"]);
    let title = str_field(obj, &["title", "name", "mealName", "meal_name"])
        .or_else(|| meal_type.clone())
        .unwrap_or_default();

    // Macros may be flat on the meal or nested under `macros`.
    let macro_src = obj
        .get("macros")
        .and_then(Value::as_object)
        .unwrap_or(obj);
    let macros = Macros {
        calories: num_field(macro_src, &["calories", "kcal", "calorias"])
            .or_else(|| num_field(obj, &["calories", "kcal"]))
            .unwrap_or(0.0),
        protein: num_field(macro_src, &["protein", "protein_g", "proteinG", "proteina"])
            .unwrap_or(0.0),
        carbs: num_field(macro_src, &["carbs", "carbs_g", "carbsG", "carbohydrates"])
            .unwrap_or(0.0),
        fats: num_field(macro_src, &["fats", "fat", "fats_g", "fatsG", "fat_g", "grasas"])
            .unwrap_or(0.0),
    };

    let ingredients = array_field(obj, &["ingredients", "ingredientes"])
        .iter()
        .filter_map(parse_ingredient)
        .collect();

    Meal {
        meal_type,
        title,
        recipe_id: str_field(obj, &["recipeId", "recipe_id"]),
        recipe_name: str_field(obj, &["recipeName", "recipe_name"]),
        media_url: str_field(obj, &["mediaUrl", "media_url", "media"]),
        macros,
        ingredients,
    }
}

fn parse_ingredient(value: &Value) -> Option<Ingredient> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(Ingredient {
            name: s.trim().to_string(),
            quantity: None,
        }),
        Value::Object(obj) => {
            let name = str_field(obj, &["name", "item", "ingredient"])?;
            Some(Ingredient {
                name,
                quantity: str_field(obj, &["quantity", "amount", "qty"]),
            })
        }
        _ => None,
    }
}

fn parse_exercise(obj: &Map<String, Value>) -> Exercise {
    Exercise {
        name: str_field(obj, &["name", "exercise", "title"]).unwrap_or_default(),
        exercise_id: str_field(obj, &["exerciseId", "exercise_id", "id"]),
        sets: num_field(obj, &["sets", "series"])
            .map(|n| n.max(0.0).round() as u32)
            .unwrap_or(0),
        reps: str_field(obj, &["reps", "repetitions", "repeticiones"]).unwrap_or_default(),
        tempo: str_field(obj, &["tempo"]),
        rest: str_field(obj, &["rest", "descanso"]),
        notes: str_field(obj, &["notes", "notas"]),
        media_url: str_field(obj, &["mediaUrl", "media_url", "media"]),
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn days_array(value: &Value) -> Result<&Vec<Value>, PlanShapeError> {
    match value {
        Value::Array(days) => Ok(days),
        Value::Object(obj) => {
            if let Some(Value::Array(days)) = obj.get("days").or_else(|| obj.get("dias")) {
                return Ok(days);
            }
            match obj.get("plan") {
                Some(inner @ (Value::Object(_) | Value::Array(_))) => days_array(inner),
                _ => Err(PlanShapeError::MissingDays),
            }
        }
        _ => Err(PlanShapeError::MissingDays),
    }
}

fn plan_title(value: &Value) -> Option<String> {
    let obj = value.as_object()?;
    str_field(obj, &["title", "name"]).or_else(|| {
        obj.get("plan")
            .and_then(Value::as_object)
            .and_then(|inner| str_field(inner, &["title", "name"]))
    })
}

fn day_label(obj: &Map<String, Value>) -> String {
    str_field(obj, &["dayLabel", "day_label", "label", "day"]).unwrap_or_default()
}

/// Accepts `YYYY-MM-DD` and ISO-8601 datetimes (date part only).
fn date_field(obj: &Map<String, Value>) -> Option<NaiveDate> {
    let raw = str_field(obj, &["date", "fecha"])?;
    let date_part = raw.get(..10).unwrap_or(raw.as_str());
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn array_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn str_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn num_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| lenient_number(obj.get(*k)?))
}

/// Numbers, or numeric strings such as `"30"`, `"30.5 g"` or `"450kcal"`.
fn lenient_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim().trim_end_matches(|c: char| c.is_alphabetic()).trim();
            normalize_decimal(trimmed).parse::<f64>().ok()
        }
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

/// `"1,200"` is a thousands separator; `"55,5"` is a decimal comma.
fn normalize_decimal(s: &str) -> String {
    match s.rsplit_once(',') {
        Some((_, tail)) if tail.len() == 3 && tail.chars().all(|c| c.is_ascii_digit()) => {
            s.replace(',', "")
        }
        Some(_) => s.replace(',', "."),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_object_with_days() {
        let value = json!({
            "title": "Semana 1",
            "days": [{
                "date": "2026-10-19",
                "dayLabel": "Lunes",
                "meals": [{
                    "mealType": "lunch",
                    "title": "Pollo con arroz",
                    "recipeId": "r-1",
                    "macros": {"calories": 600, "protein": 45, "carbs": 70, "fats": 12},
                    "ingredients": ["pollo", {"name": "arroz", "quantity": "100 g"}]
                }]
            }]
        });
        let plan = parse_nutrition_plan(&value).unwrap();
        assert_eq!(plan.title.as_deref(), Some("Semana 1"));
        let day = &plan.days[0];
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2026, 10, 19));
        let meal = &day.meals[0];
        assert_eq!(meal.recipe_id.as_deref(), Some("r-1"));
        assert_eq!(meal.macros.protein, 45.0);
        assert_eq!(meal.ingredients.len(), 2);
        assert_eq!(meal.ingredients[1].quantity.as_deref(), Some("100 g"));
    }

    #[test]
    fn accepts_bare_array_flat_macros_and_string_numbers() {
        let value = json!([{
            "meals": [{"name": "Avena", "protein_g": "20 g", "carbohydrates": "55,5", "fat": 8}]
        }]);
        let plan = parse_nutrition_plan(&value).unwrap();
        let m = &plan.days[0].meals[0].macros;
        assert_eq!(m.protein, 20.0);
        assert_eq!(m.carbs, 55.5);
        assert_eq!(m.fats, 8.0);
        assert_eq!(plan.days[0].date, None);
    }

    #[test]
    fn thousands_separator_is_not_a_decimal_comma() {
        assert_eq!(lenient_number(&json!("1,200 kcal")), Some(1200.0));
        assert_eq!(lenient_number(&json!("450kcal")), Some(450.0));
        assert_eq!(lenient_number(&json!("n/a")), None);
    }

    #[test]
    fn accepts_nested_plan_key_and_datetime() {
        let value = json!({"plan": {"days": [{"date": "2026-10-20T00:00:00Z", "exercises": []}]}});
        let plan = parse_training_plan(&value).unwrap();
        assert_eq!(plan.days[0].date, NaiveDate::from_ymd_opt(2026, 10, 20));
    }

    #[test]
    fn parses_exercises() {
        let value = json!({"days": [{"exercises": [
            {"name": "Sentadilla", "exerciseId": "ex-1", "sets": 4, "reps": 10, "rest": "90s"}
        ]}]});
        let plan = parse_training_plan(&value).unwrap();
        let ex = &plan.days[0].exercises[0];
        assert_eq!(ex.exercise_id.as_deref(), Some("ex-1"));
        assert_eq!(ex.sets, 4);
        assert_eq!(ex.reps, "10");
        assert_eq!(ex.rest.as_deref(), Some("90s"));
    }

    #[test]
    fn rejects_missing_days() {
        assert_eq!(
            parse_nutrition_plan(&json!({"meals": []})).unwrap_err(),
            PlanShapeError::MissingDays
        );
        assert_eq!(
            parse_training_plan(&json!("text")).unwrap_err(),
            PlanShapeError::MissingDays
        );
    }

    #[test]
    fn rejects_non_object_entries() {
        assert_eq!(
            parse_nutrition_plan(&json!({"days": [1]})).unwrap_err(),
            PlanShapeError::InvalidDay { index: 0 }
        );
        assert_eq!(
            parse_training_plan(&json!({"days": [{"exercises": ["squat"]}]})).unwrap_err(),
            PlanShapeError::InvalidEntry { day: 0, index: 0 }
        );
    }
}
