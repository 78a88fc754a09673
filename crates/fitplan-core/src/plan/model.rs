//! Typed plan values. Both variants are transient, single-owner values
//! built per request and discarded once persisted.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Access to the calendar fields shared by every day type.
pub trait PlanDay: Clone {
    fn date(&self) -> Option<NaiveDate>;
    fn set_date(&mut self, date: NaiveDate);
    fn set_day_label(&mut self, label: String);
}

// ---------------------------------------------------------------------------
// Nutrition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub days: Vec<NutritionDay>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionDay {
    pub date: Option<NaiveDate>,
    pub day_label: String,
    pub meals: Vec<Meal>,
    /// Sum of the day's meals, recomputed by the normalizer.
    pub totals: Macros,
}

impl PlanDay for NutritionDay {
    fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    fn set_date(&mut self, date: NaiveDate) {
        self.date = Some(date);
    }

    fn set_day_label(&mut self, label: String) {
        self.day_label = label;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_type: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub macros: Macros,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingredients: Vec<Ingredient>,
}

/// Energy and macronutrients. Grams for macros, kcal for calories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fats: f64,
}

impl Macros {
    /// Atwater derivation: 4 kcal/g protein and carbs, 9 kcal/g fat.
    pub fn derived_calories(&self) -> f64 {
        (4.0 * self.protein + 4.0 * self.carbs + 9.0 * self.fats).round()
    }

    /// Round grams to whole numbers and derive calories from them.
    pub fn rounded(&self) -> Self {
        let mut out = Self {
            calories: 0.0,
            protein: self.protein.max(0.0).round(),
            carbs: self.carbs.max(0.0).round(),
            fats: self.fats.max(0.0).round(),
        };
        out.calories = out.derived_calories();
        out
    }
}

impl std::ops::Add for Macros {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            calories: self.calories + rhs.calories,
            protein: self.protein + rhs.protein,
            carbs: self.carbs + rhs.carbs,
            fats: self.fats + rhs.fats,
        }
    }
}

impl std::iter::Sum for Macros {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, m| acc + m)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,
}

// ---------------------------------------------------------------------------
// Training
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub days: Vec<TrainingDay>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingDay {
    pub date: Option<NaiveDate>,
    pub day_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    pub exercises: Vec<Exercise>,
}

impl PlanDay for TrainingDay {
    fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    fn set_date(&mut self, date: NaiveDate) {
        self.date = Some(date);
    }

    fn set_day_label(&mut self, label: String) {
        self.day_label = label;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub name: String,
    /// Catalog identifier. `None` until resolved.
    pub exercise_id: Option<String>,
    pub sets: u32,
    pub reps: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}
