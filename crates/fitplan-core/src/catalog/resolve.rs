//! Map plan entries to catalog identifiers.
//!
//! Per entry: keep a supplied id that exists in the catalog (backfilling the
//! canonical name and media), else match the normalized free-text name,
//! else report the entry. Exercises stay unresolved so the caller can reject
//! the plan; recipes fall back to the first catalog item. An empty catalog
//! skips resolution and is reported as unavailable.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Catalog, CatalogItem};
use crate::plan::{NutritionPlan, TrainingPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnresolvedReason {
    /// No id was supplied and the name matched nothing.
    MissingReference,
    /// An id was supplied but the catalog does not contain it, and the name
    /// matched nothing either.
    UnknownReferenceId,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingReference => "MISSING_REFERENCE",
            Self::UnknownReferenceId => "UNKNOWN_REFERENCE_ID",
        })
    }
}

/// A plan entry that could not be mapped to a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedReference {
    pub day_index: usize,
    /// Day label of the entry.
    pub day: String,
    /// Meal type for meals, or the 1-based position for exercises.
    pub slot: String,
    /// The entry's free-text name.
    pub title: String,
    /// The id the entry carried, if any.
    pub reference: Option<String>,
    pub reason: UnresolvedReason,
}

impl fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {:?}: {}", self.day, self.slot, self.title, self.reason)?;
        if let Some(reference) = &self.reference {
            write!(f, " ({reference})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseResolution {
    pub plan: TrainingPlan,
    pub unresolved: Vec<UnresolvedReference>,
    pub catalog_available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeResolution {
    pub plan: NutritionPlan,
    /// Meals whose reference had to be replaced by the fallback recipe.
    pub invalid_references: Vec<UnresolvedReference>,
    pub has_catalog: bool,
}

enum Lookup<'a> {
    /// The supplied id exists.
    ById(&'a CatalogItem),
    /// Matched through the normalized name.
    ByName(&'a CatalogItem),
    Missing(UnresolvedReason),
}

fn lookup<'a>(catalog: &'a Catalog, id: Option<&str>, name: &str) -> Lookup<'a> {
    let id = id.map(str::trim).filter(|s| !s.is_empty());
    if let Some(item) = id.and_then(|id| catalog.get(id)) {
        return Lookup::ById(item);
    }
    if let Some(item) = catalog.find_by_name(name) {
        return Lookup::ByName(item);
    }
    Lookup::Missing(if id.is_some() {
        UnresolvedReason::UnknownReferenceId
    } else {
        UnresolvedReason::MissingReference
    })
}

/// Resolve every exercise in a training plan against the exercise catalog.
///
/// Unresolved exercises lose any invalid id and are reported; the caller is
/// expected to reject the whole plan when the report is non-empty.
pub fn resolve_exercise_references(plan: &TrainingPlan, catalog: &Catalog) -> ExerciseResolution {
    if catalog.is_empty() {
        debug!("exercise catalog empty; skipping resolution");
        return ExerciseResolution {
            plan: plan.clone(),
            unresolved: Vec::new(),
            catalog_available: false,
        };
    }

    let mut plan = plan.clone();
    let mut unresolved = Vec::new();

    for (day_index, day) in plan.days.iter_mut().enumerate() {
        for (position, exercise) in day.exercises.iter_mut().enumerate() {
            match lookup(catalog, exercise.exercise_id.as_deref(), &exercise.name) {
                Lookup::ById(item) | Lookup::ByName(item) => {
                    exercise.exercise_id = Some(item.id.clone());
                    exercise.name = item.name.clone();
                    if exercise.media_url.is_none() {
                        exercise.media_url = item.media.clone();
                    }
                }
                Lookup::Missing(reason) => {
                    warn!(
                        day = day_index,
                        exercise = %exercise.name,
                        %reason,
                        "exercise not found in catalog"
                    );
                    unresolved.push(UnresolvedReference {
                        day_index,
                        day: day.day_label.clone(),
                        slot: format!("#{}", position + 1),
                        title: exercise.name.clone(),
                        reference: exercise.exercise_id.take(),
                        reason,
                    });
                }
            }
        }
    }

    ExerciseResolution {
        plan,
        unresolved,
        catalog_available: true,
    }
}

/// Resolve every meal's recipe reference against the recipe catalog.
///
/// Meals that match nothing are pointed at the first catalog item so the
/// output is always fully referenced; the replaced entries are reported.
pub fn resolve_recipe_references(plan: &NutritionPlan, catalog: &Catalog) -> RecipeResolution {
    let Some(fallback) = catalog.first() else {
        debug!("recipe catalog empty; skipping resolution");
        return RecipeResolution {
            plan: plan.clone(),
            invalid_references: Vec::new(),
            has_catalog: false,
        };
    };

    let mut plan = plan.clone();
    let mut invalid_references = Vec::new();

    for (day_index, day) in plan.days.iter_mut().enumerate() {
        for meal in &mut day.meals {
            let name = meal.recipe_name.clone().unwrap_or_else(|| meal.title.clone());
            let item = match lookup(catalog, meal.recipe_id.as_deref(), &name) {
                Lookup::ById(item) | Lookup::ByName(item) => item,
                Lookup::Missing(reason) => {
                    warn!(
                        day = day_index,
                        meal = %meal.title,
                        %reason,
                        fallback = %fallback.id,
                        "recipe not found in catalog; using fallback recipe"
                    );
                    invalid_references.push(UnresolvedReference {
                        day_index,
                        day: day.day_label.clone(),
                        slot: meal.meal_type.clone().unwrap_or_default(),
                        title: meal.title.clone(),
                        reference: meal.recipe_id.clone(),
                        reason,
                    });
                    // The fallback recipe's media replaces whatever the meal carried.
                    meal.media_url = None;
                    fallback
                }
            };
            meal.recipe_id = Some(item.id.clone());
            meal.recipe_name = Some(item.name.clone());
            if meal.media_url.is_none() {
                meal.media_url = item.media.clone();
            }
        }
    }

    RecipeResolution {
        plan,
        invalid_references,
        has_catalog: true,
    }
}
