//! Plan data model, lenient shape parsing, and normalization.

pub mod model;
pub mod normalize;
pub mod shape;

pub use model::{
    Exercise, Ingredient, Macros, Meal, NutritionDay, NutritionPlan, PlanDay, TrainingDay,
    TrainingPlan,
};
pub use normalize::{
    AlignmentIssue, MAX_DAY_COUNT, NormalizeOptions, Normalized, normalize_nutrition_plan,
    normalize_training_plan,
};
pub use shape::{PlanShapeError, parse_nutrition_plan, parse_training_plan};
