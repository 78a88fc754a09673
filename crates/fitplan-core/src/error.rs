//! The pipeline error taxonomy.
//!
//! Parse, shape and validation failures are expected outcomes of a model
//! call and can be retried with added prompt context. Everything else is
//! fatal to the attempt.

use crate::catalog::UnresolvedReference;
use crate::config::Locale;
use crate::extract::ParseError;
use crate::fallback::FallbackError;
use crate::ledger::{AuthorizationError, LedgerError};
use crate::plan::PlanShapeError;
use crate::validate::{ValidationFailure, compose_retry_feedback};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("plan has an unexpected shape: {0}")]
    Shape(#[from] PlanShapeError),

    #[error("plan math check failed: {0}")]
    Validation(#[from] ValidationFailure),

    #[error("{} plan entries could not be mapped to the catalog", .0.len())]
    UnresolvedCatalogReference(Vec<UnresolvedReference>),

    #[error("not authorized: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("usage ledger write failed: {0}")]
    LedgerWrite(#[from] LedgerError),

    #[error("fallback plan could not be built: {0}")]
    Fallback(#[from] FallbackError),
}

impl PipelineError {
    /// Whether another model attempt with feedback may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Parse(_) | Self::Shape(_) | Self::Validation(_)
        )
    }

    /// Instruction to append to the next generation request, if the error
    /// is retryable and there is something useful to say.
    pub fn retry_instruction(&self, locale: Locale) -> Option<String> {
        let text = match self {
            Self::Validation(failure) => compose_retry_feedback(failure, locale),
            Self::Parse(_) => match locale {
                Locale::Es => "Responde únicamente con un objeto JSON válido, sin texto \
                               adicional ni bloques de código."
                    .to_string(),
                Locale::En => "Reply with a single valid JSON object only, with no \
                               surrounding text or code fences."
                    .to_string(),
            },
            Self::Shape(err) => match locale {
                Locale::Es => format!(
                    "El JSON no tiene la estructura esperada ({err}). Devuelve un objeto \
                     con un arreglo \"days\"."
                ),
                Locale::En => format!(
                    "The JSON does not have the expected structure ({err}). Return an \
                     object with a \"days\" array."
                ),
            },
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::UnresolvedReason;
    use crate::ledger::AuthorizationError;
    use crate::validate::{ValidationDiff, ValidationLocation, ValidationReason};

    fn failure(reason: ValidationReason, meal_title: Option<&str>) -> ValidationFailure {
        ValidationFailure {
            reason,
            location: ValidationLocation {
                day_index: 0,
                date: None,
                day_label: "Lunes".into(),
                meal_index: None,
                meal_title: meal_title.map(str::to_string),
                nutrient: None,
            },
            diff: ValidationDiff {
                expected: 2000.0,
                actual: 2235.0,
                tolerance: 100.0,
                within_tolerance: false,
            },
        }
    }

    #[test]
    fn retryable_kinds() {
        assert!(PipelineError::from(ParseError::EmptyResponse { raw: String::new() }).is_retryable());
        assert!(PipelineError::from(PlanShapeError::MissingDays).is_retryable());
        assert!(
            PipelineError::from(failure(ValidationReason::DailyCaloriesMismatch, None))
                .is_retryable()
        );

        let unresolved = PipelineError::UnresolvedCatalogReference(vec![UnresolvedReference {
            day_index: 0,
            day: "Lunes".into(),
            slot: "#1".into(),
            title: "Curl".into(),
            reference: None,
            reason: UnresolvedReason::MissingReference,
        }]);
        assert!(!unresolved.is_retryable());
        assert_eq!(
            unresolved.to_string(),
            "1 plan entries could not be mapped to the catalog"
        );

        let auth = PipelineError::from(AuthorizationError::InsufficientBalance { balance: 0 });
        assert!(!auth.is_retryable());
        assert_eq!(auth.retry_instruction(Locale::Es), None);
    }

    #[test]
    fn validation_instruction_uses_feedback_composer() {
        let err = PipelineError::from(failure(ValidationReason::DailyCaloriesMismatch, None));
        assert_eq!(
            err.retry_instruction(Locale::Es).as_deref(),
            Some("DAILY_CALORIES_MISMATCH en Lunes: expected=2000, actual=2235, tolerance=±100")
        );
    }

    #[test]
    fn untargetable_split_failure_has_no_instruction() {
        let err = PipelineError::from(failure(ValidationReason::TwoMealSplitMismatch, None));
        assert!(err.is_retryable());
        assert_eq!(err.retry_instruction(Locale::En), None);
    }

    #[test]
    fn parse_instruction_is_localized() {
        let err = PipelineError::from(ParseError::NoValidJson { raw: "hola".into() });
        assert!(err.retry_instruction(Locale::Es).unwrap().starts_with("Responde"));
        assert!(err.retry_instruction(Locale::En).unwrap().starts_with("Reply"));
    }
}
