//! Pipeline configuration, threaded explicitly through every entry point.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// Language used for day labels, fallback titles and retry instructions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    #[default]
    Es,
    En,
}

impl Locale {
    /// Weekday name for a calendar day, capitalized.
    pub fn weekday_name(self, weekday: Weekday) -> &'static str {
        match self {
            Self::Es => match weekday {
                Weekday::Mon => "Lunes",
                Weekday::Tue => "Martes",
                Weekday::Wed => "Miércoles",
                Weekday::Thu => "Jueves",
                Weekday::Fri => "Viernes",
                Weekday::Sat => "Sábado",
                Weekday::Sun => "Domingo",
            },
            Self::En => match weekday {
                Weekday::Mon => "Monday",
                Weekday::Tue => "Tuesday",
                Weekday::Wed => "Wednesday",
                Weekday::Thu => "Thursday",
                Weekday::Fri => "Friday",
                Weekday::Sat => "Saturday",
                Weekday::Sun => "Sunday",
            },
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Es => "es",
            Self::En => "en",
        })
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "es" => Ok(Self::Es),
            "en" => Ok(Self::En),
            other => Err(format!("unsupported locale: {other:?}")),
        }
    }
}

/// Per-model token prices, expressed per 1000 tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub prompt_per_1k: f64,
    pub completion_per_1k: f64,
}

/// Knobs for the deterministic fallback builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub beginner_exercises: usize,
    pub intermediate_exercises: usize,
    pub advanced_exercises: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            beginner_exercises: 4,
            intermediate_exercises: 5,
            advanced_exercises: 6,
        }
    }
}

/// Tolerances, locale, pricing and fallback settings for the pipeline.
///
/// Missing fields in a config file take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub locale: Locale,
    /// Allowed relative deviation of daily calories (0.05 = ±5%).
    pub daily_kcal_tolerance_pct: f64,
    /// Allowed absolute deviation per macro, in grams.
    pub macro_tolerance_g: f64,
    /// Allowed per-meal deviation when the plan uses two meals a day.
    pub two_meal_tolerance_kcal: f64,
    pub currency: String,
    pub pricing: BTreeMap<String, ModelPricing>,
    pub fallback: FallbackConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            locale: Locale::Es,
            daily_kcal_tolerance_pct: 0.05,
            macro_tolerance_g: 5.0,
            two_meal_tolerance_kcal: 80.0,
            currency: "USD".to_string(),
            pricing: BTreeMap::new(),
            fallback: FallbackConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Builder-style helper to register pricing for one model.
    pub fn with_pricing(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.pricing.insert(model.into(), pricing);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_tolerances() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.locale, Locale::Es);
        assert_eq!(cfg.daily_kcal_tolerance_pct, 0.05);
        assert_eq!(cfg.macro_tolerance_g, 5.0);
        assert_eq!(cfg.two_meal_tolerance_kcal, 80.0);
        assert_eq!(cfg.currency, "USD");
        assert!(cfg.pricing.is_empty());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(r#"{"locale":"en","macro_tolerance_g":3}"#)
            .expect("partial config should deserialize");
        assert_eq!(cfg.locale, Locale::En);
        assert_eq!(cfg.macro_tolerance_g, 3.0);
        assert_eq!(cfg.two_meal_tolerance_kcal, 80.0);
        assert_eq!(cfg.fallback.beginner_exercises, 4);
    }

    #[test]
    fn weekday_names_are_localized() {
        assert_eq!(Locale::Es.weekday_name(Weekday::Wed), "Miércoles");
        assert_eq!(Locale::En.weekday_name(Weekday::Sun), "Sunday");
    }

    #[test]
    fn locale_parses_case_insensitively() {
        assert_eq!("ES".parse::<Locale>().unwrap(), Locale::Es);
        assert!("fr".parse::<Locale>().is_err());
    }
}
