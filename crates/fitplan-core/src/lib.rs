//! Validation pipeline for LLM-generated fitness and nutrition plans.
//!
//! Every stage except the usage ledger is a pure function over in-memory
//! values. The orchestrating caller owns the model call and any retry loop;
//! this crate only exposes the transitions between states.

pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod ledger;
pub mod pipeline;
pub mod plan;
pub mod validate;

pub use config::{Locale, PipelineConfig};
pub use error::PipelineError;
