//! gridcalc_engine - Formula parsing, evaluation and dependency analysis.

pub(crate) mod builtins;
pub mod engine;
