//! Spreadsheet engine API.
//!
//! This module provides the formula evaluation engine for the grid:
//!
//! - [`Cell`], [`CellValue`], [`Grid`] - Data structures for cell storage
//! - [`CellRef`], [`CellRange`] - Cell identifier and range parsing
//! - [`evaluate`] - Evaluate a formula body against a grid snapshot
//! - [`extract_dependencies`] - Parse formula dependencies
//! - [`detect_cycle`] - Circular dependency detection
//! - [`format_value`] - Format values for display

mod cell;
mod cell_ref;
mod cycle;
mod deps;
mod error;
mod eval;
mod format;
pub(crate) mod parser;

pub use crate::builtins::builtin_descriptions;
pub use cell::{Cell, CellValue, ERROR_MARKER, FORMULA_MARKER, Grid, parse_number};
pub use cell_ref::{CellRange, CellRef, MAX_RANGE_CELLS};
pub use cycle::detect_cycle;
pub use deps::extract_dependencies;
pub use error::{EvalError, EvalResult};
pub use eval::{evaluate, evaluate_formula};
pub use format::{format_number, format_value};
