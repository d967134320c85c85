//! Built-in spreadsheet functions and their metadata.
//!
//! Conventions:
//! - Function names are matched case-insensitively (`sum` == `SUM`).
//! - Aggregates take exactly one `<cell>:<cell>` range. Empty cells count as
//!   `0`; text that is not a number and error cells are skipped.
//! - Text functions take one argument and never fail on the cell's content.
//! - If you add a new built-in, add it to `BUILTINS` and handle it in
//!   [`aggregate`] or [`apply_text`].

use crate::engine::{CellRange, EvalError, EvalResult, Grid};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Builtin {
    Sum,
    Average,
    Max,
    Min,
    Count,
    Trim,
    Upper,
    Lower,
}

pub struct BuiltinInfo {
    pub builtin: Builtin,
    pub name: &'static str,
    pub description: &'static str,
}

pub const BUILTINS: &[BuiltinInfo] = &[
    BuiltinInfo {
        builtin: Builtin::Sum,
        name: "SUM",
        description: "Sum of numeric values in a cell range",
    },
    BuiltinInfo {
        builtin: Builtin::Average,
        name: "AVERAGE",
        description: "Mean of numeric values in a cell range",
    },
    BuiltinInfo {
        builtin: Builtin::Max,
        name: "MAX",
        description: "Maximum numeric value in a cell range",
    },
    BuiltinInfo {
        builtin: Builtin::Min,
        name: "MIN",
        description: "Minimum numeric value in a cell range",
    },
    BuiltinInfo {
        builtin: Builtin::Count,
        name: "COUNT",
        description: "Count of numeric cells in a cell range",
    },
    BuiltinInfo {
        builtin: Builtin::Trim,
        name: "TRIM",
        description: "Text with leading and trailing whitespace removed",
    },
    BuiltinInfo {
        builtin: Builtin::Upper,
        name: "UPPER",
        description: "Text converted to uppercase",
    },
    BuiltinInfo {
        builtin: Builtin::Lower,
        name: "LOWER",
        description: "Text converted to lowercase",
    },
];

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        BUILTINS
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name))
            .map(|b| b.builtin)
    }

    pub fn name(self) -> &'static str {
        BUILTINS
            .iter()
            .find(|b| b.builtin == self)
            .map(|b| b.name)
            .unwrap_or("?")
    }

    pub fn takes_range(self) -> bool {
        matches!(
            self,
            Builtin::Sum | Builtin::Average | Builtin::Max | Builtin::Min | Builtin::Count
        )
    }
}

/// Name and description of every built-in, in table order.
pub fn builtin_descriptions() -> impl Iterator<Item = (&'static str, &'static str)> {
    BUILTINS.iter().map(|b| (b.name, b.description))
}

/// Collect the numeric members of a range, row-major. Empty cells are `0`;
/// missing, non-numeric and error cells are skipped.
fn numeric_values(range: &CellRange, grid: &Grid) -> Vec<f64> {
    range
        .cells()
        .filter_map(|cell_ref| grid.get(&cell_ref).and_then(|cell| cell.value.as_number()))
        .collect()
}

/// Evaluate a range aggregate.
pub fn aggregate(func: Builtin, range: &CellRange, grid: &Grid) -> EvalResult<f64> {
    let values = numeric_values(range, grid);

    match func {
        Builtin::Sum => Ok(values.iter().sum()),
        Builtin::Count => Ok(values.len() as f64),
        Builtin::Average => {
            if values.is_empty() {
                return Err(EvalError::EmptyRange);
            }
            Ok(values.iter().sum::<f64>() / values.len() as f64)
        }
        Builtin::Max => values
            .iter()
            .copied()
            .reduce(f64::max)
            .ok_or(EvalError::EmptyRange),
        Builtin::Min => values
            .iter()
            .copied()
            .reduce(f64::min)
            .ok_or(EvalError::EmptyRange),
        Builtin::Trim | Builtin::Upper | Builtin::Lower => Err(EvalError::expression(format!(
            "{} does not take a range",
            func.name()
        ))),
    }
}

/// Apply a text function. Aggregates pass the text through unchanged.
pub fn apply_text(func: Builtin, text: &str) -> String {
    match func {
        Builtin::Trim => text.trim().to_string(),
        Builtin::Upper => text.to_uppercase(),
        Builtin::Lower => text.to_lowercase(),
        _ => text.to_string(),
    }
}
