//! Cell data structures for the spreadsheet grid.
//!
//! This module provides the core data types for representing cells:
//! - [`CellValue`] - The display value of a cell (empty, number, text or the error sentinel)
//! - [`Cell`] - A display value plus the optional formula source that produced it
//! - [`Grid`] - Sparse storage for cells (backed by `DashMap`)

use dashmap::DashMap;

use super::cell_ref::CellRef;
use super::deps::extract_dependencies;
use super::format::format_value;

/// Leading character that marks user input as a formula.
pub const FORMULA_MARKER: char = '=';

/// Rendered form of [`CellValue::Error`].
pub const ERROR_MARKER: &str = "#ERROR";

/// The display value of a cell.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    /// Evaluation failed. Never produced by a literal edit.
    Error,
}

impl CellValue {
    /// Numeric coercion: numbers as-is, empty and blank text as `0`, other
    /// text only if it parses fully as a finite number. Errors never coerce.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Empty => Some(0.0),
            CellValue::Text(s) if s.trim().is_empty() => Some(0.0),
            CellValue::Text(s) => parse_number(s),
            CellValue::Error => None,
        }
    }

    /// Textual coercion used by text functions and concatenation.
    pub fn as_text(&self) -> String {
        format_value(self)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CellValue::Error)
    }
}

/// Parse text that is entirely a number (surrounding whitespace allowed).
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// A cell in the spreadsheet grid.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    /// Formula source as typed, including the leading `=`.
    pub formula: Option<String>,
    pub depends_on: Vec<CellRef>,
}

impl Cell {
    pub fn new_empty() -> Cell {
        Cell::default()
    }

    /// A literal cell: the display value is the input, untouched.
    pub fn new_literal(input: &str) -> Cell {
        let value = if input.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(input.to_string())
        };
        Cell {
            value,
            formula: None,
            depends_on: vec![],
        }
    }

    /// Create a new cell containing a formula (source includes the leading `=`).
    /// Dependencies are automatically extracted from the formula body.
    /// The value stays empty until the formula is evaluated.
    pub fn new_formula(source: &str) -> Cell {
        let body = source.strip_prefix(FORMULA_MARKER).unwrap_or(source);
        Cell {
            value: CellValue::Empty,
            formula: Some(source.to_string()),
            depends_on: extract_dependencies(body),
        }
    }

    /// Classify raw user input:
    /// - Starts with '=' -> formula
    /// - Otherwise -> literal, stored exactly as typed
    pub fn from_input(input: &str) -> Cell {
        if input.starts_with(FORMULA_MARKER) {
            Cell::new_formula(input)
        } else {
            Cell::new_literal(input)
        }
    }

    /// Formula body with the marker stripped, if this is a formula cell.
    pub fn formula_body(&self) -> Option<&str> {
        self.formula
            .as_deref()
            .map(|f| f.strip_prefix(FORMULA_MARKER).unwrap_or(f))
    }

    pub fn is_formula(&self) -> bool {
        self.formula.is_some()
    }

    /// Get the string a user would edit: the formula source, or the literal.
    pub fn to_input_string(&self) -> String {
        match &self.formula {
            Some(f) => f.clone(),
            None => self.value.as_text(),
        }
    }
}

/// Sparse grid storage. Every in-bounds address has an entry once a document
/// is initialized; a missing key means the address is outside the grid.
pub type Grid = DashMap<CellRef, Cell>;
