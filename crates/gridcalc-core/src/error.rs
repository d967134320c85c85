//! Error types for Gridcalc core.

use gridcalc_engine::engine::CellRef;
use thiserror::Error;

/// Errors that can occur while editing or loading a document.
#[derive(Error, Debug)]
pub enum GridcalcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Cell {0} is outside the grid")]
    OutOfBounds(CellRef),

    #[error("Circular dependency detected: {}", format_path(.0))]
    CycleDetected(Vec<CellRef>),

    #[error("Invalid range: {0}")]
    InvalidRange(String),
}

fn format_path(path: &[CellRef]) -> String {
    path.iter()
        .map(|cell_ref| cell_ref.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, GridcalcError>;
