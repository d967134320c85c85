//! gridcalc-core - UI-agnostic document model, recalculation + storage.

pub mod document;
pub mod error;
pub mod storage;

pub use document::{DEFAULT_COLUMNS, DEFAULT_ROWS, Document, MAX_COLUMNS, MAX_ROWS};
pub use error::{GridcalcError, Result};

pub use gridcalc_engine::engine::{CellRange, CellRef, CellValue};
