//! Document state and logic (UI-agnostic).

mod ops;
mod recalc;
mod state;

pub use state::{DEFAULT_COLUMNS, DEFAULT_ROWS, Document, MAX_COLUMNS, MAX_ROWS};
