//! Import/export of grid contents.

pub mod csv;

pub use csv::{export_csv, import_csv, import_csv_str, write_csv};
