use super::Document;
use crate::error::{GridcalcError, Result};
use gridcalc_engine::engine::{Cell, CellRange, CellRef, CellValue};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Dimension for row/column operations
#[derive(Copy, Clone, Debug)]
enum Dimension {
    Row,
    Column,
}

impl Dimension {
    /// Build a CellRef from a coordinate along this dimension and one across it.
    fn cell_ref(&self, along: usize, across: usize) -> CellRef {
        match self {
            Dimension::Row => CellRef::new(across, along),
            Dimension::Column => CellRef::new(along, across),
        }
    }
}

impl Document {
    fn extent(&self, dim: Dimension) -> usize {
        match dim {
            Dimension::Row => self.rows,
            Dimension::Column => self.columns,
        }
    }

    fn across(&self, dim: Dimension) -> usize {
        match dim {
            Dimension::Row => self.columns,
            Dimension::Column => self.rows,
        }
    }

    fn check_index(&self, dim: Dimension, at: usize) -> Result<()> {
        if at >= self.extent(dim) {
            return Err(GridcalcError::OutOfBounds(dim.cell_ref(at, 0)));
        }
        Ok(())
    }

    /// Copy the cells of line `from` onto line `to` along `dim`.
    fn copy_line(&self, dim: Dimension, from: usize, to: usize) {
        for across in 0..self.across(dim) {
            let cell = self
                .grid
                .get(&dim.cell_ref(from, across))
                .map(|cell| cell.clone())
                .unwrap_or_default();
            self.grid.insert(dim.cell_ref(to, across), cell);
        }
    }

    fn clear_line(&self, dim: Dimension, at: usize) {
        for across in 0..self.across(dim) {
            self.grid.insert(dim.cell_ref(at, across), Cell::new_empty());
        }
    }

    /// Shift lines `at..` one step forward, dropping the last line, and
    /// clear line `at`. The dependency index must be rebuilt afterwards.
    fn shift_in(&self, dim: Dimension, at: usize) {
        for coord in (at + 1..self.extent(dim)).rev() {
            self.copy_line(dim, coord - 1, coord);
        }
        self.clear_line(dim, at);
    }

    /// Shift lines after `at` one step back over it and clear the last line.
    /// The dependency index must be rebuilt afterwards.
    fn shift_out(&self, dim: Dimension, at: usize) {
        let last = self.extent(dim) - 1;
        for coord in at..last {
            self.copy_line(dim, coord + 1, coord);
        }
        self.clear_line(dim, last);
    }

    /// Reindex and recalculate after cells moved in bulk.
    ///
    /// Formula text moves unchanged, so a move can close a cycle. Those cells
    /// show the error sentinel and the cycle is logged.
    fn finish_move(&mut self, what: &str) {
        self.rebuild_dependents();
        self.modified = true;
        if let Err(e) = self.recalculate_all() {
            warn!(error = %e, operation = what, "recalculation after moving cells");
        }
    }

    fn insert_dimension(&mut self, dim: Dimension, at: usize) -> Result<()> {
        self.check_index(dim, at)?;
        self.shift_in(dim, at);
        self.finish_move("insert");
        debug!(?dim, at, "inserted line");
        Ok(())
    }

    fn delete_dimension(&mut self, dim: Dimension, at: usize) -> Result<()> {
        self.check_index(dim, at)?;
        self.shift_out(dim, at);
        self.finish_move("delete");
        debug!(?dim, at, "deleted line");
        Ok(())
    }

    /// Insert an empty row above `at`. The grid keeps its size, so the last
    /// row falls off the bottom.
    pub fn insert_row(&mut self, at: usize) -> Result<()> {
        self.insert_dimension(Dimension::Row, at)
    }

    /// Delete row `at`, shifting the rows below it up.
    pub fn delete_row(&mut self, at: usize) -> Result<()> {
        self.delete_dimension(Dimension::Row, at)
    }

    /// Insert an empty column left of `at`. The last column falls off the end.
    pub fn insert_column(&mut self, at: usize) -> Result<()> {
        self.insert_dimension(Dimension::Column, at)
    }

    /// Delete column `at`, shifting the columns right of it left.
    pub fn delete_column(&mut self, at: usize) -> Result<()> {
        self.delete_dimension(Dimension::Column, at)
    }

    /// Replace every occurrence of `find` in literal text cells.
    ///
    /// Formula cells are left alone. Limited to `range` when given, otherwise
    /// the whole grid. Returns how many cells changed.
    pub fn find_replace(
        &mut self,
        find: &str,
        replace: &str,
        range: Option<CellRange>,
    ) -> Result<usize> {
        if find.is_empty() {
            return Ok(0);
        }
        let Some(range) = self.clip(&range.unwrap_or_else(|| self.bounds())) else {
            return Ok(0);
        };

        let matches: Vec<(CellRef, String)> = range
            .cells()
            .filter_map(|cell_ref| {
                let cell = self.grid.get(&cell_ref)?;
                match (&cell.formula, &cell.value) {
                    (None, CellValue::Text(text)) if text.contains(find) => {
                        Some((cell_ref, text.replace(find, replace)))
                    }
                    _ => None,
                }
            })
            .collect();

        for (cell_ref, text) in &matches {
            // The replacement stays a literal even if it now starts with `=`.
            self.replace_cell(*cell_ref, Cell::new_literal(text));
            self.propagate(cell_ref)?;
        }
        if !matches.is_empty() {
            self.modified = true;
        }
        debug!(find, replace, changed = matches.len(), "find and replace");
        Ok(matches.len())
    }

    /// Remove rows in `range` whose values across the range's columns repeat
    /// an earlier row. Rows below each removed row shift up across the whole
    /// grid and the last row is cleared. Formula text moves unchanged and the
    /// grid is recalculated afterwards. Returns how many rows were removed.
    pub fn remove_duplicate_rows(&mut self, range: CellRange) -> Result<usize> {
        let Some(range) = self.clip(&range) else {
            return Ok(0);
        };

        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for row in range.start.row..=range.end.row {
            let key: Vec<String> = (range.start.col..=range.end.col)
                .map(|col| self.display(&CellRef::new(col, row)))
                .collect();
            if !seen.insert(key) {
                duplicates.push(row);
            }
        }
        if duplicates.is_empty() {
            return Ok(0);
        }

        // Bottom-up so earlier row numbers stay valid.
        for row in duplicates.iter().rev() {
            self.shift_out(Dimension::Row, *row);
        }
        self.finish_move("remove duplicates");
        debug!(removed = duplicates.len(), "removed duplicate rows");
        Ok(duplicates.len())
    }
}
