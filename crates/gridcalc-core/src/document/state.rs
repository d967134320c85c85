use gridcalc_engine::engine::{Cell, CellRange, CellRef, CellValue, EvalResult, Grid, evaluate};
use std::collections::{BTreeMap, BTreeSet};

/// Columns in a default grid (`A`..`Z`).
pub const DEFAULT_COLUMNS: usize = 26;
/// Rows in a default grid.
pub const DEFAULT_ROWS: usize = 100;
/// Widest grid whose column letters stay within two characters (`ZZ`).
pub const MAX_COLUMNS: usize = 702;
/// Tallest grid a document will allocate.
pub const MAX_ROWS: usize = 1_048_576;

/// UI-agnostic document state for the grid.
pub struct Document {
    /// Every in-bounds address has exactly one entry.
    pub grid: Grid,
    pub columns: usize,
    pub rows: usize,
    /// Reverse dependency map: cell -> cells whose formulas reference it
    pub dependents: BTreeMap<CellRef, BTreeSet<CellRef>>,
    /// Whether the grid changed since it was created, loaded or exported
    pub modified: bool,
}

impl Document {
    /// Create a document with the default 26 x 100 grid.
    pub fn new() -> Self {
        Self::with_dimensions(DEFAULT_COLUMNS, DEFAULT_ROWS)
    }

    /// Create a document whose grid is `columns` x `rows`, every cell empty.
    /// Each dimension is clamped to `1..=MAX_COLUMNS` and `1..=MAX_ROWS`.
    pub fn with_dimensions(columns: usize, rows: usize) -> Self {
        let columns = columns.clamp(1, MAX_COLUMNS);
        let rows = rows.clamp(1, MAX_ROWS);
        let grid = Grid::with_capacity(columns.checked_mul(rows).unwrap_or(0));
        for row in 0..rows {
            for col in 0..columns {
                grid.insert(CellRef::new(col, row), Cell::new_empty());
            }
        }

        Document {
            grid,
            columns,
            rows,
            dependents: BTreeMap::new(),
            modified: false,
        }
    }

    /// The whole grid as a range.
    pub fn bounds(&self) -> CellRange {
        CellRange::new(
            CellRef::new(0, 0),
            CellRef::new(self.columns - 1, self.rows - 1),
        )
    }

    pub fn contains(&self, cell_ref: &CellRef) -> bool {
        cell_ref.col < self.columns && cell_ref.row < self.rows
    }

    /// Intersect `range` with the grid. None if they do not overlap.
    pub fn clip(&self, range: &CellRange) -> Option<CellRange> {
        if !self.contains(&range.start) {
            return None;
        }
        let end = CellRef::new(
            range.end.col.min(self.columns - 1),
            range.end.row.min(self.rows - 1),
        );
        Some(CellRange::new(range.start, end))
    }

    pub fn get_cell(&self, cell_ref: &CellRef) -> Option<Cell> {
        self.grid.get(cell_ref).map(|cell| cell.clone())
    }

    pub fn value(&self, cell_ref: &CellRef) -> Option<CellValue> {
        self.grid.get(cell_ref).map(|cell| cell.value.clone())
    }

    /// Rendered display value; empty for addresses outside the grid.
    pub fn display(&self, cell_ref: &CellRef) -> String {
        self.value(cell_ref)
            .map(|value| value.as_text())
            .unwrap_or_default()
    }

    /// What a formula bar shows: formula source, or the literal.
    pub fn input_string(&self, cell_ref: &CellRef) -> String {
        self.grid
            .get(cell_ref)
            .map(|cell| cell.to_input_string())
            .unwrap_or_default()
    }

    /// Evaluate an ad-hoc formula body against the current grid.
    pub fn evaluate(&self, body: &str) -> EvalResult<CellValue> {
        evaluate(body, &self.grid)
    }

    /// Bounding box of all non-empty cells.
    pub fn used_range(&self) -> Option<CellRange> {
        let mut bounds: Option<(CellRef, CellRef)> = None;
        for entry in self.grid.iter() {
            let cell = entry.value();
            if cell.value.is_empty() && cell.formula.is_none() {
                continue;
            }
            let cell_ref = *entry.key();
            bounds = Some(match bounds {
                None => (cell_ref, cell_ref),
                Some((min, max)) => (
                    CellRef::new(min.col.min(cell_ref.col), min.row.min(cell_ref.row)),
                    CellRef::new(max.col.max(cell_ref.col), max.row.max(cell_ref.row)),
                ),
            });
        }
        bounds.map(|(min, max)| CellRange::new(min, max))
    }

    /// Rebuild the reverse dependency map from the grid.
    /// Call this after cells are moved in bulk.
    pub(crate) fn rebuild_dependents(&mut self) {
        self.dependents.clear();
        for entry in self.grid.iter() {
            let cell_ref = entry.key();
            for dep in &entry.value().depends_on {
                self.dependents.entry(*dep).or_default().insert(*cell_ref);
            }
        }
    }

    pub(crate) fn link_dependencies(&mut self, cell_ref: &CellRef, deps: &[CellRef]) {
        for dep in deps {
            self.dependents.entry(*dep).or_default().insert(*cell_ref);
        }
    }

    pub(crate) fn unlink_dependencies(&mut self, cell_ref: &CellRef, deps: &[CellRef]) {
        for dep in deps {
            if let Some(set) = self.dependents.get_mut(dep) {
                set.remove(cell_ref);
                if set.is_empty() {
                    self.dependents.remove(dep);
                }
            }
        }
    }

    /// Store `cell` at `cell_ref`, keeping the dependency index in sync.
    pub(crate) fn replace_cell(&mut self, cell_ref: CellRef, cell: Cell) {
        let new_deps = cell.depends_on.clone();
        let old = self.grid.insert(cell_ref, cell);
        if let Some(old) = old {
            self.unlink_dependencies(&cell_ref, &old.depends_on);
        }
        self.link_dependencies(&cell_ref, &new_deps);
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
