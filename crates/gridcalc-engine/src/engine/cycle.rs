//! Circular dependency detection for formula cells.
//!
//! When a formula is entered, we must verify it doesn't create a cycle
//! (e.g., A1 references B1, B1 references C1, C1 references A1).
//! This module uses depth-first search over `depends_on` edges to detect
//! such cycles before they reach recalculation.

use std::collections::HashSet;

use super::{CellRef, Grid};

/// Detect circular dependencies reachable from a cell.
/// Returns Some(cycle_path) if a cycle is found, None otherwise.
/// The path ends with the cell that closes the cycle.
///
/// The walk keeps its own stack, so long reference chains cannot exhaust the
/// thread stack.
pub fn detect_cycle(start: &CellRef, grid: &Grid) -> Option<Vec<CellRef>> {
    let mut visiting = HashSet::new();
    let mut finished = HashSet::new();
    // Each frame is a cell on the current path and the index of its next dependency.
    let mut stack: Vec<(CellRef, Vec<CellRef>, usize)> = Vec::new();

    let deps = dependencies(start, grid)?;
    visiting.insert(*start);
    stack.push((*start, deps, 0));

    while let Some((current, deps, next)) = stack.last_mut() {
        let Some(dep) = deps.get(*next).copied() else {
            let done = *current;
            stack.pop();
            visiting.remove(&done);
            finished.insert(done);
            continue;
        };
        *next += 1;

        if visiting.contains(&dep) {
            let mut path: Vec<CellRef> = stack.iter().map(|(cell_ref, _, _)| *cell_ref).collect();
            path.push(dep);
            return Some(path);
        }
        if finished.contains(&dep) {
            continue;
        }
        if let Some(dep_deps) = dependencies(&dep, grid) {
            visiting.insert(dep);
            stack.push((dep, dep_deps, 0));
        }
    }
    None
}

/// Clone so the grid entry is not held while walking.
fn dependencies(cell_ref: &CellRef, grid: &Grid) -> Option<Vec<CellRef>> {
    grid.get(cell_ref).map(|entry| entry.depends_on.clone())
}
