//! Edit entry point and dependency-driven recalculation.
//!
//! Dependents are found through the explicit reverse dependency index, not by
//! searching formula text. After an edit, every transitive dependent is
//! recomputed exactly once, in topological order, with ties broken row-major.

use super::Document;
use crate::error::{GridcalcError, Result};
use gridcalc_engine::engine::{Cell, CellRef, CellValue, detect_cycle, evaluate};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

impl Document {
    /// Apply raw user input to a cell and recalculate everything that depends on it.
    ///
    /// Input starting with `=` is a formula: it is evaluated against the current
    /// grid and a failure stores the error sentinel. Anything else is stored as
    /// a literal. Returns the dependents that were recalculated, in order.
    ///
    /// A formula that would create a circular reference is rejected and the
    /// previous cell contents are kept.
    pub fn on_cell_edited(&mut self, cell_ref: CellRef, raw_input: &str) -> Result<Vec<CellRef>> {
        if !self.contains(&cell_ref) {
            return Err(GridcalcError::OutOfBounds(cell_ref));
        }

        let mut cell = Cell::from_input(raw_input);
        if cell.is_formula() {
            // Temporarily insert to check for cycles, then put the old cell back
            // so the dependency index is updated against its real contents.
            let old_cell = self.grid.insert(cell_ref, cell.clone());
            let cycle = detect_cycle(&cell_ref, &self.grid);
            match old_cell {
                Some(old) => self.grid.insert(cell_ref, old),
                None => self.grid.remove(&cell_ref).map(|(_, cell)| cell),
            };
            if let Some(path) = cycle {
                warn!(cell = %cell_ref, input = raw_input, "rejected formula with circular reference");
                return Err(GridcalcError::CycleDetected(path));
            }

            let body = cell.formula_body().unwrap_or_default().to_string();
            cell.value = self.evaluate_cell(&cell_ref, &body);
        }

        self.replace_cell(cell_ref, cell);
        self.modified = true;

        self.propagate(&cell_ref)
    }

    /// Recalculate every transitive dependent of `changed`.
    ///
    /// Cells that cannot be ordered because they sit on a cycle are set to the
    /// error sentinel and reported as `CycleDetected`; all other dependents are
    /// still updated.
    pub fn propagate(&mut self, changed: &CellRef) -> Result<Vec<CellRef>> {
        let affected = self.collect_dependents(changed);
        if affected.is_empty() {
            return Ok(Vec::new());
        }

        let (order, stuck) = self.topological_order(&affected);
        for cell_ref in &order {
            self.recalculate_cell(cell_ref);
        }
        debug!(cell = %changed, recalculated = order.len(), "propagated edit");

        if !stuck.is_empty() {
            self.mark_errors(&stuck);
            warn!(cell = %changed, cycle_len = stuck.len(), "propagation reached a cycle");
            return Err(GridcalcError::CycleDetected(stuck));
        }
        Ok(order)
    }

    /// Recompute every formula cell in dependency order.
    pub fn recalculate_all(&mut self) -> Result<Vec<CellRef>> {
        let formulas: BTreeSet<CellRef> = self
            .grid
            .iter()
            .filter(|entry| entry.value().is_formula())
            .map(|entry| *entry.key())
            .collect();

        let (order, stuck) = self.topological_order(&formulas);
        for cell_ref in &order {
            self.recalculate_cell(cell_ref);
        }
        debug!(recalculated = order.len(), "recalculated all formulas");

        if !stuck.is_empty() {
            self.mark_errors(&stuck);
            warn!(cycle_len = stuck.len(), "full recalculation found a cycle");
            return Err(GridcalcError::CycleDetected(stuck));
        }
        Ok(order)
    }

    /// All cells reachable from `changed` through the dependency index.
    /// `changed` itself is included only if it depends on itself.
    fn collect_dependents(&self, changed: &CellRef) -> BTreeSet<CellRef> {
        let mut affected = BTreeSet::new();
        let mut to_process = vec![*changed];
        while let Some(cell_ref) = to_process.pop() {
            let Some(deps) = self.dependents.get(&cell_ref) else {
                continue;
            };
            for dep in deps {
                if affected.insert(*dep) {
                    to_process.push(*dep);
                }
            }
        }
        affected
    }

    /// Kahn's algorithm over the subgraph induced by `nodes`. Returns the
    /// evaluation order and the nodes that could not be ordered.
    fn topological_order(&self, nodes: &BTreeSet<CellRef>) -> (Vec<CellRef>, Vec<CellRef>) {
        let mut indegree: BTreeMap<CellRef, usize> = nodes.iter().map(|n| (*n, 0)).collect();
        for node in nodes {
            for dep in self.dependents.get(node).into_iter().flatten() {
                if let Some(count) = indegree.get_mut(dep) {
                    *count += 1;
                }
            }
        }

        let mut ready: BTreeSet<CellRef> = indegree
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(cell_ref, _)| *cell_ref)
            .collect();
        let mut order = Vec::with_capacity(nodes.len());

        while let Some(cell_ref) = ready.pop_first() {
            order.push(cell_ref);
            for dep in self.dependents.get(&cell_ref).into_iter().flatten() {
                if let Some(count) = indegree.get_mut(dep) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dep);
                    }
                }
            }
        }

        let stuck = indegree
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(cell_ref, _)| cell_ref)
            .collect();
        (order, stuck)
    }

    /// Re-evaluate one formula cell against the current grid.
    fn recalculate_cell(&mut self, cell_ref: &CellRef) {
        let body = self
            .grid
            .get(cell_ref)
            .and_then(|cell| cell.formula_body().map(str::to_string));
        let Some(body) = body else {
            return;
        };

        let value = self.evaluate_cell(cell_ref, &body);
        if let Some(mut cell) = self.grid.get_mut(cell_ref) {
            cell.value = value;
        }
    }

    fn mark_errors(&mut self, cells: &[CellRef]) {
        for cell_ref in cells {
            if let Some(mut cell) = self.grid.get_mut(cell_ref) {
                cell.value = CellValue::Error;
            }
        }
    }

    /// Evaluate a formula body, turning failures into the error sentinel.
    fn evaluate_cell(&self, cell_ref: &CellRef, body: &str) -> CellValue {
        match evaluate(body, &self.grid) {
            Ok(value) => value,
            Err(e) => {
                debug!(cell = %cell_ref, error = %e, "formula evaluation failed");
                CellValue::Error
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcalc_engine::engine::evaluate_formula;

    fn r(name: &str) -> CellRef {
        CellRef::from_str(name).unwrap()
    }

    fn edit(doc: &mut Document, name: &str, input: &str) -> Vec<CellRef> {
        doc.on_cell_edited(r(name), input).unwrap()
    }

    fn num(doc: &Document, name: &str) -> f64 {
        match doc.value(&r(name)) {
            Some(CellValue::Number(n)) => n,
            other => panic!("{name} is not a number: {other:?}"),
        }
    }

    /// Re-evaluating every formula reproduces its stored value.
    fn assert_consistent(doc: &Document) {
        for entry in doc.grid.iter() {
            let Some(source) = entry.value().formula.clone() else {
                continue;
            };
            let expected = evaluate_formula(&source, &doc.grid).unwrap_or(CellValue::Error);
            assert_eq!(entry.value().value, expected, "{} is stale", entry.key());
        }
    }

    #[test]
    fn test_literal_edit_is_stored_verbatim() {
        let mut doc = Document::new();
        edit(&mut doc, "A1", " 12 apples ");
        let cell = doc.get_cell(&r("A1")).unwrap();
        assert_eq!(cell.value, CellValue::Text(" 12 apples ".to_string()));
        assert!(cell.formula.is_none());
        assert_eq!(doc.display(&r("A1")), " 12 apples ");
        assert!(doc.modified);
    }

    #[test]
    fn test_formula_edit_stores_source_and_value() {
        let mut doc = Document::new();
        edit(&mut doc, "A1", "=2*21");
        let cell = doc.get_cell(&r("A1")).unwrap();
        assert_eq!(cell.value, CellValue::Number(42.0));
        assert_eq!(cell.formula.as_deref(), Some("=2*21"));
        assert_eq!(doc.input_string(&r("A1")), "=2*21");
    }

    #[test]
    fn test_failing_formula_stores_sentinel() {
        let mut doc = Document::new();
        edit(&mut doc, "B1", "n/a");
        edit(&mut doc, "B2", "-");
        edit(&mut doc, "A1", "=AVERAGE(B1:B2)");
        let cell = doc.get_cell(&r("A1")).unwrap();
        assert_eq!(cell.value, CellValue::Error);
        assert_eq!(cell.formula.as_deref(), Some("=AVERAGE(B1:B2)"));
        assert_eq!(doc.display(&r("A1")), "#ERROR");
    }

    #[test]
    fn test_aggregates_over_blank_cells() {
        let mut doc = Document::new();
        edit(&mut doc, "A1", "4");
        edit(&mut doc, "A3", "  ");
        edit(&mut doc, "B1", "=COUNT(A1:A4)");
        edit(&mut doc, "B2", "=AVERAGE(A1:A4)");
        edit(&mut doc, "B3", "=MIN(A1:A4)");
        assert_eq!(num(&doc, "B1"), 4.0);
        assert_eq!(num(&doc, "B2"), 1.0);
        assert_eq!(num(&doc, "B3"), 0.0);

        edit(&mut doc, "A2", "=1/0");
        assert_eq!(num(&doc, "B1"), 3.0);
        assert_eq!(num(&doc, "B2"), 4.0 / 3.0);
    }

    #[test]
    fn test_direct_dependent_updates() {
        let mut doc = Document::new();
        edit(&mut doc, "A1", "5");
        edit(&mut doc, "B1", "=A1+1");
        assert_eq!(num(&doc, "B1"), 6.0);

        let updated = edit(&mut doc, "A1", "10");
        assert_eq!(updated, vec![r("B1")]);
        assert_eq!(num(&doc, "B1"), 11.0);
    }

    #[test]
    fn test_chained_dependents_update_in_one_edit() {
        let mut doc = Document::new();
        edit(&mut doc, "C1", "=B1+1");
        edit(&mut doc, "B1", "=A1+1");
        let updated = edit(&mut doc, "A1", "1");
        assert_eq!(updated, vec![r("B1"), r("C1")]);
        assert_eq!(num(&doc, "B1"), 2.0);
        assert_eq!(num(&doc, "C1"), 3.0);
    }

    #[test]
    fn test_diamond_recalculates_each_cell_once_after_precedents() {
        let mut doc = Document::new();
        // D1 sorts before B2 and C2 but must wait for both.
        edit(&mut doc, "D1", "=B2+C2");
        edit(&mut doc, "B2", "=A1*2");
        edit(&mut doc, "C2", "=A1*3");
        let updated = edit(&mut doc, "A1", "2");
        assert_eq!(updated, vec![r("B2"), r("C2"), r("D1")]);
        assert_eq!(num(&doc, "D1"), 10.0);
        assert_consistent(&doc);
    }

    #[test]
    fn test_prefix_identifier_is_not_a_dependent() {
        let mut doc = Document::new();
        edit(&mut doc, "A10", "7");
        edit(&mut doc, "B1", "=A10*2");
        let updated = edit(&mut doc, "A1", "100");
        assert!(updated.is_empty());
        assert_eq!(num(&doc, "B1"), 14.0);
    }

    #[test]
    fn test_range_members_trigger_recalculation() {
        let mut doc = Document::new();
        edit(&mut doc, "B1", "=SUM(A1:A3)");
        edit(&mut doc, "A2", "4");
        assert_eq!(num(&doc, "B1"), 4.0);
        edit(&mut doc, "A3", "6");
        assert_eq!(num(&doc, "B1"), 10.0);
    }

    #[test]
    fn test_error_cells_are_skipped_by_aggregates_but_poison_references() {
        let mut doc = Document::new();
        edit(&mut doc, "A1", "1");
        edit(&mut doc, "A2", "=1/0");
        edit(&mut doc, "A3", "3");
        edit(&mut doc, "B1", "=SUM(A1:A3)");
        edit(&mut doc, "B2", "=A2+1");
        assert_eq!(doc.value(&r("A2")), Some(CellValue::Error));
        assert_eq!(num(&doc, "B1"), 4.0);
        assert_eq!(doc.value(&r("B2")), Some(CellValue::Error));

        edit(&mut doc, "A2", "2");
        assert_eq!(num(&doc, "B1"), 6.0);
        assert_eq!(num(&doc, "B2"), 3.0);
    }

    #[test]
    fn test_direct_cycle_is_rejected_and_previous_cell_kept() {
        let mut doc = Document::new();
        edit(&mut doc, "A1", "=B1+1");
        let err = doc.on_cell_edited(r("B1"), "=A1").unwrap_err();
        assert!(matches!(err, GridcalcError::CycleDetected(_)));
        assert_eq!(doc.get_cell(&r("B1")).unwrap().formula, None);
        assert!(!doc.dependents.contains_key(&r("A1")));
        assert_eq!(num(&doc, "A1"), 1.0);
    }

    #[test]
    fn test_self_reference_is_rejected() {
        let mut doc = Document::new();
        edit(&mut doc, "A1", "3");
        let err = doc.on_cell_edited(r("A1"), "=SUM(A1:A2)").unwrap_err();
        assert!(matches!(err, GridcalcError::CycleDetected(_)));
        assert_eq!(doc.value(&r("A1")), Some(CellValue::Text("3".to_string())));
    }

    #[test]
    fn test_propagate_reports_cycles_in_the_index() {
        let mut doc = Document::with_dimensions(3, 3);
        // Bypass edit-time checks to plant a cycle.
        doc.replace_cell(r("A1"), Cell::from_input("=B1"));
        doc.replace_cell(r("B1"), Cell::from_input("=A1"));
        doc.replace_cell(r("C1"), Cell::from_input("=C2+1"));

        let err = doc.propagate(&r("A1")).unwrap_err();
        match err {
            GridcalcError::CycleDetected(cells) => assert_eq!(cells, vec![r("A1"), r("B1")]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(doc.value(&r("A1")), Some(CellValue::Error));
        assert_eq!(doc.value(&r("B1")), Some(CellValue::Error));
    }

    #[test]
    fn test_recalculate_all_orders_by_dependencies() {
        let mut doc = Document::with_dimensions(3, 3);
        doc.replace_cell(r("A1"), Cell::from_input("=B1*2"));
        doc.replace_cell(r("B1"), Cell::from_input("=C1+1"));
        doc.replace_cell(r("C1"), Cell::from_input("4"));
        let order = doc.recalculate_all().unwrap();
        assert_eq!(order, vec![r("B1"), r("A1")]);
        assert_eq!(num(&doc, "A1"), 10.0);
        assert_consistent(&doc);
    }

    #[test]
    fn test_out_of_bounds_edit() {
        let mut doc = Document::with_dimensions(2, 2);
        let err = doc.on_cell_edited(r("C1"), "1").unwrap_err();
        assert!(matches!(err, GridcalcError::OutOfBounds(_)));
    }

    #[test]
    fn test_reference_outside_grid_is_error_value() {
        let mut doc = Document::with_dimensions(2, 2);
        edit(&mut doc, "A1", "=C5+1");
        assert_eq!(doc.value(&r("A1")), Some(CellValue::Error));
        assert_eq!(doc.evaluate("C5"), Err(gridcalc_engine::engine::EvalError::CellNotFound("C5".into())));
    }

    #[test]
    fn test_replacing_formula_drops_old_dependencies() {
        let mut doc = Document::new();
        edit(&mut doc, "B1", "=A1");
        edit(&mut doc, "B1", "=A2");
        let updated = edit(&mut doc, "A1", "9");
        assert!(updated.is_empty());
        let updated = edit(&mut doc, "A2", "9");
        assert_eq!(updated, vec![r("B1")]);
    }

    #[test]
    fn test_long_chain_does_not_recurse() {
        let mut doc = Document::with_dimensions(1, 100);
        for row in 2..=100 {
            edit(&mut doc, &format!("A{}", row), &format!("=A{}+1", row - 1));
        }
        let updated = edit(&mut doc, "A1", "0");
        assert_eq!(updated.len(), 99);
        assert_eq!(num(&doc, "A100"), 99.0);
        assert_consistent(&doc);
    }
}
