//! Dependency extraction from formula strings.
//!
//! Parses formula text to find all cell references (e.g., `A1`, `B2:C5`)
//! that the formula depends on. This feeds the document's dependency index
//! and cycle detection.
//!
//! Handles:
//! - Simple cell references: `A1`, `B2`
//! - Range references in functions: `SUM(A1:B5)` (every cell of the rectangle)
//! - Ignores references inside string literals
//!
//! References are found by tokenizing, not by substring search, so `A10`
//! is never mistaken for `A1`.

use super::cell_ref::{CellRange, CellRef};
use super::parser::{Token, tokenize};
use tracing::debug;

/// Extract all cell references from a formula body as dependencies.
///
/// A body that does not tokenize has no dependencies: it fails to evaluate
/// regardless of cell values.
pub fn extract_dependencies(body: &str) -> Vec<CellRef> {
    let Ok(tokens) = tokenize(body) else {
        return Vec::new();
    };

    let mut deps = Vec::new();
    let mut idx = 0;
    while idx < tokens.len() {
        if let Token::Cell(start) = tokens[idx].token {
            let colon = tokens.get(idx + 1).map(|t| &t.token);
            let end = tokens.get(idx + 2).map(|t| &t.token);
            if let (Some(Token::Colon), Some(Token::Cell(end))) = (colon, end) {
                let range = CellRange::new(start, *end);
                // Oversized ranges fail to evaluate, so they reference nothing.
                if range.is_bounded() {
                    deps.extend(range.cells());
                } else {
                    debug!(range = %range, "range too large to track as dependencies");
                }
                idx += 3;
                continue;
            }
            deps.push(start);
        }
        idx += 1;
    }

    deps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_dependencies_skips_over_limit_ranges() {
        let deps = extract_dependencies("SUM(A1:A1000001)+B2");
        assert_eq!(deps, vec![CellRef::new(1, 1)]);
    }

    #[test]
    fn test_extract_dependencies_ignores_string_literals() {
        let deps = extract_dependencies(r#"UPPER("A1") + B3"#);
        assert_eq!(deps, vec![CellRef::new(1, 2)]);
    }

    #[test]
    fn test_no_prefix_false_positive() {
        let deps = extract_dependencies("A10 + 1");
        assert_eq!(deps, vec![CellRef::new(0, 9)]);
        assert!(!deps.contains(&CellRef::new(0, 0)));
    }

    #[test]
    fn test_invalid_body_has_no_dependencies() {
        assert!(extract_dependencies("A1 > 2").is_empty());
    }
}
