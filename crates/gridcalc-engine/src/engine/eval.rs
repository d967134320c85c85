//! Formula evaluation against a grid snapshot.
//!
//! [`evaluate`] parses a formula body and computes a single scalar from a
//! read-only view of the grid. It never mutates the grid and knows nothing
//! about dependents; recalculation lives with the document.
//!
//! Value rules:
//! - A cell reference yields the cell's value; numeric text becomes a number,
//!   an empty or blank cell becomes `0`, and an error cell fails with
//!   `NotNumeric`.
//! - `+` adds two numbers and otherwise concatenates the textual forms.
//! - `-`, `*`, `/` and unary signs require numbers.

use super::cell::{CellValue, FORMULA_MARKER, Grid, parse_number};
use super::cell_ref::CellRef;
use super::error::{EvalError, EvalResult};
use super::parser::{Arg, BinaryOp, Expr, UnaryOp, parse_formula};
use crate::builtins::{aggregate, apply_text};

/// Evaluate a formula body (the text after `=`) against `grid`.
pub fn evaluate(body: &str, grid: &Grid) -> EvalResult<CellValue> {
    let expr = parse_formula(body)?;
    Evaluator { grid }.eval(&expr)
}

/// Evaluate formula source, stripping a leading `=` if present.
pub fn evaluate_formula(source: &str, grid: &Grid) -> EvalResult<CellValue> {
    let body = source.strip_prefix(FORMULA_MARKER).unwrap_or(source);
    evaluate(body, grid)
}

struct Evaluator<'g> {
    grid: &'g Grid,
}

impl Evaluator<'_> {
    fn eval(&self, expr: &Expr) -> EvalResult<CellValue> {
        match expr {
            Expr::Number(n) => Ok(CellValue::Number(*n)),
            Expr::Text(s) => Ok(CellValue::Text(s.clone())),
            Expr::Ref(cell_ref) => self.reference(cell_ref),
            Expr::Unary { op, operand } => {
                let n = self.number(operand)?;
                Ok(CellValue::Number(match op {
                    UnaryOp::Plus => n,
                    UnaryOp::Minus => -n,
                }))
            }
            Expr::Chain { head, tail } => self.chain(head, tail),
            Expr::Call {
                func,
                arg: Arg::Range(range),
            } => aggregate(*func, range, self.grid).map(CellValue::Number),
            Expr::Call {
                func,
                arg: Arg::Expr(arg),
            } => {
                // A bare reference reads the cell as text, whatever it holds.
                let text = match arg.as_ref() {
                    Expr::Ref(cell_ref) => self.cell_value(cell_ref)?.as_text(),
                    other => self.eval(other)?.as_text(),
                };
                Ok(CellValue::Text(apply_text(*func, &text)))
            }
        }
    }

    /// Fold an operator chain left to right without recursing per operand.
    fn chain(&self, head: &Expr, tail: &[(BinaryOp, Expr)]) -> EvalResult<CellValue> {
        // A leading operand of `- * /` is read as a number so that a bad
        // reference reports which cell it was.
        let mut acc = match tail.first() {
            Some((BinaryOp::Add, _)) | None => self.eval(head)?,
            Some(_) => CellValue::Number(self.number(head)?),
        };

        for (op, rhs) in tail {
            acc = match op {
                BinaryOp::Add => {
                    let rhs = self.eval(rhs)?;
                    match (&acc, &rhs) {
                        (CellValue::Number(a), CellValue::Number(b)) => CellValue::Number(a + b),
                        _ => CellValue::Text(acc.as_text() + &rhs.as_text()),
                    }
                }
                _ => {
                    let a = value_number(acc)?;
                    let b = self.number(rhs)?;
                    CellValue::Number(arithmetic(*op, a, b)?)
                }
            };
        }
        Ok(acc)
    }

    /// Evaluate an operand that must be a number.
    fn number(&self, expr: &Expr) -> EvalResult<f64> {
        if let Expr::Ref(cell_ref) = expr {
            return self
                .cell_value(cell_ref)?
                .as_number()
                .ok_or_else(|| EvalError::NotNumeric(cell_ref.to_string()));
        }
        value_number(self.eval(expr)?)
    }

    /// Value substituted for a bare reference.
    fn reference(&self, cell_ref: &CellRef) -> EvalResult<CellValue> {
        match self.cell_value(cell_ref)? {
            CellValue::Error => Err(EvalError::NotNumeric(cell_ref.to_string())),
            value => Ok(match value.as_number() {
                Some(n) => CellValue::Number(n),
                None => value,
            }),
        }
    }

    fn cell_value(&self, cell_ref: &CellRef) -> EvalResult<CellValue> {
        self.grid
            .get(cell_ref)
            .map(|cell| cell.value.clone())
            .ok_or_else(|| EvalError::CellNotFound(cell_ref.to_string()))
    }
}

/// Numeric form of an intermediate (non-reference) value.
fn value_number(value: CellValue) -> EvalResult<f64> {
    match value {
        CellValue::Number(n) => Ok(n),
        CellValue::Text(s) => parse_number(&s)
            .ok_or_else(|| EvalError::expression(format!("expected a number, found \"{}\"", s))),
        CellValue::Empty => Ok(0.0),
        CellValue::Error => Err(EvalError::expression("expected a number")),
    }
}

fn arithmetic(op: BinaryOp, a: f64, b: f64) -> EvalResult<f64> {
    Ok(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(EvalError::expression("division by zero"));
            }
            a / b
        }
    })
}
