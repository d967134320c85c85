//! Formula tokenizer and recursive descent parser.
//!
//! Formula bodies (the text after `=`) are parsed into a small expression
//! tree. The grammar is deliberately closed: numbers, double-quoted strings,
//! cell identifiers, the built-in functions and `+ - * / ( )`. Nothing in a
//! formula can reach the host beyond reading cell values.
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('+' | '-') unary | primary
//! primary := number | string | cell | NAME '(' arg ')' | '(' expr ')'
//! ```
//!
//! Operator chains at one precedence level are kept flat, so a long sum does
//! not deepen the tree. Nesting through parentheses, signs and function calls
//! is limited to [`MAX_NESTING`] levels.

use super::cell_ref::{CellRange, CellRef};
use super::error::{EvalError, EvalResult};
use crate::builtins::Builtin;

/// Deepest nesting of parentheses, unary signs and calls a formula may use.
pub const MAX_NESTING: usize = 256;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Text(String),
    Cell(CellRef),
    Name(String),
    Plus,
    Minus,
    Star,
    Slash,
    LeftParen,
    RightParen,
    Colon,
    Comma,
}

/// A token with its byte span in the source.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Arg {
    Range(CellRange),
    Expr(Box<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Expr {
    Number(f64),
    Text(String),
    Ref(CellRef),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `head op1 rhs1 op2 rhs2 ...`, applied left to right. All operators in
    /// a chain share one precedence level.
    Chain {
        head: Box<Expr>,
        tail: Vec<(BinaryOp, Expr)>,
    },
    Call {
        func: Builtin,
        arg: Arg,
    },
}

/// Split a formula body into tokens.
pub(crate) fn tokenize(src: &str) -> EvalResult<Vec<Spanned>> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;
        let token = match c {
            b'+' => single(&mut pos, Token::Plus),
            b'-' => single(&mut pos, Token::Minus),
            b'*' => single(&mut pos, Token::Star),
            b'/' => single(&mut pos, Token::Slash),
            b'(' => single(&mut pos, Token::LeftParen),
            b')' => single(&mut pos, Token::RightParen),
            b':' => single(&mut pos, Token::Colon),
            b',' => single(&mut pos, Token::Comma),
            b'"' => scan_string(src, &mut pos)?,
            b'0'..=b'9' | b'.' => scan_number(src, &mut pos)?,
            c if c.is_ascii_alphabetic() || c == b'_' => scan_word(src, &mut pos),
            _ => {
                let ch = src[pos..].chars().next().unwrap_or('?');
                return Err(EvalError::expression(format!(
                    "unexpected character '{}'",
                    ch
                )));
            }
        };
        tokens.push(Spanned {
            token,
            start,
            end: pos,
        });
    }

    Ok(tokens)
}

fn single(pos: &mut usize, token: Token) -> Token {
    *pos += 1;
    token
}

/// Double-quoted string; a doubled quote (`""`) is an escaped quote.
fn scan_string(src: &str, pos: &mut usize) -> EvalResult<Token> {
    let mut text = String::new();
    let mut chars = src[*pos + 1..].char_indices().peekable();
    while let Some((offset, ch)) = chars.next() {
        if ch == '"' {
            if chars.peek().is_some_and(|(_, next)| *next == '"') {
                text.push('"');
                chars.next();
                continue;
            }
            *pos += 1 + offset + 1;
            return Ok(Token::Text(text));
        }
        text.push(ch);
    }
    Err(EvalError::expression("unterminated string literal"))
}

fn scan_number(src: &str, pos: &mut usize) -> EvalResult<Token> {
    let bytes = src.as_bytes();
    let start = *pos;
    let mut end = start;

    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
        end += 1;
    }
    // Exponent, only when digits follow.
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        if exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
                exp_end += 1;
            }
            end = exp_end;
        }
    }

    let text = &src[start..end];
    let n = text
        .parse::<f64>()
        .map_err(|_| EvalError::expression(format!("invalid number '{}'", text)))?;
    *pos = end;
    Ok(Token::Number(n))
}

/// Letters followed by digits form a cell identifier when the letters are
/// uppercase and the whole word is a valid reference; anything else is a name.
fn scan_word(src: &str, pos: &mut usize) -> Token {
    let bytes = src.as_bytes();
    let start = *pos;
    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    *pos = end;

    let word = &src[start..end];
    match CellRef::from_str(word) {
        Some(cell) => Token::Cell(cell),
        None => Token::Name(word.to_string()),
    }
}

fn chain(head: Expr, tail: Vec<(BinaryOp, Expr)>) -> Expr {
    if tail.is_empty() {
        head
    } else {
        Expr::Chain {
            head: Box::new(head),
            tail,
        }
    }
}

/// Parse a formula body into an expression tree.
pub(crate) fn parse_formula(body: &str) -> EvalResult<Expr> {
    let tokens = tokenize(body)?;
    if tokens.is_empty() {
        return Err(EvalError::expression("empty formula"));
    }

    let mut parser = Parser {
        src: body,
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_expr()?;

    if let Some(tok) = parser.tokens.get(parser.pos) {
        return Err(EvalError::expression(format!(
            "unexpected '{}'",
            &body[tok.start..tok.end]
        )));
    }
    Ok(expr)
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: Token, what: &str) -> EvalResult<()> {
        match self.advance() {
            Some(tok) if tok.token == expected => Ok(()),
            Some(tok) => Err(EvalError::expression(format!(
                "expected {} but found '{}'",
                what,
                &self.src[tok.start..tok.end]
            ))),
            None => Err(EvalError::expression(format!(
                "expected {} but reached end of formula",
                what
            ))),
        }
    }

    fn parse_expr(&mut self) -> EvalResult<Expr> {
        let head = self.parse_term()?;
        let mut tail = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            tail.push((op, self.parse_term()?));
        }
        Ok(chain(head, tail))
    }

    fn parse_term(&mut self) -> EvalResult<Expr> {
        let head = self.parse_unary()?;
        let mut tail = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.pos += 1;
            tail.push((op, self.parse_unary()?));
        }
        Ok(chain(head, tail))
    }

    fn parse_unary(&mut self) -> EvalResult<Expr> {
        let op = match self.peek() {
            Some(Token::Plus) => UnaryOp::Plus,
            Some(Token::Minus) => UnaryOp::Minus,
            _ => return self.parse_primary(),
        };
        self.pos += 1;
        self.enter()?;
        let operand = self.parse_unary()?;
        self.depth -= 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// Descend one nesting level, failing once the limit is reached.
    fn enter(&mut self) -> EvalResult<()> {
        if self.depth >= MAX_NESTING {
            return Err(EvalError::expression(format!(
                "formula nests deeper than {} levels",
                MAX_NESTING
            )));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_primary(&mut self) -> EvalResult<Expr> {
        let Some(tok) = self.advance() else {
            return Err(EvalError::expression("unexpected end of formula"));
        };

        match tok.token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Text(s) => Ok(Expr::Text(s)),
            Token::Cell(cell) => Ok(Expr::Ref(cell)),
            Token::LeftParen => {
                self.enter()?;
                let inner = self.parse_expr()?;
                self.expect(Token::RightParen, "')'")?;
                self.depth -= 1;
                Ok(inner)
            }
            Token::Name(name) => {
                if self.peek() != Some(&Token::LeftParen) {
                    return Err(EvalError::expression(format!("unknown name '{}'", name)));
                }
                let func = Builtin::from_name(&name)
                    .ok_or_else(|| EvalError::expression(format!("unknown function '{}'", name)))?;
                let open_end = self.tokens[self.pos].end;
                self.pos += 1;
                self.enter()?;
                let call = self.parse_call(func, open_end)?;
                self.depth -= 1;
                Ok(call)
            }
            _ => Err(EvalError::expression(format!(
                "unexpected '{}'",
                &self.src[tok.start..tok.end]
            ))),
        }
    }

    /// Parse the single argument of `func`; the opening parenthesis has been
    /// consumed and ends at byte `open_end`.
    fn parse_call(&mut self, func: Builtin, open_end: usize) -> EvalResult<Expr> {
        let close = self.matching_paren().ok_or_else(|| {
            EvalError::expression(format!("missing ')' after {}(", func.name()))
        })?;
        let close_start = self.tokens[close].start;
        let arg_text = self.src[open_end..close_start].trim();

        if func.takes_range() {
            let range = match &self.tokens[self.pos..close] {
                [a, colon, b] => match (&a.token, &colon.token, &b.token) {
                    (Token::Cell(start), Token::Colon, Token::Cell(end)) => {
                        CellRange::new(*start, *end)
                    }
                    _ => return Err(EvalError::InvalidRange(arg_text.to_string())),
                },
                _ => return Err(EvalError::InvalidRange(arg_text.to_string())),
            };
            if !range.is_bounded() {
                return Err(EvalError::InvalidRange(range.to_string()));
            }
            self.pos = close + 1;
            return Ok(Expr::Call {
                func,
                arg: Arg::Range(range),
            });
        }

        if self.pos == close {
            return Err(EvalError::expression(format!(
                "{} expects one argument",
                func.name()
            )));
        }
        let arg = self.parse_expr()?;
        if self.pos != close {
            return Err(EvalError::expression(format!(
                "{} expects one argument",
                func.name()
            )));
        }
        self.pos = close + 1;
        Ok(Expr::Call {
            func,
            arg: Arg::Expr(Box::new(arg)),
        })
    }

    /// Index of the ')' closing the call whose '(' was just consumed.
    fn matching_paren(&self) -> Option<usize> {
        let mut depth = 0usize;
        for (idx, tok) in self.tokens.iter().enumerate().skip(self.pos) {
            match tok.token {
                Token::LeftParen => depth += 1,
                Token::RightParen if depth == 0 => return Some(idx),
                Token::RightParen => depth -= 1,
                _ => {}
            }
        }
        None
    }
}
