//! Boolean row-predicate expressions.
//!
//! Grammar (keywords are case-insensitive):
//!
//! ```text
//! expr       := and ( ("or" | "|" | "||") and )*
//! and        := unary ( ("and" | "&" | "&&") unary )*
//! unary      := ("not" | "~" | "!") unary | primary
//! primary    := "(" expr ")" | operand ( cmp operand )?
//! cmp        := "==" | "=" | "!=" | "<" | "<=" | ">" | ">="
//! operand    := identifier | `quoted column` | 'string' | "string"
//!             | number | true | false | null
//! ```
//!
//! A lone column operand is true when the cell holds boolean `true`.
//! Parentheses and negations may nest at most [`MAX_DEPTH`] levels deep.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::CharIndices;

use labpilot_core::types::{Dataset, Record, Scalar};

use crate::error::AnalysisError;

/// Deepest nesting of parentheses and negations the parser accepts.
pub const MAX_DEPTH: usize = 64;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(String),
    Literal(Scalar),
}

impl Operand {
    fn column(&self) -> Option<&str> {
        match self {
            Operand::Column(name) => Some(name.as_str()),
            Operand::Literal(_) => None,
        }
    }
}

/// Parsed predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare {
        left: Operand,
        op: CmpOp,
        right: Operand,
    },
    Truthy(Operand),
    Not(Box<Expr>),
    /// Conjunction of two or more terms.
    And(Vec<Expr>),
    /// Disjunction of two or more terms.
    Or(Vec<Expr>),
}

impl Expr {
    /// Parse an expression string.
    pub fn parse(input: &str) -> Result<Expr, AnalysisError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(AnalysisError::InvalidExpression(
                "expression is empty".to_string(),
            ));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.parse_or()?;
        if let Some(tok) = parser.peek() {
            return Err(AnalysisError::InvalidExpression(format!(
                "unexpected {} after end of expression",
                tok.describe()
            )));
        }
        Ok(expr)
    }

    /// Column names referenced by the expression, in order of appearance.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Compare { left, right, .. } => {
                out.extend(left.column());
                out.extend(right.column());
            }
            Expr::Truthy(o) => out.extend(o.column()),
            Expr::Not(inner) => inner.collect_columns(out),
            Expr::And(terms) | Expr::Or(terms) => {
                for term in terms {
                    term.collect_columns(out);
                }
            }
        }
    }

    /// Fail with [`AnalysisError::UnknownColumn`] for the first referenced
    /// column the dataset does not have.
    pub fn validate(&self, dataset: &Dataset) -> Result<(), AnalysisError> {
        match self.columns().into_iter().find(|c| !dataset.has_column(c)) {
            Some(missing) => Err(AnalysisError::UnknownColumn(missing.to_string())),
            None => Ok(()),
        }
    }

    /// Evaluate the predicate against one row.
    pub fn matches(&self, row: &Record) -> bool {
        match self {
            Expr::Compare { left, op, right } => {
                compare(resolve(left, row), *op, resolve(right, row))
            }
            Expr::Truthy(o) => matches!(resolve(o, row), Scalar::Bool(true)),
            Expr::Not(inner) => !inner.matches(row),
            Expr::And(terms) => terms.iter().all(|t| t.matches(row)),
            Expr::Or(terms) => terms.iter().any(|t| t.matches(row)),
        }
    }
}

static NULL: Scalar = Scalar::Null;

fn resolve<'a>(operand: &'a Operand, row: &'a Record) -> &'a Scalar {
    match operand {
        Operand::Column(name) => row.get(name).unwrap_or(&NULL),
        Operand::Literal(v) => v,
    }
}

/// Compare two cell values.
///
/// Null equals only null and never orders. Values of different types are
/// unequal and never order.
pub fn compare(a: &Scalar, op: CmpOp, b: &Scalar) -> bool {
    let ordering = match (a, b) {
        (Scalar::Null, Scalar::Null) => return op == CmpOp::Eq,
        (Scalar::Null, _) | (_, Scalar::Null) => return op == CmpOp::Ne,
        (Scalar::Number(x), Scalar::Number(y)) => x.partial_cmp(y),
        (Scalar::Text(x), Scalar::Text(y)) => Some(x.cmp(y)),
        (Scalar::Bool(x), Scalar::Bool(y)) => Some(x.cmp(y)),
        _ => return op == CmpOp::Ne,
    };
    let Some(ordering) = ordering else {
        return op == CmpOp::Ne;
    };
    match op {
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
    }
}

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Scalar),
    And,
    Or,
    Not,
    LParen,
    RParen,
    Op(CmpOp),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("column '{}'", name),
            Token::Literal(v) => format!("value '{}'", v),
            Token::And => "'and'".to_string(),
            Token::Or => "'or'".to_string(),
            Token::Not => "'not'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Op(_) => "comparison operator".to_string(),
        }
    }
}

fn invalid(msg: String) -> AnalysisError {
    AnalysisError::InvalidExpression(msg)
}

fn tokenize(input: &str) -> Result<Vec<Token>, AnalysisError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '&' | '|' => {
                chars.next();
                if chars.peek().map(|&(_, n)| n) == Some(c) {
                    chars.next();
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            '~' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '!' => {
                chars.next();
                if next_is(&mut chars, '=') {
                    tokens.push(Token::Op(CmpOp::Ne));
                } else {
                    tokens.push(Token::Not);
                }
            }
            '=' => {
                chars.next();
                next_is(&mut chars, '=');
                tokens.push(Token::Op(CmpOp::Eq));
            }
            '<' => {
                chars.next();
                let op = if next_is(&mut chars, '=') {
                    CmpOp::Le
                } else {
                    CmpOp::Lt
                };
                tokens.push(Token::Op(op));
            }
            '>' => {
                chars.next();
                let op = if next_is(&mut chars, '=') {
                    CmpOp::Ge
                } else {
                    CmpOp::Gt
                };
                tokens.push(Token::Op(op));
            }
            '`' => {
                chars.next();
                let name = read_until(&mut chars, '`')
                    .ok_or_else(|| invalid(format!("unterminated column name at {}", pos)))?;
                if name.is_empty() {
                    return Err(invalid(format!("empty column name at {}", pos)));
                }
                tokens.push(Token::Ident(name));
            }
            '\'' | '"' => {
                chars.next();
                let text = read_string(&mut chars, c)
                    .ok_or_else(|| invalid(format!("unterminated string at {}", pos)))?;
                tokens.push(Token::Literal(Scalar::Text(text)));
            }
            c if c.is_ascii_digit() || c == '.' || c == '-' => {
                tokens.push(Token::Literal(Scalar::Number(read_number(&mut chars, input)?)));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&(_, n)) = chars.peek() {
                    if n.is_alphanumeric() || n == '_' || n == '.' {
                        word.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(keyword_or_ident(word));
            }
            other => {
                return Err(invalid(format!("unexpected character '{}' at {}", other, pos)));
            }
        }
    }
    Ok(tokens)
}

fn next_is(chars: &mut Peekable<CharIndices<'_>>, expected: char) -> bool {
    if chars.peek().map(|&(_, c)| c) == Some(expected) {
        chars.next();
        true
    } else {
        false
    }
}

fn read_until(chars: &mut Peekable<CharIndices<'_>>, end: char) -> Option<String> {
    let mut out = String::new();
    for (_, c) in chars.by_ref() {
        if c == end {
            return Some(out);
        }
        out.push(c);
    }
    None
}

fn read_string(chars: &mut Peekable<CharIndices<'_>>, quote: char) -> Option<String> {
    let mut out = String::new();
    while let Some((_, c)) = chars.next() {
        match c {
            '\\' => out.push(chars.next()?.1),
            c if c == quote => return Some(out),
            c => out.push(c),
        }
    }
    None
}

fn read_number(
    chars: &mut Peekable<CharIndices<'_>>,
    input: &str,
) -> Result<f64, AnalysisError> {
    let start = chars.peek().map(|&(i, _)| i).unwrap_or(input.len());
    let mut end = start;
    let mut prev = '\0';
    while let Some(&(i, c)) = chars.peek() {
        let sign_in_exponent = (c == '-' || c == '+') && (prev == 'e' || prev == 'E');
        let leading_minus = c == '-' && i == start;
        if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || sign_in_exponent || leading_minus
        {
            prev = c;
            end = i + c.len_utf8();
            chars.next();
        } else {
            break;
        }
    }
    let text = &input[start..end];
    text.parse::<f64>()
        .map_err(|_| invalid(format!("invalid number '{}' at {}", text, start)))
}

fn keyword_or_ident(word: String) -> Token {
    match word.to_lowercase().as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "true" => Token::Literal(Scalar::Bool(true)),
        "false" => Token::Literal(Scalar::Bool(false)),
        "null" | "none" => Token::Literal(Scalar::Null),
        _ => Token::Ident(word),
    }
}

// =============================================================================
// Parser
// =============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open parentheses and negations enclosing the current position.
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn enter(&mut self) -> Result<(), AnalysisError> {
        if self.depth >= MAX_DEPTH {
            return Err(invalid("expression nested too deeply".to_string()));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, AnalysisError> {
        let mut terms = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, AnalysisError> {
        let mut terms = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            terms.push(self.parse_unary()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::And(terms)
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, AnalysisError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            self.enter()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, AnalysisError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            self.enter()?;
            let inner = self.parse_or()?;
            self.depth -= 1;
            return match self.advance() {
                Some(Token::RParen) => Ok(inner),
                Some(tok) => Err(invalid(format!("expected ')' but found {}", tok.describe()))),
                None => Err(invalid("missing ')'".to_string())),
            };
        }

        let left = self.parse_operand()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.parse_operand()?;
            return Ok(Expr::Compare { left, op, right });
        }

        match left {
            Operand::Column(_) | Operand::Literal(Scalar::Bool(_)) => Ok(Expr::Truthy(left)),
            Operand::Literal(v) => Err(invalid(format!(
                "expected a comparison after value '{}'",
                v
            ))),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, AnalysisError> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(Operand::Column(name)),
            Some(Token::Literal(v)) => Ok(Operand::Literal(v)),
            Some(tok) => Err(invalid(format!(
                "expected a column or value but found {}",
                tok.describe()
            ))),
            None => Err(invalid("unexpected end of expression".to_string())),
        }
    }
}
