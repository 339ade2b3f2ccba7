//! The flat token stream a parsed formula compiles to.
//!
//! Tokens keep the formula's left-to-right order exactly as written; no tree
//! is built here. Operator precedence is imposed later, at interpret time, by
//! a recursive-descent walk over this same vector (see
//! `gridflow-engine::interpret`). `Open`/`Close`/`Sep` bracket both plain
//! parenthesized groups and function argument lists — the interpreter tells
//! the two apart by whether a `Function` token immediately precedes the
//! `Open`.

use gridflow_common::{error::FormulaErrorKind, Address};

/// One element of a parsed formula's flat token stream.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaToken {
    Value(f64),
    /// Index into the workbook string pool the token was parsed against.
    StringLit(u32),
    Boolean(bool),
    SingleRef(Address),
    RangeRef(Address, Address),
    /// An unresolved reference to a named expression, expanded inline by the
    /// interpreter (with cycle detection) rather than at parse time.
    NamedExpression(String),
    Function(String),
    Plus,
    Minus,
    Multiply,
    Divide,
    Power,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Open,
    Close,
    Sep,
    Error(FormulaErrorKind),
}

impl FormulaToken {
    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            FormulaToken::Plus
                | FormulaToken::Minus
                | FormulaToken::Multiply
                | FormulaToken::Divide
                | FormulaToken::Power
                | FormulaToken::Concat
                | FormulaToken::Eq
                | FormulaToken::Ne
                | FormulaToken::Lt
                | FormulaToken::Le
                | FormulaToken::Gt
                | FormulaToken::Ge
        )
    }
}

/// Resolves a [`FormulaToken::StringLit`] id back to the text it was interned
/// from. Lets this crate print a formula without depending on the workbook's
/// concrete string pool — `gridflow-engine`'s pool implements this directly.
pub trait StringLookup {
    fn lookup(&self, id: u32) -> Option<String>;
}

/// Render a token stream back to Excel-A1 formula text.
///
/// Mirrors the original `print_tokens` diagnostic: a straight textual replay
/// of the stream, not a pretty-printer with its own grammar awareness.
pub fn print_formula(
    tokens: &[FormulaToken],
    resolver: &dyn crate::resolver::NameResolver,
    origin: gridflow_common::AbsAddress,
    strings: &dyn StringLookup,
) -> String {
    let mut out = String::new();
    for tok in tokens {
        match tok {
            FormulaToken::Value(n) => out.push_str(&n.to_string()),
            FormulaToken::StringLit(id) => {
                out.push('"');
                out.push_str(strings.lookup(*id).as_deref().unwrap_or("#REF!"));
                out.push('"');
            }
            FormulaToken::Boolean(b) => out.push_str(if *b { "TRUE" } else { "FALSE" }),
            FormulaToken::SingleRef(addr) => {
                out.push_str(&resolver.get_name(&crate::resolver::ResolvedName::Cell(*addr), origin, true))
            }
            FormulaToken::RangeRef(a, b) => out.push_str(&resolver.get_name(
                &crate::resolver::ResolvedName::Range(*a, *b),
                origin,
                true,
            )),
            FormulaToken::NamedExpression(name) => out.push_str(name),
            FormulaToken::Function(name) => out.push_str(name),
            FormulaToken::Plus => out.push('+'),
            FormulaToken::Minus => out.push('-'),
            FormulaToken::Multiply => out.push('*'),
            FormulaToken::Divide => out.push('/'),
            FormulaToken::Power => out.push('^'),
            FormulaToken::Concat => out.push('&'),
            FormulaToken::Eq => out.push('='),
            FormulaToken::Ne => out.push_str("<>"),
            FormulaToken::Lt => out.push('<'),
            FormulaToken::Le => out.push_str("<="),
            FormulaToken::Gt => out.push('>'),
            FormulaToken::Ge => out.push_str(">="),
            FormulaToken::Open => out.push('('),
            FormulaToken::Close => out.push(')'),
            FormulaToken::Sep => out.push(','),
            FormulaToken::Error(kind) => out.push_str(&kind.to_string()),
        }
    }
    out
}
