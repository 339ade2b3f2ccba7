//! Recursive-descent pass that turns a [`LexToken`] stream into the engine's
//! flat [`FormulaToken`] stream, resolving bare words against a
//! [`NameResolver`] along the way.
//!
//! The recursion here only exists to disambiguate the lexer's output (telling
//! a unary minus from a binary one, counting a function's argument list); it
//! does not build a tree. The resulting `Vec<FormulaToken>` preserves the
//! formula's original left-to-right order, `Open`/`Close`/`Sep` and all —
//! precedence is imposed again, independently, by the interpreter that
//! consumes it.

use gridflow_common::{AbsAddress, SheetId};
use thiserror::Error;

use crate::lexer::{lex, LexError, LexToken};
use crate::resolver::{NameResolver, ResolvedName};
use crate::token::FormulaToken;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("expected ')'")]
    ExpectedClose,
    #[error("range reference spans more than one sheet")]
    MultiSheetRange,
}

/// Parse `formula` (with or without a leading `=`) into a flat token stream.
///
/// `intern` is called once per string literal encountered and must return a
/// stable id in the caller's string pool; `sheet_lookup` maps a sheet name
/// appearing before `!` to its id.
pub fn parse_formula(
    formula: &str,
    origin: AbsAddress,
    resolver: &dyn NameResolver,
    sheet_lookup: &dyn Fn(&str) -> Option<SheetId>,
    intern: &mut dyn FnMut(&str) -> u32,
) -> Result<Vec<FormulaToken>, ParseError> {
    let lexed = lex(formula)?;
    let mut p = Parser {
        tokens: &lexed,
        pos: 0,
        origin,
        resolver,
        sheet_lookup,
        intern,
        out: Vec::new(),
    };
    p.expression()?;
    if p.pos != p.tokens.len() {
        return Err(ParseError::UnexpectedEnd);
    }
    Ok(p.out)
}

struct Parser<'a> {
    tokens: &'a [LexToken],
    pos: usize,
    origin: AbsAddress,
    resolver: &'a dyn NameResolver,
    sheet_lookup: &'a dyn Fn(&str) -> Option<SheetId>,
    intern: &'a mut dyn FnMut(&str) -> u32,
    out: Vec<FormulaToken>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&LexToken> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&LexToken> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    /// `expression = term (("+" | "-" | comparison | "&") term)*`
    fn expression(&mut self) -> Result<(), ParseError> {
        self.term()?;
        loop {
            let op = match self.peek() {
                Some(LexToken::Plus) => FormulaToken::Plus,
                Some(LexToken::Minus) => FormulaToken::Minus,
                Some(LexToken::Amp) => FormulaToken::Concat,
                Some(LexToken::Eq) => FormulaToken::Eq,
                Some(LexToken::Ne) => FormulaToken::Ne,
                Some(LexToken::Lt) => FormulaToken::Lt,
                Some(LexToken::Le) => FormulaToken::Le,
                Some(LexToken::Gt) => FormulaToken::Gt,
                Some(LexToken::Ge) => FormulaToken::Ge,
                _ => break,
            };
            self.advance();
            self.out.push(op);
            self.term()?;
        }
        Ok(())
    }

    /// `term = power (("*" | "/") power)*`
    fn term(&mut self) -> Result<(), ParseError> {
        self.power()?;
        loop {
            let op = match self.peek() {
                Some(LexToken::Star) => FormulaToken::Multiply,
                Some(LexToken::Slash) => FormulaToken::Divide,
                _ => break,
            };
            self.advance();
            self.out.push(op);
            self.power()?;
        }
        Ok(())
    }

    /// `power = factor ("^" factor)*`
    fn power(&mut self) -> Result<(), ParseError> {
        self.factor()?;
        while matches!(self.peek(), Some(LexToken::Caret)) {
            self.advance();
            self.out.push(FormulaToken::Power);
            self.factor()?;
        }
        Ok(())
    }

    /// `factor = ["-"] (paren | function_call | reference | literal)`
    fn factor(&mut self) -> Result<(), ParseError> {
        if matches!(self.peek(), Some(LexToken::Minus)) {
            self.advance();
            self.out.push(FormulaToken::Value(0.0));
            self.out.push(FormulaToken::Minus);
            return self.factor();
        }

        match self.advance().cloned() {
            Some(LexToken::Open) => {
                self.expression()?;
                match self.advance() {
                    Some(LexToken::Close) => Ok(()),
                    _ => Err(ParseError::ExpectedClose),
                }
            }
            Some(LexToken::Number(n)) => {
                self.out.push(FormulaToken::Value(n));
                Ok(())
            }
            Some(LexToken::String(s)) => {
                let id = (self.intern)(&s);
                self.out.push(FormulaToken::StringLit(id));
                Ok(())
            }
            Some(LexToken::FunctionWord(name)) => {
                self.out.push(FormulaToken::Function(name));
                match self.advance() {
                    Some(LexToken::Open) => {}
                    _ => return Err(ParseError::UnexpectedEnd),
                }
                self.out.push(FormulaToken::Open);
                if !matches!(self.peek(), Some(LexToken::Close)) {
                    self.expression()?;
                    while matches!(self.peek(), Some(LexToken::Comma)) {
                        self.advance();
                        self.out.push(FormulaToken::Sep);
                        self.expression()?;
                    }
                }
                match self.advance() {
                    Some(LexToken::Close) => {}
                    _ => return Err(ParseError::ExpectedClose),
                }
                self.out.push(FormulaToken::Close);
                Ok(())
            }
            Some(LexToken::Word(w)) => {
                if w.eq_ignore_ascii_case("TRUE") || w.eq_ignore_ascii_case("FALSE") {
                    self.out.push(FormulaToken::Boolean(w.eq_ignore_ascii_case("TRUE")));
                    return Ok(());
                }
                match self.resolver.resolve(&w, self.origin, self.sheet_lookup) {
                    ResolvedName::Cell(addr) => self.out.push(FormulaToken::SingleRef(addr)),
                    ResolvedName::Range(first, last) => {
                        if first.sheet != last.sheet {
                            return Err(ParseError::MultiSheetRange);
                        }
                        self.out.push(FormulaToken::RangeRef(first, last))
                    }
                    ResolvedName::NamedExpression(name) => self.out.push(FormulaToken::NamedExpression(name)),
                    ResolvedName::Function(name) => self.out.push(FormulaToken::Function(name)),
                    ResolvedName::Invalid => self
                        .out
                        .push(FormulaToken::Error(gridflow_common::error::FormulaErrorKind::NameNotFound)),
                }
                Ok(())
            }
            _ => Err(ParseError::UnexpectedEnd),
        }
    }
}
