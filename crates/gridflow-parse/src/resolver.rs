//! Name resolution: turning the raw text a lexer token carries ("A1",
//! "Sheet2!B2:C4", "Total") into an address, range, or named-expression
//! reference, and back again for formula printing.
//!
//! `gridflow-parse` ships one concrete resolver, [`ExcelA1Resolver`], as the
//! default collaborator the parser needs to do its job; a workbook is free to
//! supply its own (a table-qualified resolver, an R1C1 resolver, ...) as long
//! as it implements [`NameResolver`].

use gridflow_common::{AbsAddress, Address, Coord, SheetId};

use crate::lexer::LexError;

/// What a bare identifier or bracketed reference in formula text names.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedName {
    Cell(Address),
    Range(Address, Address),
    NamedExpression(String),
    Function(String),
    Invalid,
}

/// Resolves reference text to addresses (and vice versa) for one formula
/// dialect. Implementations must be stateless with respect to a single
/// `resolve` call — sheet lookups go through `sheet_lookup`.
pub trait NameResolver: Send + Sync {
    /// Resolve `text` (as it appeared verbatim in formula source) relative to
    /// `origin`. `sheet_lookup` maps a sheet name to its id; unknown sheet
    /// names should resolve to `ResolvedName::Invalid`.
    fn resolve(&self, text: &str, origin: AbsAddress, sheet_lookup: &dyn Fn(&str) -> Option<SheetId>) -> ResolvedName;

    /// Render a resolved reference back to formula text relative to `origin`.
    fn get_name(&self, reference: &ResolvedName, origin: AbsAddress, with_sheet_prefix: bool) -> String;
}

/// Classic Excel A1 dialect: `A1`, `$A$1`, `Sheet2!B2`, `A1:C4`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExcelA1Resolver;

impl ExcelA1Resolver {
    /// Split an optional `Sheet!` prefix off a reference token.
    fn split_sheet(text: &str) -> (Option<&str>, &str) {
        match text.rfind('!') {
            Some(idx) => (Some(&text[..idx]), &text[idx + 1..]),
            None => (None, text),
        }
    }

    /// Parses one A1 cell reference, relative to `origin`: a `$`-anchored
    /// axis keeps its literal absolute value, a bare axis is stored as an
    /// offset from `origin` since that's what [`Address::resolve`] expects
    /// to add back on.
    fn parse_cell(text: &str, origin: AbsAddress) -> Option<Coord> {
        let bytes = text.as_bytes();
        let mut i = 0;
        let col_abs = bytes.get(i) == Some(&b'$');
        if col_abs {
            i += 1;
        }
        let col_start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        if i == col_start {
            return None;
        }
        let col_letters = &text[col_start..i];
        let row_abs = bytes.get(i) == Some(&b'$');
        if row_abs {
            i += 1;
        }
        let row_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == row_start || i != bytes.len() {
            return None;
        }
        let row: i64 = text[row_start..i].parse().ok()?;
        let col = letters_to_col(col_letters)?;
        let row = row - 1;
        let row = if row_abs { row } else { row - origin.row as i64 };
        let col = if col_abs { col } else { col - origin.col as i64 };
        Some(Coord::new(row, col, row_abs, col_abs))
    }

    pub fn try_parse_reference(
        &self,
        text: &str,
        sheet_lookup: &dyn Fn(&str) -> Option<SheetId>,
        origin: AbsAddress,
    ) -> Result<ResolvedName, LexError> {
        let (sheet_name, rest) = Self::split_sheet(text);
        let sheet = match sheet_name {
            Some(name) => match sheet_lookup(name) {
                Some(id) => id,
                None => return Ok(ResolvedName::Invalid),
            },
            None => origin.sheet,
        };

        if let Some((lhs, rhs)) = rest.split_once(':') {
            let first = Self::parse_cell(lhs, origin).ok_or_else(|| LexError::InvalidReference(text.to_string()))?;
            let last = Self::parse_cell(rhs, origin).ok_or_else(|| LexError::InvalidReference(text.to_string()))?;
            return Ok(ResolvedName::Range(Address::new(sheet, first), Address::new(sheet, last)));
        }

        match Self::parse_cell(rest, origin) {
            Some(coord) => Ok(ResolvedName::Cell(Address::new(sheet, coord))),
            None => Err(LexError::InvalidReference(text.to_string())),
        }
    }
}

impl NameResolver for ExcelA1Resolver {
    fn resolve(&self, text: &str, origin: AbsAddress, sheet_lookup: &dyn Fn(&str) -> Option<SheetId>) -> ResolvedName {
        match self.try_parse_reference(text, sheet_lookup, origin) {
            Ok(name) => name,
            Err(_) => {
                if text.ends_with('(') {
                    ResolvedName::Function(text.trim_end_matches('(').to_string())
                } else {
                    ResolvedName::NamedExpression(text.to_string())
                }
            }
        }
    }

    fn get_name(&self, reference: &ResolvedName, origin: AbsAddress, with_sheet_prefix: bool) -> String {
        let fmt_addr = |addr: &Address| -> String {
            let abs = addr.resolve(origin);
            let prefix = addr.coord.col_abs().then(|| "$").unwrap_or("");
            let row_prefix = addr.coord.row_abs().then(|| "$").unwrap_or("");
            format!(
                "{}{}{}{}",
                prefix,
                gridflow_common::address::col_to_letters(abs.col),
                row_prefix,
                abs.row + 1
            )
        };
        match reference {
            ResolvedName::Cell(addr) => {
                let mut s = String::new();
                if with_sheet_prefix {
                    s.push_str(&format!("Sheet{}!", addr.sheet));
                }
                s.push_str(&fmt_addr(addr));
                s
            }
            ResolvedName::Range(first, last) => {
                let mut s = String::new();
                if with_sheet_prefix {
                    s.push_str(&format!("Sheet{}!", first.sheet));
                }
                s.push_str(&fmt_addr(first));
                s.push(':');
                s.push_str(&fmt_addr(last));
                s
            }
            ResolvedName::NamedExpression(name) => name.clone(),
            ResolvedName::Function(name) => format!("{name}("),
            ResolvedName::Invalid => "#NAME?".to_string(),
        }
    }
}

fn letters_to_col(letters: &str) -> Option<i64> {
    if letters.is_empty() || !letters.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    let mut col: i64 = 0;
    for b in letters.bytes() {
        col = col * 26 + (b.to_ascii_uppercase() - b'A') as i64 + 1;
    }
    Some(col - 1)
}
