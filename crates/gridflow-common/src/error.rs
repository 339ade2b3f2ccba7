//! Formula-resident errors and the synchronous, call-site error families.
//!
//! `FormulaError` lives inside a cell's result cache and is visible through
//! `CellAccess`; it never escapes `calculate` as a Rust `Result::Err`. The
//! `thiserror`-derived enums below are the opposite: they are returned
//! synchronously from the API calls that can fail outside of any formula
//! (sheet rename, listener registration, ...).

use std::fmt;

use thiserror::Error;

/// Error codes a formula result can carry, per the engine's formula-function
/// contract (`spec.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormulaErrorKind {
    /// Sentinel used by code paths that need an "error" value meaning
    /// "no error" (e.g. a freshly-reset result slot inspected mid-calc).
    NoError,
    RefCycle,
    DivisionByZero,
    InvalidExpression,
    NameNotFound,
    NoRangeIntersection,
    InvalidValueType,
    NoValueAvailable,
    Other,
}

impl fmt::Display for FormulaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoError => "",
            Self::RefCycle => "#REF!",
            Self::DivisionByZero => "#DIV/0!",
            Self::InvalidExpression => "#NUM!",
            Self::NameNotFound => "#NAME?",
            Self::NoRangeIntersection => "#NULL!",
            Self::InvalidValueType => "#VALUE!",
            Self::NoValueAvailable => "#N/A",
            Self::Other => "#ERR!",
        })
    }
}

/// A formula-resident error: a kind plus an optional human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormulaError {
    pub kind: FormulaErrorKind,
    pub message: Option<String>,
}

impl FormulaError {
    pub fn new(kind: FormulaErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }

    pub fn ref_cycle() -> Self {
        Self::new(FormulaErrorKind::RefCycle)
    }

    pub fn division_by_zero() -> Self {
        Self::new(FormulaErrorKind::DivisionByZero)
    }
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FormulaError {}

/// Synchronous errors raised by the cell store / workbook document facade.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("sheet name '{0}' is already in use")]
    SheetNameConflict(String),

    #[error("sheet bounds are locked once a sheet exists")]
    SheetSizeLocked,

    #[error("named expression '{0}' is not a valid identifier")]
    InvalidNamedExpressionName(String),

    #[error("fill-down of formula cells is not supported")]
    FillDownFormulaUnsupported,

    #[error("grouped formula result shape does not match the target range")]
    GroupedResultShapeMismatch,

    #[error("formula result is not available under the current wait policy")]
    ResultNotAvailable,

    #[error("sheet index {0} is out of range")]
    UnknownSheet(usize),
}

/// Synchronous errors raised by the dirty-cell tracker's listener index.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListenerError {
    #[error("destination range spans more than one sheet")]
    MultiSheetDestination,

    #[error("sheet index is negative")]
    NegativeSheetIndex,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_error_kind_renders_excel_style_text() {
        assert_eq!(FormulaErrorKind::RefCycle.to_string(), "#REF!");
        assert_eq!(FormulaErrorKind::NoError.to_string(), "");
    }

    #[test]
    fn engine_error_messages_are_human_readable() {
        let e = EngineError::SheetNameConflict("Sheet1".into());
        assert!(e.to_string().contains("Sheet1"));
    }
}
