//! Named expressions: a workbook-global token stream per name, plus
//! per-sheet overrides that shadow the global one when resolved in that
//! sheet's context.
//!
//! Storing the already-parsed token stream (rather than formula text) means
//! the interpreter's inline-expansion pass (`crate::interpret::expand`) never
//! has to re-invoke the parser.

use std::collections::HashMap;

use gridflow_common::{EngineError, SheetId};
use gridflow_parse::FormulaToken;

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

#[derive(Default)]
pub struct NamedExpressionTable {
    global: HashMap<String, Vec<FormulaToken>>,
    sheet_local: HashMap<SheetId, HashMap<String, Vec<FormulaToken>>>,
}

impl NamedExpressionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_global(&mut self, name: &str, tokens: Vec<FormulaToken>) -> Result<(), EngineError> {
        if !is_valid_name(name) {
            return Err(EngineError::InvalidNamedExpressionName(name.to_string()));
        }
        self.global.insert(name.to_string(), tokens);
        Ok(())
    }

    pub fn define_sheet_local(&mut self, sheet: SheetId, name: &str, tokens: Vec<FormulaToken>) -> Result<(), EngineError> {
        if !is_valid_name(name) {
            return Err(EngineError::InvalidNamedExpressionName(name.to_string()));
        }
        self.sheet_local.entry(sheet).or_default().insert(name.to_string(), tokens);
        Ok(())
    }

    pub fn remove_global(&mut self, name: &str) {
        self.global.remove(name);
    }

    pub fn remove_sheet_local(&mut self, sheet: SheetId, name: &str) {
        if let Some(scope) = self.sheet_local.get_mut(&sheet) {
            scope.remove(name);
        }
    }

    /// Global-only lookup, used when no sheet context is available.
    pub fn get(&self, name: &str) -> Option<Vec<FormulaToken>> {
        self.global.get(name).cloned()
    }

    /// Sheet-local definitions shadow the global one of the same name.
    pub fn get_scoped(&self, name: &str, sheet: SheetId) -> Option<Vec<FormulaToken>> {
        if let Some(scope) = self.sheet_local.get(&sheet) {
            if let Some(tokens) = scope.get(name) {
                return Some(tokens.clone());
            }
        }
        self.global.get(name).cloned()
    }

    /// Every global name, sorted for deterministic iteration.
    pub fn global_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.global.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Every name local to `sheet`, sorted for deterministic iteration.
    pub fn sheet_local_names(&self, sheet: SheetId) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .sheet_local
            .get(&sheet)
            .map(|scope| scope.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }
}
