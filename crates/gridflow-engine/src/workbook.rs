//! The workbook facade: the single entry point a host embeds against. Ties
//! together the cell store, dirty-cell tracker, named expressions, and
//! function table into one `calculate` pipeline.

use std::sync::Arc;

use gridflow_common::{AbsAddress, AbsRange, CellValue, EngineError, FormulaError, SheetId};
use gridflow_parse::FormulaToken;

use crate::cell::{TokenStore, WaitPolicy, WaitPolicyCell};
use crate::config::EngineConfig;
use crate::functions::FunctionTable;
use crate::named::NamedExpressionTable;
use crate::pool::StringPool;
use crate::queue::{self, CtxParts};
use crate::sort;
use crate::store::{CellStore, CellType};
use crate::tracker::DirtyCellTracker;

/// A read-only snapshot of one cell, valid until the next workbook mutation.
pub struct CellAccess {
    pub cell_type: CellType,
    pub numeric: f64,
    pub boolean: bool,
    pub string: String,
    pub string_id: u32,
    pub is_formula_cell: bool,
    pub formula_result: Option<CellValue>,
    pub error_value: Option<FormulaError>,
}

pub struct Workbook {
    store: CellStore,
    tracker: DirtyCellTracker,
    named: NamedExpressionTable,
    functions: FunctionTable,
    modified: Vec<AbsRange>,
    config: EngineConfig,
}

impl Workbook {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            store: CellStore::new(
                config.default_rows,
                config.default_cols,
                Arc::new(StringPool::new()),
                Arc::new(WaitPolicyCell::default()),
            ),
            tracker: DirtyCellTracker::new(),
            named: NamedExpressionTable::new(),
            functions: FunctionTable::with_builtins(),
            modified: Vec::new(),
            config,
        }
    }

    pub fn functions_mut(&mut self) -> &mut FunctionTable {
        &mut self.functions
    }

    pub fn named_mut(&mut self) -> &mut NamedExpressionTable {
        &mut self.named
    }

    pub fn append_sheet(&mut self, name: impl Into<String>) -> SheetId {
        self.store.append_sheet(name.into())
    }

    pub fn set_sheet_name(&mut self, sheet: SheetId, name: impl Into<String>) -> Result<(), EngineError> {
        self.store.rename_sheet(sheet, name.into())
    }

    /// Deregisters the listener edges of whatever formula (if any) currently
    /// occupies `addr`, keyed by its group's origin and full rectangle. A
    /// non-origin member of a group is left alone — the origin is always
    /// among the addresses a group-wide overwrite visits.
    fn deregister_if_formula(&mut self, addr: AbsAddress) {
        let Some(old) = self.store.get_formula(addr) else {
            return;
        };
        if !old.is_origin() {
            return;
        }
        let group_range = AbsRange::new(
            old.address,
            AbsAddress::new(old.address.sheet, old.address.row + old.status.rows - 1, old.address.col + old.status.cols - 1),
        );
        for dst in reference_footprint(&old.tokens, old.address) {
            self.tracker.remove(group_range, dst);
        }
        if self.functions.is_volatile_in(&old.tokens) {
            self.tracker.remove_volatile(old.address);
        }
    }

    pub fn set_numeric_cell(&mut self, addr: AbsAddress, v: f64) {
        self.deregister_if_formula(addr);
        self.store.set_numeric(addr, v);
        self.modified.push(addr.as_range());
    }

    pub fn set_boolean_cell(&mut self, addr: AbsAddress, v: bool) {
        self.deregister_if_formula(addr);
        self.store.set_boolean(addr, v);
        self.modified.push(addr.as_range());
    }

    pub fn set_string_cell(&mut self, addr: AbsAddress, v: &str) {
        self.deregister_if_formula(addr);
        self.store.set_string(addr, v);
        self.modified.push(addr.as_range());
    }

    pub fn empty_cell(&mut self, addr: AbsAddress) {
        self.deregister_if_formula(addr);
        self.store.clear(addr);
        self.modified.push(addr.as_range());
    }

    pub fn set_formula_cell(&mut self, addr: AbsAddress, tokens: Vec<FormulaToken>, result: Option<CellValue>) {
        self.deregister_if_formula(addr);
        let tokens: TokenStore = Arc::from(tokens);
        for dst in reference_footprint(&tokens, addr) {
            let _ = self.tracker.add(addr.as_range(), dst);
        }
        if self.functions.is_volatile_in(&tokens) {
            self.tracker.add_volatile(addr);
        }
        self.store.set_formula(addr, tokens, result);
        self.modified.push(addr.as_range());
    }

    pub fn set_grouped_formula_cells(
        &mut self,
        range: AbsRange,
        tokens: Vec<FormulaToken>,
        result: Option<Vec<CellValue>>,
    ) -> Result<(), EngineError> {
        for addr in range.iter_addresses() {
            self.deregister_if_formula(addr);
        }
        let tokens: TokenStore = Arc::from(tokens);
        self.store.set_grouped_formula(range, tokens.clone(), result)?;
        for dst in reference_footprint(&tokens, range.first) {
            let _ = self.tracker.add(range, dst);
        }
        if self.functions.is_volatile_in(&tokens) {
            self.tracker.add_volatile(range.first);
        }
        self.modified.push(range);
        Ok(())
    }

    pub fn get_cell_access(&self, addr: AbsAddress) -> CellAccess {
        let cell_type = self.store.get_type(addr);
        let value = self.store.get_value(addr);
        let (formula_result, error_value) = match &value {
            CellValue::Error(e) => (Some(value.clone()), Some(e.clone())),
            _ if cell_type == CellType::Formula => (Some(value.clone()), None),
            _ => (None, None),
        };
        CellAccess {
            cell_type,
            numeric: value.coerce_numeric(),
            boolean: value.is_truthy(),
            string: value.coerce_string(),
            string_id: self.store.get_string_id(addr),
            is_formula_cell: cell_type == CellType::Formula,
            formula_result,
            error_value,
        }
    }

    pub fn get_numeric_value(&self, addr: AbsAddress) -> f64 {
        self.store.get_numeric(addr)
    }

    pub fn get_string_value(&self, addr: AbsAddress) -> String {
        self.store.get_value(addr).coerce_string()
    }

    /// Interns a string literal for a caller assembling tokens with
    /// [`gridflow_parse::parse_formula`], whose `intern` callback needs
    /// somewhere to put `StringLit` ids.
    pub fn intern_string(&self, s: &str) -> u32 {
        self.store.strings.intern(s)
    }

    pub fn fill_down_cells(&mut self, src: AbsAddress, n: u32) -> Result<(), EngineError> {
        self.store.fill_down(src, n)?;
        self.modified.push(AbsRange::new(src, src.offset(n as i64, 0)));
        Ok(())
    }

    /// Runs the dirty set through the tracker, sorter, and interpret queue,
    /// flipping the workbook's wait policy to `block_until_done` for the
    /// duration and back to `throw_exception` on exit. Worker thread count
    /// comes from the `EngineConfig` passed to [`Workbook::new`]; `0` forces
    /// the serial fallback path.
    pub fn calculate(&mut self) {
        self.store.wait_policy.set(WaitPolicy::BlockUntilDone);
        let dirty = self.tracker.query_dirty_cells(&self.modified);
        let order = sort::topo_sort(&dirty, &self.store);
        let precedents = sort::build_precedents(&dirty, &self.store);
        let ctx_parts = CtxParts {
            functions: &self.functions,
            named: &self.named,
        };
        queue::run(&order, &precedents, &self.store, ctx_parts, self.config.threads());
        self.store.wait_policy.set(WaitPolicy::ThrowException);
        self.modified.clear();
    }

    pub fn sheet_count(&self) -> usize {
        self.store.sheet_count()
    }

    pub fn sheet_name(&self, sheet: SheetId) -> Option<&str> {
        self.store.sheet_name(sheet)
    }

    /// Looks up a sheet's id by name — the lookup a `sheet_lookup` closure
    /// passed to [`gridflow_parse::NameResolver::resolve`] needs.
    pub fn sheet_id_by_name(&self, name: &str) -> Option<SheetId> {
        self.store.sheet_id_by_name(name)
    }

    pub fn get_data_range(&self, sheet: SheetId) -> Option<AbsRange> {
        self.store.get_data_range(sheet)
    }
}

/// Every destination range a formula's tokens reference, resolved against
/// `origin`.
fn reference_footprint(tokens: &[FormulaToken], origin: AbsAddress) -> Vec<AbsRange> {
    let mut dsts = Vec::new();
    for tok in tokens {
        match tok {
            FormulaToken::SingleRef(addr) => dsts.push(addr.resolve(origin).as_range()),
            FormulaToken::RangeRef(a, b) => dsts.push(AbsRange::normalized(a.resolve(origin), b.resolve(origin))),
            _ => {}
        }
    }
    dsts
}

impl FunctionTable {
    fn is_volatile_in(&self, tokens: &[FormulaToken]) -> bool {
        tokens.iter().any(|t| matches!(t, FormulaToken::Function(name) if self.is_volatile(name)))
    }
}
