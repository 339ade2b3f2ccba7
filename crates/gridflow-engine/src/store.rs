//! The cell store: sheets as column-major blocked vectors.
//!
//! Each column is a sparse, row-ordered map from row index to a tagged cell
//! value — the idiomatic equivalent of the source's run-length "block" scheme
//! (a `BTreeMap` entry already *is* a one-row block; adjacent same-tag runs
//! collapse naturally under iteration without needing an explicit merge
//! pass). Unwritten rows read back as `CellType::Empty` without occupying a
//! slot.

use std::collections::BTreeMap;
use std::sync::Arc;

use gridflow_common::{AbsAddress, AbsRange, CellValue, EngineError, SheetId};
use rustc_hash::FxHashMap;

use crate::cell::{CalcStatus, FormulaCell, TokenStore, WaitPolicy, WaitPolicyCell};
use crate::pool::StringPool;

#[derive(Clone)]
pub enum StoredCell {
    Boolean(bool),
    Number(f64),
    String(u32),
    Formula(Arc<FormulaCell>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Empty,
    Boolean,
    Numeric,
    String,
    Formula,
}

#[derive(Default)]
struct Column {
    cells: BTreeMap<u32, StoredCell>,
}

impl Column {
    fn get(&self, row: u32) -> Option<&StoredCell> {
        self.cells.get(&row)
    }

    fn set(&mut self, row: u32, cell: StoredCell) {
        self.cells.insert(row, cell);
    }

    fn clear(&mut self, row: u32) -> Option<StoredCell> {
        self.cells.remove(&row)
    }

    fn bounds(&self) -> Option<(u32, u32)> {
        let first = *self.cells.keys().next()?;
        let last = *self.cells.keys().next_back()?;
        Some((first, last))
    }
}

pub struct Sheet {
    pub name: String,
    columns: Vec<Column>,
}

pub struct CellStore {
    pub rows: u32,
    pub cols: u32,
    sheets: Vec<Sheet>,
    /// Name-to-id index kept in lockstep with `sheets`, so a rename's
    /// conflict check and a lookup by name don't need a linear scan.
    names: FxHashMap<String, SheetId>,
    pub strings: Arc<StringPool>,
    pub wait_policy: Arc<WaitPolicyCell>,
}

impl CellStore {
    pub fn new(rows: u32, cols: u32, strings: Arc<StringPool>, wait_policy: Arc<WaitPolicyCell>) -> Self {
        Self {
            rows,
            cols,
            sheets: Vec::new(),
            names: FxHashMap::default(),
            strings,
            wait_policy,
        }
    }

    pub fn append_sheet(&mut self, name: String) -> SheetId {
        let id = self.sheets.len() as SheetId;
        self.names.insert(name.clone(), id);
        self.sheets.push(Sheet {
            name,
            columns: (0..self.cols).map(|_| Column::default()).collect(),
        });
        id
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn sheet_name(&self, id: SheetId) -> Option<&str> {
        self.sheets.get(id as usize).map(|s| s.name.as_str())
    }

    pub fn sheet_id_by_name(&self, name: &str) -> Option<SheetId> {
        self.names.get(name).copied()
    }

    pub fn rename_sheet(&mut self, id: SheetId, name: String) -> Result<(), EngineError> {
        if self.names.contains_key(&name) {
            return Err(EngineError::SheetNameConflict(name));
        }
        let sheet = self
            .sheets
            .get_mut(id as usize)
            .ok_or(EngineError::UnknownSheet(id as usize))?;
        self.names.remove(&sheet.name);
        sheet.name = name.clone();
        self.names.insert(name, id);
        Ok(())
    }

    fn sheet(&self, sheet: SheetId) -> Option<&Sheet> {
        self.sheets.get(sheet as usize)
    }

    fn sheet_mut(&mut self, sheet: SheetId) -> Option<&mut Sheet> {
        self.sheets.get_mut(sheet as usize)
    }

    pub fn set(&mut self, addr: AbsAddress, cell: StoredCell) {
        if let Some(sheet) = self.sheet_mut(addr.sheet) {
            sheet.columns[addr.col as usize].set(addr.row, cell);
        }
    }

    pub fn clear(&mut self, addr: AbsAddress) -> Option<StoredCell> {
        self.sheet_mut(addr.sheet).and_then(|s| s.columns[addr.col as usize].clear(addr.row))
    }

    pub fn set_numeric(&mut self, addr: AbsAddress, v: f64) {
        self.set(addr, StoredCell::Number(v));
    }

    pub fn set_boolean(&mut self, addr: AbsAddress, v: bool) {
        self.set(addr, StoredCell::Boolean(v));
    }

    pub fn set_string(&mut self, addr: AbsAddress, s: &str) {
        let id = self.strings.intern(s);
        self.set(addr, StoredCell::String(id));
    }

    pub fn set_formula(&mut self, addr: AbsAddress, tokens: TokenStore, result: Option<CellValue>) {
        let status = CalcStatus::new(1, 1);
        if let Some(v) = result {
            status.publish(vec![v]);
        }
        let cell = Arc::new(FormulaCell {
            tokens,
            status,
            address: addr,
            row_offset: 0,
            col_offset: 0,
        });
        self.set(addr, StoredCell::Formula(cell));
    }

    /// Places one shared formula group across `range`. The caller is
    /// responsible for clearing the rectangle first (§9 open question:
    /// atomic pre-clear is not performed here).
    ///
    /// A pre-seeded `result` must carry exactly `range.rows() * range.cols()`
    /// values, one per group member in row-major order.
    pub fn set_grouped_formula(
        &mut self,
        range: AbsRange,
        tokens: TokenStore,
        result: Option<Vec<CellValue>>,
    ) -> Result<(), EngineError> {
        let rows = range.rows();
        let cols = range.cols();
        let status = CalcStatus::new(rows, cols);
        if let Some(values) = result {
            if values.len() as u32 != rows * cols {
                return Err(EngineError::GroupedResultShapeMismatch);
            }
            status.publish(values);
        }
        for (i, row) in (range.first.row..=range.last.row).enumerate() {
            for (j, col) in (range.first.col..=range.last.col).enumerate() {
                let cell = Arc::new(FormulaCell {
                    tokens: tokens.clone(),
                    status: status.clone(),
                    address: AbsAddress::new(range.first.sheet, row, col),
                    row_offset: i as u32,
                    col_offset: j as u32,
                });
                self.set(AbsAddress::new(range.first.sheet, row, col), StoredCell::Formula(cell));
            }
        }
        Ok(())
    }

    pub fn get_type(&self, addr: AbsAddress) -> CellType {
        match self.sheet(addr.sheet).and_then(|s| s.columns[addr.col as usize].get(addr.row)) {
            None => CellType::Empty,
            Some(StoredCell::Boolean(_)) => CellType::Boolean,
            Some(StoredCell::Number(_)) => CellType::Numeric,
            Some(StoredCell::String(_)) => CellType::String,
            Some(StoredCell::Formula(_)) => CellType::Formula,
        }
    }

    pub fn get_formula(&self, addr: AbsAddress) -> Option<Arc<FormulaCell>> {
        match self.sheet(addr.sheet)?.columns[addr.col as usize].get(addr.row)? {
            StoredCell::Formula(f) => Some(f.clone()),
            _ => None,
        }
    }

    /// Reads the resolved scalar value at `addr`, blocking on an uncomputed
    /// formula cell per the store's current wait policy.
    pub fn get_value(&self, addr: AbsAddress) -> CellValue {
        match self.sheet(addr.sheet).and_then(|s| s.columns[addr.col as usize].get(addr.row)) {
            None => CellValue::Empty,
            Some(StoredCell::Boolean(b)) => CellValue::Boolean(*b),
            Some(StoredCell::Number(n)) => CellValue::Number(*n),
            Some(StoredCell::String(id)) => CellValue::Text(self.strings.get(*id).unwrap_or_default()),
            Some(StoredCell::Formula(f)) => self.read_formula_result(f),
        }
    }

    fn read_formula_result(&self, f: &Arc<FormulaCell>) -> CellValue {
        match f.get_result_cache(self.wait_policy.get()) {
            Ok(v) => v,
            Err(_) => CellValue::Error(gridflow_common::FormulaError::new(
                gridflow_common::FormulaErrorKind::NoValueAvailable,
            )),
        }
    }

    pub fn get_numeric(&self, addr: AbsAddress) -> f64 {
        self.get_value(addr).coerce_numeric()
    }

    pub fn get_boolean(&self, addr: AbsAddress) -> bool {
        self.get_value(addr).is_truthy()
    }

    pub fn get_string_id(&self, addr: AbsAddress) -> u32 {
        match self.get_value(addr) {
            CellValue::Text(s) => self.strings.intern(&s),
            other => self.strings.intern(&other.coerce_string()),
        }
    }

    /// Reads a range of cells, row-major, for function arguments.
    pub fn get_range_values(&self, range: AbsRange) -> Vec<CellValue> {
        let mut out = Vec::with_capacity((range.rows() * range.cols()) as usize);
        for row in range.first.row..=range.last.row {
            for col in range.first.col..=range.last.col {
                out.push(self.get_value(AbsAddress::new(range.first.sheet, row, col)));
            }
        }
        out
    }

    pub fn fill_down(&mut self, src: AbsAddress, n: u32) -> Result<(), EngineError> {
        let value = self
            .sheet(src.sheet)
            .and_then(|s| s.columns[src.col as usize].get(src.row))
            .cloned();
        if matches!(value, Some(StoredCell::Formula(_))) {
            return Err(EngineError::FillDownFormulaUnsupported);
        }
        for i in 1..=n {
            let dst = src.offset(i as i64, 0);
            match &value {
                Some(cell) => self.set(dst, cell.clone()),
                None => {
                    self.clear(dst);
                }
            }
        }
        Ok(())
    }

    /// Tightest bounding rectangle containing every non-empty row of every
    /// column, or `None` for an all-empty sheet.
    pub fn get_data_range(&self, sheet: SheetId) -> Option<AbsRange> {
        let s = self.sheet(sheet)?;
        let mut min_row = u32::MAX;
        let mut max_row = 0u32;
        let mut min_col = u32::MAX;
        let mut max_col = 0u32;
        let mut any = false;
        for (col_idx, col) in s.columns.iter().enumerate() {
            if let Some((first, last)) = col.bounds() {
                any = true;
                min_row = min_row.min(first);
                max_row = max_row.max(last);
                min_col = min_col.min(col_idx as u32);
                max_col = max_col.max(col_idx as u32);
            }
        }
        if !any {
            return None;
        }
        Some(AbsRange::new(
            AbsAddress::new(sheet, min_row, min_col),
            AbsAddress::new(sheet, max_row, max_col),
        ))
    }

    /// A lazy row-major or column-major walk over `sub_range`, yielding
    /// empty-tagged items for unwritten positions so callers can observe
    /// sheet geometry.
    pub fn iterate(&self, sub_range: AbsRange, row_major: bool) -> Vec<(AbsAddress, CellValue)> {
        let mut out = Vec::new();
        if row_major {
            for row in sub_range.first.row..=sub_range.last.row {
                for col in sub_range.first.col..=sub_range.last.col {
                    let addr = AbsAddress::new(sub_range.first.sheet, row, col);
                    out.push((addr, self.get_value(addr)));
                }
            }
        } else {
            for col in sub_range.first.col..=sub_range.last.col {
                for row in sub_range.first.row..=sub_range.last.row {
                    let addr = AbsAddress::new(sub_range.first.sheet, row, col);
                    out.push((addr, self.get_value(addr)));
                }
            }
        }
        out
    }
}
