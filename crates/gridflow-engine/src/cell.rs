//! Formula cells and their shared result cache.
//!
//! A group of cells sharing one token stream and one [`CalcStatus`] is how
//! array/matrix formulas (`MMULT`, grouped `SUM`, ...) are represented: every
//! member holds the same `Arc<CalcStatus>` plus its own `(row_offset,
//! col_offset)`. Only the origin member (offset `(0, 0)`) ever drives
//! `interpret`; the rest index into the cached matrix.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use gridflow_common::{AbsAddress, CellValue, EngineError};
use gridflow_parse::FormulaToken;

/// What a caller gets when it reads a formula result that isn't ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    ReturnImmediately,
    BlockUntilDone,
    ThrowException,
}

impl WaitPolicy {
    fn to_u8(self) -> u8 {
        match self {
            WaitPolicy::ReturnImmediately => 0,
            WaitPolicy::BlockUntilDone => 1,
            WaitPolicy::ThrowException => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => WaitPolicy::ReturnImmediately,
            1 => WaitPolicy::BlockUntilDone,
            _ => WaitPolicy::ThrowException,
        }
    }
}

/// Workbook-wide current wait policy, flipped to `block_until_done` for the
/// duration of `calculate` (§5) and back to `throw_exception` afterwards.
pub struct WaitPolicyCell(AtomicU8);

impl Default for WaitPolicyCell {
    fn default() -> Self {
        Self(AtomicU8::new(WaitPolicy::ThrowException.to_u8()))
    }
}

impl WaitPolicyCell {
    pub fn get(&self) -> WaitPolicy {
        WaitPolicy::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, policy: WaitPolicy) {
        self.0.store(policy.to_u8(), Ordering::Release);
    }
}

/// Shared parsed-token store for a formula or formula group.
pub type TokenStore = Arc<[FormulaToken]>;

struct CalcState {
    /// `None` = not computed. Length is always `rows * cols` once `Some`.
    result: Option<Vec<CellValue>>,
}

/// The shared, mutex-guarded result cache one or more [`FormulaCell`]s point at.
pub struct CalcStatus {
    state: Mutex<CalcState>,
    cond: Condvar,
    pub rows: u32,
    pub cols: u32,
}

impl CalcStatus {
    pub fn new(rows: u32, cols: u32) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(CalcState { result: None }),
            cond: Condvar::new(),
            rows,
            cols,
        })
    }

    /// Store a freshly computed matrix result and wake every waiter.
    pub fn publish(&self, values: Vec<CellValue>) {
        debug_assert_eq!(values.len(), (self.rows * self.cols) as usize);
        let mut state = self.state.lock().unwrap();
        state.result = Some(values);
        self.cond.notify_all();
    }

    /// Clear the cached result ahead of recomputation, waking anyone blocked
    /// on the old (now-stale) state so they re-test the predicate.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.result = None;
        self.cond.notify_all();
    }

    pub fn is_computed(&self) -> bool {
        self.state.lock().unwrap().result.is_some()
    }

    /// Read the cell at `(row_offset, col_offset)` within the group's cached
    /// matrix, applying `policy` when the result is not yet available.
    pub fn get(&self, row_offset: u32, col_offset: u32, policy: WaitPolicy) -> Result<CellValue, EngineError> {
        let idx = (row_offset * self.cols + col_offset) as usize;
        match policy {
            WaitPolicy::ReturnImmediately => {
                let state = self.state.lock().unwrap();
                Ok(state
                    .result
                    .as_ref()
                    .map(|r| r[idx].clone())
                    .unwrap_or(CellValue::Error(gridflow_common::FormulaError::new(
                        gridflow_common::FormulaErrorKind::NoValueAvailable,
                    ))))
            }
            WaitPolicy::ThrowException => {
                let state = self.state.lock().unwrap();
                state.result.as_ref().map(|r| r[idx].clone()).ok_or(EngineError::ResultNotAvailable)
            }
            WaitPolicy::BlockUntilDone => {
                let mut state = self.state.lock().unwrap();
                while state.result.is_none() {
                    state = self.cond.wait(state).unwrap();
                }
                Ok(state.result.as_ref().unwrap()[idx].clone())
            }
        }
    }
}

/// One cell's membership in a formula (or formula group).
pub struct FormulaCell {
    pub tokens: TokenStore,
    pub status: Arc<CalcStatus>,
    /// This cell's own absolute position — the origin against which its
    /// relative reference tokens resolve when it is the one interpreting.
    pub address: AbsAddress,
    pub row_offset: u32,
    pub col_offset: u32,
}

impl FormulaCell {
    pub fn is_origin(&self) -> bool {
        self.row_offset == 0 && self.col_offset == 0
    }

    pub fn get_result_cache(&self, policy: WaitPolicy) -> Result<CellValue, EngineError> {
        self.status.get(self.row_offset, self.col_offset, policy)
    }

    pub fn reset(&self) {
        self.status.reset();
    }

    /// Walks this cell's own single-ref tokens and, for each referenced
    /// formula cell, recursively confirms it is not part of a reference
    /// cycle back to this cell. On detecting one, marks this cell's status
    /// `error(ref_cycle)` (origin only) and returns `false`.
    ///
    /// Mirrors the `check_circular` / `is_circular_safe` /
    /// `mark_circular_if_unsafe` split of the engine this design is based on.
    pub fn mark_circular_if_unsafe(&self, lookup: &dyn Fn(AbsAddress) -> Option<Arc<FormulaCell>>) -> bool {
        if !self.is_origin() {
            return false;
        }
        let mut visiting = HashSet::new();
        if !self.check_circular(lookup, &mut visiting) {
            self.status.publish(vec![
                CellValue::Error(gridflow_common::FormulaError::ref_cycle());
                (self.status.rows * self.status.cols) as usize
            ]);
            true
        } else {
            false
        }
    }

    fn check_circular(&self, lookup: &dyn Fn(AbsAddress) -> Option<Arc<FormulaCell>>, visiting: &mut HashSet<AbsAddress>) -> bool {
        if !visiting.insert(self.address) {
            return false;
        }
        let safe = self.tokens.iter().all(|tok| match tok {
            FormulaToken::SingleRef(addr) => {
                let resolved = addr.resolve(self.address);
                if resolved == self.address {
                    false
                } else {
                    self.is_circular_safe(resolved, lookup, visiting)
                }
            }
            FormulaToken::RangeRef(a, b) => {
                let range = gridflow_common::AbsRange::normalized(a.resolve(self.address), b.resolve(self.address));
                !range.contains(self.address)
            }
            _ => true,
        });
        visiting.remove(&self.address);
        safe
    }

    fn is_circular_safe(
        &self,
        target: AbsAddress,
        lookup: &dyn Fn(AbsAddress) -> Option<Arc<FormulaCell>>,
        visiting: &mut HashSet<AbsAddress>,
    ) -> bool {
        match lookup(target) {
            None => true,
            Some(cell) => {
                if cell.status.is_computed() {
                    return true;
                }
                if !visiting.insert(target) {
                    return false;
                }
                let safe = cell.check_circular(lookup, visiting);
                visiting.remove(&target);
                safe
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridflow_common::Address;

    fn addr(row: u32, col: u32) -> AbsAddress {
        AbsAddress::new(0, row, col)
    }

    #[test]
    fn origin_publishes_and_non_origin_reads_same_matrix() {
        let status = CalcStatus::new(1, 2);
        let origin = FormulaCell {
            tokens: Arc::from(vec![]),
            status: status.clone(),
            address: addr(0, 0),
            row_offset: 0,
            col_offset: 0,
        };
        let member = FormulaCell {
            tokens: Arc::from(vec![]),
            status: status.clone(),
            address: addr(0, 1),
            row_offset: 0,
            col_offset: 1,
        };
        status.publish(vec![CellValue::Number(1.0), CellValue::Number(2.0)]);
        assert_eq!(
            origin.get_result_cache(WaitPolicy::ThrowException).unwrap(),
            CellValue::Number(1.0)
        );
        assert_eq!(
            member.get_result_cache(WaitPolicy::ThrowException).unwrap(),
            CellValue::Number(2.0)
        );
    }

    #[test]
    fn throw_exception_policy_fails_before_publish() {
        let status = CalcStatus::new(1, 1);
        let cell = FormulaCell {
            tokens: Arc::from(vec![]),
            status,
            address: addr(0, 0),
            row_offset: 0,
            col_offset: 0,
        };
        assert_eq!(
            cell.get_result_cache(WaitPolicy::ThrowException),
            Err(EngineError::ResultNotAvailable)
        );
    }

    #[test]
    fn direct_self_reference_is_marked_circular() {
        let status = CalcStatus::new(1, 1);
        let cell = FormulaCell {
            tokens: Arc::from(vec![FormulaToken::SingleRef(Address::new(
                0,
                gridflow_common::Coord::new(0, 0, true, true),
            ))]),
            status,
            address: addr(0, 0),
            row_offset: 0,
            col_offset: 0,
        };
        let lookup = |_: AbsAddress| None;
        assert!(cell.mark_circular_if_unsafe(&lookup));
        assert_eq!(
            cell.get_result_cache(WaitPolicy::ThrowException).unwrap(),
            CellValue::Error(gridflow_common::FormulaError::ref_cycle())
        );
    }
}
