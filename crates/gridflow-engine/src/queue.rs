//! The parallel interpret queue: a manager thread hands topologically-ready
//! addresses out to a fixed pool of worker threads, tracking in-flight
//! dependents so a cell is only dispatched once every one of its precedents
//! (within the dirty set) has actually published a result.
//!
//! `threads == 0` runs the whole order on the calling thread instead of
//! paying for any thread spin-up — the common case for small recalculations.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex};

use gridflow_common::AbsAddress;
use gridflow_parse::FormulaToken;

use crate::interpret::{self, InterpretCtx};
use crate::store::CellStore;

/// Precomputed per-address scheduling info: how many of its precedents (in
/// this recalculation) haven't finished yet, and who is waiting on it.
struct Node {
    remaining: usize,
    dependents: Vec<AbsAddress>,
}

struct ManagerState {
    ready: VecDeque<AbsAddress>,
    nodes: HashMap<AbsAddress, Node>,
    in_flight: usize,
    done: HashSet<AbsAddress>,
}

/// Runs every address in `order` to completion, in parallel across
/// `threads` workers (or serially on the caller's thread when `threads ==
/// 0`), respecting the precedent edges implied by `order`'s own sequencing.
pub fn run(order: &[AbsAddress], precedents: &BTreeMap<AbsAddress, BTreeSet<AbsAddress>>, store: &CellStore, ctx_parts: CtxParts, threads: usize) {
    if threads == 0 {
        run_serial(order, store, ctx_parts);
        return;
    }

    let mut nodes: HashMap<AbsAddress, Node> = HashMap::new();
    for &addr in order {
        let remaining = precedents.get(&addr).map(|p| p.len()).unwrap_or(0);
        nodes.insert(addr, Node { remaining, dependents: Vec::new() });
    }
    for &addr in order {
        if let Some(pres) = precedents.get(&addr) {
            for &pre in pres {
                if let Some(n) = nodes.get_mut(&pre) {
                    n.dependents.push(addr);
                }
            }
        }
    }

    let ready: VecDeque<AbsAddress> = order.iter().copied().filter(|a| nodes[a].remaining == 0).collect();
    let total = order.len();
    let state = Mutex::new(ManagerState { ready, nodes, in_flight: 0, done: HashSet::new() });
    let cond = Condvar::new();
    let shared = Shared { state, cond, total };

    std::thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| worker_loop(&shared, store, &ctx_parts));
        }
    });
}

struct Shared {
    state: Mutex<ManagerState>,
    cond: Condvar,
    total: usize,
}

/// Borrowed handles the worker threads need to build an [`InterpretCtx`]
/// per cell without holding any lock across the actual computation.
pub struct CtxParts<'a> {
    pub functions: &'a crate::functions::FunctionTable,
    pub named: &'a crate::named::NamedExpressionTable,
}

fn worker_loop(shared: &Shared, store: &CellStore, ctx_parts: &CtxParts) {
    loop {
        let addr = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if let Some(addr) = state.ready.pop_front() {
                    state.in_flight += 1;
                    break Some(addr);
                }
                if state.done.len() == shared.total {
                    break None;
                }
                state = shared.cond.wait(state).unwrap();
            }
        };
        let Some(addr) = addr else { break };

        compute_one(addr, store, ctx_parts);

        let mut state = shared.state.lock().unwrap();
        state.in_flight -= 1;
        state.done.insert(addr);
        if let Some(node) = state.nodes.get(&addr) {
            let dependents = node.dependents.clone();
            for dep in dependents {
                if let Some(n) = state.nodes.get_mut(&dep) {
                    n.remaining -= 1;
                    if n.remaining == 0 {
                        state.ready.push_back(dep);
                    }
                }
            }
        }
        shared.cond.notify_all();
    }
}

fn run_serial(order: &[AbsAddress], store: &CellStore, ctx_parts: CtxParts) {
    for &addr in order {
        compute_one(addr, store, &ctx_parts);
    }
}

fn compute_one(addr: AbsAddress, store: &CellStore, ctx_parts: &CtxParts) {
    let Some(formula) = store.get_formula(addr) else {
        return;
    };
    if !formula.is_origin() {
        return;
    }
    let lookup = |a: AbsAddress| store.get_formula(a);
    if formula.mark_circular_if_unsafe(&lookup) {
        return;
    }
    let ctx = InterpretCtx {
        store,
        functions: ctx_parts.functions,
        named: ctx_parts.named,
    };
    let tokens: &[FormulaToken] = &formula.tokens;
    let values = interpret::run(tokens, &ctx, formula.address, formula.status.rows, formula.status.cols);
    formula.status.publish(values);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::WaitPolicyCell;
    use crate::functions::FunctionTable;
    use crate::named::NamedExpressionTable;
    use crate::pool::StringPool;
    use gridflow_common::{AbsAddress, Address, CellValue, Coord};
    use std::sync::Arc;

    fn new_store() -> CellStore {
        let mut s = CellStore::new(20, 20, Arc::new(StringPool::new()), Arc::new(WaitPolicyCell::default()));
        s.append_sheet("Sheet1".into());
        s
    }

    #[test]
    fn serial_fallback_computes_a_linear_chain() {
        let mut store = new_store();
        let a1 = AbsAddress::new(0, 0, 0);
        let a2 = AbsAddress::new(0, 1, 0);
        store.set_numeric(a1, 5.0);
        store.set_formula(
            a2,
            Arc::from(vec![FormulaToken::SingleRef(Address::new(0, Coord::new(-1, 0, false, false)))]),
            None,
        );
        let order = vec![a2];
        let precedents: BTreeMap<AbsAddress, BTreeSet<AbsAddress>> = BTreeMap::new();
        let functions = FunctionTable::with_builtins();
        let named = NamedExpressionTable::default();
        run(&order, &precedents, &store, CtxParts { functions: &functions, named: &named }, 0);
        assert_eq!(store.get_value(a2), CellValue::Number(5.0));
    }

    #[test]
    fn parallel_workers_compute_a_fan_in() {
        let mut store = new_store();
        let a1 = AbsAddress::new(0, 0, 0);
        let a2 = AbsAddress::new(0, 1, 0);
        let sum_cell = AbsAddress::new(0, 2, 0);
        store.set_numeric(a1, 3.0);
        store.set_numeric(a2, 4.0);
        store.set_formula(
            sum_cell,
            Arc::from(vec![
                FormulaToken::SingleRef(Address::new(0, Coord::new(-2, 0, false, false))),
                FormulaToken::Plus,
                FormulaToken::SingleRef(Address::new(0, Coord::new(-1, 0, false, false))),
            ]),
            None,
        );
        let order = vec![sum_cell];
        let precedents: BTreeMap<AbsAddress, BTreeSet<AbsAddress>> = BTreeMap::new();
        let functions = FunctionTable::with_builtins();
        let named = NamedExpressionTable::default();
        run(&order, &precedents, &store, CtxParts { functions: &functions, named: &named }, 2);
        assert_eq!(store.get_value(sum_cell), CellValue::Number(7.0));
    }
}
