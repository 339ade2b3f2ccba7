//! Topological sort of the dirty set: white/gray/black depth-first ordering
//! over the precedent graph induced by each dirty formula cell's reference
//! tokens.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use gridflow_common::AbsAddress;
use gridflow_parse::FormulaToken;

use crate::store::CellStore;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Resolves `addr` to the address that actually appears as a key in `dirty`
/// (and in `build_precedents`' output): a formula cell's own address if it's
/// a group origin, or its group's origin address if it's a non-origin member
/// — `dirty`/the precedent map never carry a non-origin member as a key,
/// since the tracker registers and queries listeners by the group's full
/// rectangle, not by individual member address.
fn group_origin(addr: AbsAddress, store: &CellStore) -> AbsAddress {
    match store.get_formula(addr) {
        Some(f) if !f.is_origin() => addr.offset(-(f.row_offset as i64), -(f.col_offset as i64)),
        _ => addr,
    }
}

/// Builds `dep -> {pre, pre, ...}` from every dirty formula cell's tokens,
/// restricted to the dirty set itself.
pub fn build_precedents(dirty: &BTreeSet<AbsAddress>, store: &CellStore) -> BTreeMap<AbsAddress, BTreeSet<AbsAddress>> {
    let mut precedents: BTreeMap<AbsAddress, BTreeSet<AbsAddress>> = BTreeMap::new();
    for &dep in dirty {
        let Some(formula) = store.get_formula(dep) else {
            continue;
        };
        if !formula.is_origin() {
            continue;
        }
        let entry = precedents.entry(dep).or_default();
        for tok in formula.tokens.iter() {
            match tok {
                FormulaToken::SingleRef(addr) => {
                    let pre = group_origin(addr.resolve(formula.address), store);
                    if dirty.contains(&pre) {
                        entry.insert(pre);
                    }
                }
                FormulaToken::RangeRef(a, b) => {
                    let range =
                        gridflow_common::AbsRange::normalized(a.resolve(formula.address), b.resolve(formula.address));
                    for member in range.iter_addresses() {
                        let pre = group_origin(member, store);
                        if dirty.contains(&pre) {
                            entry.insert(pre);
                        }
                    }
                }
                _ => {}
            }
        }
    }
    precedents
}

/// Iterative-in-spirit DFS (implemented recursively for clarity — dirty sets
/// are bounded by workbook size, not adversarial input) producing a linear
/// order where every precedent precedes its dependents. Gray-on-gray
/// revisits are skipped rather than re-descended; the cells involved are left
/// for [`crate::cell::FormulaCell::mark_circular_if_unsafe`] to mark.
pub fn topo_sort(dirty: &BTreeSet<AbsAddress>, store: &CellStore) -> Vec<AbsAddress> {
    let precedents = build_precedents(dirty, store);
    let mut colors: HashMap<AbsAddress, Color> = dirty.iter().map(|&a| (a, Color::White)).collect();
    let mut output = Vec::with_capacity(dirty.len());

    fn visit(
        addr: AbsAddress,
        precedents: &BTreeMap<AbsAddress, BTreeSet<AbsAddress>>,
        colors: &mut HashMap<AbsAddress, Color>,
        output: &mut Vec<AbsAddress>,
    ) {
        match colors.get(&addr) {
            Some(Color::Black) | Some(Color::Gray) | None => return,
            Some(Color::White) => {}
        }
        colors.insert(addr, Color::Gray);
        if let Some(pres) = precedents.get(&addr) {
            for &pre in pres {
                visit(pre, precedents, colors, output);
            }
        }
        colors.insert(addr, Color::Black);
        output.push(addr);
    }

    for &addr in dirty {
        visit(addr, &precedents, &mut colors, &mut output);
    }
    output
}
