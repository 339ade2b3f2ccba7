//! The dirty-cell tracker: a per-sheet spatial index of listener relations
//! (`source range depends on destination range`) plus a flat volatile set.
//!
//! The R-tree only ever stores destination rectangles for fast overlap
//! queries; the authoritative source-set payload for each rectangle lives in
//! a parallel `FxHashMap` keyed by the rectangle itself, since a destination
//! may be re-inserted with new sources and `rstar` doesn't support mutating a
//! stored object's payload in place.

use std::collections::BTreeSet;

use gridflow_common::{AbsAddress, AbsRange, ListenerError};
use rstar::{RTree, RTreeObject, AABB};
use rustc_hash::FxHashMap;

#[derive(Clone, Copy, Debug, PartialEq)]
struct DestNode {
    rect: AbsRange,
}

impl RTreeObject for DestNode {
    type Envelope = AABB<[i64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.rect.first.row as i64, self.rect.first.col as i64],
            [self.rect.last.row as i64, self.rect.last.col as i64],
        )
    }
}

#[derive(Default)]
struct SheetIndex {
    tree: RTree<DestNode>,
    payload: FxHashMap<AbsRange, BTreeSet<AbsRange>>,
}

#[derive(Default)]
pub struct DirtyCellTracker {
    sheets: FxHashMap<u16, SheetIndex>,
    volatile: BTreeSet<AbsAddress>,
}

impl DirtyCellTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, src: AbsRange, dst: AbsRange) -> Result<(), ListenerError> {
        if !dst.is_valid() {
            return Err(ListenerError::MultiSheetDestination);
        }
        let idx = self.sheets.entry(dst.first.sheet).or_default();
        let newly = !idx.payload.contains_key(&dst);
        let set = idx.payload.entry(dst).or_default();
        let inserted = set.insert(src);
        if newly && inserted {
            idx.tree.insert(DestNode { rect: dst });
        }
        Ok(())
    }

    pub fn remove(&mut self, src: AbsRange, dst: AbsRange) {
        let Some(idx) = self.sheets.get_mut(&dst.first.sheet) else {
            tracing::warn!(?src, ?dst, "remove: no listener entry for destination");
            return;
        };
        let Some(set) = idx.payload.get_mut(&dst) else {
            tracing::warn!(?src, ?dst, "remove: destination not tracked");
            return;
        };
        if !set.remove(&src) {
            tracing::warn!(?src, ?dst, "remove: source not registered against destination");
            return;
        }
        if set.is_empty() {
            idx.payload.remove(&dst);
            idx.tree.remove(&DestNode { rect: dst });
        }
    }

    pub fn add_volatile(&mut self, addr: AbsAddress) {
        self.volatile.insert(addr);
    }

    pub fn remove_volatile(&mut self, addr: AbsAddress) {
        self.volatile.remove(&addr);
    }

    /// Forward-transitive closure of everything that depends on
    /// `modified_cells`, seeded with every volatile address.
    pub fn query_dirty_cells(&self, modified_cells: &[AbsRange]) -> BTreeSet<AbsAddress> {
        let mut result: BTreeSet<AbsAddress> = self.volatile.iter().copied().collect();
        let mut worklist: Vec<AbsRange> = modified_cells.to_vec();

        while let Some(range) = worklist.pop() {
            let Some(idx) = self.sheets.get(&range.first.sheet) else {
                continue;
            };
            let envelope = AABB::from_corners(
                [range.first.row as i64, range.first.col as i64],
                [range.last.row as i64, range.last.col as i64],
            );
            for node in idx.tree.locate_in_envelope_intersecting(&envelope) {
                let Some(sources) = idx.payload.get(&node.rect) else {
                    continue;
                };
                for src in sources {
                    if result.insert(src.first) {
                        worklist.push(*src);
                    }
                }
            }
        }
        result
    }
}
