//! Address and model iterators: lightweight walks over a range's addresses,
//! and over a sheet's live cells, without materializing either into a `Vec`
//! up front.

use gridflow_common::{AbsAddress, AbsRange, CellValue};

use crate::store::{CellStore, CellType};

/// Walks every address in a range, row-major or column-major, forward or
/// reverse, yielding bare coordinates — no cell lookup.
pub struct AddressIterator {
    range: AbsRange,
    row_major: bool,
    reverse: bool,
    cursor: Option<(u32, u32)>,
    done: bool,
}

impl AddressIterator {
    pub fn new(range: AbsRange, row_major: bool, reverse: bool) -> Self {
        let start = if reverse {
            (range.last.row, range.last.col)
        } else {
            (range.first.row, range.first.col)
        };
        Self {
            range,
            row_major,
            reverse,
            cursor: Some(start),
            done: false,
        }
    }
}

impl Iterator for AddressIterator {
    type Item = AbsAddress;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let (row, col) = self.cursor?;
        let current = AbsAddress::new(self.range.first.sheet, row, col);

        self.cursor = advance(row, col, &self.range, self.row_major, self.reverse);
        if self.cursor.is_none() {
            self.done = true;
        }
        Some(current)
    }
}

fn advance(row: u32, col: u32, range: &AbsRange, row_major: bool, reverse: bool) -> Option<(u32, u32)> {
    if row_major {
        if !reverse {
            if col < range.last.col {
                Some((row, col + 1))
            } else if row < range.last.row {
                Some((row + 1, range.first.col))
            } else {
                None
            }
        } else if col > range.first.col {
            Some((row, col - 1))
        } else if row > range.first.row {
            Some((row - 1, range.last.col))
        } else {
            None
        }
    } else if !reverse {
        if row < range.last.row {
            Some((row + 1, col))
        } else if col < range.last.col {
            Some((range.first.row, col + 1))
        } else {
            None
        }
    } else if row > range.first.row {
        Some((row - 1, col))
    } else if col > range.first.col {
        Some((range.last.row, col - 1))
    } else {
        None
    }
}

/// A cell observed by [`ModelIterator`]: its address, its type tag, and its
/// resolved scalar value (empties carry [`CellValue::Empty`]).
pub struct ModelCell {
    pub address: AbsAddress,
    pub cell_type: CellType,
    pub value: CellValue,
}

/// Walks every address in a sub-range of a sheet, resolving each one against
/// the store as it goes, including unwritten (empty) positions.
pub struct ModelIterator<'a> {
    store: &'a CellStore,
    addresses: AddressIterator,
}

impl<'a> ModelIterator<'a> {
    pub fn new(store: &'a CellStore, range: AbsRange, row_major: bool) -> Self {
        Self {
            store,
            addresses: AddressIterator::new(range, row_major, false),
        }
    }
}

impl<'a> Iterator for ModelIterator<'a> {
    type Item = ModelCell;

    fn next(&mut self) -> Option<Self::Item> {
        let address = self.addresses.next()?;
        Some(ModelCell {
            address,
            cell_type: self.store.get_type(address),
            value: self.store.get_value(address),
        })
    }
}
