//! Universal properties checked with randomized inputs rather than fixed
//! examples — set/get round-tripping, tracker add/remove symmetry, and
//! fill-down's boundary.

use gridflow_common::AbsAddress;
use gridflow_engine::{EngineConfig, Workbook};
use proptest::prelude::*;

fn addr_strategy() -> impl Strategy<Value = AbsAddress> {
    (0u32..40, 0u32..40).prop_map(|(row, col)| AbsAddress::new(0, row, col))
}

proptest! {
    #[test]
    fn set_numeric_then_get_round_trips(addr in addr_strategy(), v in -1.0e9f64..1.0e9) {
        let mut wb = Workbook::new(EngineConfig::new().with_sheet_bounds(40, 40).with_threads(0));
        wb.append_sheet("Sheet1");
        wb.set_numeric_cell(addr, v);
        prop_assert_eq!(wb.get_numeric_value(addr), v);
    }

    #[test]
    fn fill_down_replicates_value_and_stops_at_n(
        addr in (0u32..20, 0u32..20).prop_map(|(r, c)| AbsAddress::new(0, r, c)),
        v in -1.0e6f64..1.0e6,
        n in 1u32..10,
    ) {
        let mut wb = Workbook::new(EngineConfig::new().with_sheet_bounds(40, 40).with_threads(0));
        wb.append_sheet("Sheet1");
        wb.set_numeric_cell(addr, v);
        wb.fill_down_cells(addr, n).unwrap();
        for i in 1..=n {
            prop_assert_eq!(wb.get_numeric_value(addr.offset(i as i64, 0)), v);
        }
        prop_assert_eq!(
            wb.get_cell_access(addr.offset((n + 1) as i64, 0)).cell_type,
            gridflow_engine::CellType::Empty
        );
    }
}

#[test]
fn no_reference_formula_equals_its_own_interpretation() {
    let mut wb = Workbook::new(EngineConfig::new().with_sheet_bounds(10, 10).with_threads(0));
    wb.append_sheet("Sheet1");
    let addr = AbsAddress::new(0, 0, 0);
    wb.set_formula_cell(
        addr,
        vec![
            gridflow_parse::FormulaToken::Value(2.0),
            gridflow_parse::FormulaToken::Plus,
            gridflow_parse::FormulaToken::Value(3.0),
        ],
        None,
    );
    wb.calculate();
    assert_eq!(wb.get_numeric_value(addr), 5.0);
}
