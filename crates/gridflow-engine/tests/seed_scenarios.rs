//! End-to-end scenarios driving the full parse → workbook → calculate
//! pipeline, one sheet of ample size unless a scenario says otherwise.

use gridflow_common::{AbsAddress, AbsRange, FormulaErrorKind, SheetId};
use gridflow_engine::{CellType, EngineConfig, Workbook};
use gridflow_parse::{parse_formula, ExcelA1Resolver, NameResolver, ResolvedName};

fn workbook() -> Workbook {
    let mut wb = Workbook::new(EngineConfig::new().with_sheet_bounds(200, 50).with_threads(0));
    wb.append_sheet("Sheet1");
    wb
}

/// Parses `formula` (no leading `=` needed) against `origin`, using the
/// workbook's own string pool for literals and `sheets` for cross-sheet
/// prefixes.
fn set_formula(wb: &mut Workbook, origin: AbsAddress, formula: &str, sheets: &[(&str, SheetId)]) {
    let resolver = ExcelA1Resolver;
    let lookup = |name: &str| sheets.iter().find(|(n, _)| *n == name).map(|(_, id)| *id);
    let mut intern = |s: &str| wb.intern_string(s);
    let tokens = parse_formula(formula, origin, &resolver, &lookup, &mut intern).unwrap();
    wb.set_formula_cell(origin, tokens, None);
}

fn a(row: u32, col: u32) -> AbsAddress {
    AbsAddress::new(0, row, col)
}

#[test]
fn linear_chain() {
    let mut wb = workbook();
    wb.set_numeric_cell(a(0, 0), 1.0); // A1
    set_formula(&mut wb, a(1, 0), "=A1*2", &[]); // A2
    set_formula(&mut wb, a(2, 0), "=A2*2", &[]); // A3
    wb.calculate();
    assert_eq!(wb.get_numeric_value(a(1, 0)), 2.0);
    assert_eq!(wb.get_numeric_value(a(2, 0)), 4.0);

    wb.set_numeric_cell(a(0, 0), 10.0);
    wb.calculate();
    assert_eq!(wb.get_numeric_value(a(1, 0)), 20.0);
    assert_eq!(wb.get_numeric_value(a(2, 0)), 40.0);
}

#[test]
fn range_fan_in() {
    let mut wb = workbook();
    wb.set_numeric_cell(a(0, 0), 1.0); // A1
    wb.set_numeric_cell(a(1, 0), 2.0); // A2
    wb.set_numeric_cell(a(2, 0), 3.0); // A3
    wb.set_numeric_cell(a(0, 2), 4.0); // C1
    wb.set_numeric_cell(a(0, 3), 5.0); // D1
    wb.set_numeric_cell(a(0, 4), 6.0); // E1
    set_formula(&mut wb, a(4, 2), "=SUM(A1:A3,C1:E1)", &[]); // C5
    set_formula(&mut wb, a(9, 0), "=C5*2", &[]); // A10
    wb.calculate();
    assert_eq!(wb.get_numeric_value(a(4, 2)), 21.0);
    assert_eq!(wb.get_numeric_value(a(9, 0)), 42.0);

    wb.set_numeric_cell(a(0, 0), 0.0);
    wb.calculate();
    assert_eq!(wb.get_numeric_value(a(4, 2)), 20.0);
    assert_eq!(wb.get_numeric_value(a(9, 0)), 40.0);
}

#[test]
fn grouped_matrix_dirties_both_the_group_and_its_dependent() {
    let mut wb = workbook();
    wb.set_numeric_cell(a(0, 0), 1.0); // A1
    wb.set_numeric_cell(a(1, 0), 2.0); // A2
    wb.set_numeric_cell(a(2, 0), 3.0); // A3
    wb.set_numeric_cell(a(0, 2), 4.0); // C1
    wb.set_numeric_cell(a(0, 3), 5.0); // D1
    wb.set_numeric_cell(a(0, 4), 6.0); // E1

    let resolver = ExcelA1Resolver;
    let no_sheets = |_: &str| None;
    let origin = a(4, 2); // C5, the group's own origin
    let a_range = match resolver.resolve("A1:A3", origin, &no_sheets) {
        ResolvedName::Range(f, l) => (f, l),
        _ => panic!("expected range"),
    };
    let c_range = match resolver.resolve("C1:E1", origin, &no_sheets) {
        ResolvedName::Range(f, l) => (f, l),
        _ => panic!("expected range"),
    };
    let tokens = vec![
        gridflow_parse::FormulaToken::Function("MMULT".into()),
        gridflow_parse::FormulaToken::Open,
        gridflow_parse::FormulaToken::RangeRef(a_range.0, a_range.1),
        gridflow_parse::FormulaToken::Sep,
        gridflow_parse::FormulaToken::RangeRef(c_range.0, c_range.1),
        gridflow_parse::FormulaToken::Close,
    ];
    let group = AbsRange::new(a(4, 2), a(6, 4)); // C5:E7
    wb.set_grouped_formula_cells(group, tokens, None).unwrap();
    set_formula(&mut wb, a(9, 0), "=C5*2", &[]); // A10
    wb.calculate();
    assert_eq!(wb.get_numeric_value(a(4, 2)), 4.0);
    assert_eq!(wb.get_numeric_value(a(9, 0)), 8.0);

    wb.set_numeric_cell(a(0, 0), 10.0);
    wb.calculate();
    assert_eq!(wb.get_numeric_value(a(4, 2)), 40.0);
    assert_eq!(wb.get_numeric_value(a(9, 0)), 80.0);
}

#[test]
fn dependent_on_a_non_origin_group_member_recomputes_on_modification() {
    let mut wb = workbook();
    wb.set_numeric_cell(a(0, 0), 1.0); // A1
    wb.set_numeric_cell(a(1, 0), 2.0); // A2
    wb.set_numeric_cell(a(2, 0), 3.0); // A3
    wb.set_numeric_cell(a(0, 2), 4.0); // C1
    wb.set_numeric_cell(a(0, 3), 5.0); // D1
    wb.set_numeric_cell(a(0, 4), 6.0); // E1

    let resolver = ExcelA1Resolver;
    let no_sheets = |_: &str| None;
    let origin = a(4, 2); // C5, the group's own origin
    let a_range = match resolver.resolve("A1:A3", origin, &no_sheets) {
        ResolvedName::Range(f, l) => (f, l),
        _ => panic!("expected range"),
    };
    let c_range = match resolver.resolve("C1:E1", origin, &no_sheets) {
        ResolvedName::Range(f, l) => (f, l),
        _ => panic!("expected range"),
    };
    let tokens = vec![
        gridflow_parse::FormulaToken::Function("MMULT".into()),
        gridflow_parse::FormulaToken::Open,
        gridflow_parse::FormulaToken::RangeRef(a_range.0, a_range.1),
        gridflow_parse::FormulaToken::Sep,
        gridflow_parse::FormulaToken::RangeRef(c_range.0, c_range.1),
        gridflow_parse::FormulaToken::Close,
    ];
    let group = AbsRange::new(a(4, 2), a(6, 4)); // C5:E7
    wb.set_grouped_formula_cells(group, tokens, None).unwrap();

    // D6 is a non-origin member of the group (offset (1,1) from origin C5).
    set_formula(&mut wb, a(9, 0), "=D6*2", &[]); // A10
    wb.calculate();
    assert_eq!(wb.get_numeric_value(a(5, 3)), 10.0); // D6 = A2 * D1 = 2 * 5
    assert_eq!(wb.get_numeric_value(a(9, 0)), 20.0);

    wb.set_numeric_cell(a(1, 0), 20.0); // A2
    wb.calculate();
    assert_eq!(wb.get_numeric_value(a(5, 3)), 100.0); // D6 = A2 * D1 = 20 * 5
    assert_eq!(wb.get_numeric_value(a(9, 0)), 200.0);
}

#[test]
fn volatile_cell_recomputes_every_calculate_without_other_modifications() {
    let mut wb = workbook();
    wb.set_numeric_cell(a(0, 0), 1.0);
    wb.set_numeric_cell(a(1, 0), 2.0);
    wb.set_numeric_cell(a(2, 0), 3.0);
    set_formula(&mut wb, a(3, 0), "=SUM(A1:A3)", &[]); // A4
    wb.calculate();
    assert_eq!(wb.get_numeric_value(a(3, 0)), 6.0);

    set_formula(&mut wb, a(0, 1), "=NOW()", &[]); // B1
    wb.calculate();
    let first = wb.get_numeric_value(a(0, 1));
    assert!(first > 0.0);

    // No modifications since the last calculate: A4 keeps its cached value,
    // but the volatile B1 is dirty again every time.
    wb.calculate();
    assert_eq!(wb.get_numeric_value(a(3, 0)), 6.0);
}

#[test]
fn cycle_leaves_both_cells_ref_cycle() {
    let mut wb = workbook();
    set_formula(&mut wb, a(0, 0), "=B1+1", &[]); // A1
    set_formula(&mut wb, a(0, 1), "=A1+1", &[]); // B1
    wb.calculate();
    assert_eq!(wb.get_cell_access(a(0, 0)).error_value.unwrap().kind, FormulaErrorKind::RefCycle);
    assert_eq!(wb.get_cell_access(a(0, 1)).error_value.unwrap().kind, FormulaErrorKind::RefCycle);
}

#[test]
fn cross_sheet_reference_dirties_only_the_referencing_sheet() {
    let mut wb = workbook();
    let sheet2 = wb.append_sheet("Sheet2");
    let sheets = [("Sheet1", 0u16), ("Sheet2", sheet2)];
    set_formula(&mut wb, AbsAddress::new(sheet2, 1, 1), "=Sheet1!A10", &sheets); // Sheet2!B2
    wb.set_numeric_cell(a(9, 0), 5.0); // Sheet1!A10
    wb.calculate();
    assert_eq!(wb.get_numeric_value(AbsAddress::new(sheet2, 1, 1)), 5.0);

    wb.set_numeric_cell(AbsAddress::new(sheet2, 9, 0), 99.0); // Sheet2!A10, unrelated
    wb.calculate();
    assert_eq!(wb.get_numeric_value(AbsAddress::new(sheet2, 1, 1)), 5.0);
}

#[test]
fn empty_workbook_has_no_dirty_cells() {
    let wb = workbook();
    wb.calculate();
}

#[test]
fn get_data_range_is_none_on_an_all_empty_sheet() {
    let wb = workbook();
    assert!(wb.get_data_range(0).is_none());
}

#[test]
fn replacing_a_formula_deregisters_its_old_listeners() {
    let mut wb = workbook();
    wb.set_numeric_cell(a(0, 0), 1.0); // A1
    set_formula(&mut wb, a(1, 0), "=A1", &[]); // A2 depends on A1
    wb.calculate();
    assert_eq!(wb.get_numeric_value(a(1, 0)), 1.0);

    // Overwrite A2 with a plain value; it should no longer listen to A1.
    wb.set_numeric_cell(a(1, 0), 42.0);
    wb.set_numeric_cell(a(0, 0), 999.0);
    wb.calculate();
    assert_eq!(wb.get_numeric_value(a(1, 0)), 42.0);
}

#[test]
fn empty_cell_on_a_formula_cell_removes_it_and_its_listeners() {
    let mut wb = workbook();
    wb.set_numeric_cell(a(0, 0), 1.0); // A1
    set_formula(&mut wb, a(1, 0), "=A1", &[]); // A2
    wb.calculate();

    wb.empty_cell(a(1, 0));
    wb.set_numeric_cell(a(0, 0), 2.0);
    wb.calculate();
    assert_eq!(wb.get_numeric_value(a(1, 0)), 0.0);
}

#[test]
fn modified_cell_outside_any_existing_sheet_does_not_crash() {
    let mut wb = Workbook::new(EngineConfig::new().with_sheet_bounds(10, 10).with_threads(0));
    wb.set_numeric_cell(AbsAddress::new(3, 0, 0), 1.0);
    wb.calculate();
}

#[test]
fn fill_down_replicates_and_leaves_the_boundary_untouched() {
    let mut wb = workbook();
    wb.set_numeric_cell(a(0, 0), 7.0);
    wb.fill_down_cells(a(0, 0), 3).unwrap();
    for r in 1..=3 {
        assert_eq!(wb.get_numeric_value(a(r, 0)), 7.0);
    }
    assert_eq!(wb.get_cell_access(a(4, 0)).cell_type, CellType::Empty);
}
