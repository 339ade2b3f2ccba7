//! The built-in function table: a name-to-callable map the interpreter
//! dispatches function-call tokens through. A host can register its own
//! functions (or replace this table outright) without touching the
//! interpreter — this crate ships just enough (`SUM`, `MMULT`, `NOW`) to
//! drive every seed scenario.

use std::collections::{HashMap, HashSet};

use gridflow_common::{CellValue, FormulaError, FormulaErrorKind};

/// An argument the interpreter hands a function: either a single resolved
/// scalar or a row-major matrix read from a range reference.
pub enum ArgValue {
    Scalar(CellValue),
    Range { values: Vec<CellValue>, rows: usize, cols: usize },
}

impl ArgValue {
    fn flatten_numeric(&self, out: &mut Vec<f64>) {
        match self {
            ArgValue::Scalar(v) => out.push(v.coerce_numeric()),
            ArgValue::Range { values, .. } => {
                for v in values {
                    if matches!(v, CellValue::Number(_) | CellValue::Boolean(_)) {
                        out.push(v.coerce_numeric());
                    }
                }
            }
        }
    }

    fn first_error(&self) -> Option<FormulaError> {
        match self {
            ArgValue::Scalar(CellValue::Error(e)) => Some(e.clone()),
            _ => None,
        }
    }
}

/// What a function call leaves on the interpreter's value stack.
pub enum FunctionResult {
    Scalar(CellValue),
    Matrix(Vec<CellValue>, usize, usize),
}

type BuiltinFn = Box<dyn Fn(&[ArgValue]) -> FunctionResult + Send + Sync>;

pub struct FunctionTable {
    fns: HashMap<String, BuiltinFn>,
    volatile: HashSet<String>,
}

impl Default for FunctionTable {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FunctionTable {
    pub fn empty() -> Self {
        Self {
            fns: HashMap::new(),
            volatile: HashSet::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut t = Self::empty();
        t.register("SUM", Box::new(sum));
        t.register("MMULT", Box::new(mmult));
        t.register_volatile("NOW", Box::new(now));
        t
    }

    pub fn register(&mut self, name: &str, f: BuiltinFn) {
        self.fns.insert(name.to_ascii_uppercase(), f);
    }

    pub fn register_volatile(&mut self, name: &str, f: BuiltinFn) {
        self.volatile.insert(name.to_ascii_uppercase());
        self.register(name, f);
    }

    pub fn is_volatile(&self, name: &str) -> bool {
        self.volatile.contains(&name.to_ascii_uppercase())
    }

    pub fn call(&self, name: &str, args: &[ArgValue]) -> Result<FunctionResult, FormulaError> {
        match self.fns.get(&name.to_ascii_uppercase()) {
            Some(f) => Ok(f(args)),
            None => Err(FormulaError::new(FormulaErrorKind::NameNotFound).with_message(name)),
        }
    }
}

fn sum(args: &[ArgValue]) -> FunctionResult {
    for a in args {
        if let Some(e) = a.first_error() {
            return FunctionResult::Scalar(CellValue::Error(e));
        }
    }
    let mut flat = Vec::new();
    for a in args {
        a.flatten_numeric(&mut flat);
    }
    FunctionResult::Scalar(CellValue::Number(flat.into_iter().sum()))
}

/// Matrix multiply of two range arguments. Shape mismatch yields
/// `#VALUE!` rather than panicking.
fn mmult(args: &[ArgValue]) -> FunctionResult {
    let (a_vals, a_rows, a_cols) = match args.first() {
        Some(ArgValue::Range { values, rows, cols }) => (values, *rows, *cols),
        Some(ArgValue::Scalar(v)) => (std::slice::from_ref(v), 1, 1),
        None => return FunctionResult::Scalar(err(FormulaErrorKind::InvalidValueType)),
    };
    let (b_vals, b_rows, b_cols) = match args.get(1) {
        Some(ArgValue::Range { values, rows, cols }) => (values, *rows, *cols),
        Some(ArgValue::Scalar(v)) => (std::slice::from_ref(v), 1, 1),
        None => return FunctionResult::Scalar(err(FormulaErrorKind::InvalidValueType)),
    };
    if a_cols != b_rows {
        return FunctionResult::Scalar(err(FormulaErrorKind::InvalidValueType));
    }
    let mut out = vec![0.0f64; a_rows * b_cols];
    for i in 0..a_rows {
        for j in 0..b_cols {
            let mut acc = 0.0;
            for k in 0..a_cols {
                acc += a_vals[i * a_cols + k].coerce_numeric() * b_vals[k * b_cols + j].coerce_numeric();
            }
            out[i * b_cols + j] = acc;
        }
    }
    FunctionResult::Matrix(out.into_iter().map(CellValue::Number).collect(), a_rows, b_cols)
}

fn now(_args: &[ArgValue]) -> FunctionResult {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    FunctionResult::Scalar(CellValue::Number(secs))
}

fn err(kind: FormulaErrorKind) -> CellValue {
    CellValue::Error(FormulaError::new(kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_adds_scalars_and_ranges() {
        let t = FunctionTable::with_builtins();
        let args = vec![
            ArgValue::Range {
                values: vec![CellValue::Number(1.0), CellValue::Number(2.0)],
                rows: 1,
                cols: 2,
            },
            ArgValue::Scalar(CellValue::Number(3.0)),
        ];
        match t.call("SUM", &args).unwrap() {
            FunctionResult::Scalar(CellValue::Number(n)) => assert_eq!(n, 6.0),
            _ => panic!("expected scalar"),
        }
    }

    #[test]
    fn mmult_multiplies_matching_shapes() {
        let t = FunctionTable::with_builtins();
        let a = ArgValue::Range {
            values: vec![CellValue::Number(1.0), CellValue::Number(2.0), CellValue::Number(3.0)],
            rows: 3,
            cols: 1,
        };
        let b = ArgValue::Range {
            values: vec![CellValue::Number(4.0), CellValue::Number(5.0), CellValue::Number(6.0)],
            rows: 1,
            cols: 3,
        };
        match t.call("MMULT", &[a, b]).unwrap() {
            FunctionResult::Matrix(vals, rows, cols) => {
                assert_eq!((rows, cols), (3, 3));
                assert_eq!(vals[0], CellValue::Number(4.0));
                assert_eq!(vals[8], CellValue::Number(18.0));
            }
            _ => panic!("expected matrix"),
        }
    }

    #[test]
    fn now_is_registered_as_volatile() {
        let t = FunctionTable::with_builtins();
        assert!(t.is_volatile("NOW"));
        assert!(!t.is_volatile("SUM"));
    }

    #[test]
    fn unknown_function_name_is_name_not_found() {
        let t = FunctionTable::with_builtins();
        let err = t.call("BOGUS", &[]).unwrap_err();
        assert_eq!(err.kind, FormulaErrorKind::NameNotFound);
    }
}
