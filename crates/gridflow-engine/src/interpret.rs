//! The formula interpreter: a recursive-descent walk, driven by an explicit
//! token index rather than an iterator, over the same grammar
//! `gridflow-parse` used to flatten formula text
//! (`expression = term (op term)*`, `term = power (("*"|"/") power)*`,
//! `power = factor ("^" factor)*`, `factor = paren | function-call |
//! reference | literal`). The interpreter does not re-lex; it only resolves
//! each token against live cell values.

use std::collections::HashSet;

use gridflow_common::{AbsAddress, AbsRange, CellValue, FormulaError, FormulaErrorKind};
use gridflow_parse::FormulaToken;

use crate::functions::{ArgValue, FunctionResult, FunctionTable};
use crate::named::NamedExpressionTable;
use crate::store::CellStore;

/// Everything interpretation needs besides the token stream itself.
pub struct InterpretCtx<'a> {
    pub store: &'a CellStore,
    pub functions: &'a FunctionTable,
    pub named: &'a NamedExpressionTable,
}

/// What a sub-expression leaves on the value stack: a plain scalar, an
/// unresolved range handle (for range-aware functions), or — only ever as
/// the final result of a whole formula — a matrix shaped for a formula
/// group.
enum StackValue {
    Scalar(CellValue),
    Range(AbsRange),
    Matrix(Vec<CellValue>, usize, usize),
}

impl StackValue {
    /// A range or matrix used where a scalar was expected (e.g. as a binary
    /// operator's operand) degrades to `#VALUE!` rather than panicking.
    fn into_scalar(self) -> CellValue {
        match self {
            StackValue::Scalar(v) => v,
            StackValue::Range(_) | StackValue::Matrix(_, _, _) => {
                CellValue::Error(FormulaError::new(FormulaErrorKind::InvalidValueType))
            }
        }
    }
}

/// Expand `named_expression(name)` tokens inline, guarding against mutual
/// recursion with a "currently expanding" name set. Sheet-local definitions
/// shadow the global one of the same name, matching the resolution order the
/// name resolver itself uses when parsing a formula.
fn expand(
    tokens: &[FormulaToken],
    named: &NamedExpressionTable,
    sheet: gridflow_common::SheetId,
    expanding: &mut HashSet<String>,
) -> Result<Vec<FormulaToken>, FormulaError> {
    let mut out = Vec::with_capacity(tokens.len());
    for tok in tokens {
        match tok {
            FormulaToken::NamedExpression(name) => {
                if !expanding.insert(name.clone()) {
                    return Err(FormulaError::new(FormulaErrorKind::InvalidExpression)
                        .with_message(format!("circular named expression '{name}'")));
                }
                let inner = named
                    .get_scoped(name, sheet)
                    .ok_or_else(|| FormulaError::new(FormulaErrorKind::NameNotFound).with_message(name.clone()))?;
                out.push(FormulaToken::Open);
                out.extend(expand(&inner, named, sheet, expanding)?);
                out.push(FormulaToken::Close);
                expanding.remove(name);
            }
            other => out.push(other.clone()),
        }
    }
    Ok(out)
}

struct Interp<'a, 'b> {
    tokens: &'b [FormulaToken],
    pos: usize,
    stack: Vec<StackValue>,
    ctx: &'a InterpretCtx<'a>,
    origin: AbsAddress,
}

impl<'a, 'b> Interp<'a, 'b> {
    fn peek(&self) -> Option<&FormulaToken> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn expression(&mut self) {
        self.term();
        loop {
            let op = match self.peek() {
                Some(FormulaToken::Plus) => FormulaToken::Plus,
                Some(FormulaToken::Minus) => FormulaToken::Minus,
                Some(FormulaToken::Concat) => FormulaToken::Concat,
                Some(FormulaToken::Eq) => FormulaToken::Eq,
                Some(FormulaToken::Ne) => FormulaToken::Ne,
                Some(FormulaToken::Lt) => FormulaToken::Lt,
                Some(FormulaToken::Le) => FormulaToken::Le,
                Some(FormulaToken::Gt) => FormulaToken::Gt,
                Some(FormulaToken::Ge) => FormulaToken::Ge,
                _ => break,
            };
            self.bump();
            self.term();
            self.apply_binary(op);
        }
    }

    fn term(&mut self) {
        self.power();
        loop {
            let op = match self.peek() {
                Some(FormulaToken::Multiply) => FormulaToken::Multiply,
                Some(FormulaToken::Divide) => FormulaToken::Divide,
                _ => break,
            };
            self.bump();
            self.power();
            self.apply_binary(op);
        }
    }

    fn power(&mut self) {
        self.factor();
        while matches!(self.peek(), Some(FormulaToken::Power)) {
            self.bump();
            self.factor();
            self.apply_binary(FormulaToken::Power);
        }
    }

    fn factor(&mut self) {
        match self.peek().cloned() {
            Some(FormulaToken::Open) => {
                self.bump();
                self.expression();
                if matches!(self.peek(), Some(FormulaToken::Close)) {
                    self.bump();
                }
            }
            Some(FormulaToken::Value(n)) => {
                self.bump();
                self.stack.push(StackValue::Scalar(CellValue::Number(n)));
            }
            Some(FormulaToken::Boolean(b)) => {
                self.bump();
                self.stack.push(StackValue::Scalar(CellValue::Boolean(b)));
            }
            Some(FormulaToken::StringLit(id)) => {
                self.bump();
                let s = self.ctx.store.strings.get(id).unwrap_or_default();
                self.stack.push(StackValue::Scalar(CellValue::Text(s)));
            }
            Some(FormulaToken::Error(kind)) => {
                self.bump();
                self.stack.push(StackValue::Scalar(CellValue::Error(FormulaError::new(kind))));
            }
            Some(FormulaToken::SingleRef(addr)) => {
                self.bump();
                let resolved = addr.resolve(self.origin);
                if resolved == self.origin {
                    self.stack.push(StackValue::Scalar(CellValue::Error(FormulaError::ref_cycle())));
                } else {
                    self.stack.push(StackValue::Scalar(self.ctx.store.get_value(resolved)));
                }
            }
            Some(FormulaToken::RangeRef(a, b)) => {
                self.bump();
                let range = AbsRange::normalized(a.resolve(self.origin), b.resolve(self.origin));
                if range.contains(self.origin) {
                    self.stack.push(StackValue::Scalar(CellValue::Error(FormulaError::ref_cycle())));
                } else {
                    self.stack.push(StackValue::Range(range));
                }
            }
            Some(FormulaToken::Function(name)) => {
                self.bump();
                if matches!(self.peek(), Some(FormulaToken::Open)) {
                    self.bump();
                } else {
                    self.stack
                        .push(StackValue::Scalar(CellValue::Error(FormulaError::new(FormulaErrorKind::InvalidExpression))));
                    return;
                }
                let mut args = Vec::new();
                if !matches!(self.peek(), Some(FormulaToken::Close)) {
                    self.expression();
                    args.push(self.pop_arg());
                    while matches!(self.peek(), Some(FormulaToken::Sep)) {
                        self.bump();
                        self.expression();
                        args.push(self.pop_arg());
                    }
                }
                if matches!(self.peek(), Some(FormulaToken::Close)) {
                    self.bump();
                }
                match self.ctx.functions.call(&name, &args) {
                    Ok(FunctionResult::Scalar(v)) => self.stack.push(StackValue::Scalar(v)),
                    Ok(FunctionResult::Matrix(vals, rows, cols)) => self.stack.push(StackValue::Matrix(vals, rows, cols)),
                    Err(e) => self.stack.push(StackValue::Scalar(CellValue::Error(e))),
                }
            }
            Some(FormulaToken::NamedExpression(name)) => {
                // Expansion happens as a pre-pass; reaching this means a
                // name that didn't resolve to a named expression either.
                self.bump();
                let e = FormulaError::new(FormulaErrorKind::NameNotFound).with_message(name);
                self.stack.push(StackValue::Scalar(CellValue::Error(e)));
            }
            _ => {
                self.stack
                    .push(StackValue::Scalar(CellValue::Error(FormulaError::new(FormulaErrorKind::InvalidExpression))));
            }
        }
    }

    fn pop_arg(&mut self) -> ArgValue {
        match self.stack.pop() {
            Some(StackValue::Scalar(v)) => ArgValue::Scalar(v),
            Some(StackValue::Range(r)) => ArgValue::Range {
                values: self.ctx.store.get_range_values(r),
                rows: r.rows() as usize,
                cols: r.cols() as usize,
            },
            Some(StackValue::Matrix(vals, rows, cols)) => ArgValue::Range { values: vals, rows, cols },
            None => ArgValue::Scalar(CellValue::Error(FormulaError::new(FormulaErrorKind::InvalidExpression))),
        }
    }

    fn apply_binary(&mut self, op: FormulaToken) {
        let rhs = self.pop_arg_as_scalar();
        let lhs = self.pop_arg_as_scalar();
        if let CellValue::Error(e) = &lhs {
            self.stack.push(StackValue::Scalar(CellValue::Error(e.clone())));
            return;
        }
        if let CellValue::Error(e) = &rhs {
            self.stack.push(StackValue::Scalar(CellValue::Error(e.clone())));
            return;
        }
        let result = match op {
            FormulaToken::Plus => CellValue::Number(lhs.coerce_numeric() + rhs.coerce_numeric()),
            FormulaToken::Minus => CellValue::Number(lhs.coerce_numeric() - rhs.coerce_numeric()),
            FormulaToken::Multiply => CellValue::Number(lhs.coerce_numeric() * rhs.coerce_numeric()),
            FormulaToken::Divide => {
                let d = rhs.coerce_numeric();
                if d == 0.0 {
                    CellValue::Error(FormulaError::division_by_zero())
                } else {
                    CellValue::Number(lhs.coerce_numeric() / d)
                }
            }
            FormulaToken::Power => CellValue::Number(lhs.coerce_numeric().powf(rhs.coerce_numeric())),
            FormulaToken::Concat => CellValue::Text(format!("{}{}", lhs.coerce_string(), rhs.coerce_string())),
            FormulaToken::Eq => CellValue::Boolean(compare_eq(&lhs, &rhs)),
            FormulaToken::Ne => CellValue::Boolean(!compare_eq(&lhs, &rhs)),
            FormulaToken::Lt => CellValue::Boolean(lhs.coerce_numeric() < rhs.coerce_numeric()),
            FormulaToken::Le => CellValue::Boolean(lhs.coerce_numeric() <= rhs.coerce_numeric()),
            FormulaToken::Gt => CellValue::Boolean(lhs.coerce_numeric() > rhs.coerce_numeric()),
            FormulaToken::Ge => CellValue::Boolean(lhs.coerce_numeric() >= rhs.coerce_numeric()),
            _ => CellValue::Error(FormulaError::new(FormulaErrorKind::InvalidExpression)),
        };
        self.stack.push(StackValue::Scalar(result));
    }

    fn pop_arg_as_scalar(&mut self) -> CellValue {
        match self.stack.pop() {
            Some(sv) => sv.into_scalar(),
            None => CellValue::Error(FormulaError::new(FormulaErrorKind::InvalidExpression)),
        }
    }
}

fn compare_eq(lhs: &CellValue, rhs: &CellValue) -> bool {
    match (lhs, rhs) {
        (CellValue::Text(a), CellValue::Text(b)) => a == b,
        (CellValue::Boolean(a), CellValue::Boolean(b)) => a == b,
        (CellValue::Empty, CellValue::Empty) => true,
        _ => lhs.coerce_numeric() == rhs.coerce_numeric(),
    }
}

/// Runs a formula's token stream for a group shaped `rows x cols`, returning
/// exactly `rows * cols` values in row-major order.
pub fn run(tokens: &[FormulaToken], ctx: &InterpretCtx, origin: AbsAddress, rows: u32, cols: u32) -> Vec<CellValue> {
    let mut expanding = HashSet::new();
    let expanded = match expand(tokens, ctx.named, origin.sheet, &mut expanding) {
        Ok(t) => t,
        Err(e) => return vec![CellValue::Error(e); (rows * cols) as usize],
    };

    let mut interp = Interp {
        tokens: &expanded,
        pos: 0,
        stack: Vec::new(),
        ctx,
        origin,
    };
    interp.expression();
    let result = interp.stack.pop();
    let want = (rows * cols) as usize;

    match result {
        Some(StackValue::Matrix(vals, r, c)) if r * c == want => vals,
        Some(StackValue::Matrix(_, _, _)) => {
            vec![CellValue::Error(FormulaError::new(FormulaErrorKind::InvalidExpression)); want]
        }
        Some(StackValue::Range(range)) if (range.rows() * range.cols()) as usize == want => {
            ctx.store.get_range_values(range)
        }
        Some(StackValue::Range(range)) if want == 1 => vec![ctx.store.get_value(range.first)],
        Some(sv) if want == 1 => vec![sv.into_scalar()],
        Some(sv) => {
            let v = sv.into_scalar();
            vec![v; want]
        }
        None => vec![CellValue::Error(FormulaError::new(FormulaErrorKind::InvalidExpression)); want],
    }
}
