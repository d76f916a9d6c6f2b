//! Shared predicate representation: one tagged variant, two renderers — a
//! SQL-fragment renderer for push-down, and a row-evaluator for frames
//! already in memory.

use crate::db::value::ColumnValue;
use crate::frame::frame::Frame;

#[derive(Debug, Clone, PartialEq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
}

impl Literal {
    fn to_value(&self) -> ColumnValue {
        match self {
            Literal::Number(n) => ColumnValue::Float(*n),
            Literal::Text(s) => ColumnValue::Text(s.clone()),
        }
    }
}

/// A parsed domain predicate. Produced by `domain::parser::parse`, consumed
/// either as a SQL push-down fragment or evaluated directly row-by-row
/// against a materialized `Frame`.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Column(String),
    Literal(Literal),
    Cmp { op: CmpOp, lhs: Box<Predicate>, rhs: Box<Predicate> },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    In { column: String, values: Vec<Literal>, negated: bool },
    Between { column: String, lo: Literal, hi: Literal },
    IsNull { column: String, negated: bool },
    /// Always true; used for an absent/empty domain filter.
    True,
}

impl Predicate {
    /// Render as a parameterized SQL fragment (no literal ever interpolated
    /// directly; everything becomes a `?` bind parameter).
    pub fn to_sql(&self) -> (String, Vec<ColumnValue>) {
        match self {
            Predicate::True => ("1=1".to_string(), vec![]),
            Predicate::Column(c) => (c.clone(), vec![]),
            Predicate::Literal(l) => ("?".to_string(), vec![l.to_value()]),
            Predicate::Cmp { op, lhs, rhs } => {
                let (ls, mut lp) = lhs.to_sql();
                let (rs, rp) = rhs.to_sql();
                lp.extend(rp);
                (format!("({ls} {} {rs})", op_str(op)), lp)
            }
            Predicate::And(a, b) => {
                let (ls, mut lp) = a.to_sql();
                let (rs, rp) = b.to_sql();
                lp.extend(rp);
                (format!("({ls} AND {rs})"), lp)
            }
            Predicate::Or(a, b) => {
                let (ls, mut lp) = a.to_sql();
                let (rs, rp) = b.to_sql();
                lp.extend(rp);
                (format!("({ls} OR {rs})"), lp)
            }
            Predicate::Not(p) => {
                let (s, params) = p.to_sql();
                (format!("(NOT {s})"), params)
            }
            Predicate::In { column, values, negated } => {
                let placeholders = values.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
                let op = if *negated { "NOT IN" } else { "IN" };
                (
                    format!("({column} {op} ({placeholders}))"),
                    values.iter().map(|l| l.to_value()).collect(),
                )
            }
            Predicate::Between { column, lo, hi } => (
                format!("({column} BETWEEN ? AND ?)"),
                vec![lo.to_value(), hi.to_value()],
            ),
            Predicate::IsNull { column, negated } => {
                let op = if *negated { "IS NOT NULL" } else { "IS NULL" };
                (format!("({column} {op})"), vec![])
            }
        }
    }

    /// Evaluate directly against row `row` of `frame`.
    pub fn eval(&self, frame: &Frame, row: usize) -> bool {
        eval_bool(self, frame, row)
    }
}

fn op_str(op: &CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "=",
        CmpOp::Ne => "!=",
        CmpOp::Lt => "<",
        CmpOp::Le => "<=",
        CmpOp::Gt => ">",
        CmpOp::Ge => ">=",
    }
}

fn resolve(p: &Predicate, frame: &Frame, row: usize) -> ColumnValue {
    match p {
        Predicate::Column(name) => frame.get(row, name),
        Predicate::Literal(l) => l.to_value(),
        _ => panic!("resolve: not a scalar expression"),
    }
}

fn eval_bool(p: &Predicate, frame: &Frame, row: usize) -> bool {
    match p {
        Predicate::True => true,
        Predicate::Cmp { op, lhs, rhs } => {
            let l = resolve(lhs, frame, row);
            let r = resolve(rhs, frame, row);
            compare(op, &l, &r)
        }
        Predicate::And(a, b) => eval_bool(a, frame, row) && eval_bool(b, frame, row),
        Predicate::Or(a, b) => eval_bool(a, frame, row) || eval_bool(b, frame, row),
        Predicate::Not(a) => !eval_bool(a, frame, row),
        Predicate::In { column, values, negated } => {
            let v = frame.get(row, column);
            let found = values.iter().any(|lit| values_equal(&v, lit));
            found != *negated
        }
        Predicate::Between { column, lo, hi } => {
            let v = frame.get(row, column);
            match v.as_f64() {
                Some(x) => {
                    let lo = match lo {
                        Literal::Number(n) => *n,
                        Literal::Text(_) => return false,
                    };
                    let hi = match hi {
                        Literal::Number(n) => *n,
                        Literal::Text(_) => return false,
                    };
                    x >= lo && x <= hi
                }
                None => false,
            }
        }
        Predicate::IsNull { column, negated } => {
            let is_null = frame.get(row, column).is_null();
            is_null != *negated
        }
        Predicate::Column(_) | Predicate::Literal(_) => {
            panic!("eval_bool: not a boolean expression")
        }
    }
}

fn values_equal(v: &ColumnValue, lit: &Literal) -> bool {
    match lit {
        Literal::Number(n) => v.as_f64().map(|x| (x - n).abs() < 1e-9).unwrap_or(false),
        Literal::Text(s) => v.as_str().map(|x| x == s).unwrap_or(false),
    }
}

fn compare(op: &CmpOp, l: &ColumnValue, r: &ColumnValue) -> bool {
    if l.is_null() || r.is_null() {
        return false;
    }
    if let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) {
        return match op {
            CmpOp::Eq => (a - b).abs() < 1e-9,
            CmpOp::Ne => (a - b).abs() >= 1e-9,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        };
    }
    if let (Some(a), Some(b)) = (l.as_str(), r.as_str()) {
        return match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        };
    }
    false
}
