//! Row-wise formulas for computed columns.
//!
//! Formulas are a closed expression language: column references, literals,
//! arithmetic, comparisons and boolean logic. A formula is parsed once,
//! type-checked against the table it will run on, then evaluated a column
//! at a time. Data problems in individual rows (null operands, division by
//! zero, integer overflow) produce null cells rather than errors.

mod parser;

use crate::error::{EngineError, Result};
use crate::table::{DataType, Table, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Column(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// A parsed formula together with its source text.
#[derive(Debug, Clone)]
pub struct Formula {
    text: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(text: &str) -> Result<Self> {
        let expr = parser::parse(text).map_err(|msg| EngineError::formula(text, msg))?;
        Ok(Self {
            text: text.to_string(),
            expr,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Result type of this formula over `table`'s columns.
    pub fn data_type(&self, table: &Table) -> Result<DataType> {
        type_of(&self.expr, table).map_err(|msg| EngineError::formula(&self.text, msg))
    }

    /// Evaluate every row of `table`, returning the result type and values.
    pub fn evaluate(&self, table: &Table) -> Result<(DataType, Vec<Value>)> {
        let data_type = self.data_type(table)?;
        let values = eval(&self.expr, table);
        Ok((data_type, values))
    }
}

fn type_of(expr: &Expr, table: &Table) -> std::result::Result<DataType, String> {
    match expr {
        Expr::Literal(value) => value
            .data_type()
            .ok_or_else(|| "null literal".to_string()),
        Expr::Column(name) => table
            .column(name)
            .map(|c| c.data_type)
            .ok_or_else(|| format!("unknown column '{name}'")),
        Expr::Unary(UnaryOp::Neg, operand) => match type_of(operand, table)? {
            t if t.is_numeric() => Ok(t),
            t => Err(format!("cannot negate a {t} value")),
        },
        Expr::Unary(UnaryOp::Not, operand) => match type_of(operand, table)? {
            DataType::Boolean => Ok(DataType::Boolean),
            t => Err(format!("'not' expects a bool, got {t}")),
        },
        Expr::Binary(op, left, right) => {
            let l = type_of(left, table)?;
            let r = type_of(right, table)?;
            binary_type(*op, l, r).ok_or_else(|| format!("cannot apply {op:?} to {l} and {r}"))
        }
    }
}

fn binary_type(op: BinaryOp, l: DataType, r: DataType) -> Option<DataType> {
    use DataType::*;
    match op {
        BinaryOp::Add if l == Utf8 && r == Utf8 => Some(Utf8),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => match (l, r) {
            (Int64, Int64) => Some(Int64),
            (l, r) if l.is_numeric() && r.is_numeric() => Some(Float64),
            _ => None,
        },
        BinaryOp::Div => (l.is_numeric() && r.is_numeric()).then_some(Float64),
        op if op.is_comparison() => {
            let comparable = (l.is_numeric() && r.is_numeric())
                || l == r
                || matches!(
                    (l, r),
                    (Timestamp(_), Timestamp(_)) | (Timestamp(_), Utf8) | (Utf8, Timestamp(_))
                );
            comparable.then_some(Boolean)
        }
        BinaryOp::And | BinaryOp::Or => (l == Boolean && r == Boolean).then_some(Boolean),
        _ => None,
    }
}

fn eval(expr: &Expr, table: &Table) -> Vec<Value> {
    let rows = table.num_rows();
    match expr {
        Expr::Literal(value) => vec![value.clone(); rows],
        // Presence was checked by `type_of`.
        Expr::Column(name) => table
            .column(name)
            .map_or_else(|| vec![Value::Null; rows], |c| c.values.clone()),
        Expr::Unary(op, operand) => eval(operand, table)
            .into_iter()
            .map(|v| unary(*op, v))
            .collect(),
        Expr::Binary(op, left, right) => eval(left, table)
            .iter()
            .zip(eval(right, table).iter())
            .map(|(l, r)| apply(*op, l, r))
            .collect(),
    }
}

fn unary(op: UnaryOp, value: Value) -> Value {
    match (op, value) {
        (UnaryOp::Neg, Value::Int(i)) => i.checked_neg().map_or(Value::Null, Value::Int),
        (UnaryOp::Neg, Value::Float(f)) => Value::Float(-f),
        (UnaryOp::Not, Value::Bool(b)) => Value::Bool(!b),
        _ => Value::Null,
    }
}

fn apply(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match op {
        BinaryOp::And => match (l, r) {
            (Value::Bool(false), _) | (_, Value::Bool(false)) => Value::Bool(false),
            (Value::Bool(true), Value::Bool(true)) => Value::Bool(true),
            _ => Value::Null,
        },
        BinaryOp::Or => match (l, r) {
            (Value::Bool(true), _) | (_, Value::Bool(true)) => Value::Bool(true),
            (Value::Bool(false), Value::Bool(false)) => Value::Bool(false),
            _ => Value::Null,
        },
        _ if l.is_null() || r.is_null() => Value::Null,
        op if op.is_comparison() => match l.compare(r) {
            Some(ord) => Value::Bool(match op {
                BinaryOp::Eq => ord == Ordering::Equal,
                BinaryOp::Ne => ord != Ordering::Equal,
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }),
            // NaN operands: only `!=` holds.
            None => Value::Bool(op == BinaryOp::Ne),
        },
        _ => arithmetic(op, l, r),
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match (op, l, r) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => Value::Str(format!("{a}{b}")),
        (_, Value::Int(a), Value::Int(b)) if op != BinaryOp::Div => {
            let result = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Sub => a.checked_sub(*b),
                _ => a.checked_mul(*b),
            };
            result.map_or(Value::Null, Value::Int)
        }
        _ => {
            let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
                return Value::Null;
            };
            match op {
                BinaryOp::Add => Value::Float(a + b),
                BinaryOp::Sub => Value::Float(a - b),
                BinaryOp::Mul => Value::Float(a * b),
                _ if b == 0.0 => Value::Null,
                _ => Value::Float(a / b),
            }
        }
    }
}
