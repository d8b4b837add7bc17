//! Operator descriptors and the operator registry.
//!
//! An [`Operator`] is immutable once registered and shared by every
//! expression compiled for the dialect.  Lower precedence numbers bind
//! tighter.
//!
//! Standard operator set (tightest → loosest):
//!   `.` `(` `[`  →  prefix `-` `+` `!` `~` `?`  →  `*` `/` `%`  →  `+` `-`  →
//!   `<<` `>>`  →  `..`  →  `<` `<=` `>` `>=`  →  `==` `!=`  →  `&`  →  `^`  →
//!   `|`  →  `&&`  →  `||`

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use super::convert::{PrimitiveType, TypeConverter};
use super::dialect::StringComparison;
use super::error::DialectError;
use super::value::{Sequence, Value};

// ── Descriptor ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

/// Arity and position of an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Prefix,
    Infix(Associativity),
    /// Variadic group closed by `close`.  In operand position it is a plain
    /// group; after an operand it applies to it (call or index).
    Group { close: String },
    /// Item separator inside a group.
    Separator,
}

/// Semantics of an operator.  The set is closed; dialects choose symbols,
/// precedences and which codes to expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Negate,
    Identity,
    Not,
    BitNot,
    /// `?name`: true when `name` resolves.
    Defined,
    Multiply,
    Divide,
    Modulo,
    Add,
    Subtract,
    ShiftLeft,
    ShiftRight,
    Range,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
    NotEqual,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
    Member,
    Parenthesis,
    Bracket,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    pub symbol: String,
    pub precedence: u32,
    pub shape: Shape,
    pub code: OpCode,
    /// Left operand must be a bare identifier.
    pub lhs_identifier: bool,
    /// Right (or only, for prefix operators) operand must be a bare identifier.
    pub rhs_identifier: bool,
}

impl Operator {
    fn new(symbol: impl Into<String>, precedence: u32, shape: Shape, code: OpCode) -> Self {
        Operator {
            symbol: symbol.into(),
            precedence,
            shape,
            code,
            lhs_identifier: false,
            rhs_identifier: false,
        }
    }

    pub fn prefix(symbol: impl Into<String>, precedence: u32, code: OpCode) -> Self {
        Self::new(symbol, precedence, Shape::Prefix, code)
    }

    pub fn infix(
        symbol: impl Into<String>,
        precedence: u32,
        assoc: Associativity,
        code: OpCode,
    ) -> Self {
        Self::new(symbol, precedence, Shape::Infix(assoc), code)
    }

    pub fn group(
        open: impl Into<String>,
        close: impl Into<String>,
        precedence: u32,
        code: OpCode,
    ) -> Self {
        Self::new(open, precedence, Shape::Group { close: close.into() }, code)
    }

    pub fn separator(symbol: impl Into<String>, code: OpCode) -> Self {
        Self::new(symbol, u32::MAX, Shape::Separator, code)
    }

    /// Require the (right / only) operand to be a bare identifier.
    pub fn identifier_operand(mut self) -> Self {
        self.rhs_identifier = true;
        self
    }

    /// Require the left operand to be a bare identifier.
    pub fn identifier_lhs(mut self) -> Self {
        self.lhs_identifier = true;
        self
    }

    pub fn close_symbol(&self) -> Option<&str> {
        match &self.shape {
            Shape::Group { close } => Some(close),
            _ => None,
        }
    }

    /// Whether this operator, pending on the stack, must be reduced before
    /// `incoming` (an infix operator of precedence `prec`) is pushed.
    pub fn reduces_before(&self, prec: u32, assoc: Associativity) -> bool {
        match self.shape {
            Shape::Prefix | Shape::Infix(_) => {
                self.precedence < prec || (self.precedence == prec && assoc == Associativity::Left)
            }
            Shape::Group { .. } | Shape::Separator => false,
        }
    }

    // ── Evaluation ────────────────────────────────────────────────────────────

    /// Evaluate the left operand alone.  `Some` short-circuits the operator
    /// and the right operand is never evaluated.
    pub fn short_circuit(&self, conv: &dyn TypeConverter, lhs: &Value) -> Option<Value> {
        match self.code {
            OpCode::And if !conv.to_bool(lhs) => Some(Value::Bool(false)),
            OpCode::Or if conv.to_bool(lhs) => Some(Value::Bool(true)),
            _ => None,
        }
    }

    pub fn apply_unary(&self, conv: &dyn TypeConverter, v: &Value) -> Value {
        match self.code {
            OpCode::Negate => Value::Number(-conv.to_number(v)),
            OpCode::Identity => Value::Number(conv.to_number(v)),
            OpCode::Not => Value::Bool(!conv.to_bool(v)),
            OpCode::BitNot => Value::from(!conv.to_integer(v)),
            // context-dependent codes are resolved by the evaluator
            _ => Value::Undefined,
        }
    }

    pub fn apply_binary(
        &self,
        conv: &dyn TypeConverter,
        strings: StringComparison,
        l: &Value,
        r: &Value,
    ) -> Value {
        let num = |v: &Value| conv.to_number(v);
        let int = |v: &Value| conv.to_integer(v);
        match self.code {
            OpCode::Add => Value::Number(num(l) + num(r)),
            OpCode::Subtract => Value::Number(num(l) - num(r)),
            OpCode::Multiply => Value::Number(num(l) * num(r)),
            OpCode::Divide => Value::Number(num(l) / num(r)),
            OpCode::Modulo => Value::Number(num(l) % num(r)),

            OpCode::BitAnd => Value::from(int(l) & int(r)),
            OpCode::BitOr => Value::from(int(l) | int(r)),
            OpCode::BitXor => Value::from(int(l) ^ int(r)),
            OpCode::ShiftLeft => Value::from(int(l).wrapping_shl(int(r) as u32 & 31)),
            OpCode::ShiftRight => Value::from(int(l).wrapping_shr(int(r) as u32 & 31)),

            OpCode::And | OpCode::Or => Value::Bool(conv.to_bool(r)),

            OpCode::Equal => Value::Bool(equals(conv, strings, l, r)),
            OpCode::NotEqual => Value::Bool(!equals(conv, strings, l, r)),
            OpCode::Less => Value::Bool(compare(conv, strings, l, r) == Some(Ordering::Less)),
            OpCode::LessOrEqual => Value::Bool(matches!(
                compare(conv, strings, l, r),
                Some(Ordering::Less | Ordering::Equal)
            )),
            OpCode::Greater => {
                Value::Bool(compare(conv, strings, l, r) == Some(Ordering::Greater))
            }
            OpCode::GreaterOrEqual => Value::Bool(matches!(
                compare(conv, strings, l, r),
                Some(Ordering::Greater | Ordering::Equal)
            )),

            OpCode::Range => range(num(l), num(r)),

            _ => Value::Undefined,
        }
    }
}

/// Equality dispatches on the primitive type of the left operand.
fn equals(conv: &dyn TypeConverter, strings: StringComparison, l: &Value, r: &Value) -> bool {
    match conv.type_of(l) {
        PrimitiveType::Number => conv.to_number(l) == conv.to_number(r),
        PrimitiveType::Boolean => conv.to_bool(l) == conv.to_bool(r),
        PrimitiveType::String => {
            strings.compare(&conv.to_string(l), &conv.to_string(r)) == Ordering::Equal
        }
        _ => l.same(r),
    }
}

/// Ordering; `None` when the operands are unordered (NaN, or a left operand
/// that is not a number, boolean or string).
fn compare(
    conv: &dyn TypeConverter,
    strings: StringComparison,
    l: &Value,
    r: &Value,
) -> Option<Ordering> {
    match conv.type_of(l) {
        PrimitiveType::Number => conv.to_number(l).partial_cmp(&conv.to_number(r)),
        PrimitiveType::Boolean => Some(conv.to_bool(l).cmp(&conv.to_bool(r))),
        PrimitiveType::String => Some(strings.compare(&conv.to_string(l), &conv.to_string(r))),
        _ => None,
    }
}

/// Inclusive integer range over the bounds truncated toward zero.  Undefined
/// when the bounds are descending or either is not finite; bounds past the
/// `i64` limits saturate.
fn range(lo: f64, hi: f64) -> Value {
    if !lo.is_finite() || !hi.is_finite() || lo > hi {
        return Value::Undefined;
    }
    Value::Seq(Sequence::Range {
        start: lo.trunc() as i64,
        end: hi.trunc() as i64,
    })
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Operators of a dialect, indexed by symbol.
#[derive(Debug, Clone, Default)]
pub struct OperatorTable {
    prefix: HashMap<String, Arc<Operator>>,
    infix: HashMap<String, Arc<Operator>>,
    open: HashMap<String, Arc<Operator>>,
    /// Close symbol → the group operator it closes.
    close: HashMap<String, Arc<Operator>>,
    separator: HashMap<String, Arc<Operator>>,
    order: Vec<Arc<Operator>>,
}

impl OperatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard operator set.
    pub fn standard() -> Self {
        use Associativity::Left;
        use OpCode::*;

        let ops = [
            Operator::infix(".", 0, Left, Member).identifier_operand(),
            Operator::group("(", ")", 0, Parenthesis),
            Operator::group("[", "]", 0, Bracket),
            Operator::separator(",", Comma),
            Operator::prefix("-", 1, Negate),
            Operator::prefix("+", 1, Identity),
            Operator::prefix("!", 1, Not),
            Operator::prefix("~", 1, BitNot),
            Operator::prefix("?", 1, Defined).identifier_operand(),
            Operator::infix("*", 2, Left, Multiply),
            Operator::infix("/", 2, Left, Divide),
            Operator::infix("%", 2, Left, Modulo),
            Operator::infix("+", 3, Left, Add),
            Operator::infix("-", 3, Left, Subtract),
            Operator::infix("<<", 4, Left, ShiftLeft),
            Operator::infix(">>", 4, Left, ShiftRight),
            Operator::infix("..", 5, Left, Range),
            Operator::infix("<", 6, Left, Less),
            Operator::infix("<=", 6, Left, LessOrEqual),
            Operator::infix(">", 6, Left, Greater),
            Operator::infix(">=", 6, Left, GreaterOrEqual),
            Operator::infix("==", 7, Left, Equal),
            Operator::infix("!=", 7, Left, NotEqual),
            Operator::infix("&", 8, Left, BitAnd),
            Operator::infix("^", 9, Left, BitXor),
            Operator::infix("|", 10, Left, BitOr),
            Operator::infix("&&", 11, Left, And),
            Operator::infix("||", 12, Left, Or),
        ];

        let mut table = OperatorTable::new();
        for op in ops {
            table.insert(op);
        }
        table
    }

    /// Register an operator.  Prefix symbols must be unique among prefix and
    /// group symbols; every other symbol must be unique among infix, group
    /// and separator symbols.
    pub fn register(&mut self, op: Operator) -> Result<(), DialectError> {
        let taken_in_operand_position = |sym: &str| {
            self.prefix.contains_key(sym) || self.open.contains_key(sym) || self.close.contains_key(sym)
        };
        let taken_in_operator_position = |sym: &str| {
            self.infix.contains_key(sym)
                || self.open.contains_key(sym)
                || self.close.contains_key(sym)
                || self.separator.contains_key(sym)
        };

        let duplicate = |symbol: &str, class: &'static str| DialectError::DuplicateOperator {
            symbol: symbol.to_owned(),
            class,
        };

        match &op.shape {
            Shape::Prefix if taken_in_operand_position(&op.symbol) => {
                return Err(duplicate(&op.symbol, "prefix"));
            }
            Shape::Infix(_) | Shape::Separator if taken_in_operator_position(&op.symbol) => {
                return Err(duplicate(&op.symbol, "infix"));
            }
            Shape::Group { close } => {
                for sym in [op.symbol.as_str(), close.as_str()] {
                    if taken_in_operand_position(sym) || taken_in_operator_position(sym) {
                        return Err(duplicate(sym, "group"));
                    }
                }
            }
            _ => {}
        }

        self.insert(op);
        Ok(())
    }

    /// Index `op` under its symbols without collision checks.
    fn insert(&mut self, op: Operator) {
        let op = Arc::new(op);
        match &op.shape {
            Shape::Prefix => {
                self.prefix.insert(op.symbol.clone(), Arc::clone(&op));
            }
            Shape::Infix(_) => {
                self.infix.insert(op.symbol.clone(), Arc::clone(&op));
            }
            Shape::Group { close } => {
                self.open.insert(op.symbol.clone(), Arc::clone(&op));
                self.close.insert(close.clone(), Arc::clone(&op));
            }
            Shape::Separator => {
                self.separator.insert(op.symbol.clone(), Arc::clone(&op));
            }
        }
        self.order.push(op);
    }

    pub fn prefix(&self, symbol: &str) -> Option<&Arc<Operator>> {
        self.prefix.get(symbol)
    }

    pub fn infix(&self, symbol: &str) -> Option<&Arc<Operator>> {
        self.infix.get(symbol)
    }

    pub fn group_open(&self, symbol: &str) -> Option<&Arc<Operator>> {
        self.open.get(symbol)
    }

    /// The group operator closed by `symbol`.
    pub fn group_close(&self, symbol: &str) -> Option<&Arc<Operator>> {
        self.close.get(symbol)
    }

    pub fn separator(&self, symbol: &str) -> Option<&Arc<Operator>> {
        self.separator.get(symbol)
    }

    /// Every symbol the tokenizer has to recognise, including group closers.
    pub fn symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .prefix
            .keys()
            .chain(self.infix.keys())
            .chain(self.open.keys())
            .chain(self.close.keys())
            .chain(self.separator.keys())
            .cloned()
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Operator>> {
        self.order.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
