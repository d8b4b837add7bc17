//! Operator-precedence expression builder.
//!
//! Tokens are fed one at a time.  Operands go on an operand stack; operators
//! wait on a pending stack until an incoming operator that binds no tighter
//! forces them to reduce.  Groups (`(`…`)`, `[`…`]`) sit on the pending stack
//! as sentinels that only their closing symbol or a separator can reach.
//!
//! Whether a symbol is read as prefix or infix, and whether a group opener
//! starts a plain group or applies to the preceding operand, depends only on
//! whether an operand is expected at that point.

use std::sync::Arc;

use super::error::ExpressionError;
use super::expression::Expression;
use super::operator::{Associativity, OpCode, Operator, OperatorTable, Shape};
use super::value::Value;

enum Pending {
    Prefix(Arc<Operator>),
    Infix(Arc<Operator>),
    Group {
        op: Arc<Operator>,
        /// Operand the group applies to (`f` in `f(x)`); `None` for a plain group.
        target: Option<Expression>,
        items: Vec<Expression>,
        /// Operand stack height when the group opened.
        base: usize,
    },
}

pub struct ExpressionBuilder<'a> {
    operators: &'a OperatorTable,
    operands: Vec<Expression>,
    pending: Vec<Pending>,
    expect_operand: bool,
}

impl<'a> ExpressionBuilder<'a> {
    pub fn new(operators: &'a OperatorTable) -> Self {
        ExpressionBuilder {
            operators,
            operands: Vec::new(),
            pending: Vec::new(),
            expect_operand: true,
        }
    }

    pub fn push_literal(&mut self, value: Value) -> Result<(), ExpressionError> {
        if !self.expect_operand {
            return Err(ExpressionError::UnexpectedLiteral {
                literal: value.to_string(),
            });
        }
        self.operands.push(Expression::Literal(value));
        self.expect_operand = false;
        Ok(())
    }

    pub fn push_identifier(&mut self, name: &str) -> Result<(), ExpressionError> {
        if !self.expect_operand {
            return Err(ExpressionError::UnexpectedIdentifier { name: name.to_owned() });
        }
        self.operands.push(Expression::Identifier(name.to_owned()));
        self.expect_operand = false;
        Ok(())
    }

    pub fn push_symbol(&mut self, symbol: &str) -> Result<(), ExpressionError> {
        if self.expect_operand {
            self.push_in_operand_position(symbol)
        } else {
            self.push_in_operator_position(symbol)
        }
    }

    /// Reduce everything and hand out the finished tree.
    pub fn finish(mut self) -> Result<Expression, ExpressionError> {
        if self.expect_operand {
            return Err(ExpressionError::Incomplete);
        }
        while let Some(top) = self.pending.pop() {
            match top {
                Pending::Group { op, .. } => {
                    return Err(ExpressionError::UnbalancedGroup { symbol: op.symbol.clone() });
                }
                other => self.reduce(other)?,
            }
        }
        match (self.operands.pop(), self.operands.is_empty()) {
            (Some(expr), true) => Ok(expr),
            _ => Err(ExpressionError::Incomplete),
        }
    }

    // ── Operand position ──────────────────────────────────────────────────────

    fn push_in_operand_position(&mut self, symbol: &str) -> Result<(), ExpressionError> {
        if let Some(op) = self.operators.prefix(symbol) {
            self.pending.push(Pending::Prefix(Arc::clone(op)));
            return Ok(());
        }
        if let Some(op) = self.operators.group_open(symbol) {
            self.pending.push(Pending::Group {
                op: Arc::clone(op),
                target: None,
                items: Vec::new(),
                base: self.operands.len(),
            });
            return Ok(());
        }
        // `f()` and `[]`: a closer straight after its opener.
        if let Some(op) = self.operators.group_close(symbol) {
            if let Some(Pending::Group { op: open, items, base, .. }) = self.pending.last() {
                if Arc::ptr_eq(open, op) && items.is_empty() && *base == self.operands.len() {
                    return self.close_group();
                }
            }
        }
        Err(self.misplaced(symbol))
    }

    // ── Operator position ─────────────────────────────────────────────────────

    fn push_in_operator_position(&mut self, symbol: &str) -> Result<(), ExpressionError> {
        if let Some(op) = self.operators.infix(symbol) {
            let op = Arc::clone(op);
            let Shape::Infix(assoc) = op.shape else {
                return Err(ExpressionError::UnexpectedOperator { symbol: symbol.to_owned() });
            };
            self.reduce_while_binding(op.precedence, assoc)?;
            self.pending.push(Pending::Infix(op));
            self.expect_operand = true;
            return Ok(());
        }

        if let Some(op) = self.operators.group_open(symbol) {
            let op = Arc::clone(op);
            self.reduce_while_binding(op.precedence, Associativity::Left)?;
            let target = self.operands.pop().ok_or(ExpressionError::Incomplete)?;
            if op.code != OpCode::Bracket
                && !matches!(target, Expression::Identifier(_) | Expression::Member { .. })
            {
                return Err(ExpressionError::InvalidInvocationTarget);
            }
            self.pending.push(Pending::Group {
                op,
                target: Some(target),
                items: Vec::new(),
                base: self.operands.len(),
            });
            self.expect_operand = true;
            return Ok(());
        }

        if self.operators.separator(symbol).is_some() {
            self.collect_group_item(symbol)?;
            self.expect_operand = true;
            return Ok(());
        }

        if let Some(op) = self.operators.group_close(symbol) {
            let op = Arc::clone(op);
            self.collect_group_item(symbol)?;
            match self.pending.last() {
                Some(Pending::Group { op: open, .. }) if Arc::ptr_eq(open, &op) => {}
                _ => return Err(ExpressionError::UnbalancedGroup { symbol: symbol.to_owned() }),
            }
            return self.close_group();
        }

        Err(self.misplaced(symbol))
    }

    fn misplaced(&self, symbol: &str) -> ExpressionError {
        let known = self.operators.prefix(symbol).is_some()
            || self.operators.infix(symbol).is_some()
            || self.operators.group_open(symbol).is_some()
            || self.operators.group_close(symbol).is_some()
            || self.operators.separator(symbol).is_some();
        if known {
            ExpressionError::UnexpectedOperator { symbol: symbol.to_owned() }
        } else {
            ExpressionError::UnknownOperator { symbol: symbol.to_owned() }
        }
    }

    // ── Reduction ─────────────────────────────────────────────────────────────

    /// Reduce pending operators that bind at least as tightly as an incoming
    /// operator of precedence `prec`.
    fn reduce_while_binding(&mut self, prec: u32, assoc: Associativity) -> Result<(), ExpressionError> {
        while let Some(top) = self.pending.last() {
            let binds = match top {
                Pending::Prefix(op) | Pending::Infix(op) => op.reduces_before(prec, assoc),
                Pending::Group { .. } => false,
            };
            if !binds {
                break;
            }
            if let Some(top) = self.pending.pop() {
                self.reduce(top)?;
            }
        }
        Ok(())
    }

    /// Reduce down to the innermost group and move its last item in.
    fn collect_group_item(&mut self, symbol: &str) -> Result<(), ExpressionError> {
        while matches!(self.pending.last(), Some(Pending::Prefix(_) | Pending::Infix(_))) {
            if let Some(top) = self.pending.pop() {
                self.reduce(top)?;
            }
        }
        let item = self.operands.pop().ok_or(ExpressionError::Incomplete)?;
        match self.pending.last_mut() {
            Some(Pending::Group { items, .. }) => {
                items.push(item);
                Ok(())
            }
            _ if self.operators.separator(symbol).is_some() => {
                Err(ExpressionError::UnexpectedOperator { symbol: symbol.to_owned() })
            }
            _ => Err(ExpressionError::UnbalancedGroup { symbol: symbol.to_owned() }),
        }
    }

    /// Pop the innermost group and push the expression it forms.
    fn close_group(&mut self) -> Result<(), ExpressionError> {
        let Some(Pending::Group { op, target, items, .. }) = self.pending.pop() else {
            return Err(ExpressionError::Incomplete);
        };
        let expr = match (op.code, target) {
            (OpCode::Bracket, Some(target)) => {
                let key = single(items, &op)?;
                Expression::Index {
                    target: Box::new(target),
                    key: Box::new(key),
                }
            }
            (OpCode::Bracket, None) => Expression::List(items),
            (_, Some(target)) => Expression::Invoke {
                target: Box::new(target),
                args: items,
            },
            (_, None) => single(items, &op)?,
        };
        self.operands.push(expr);
        self.expect_operand = false;
        Ok(())
    }

    fn reduce(&mut self, pending: Pending) -> Result<(), ExpressionError> {
        let expr = match pending {
            Pending::Prefix(op) => {
                let operand = self.operands.pop().ok_or(ExpressionError::Incomplete)?;
                if op.rhs_identifier && operand.as_identifier().is_none() {
                    return Err(ExpressionError::OperandMustBeIdentifier { symbol: op.symbol.clone() });
                }
                Expression::Unary {
                    op,
                    operand: Box::new(operand),
                }
            }
            Pending::Infix(op) => {
                let rhs = self.operands.pop().ok_or(ExpressionError::Incomplete)?;
                let lhs = self.operands.pop().ok_or(ExpressionError::Incomplete)?;
                if (op.rhs_identifier && rhs.as_identifier().is_none())
                    || (op.lhs_identifier && lhs.as_identifier().is_none())
                {
                    return Err(ExpressionError::OperandMustBeIdentifier { symbol: op.symbol.clone() });
                }
                match (op.code, rhs) {
                    (OpCode::Member, Expression::Identifier(name)) => Expression::Member {
                        target: Box::new(lhs),
                        name,
                    },
                    (_, rhs) => Expression::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                }
            }
            Pending::Group { op, .. } => {
                return Err(ExpressionError::UnbalancedGroup { symbol: op.symbol.clone() });
            }
        };
        self.operands.push(expr);
        Ok(())
    }
}

fn single(mut items: Vec<Expression>, op: &Operator) -> Result<Expression, ExpressionError> {
    match (items.pop(), items.is_empty()) {
        (Some(expr), true) => Ok(expr),
        _ => Err(ExpressionError::InvalidGroup { symbol: op.symbol.clone() }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
