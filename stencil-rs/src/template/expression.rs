//! Compiled expression trees and their evaluation.
//!
//! An [`Expression`] only ever comes out of
//! [`ExpressionBuilder::finish`](super::builder::ExpressionBuilder::finish),
//! so every tree is balanced.  Trees are immutable and evaluated against an
//! [`ExpressionContext`] any number of times.

use std::sync::Arc;

use super::convert::TypeConverter;
use super::dialect::StringComparison;
use super::error::EvaluationError;
use super::operator::{OpCode, Operator};
use super::value::{Sequence, Value};

/// The evaluator's view of the world.
pub trait ExpressionContext {
    fn converter(&self) -> &dyn TypeConverter;

    fn strings(&self) -> StringComparison;

    /// Resolve a free identifier.
    fn variable(&mut self, name: &str) -> Result<Value, EvaluationError>;

    /// Whether `name` resolves at all (`?name`).
    fn is_defined(&mut self, name: &str) -> bool;

    /// `target.name`.
    fn member(&mut self, target: &Value, name: &str) -> Result<Value, EvaluationError>;

    /// `name(args)` when `target` is `None`, `target.name(args)` otherwise.
    fn invoke(
        &mut self,
        target: Option<&Value>,
        name: &str,
        args: &[Value],
    ) -> Result<Value, EvaluationError>;

    /// `target[key]`.
    fn index(&mut self, target: &Value, key: &Value) -> Result<Value, EvaluationError>;
}

// ── Tree ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Expression {
    Literal(Value),
    Identifier(String),
    Unary {
        op: Arc<Operator>,
        operand: Box<Expression>,
    },
    Binary {
        op: Arc<Operator>,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Member {
        target: Box<Expression>,
        name: String,
    },
    /// `[a, b, c]`
    List(Vec<Expression>),
    /// `f(a)` or `obj.f(a)`; the target is an identifier or a member.
    Invoke {
        target: Box<Expression>,
        args: Vec<Expression>,
    },
    /// `a[i]`
    Index {
        target: Box<Expression>,
        key: Box<Expression>,
    },
}

impl Expression {
    pub fn evaluate(&self, ctx: &mut dyn ExpressionContext) -> Result<Value, EvaluationError> {
        match self {
            Expression::Literal(v) => Ok(v.clone()),

            Expression::Identifier(name) => ctx.variable(name),

            Expression::Unary { op, operand } => {
                if op.rhs_identifier {
                    if let Expression::Identifier(name) = operand.as_ref() {
                        if op.code == OpCode::Defined {
                            return Ok(Value::Bool(ctx.is_defined(name)));
                        }
                        return Ok(op.apply_unary(ctx.converter(), &Value::from(name.as_str())));
                    }
                }
                let v = operand.evaluate(ctx)?;
                Ok(op.apply_unary(ctx.converter(), &v))
            }

            Expression::Binary { op, lhs, rhs } => {
                let l = operand(lhs, op.lhs_identifier, ctx)?;
                if let Some(v) = op.short_circuit(ctx.converter(), &l) {
                    return Ok(v);
                }
                let r = operand(rhs, op.rhs_identifier, ctx)?;
                Ok(op.apply_binary(ctx.converter(), ctx.strings(), &l, &r))
            }

            Expression::Member { target, name } => {
                let t = target.evaluate(ctx)?;
                ctx.member(&t, name)
            }

            Expression::List(items) => {
                let values = evaluate_all(items, ctx)?;
                Ok(Value::Seq(Sequence::list(values)))
            }

            Expression::Invoke { target, args } => match target.as_ref() {
                Expression::Identifier(name) => {
                    let args = evaluate_all(args, ctx)?;
                    ctx.invoke(None, name, &args)
                }
                Expression::Member { target, name } => {
                    let t = target.evaluate(ctx)?;
                    let args = evaluate_all(args, ctx)?;
                    ctx.invoke(Some(&t), name, &args)
                }
                // The builder only produces invocations of names and members.
                _ => Err(EvaluationError::Failed("invalid invocation target".into())),
            },

            Expression::Index { target, key } => {
                let t = target.evaluate(ctx)?;
                let k = key.evaluate(ctx)?;
                ctx.index(&t, &k)
            }
        }
    }

    /// The identifier name if this is a bare identifier.
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Expression::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

/// Identifier operands of operators that take names are passed as strings.
fn operand(
    expr: &Expression,
    by_name: bool,
    ctx: &mut dyn ExpressionContext,
) -> Result<Value, EvaluationError> {
    match expr {
        Expression::Identifier(name) if by_name => Ok(Value::from(name.as_str())),
        _ => expr.evaluate(ctx),
    }
}

fn evaluate_all(
    exprs: &[Expression],
    ctx: &mut dyn ExpressionContext,
) -> Result<Vec<Value>, EvaluationError> {
    exprs.iter().map(|e| e.evaluate(ctx)).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
