//! Error taxonomy for the template engine.
//!
//! Errors are split by the phase that raises them so a caller can tell "my
//! template text is malformed" ([`ParseError`], [`ExpressionError`]) from
//! "evaluation against this data failed" ([`EvaluationError`]).  Cancellation
//! is its own variant of [`TemplateError`] and is never wrapped.

use thiserror::Error;

// ── Dialect setup ─────────────────────────────────────────────────────────────

/// Raised while building a [`Dialect`](super::dialect::Dialect).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DialectError {
    #[error("invalid tag markup `{markup}`: {reason}")]
    InvalidTag { markup: String, reason: String },

    #[error("operator `{symbol}` is already registered as a {class} operator")]
    DuplicateOperator { symbol: String, class: &'static str },

    #[error("directive `{name}` is already registered")]
    DuplicateDirective { name: String },

    #[error("directive `{name}` declares no tags")]
    EmptyDirective { name: String },

    #[error("invalid constant `{name}`: {reason}")]
    InvalidConstant { name: String, reason: String },

    #[error("invalid delimiters: {0}")]
    Delimiters(String),
}

// ── Structural / parse ────────────────────────────────────────────────────────

/// Structural errors found while tokenizing, lexing or interpreting a template.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unterminated string literal at offset {position}")]
    UnterminatedString { position: usize },

    #[error("tag opened at offset {position} is never closed")]
    UnclosedTag { position: usize },

    #[error("malformed tag at offset {position}: {reason}")]
    MalformedTag { position: usize, reason: String },

    #[error("`{markup}` at offset {position} does not match any known tag")]
    UnknownTag { markup: String, position: usize },

    #[error("no directive starts with tag `{tag}` (offset {position})")]
    UnmatchedTag { tag: String, position: usize },

    #[error("tag `{tag}` at offset {position} is not expected inside {open}")]
    UnexpectedTag { tag: String, position: usize, open: String },

    #[error(
        "directive opened at offset {position} is never terminated (candidates: {})",
        .candidates.join(", ")
    )]
    UnterminatedDirective { candidates: Vec<String>, position: usize },
}

// ── Expression building ───────────────────────────────────────────────────────

/// Raised by the [`ExpressionBuilder`](super::builder::ExpressionBuilder).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("unexpected literal `{literal}`: an operator is required before it")]
    UnexpectedLiteral { literal: String },

    #[error("unexpected identifier `{name}`: an operator is required before it")]
    UnexpectedIdentifier { name: String },

    #[error("unexpected operator `{symbol}`")]
    UnexpectedOperator { symbol: String },

    #[error("unknown operator `{symbol}`")]
    UnknownOperator { symbol: String },

    #[error("operator `{symbol}` requires an identifier operand")]
    OperandMustBeIdentifier { symbol: String },

    #[error("unbalanced `{symbol}`")]
    UnbalancedGroup { symbol: String },

    #[error("`{symbol}` group must contain exactly one expression")]
    InvalidGroup { symbol: String },

    #[error("only names and members can be invoked")]
    InvalidInvocationTarget,

    #[error("cannot construct expression: input is empty or incomplete")]
    Incomplete,
}

// ── Evaluation ────────────────────────────────────────────────────────────────

/// Raised while evaluating a compiled template against a context.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("evaluation cancelled")]
    Cancelled,

    #[error("`{name}` is not defined")]
    UndefinedIdentifier { name: String },

    #[error("member `{member}` is not defined")]
    UnknownMember { member: String },

    #[error("member `{member}` failed: {message}")]
    Reflection { member: String, message: String },

    #[error("directive {directive} at offset {position} failed: {source}")]
    Directive {
        directive: String,
        position: usize,
        #[source]
        source: Box<EvaluationError>,
    },

    #[error("{0}")]
    Failed(String),

    #[error("failed to write output")]
    Write(#[from] std::fmt::Error),
}

// ── Umbrella ──────────────────────────────────────────────────────────────────

/// Every error the public API can return.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error(transparent)]
    Dialect(#[from] DialectError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("expression at offset {position}: {source}")]
    Expression {
        position: usize,
        #[source]
        source: ExpressionError,
    },

    #[error(transparent)]
    Evaluation(EvaluationError),

    #[error("evaluation cancelled")]
    Cancelled,

    #[error("evaluation worker failed: {0}")]
    Worker(String),
}

impl From<EvaluationError> for TemplateError {
    fn from(e: EvaluationError) -> Self {
        match e {
            EvaluationError::Cancelled => TemplateError::Cancelled,
            other => TemplateError::Evaluation(other),
        }
    }
}

impl TemplateError {
    /// `true` for errors raised while compiling (the template text is at fault).
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            TemplateError::Dialect(_) | TemplateError::Parse(_) | TemplateError::Expression { .. }
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_never_wrapped() {
        let e: TemplateError = EvaluationError::Cancelled.into();
        assert_eq!(e, TemplateError::Cancelled);
        assert!(!e.is_compile_error());
    }

    #[test]
    fn unterminated_lists_candidates() {
        let e = ParseError::UnterminatedDirective {
            candidates: vec!["If".into(), "IfElse".into()],
            position: 3,
        };
        let msg = e.to_string();
        assert!(msg.contains("If, IfElse"), "{msg}");
        assert!(msg.contains("offset 3"), "{msg}");
    }

    #[test]
    fn directive_error_names_directive() {
        let e = EvaluationError::Directive {
            directive: "ForEach".into(),
            position: 7,
            source: Box::new(EvaluationError::UndefinedIdentifier { name: "xs".into() }),
        };
        assert_eq!(
            e.to_string(),
            "directive ForEach at offset 7 failed: `xs` is not defined"
        );
    }
}
