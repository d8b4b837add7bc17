//! Tag-directive templating.
//!
//! A template is text with tags between the dialect's delimiters (`{` and
//! `}` by default).  Each tag belongs to a directive:
//!
//! - Interpolation: `{expr}`, `{expr IF cond}`
//! - Conditionals: `{IF c THEN}` … `{ELSE}` … `{END}`
//! - Loops: `{FOR EACH x IN xs}` … `{WITH}` … `{END}`, `{REPEAT n TIMES}` … `{END}`
//! - `{SET x TO expr}`, `{PREFORMATTED}` … `{END}`
//!
//! Operators, directives, constants and comparison rules are all supplied
//! by a [`Dialect`].
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use stencil::template::{Dialect, EvaluationContext, Template};
//!
//! let dialect = Arc::new(Dialect::standard().unwrap());
//! let template =
//!     Template::compile(Arc::clone(&dialect), "{FOR EACH n IN 1..3}{n * n}{WITH} {END}").unwrap();
//! let mut ctx = EvaluationContext::new(dialect);
//! assert_eq!(template.render(&mut ctx).unwrap(), "1 4 9");
//! ```

pub mod builder;
pub mod context;
pub mod convert;
pub mod dialect;
pub mod directive;
pub mod directives;
pub mod error;
pub mod expression;
pub mod interpreter;
pub mod lexer;
pub mod operator;
pub mod reflect;
pub mod render;
pub mod tag;
pub mod tokenizer;
pub mod value;

// Re-exports for convenience.
pub use context::{Cancellation, EvaluationContext, EvaluationOptions, StateObject};
pub use convert::{Primitives, TypeConverter};
pub use dialect::{Dialect, DialectBuilder, IdentifierCase, StringComparison};
pub use directive::{Activation, Directive, DirectiveState, FlowDecision};
pub use error::{DialectError, EvaluationError, ExpressionError, ParseError, TemplateError};
pub use reflect::{Object, Record};
pub use render::Template;
pub use value::{Sequence, Value};
