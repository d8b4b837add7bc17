//! The directive contract.
//!
//! A directive spans one or more tags.  The evaluator drives it as a state
//! machine: for the tag it is positioned on, it evaluates the tag's
//! placeholders, calls [`Directive::execute`], writes any emitted text and
//! follows the returned [`FlowDecision`] until the directive terminates.

use std::any::Any;
use std::fmt;

use super::context::EvaluationContext;
use super::error::EvaluationError;
use super::value::{SequenceIter, Value};

/// What the evaluator does after a tag activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDecision {
    /// Stop this directive instance.
    Terminate,
    /// Jump back to the first tag.
    Restart,
    /// Evaluate the content after the current tag, then move to the next tag.
    Evaluate,
    /// Move to the next tag without evaluating the content in between.
    Skip,
}

/// Cursor of a loop directive.
#[derive(Debug, Clone)]
pub struct LoopState {
    pub variable: String,
    pub items: SequenceIter,
}

/// Per-activation state of a directive instance.  It starts as
/// [`DirectiveState::Initial`] and lives until the directive terminates.
#[derive(Debug, Default)]
pub enum DirectiveState {
    #[default]
    Initial,
    Branch(bool),
    Loop(LoopState),
    Countdown(i64),
    /// For directives registered by the host.
    Custom(Box<dyn Any + Send>),
}

impl DirectiveState {
    pub fn is_initial(&self) -> bool {
        matches!(self, DirectiveState::Initial)
    }
}

pub type Activation = (FlowDecision, Option<String>);

pub trait Directive: Send + Sync + fmt::Debug {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Tag markup, in order (see [`Tag::parse`](super::tag::Tag::parse)).
    fn tags(&self) -> Vec<&str>;

    /// Handle the activation of tag `tag_index`.
    ///
    /// `components` holds one value per placeholder of that tag, in order:
    /// identifier slots arrive as strings, expression slots evaluated.
    fn execute(
        &self,
        tag_index: usize,
        components: &[Value],
        state: &mut DirectiveState,
        ctx: &mut EvaluationContext,
    ) -> Result<Activation, EvaluationError>;
}

/// The component at `i`, or a directive failure naming what is missing.
pub fn component(components: &[Value], i: usize) -> Result<&Value, EvaluationError> {
    components
        .get(i)
        .ok_or_else(|| EvaluationError::Failed(format!("missing tag component {i}")))
}

/// The identifier slot at `i`.
pub fn identifier(components: &[Value], i: usize) -> Result<&str, EvaluationError> {
    match component(components, i)? {
        Value::Str(name) => Ok(name),
        other => Err(EvaluationError::Failed(format!(
            "tag component {i} is a {}, not an identifier",
            other.type_name()
        ))),
    }
}
