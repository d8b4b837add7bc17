//! Standard directives.
//!
//! | directive | tags |
//! |---|---|
//! | [`Interpolation`] | `{$}` |
//! | [`ConditionalInterpolation`] | `{$ IF $}` |
//! | [`If`] | `{IF $ THEN}…{END}` |
//! | [`IfElse`] | `{IF $ THEN}…{ELSE}…{END}` |
//! | [`ForEach`] | `{FOR EACH ? IN $}…{END}` |
//! | [`SeparatedForEach`] | `{FOR EACH ? IN $}…{WITH}…{END}` |
//! | [`Repeat`] | `{REPEAT $ TIMES}…{END}` |
//! | [`Preformatted`] | `{PREFORMATTED}…{END}` |
//! | [`Set`] | `{SET ? TO $}` |

use std::sync::Arc;

use super::context::{EvaluationContext, StateObject};
use super::directive::{
    component, identifier, Activation, Directive, DirectiveState, FlowDecision, LoopState,
};
use super::error::EvaluationError;
use super::value::Value;

use FlowDecision::{Evaluate, Restart, Skip, Terminate};

/// Every standard directive, in registration order.
pub fn standard() -> Vec<Arc<dyn Directive>> {
    vec![
        Arc::new(Interpolation),
        Arc::new(ConditionalInterpolation),
        Arc::new(If),
        Arc::new(IfElse),
        Arc::new(ForEach),
        Arc::new(SeparatedForEach),
        Arc::new(Repeat),
        Arc::new(Preformatted),
        Arc::new(Set),
    ]
}

fn truthy(ctx: &EvaluationContext, v: &Value) -> bool {
    ctx.dialect().converter().to_bool(v)
}

fn text(ctx: &EvaluationContext, v: &Value) -> String {
    ctx.dialect().converter().to_string(v)
}

fn unexpected_tag(directive: &str, tag_index: usize) -> EvaluationError {
    EvaluationError::Failed(format!("{directive} has no tag {tag_index}"))
}

// ── Interpolation ─────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Interpolation;

impl Directive for Interpolation {
    fn name(&self) -> &str {
        "Interpolation"
    }

    fn tags(&self) -> Vec<&str> {
        vec!["$"]
    }

    fn execute(
        &self,
        _tag_index: usize,
        components: &[Value],
        _state: &mut DirectiveState,
        ctx: &mut EvaluationContext,
    ) -> Result<Activation, EvaluationError> {
        let value = component(components, 0)?;
        Ok((Terminate, Some(text(ctx, value))))
    }
}

#[derive(Debug)]
pub struct ConditionalInterpolation;

impl Directive for ConditionalInterpolation {
    fn name(&self) -> &str {
        "ConditionalInterpolation"
    }

    fn tags(&self) -> Vec<&str> {
        vec!["$ IF $"]
    }

    fn execute(
        &self,
        _tag_index: usize,
        components: &[Value],
        _state: &mut DirectiveState,
        ctx: &mut EvaluationContext,
    ) -> Result<Activation, EvaluationError> {
        let value = component(components, 0)?;
        let emit = truthy(ctx, component(components, 1)?);
        Ok((Terminate, emit.then(|| text(ctx, value))))
    }
}

// ── Conditionals ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct If;

impl Directive for If {
    fn name(&self) -> &str {
        "If"
    }

    fn tags(&self) -> Vec<&str> {
        vec!["IF $ THEN", "END"]
    }

    fn execute(
        &self,
        tag_index: usize,
        components: &[Value],
        _state: &mut DirectiveState,
        ctx: &mut EvaluationContext,
    ) -> Result<Activation, EvaluationError> {
        match tag_index {
            0 if truthy(ctx, component(components, 0)?) => Ok((Evaluate, None)),
            0 | 1 => Ok((Terminate, None)),
            i => Err(unexpected_tag(self.name(), i)),
        }
    }
}

#[derive(Debug)]
pub struct IfElse;

impl Directive for IfElse {
    fn name(&self) -> &str {
        "IfElse"
    }

    fn tags(&self) -> Vec<&str> {
        vec!["IF $ THEN", "ELSE", "END"]
    }

    fn execute(
        &self,
        tag_index: usize,
        components: &[Value],
        state: &mut DirectiveState,
        ctx: &mut EvaluationContext,
    ) -> Result<Activation, EvaluationError> {
        match tag_index {
            0 => {
                let taken = truthy(ctx, component(components, 0)?);
                *state = DirectiveState::Branch(taken);
                Ok((if taken { Evaluate } else { Skip }, None))
            }
            1 => match state {
                DirectiveState::Branch(false) => Ok((Evaluate, None)),
                _ => Ok((Terminate, None)),
            },
            2 => Ok((Terminate, None)),
            i => Err(unexpected_tag(self.name(), i)),
        }
    }
}

// ── Loops ─────────────────────────────────────────────────────────────────────

/// Bind the next item of the loop, or report that there is none.
fn next_item(
    components: &[Value],
    state: &mut DirectiveState,
    ctx: &mut EvaluationContext,
) -> Result<bool, EvaluationError> {
    if state.is_initial() {
        let variable = identifier(components, 0)?.to_owned();
        let source = component(components, 1)?;
        let Some(seq) = ctx.dialect().converter().to_sequence(source) else {
            return Ok(false);
        };
        *state = DirectiveState::Loop(LoopState {
            variable,
            items: seq.iter(),
        });
    }
    let DirectiveState::Loop(lp) = state else {
        return Err(EvaluationError::Failed("loop state lost".into()));
    };
    match lp.items.next() {
        Some(item) => {
            ctx.set_variable(&lp.variable, item);
            Ok(true)
        }
        None => Ok(false),
    }
}

#[derive(Debug)]
pub struct ForEach;

impl Directive for ForEach {
    fn name(&self) -> &str {
        "ForEach"
    }

    fn tags(&self) -> Vec<&str> {
        vec!["FOR EACH ? IN $", "END"]
    }

    fn execute(
        &self,
        tag_index: usize,
        components: &[Value],
        state: &mut DirectiveState,
        ctx: &mut EvaluationContext,
    ) -> Result<Activation, EvaluationError> {
        match tag_index {
            0 if next_item(components, state, ctx)? => Ok((Evaluate, None)),
            0 => Ok((Terminate, None)),
            1 => Ok((Restart, None)),
            i => Err(unexpected_tag(self.name(), i)),
        }
    }
}

#[derive(Debug)]
pub struct SeparatedForEach;

impl Directive for SeparatedForEach {
    fn name(&self) -> &str {
        "SeparatedForEach"
    }

    fn tags(&self) -> Vec<&str> {
        vec!["FOR EACH ? IN $", "WITH", "END"]
    }

    fn execute(
        &self,
        tag_index: usize,
        components: &[Value],
        state: &mut DirectiveState,
        ctx: &mut EvaluationContext,
    ) -> Result<Activation, EvaluationError> {
        match tag_index {
            0 if next_item(components, state, ctx)? => Ok((Evaluate, None)),
            0 => Ok((Terminate, None)),
            1 => match state {
                DirectiveState::Loop(lp) if lp.items.has_next() => Ok((Evaluate, None)),
                _ => Ok((Terminate, None)),
            },
            2 => Ok((Restart, None)),
            i => Err(unexpected_tag(self.name(), i)),
        }
    }
}

#[derive(Debug)]
pub struct Repeat;

impl Directive for Repeat {
    fn name(&self) -> &str {
        "Repeat"
    }

    fn tags(&self) -> Vec<&str> {
        vec!["REPEAT $ TIMES", "END"]
    }

    fn execute(
        &self,
        tag_index: usize,
        components: &[Value],
        state: &mut DirectiveState,
        ctx: &mut EvaluationContext,
    ) -> Result<Activation, EvaluationError> {
        match tag_index {
            0 => {
                if state.is_initial() {
                    let n = ctx.dialect().converter().to_integer(component(components, 0)?);
                    *state = DirectiveState::Countdown(i64::from(n));
                }
                match state {
                    DirectiveState::Countdown(left) if *left > 0 => {
                        *left -= 1;
                        Ok((Evaluate, None))
                    }
                    _ => Ok((Terminate, None)),
                }
            }
            1 => Ok((Restart, None)),
            i => Err(unexpected_tag(self.name(), i)),
        }
    }
}

// ── Scoping ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Preformatted;

impl Directive for Preformatted {
    fn name(&self) -> &str {
        "Preformatted"
    }

    fn tags(&self) -> Vec<&str> {
        vec!["PREFORMATTED", "END"]
    }

    fn execute(
        &self,
        tag_index: usize,
        _components: &[Value],
        _state: &mut DirectiveState,
        ctx: &mut EvaluationContext,
    ) -> Result<Activation, EvaluationError> {
        match tag_index {
            0 => {
                ctx.add_state_object(StateObject::PREFORMATTED);
                Ok((Evaluate, None))
            }
            1 => Ok((Terminate, None)),
            i => Err(unexpected_tag(self.name(), i)),
        }
    }
}

#[derive(Debug)]
pub struct Set;

impl Directive for Set {
    fn name(&self) -> &str {
        "Set"
    }

    fn tags(&self) -> Vec<&str> {
        vec!["SET ? TO $"]
    }

    fn execute(
        &self,
        _tag_index: usize,
        components: &[Value],
        _state: &mut DirectiveState,
        ctx: &mut EvaluationContext,
    ) -> Result<Activation, EvaluationError> {
        let name = identifier(components, 0)?.to_owned();
        let value = component(components, 1)?.clone();
        ctx.set_variable(&name, value);
        Ok((Terminate, None))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
