//! Evaluation context: the frame stack, the self object and run options.
//!
//! Frames are pushed when a multi-tag directive starts and popped when it
//! terminates, on success and failure alike.  Writes go to the top frame,
//! reads walk the stack top-down and then fall back to the self object.
//!
//! A context belongs to one evaluation at a time.  Compiled templates are
//! shared; contexts are not.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::trace;

use super::convert::TypeConverter;
use super::dialect::{Dialect, StringComparison};
use super::error::EvaluationError;
use super::expression::ExpressionContext;
use super::reflect;
use super::value::Value;

// ── Options ───────────────────────────────────────────────────────────────────

/// Error policy of an evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationOptions {
    /// Swallow directive failures instead of aborting (cancellation is
    /// never swallowed).
    pub ignore_evaluation_errors: bool,
    /// Unknown free identifiers fail instead of evaluating to undefined.
    pub strict_identifiers: bool,
    /// Unknown members and methods fail instead of evaluating to undefined.
    pub strict_members: bool,
}

/// Cooperative cancellation flag, shareable across threads.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// An opaque marker scoped to one frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateObject(Cow<'static, str>);

impl StateObject {
    /// Set by the `PREFORMATTED` directive; text in its frame is written verbatim.
    pub const PREFORMATTED: StateObject = StateObject(Cow::Borrowed("preformatted"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        StateObject(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

// ── Frames ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Frame {
    variables: HashMap<String, Value>,
    state: HashSet<StateObject>,
}

#[derive(Debug)]
pub struct EvaluationContext {
    dialect: Arc<Dialect>,
    frames: Vec<Frame>,
    self_object: Option<Value>,
    options: EvaluationOptions,
    cancellation: Cancellation,
}

impl EvaluationContext {
    pub fn new(dialect: Arc<Dialect>) -> Self {
        EvaluationContext {
            dialect,
            frames: vec![Frame::default()],
            self_object: None,
            options: EvaluationOptions::default(),
            cancellation: Cancellation::default(),
        }
    }

    /// Object consulted for names no frame defines.
    pub fn with_self(mut self, value: impl Into<Value>) -> Self {
        self.self_object = Some(value.into());
        self
    }

    pub fn with_options(mut self, options: EvaluationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn options(&self) -> EvaluationOptions {
        self.options
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn check_cancelled(&self) -> Result<(), EvaluationError> {
        if self.cancellation.is_cancelled() {
            Err(EvaluationError::Cancelled)
        } else {
            Ok(())
        }
    }

    // ── Frames ────────────────────────────────────────────────────────────────

    /// Number of open frames, the root included.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn open_frame(&mut self) {
        self.frames.push(Frame::default());
        trace!(depth = self.frames.len(), "frame opened");
    }

    /// Pop the top frame.  The root frame stays; returns `false` if asked to
    /// close it.
    pub fn close_frame(&mut self) -> bool {
        if self.frames.len() <= 1 {
            return false;
        }
        self.frames.pop();
        trace!(depth = self.frames.len(), "frame closed");
        true
    }

    fn top(&mut self) -> &mut Frame {
        if self.frames.is_empty() {
            self.frames.push(Frame::default());
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    // ── Variables ─────────────────────────────────────────────────────────────

    /// Bind `name` in the top frame.
    pub fn set_variable(&mut self, name: &str, value: impl Into<Value>) {
        let key = self.dialect.identifiers().key(name).into_owned();
        self.top().variables.insert(key, value.into());
    }

    /// Look `name` up in the frames, top-down, then on the self object.
    pub fn variable(&self, name: &str) -> Result<Option<Value>, EvaluationError> {
        let key = self.dialect.identifiers().key(name);
        for frame in self.frames.iter().rev() {
            if let Some(v) = frame.variables.get(key.as_ref()) {
                return Ok(Some(v.clone()));
            }
        }
        match &self.self_object {
            Some(obj) => reflect::read_member(obj, name, self.dialect.identifiers()).map_err(
                |message| EvaluationError::Reflection {
                    member: name.to_owned(),
                    message,
                },
            ),
            None => Ok(None),
        }
    }

    // ── State objects ─────────────────────────────────────────────────────────

    pub fn add_state_object(&mut self, obj: StateObject) {
        self.top().state.insert(obj);
    }

    pub fn remove_state_object(&mut self, obj: &StateObject) -> bool {
        self.top().state.remove(obj)
    }

    /// Only the top frame is consulted.
    pub fn contains_state_object(&self, obj: &StateObject) -> bool {
        self.frames.last().is_some_and(|f| f.state.contains(obj))
    }

    // ── Not-found policy ──────────────────────────────────────────────────────

    fn missing_member(&self, member: &str) -> Result<Value, EvaluationError> {
        if self.options.strict_members {
            Err(EvaluationError::UnknownMember {
                member: member.to_owned(),
            })
        } else {
            Ok(Value::Undefined)
        }
    }

    fn missing_identifier(&self, name: &str) -> Result<Value, EvaluationError> {
        if self.options.strict_identifiers {
            Err(EvaluationError::UndefinedIdentifier {
                name: name.to_owned(),
            })
        } else {
            Ok(Value::Undefined)
        }
    }
}

fn reflection_error(member: &str) -> impl FnOnce(String) -> EvaluationError + '_ {
    move |message| EvaluationError::Reflection {
        member: member.to_owned(),
        message,
    }
}

impl ExpressionContext for EvaluationContext {
    fn converter(&self) -> &dyn TypeConverter {
        self.dialect.converter()
    }

    fn strings(&self) -> StringComparison {
        self.dialect.strings()
    }

    fn variable(&mut self, name: &str) -> Result<Value, EvaluationError> {
        match EvaluationContext::variable(self, name)? {
            Some(v) => Ok(v),
            None => self.missing_identifier(name),
        }
    }

    fn is_defined(&mut self, name: &str) -> bool {
        matches!(EvaluationContext::variable(self, name), Ok(Some(_)))
    }

    fn member(&mut self, target: &Value, name: &str) -> Result<Value, EvaluationError> {
        let case = self.dialect.identifiers();
        match reflect::read_member(target, name, case).map_err(reflection_error(name))? {
            Some(v) => Ok(v),
            None => self.missing_member(name),
        }
    }

    fn invoke(
        &mut self,
        target: Option<&Value>,
        name: &str,
        args: &[Value],
    ) -> Result<Value, EvaluationError> {
        let case = self.dialect.identifiers();
        let conv = self.dialect.converter();
        match target.or(self.self_object.as_ref()) {
            Some(t) => match reflect::invoke_member(t, name, args, case, conv)
                .map_err(reflection_error(name))?
            {
                Some(v) => Ok(v),
                None if target.is_some() => self.missing_member(name),
                None => self.missing_identifier(name),
            },
            None => self.missing_identifier(name),
        }
    }

    fn index(&mut self, target: &Value, key: &Value) -> Result<Value, EvaluationError> {
        let case = self.dialect.identifiers();
        let found = reflect::index(target, key, case, self.dialect.converter())
            .map_err(|message| EvaluationError::Reflection {
                member: key.to_string(),
                message,
            })?;
        Ok(found.unwrap_or_default())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::reflect::Record;

    fn ctx() -> EvaluationContext {
        EvaluationContext::new(Arc::new(Dialect::standard().unwrap()))
    }

    #[test]
    fn writes_go_to_top_frame() {
        let mut c = ctx();
        c.set_variable("x", 1);
        c.open_frame();
        c.set_variable("x", 2);
        c.set_variable("y", 3);
        assert_eq!(c.variable("x"), Ok(Some(Value::from(2))));
        assert!(c.close_frame());
        assert_eq!(c.variable("x"), Ok(Some(Value::from(1))));
        assert_eq!(c.variable("y"), Ok(None));
    }

    #[test]
    fn debug_output_shows_frames() {
        let mut c = ctx();
        c.set_variable("answer", 42);
        let shown = format!("{c:?}");
        assert!(shown.starts_with("EvaluationContext"), "{shown}");
        assert!(shown.contains("answer"), "{shown}");
    }

    #[test]
    fn root_frame_cannot_close() {
        let mut c = ctx();
        assert_eq!(c.depth(), 1);
        assert!(!c.close_frame());
        assert_eq!(c.depth(), 1);
    }

    #[test]
    fn names_follow_dialect_case() {
        let mut c = ctx();
        c.set_variable("Total", 5);
        assert_eq!(c.variable("TOTAL"), Ok(Some(Value::from(5))));

        let mut strict = EvaluationContext::new(Arc::new(Dialect::strict().unwrap()));
        strict.set_variable("Total", 5);
        assert_eq!(strict.variable("total"), Ok(None));
    }

    #[test]
    fn self_object_fallback() {
        let mut c = ctx().with_self(Record::new().with("name", "ada"));
        assert_eq!(c.variable("name"), Ok(Some(Value::from("ada"))));
        c.set_variable("name", "bob");
        assert_eq!(c.variable("name"), Ok(Some(Value::from("bob"))));
    }

    #[test]
    fn state_objects_are_top_frame_only() {
        let mut c = ctx();
        c.add_state_object(StateObject::PREFORMATTED);
        assert!(c.contains_state_object(&StateObject::PREFORMATTED));
        c.open_frame();
        assert!(!c.contains_state_object(&StateObject::PREFORMATTED));
        c.close_frame();
        assert!(c.remove_state_object(&StateObject::PREFORMATTED));
        assert!(!c.contains_state_object(&StateObject::PREFORMATTED));
    }

    #[test]
    fn not_found_policy_is_uniform() {
        let mut lenient = ctx();
        let target = Value::object(Record::new());
        assert_eq!(ExpressionContext::variable(&mut lenient, "nope"), Ok(Value::Undefined));
        assert_eq!(lenient.member(&target, "nope"), Ok(Value::Undefined));
        assert_eq!(lenient.invoke(Some(&target), "nope", &[]), Ok(Value::Undefined));

        let mut strict = ctx().with_options(EvaluationOptions {
            strict_identifiers: true,
            strict_members: true,
            ..Default::default()
        });
        assert_eq!(
            ExpressionContext::variable(&mut strict, "nope"),
            Err(EvaluationError::UndefinedIdentifier { name: "nope".into() })
        );
        assert_eq!(
            strict.member(&target, "nope"),
            Err(EvaluationError::UnknownMember { member: "nope".into() })
        );
        assert_eq!(
            strict.invoke(Some(&target), "nope", &[]),
            Err(EvaluationError::UnknownMember { member: "nope".into() })
        );
    }

    #[test]
    fn free_calls_go_to_self_object() {
        let mut c = ctx().with_self(Record::new().with("a", 1));
        assert_eq!(
            c.invoke(None, "has", &[Value::from("a")]),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn cancellation_is_shared() {
        let token = Cancellation::new();
        let c = ctx().with_cancellation(token.clone());
        assert_eq!(c.check_cancelled(), Ok(()));
        token.cancel();
        assert_eq!(c.check_cancelled(), Err(EvaluationError::Cancelled));
    }
}
