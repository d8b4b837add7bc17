//! Runtime value type for template evaluation.
//!
//! Templates are dynamically typed.  Every host numeric type narrows to
//! [`Value::Number`] on the way in, so the coercion rules in
//! [`convert`](super::convert) only ever discriminate number, boolean,
//! string, sequence and object.

use std::fmt;
use std::sync::Arc;

use super::reflect::Object;

/// A template runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Bool(bool),
    Number(f64),
    Str(String),
    Seq(Sequence),
    Object(Arc<dyn Object>),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Wrap a host object.
    pub fn object(obj: impl Object + 'static) -> Self {
        Value::Object(Arc::new(obj))
    }

    /// Structural identity, used for equality of non-primitive operands.
    pub fn same(&self, other: &Value) -> bool {
        self == other
    }

    /// Name of the runtime type, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Seq(_) => "sequence",
            Value::Object(_) => "object",
        }
    }
}

/// Structural identity: numbers compare as IEEE doubles, objects by pointer,
/// sequences element-wise.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
            }
            _ => false,
        }
    }
}

/// Literal rendering, used when a value has to be quoted in a diagnostic.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Seq(seq) => write!(f, "<sequence of {}>", seq.len()),
            Value::Object(_) => write!(f, "<object>"),
        }
    }
}

// ── Sequence ──────────────────────────────────────────────────────────────────

/// An ordered sequence of values.  Ranges are lazy: `1..1000000` never
/// allocates.
#[derive(Debug, Clone)]
pub enum Sequence {
    List(Arc<Vec<Value>>),
    /// Inclusive, ascending.
    Range { start: i64, end: i64 },
}

impl Sequence {
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Sequence::List(Arc::new(items.into_iter().collect()))
    }

    pub fn len(&self) -> usize {
        match self {
            Sequence::List(items) => items.len(),
            Sequence::Range { start, end } if end >= start => {
                usize::try_from(end.abs_diff(*start)).map_or(usize::MAX, |n| n.saturating_add(1))
            }
            Sequence::Range { .. } => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        match self {
            Sequence::List(items) => items.get(index).cloned(),
            Sequence::Range { start, end } => {
                let offset = i64::try_from(index).ok()?;
                let n = start.checked_add(offset)?;
                (n <= *end).then(|| Value::Number(n as f64))
            }
        }
    }

    /// An owned cursor over the sequence, suitable for storing in directive state.
    pub fn iter(&self) -> SequenceIter {
        SequenceIter {
            seq: self.clone(),
            next: 0,
        }
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Sequence::Range { start: a, end: b }, Sequence::Range { start: c, end: d }) => {
                (a == c && b == d) || (self.is_empty() && other.is_empty())
            }
            _ => self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b),
        }
    }
}

/// Cursor over a [`Sequence`].
#[derive(Debug, Clone)]
pub struct SequenceIter {
    seq: Sequence,
    next: usize,
}

impl SequenceIter {
    /// The element the next call to `next()` will return.
    pub fn peek(&self) -> Option<Value> {
        self.seq.get(self.next)
    }

    pub fn has_next(&self) -> bool {
        self.next < self.seq.len()
    }
}

impl Iterator for SequenceIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let v = self.seq.get(self.next)?;
        self.next += 1;
        Some(v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.seq.len().saturating_sub(self.next);
        (left, Some(left))
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

macro_rules! number_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

number_from!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<Sequence> for Value {
    fn from(seq: Sequence) -> Self {
        Value::Seq(seq)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Seq(Sequence::List(Arc::new(items)))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Undefined, Into::into)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_types_narrow_to_number() {
        assert_eq!(Value::from(42i32), Value::Number(42.0));
        assert_eq!(Value::from(7u64), Value::Number(7.0));
        assert_eq!(Value::from(1.5f32), Value::Number(1.5));
    }

    #[test]
    fn option_none_is_undefined() {
        assert_eq!(Value::from(None::<i32>), Value::Undefined);
        assert_eq!(Value::from(Some("x")), Value::Str("x".into()));
    }

    #[test]
    fn range_is_lazy_and_inclusive() {
        let seq = Sequence::Range { start: 1, end: 3 };
        assert_eq!(seq.len(), 3);
        let items: Vec<Value> = seq.iter().collect();
        assert_eq!(items, vec![Value::from(1), Value::from(2), Value::from(3)]);

        let huge = Sequence::Range { start: 0, end: i64::MAX };
        assert_eq!(huge.get(5), Some(Value::from(5)));
    }

    #[test]
    fn descending_range_is_empty() {
        let seq = Sequence::Range { start: 2, end: 1 };
        assert!(seq.is_empty());
        assert_eq!(seq.iter().next(), None);
    }

    #[test]
    fn sequence_iter_peek() {
        let mut it = Sequence::list(vec![Value::from("a"), Value::from("b")]).iter();
        assert_eq!(it.peek(), Some(Value::from("a")));
        it.next();
        assert!(it.has_next());
        it.next();
        assert!(!it.has_next());
        assert_eq!(it.peek(), None);
    }

    #[test]
    fn list_equals_matching_range() {
        let list = Sequence::list(vec![Value::from(1), Value::from(2)]);
        assert_eq!(list, Sequence::Range { start: 1, end: 2 });
    }

    #[test]
    fn nan_is_not_equal_to_itself() {
        assert_ne!(Value::Number(f64::NAN), Value::Number(f64::NAN));
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::Undefined.type_name(), "undefined");
        assert_eq!(Value::from(Vec::<Value>::new()).type_name(), "sequence");
    }
}
