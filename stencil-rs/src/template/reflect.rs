//! Member access on host objects and primitives.
//!
//! Templates bind to arbitrary host data, so member lookup is a runtime
//! capability: a host type implements [`Object`] and the evaluator asks it
//! for members by name.  Strings and sequences expose a handful of built-in
//! members so common formatting does not need a host object at all.

use std::fmt;

use super::convert::TypeConverter;
use super::dialect::IdentifierCase;
use super::value::{Sequence, Value};

/// A host object readable from templates.
///
/// `Ok(None)` means "no such member"; the context decides whether that is an
/// error.  `Err` means the member exists but failed.
pub trait Object: Send + Sync + fmt::Debug {
    fn read(&self, name: &str, case: IdentifierCase) -> Result<Option<Value>, String>;

    fn invoke(
        &self,
        name: &str,
        args: &[Value],
        case: IdentifierCase,
    ) -> Result<Option<Value>, String> {
        let _ = (name, args, case);
        Ok(None)
    }

    /// Text used when the object itself is interpolated.
    fn to_text(&self) -> Option<String> {
        None
    }
}

// ── Record ────────────────────────────────────────────────────────────────────

/// An insertion-ordered bag of named values.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace (exact name match).
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str, case: IdentifierCase) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| case.matches(n, name))
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl Object for Record {
    fn read(&self, name: &str, case: IdentifierCase) -> Result<Option<Value>, String> {
        Ok(self.get(name, case).cloned())
    }

    fn invoke(
        &self,
        name: &str,
        args: &[Value],
        case: IdentifierCase,
    ) -> Result<Option<Value>, String> {
        if case.matches(name, "has") {
            let Some(Value::Str(field)) = args.first() else {
                return Err("has() expects a member name".into());
            };
            return Ok(Some(Value::Bool(self.get(field, case).is_some())));
        }
        Ok(None)
    }
}

impl From<Record> for Value {
    fn from(rec: Record) -> Self {
        Value::object(rec)
    }
}

// ── Member dispatch ───────────────────────────────────────────────────────────

/// Read a member of any value.
pub fn read_member(
    target: &Value,
    name: &str,
    case: IdentifierCase,
) -> Result<Option<Value>, String> {
    match target {
        Value::Str(s) if case.matches(name, "length") => Ok(Some(s.chars().count().into())),
        Value::Seq(seq) if case.matches(name, "length") => Ok(Some(seq.len().into())),
        Value::Object(obj) => obj.read(name, case),
        _ => Ok(None),
    }
}

/// Invoke a method on any value.
pub fn invoke_member(
    target: &Value,
    name: &str,
    args: &[Value],
    case: IdentifierCase,
    conv: &dyn TypeConverter,
) -> Result<Option<Value>, String> {
    match target {
        Value::Str(s) => Ok(invoke_string(s, name, args, case, conv)),
        Value::Seq(seq) if case.matches(name, "join") => {
            let sep = args.first().map(|v| conv.to_string(v)).unwrap_or_default();
            let parts: Vec<String> = seq.iter().map(|item| conv.to_string(&item)).collect();
            Ok(Some(parts.join(&sep).into()))
        }
        Value::Object(obj) => obj.invoke(name, args, case),
        _ => Ok(None),
    }
}

fn invoke_string(
    s: &str,
    name: &str,
    args: &[Value],
    case: IdentifierCase,
    conv: &dyn TypeConverter,
) -> Option<Value> {
    let arg = |i: usize| args.get(i).map(|v| conv.to_string(v)).unwrap_or_default();
    if case.matches(name, "upper") {
        Some(s.to_uppercase().into())
    } else if case.matches(name, "lower") {
        Some(s.to_lowercase().into())
    } else if case.matches(name, "trim") {
        Some(s.trim().into())
    } else if case.matches(name, "contains") {
        Some(s.contains(arg(0).as_str()).into())
    } else {
        None
    }
}

/// `target[key]`.
pub fn index(
    target: &Value,
    key: &Value,
    case: IdentifierCase,
    conv: &dyn TypeConverter,
) -> Result<Option<Value>, String> {
    match target {
        Value::Seq(seq) => Ok(position(conv.to_number(key)).and_then(|i| seq.get(i))),
        Value::Str(s) => Ok(position(conv.to_number(key))
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::Str(c.to_string()))),
        Value::Object(obj) => obj.read(&conv.to_string(key), case),
        _ => Ok(None),
    }
}

fn position(n: f64) -> Option<usize> {
    (n.is_finite() && n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}

/// Convenience for building list values from host iterators.
pub fn list<I, T>(items: I) -> Value
where
    I: IntoIterator<Item = T>,
    T: Into<Value>,
{
    Value::Seq(Sequence::list(items.into_iter().map(Into::into)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::convert::Primitives;

    const CI: IdentifierCase = IdentifierCase::Insensitive;
    const CS: IdentifierCase = IdentifierCase::Sensitive;

    #[test]
    fn record_lookup_honours_case() {
        let rec = Record::new().with("Name", "Ada");
        assert_eq!(rec.read("name", CI), Ok(Some(Value::from("Ada"))));
        assert_eq!(rec.read("name", CS), Ok(None));
        assert_eq!(rec.read("Name", CS), Ok(Some(Value::from("Ada"))));
    }

    #[test]
    fn record_insert_replaces() {
        let mut rec = Record::new();
        rec.insert("x", 1);
        rec.insert("x", 2);
        assert_eq!(rec.len(), 1);
        assert_eq!(rec.get("x", CS), Some(&Value::from(2)));
    }

    #[test]
    fn record_has_method() {
        let rec = Record::new().with("a", 1);
        assert_eq!(
            rec.invoke("has", &[Value::from("a")], CI),
            Ok(Some(Value::Bool(true)))
        );
        assert!(rec.invoke("has", &[], CI).is_err());
        assert_eq!(rec.invoke("nope", &[], CI), Ok(None));
    }

    #[test]
    fn builtin_members() {
        assert_eq!(
            read_member(&Value::from("héllo"), "Length", CI),
            Ok(Some(Value::from(5)))
        );
        assert_eq!(
            read_member(&list([1, 2, 3]), "length", CS),
            Ok(Some(Value::from(3)))
        );
        assert_eq!(read_member(&Value::from(1), "length", CI), Ok(None));
    }

    #[test]
    fn builtin_methods() {
        let conv = Primitives::default();
        assert_eq!(
            invoke_member(&Value::from("abc"), "upper", &[], CI, &conv),
            Ok(Some(Value::from("ABC")))
        );
        assert_eq!(
            invoke_member(&list([1, 2]), "join", &[Value::from("-")], CI, &conv),
            Ok(Some(Value::from("1-2")))
        );
        assert_eq!(
            invoke_member(&Value::from("abc"), "contains", &[Value::from("bc")], CI, &conv),
            Ok(Some(Value::Bool(true)))
        );
    }

    #[test]
    fn indexing() {
        let conv = Primitives::default();
        let xs = list(["a", "b"]);
        assert_eq!(index(&xs, &Value::from(1), CI, &conv), Ok(Some(Value::from("b"))));
        assert_eq!(index(&xs, &Value::from(2), CI, &conv), Ok(None));
        assert_eq!(index(&xs, &Value::from(0.5), CI, &conv), Ok(None));
        assert_eq!(
            index(&Value::from("xyz"), &Value::from(2), CI, &conv),
            Ok(Some(Value::from("z")))
        );
        let rec = Value::object(Record::new().with("k", 9));
        assert_eq!(index(&rec, &Value::from("k"), CI, &conv), Ok(Some(Value::from(9))));
    }
}
