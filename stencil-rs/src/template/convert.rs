//! Primitive type conversion.
//!
//! Operators and directives never inspect a [`Value`] directly when they need
//! a number, a string, a boolean or a sequence: they ask the dialect's
//! [`TypeConverter`].  The default [`Primitives`] converter follows loose
//! ECMAScript-style coercion.

use super::value::{Sequence, Value};

/// Primitive type of a value after numeric narrowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Undefined,
    Boolean,
    Number,
    String,
    Sequence,
    Object,
}

/// Coercion rules shared by every operator and directive of a dialect.
pub trait TypeConverter: Send + Sync {
    /// NaN when the value has no numeric interpretation.
    fn to_number(&self, v: &Value) -> f64;

    /// `Undefined` renders as the configured undefined token.
    fn to_string(&self, v: &Value) -> String;

    fn to_bool(&self, v: &Value) -> bool;

    /// `None` for undefined; scalars become one-element sequences.
    fn to_sequence(&self, v: &Value) -> Option<Sequence>;

    /// 32-bit integer view; NaN and infinities become 0.
    fn to_integer(&self, v: &Value) -> i32 {
        to_int32(self.to_number(v))
    }

    fn type_of(&self, v: &Value) -> PrimitiveType {
        match v {
            Value::Undefined => PrimitiveType::Undefined,
            Value::Bool(_) => PrimitiveType::Boolean,
            Value::Number(_) => PrimitiveType::Number,
            Value::Str(_) => PrimitiveType::String,
            Value::Seq(_) => PrimitiveType::Sequence,
            Value::Object(_) => PrimitiveType::Object,
        }
    }
}

// ── Primitives ────────────────────────────────────────────────────────────────

/// The default converter.
#[derive(Debug, Clone)]
pub struct Primitives {
    undefined: String,
}

impl Primitives {
    pub fn new(undefined: impl Into<String>) -> Self {
        Primitives {
            undefined: undefined.into(),
        }
    }

    pub fn undefined_token(&self) -> &str {
        &self.undefined
    }
}

impl Default for Primitives {
    fn default() -> Self {
        Primitives::new("undefined")
    }
}

impl TypeConverter for Primitives {
    fn to_number(&self, v: &Value) -> f64 {
        match v {
            Value::Undefined => f64::NAN,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Str(s) => parse_number(s),
            Value::Seq(seq) if seq.len() == 1 => {
                seq.get(0).map_or(f64::NAN, |item| self.to_number(&item))
            }
            Value::Seq(_) | Value::Object(_) => f64::NAN,
        }
    }

    fn to_string(&self, v: &Value) -> String {
        match v {
            Value::Undefined => self.undefined.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.clone(),
            Value::Seq(seq) => seq
                .iter()
                .map(|item| self.to_string(&item))
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(obj) => obj.to_text().unwrap_or_else(|| "[object]".to_owned()),
        }
    }

    fn to_bool(&self, v: &Value) -> bool {
        match v {
            Value::Undefined => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Seq(_) | Value::Object(_) => true,
        }
    }

    fn to_sequence(&self, v: &Value) -> Option<Sequence> {
        match v {
            Value::Undefined => None,
            Value::Seq(seq) => Some(seq.clone()),
            other => Some(Sequence::list([other.clone()])),
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "NaN" => f64::NAN,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        // Rust accepts "inf"/"nan" spellings that templates should not.
        _ if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => t.parse().unwrap_or(f64::NAN),
    }
}

/// Integral values print without a fraction; non-finite values use the
/// `NaN` / `Infinity` spellings the dialect constants use.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// ECMAScript ToInt32.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let wrapped = n.trunc().rem_euclid(4_294_967_296.0);
    if wrapped >= 2_147_483_648.0 {
        (wrapped - 4_294_967_296.0) as i32
    } else {
        wrapped as i32
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn conv() -> Primitives {
        Primitives::default()
    }

    #[test]
    fn to_number_rules() {
        let c = conv();
        assert!(c.to_number(&Value::Undefined).is_nan());
        assert_eq!(c.to_number(&Value::Bool(true)), 1.0);
        assert_eq!(c.to_number(&Value::from(" 12.5 ")), 12.5);
        assert_eq!(c.to_number(&Value::from("")), 0.0);
        assert!(c.to_number(&Value::from("abc")).is_nan());
        assert!(c.to_number(&Value::from("inf")).is_nan());
        assert_eq!(c.to_number(&Value::from("-Infinity")), f64::NEG_INFINITY);
        assert_eq!(c.to_number(&Value::from(vec![Value::from("3")])), 3.0);
        assert!(c.to_number(&Value::from(vec![Value::from(1), Value::from(2)])).is_nan());
    }

    #[test]
    fn to_string_rules() {
        let c = Primitives::new("<none>");
        assert_eq!(c.to_string(&Value::Undefined), "<none>");
        assert_eq!(c.to_string(&Value::from(3.0)), "3");
        assert_eq!(c.to_string(&Value::from(-0.0)), "0");
        assert_eq!(c.to_string(&Value::from(2.5)), "2.5");
        assert_eq!(c.to_string(&Value::from(f64::NAN)), "NaN");
        assert_eq!(c.to_string(&Value::from(f64::NEG_INFINITY)), "-Infinity");
        assert_eq!(c.to_string(&Value::Bool(false)), "false");
        assert_eq!(
            c.to_string(&Sequence::Range { start: 1, end: 3 }.into()),
            "1,2,3"
        );
    }

    #[test]
    fn to_bool_rules() {
        let c = conv();
        assert!(!c.to_bool(&Value::Undefined));
        assert!(!c.to_bool(&Value::from(0)));
        assert!(!c.to_bool(&Value::from(f64::NAN)));
        assert!(!c.to_bool(&Value::from("")));
        assert!(c.to_bool(&Value::from("0")));
        assert!(c.to_bool(&Value::from(-1)));
        assert!(c.to_bool(&Value::from(Vec::<Value>::new())));
    }

    #[test]
    fn to_sequence_wraps_scalars() {
        let c = conv();
        assert_eq!(c.to_sequence(&Value::Undefined), None);
        let seq = c.to_sequence(&Value::from(5)).expect("scalar wraps");
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.get(0), Some(Value::from(5)));
        let range = Sequence::Range { start: 1, end: 4 };
        assert_eq!(c.to_sequence(&range.clone().into()), Some(range));
    }

    #[test]
    fn to_integer_wraps_like_int32() {
        let c = conv();
        assert_eq!(c.to_integer(&Value::from(f64::NAN)), 0);
        assert_eq!(c.to_integer(&Value::from(f64::INFINITY)), 0);
        assert_eq!(c.to_integer(&Value::from(3.9)), 3);
        assert_eq!(c.to_integer(&Value::from(-3.9)), -3);
        assert_eq!(c.to_integer(&Value::from(4_294_967_297.0)), 1);
        assert_eq!(c.to_integer(&Value::from(2_147_483_648.0)), i32::MIN);
    }

    #[test]
    fn type_of_dispatch() {
        let c = conv();
        assert_eq!(c.type_of(&Value::from(1)), PrimitiveType::Number);
        assert_eq!(c.type_of(&Value::from("x")), PrimitiveType::String);
        assert_eq!(c.type_of(&Value::Undefined), PrimitiveType::Undefined);
    }
}
