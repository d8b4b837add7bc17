//! Dialects: everything that varies between template flavours.
//!
//! A [`Dialect`] fixes identifier and string comparison, tag delimiters,
//! operators, directives, constants and type conversion.  It is built once,
//! validated, and then shared read-only by every template compiled with it.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::convert::{Primitives, TypeConverter};
use super::directive::Directive;
use super::directives;
use super::error::DialectError;
use super::operator::{Operator, OperatorTable};
use super::tag::Tag;
use super::value::Value;

// ── Comparers ─────────────────────────────────────────────────────────────────

/// How identifiers, keywords and member names are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentifierCase {
    Sensitive,
    #[default]
    Insensitive,
}

impl IdentifierCase {
    pub fn matches(self, a: &str, b: &str) -> bool {
        match self {
            IdentifierCase::Sensitive => a == b,
            IdentifierCase::Insensitive => a
                .chars()
                .flat_map(char::to_lowercase)
                .eq(b.chars().flat_map(char::to_lowercase)),
        }
    }

    /// Canonical map key for `name`.
    pub fn key(self, name: &str) -> Cow<'_, str> {
        match self {
            IdentifierCase::Sensitive => Cow::Borrowed(name),
            IdentifierCase::Insensitive if name.chars().any(char::is_uppercase) => {
                Cow::Owned(name.to_lowercase())
            }
            IdentifierCase::Insensitive => Cow::Borrowed(name),
        }
    }
}

/// How string operands of relational operators are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringComparison {
    #[default]
    Ordinal,
    IgnoreCase,
}

impl StringComparison {
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            StringComparison::Ordinal => a.cmp(b),
            StringComparison::IgnoreCase => a
                .chars()
                .flat_map(char::to_lowercase)
                .cmp(b.chars().flat_map(char::to_lowercase)),
        }
    }
}

// ── Dialect ───────────────────────────────────────────────────────────────────

/// A directive together with its parsed tag shapes.
#[derive(Debug, Clone)]
pub struct RegisteredDirective {
    pub directive: Arc<dyn Directive>,
    pub tags: Vec<Tag>,
}

#[derive(Clone)]
pub struct Dialect {
    name: String,
    identifiers: IdentifierCase,
    strings: StringComparison,
    tag_start: char,
    tag_end: char,
    operators: OperatorTable,
    directives: Vec<RegisteredDirective>,
    /// Distinct tag shapes, in registration order.
    tags: Vec<Tag>,
    keywords: Vec<String>,
    constants: Vec<(String, Value)>,
    collapse_whitespace: bool,
    converter: Arc<dyn TypeConverter>,
}

impl fmt::Debug for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialect")
            .field("name", &self.name)
            .field("identifiers", &self.identifiers)
            .field("strings", &self.strings)
            .field("tag_start", &self.tag_start)
            .field("tag_end", &self.tag_end)
            .field("directives", &self.directives.len())
            .field("collapse_whitespace", &self.collapse_whitespace)
            .finish()
    }
}

impl Dialect {
    /// Case-insensitive identifiers, ordinal strings, `{`…`}` tags and the
    /// standard operators and directives.
    pub fn standard() -> Result<Dialect, DialectError> {
        DialectBuilder::new("standard")
            .standard_operators()
            .standard_directives()
            .build()
    }

    /// Like [`standard`](Self::standard) but identifiers are case-sensitive.
    pub fn strict() -> Result<Dialect, DialectError> {
        DialectBuilder::new("strict")
            .identifiers(IdentifierCase::Sensitive)
            .strings(StringComparison::Ordinal)
            .standard_operators()
            .standard_directives()
            .build()
    }

    pub fn builder(name: impl Into<String>) -> DialectBuilder {
        DialectBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifiers(&self) -> IdentifierCase {
        self.identifiers
    }

    pub fn strings(&self) -> StringComparison {
        self.strings
    }

    pub fn tag_start(&self) -> char {
        self.tag_start
    }

    pub fn tag_end(&self) -> char {
        self.tag_end
    }

    pub fn operators(&self) -> &OperatorTable {
        &self.operators
    }

    pub fn directives(&self) -> &[RegisteredDirective] {
        &self.directives
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn converter(&self) -> &dyn TypeConverter {
        self.converter.as_ref()
    }

    pub fn collapse_whitespace(&self) -> bool {
        self.collapse_whitespace
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        self.keywords.iter().any(|k| self.identifiers.matches(k, word))
    }

    /// Value of a named constant (`true`, `NaN`, …).
    pub fn constant(&self, word: &str) -> Option<Value> {
        self.constants
            .iter()
            .find(|(name, _)| self.identifiers.matches(name, word))
            .map(|(_, v)| v.clone())
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

pub struct DialectBuilder {
    name: String,
    identifiers: IdentifierCase,
    strings: StringComparison,
    tag_start: char,
    tag_end: char,
    operators: OperatorTable,
    directives: Vec<Arc<dyn Directive>>,
    undefined: String,
    converter: Option<Arc<dyn TypeConverter>>,
    collapse_whitespace: bool,
    constants: Vec<(String, Value)>,
    error: Option<DialectError>,
}

impl DialectBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        DialectBuilder {
            name: name.into(),
            identifiers: IdentifierCase::default(),
            strings: StringComparison::default(),
            tag_start: '{',
            tag_end: '}',
            operators: OperatorTable::new(),
            directives: Vec::new(),
            undefined: "undefined".to_owned(),
            converter: None,
            collapse_whitespace: false,
            constants: default_constants(),
            error: None,
        }
    }

    pub fn identifiers(mut self, case: IdentifierCase) -> Self {
        self.identifiers = case;
        self
    }

    pub fn strings(mut self, cmp: StringComparison) -> Self {
        self.strings = cmp;
        self
    }

    pub fn delimiters(mut self, start: char, end: char) -> Self {
        self.tag_start = start;
        self.tag_end = end;
        self
    }

    /// Token rendered for undefined values by the default converter.
    pub fn undefined(mut self, token: impl Into<String>) -> Self {
        self.undefined = token.into();
        self
    }

    pub fn converter(mut self, converter: Arc<dyn TypeConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn collapse_whitespace(mut self, on: bool) -> Self {
        self.collapse_whitespace = on;
        self
    }

    /// Add a named constant, or replace the value of an existing one.  Names
    /// follow identifier rules and may not be directive keywords.
    pub fn constant(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.constants.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.constants.push((name, value)),
        }
        self
    }

    /// Register an operator.  The first registration error is reported by
    /// [`build`](Self::build).
    pub fn operator(mut self, op: Operator) -> Self {
        if let Err(e) = self.operators.register(op) {
            self.error.get_or_insert(e);
        }
        self
    }

    pub fn standard_operators(mut self) -> Self {
        for op in OperatorTable::standard().iter() {
            if let Err(e) = self.operators.register(Operator::clone(op)) {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    pub fn directive(mut self, directive: Arc<dyn Directive>) -> Self {
        self.directives.push(directive);
        self
    }

    pub fn standard_directives(mut self) -> Self {
        self.directives.extend(directives::standard());
        self
    }

    pub fn build(self) -> Result<Dialect, DialectError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        validate_delimiters(self.tag_start, self.tag_end)?;

        let case = self.identifiers;
        let mut registered: Vec<RegisteredDirective> = Vec::with_capacity(self.directives.len());
        let mut tags: Vec<Tag> = Vec::new();
        let mut keywords: Vec<String> = Vec::new();

        for directive in self.directives {
            let name = directive.name().to_owned();
            if registered
                .iter()
                .any(|r| case.matches(r.directive.name(), &name))
            {
                return Err(DialectError::DuplicateDirective { name });
            }

            let parsed = directive
                .tags()
                .into_iter()
                .map(Tag::parse)
                .collect::<Result<Vec<_>, _>>()?;
            if parsed.is_empty() {
                return Err(DialectError::EmptyDirective { name });
            }

            for tag in &parsed {
                for kw in tag.keywords() {
                    if !keywords.iter().any(|k| case.matches(k, kw)) {
                        keywords.push(kw.to_owned());
                    }
                }
                if !tags.iter().any(|t| t.matches(tag, case)) {
                    tags.push(tag.clone());
                }
            }
            registered.push(RegisteredDirective {
                directive,
                tags: parsed,
            });
        }

        let converter: Arc<dyn TypeConverter> = match self.converter {
            Some(c) => c,
            None => Arc::new(Primitives::new(self.undefined)),
        };

        let mut constants: Vec<(String, Value)> = Vec::with_capacity(self.constants.len());
        for (name, value) in self.constants {
            if !is_identifier(&name) {
                return Err(DialectError::InvalidConstant {
                    name,
                    reason: "not an identifier".into(),
                });
            }
            if keywords.iter().any(|k| case.matches(k, &name)) {
                return Err(DialectError::InvalidConstant {
                    name,
                    reason: "is a directive keyword".into(),
                });
            }
            // Later definitions win over names equal under the dialect's case rule.
            match constants.iter_mut().find(|(n, _)| case.matches(n, &name)) {
                Some(slot) => *slot = (name, value),
                None => constants.push((name, value)),
            }
        }

        Ok(Dialect {
            name: self.name,
            identifiers: self.identifiers,
            strings: self.strings,
            tag_start: self.tag_start,
            tag_end: self.tag_end,
            operators: self.operators,
            directives: registered,
            tags,
            keywords,
            constants,
            collapse_whitespace: self.collapse_whitespace,
            converter,
        })
    }
}

fn default_constants() -> Vec<(String, Value)> {
    vec![
        ("true".to_owned(), Value::Bool(true)),
        ("false".to_owned(), Value::Bool(false)),
        ("undefined".to_owned(), Value::Undefined),
        ("NaN".to_owned(), Value::Number(f64::NAN)),
        ("Infinity".to_owned(), Value::Number(f64::INFINITY)),
    ]
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn validate_delimiters(start: char, end: char) -> Result<(), DialectError> {
    let bad = |c: char| c.is_alphanumeric() || c.is_whitespace() || c == '"' || c == '\'';
    if start == end {
        return Err(DialectError::Delimiters(format!(
            "tag start and end are both `{start}`"
        )));
    }
    if bad(start) || bad(end) {
        return Err(DialectError::Delimiters(format!(
            "`{start}`/`{end}` cannot delimit tags"
        )));
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::directives::{ForEach, If};
    use crate::template::operator::{Associativity, OpCode};

    #[test]
    fn identifier_case() {
        assert!(IdentifierCase::Insensitive.matches("Name", "nAME"));
        assert!(!IdentifierCase::Sensitive.matches("Name", "name"));
        assert!(!IdentifierCase::Insensitive.matches("Straße", "STRASSE"));
        assert_eq!(IdentifierCase::Insensitive.key("AbC"), "abc");
        assert_eq!(IdentifierCase::Sensitive.key("AbC"), "AbC");
    }

    #[test]
    fn string_comparison() {
        assert_eq!(StringComparison::Ordinal.compare("B", "a"), Ordering::Less);
        assert_eq!(StringComparison::IgnoreCase.compare("B", "a"), Ordering::Greater);
        assert_eq!(StringComparison::IgnoreCase.compare("abc", "ABC"), Ordering::Equal);
    }

    #[test]
    fn standard_dialect() {
        let d = Dialect::standard().unwrap();
        assert_eq!(d.identifiers(), IdentifierCase::Insensitive);
        assert!(d.is_keyword("if"));
        assert!(d.is_keyword("EACH"));
        assert!(!d.is_keyword("x"));
        assert_eq!(d.constant("TRUE"), Some(Value::Bool(true)));
        assert!(d.operators().infix("&&").is_some());
        // IF $ THEN is shared by If and IfElse but listed once.
        let if_tags = d.tags().iter().filter(|t| t.to_string() == "IF $ THEN").count();
        assert_eq!(if_tags, 1);
    }

    #[test]
    fn strict_dialect_is_case_sensitive() {
        let d = Dialect::strict().unwrap();
        assert!(d.is_keyword("IF"));
        assert!(!d.is_keyword("if"));
        assert_eq!(d.constant("TRUE"), None);
    }

    #[test]
    fn duplicate_directive_rejected() {
        let err = Dialect::builder("dup")
            .directive(Arc::new(If))
            .directive(Arc::new(If))
            .build()
            .unwrap_err();
        assert_eq!(err, DialectError::DuplicateDirective { name: "If".into() });
    }

    #[test]
    fn duplicate_operator_reported_at_build() {
        let err = Dialect::builder("dup")
            .standard_operators()
            .operator(Operator::infix("*", 1, Associativity::Left, OpCode::Add))
            .directive(Arc::new(ForEach))
            .build()
            .unwrap_err();
        assert!(matches!(err, DialectError::DuplicateOperator { .. }));
    }

    #[test]
    fn custom_constants() {
        let d = Dialect::builder("c")
            .standard_operators()
            .standard_directives()
            .constant("PI", 3.5)
            .constant("Infinity", 0)
            .build()
            .unwrap();
        assert_eq!(d.constant("pi"), Some(Value::Number(3.5)));
        assert_eq!(d.constant("infinity"), Some(Value::Number(0.0)));
        assert_eq!(d.constant("true"), Some(Value::Bool(true)));
    }

    #[test]
    fn constant_names_validated() {
        let err = Dialect::builder("c")
            .standard_directives()
            .constant("each", 1)
            .build()
            .unwrap_err();
        assert!(matches!(err, DialectError::InvalidConstant { ref name, .. } if name == "each"));
        assert!(Dialect::builder("c").constant("two words", 1).build().is_err());
        assert!(Dialect::builder("c").constant("", 1).build().is_err());
    }

    #[test]
    fn delimiters_validated() {
        assert!(Dialect::builder("d").delimiters('<', '<').build().is_err());
        assert!(Dialect::builder("d").delimiters('a', '>').build().is_err());
        let d = Dialect::builder("d").delimiters('<', '>').build().unwrap();
        assert_eq!((d.tag_start(), d.tag_end()), ('<', '>'));
    }
}
