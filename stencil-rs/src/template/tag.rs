//! Tag shapes.
//!
//! A tag shape is written as whitespace-separated markup: words are
//! keywords, `?` is an identifier slot and `$` an expression slot.
//! `FOR EACH ? IN $` is the opening tag of the standard loop.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use super::dialect::IdentifierCase;
use super::error::DialectError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagComponent {
    Keyword(String),
    /// `?`: a bare name, passed to the directive as a string.
    Identifier,
    /// `$`: an expression, evaluated before the directive runs.
    Expression,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    components: Vec<TagComponent>,
}

fn keyword_pattern() -> Result<&'static Regex, DialectError> {
    static KEYWORD: OnceLock<Result<Regex, String>> = OnceLock::new();
    KEYWORD
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| DialectError::InvalidTag {
            markup: String::new(),
            reason: e.clone(),
        })
}

impl Tag {
    pub fn parse(markup: &str) -> Result<Tag, DialectError> {
        let invalid = |reason: &str| DialectError::InvalidTag {
            markup: markup.to_owned(),
            reason: reason.to_owned(),
        };
        let keyword = keyword_pattern()?;

        let mut components = Vec::new();
        for word in markup.split_whitespace() {
            let component = match word {
                "?" => TagComponent::Identifier,
                "$" => {
                    if components.last() == Some(&TagComponent::Expression) {
                        return Err(invalid("adjacent expressions cannot be told apart"));
                    }
                    TagComponent::Expression
                }
                w if keyword.is_match(w) => TagComponent::Keyword(w.to_owned()),
                w => return Err(invalid(&format!("`{w}` is not a keyword, `?` or `$`"))),
            };
            components.push(component);
        }

        if components.is_empty() {
            return Err(invalid("tag has no components"));
        }
        Ok(Tag { components })
    }

    pub fn components(&self) -> &[TagComponent] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.components.iter().filter_map(|c| match c {
            TagComponent::Keyword(k) => Some(k.as_str()),
            _ => None,
        })
    }

    /// Structural equality; keywords compare under `case`.
    pub fn matches(&self, other: &Tag, case: IdentifierCase) -> bool {
        self.components.len() == other.components.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| match (a, b) {
                    (TagComponent::Keyword(x), TagComponent::Keyword(y)) => case.matches(x, y),
                    (TagComponent::Identifier, TagComponent::Identifier)
                    | (TagComponent::Expression, TagComponent::Expression) => true,
                    _ => false,
                })
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match c {
                TagComponent::Keyword(k) => f.write_str(k)?,
                TagComponent::Identifier => f.write_str("?")?,
                TagComponent::Expression => f.write_str("$")?,
            }
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_components() {
        let tag = Tag::parse("FOR EACH ? IN $").unwrap();
        assert_eq!(
            tag.components(),
            &[
                TagComponent::Keyword("FOR".into()),
                TagComponent::Keyword("EACH".into()),
                TagComponent::Identifier,
                TagComponent::Keyword("IN".into()),
                TagComponent::Expression,
            ]
        );
        assert_eq!(tag.keywords().collect::<Vec<_>>(), ["FOR", "EACH", "IN"]);
        assert_eq!(tag.to_string(), "FOR EACH ? IN $");
    }

    #[test]
    fn rejects_bad_markup() {
        assert!(Tag::parse("").is_err());
        assert!(Tag::parse("   ").is_err());
        assert!(Tag::parse("$ $").is_err());
        assert!(Tag::parse("IF 1x").is_err());
        assert!(Tag::parse("a-b").is_err());
        assert!(Tag::parse("$ IF $").is_ok());
    }

    #[test]
    fn matching_honours_case() {
        let a = Tag::parse("end").unwrap();
        let b = Tag::parse("END").unwrap();
        assert!(a.matches(&b, IdentifierCase::Insensitive));
        assert!(!a.matches(&b, IdentifierCase::Sensitive));
        let c = Tag::parse("END $").unwrap();
        assert!(!b.matches(&c, IdentifierCase::Insensitive));
        let d = Tag::parse("? $").unwrap();
        let e = Tag::parse("$ ?").unwrap();
        assert!(!d.matches(&e, IdentifierCase::Insensitive));
    }
}
