//! Tag matcher: builds the directive tree from the lex stream.
//!
//! A tag either continues the innermost open directive or starts a new one.
//! Directives that share leading tags stay candidates side by side until a
//! later tag tells them apart; a directive locks in as soon as it is the only
//! candidate whose tag sequence is complete.

use std::sync::Arc;

use tracing::debug;

use super::dialect::Dialect;
use super::directive::Directive;
use super::error::{ParseError, TemplateError};
use super::lexer::{Lex, LexReader, TagLex};
use super::tag::Tag;

// ── Tree ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Node {
    Unparsed { text: String, position: usize },
    Directive(DirectiveNode),
}

/// A locked-in directive with its tags and the content between them.
///
/// `bodies[i]` is the content between `tags[i]` and `tags[i + 1]`, so there is
/// always one body fewer than there are tags.
#[derive(Debug, Clone)]
pub struct DirectiveNode {
    pub directive: Arc<dyn Directive>,
    pub tags: Vec<TagLex>,
    pub bodies: Vec<Vec<Node>>,
    pub position: usize,
}

// ── Matcher ───────────────────────────────────────────────────────────────────

/// Candidate set of one open directive.
#[derive(Debug)]
struct Matcher {
    /// Indices into [`Dialect::directives`].
    candidates: Vec<usize>,
    /// Tags accepted so far.
    matched: usize,
    locked: Option<usize>,
}

impl Matcher {
    /// Seed with every directive whose first tag is `tag`; `None` if there is
    /// none.
    fn start(dialect: &Dialect, tag: &Tag) -> Option<Matcher> {
        let mut m = Matcher {
            candidates: (0..dialect.directives().len()).collect(),
            matched: 0,
            locked: None,
        };
        m.advance(dialect, tag).then_some(m)
    }

    /// Candidates whose next tag is `tag`.
    fn accepting(&self, dialect: &Dialect, tag: &Tag) -> Vec<usize> {
        let case = dialect.identifiers();
        self.candidates
            .iter()
            .copied()
            .filter(|&c| {
                dialect.directives()[c]
                    .tags
                    .get(self.matched)
                    .is_some_and(|t| t.matches(tag, case))
            })
            .collect()
    }

    fn accepts(&self, dialect: &Dialect, tag: &Tag) -> bool {
        !self.accepting(dialect, tag).is_empty()
    }

    /// Narrow to the candidates accepting `tag`.  Returns `false`, leaving the
    /// matcher untouched, if none does.
    fn advance(&mut self, dialect: &Dialect, tag: &Tag) -> bool {
        let next = self.accepting(dialect, tag);
        if next.is_empty() {
            return false;
        }
        self.matched += 1;
        let mut complete = next
            .iter()
            .copied()
            .filter(|&c| dialect.directives()[c].tags.len() == self.matched);
        if let (Some(only), None) = (complete.next(), complete.next()) {
            self.locked = Some(only);
        }
        self.candidates = next;
        true
    }

    fn names(&self, dialect: &Dialect) -> Vec<String> {
        self.candidates
            .iter()
            .map(|&c| dialect.directives()[c].directive.name().to_owned())
            .collect()
    }
}

// ── Interpreter ───────────────────────────────────────────────────────────────

pub struct Interpreter<'a> {
    dialect: &'a Dialect,
    reader: &'a mut dyn LexReader,
    /// Matchers of the open directives, innermost last.
    open: Vec<Matcher>,
}

impl<'a> Interpreter<'a> {
    pub fn new(dialect: &'a Dialect, reader: &'a mut dyn LexReader) -> Self {
        Interpreter {
            dialect,
            reader,
            open: Vec::new(),
        }
    }

    /// Consume the whole lex stream.
    pub fn interpret(mut self) -> Result<Vec<Node>, TemplateError> {
        let mut nodes = Vec::new();
        while let Some(lex) = self.reader.read_next()? {
            match lex {
                Lex::Unparsed { text, position } => nodes.push(Node::Unparsed { text, position }),
                Lex::Tag(tag) => nodes.push(Node::Directive(self.directive(tag)?)),
            }
        }
        Ok(nodes)
    }

    /// Start a directive at `first` and read until it locks in.
    fn directive(&mut self, first: TagLex) -> Result<DirectiveNode, TemplateError> {
        let Some(matcher) = Matcher::start(self.dialect, &first.tag) else {
            return Err(ParseError::UnmatchedTag {
                tag: first.tag.to_string(),
                position: first.position,
            }
            .into());
        };
        let position = first.position;
        let mut tags = vec![first];
        let mut bodies = Vec::new();

        if let Some(locked) = matcher.locked {
            return Ok(self.lock_in(locked, tags, bodies, position));
        }

        self.open.push(matcher);
        let result = self.read_bodies(&mut tags, &mut bodies, position);
        let matcher = self.open.pop();
        result?;

        match matcher {
            Some(Matcher {
                locked: Some(locked),
                ..
            }) => Ok(self.lock_in(locked, tags, bodies, position)),
            other => Err(ParseError::UnterminatedDirective {
                candidates: other.map(|m| m.names(self.dialect)).unwrap_or_default(),
                position,
            }
            .into()),
        }
    }

    /// Read content and continuation tags for the innermost open directive
    /// until it locks in.
    fn read_bodies(
        &mut self,
        tags: &mut Vec<TagLex>,
        bodies: &mut Vec<Vec<Node>>,
        position: usize,
    ) -> Result<(), TemplateError> {
        let mut body = Vec::new();
        loop {
            let Some(lex) = self.reader.read_next()? else {
                return Err(self.unterminated(position));
            };
            let tag = match lex {
                Lex::Unparsed { text, position } => {
                    body.push(Node::Unparsed { text, position });
                    continue;
                }
                Lex::Tag(tag) => tag,
            };

            let dialect = self.dialect;
            let Some((current, ancestors)) = self.open.split_last_mut() else {
                return Err(self.unterminated(position));
            };
            if current.advance(dialect, &tag.tag) {
                bodies.push(std::mem::take(&mut body));
                tags.push(tag);
                if current.locked.is_some() {
                    return Ok(());
                }
                continue;
            }
            if ancestors.iter().any(|m| m.accepts(dialect, &tag.tag)) {
                return Err(self.unterminated(position));
            }
            if Matcher::start(dialect, &tag.tag).is_none() {
                let open = current.names(dialect).join(" / ");
                return Err(ParseError::UnexpectedTag {
                    tag: tag.tag.to_string(),
                    position: tag.position,
                    open,
                }
                .into());
            }
            body.push(Node::Directive(self.directive(tag)?));
        }
    }

    fn unterminated(&self, position: usize) -> TemplateError {
        let candidates = self
            .open
            .last()
            .map(|m| m.names(self.dialect))
            .unwrap_or_default();
        ParseError::UnterminatedDirective {
            candidates,
            position,
        }
        .into()
    }

    fn lock_in(
        &self,
        index: usize,
        tags: Vec<TagLex>,
        bodies: Vec<Vec<Node>>,
        position: usize,
    ) -> DirectiveNode {
        let directive = Arc::clone(&self.dialect.directives()[index].directive);
        debug!(directive = directive.name(), position, tags = tags.len(), "directive locked in");
        DirectiveNode {
            directive,
            tags,
            bodies,
            position,
        }
    }
}

/// Build the directive tree for a lex stream.
pub fn interpret(
    dialect: &Dialect,
    reader: &mut dyn LexReader,
) -> Result<Vec<Node>, TemplateError> {
    Interpreter::new(dialect, reader).interpret()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
