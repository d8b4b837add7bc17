//! Lexer: turns the token stream into text runs and resolved tags.
//!
//! Each tag's interior is matched against the dialect's tag shapes in
//! registration order.  Keywords and identifier slots take one word each;
//! an expression slot takes the longest run of pieces that still lets the
//! rest of the shape match.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

use super::builder::ExpressionBuilder;
use super::dialect::Dialect;
use super::error::{ExpressionError, ParseError, TemplateError};
use super::expression::Expression;
use super::tag::{Tag, TagComponent};
use super::tokenizer::{Token, TokenKind};
use super::value::Value;

use TokenKind::{Number, Str, Symbol, TagEnd, TagStart, Text, Word};

/// One unit of the lexed template.
#[derive(Debug, Clone)]
pub enum Lex {
    Unparsed { text: String, position: usize },
    Tag(TagLex),
}

#[derive(Debug, Clone)]
pub struct TagLex {
    pub tag: Tag,
    pub components: Vec<LexComponent>,
    pub position: usize,
}

#[derive(Debug, Clone)]
pub enum LexComponent {
    Keyword(String),
    Identifier(String),
    Expression(Expression),
}

/// Pull interface over lexed units.
pub trait LexReader {
    fn read_next(&mut self) -> Result<Option<Lex>, TemplateError>;
}

// ── Pieces ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Piece {
    Word(String),
    Literal(Value),
    Symbol(String),
}

/// Splits symbol runs into registered operator symbols, longest first.
struct SymbolSplitter {
    symbols: Vec<String>,
    matcher: AhoCorasick,
}

impl SymbolSplitter {
    fn new(dialect: &Dialect) -> Self {
        let symbols = dialect.operators().symbols();
        let matcher = AhoCorasickBuilder::new()
            .anchored(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(&symbols);
        SymbolSplitter { symbols, matcher }
    }

    fn split(&self, run: &str, out: &mut Vec<(Piece, usize)>, position: usize) {
        let mut at = 0;
        while at < run.len() {
            match self.matcher.find(&run[at..]) {
                Some(m) => {
                    let sym = &self.symbols[m.pattern()];
                    out.push((Piece::Symbol(sym.clone()), position + at));
                    at += m.end();
                }
                None => {
                    // Unknown: hand the rest to the builder, which reports it.
                    out.push((Piece::Symbol(run[at..].to_owned()), position + at));
                    break;
                }
            }
        }
    }
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

pub struct Lexer<'d> {
    dialect: &'d Dialect,
    tokens: std::vec::IntoIter<Token>,
    splitter: SymbolSplitter,
}

impl<'d> Lexer<'d> {
    pub fn new(dialect: &'d Dialect, tokens: Vec<Token>) -> Self {
        Lexer {
            dialect,
            tokens: tokens.into_iter(),
            splitter: SymbolSplitter::new(dialect),
        }
    }

    fn read_tag(&mut self, position: usize) -> Result<TagLex, TemplateError> {
        let mut pieces: Vec<(Piece, usize)> = Vec::new();
        loop {
            let Some(tok) = self.tokens.next() else {
                return Err(ParseError::UnclosedTag { position }.into());
            };
            match tok.kind {
                TagEnd => break,
                Word => match self.dialect.constant(&tok.text) {
                    Some(v) if !self.dialect.is_keyword(&tok.text) => {
                        pieces.push((Piece::Literal(v), tok.position));
                    }
                    _ => pieces.push((Piece::Word(tok.text), tok.position)),
                },
                Number => {
                    let n = tok.text.parse::<f64>().unwrap_or(f64::NAN);
                    pieces.push((Piece::Literal(Value::Number(n)), tok.position));
                }
                Str => pieces.push((Piece::Literal(Value::Str(tok.text)), tok.position)),
                Symbol => self.splitter.split(&tok.text, &mut pieces, tok.position),
                Text | TagStart => {
                    return Err(ParseError::MalformedTag {
                        position: tok.position,
                        reason: "unexpected token inside tag".into(),
                    }
                    .into());
                }
            }
        }

        let mut matcher = ShapeMatcher {
            dialect: self.dialect,
            pieces: &pieces,
            first_error: None,
        };
        for tag in self.dialect.tags() {
            if let Some(components) = matcher.match_shape(tag.components(), 0) {
                return Ok(TagLex {
                    tag: tag.clone(),
                    components,
                    position,
                });
            }
        }

        match matcher.first_error {
            Some((error_at, source)) => Err(TemplateError::Expression {
                position: error_at,
                source,
            }),
            None => Err(ParseError::UnknownTag {
                markup: render_pieces(&pieces),
                position,
            }
            .into()),
        }
    }
}

impl LexReader for Lexer<'_> {
    fn read_next(&mut self) -> Result<Option<Lex>, TemplateError> {
        let Some(tok) = self.tokens.next() else {
            return Ok(None);
        };
        match tok.kind {
            Text => Ok(Some(Lex::Unparsed {
                text: tok.text,
                position: tok.position,
            })),
            TagStart => self.read_tag(tok.position).map(|t| Some(Lex::Tag(t))),
            _ => Err(ParseError::MalformedTag {
                position: tok.position,
                reason: format!("`{}` outside a tag", tok.text),
            }
            .into()),
        }
    }
}

// ── Shape matching ────────────────────────────────────────────────────────────

struct ShapeMatcher<'a> {
    dialect: &'a Dialect,
    pieces: &'a [(Piece, usize)],
    /// First error from the longest candidate of an expression slot.
    first_error: Option<(usize, ExpressionError)>,
}

impl ShapeMatcher<'_> {
    fn match_shape(&mut self, shape: &[TagComponent], at: usize) -> Option<Vec<LexComponent>> {
        let Some((head, rest)) = shape.split_first() else {
            return (at == self.pieces.len()).then(Vec::new);
        };
        let case = self.dialect.identifiers();
        match head {
            TagComponent::Keyword(kw) => match self.pieces.get(at) {
                Some((Piece::Word(w), _)) if case.matches(kw, w) => {
                    let mut tail = self.match_shape(rest, at + 1)?;
                    tail.insert(0, LexComponent::Keyword(w.clone()));
                    Some(tail)
                }
                _ => None,
            },
            TagComponent::Identifier => match self.pieces.get(at) {
                Some((Piece::Word(w), _)) if !self.dialect.is_keyword(w) => {
                    let mut tail = self.match_shape(rest, at + 1)?;
                    tail.insert(0, LexComponent::Identifier(w.clone()));
                    Some(tail)
                }
                _ => None,
            },
            TagComponent::Expression => {
                // Expressions never span a keyword.
                let limit = self.pieces[at..]
                    .iter()
                    .position(|(p, _)| matches!(p, Piece::Word(w) if self.dialect.is_keyword(w)))
                    .map_or(self.pieces.len(), |i| at + i);
                let mut longest = true;
                for end in (at + 1..=limit).rev() {
                    match self.build(at, end) {
                        Ok(expr) => {
                            if let Some(mut tail) = self.match_shape(rest, end) {
                                tail.insert(0, LexComponent::Expression(expr));
                                return Some(tail);
                            }
                        }
                        Err(e) if longest => {
                            let error_at = self.pieces[at].1;
                            self.first_error.get_or_insert((error_at, e));
                        }
                        Err(_) => {}
                    }
                    longest = false;
                }
                None
            }
        }
    }

    fn build(&self, from: usize, to: usize) -> Result<Expression, ExpressionError> {
        let mut builder = ExpressionBuilder::new(self.dialect.operators());
        for (piece, _) in &self.pieces[from..to] {
            match piece {
                Piece::Word(w) => builder.push_identifier(w)?,
                Piece::Literal(v) => builder.push_literal(v.clone())?,
                Piece::Symbol(s) => builder.push_symbol(s)?,
            }
        }
        builder.finish()
    }
}

fn render_pieces(pieces: &[(Piece, usize)]) -> String {
    pieces
        .iter()
        .map(|(p, _)| match p {
            Piece::Word(w) | Piece::Symbol(w) => w.clone(),
            Piece::Literal(v) => v.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::tokenizer::tokenize;

    fn lex_all(dialect: &Dialect, src: &str) -> Result<Vec<Lex>, TemplateError> {
        let tokens = tokenize(src, dialect.tag_start(), dialect.tag_end())?;
        let mut lexer = Lexer::new(dialect, tokens);
        let mut out = Vec::new();
        while let Some(lex) = lexer.read_next()? {
            out.push(lex);
        }
        Ok(out)
    }

    fn only_tag(dialect: &Dialect, src: &str) -> TagLex {
        match lex_all(dialect, src).unwrap().pop() {
            Some(Lex::Tag(t)) => t,
            other => panic!("expected a tag, got {other:?}"),
        }
    }

    #[test]
    fn text_and_interpolation() {
        let d = Dialect::standard().unwrap();
        let lexes = lex_all(&d, "a {x + 1} b").unwrap();
        assert_eq!(lexes.len(), 3);
        match &lexes[1] {
            Lex::Tag(t) => {
                assert_eq!(t.tag.to_string(), "$");
                assert_eq!(t.position, 2);
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn keywords_split_expressions() {
        let d = Dialect::standard().unwrap();
        let t = only_tag(&d, "{x IF y > 1}");
        assert_eq!(t.tag.to_string(), "$ IF $");
        assert_eq!(t.components.len(), 3);

        let t = only_tag(&d, "{for each item in 1..3}");
        assert_eq!(t.tag.to_string(), "FOR EACH ? IN $");
        assert!(matches!(&t.components[2], LexComponent::Identifier(n) if n == "item"));
        assert!(matches!(&t.components[4], LexComponent::Expression(_)));
    }

    #[test]
    fn symbols_split_longest_first() {
        let d = Dialect::standard().unwrap();
        let t = only_tag(&d, "{-(a)<=-b}");
        assert_eq!(t.tag.to_string(), "$");
        let t = only_tag(&d, "{1..-2}");
        assert_eq!(t.tag.to_string(), "$");
    }

    #[test]
    fn constants_become_literals() {
        let d = Dialect::standard().unwrap();
        let t = only_tag(&d, "{TRUE}");
        match &t.components[0] {
            LexComponent::Expression(Expression::Literal(v)) => assert_eq!(v, &Value::Bool(true)),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn dialect_constants_become_literals() {
        let d = Dialect::builder("c")
            .standard_operators()
            .standard_directives()
            .constant("answer", 42)
            .build()
            .unwrap();
        let t = only_tag(&d, "{ANSWER}");
        match &t.components[0] {
            LexComponent::Expression(Expression::Literal(v)) => assert_eq!(v, &Value::Number(42.0)),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn unknown_tag() {
        let d = Dialect::standard().unwrap();
        let err = lex_all(&d, "{END END}").unwrap_err();
        assert!(matches!(err, TemplateError::Parse(ParseError::UnknownTag { position: 0, .. })));
        assert!(lex_all(&d, "{}").is_err());
    }

    #[test]
    fn expression_errors_carry_position() {
        let d = Dialect::standard().unwrap();
        let err = lex_all(&d, "ab {1 +}").unwrap_err();
        assert_eq!(
            err,
            TemplateError::Expression {
                position: 4,
                source: ExpressionError::Incomplete,
            }
        );
        let err = lex_all(&d, "{a @ b}").unwrap_err();
        assert!(matches!(
            err,
            TemplateError::Expression {
                source: ExpressionError::UnknownOperator { .. },
                ..
            }
        ));
    }
}
