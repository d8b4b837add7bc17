//! Character-level tokenizer.
//!
//! Outside tags everything is text; a doubled tag-start (`{{`) stands for a
//! literal one.  Inside a tag the tokenizer produces words, numbers, quoted
//! strings and runs of symbol characters.  Symbol runs are split into
//! operators later, when the dialect's operator set is known.

use super::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    TagStart,
    TagEnd,
    Word,
    Number,
    /// Quoted string; `text` holds the unescaped contents.
    Str,
    Symbol,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte offset into the template.
    pub position: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, position: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            position,
        }
    }
}

pub struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
    tag_start: char,
    tag_end: char,
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str, tag_start: char, tag_end: char) -> Self {
        Tokenizer {
            src,
            pos: 0,
            tag_start,
            tag_end,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        while self.peek().is_some() {
            self.read_text(&mut tokens);
            if self.peek() == Some(self.tag_start) {
                self.read_tag(&mut tokens)?;
            }
        }
        Ok(tokens)
    }

    // ── Cursor ────────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek2(&self) -> Option<char> {
        let mut it = self.src[self.pos..].chars();
        it.next();
        it.next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += ch.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    // ── Text ──────────────────────────────────────────────────────────────────

    fn read_text(&mut self, tokens: &mut Vec<Token>) {
        let start = self.pos;
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch == self.tag_start {
                if self.peek2() != Some(self.tag_start) {
                    break;
                }
                self.advance();
            }
            self.advance();
            text.push(ch);
        }
        if !text.is_empty() {
            tokens.push(Token::new(TokenKind::Text, text, start));
        }
    }

    // ── Tags ──────────────────────────────────────────────────────────────────

    fn read_tag(&mut self, tokens: &mut Vec<Token>) -> Result<(), ParseError> {
        let open = self.pos;
        self.advance();
        tokens.push(Token::new(TokenKind::TagStart, self.tag_start.to_string(), open));

        loop {
            self.skip_ws();
            let at = self.pos;
            let Some(ch) = self.peek() else {
                return Err(ParseError::UnclosedTag { position: open });
            };

            if ch == self.tag_end {
                self.advance();
                tokens.push(Token::new(TokenKind::TagEnd, ch.to_string(), at));
                return Ok(());
            }
            if ch == self.tag_start {
                return Err(ParseError::MalformedTag {
                    position: at,
                    reason: format!("`{ch}` inside a tag"),
                });
            }

            let token = if ch.is_alphabetic() || ch == '_' {
                self.read_word()
            } else if ch.is_ascii_digit() {
                self.read_number()
            } else if ch == '"' || ch == '\'' {
                self.read_string()?
            } else {
                self.read_symbols()
            };
            tokens.push(token);
        }
    }

    fn read_word(&mut self) -> Token {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        Token::new(TokenKind::Word, &self.src[start..self.pos], start)
    }

    fn read_number(&mut self) -> Token {
        let start = self.pos;
        let digits = |t: &mut Self| {
            while t.peek().is_some_and(|c| c.is_ascii_digit()) {
                t.advance();
            }
        };
        digits(self);
        // `1..2` is a range, not `1.` followed by `.2`.
        if self.peek() == Some('.') && self.peek2().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            digits(self);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mark = self.pos;
            self.advance();
            if !self.eat('+') {
                self.eat('-');
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                digits(self);
            } else {
                self.pos = mark;
            }
        }
        Token::new(TokenKind::Number, &self.src[start..self.pos], start)
    }

    fn read_string(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        let quote = self.advance().unwrap_or('"');
        let mut s = String::new();
        loop {
            match self.advance() {
                None => return Err(ParseError::UnterminatedString { position: start }),
                Some(c) if c == quote => break,
                Some('\\') => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some(c) => s.push(c),
                    None => return Err(ParseError::UnterminatedString { position: start }),
                },
                Some(c) => s.push(c),
            }
        }
        Ok(Token::new(TokenKind::Str, s, start))
    }

    fn read_symbols(&mut self) -> Token {
        let start = self.pos;
        self.advance();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric()
                || c.is_whitespace()
                || c == '_'
                || c == '"'
                || c == '\''
                || c == self.tag_start
                || c == self.tag_end
            {
                break;
            }
            self.advance();
        }
        Token::new(TokenKind::Symbol, &self.src[start..self.pos], start)
    }
}

/// Tokenize with the given delimiters.
pub fn tokenize(src: &str, tag_start: char, tag_end: char) -> Result<Vec<Token>, ParseError> {
    Tokenizer::new(src, tag_start, tag_end).tokenize()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<(TokenKind, String)> {
        tokenize(src, '{', '}')
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    use TokenKind::*;

    #[test]
    fn text_and_tags() {
        assert_eq!(
            kinds("Hi {name}!"),
            vec![
                (Text, "Hi ".into()),
                (TagStart, "{".into()),
                (Word, "name".into()),
                (TagEnd, "}".into()),
                (Text, "!".into()),
            ]
        );
    }

    #[test]
    fn doubled_start_is_literal() {
        assert_eq!(kinds("a {{b} c"), vec![(Text, "a {b} c".into())]);
    }

    #[test]
    fn numbers_and_ranges() {
        assert_eq!(
            kinds("{1..2.5}"),
            vec![
                (TagStart, "{".into()),
                (Number, "1".into()),
                (Symbol, "..".into()),
                (Number, "2.5".into()),
                (TagEnd, "}".into()),
            ]
        );
        assert_eq!(kinds("{1e3}")[1], (Number, "1e3".into()));
        assert_eq!(kinds("{2em}")[1], (Number, "2".into()));
    }

    #[test]
    fn strings_unescape() {
        assert_eq!(kinds(r#"{"a\"b\n"}"#)[1], (Str, "a\"b\n".into()));
        assert_eq!(kinds("{'}'}")[1], (Str, "}".into()));
    }

    #[test]
    fn symbol_runs() {
        assert_eq!(
            kinds("{f(-x)}")[1..6].to_vec(),
            vec![
                (Word, "f".into()),
                (Symbol, "(-".into()),
                (Word, "x".into()),
                (Symbol, ")".into()),
                (TagEnd, "}".into()),
            ]
        );
    }

    #[test]
    fn positions_are_byte_offsets() {
        let toks = tokenize("é{x}", '{', '}').unwrap();
        assert_eq!(toks[1].position, 2);
        assert_eq!(toks[2].position, 3);
    }

    #[test]
    fn custom_delimiters() {
        assert_eq!(tokenize("<x> {y}", '<', '>').unwrap().len(), 4);
    }

    #[test]
    fn errors() {
        assert_eq!(
            tokenize("ab {x", '{', '}').unwrap_err(),
            ParseError::UnclosedTag { position: 3 }
        );
        assert_eq!(
            tokenize("{'abc", '{', '}').unwrap_err(),
            ParseError::UnterminatedString { position: 1 }
        );
        assert!(matches!(
            tokenize("{a {b}", '{', '}').unwrap_err(),
            ParseError::MalformedTag { position: 3, .. }
        ));
    }
}
