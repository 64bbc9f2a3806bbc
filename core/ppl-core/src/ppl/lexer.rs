//! PPL lexer: query text to token stream.
//!
//! Identifiers are matched maximally first and only then looked up in the
//! keyword table (case-insensitively), so `sourcetype` is an identifier and
//! `SOURCE` is a keyword. Whitespace and comments never reach the parser.

use crate::error::{PplError, PplResult};
use serde::Serialize;
use std::fmt;

/// Location in the query text (1-based line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

macro_rules! keywords {
    ($($variant:ident => $text:literal),* $(,)?) => {
        /// Reserved words, matched case-insensitively.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Keyword {
            $($variant),*
        }

        impl Keyword {
            pub fn lookup(word: &str) -> Option<Keyword> {
                $(if word.eq_ignore_ascii_case($text) {
                    return Some(Keyword::$variant);
                })*
                None
            }

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Keyword::$variant => $text),*
                }
            }
        }
    };
}

keywords! {
    Search => "search",
    Source => "source",
    Where => "where",
    Fields => "fields",
    Stats => "stats",
    By => "by",
    As => "as",
    Sort => "sort",
    Asc => "asc",
    Desc => "desc",
    Head => "head",
    From => "from",
    Top => "top",
    Eval => "eval",
    Rename => "rename",
    Parse => "parse",
    Grok => "grok",
    Join => "join",
    On => "on",
    Inner => "inner",
    Left => "left",
    Right => "right",
    Full => "full",
    Outer => "outer",
    Lookup => "lookup",
    Output => "output",
    And => "and",
    Or => "or",
    Not => "not",
    Xor => "xor",
    True => "true",
    False => "false",
    Null => "null",
}

impl Keyword {
    /// Operators and literals can never name a field; every other keyword
    /// may appear where a field name is expected.
    pub fn is_reserved(&self) -> bool {
        matches!(
            self,
            Keyword::And | Keyword::Or | Keyword::Not | Keyword::Xor | Keyword::True | Keyword::False | Keyword::Null
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword(Keyword),
    Ident,
    /// Backquoted identifier; never a keyword
    QuotedIdent,
    String,
    Integer,
    Float,
    Pipe,
    Comma,
    LParen,
    RParen,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Keyword(k) => return write!(f, "keyword '{}'", k.as_str()),
            TokenKind::Ident | TokenKind::QuotedIdent => "identifier",
            TokenKind::String => "string literal",
            TokenKind::Integer => "integer literal",
            TokenKind::Float => "float literal",
            TokenKind::Pipe => "'|'",
            TokenKind::Comma => "','",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::Eq => "'='",
            TokenKind::NotEq => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::LtEq => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::GtEq => "'>='",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Eof => "end of input",
        };
        f.write_str(text)
    }
}

/// One lexical unit. `text` holds the unquoted content for strings and
/// backquoted identifiers, the source slice otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub position: Position,
}

impl Token {
    /// Human-readable rendering for error messages.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::String => format!("string \"{}\"", self.text),
            _ => format!("'{}'", self.text),
        }
    }
}

/// Converts `text` into tokens, always ending with [`TokenKind::Eof`].
pub fn tokenize(text: &str) -> PplResult<Vec<Token>> {
    Lexer::new(text).run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    offset: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn position(&self) -> Position {
        Position {
            offset: self.offset,
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.offset).copied()
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.offset + n).copied()
    }

    fn bump(&mut self) {
        if let Some(ch) = self.src[self.offset..].chars().next() {
            self.offset += ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn error(&self, position: Position, reason: impl Into<String>) -> PplError {
        PplError::Lex {
            position,
            reason: reason.into(),
        }
    }

    fn run(mut self) -> PplResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let start = self.position();
            let Some(ch) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    text: String::new(),
                    position: start,
                });
                return Ok(tokens);
            };

            let token = match ch {
                b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'@' => self.word(start),
                b'0'..=b'9' => self.number(start)?,
                b'\'' | b'"' => self.string(start, ch)?,
                b'`' => self.quoted_ident(start)?,
                _ => self.operator(start)?,
            };
            tokens.push(token);
        }
    }

    fn skip_trivia(&mut self) -> PplResult<()> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_ascii_whitespace() => self.bump(),
                (Some(b'/'), Some(b'/')) => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let start = self.position();
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some(b'*'), Some(b'/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => self.bump(),
                            (None, _) => return Err(self.error(start, "unterminated block comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn word(&mut self, start: Position) -> Token {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, b'_' | b'@' | b'.') {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.src[start.offset..self.offset];
        let kind = match Keyword::lookup(text) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Ident,
        };
        Token {
            kind,
            text: text.to_string(),
            position: start,
        }
    }

    fn number(&mut self, start: Position) -> PplResult<Token> {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.bump();
        }
        let mut kind = TokenKind::Integer;
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            kind = TokenKind::Float;
            self.bump();
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some(c) if c.is_ascii_alphabetic() || c == b'_') {
            return Err(self.error(self.position(), "invalid character in numeric literal"));
        }
        let text = &self.src[start.offset..self.offset];
        // i64::MIN's magnitude is accepted so a leading minus can reach it
        let in_range = text
            .parse::<u64>()
            .is_ok_and(|v| v <= i64::MIN.unsigned_abs());
        if kind == TokenKind::Integer && !in_range {
            return Err(self.error(start, format!("integer literal {text} out of range")));
        }
        Ok(Token {
            kind,
            text: text.to_string(),
            position: start,
        })
    }

    fn string(&mut self, start: Position, quote: u8) -> PplResult<Token> {
        self.bump();
        let content_start = self.offset;
        loop {
            match self.peek() {
                Some(c) if c == quote => break,
                Some(_) => self.bump(),
                None => return Err(self.error(start, "unterminated string literal")),
            }
        }
        let text = self.src[content_start..self.offset].to_string();
        self.bump();
        Ok(Token {
            kind: TokenKind::String,
            text,
            position: start,
        })
    }

    fn quoted_ident(&mut self, start: Position) -> PplResult<Token> {
        self.bump();
        let content_start = self.offset;
        loop {
            match self.peek() {
                Some(b'`') => break,
                Some(b'\n') | None => {
                    return Err(self.error(start, "unterminated quoted identifier"));
                }
                Some(_) => self.bump(),
            }
        }
        let text = self.src[content_start..self.offset].to_string();
        self.bump();
        if text.is_empty() {
            return Err(self.error(start, "empty quoted identifier"));
        }
        Ok(Token {
            kind: TokenKind::QuotedIdent,
            text,
            position: start,
        })
    }

    fn operator(&mut self, start: Position) -> PplResult<Token> {
        let two = (self.peek(), self.peek_at(1));
        let (kind, len) = match two {
            (Some(b'='), Some(b'=')) => (TokenKind::Eq, 2),
            (Some(b'!'), Some(b'=')) => (TokenKind::NotEq, 2),
            (Some(b'<'), Some(b'>')) => (TokenKind::NotEq, 2),
            (Some(b'<'), Some(b'=')) => (TokenKind::LtEq, 2),
            (Some(b'>'), Some(b'=')) => (TokenKind::GtEq, 2),
            (Some(b'='), _) => (TokenKind::Eq, 1),
            (Some(b'<'), _) => (TokenKind::Lt, 1),
            (Some(b'>'), _) => (TokenKind::Gt, 1),
            (Some(b'|'), _) => (TokenKind::Pipe, 1),
            (Some(b','), _) => (TokenKind::Comma, 1),
            (Some(b'('), _) => (TokenKind::LParen, 1),
            (Some(b')'), _) => (TokenKind::RParen, 1),
            (Some(b'+'), _) => (TokenKind::Plus, 1),
            (Some(b'-'), _) => (TokenKind::Minus, 1),
            (Some(b'*'), _) => (TokenKind::Star, 1),
            (Some(b'/'), _) => (TokenKind::Slash, 1),
            (Some(b'%'), _) => (TokenKind::Percent, 1),
            _ => {
                let ch = self.src[self.offset..].chars().next().unwrap_or('\0');
                return Err(self.error(start, format!("unexpected character '{ch}'")));
            }
        };
        for _ in 0..len {
            self.bump();
        }
        Ok(Token {
            kind,
            text: self.src[start.offset..self.offset].to_string(),
            position: start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            kinds("SOURCE = logs | Where x"),
            vec![
                TokenKind::Keyword(Keyword::Source),
                TokenKind::Eq,
                TokenKind::Ident,
                TokenKind::Pipe,
                TokenKind::Keyword(Keyword::Where),
                TokenKind::Ident,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn longest_match_before_keyword_lookup() {
        let tokens = tokenize("sourcetype headers user.name").unwrap();
        assert!(tokens[..3].iter().all(|t| t.kind == TokenKind::Ident));
        assert_eq!(tokens[2].text, "user.name");
    }

    #[test]
    fn numbers_distinguish_integer_and_float() {
        let tokens = tokenize("42 4.5").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Integer);
        assert_eq!(tokens[1].kind, TokenKind::Float);
        assert!(matches!(tokenize("7."), Err(PplError::Lex { .. })));
        assert!(matches!(tokenize("12abc"), Err(PplError::Lex { .. })));
    }

    #[test]
    fn integer_range_reaches_i64_min_magnitude() {
        assert!(tokenize("9223372036854775808").is_ok());
        assert!(matches!(tokenize("9223372036854775809"), Err(PplError::Lex { .. })));
    }

    #[test]
    fn strings_have_no_escape_processing() {
        let tokens = tokenize(r#"'a\n' "it's""#).unwrap();
        assert_eq!(tokens[0].text, r"a\n");
        assert_eq!(tokens[1].text, "it's");
        assert_eq!(tokens[1].kind, TokenKind::String);
    }

    #[test]
    fn comments_and_whitespace_are_discarded() {
        assert_eq!(
            kinds("a /* skip | this */ b // trailing\n c"),
            vec![TokenKind::Ident, TokenKind::Ident, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn comparison_operators() {
        assert_eq!(
            kinds("= == != <> < <= > >="),
            vec![
                TokenKind::Eq,
                TokenKind::Eq,
                TokenKind::NotEq,
                TokenKind::NotEq,
                TokenKind::Lt,
                TokenKind::LtEq,
                TokenKind::Gt,
                TokenKind::GtEq,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn positions_track_lines() {
        let tokens = tokenize("source=a\n| head").unwrap();
        let head = &tokens[4];
        assert_eq!(head.position.line, 2);
        assert_eq!(head.position.column, 3);
    }

    #[test]
    fn backquoted_identifier_is_never_keyword() {
        let tokens = tokenize("`where` `my field`").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::QuotedIdent);
        assert_eq!(tokens[0].text, "where");
        assert_eq!(tokens[1].text, "my field");
    }

    #[test]
    fn errors_carry_positions() {
        match tokenize("source = 'open") {
            Err(PplError::Lex { position, reason }) => {
                assert_eq!(position.column, 10);
                assert!(reason.contains("unterminated"));
            }
            other => panic!("expected lex error, got {other:?}"),
        }
        assert!(matches!(tokenize("a ; b"), Err(PplError::Lex { .. })));
        assert!(matches!(
            tokenize("99999999999999999999"),
            Err(PplError::Lex { .. })
        ));
    }
}
