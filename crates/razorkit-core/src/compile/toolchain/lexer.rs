//! Tokenizer for generated units
//!
//! Forward-only over the unit text. `//` comments are skipped; a `#line`
//! pragma at the start of a line becomes a [`Tok::Pragma`] token so the
//! parser can attach template positions to the statement that follows.

use crate::compile::diagnostic::{codes, parse_pragma, Diagnostic};
use crate::template::scan::{is_ident_start, Cursor};
use crate::types::SourcePos;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Ident(String),
    Str(String),
    Num(serde_json::Number),
    /// Template position of the next statement
    Pragma(SourcePos),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Lt,
    Gt,
    Comma,
    Dot,
    Semi,
    Colon,
    Bang,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Assign,
    Arrow,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Tok::Ident(name) => return write!(f, "'{}'", name),
            Tok::Str(_) => "string literal",
            Tok::Num(n) => return write!(f, "'{}'", n),
            Tok::Pragma(_) => "#line",
            Tok::LParen => "'('",
            Tok::RParen => "')'",
            Tok::LBrace => "'{'",
            Tok::RBrace => "'}'",
            Tok::Lt => "'<'",
            Tok::Gt => "'>'",
            Tok::Comma => "','",
            Tok::Dot => "'.'",
            Tok::Semi => "';'",
            Tok::Colon => "':'",
            Tok::Bang => "'!'",
            Tok::EqEq => "'=='",
            Tok::NotEq => "'!='",
            Tok::AndAnd => "'&&'",
            Tok::OrOr => "'||'",
            Tok::Assign => "'='",
            Tok::Arrow => "'=>'",
        };
        f.write_str(text)
    }
}

/// A token and its position in the generated unit
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub tok: Tok,
    pub pos: SourcePos,
}

pub(crate) struct TokenStream<'a> {
    cursor: Cursor<'a>,
    /// Only whitespace seen since the last newline
    line_start: bool,
}

impl<'a> TokenStream<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            cursor: Cursor::new(text),
            line_start: true,
        }
    }

    fn syntax(pos: SourcePos, message: impl Into<String>) -> Diagnostic {
        Diagnostic::error(codes::SYNTAX, Some(pos), message)
    }

    fn token(&mut self, pos: SourcePos, c: char) -> Result<Tok, Diagnostic> {
        if is_ident_start(c) {
            let name = self.cursor.identifier().unwrap_or_default();
            return Ok(Tok::Ident(name.to_string()));
        }
        if c == '"' {
            return self.string(pos);
        }
        let negative_number = c == '-' && self.cursor.peek_second().is_some_and(|d| d.is_ascii_digit());
        if c.is_ascii_digit() || negative_number {
            return self.number(pos);
        }

        self.cursor.bump();
        let tok = match c {
            '(' => Tok::LParen,
            ')' => Tok::RParen,
            '{' => Tok::LBrace,
            '}' => Tok::RBrace,
            '<' => Tok::Lt,
            '>' => Tok::Gt,
            ',' => Tok::Comma,
            '.' => Tok::Dot,
            ';' => Tok::Semi,
            ':' => Tok::Colon,
            '=' if self.cursor.eat('=') => Tok::EqEq,
            '=' if self.cursor.eat('>') => Tok::Arrow,
            '=' => Tok::Assign,
            '!' if self.cursor.eat('=') => Tok::NotEq,
            '!' => Tok::Bang,
            '&' if self.cursor.eat('&') => Tok::AndAnd,
            '|' if self.cursor.eat('|') => Tok::OrOr,
            other => {
                return Err(Self::syntax(pos, format!("Unexpected character '{}'", other)));
            }
        };
        Ok(tok)
    }

    fn string(&mut self, pos: SourcePos) -> Result<Tok, Diagnostic> {
        let start = self.cursor.offset();
        self.cursor.bump();
        loop {
            match self.cursor.bump() {
                None | Some('\n') => {
                    return Err(Self::syntax(pos, "Unterminated string literal"));
                }
                Some('\\') => {
                    self.cursor.bump();
                }
                Some('"') => break,
                Some(_) => {}
            }
        }
        let literal = self.cursor.slice(start, self.cursor.offset());
        serde_json::from_str::<String>(literal)
            .map(Tok::Str)
            .map_err(|e| Self::syntax(pos, format!("Invalid string literal: {}", e)))
    }

    fn number(&mut self, pos: SourcePos) -> Result<Tok, Diagnostic> {
        let start = self.cursor.offset();
        self.cursor.eat('-');
        while self.cursor.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.cursor.bump();
        }
        if self.cursor.peek() == Some('.')
            && self.cursor.peek_second().is_some_and(|c| c.is_ascii_digit())
        {
            self.cursor.bump();
            while self.cursor.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.cursor.bump();
            }
        }
        let literal = self.cursor.slice(start, self.cursor.offset());
        serde_json::from_str::<serde_json::Number>(literal)
            .map(Tok::Num)
            .map_err(|_| Self::syntax(pos, format!("Invalid number literal '{}'", literal)))
    }
}

impl<'a> Iterator for TokenStream<'a> {
    type Item = Result<Token, Diagnostic>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let pos = self.cursor.pos();
            match self.cursor.peek()? {
                '\n' => {
                    self.cursor.bump();
                    self.line_start = true;
                }
                c if c.is_whitespace() => {
                    self.cursor.bump();
                }
                '/' if self.cursor.starts_with("//") => {
                    self.cursor.line_rest();
                }
                '#' if self.line_start => {
                    let line = self.cursor.line_rest();
                    return Some(match parse_pragma(line) {
                        Some((template, _)) => Ok(Token {
                            tok: Tok::Pragma(template),
                            pos,
                        }),
                        None => Err(Self::syntax(pos, format!("Malformed pragma '{}'", line.trim()))),
                    });
                }
                c => {
                    self.line_start = false;
                    return Some(self.token(pos, c).map(|tok| Token { tok, pos }));
                }
            }
        }
    }
}

/// Tokenizes a whole unit, stopping at the first error
pub(crate) fn tokenize(text: &str) -> Result<Vec<Token>, Diagnostic> {
    TokenStream::new(text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<Tok> {
        tokenize(text).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_tokenize_statement() {
        assert_eq!(
            kinds("emit Text.Upper(Model.Name);"),
            vec![
                Tok::Ident("emit".into()),
                Tok::Ident("Text".into()),
                Tok::Dot,
                Tok::Ident("Upper".into()),
                Tok::LParen,
                Tok::Ident("Model".into()),
                Tok::Dot,
                Tok::Ident("Name".into()),
                Tok::RParen,
                Tok::Semi,
            ]
        );
    }

    #[test]
    fn test_tokenize_operators_and_literals() {
        assert_eq!(
            kinds("a == \"x\\\"y\" && !b || c != -1.5 => ="),
            vec![
                Tok::Ident("a".into()),
                Tok::EqEq,
                Tok::Str("x\"y".into()),
                Tok::AndAnd,
                Tok::Bang,
                Tok::Ident("b".into()),
                Tok::OrOr,
                Tok::Ident("c".into()),
                Tok::NotEq,
                Tok::Num(serde_json::Number::from_f64(-1.5).unwrap()),
                Tok::Arrow,
                Tok::Assign,
            ]
        );
    }

    #[test]
    fn test_pragma_and_comments() {
        let tokens = tokenize("// header\n#line 4:2 @14\n    emit x;").unwrap();
        assert_eq!(tokens[0].tok, Tok::Pragma(SourcePos::new(4, 2)));
        assert_eq!(tokens[1].tok, Tok::Ident("emit".into()));
        assert_eq!(tokens[1].pos, SourcePos::new(3, 5));
    }

    #[test]
    fn test_hash_inside_line_is_an_error() {
        let err = tokenize("emit #x;").unwrap_err();
        assert_eq!(err.code, codes::SYNTAX);
        assert_eq!(err.position, Some(SourcePos::new(1, 6)));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("write \"abc\nemit x;").unwrap_err();
        assert!(err.message.contains("Unterminated string"));
        assert_eq!(err.position, Some(SourcePos::new(1, 7)));
    }

    #[test]
    fn test_invalid_number() {
        assert!(tokenize("emit 007;").is_err());
    }
}
