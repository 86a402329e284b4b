use super::ast::Position;
use super::GrammarError;
use lazy_static::lazy_static;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Obis,
    Timestamp,
    Number,
    Punct,
    Chars,
    Eol,
}

/// A token borrowed from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub pos: Position,
}

impl Token<'_> {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn is_punct(&self, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == punct
    }

    /// Short description used in syntax errors.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eol => "end of line".to_string(),
            TokenKind::Obis => format!("OBIS code {:?}", self.text),
            TokenKind::Timestamp => format!("timestamp {:?}", self.text),
            TokenKind::Number => format!("number {:?}", self.text),
            TokenKind::Punct | TokenKind::Chars => format!("{:?}", self.text),
        }
    }
}

lazy_static! {
    // Order matters, the first rule matching at the current offset wins.
    static ref RULES: Vec<(TokenKind, Regex)> = [
        (TokenKind::Obis, r"^[0-9]{1,2}-[0-9]{1,2}:[0-9]{1,2}\.[0-9]{1,2}\.[0-9]{1,2}"),
        (TokenKind::Timestamp, r"^[0-9]{12}[SW]?"),
        (TokenKind::Number, r"^[0-9]*\.?[0-9]+"),
        (TokenKind::Punct, r"^[/!()*.\-_\\]"),
        (TokenKind::Chars, r"^[A-Za-z0-9]+"),
        (TokenKind::Eol, r"^\r\n"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("invalid token rule")))
    .collect();
}

/// Splits telegram text into tokens on demand.
///
/// The lexer stops for good after the first error.
pub struct Lexer<'a> {
    input: &'a str,
    offset: usize,
    line: usize,
    line_start: usize,
    failed: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            offset: 0,
            line: 1,
            line_start: 0,
            failed: false,
        }
    }

    /// Position of the next byte to be lexed.
    pub fn current_position(&self) -> Position {
        Position {
            offset: self.offset,
            line: self.line,
            column: self.offset - self.line_start + 1,
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, GrammarError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.input.len() {
            return None;
        }

        let rest = &self.input[self.offset..];
        let pos = self.current_position();
        for (kind, rule) in RULES.iter() {
            if let Some(m) = rule.find(rest) {
                let text = &rest[..m.end()];
                self.offset += m.end();
                if *kind == TokenKind::Eol {
                    self.line += 1;
                    self.line_start = self.offset;
                }

                return Some(Ok(Token { kind: *kind, text, pos }));
            }
        }

        self.failed = true;
        let found = rest.chars().next().map(|c| format!("{:?}", c)).unwrap_or_default();
        Some(Err(GrammarError::Lex { pos, found }))
    }
}
