use thiserror::Error;

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::*;
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("{pos}: invalid input character {found}")]
    Lex { pos: Position, found: String },
    #[error("{pos}: unexpected {found} (expected {expected})")]
    Syntax {
        pos: Position,
        expected: String,
        found: String,
    },
}

impl GrammarError {
    pub fn position(&self) -> Position {
        match self {
            GrammarError::Lex { pos, .. } | GrammarError::Syntax { pos, .. } => *pos,
        }
    }
}

/// Parse a telegram from text.
pub fn parse_str(input: &str) -> Result<Telegram, GrammarError> {
    Parser::new(Lexer::new(input)).parse()
}

/// Parse a telegram from raw bytes, which must be valid UTF-8.
pub fn parse_bytes(data: &[u8]) -> Result<Telegram, GrammarError> {
    let input = std::str::from_utf8(data).map_err(|e| {
        let offset = e.valid_up_to();
        GrammarError::Lex {
            pos: Position::locate(data, offset),
            found: format!("byte 0x{:02X}", data[offset]),
        }
    })?;

    parse_str(input)
}
