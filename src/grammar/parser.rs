use super::ast::*;
use super::lexer::{Lexer, Token, TokenKind};
use super::GrammarError;
use log::{debug, trace};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::str::FromStr;

/// Number of significant tokens inspected when choosing a value variant.
pub const LOOKAHEAD: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    EventLog,
    LastCapture,
    LegacyLastCapture,
    Obis,
    Measurement,
    Timestamp,
    Text,
}

type Opening = fn(&[Token<'_>]) -> bool;

// Tried in order, the first matching opening pattern is committed to.
// Anything else is a plain value or a list and goes through LIST_VARIANTS.
const VALUE_VARIANTS: &[(Variant, Opening)] = &[
    (Variant::EventLog, opens_event_log),
    (Variant::LastCapture, opens_last_capture),
    (Variant::LegacyLastCapture, opens_legacy_last_capture),
];

const LIST_VARIANTS: &[(Variant, Opening)] = &[
    (Variant::Obis, opens_obis),
    (Variant::Measurement, opens_measurement),
    (Variant::Timestamp, opens_timestamp),
    (Variant::Text, opens_text),
];

fn opens_event_log(ahead: &[Token<'_>]) -> bool {
    matches!(ahead, [count, close, open, obis, ..]
        if count.is(TokenKind::Number) && close.is_punct(")") && open.is_punct("(") && obis.is(TokenKind::Obis))
}

fn opens_last_capture(ahead: &[Token<'_>]) -> bool {
    matches!(ahead, [ts, close, open, value, ..]
        if ts.is(TokenKind::Timestamp) && has_dst_flag(ts)
            && close.is_punct(")") && open.is_punct("(") && value.is(TokenKind::Number))
}

fn opens_legacy_last_capture(ahead: &[Token<'_>]) -> bool {
    matches!(ahead, [ts, close, open, value, ..]
        if ts.is(TokenKind::Timestamp) && !has_dst_flag(ts)
            && close.is_punct(")") && open.is_punct("(") && value.is(TokenKind::Number))
}

fn opens_obis(ahead: &[Token<'_>]) -> bool {
    matches!(ahead, [obis, ..] if obis.is(TokenKind::Obis))
}

fn opens_measurement(ahead: &[Token<'_>]) -> bool {
    matches!(ahead, [value, star, ..] if value.is(TokenKind::Number) && star.is_punct("*"))
}

fn opens_timestamp(ahead: &[Token<'_>]) -> bool {
    matches!(ahead, [ts, close, ..] if ts.is(TokenKind::Timestamp) && close.is_punct(")"))
}

fn opens_text(_: &[Token<'_>]) -> bool {
    true
}

fn has_dst_flag(token: &Token<'_>) -> bool {
    token.text.len() > 12
}

/// Recursive descent parser over a lazily filled token buffer.
///
/// End of line tokens stay in the buffer so header, footer and text
/// values can stop at them, but they are skipped when looking ahead.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    buffer: VecDeque<Token<'a>>,
}

impl<'a> Parser<'a> {
    pub fn new(lexer: Lexer<'a>) -> Self {
        Self {
            lexer,
            buffer: VecDeque::new(),
        }
    }

    pub fn parse(mut self) -> Result<Telegram, GrammarError> {
        let header = self.parse_header()?;

        let mut objects = Vec::new();
        loop {
            match self.peek()? {
                Some(token) if token.is(TokenKind::Obis) => objects.push(self.parse_object()?),
                Some(token) if token.is_punct("!") => break,
                found => return Err(self.unexpected(found, "OBIS code or \"!\"")),
            }
        }

        let footer = self.parse_footer()?;
        if let Some(token) = self.peek()? {
            return Err(self.unexpected(Some(token), "end of telegram"));
        }

        debug!("Parsed telegram {:?} with {} objects", header.value, objects.len());

        Ok(Telegram {
            pos: Position::start(),
            header,
            objects,
            footer,
        })
    }

    fn parse_header(&mut self) -> Result<Header, GrammarError> {
        let slash = self.expect_punct("/", "\"/\" starting the header")?;
        let value = self.collect_text()?;
        if value.is_empty() {
            let found = self.peek_raw()?;
            return Err(self.unexpected(found, "meter identification"));
        }
        self.expect_eol()?;

        Ok(Header { pos: slash.pos, value })
    }

    fn parse_footer(&mut self) -> Result<Footer, GrammarError> {
        let bang = self.expect_punct("!", "\"!\" starting the footer")?;
        let value = self.collect_text()?;
        self.expect_eol()?;

        Ok(Footer {
            pos: bang.pos,
            value: if value.is_empty() { None } else { Some(value) },
        })
    }

    fn parse_object(&mut self) -> Result<Object, GrammarError> {
        let token = self.expect_kind(TokenKind::Obis, "OBIS code")?;
        let obis = obis_from(&token)?;
        self.expect_punct("(", "\"(\"")?;
        let value = self.parse_value()?;
        self.expect_close()?;
        self.expect_eol()?;

        trace!("Parsed object {} as {}", obis, value.variant_name());
        Ok(Object { pos: token.pos, obis, value })
    }

    fn parse_value(&mut self) -> Result<Value, GrammarError> {
        match self.select(VALUE_VARIANTS)? {
            Variant::EventLog => Ok(Value::EventLog(self.parse_event_log()?)),
            Variant::LastCapture => Ok(Value::LastCapture(self.parse_last_capture()?)),
            Variant::LegacyLastCapture => Ok(Value::LegacyLastCapture(self.parse_legacy_last_capture()?)),
            _ => {
                let first = self.parse_list_value()?;
                if !self.continues_group()? {
                    return Ok(first.into_value());
                }

                let pos = first.position();
                let mut values = vec![first];
                while self.continues_group()? {
                    self.open_next_group()?;
                    values.push(self.parse_list_value()?);
                }

                Ok(Value::List(List { pos, values }))
            }
        }
    }

    fn parse_list_value(&mut self) -> Result<ListValue, GrammarError> {
        match self.select(LIST_VARIANTS)? {
            Variant::Obis => {
                let token = self.expect_kind(TokenKind::Obis, "OBIS code")?;
                Ok(ListValue::Obis(obis_from(&token)?))
            }
            Variant::Measurement => Ok(ListValue::Measurement(self.parse_measurement()?)),
            Variant::Timestamp => Ok(ListValue::Timestamp(self.parse_timestamp()?)),
            _ => Ok(ListValue::Text(self.parse_text()?)),
        }
    }

    fn parse_event_log(&mut self) -> Result<EventLog, GrammarError> {
        let count = self.parse_number()?;
        self.open_next_group()?;
        let token = self.expect_kind(TokenKind::Obis, "OBIS code of the event log")?;
        let obis = obis_from(&token)?;

        let mut events = Vec::new();
        while self.continues_group()? {
            self.open_next_group()?;
            let timestamp = self.parse_timestamp()?;
            self.open_next_group()?;
            let value = self.parse_measurement()?;
            events.push(Event { pos: timestamp.pos, timestamp, value });
        }

        if count.value != Decimal::from(events.len()) {
            debug!("Event log {} announces {} events but carries {}", obis, count, events.len());
        }

        Ok(EventLog { pos: count.pos, count, obis, events })
    }

    fn parse_last_capture(&mut self) -> Result<LastCapture, GrammarError> {
        let timestamp = self.parse_timestamp()?;
        self.open_next_group()?;
        let value = self.parse_measurement()?;

        Ok(LastCapture { pos: timestamp.pos, timestamp, value })
    }

    fn parse_legacy_last_capture(&mut self) -> Result<LegacyLastCapture, GrammarError> {
        let timestamp = self.parse_timestamp()?;

        let mut groups: Vec<Vec<Token<'a>>> = Vec::new();
        while self.continues_group()? {
            let open = self.open_next_group()?;
            let group = self.collect_group()?;
            if group.is_empty() {
                let found = self.peek_raw()?;
                return Err(self.unexpected(found, "capture group content"));
            }
            groups.push(group);
            trace!("Legacy capture group at {}", open.pos);
        }

        let (value, unit) = match groups.as_slice() {
            [.., unit, value] => (value, unit),
            _ => {
                let found = self.peek()?;
                return Err(self.unexpected(found, "\"(\" opening the capture unit and value"));
            }
        };

        let number = match value.as_slice() {
            [token] if token.is(TokenKind::Number) => number_from(token)?,
            other => return Err(self.unexpected(other.first().copied(), "captured value")),
        };
        let unit = concat(unit);
        let extra = groups[..groups.len() - 2].iter().map(|group| concat(group)).collect();

        Ok(LegacyLastCapture {
            pos: timestamp.pos,
            timestamp,
            extra,
            unit,
            value: number,
        })
    }

    fn parse_measurement(&mut self) -> Result<Measurement, GrammarError> {
        let value = self.parse_number()?;
        self.expect_punct("*", "\"*\" between value and unit")?;
        let unit = self.collect_text()?;
        if unit.is_empty() {
            let found = self.peek_raw()?;
            return Err(self.unexpected(found, "unit"));
        }

        Ok(Measurement { pos: value.pos, value, unit })
    }

    fn parse_number(&mut self) -> Result<Number, GrammarError> {
        let token = self.expect_kind(TokenKind::Number, "number")?;
        number_from(&token)
    }

    fn parse_timestamp(&mut self) -> Result<Timestamp, GrammarError> {
        let token = self.expect_kind(TokenKind::Timestamp, "timestamp")?;
        let (value, flag) = token.text.split_at(12);

        Ok(Timestamp {
            pos: token.pos,
            value: value.to_string(),
            dst: flag.chars().next().and_then(Dst::from_flag),
        })
    }

    fn parse_text(&mut self) -> Result<Text, GrammarError> {
        let pos = match self.peek_raw()? {
            Some(token) => token.pos,
            None => self.lexer.current_position(),
        };
        let value = self.collect_text()?;

        Ok(Text { pos, value })
    }

    /// Concatenates raw tokens up to `)` or the end of the line.
    fn collect_text(&mut self) -> Result<String, GrammarError> {
        Ok(concat(&self.collect_group()?))
    }

    fn collect_group(&mut self) -> Result<Vec<Token<'a>>, GrammarError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.peek_raw()? {
            if token.is(TokenKind::Eol) || token.is_punct(")") {
                break;
            }
            tokens.push(token);
            self.buffer.pop_front();
        }

        Ok(tokens)
    }

    /// Chooses the first variant whose opening pattern matches the lookahead.
    fn select(&mut self, variants: &[(Variant, Opening)]) -> Result<Variant, GrammarError> {
        let ahead = self.lookahead(LOOKAHEAD)?;
        for (variant, opens) in variants {
            if opens(&ahead) {
                trace!("Selected {:?} for {:?}", variant, ahead.first().map(|t| t.text));
                return Ok(*variant);
            }
        }

        Ok(Variant::Text)
    }

    /// `)` directly followed by `(` continues the current value.
    fn continues_group(&mut self) -> Result<bool, GrammarError> {
        let ahead = self.lookahead(2)?;
        Ok(matches!(ahead.as_slice(), [close, open] if close.is_punct(")") && open.is_punct("(")))
    }

    fn open_next_group(&mut self) -> Result<Token<'a>, GrammarError> {
        self.expect_punct(")", "\")\"")?;
        self.expect_punct("(", "\"(\"")
    }

    fn expect_punct(&mut self, punct: &str, expected: &str) -> Result<Token<'a>, GrammarError> {
        match self.peek()? {
            Some(token) if token.is_punct(punct) => self.advance(),
            found => Err(self.unexpected(found, expected)),
        }
    }

    fn expect_kind(&mut self, kind: TokenKind, expected: &str) -> Result<Token<'a>, GrammarError> {
        match self.peek()? {
            Some(token) if token.is(kind) => self.advance(),
            found => Err(self.unexpected(found, expected)),
        }
    }

    /// The `)` closing an object has to be on the same line as its value.
    fn expect_close(&mut self) -> Result<(), GrammarError> {
        match self.peek_raw()? {
            Some(token) if token.is_punct(")") => {
                self.buffer.pop_front();
                Ok(())
            }
            found => Err(self.unexpected(found, "\")\"")),
        }
    }

    fn expect_eol(&mut self) -> Result<(), GrammarError> {
        match self.peek_raw()? {
            Some(token) if token.is(TokenKind::Eol) => {
                self.buffer.pop_front();
                Ok(())
            }
            found => Err(self.unexpected(found, "end of line")),
        }
    }

    /// Consumes the next significant token, dropping end of lines before it.
    fn advance(&mut self) -> Result<Token<'a>, GrammarError> {
        self.peek()?;
        match self.buffer.pop_front() {
            Some(token) => Ok(token),
            None => Err(self.unexpected(None, "more input")),
        }
    }

    /// Next significant token. Leading end of lines are dropped.
    fn peek(&mut self) -> Result<Option<Token<'a>>, GrammarError> {
        loop {
            match self.peek_raw()? {
                Some(token) if token.is(TokenKind::Eol) => {
                    self.buffer.pop_front();
                }
                other => return Ok(other),
            }
        }
    }

    fn peek_raw(&mut self) -> Result<Option<Token<'a>>, GrammarError> {
        if self.buffer.is_empty() {
            if let Some(token) = self.lexer.next() {
                self.buffer.push_back(token?);
            }
        }

        Ok(self.buffer.front().copied())
    }

    /// Up to `n` significant tokens without consuming anything.
    fn lookahead(&mut self, n: usize) -> Result<Vec<Token<'a>>, GrammarError> {
        while self.buffer.iter().filter(|t| !t.is(TokenKind::Eol)).count() < n {
            match self.lexer.next() {
                Some(token) => self.buffer.push_back(token?),
                None => break,
            }
        }

        Ok(self
            .buffer
            .iter()
            .filter(|t| !t.is(TokenKind::Eol))
            .take(n)
            .copied()
            .collect())
    }

    fn unexpected(&self, found: Option<Token<'a>>, expected: &str) -> GrammarError {
        match found {
            Some(token) => GrammarError::Syntax {
                pos: token.pos,
                expected: expected.to_string(),
                found: token.describe(),
            },
            None => GrammarError::Syntax {
                pos: self.lexer.current_position(),
                expected: expected.to_string(),
                found: "end of input".to_string(),
            },
        }
    }
}

fn concat(tokens: &[Token<'_>]) -> String {
    tokens.iter().map(|t| t.text).collect()
}

fn obis_from(token: &Token<'_>) -> Result<Obis, GrammarError> {
    let mut obis = Obis::from_str(token.text).map_err(|e| GrammarError::Syntax {
        pos: token.pos,
        expected: "OBIS code".to_string(),
        found: e.to_string(),
    })?;
    obis.pos = token.pos;

    Ok(obis)
}

fn number_from(token: &Token<'_>) -> Result<Number, GrammarError> {
    let value = Decimal::from_str(token.text).map_err(|e| GrammarError::Syntax {
        pos: token.pos,
        expected: "decimal number".to_string(),
        found: format!("{} ({})", token.describe(), e),
    })?;

    Ok(Number { pos: token.pos, value })
}
