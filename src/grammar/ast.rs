use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Start of a node in the raw telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    /// Byte offset into the raw input
    pub offset: usize,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

impl Position {
    pub fn start() -> Self {
        Position { offset: 0, line: 1, column: 1 }
    }

    /// Locate a byte offset in raw data by counting the preceding line feeds.
    pub fn locate(data: &[u8], offset: usize) -> Self {
        let head = &data[..offset.min(data.len())];
        let line = head.iter().filter(|&&b| b == b'\n').count() + 1;
        let line_start = head.iter().rposition(|&b| b == b'\n').map(|p| p + 1).unwrap_or(0);

        Position { offset, line, column: offset - line_start + 1 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A complete telegram: header, COSEM objects in wire order and footer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Telegram {
    #[serde(skip)]
    pub pos: Position,
    pub header: Header,
    pub objects: Vec<Object>,
    pub footer: Footer,
}

impl Telegram {
    /// Entries as seen by the unmarshaller, the header and footer first.
    pub fn entries(&self) -> Vec<Entry<'_>> {
        let mut entries = Vec::with_capacity(self.objects.len() + 2);
        entries.push(Entry {
            key: "header".to_string(),
            pos: self.header.pos,
            value: Cow::Owned(Value::Text(Text { pos: self.header.pos, value: self.header.value.clone() })),
        });
        entries.push(Entry {
            key: "footer".to_string(),
            pos: self.footer.pos,
            value: Cow::Owned(Value::Text(Text {
                pos: self.footer.pos,
                value: self.footer.value.clone().unwrap_or_default(),
            })),
        });
        for object in &self.objects {
            entries.push(Entry {
                key: object.obis.to_string(),
                pos: object.pos,
                value: Cow::Borrowed(&object.value),
            });
        }

        entries
    }

    /// First object carrying the given OBIS code.
    pub fn get(&self, code: &str) -> Option<&Object> {
        self.objects.iter().find(|o| o.obis.to_string() == code)
    }

    pub fn checksum(&self) -> Option<&str> {
        self.footer.value.as_deref()
    }
}

/// A keyed value handed to the unmarshaller.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<'a> {
    pub key: String,
    pub pos: Position,
    pub value: Cow<'a, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    #[serde(skip)]
    pub pos: Position,
    pub value: String,
}

impl Header {
    /// Three letter FLAG manufacturer id, e.g. `ISk` for `/ISk5\2MT382-1004`.
    pub fn manufacturer(&self) -> Option<&str> {
        self.value.get(..3)
    }

    /// Everything following the manufacturer id.
    pub fn identification(&self) -> &str {
        self.value.get(3..).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Footer {
    #[serde(skip)]
    pub pos: Position,
    pub value: Option<String>,
}

/// Object is a COSEM object in the telegram represented by the
/// OBIS (Object Identification System) code and its value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Object {
    #[serde(skip)]
    pub pos: Position,
    pub obis: Obis,
    pub value: Value,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid OBIS code {0:?}")]
pub struct InvalidObis(pub String);

/// OBIS code `A-B:C.D.E`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obis {
    pub pos: Position,
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
}

impl Obis {
    pub fn new(a: u8, b: u8, c: u8, d: u8, e: u8) -> Self {
        Obis { pos: Position::default(), a, b, c, d, e }
    }
}

impl FromStr for Obis {
    type Err = InvalidObis;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidObis(s.to_string());
        let (a, rest) = s.split_once('-').ok_or_else(invalid)?;
        let (b, rest) = rest.split_once(':').ok_or_else(invalid)?;
        let group: Vec<&str> = [a, b].into_iter().chain(rest.split('.')).collect();
        if group.len() != 5 {
            return Err(invalid());
        }

        let mut parts = [0u8; 5];
        for (part, text) in parts.iter_mut().zip(&group) {
            if text.is_empty() || text.len() > 2 || !text.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *part = text.parse().map_err(|_| invalid())?;
        }

        Ok(Obis::new(parts[0], parts[1], parts[2], parts[3], parts[4]))
    }
}

impl fmt::Display for Obis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}:{}.{}.{}", self.a, self.b, self.c, self.d, self.e)
    }
}

impl Serialize for Obis {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Value of a COSEM object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Value {
    Text(Text),
    Number(Number),
    Measurement(Measurement),
    Timestamp(Timestamp),
    List(List),
    EventLog(EventLog),
    LastCapture(LastCapture),
    LegacyLastCapture(LegacyLastCapture),
}

impl Value {
    pub fn position(&self) -> Position {
        match self {
            Value::Text(v) => v.pos,
            Value::Number(v) => v.pos,
            Value::Measurement(v) => v.pos,
            Value::Timestamp(v) => v.pos,
            Value::List(v) => v.pos,
            Value::EventLog(v) => v.pos,
            Value::LastCapture(v) => v.pos,
            Value::LegacyLastCapture(v) => v.pos,
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Number(_) => "number",
            Value::Measurement(_) => "measurement",
            Value::Timestamp(_) => "timestamp",
            Value::List(_) => "list",
            Value::EventLog(_) => "event log",
            Value::LastCapture(_) => "last capture",
            Value::LegacyLastCapture(_) => "legacy last capture",
        }
    }
}

/// One item of a [`List`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "item", rename_all = "snake_case")]
pub enum ListValue {
    Obis(Obis),
    Measurement(Measurement),
    Timestamp(Timestamp),
    Text(Text),
}

impl ListValue {
    pub fn position(&self) -> Position {
        match self {
            ListValue::Obis(v) => v.pos,
            ListValue::Measurement(v) => v.pos,
            ListValue::Timestamp(v) => v.pos,
            ListValue::Text(v) => v.pos,
        }
    }

    /// A lone item outside of a list. OBIS codes stay plain text there.
    pub fn into_value(self) -> Value {
        match self {
            ListValue::Obis(obis) => Value::Text(Text { pos: obis.pos, value: obis.to_string() }),
            ListValue::Measurement(m) => Value::Measurement(m),
            ListValue::Timestamp(t) => Value::Timestamp(t),
            ListValue::Text(t) => Value::Text(t),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Text {
    #[serde(skip)]
    pub pos: Position,
    pub value: String,
}

/// Exact decimal number as written on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Number {
    #[serde(skip)]
    pub pos: Position,
    pub value: Decimal,
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value.normalize())
    }
}

/// Number with unit, `value*unit`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    #[serde(skip)]
    pub pos: Position,
    pub value: Number,
    pub unit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Dst {
    /// `S`, daylight saving time active
    Summer,
    /// `W`, standard time
    Winter,
}

impl Dst {
    pub fn from_flag(flag: char) -> Option<Self> {
        match flag {
            'S' => Some(Dst::Summer),
            'W' => Some(Dst::Winter),
            _ => None,
        }
    }

    pub fn flag(&self) -> char {
        match self {
            Dst::Summer => 'S',
            Dst::Winter => 'W',
        }
    }
}

/// `YYMMDDhhmmss` with an optional DST flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timestamp {
    #[serde(skip)]
    pub pos: Position,
    pub value: String,
    pub dst: Option<Dst>,
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dst {
            Some(dst) => write!(f, "{}{}", self.value, dst.flag()),
            None => f.write_str(&self.value),
        }
    }
}

/// Repeated `(...)` groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct List {
    #[serde(skip)]
    pub pos: Position,
    pub values: Vec<ListValue>,
}

/// A log of events, e.g. power failures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventLog {
    #[serde(skip)]
    pub pos: Position,
    pub count: Number,
    pub obis: Obis,
    pub events: Vec<Event>,
}

/// Timestamp and duration of a single event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    #[serde(skip)]
    pub pos: Position,
    pub timestamp: Timestamp,
    pub value: Measurement,
}

/// Most recent capture of a periodic reading, e.g. the gas meter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastCapture {
    #[serde(skip)]
    pub pos: Position,
    pub timestamp: Timestamp,
    pub value: Measurement,
}

/// DSMR 2.2/3.0 capture: `(ts)(..)(..)(..)(obis)(unit)` followed by `(value)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyLastCapture {
    #[serde(skip)]
    pub pos: Position,
    pub timestamp: Timestamp,
    pub extra: Vec<String>,
    pub unit: String,
    pub value: Number,
}

impl LegacyLastCapture {
    pub fn measurement(&self) -> Measurement {
        Measurement { pos: self.value.pos, value: self.value.clone(), unit: self.unit.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obis_from_str() {
        let obis: Obis = "1-0:1.8.1".parse().unwrap();
        assert_eq!((obis.a, obis.b, obis.c, obis.d, obis.e), (1, 0, 1, 8, 1));
        assert_eq!(obis.to_string(), "1-0:1.8.1");

        assert!("1-0:1.8".parse::<Obis>().is_err());
        assert!("1:2.3.4".parse::<Obis>().is_err());
        assert!("1-0:123.8.1".parse::<Obis>().is_err());
        assert!("1-0:1.8.1.255".parse::<Obis>().is_err());
    }

    #[test]
    fn test_position_locate() {
        let data = b"/header\r\n0-0:0.0.0()\r\n";
        let pos = Position::locate(data, 11);
        assert_eq!(pos.line, 2);
        assert_eq!(pos.column, 3);
        assert_eq!(pos.to_string(), "2:3");
    }

    #[test]
    fn test_header_identification() {
        let header = Header { pos: Position::start(), value: "ISk5\\2MT382-1004".to_string() };
        assert_eq!(header.manufacturer(), Some("ISk"));
        assert_eq!(header.identification(), "5\\2MT382-1004");

        let short = Header { pos: Position::start(), value: "AB".to_string() };
        assert_eq!(short.manufacturer(), None);
        assert_eq!(short.identification(), "");
    }

    #[test]
    fn test_list_serializes_obis_items() {
        let value = Value::List(List {
            pos: Position::start(),
            values: vec![
                ListValue::Obis(Obis::new(0, 1, 24, 2, 1)),
                ListValue::Text(Text { pos: Position::start(), value: "abc".to_string() }),
            ],
        });
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            serde_json::json!({
                "type": "list",
                "values": [
                    { "type": "obis", "item": "0-1:24.2.1" },
                    { "type": "text", "item": { "value": "abc" } },
                ],
            })
        );
    }

    #[test]
    fn test_number_display_is_canonical() {
        let number = Number { pos: Position::start(), value: "00981.4430".parse().unwrap() };
        assert_eq!(number.to_string(), "981.443");
    }
}
