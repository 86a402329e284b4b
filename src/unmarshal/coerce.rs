use super::structs::{Decoded, Kind};
use super::{Location, UnmarshalError};
use crate::grammar::{
    Dst, Lexer, List, ListValue, Measurement, Number, Position, Text, Timestamp, TokenKind, Value,
};
use rust_decimal::Decimal;
use std::str::FromStr;

fn unsupported(value: &Value, kind: &Kind) -> UnmarshalError {
    UnmarshalError::UnsupportedKind {
        pos: value.position(),
        variant: value.variant_name(),
        kind: kind.clone(),
    }
}

fn conversion(pos: Position, value: impl ToString, kind: &Kind) -> UnmarshalError {
    UnmarshalError::Conversion {
        pos,
        value: value.to_string(),
        kind: kind.clone(),
    }
}

/// Convert a telegram value into the shape of `kind`.
pub fn coerce(value: &Value, kind: &Kind, location: &dyn Location) -> Result<Decoded, UnmarshalError> {
    match kind {
        Kind::Optional(inner) => return coerce(value, inner, location),
        Kind::Value => return Ok(Decoded::Value(value.clone())),
        Kind::Any => return Ok(Decoded::Json(to_json(value))),
        _ => {}
    }

    match value {
        Value::Text(text) => coerce_text(text, kind).ok_or_else(|| match kind {
            Kind::Int | Kind::Uint | Kind::Float | Kind::Decimal => conversion(text.pos, &text.value, kind),
            _ => unsupported(value, kind),
        }),
        Value::Number(number) => match kind {
            Kind::String | Kind::Int | Kind::Uint | Kind::Float | Kind::Decimal => coerce_number(number, kind),
            _ => Err(unsupported(value, kind)),
        },
        Value::Measurement(measurement) => coerce_measurement(measurement, value, kind, location),
        Value::Timestamp(timestamp) => match kind {
            Kind::String => Ok(Decoded::String(timestamp.to_string())),
            Kind::Time => resolve(timestamp, location),
            _ => Err(unsupported(value, kind)),
        },
        Value::List(list) => match kind {
            Kind::List(element) => list
                .values
                .iter()
                .map(|item| coerce(&item.clone().into_value(), element, location))
                .collect::<Result<Vec<_>, _>>()
                .map(Decoded::List),
            _ => Err(unsupported(value, kind)),
        },
        Value::LastCapture(capture) => {
            coerce_capture(&capture.timestamp, &capture.value, value, kind, location)
        }
        Value::LegacyLastCapture(capture) => {
            coerce_capture(&capture.timestamp, &capture.measurement(), value, kind, location)
        }
        Value::EventLog(log) => match kind {
            Kind::Int | Kind::Uint => coerce_number(&log.count, kind),
            Kind::List(element) if matches!(element.base(), Kind::List(_) | Kind::Any | Kind::Value) => log
                .events
                .iter()
                .map(|event| {
                    let pair = pair(event.pos, &event.timestamp, &event.value);
                    coerce(&pair, element, location)
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Decoded::List),
            _ => Err(unsupported(value, kind)),
        },
    }
}

fn coerce_text(text: &Text, kind: &Kind) -> Option<Decoded> {
    let s = text.value.as_str();
    match kind {
        Kind::String => Some(Decoded::String(text.value.clone())),
        Kind::Int => s.parse().ok().map(Decoded::Int),
        Kind::Uint => s.parse().ok().map(Decoded::Uint),
        Kind::Float => s.parse().ok().map(Decoded::Float),
        Kind::Decimal => Decimal::from_str(s).ok().map(Decoded::Decimal),
        _ => None,
    }
}

fn coerce_number(number: &Number, kind: &Kind) -> Result<Decoded, UnmarshalError> {
    let canonical = number.to_string();
    let integral = || {
        if number.value.fract().is_zero() {
            Ok(canonical.as_str())
        } else {
            Err(conversion(number.pos, &canonical, kind))
        }
    };

    match kind {
        Kind::String => Ok(Decoded::String(canonical.clone())),
        Kind::Int => integral()?
            .parse()
            .map(Decoded::Int)
            .map_err(|_| conversion(number.pos, &canonical, kind)),
        Kind::Uint => integral()?
            .parse()
            .map(Decoded::Uint)
            .map_err(|_| conversion(number.pos, &canonical, kind)),
        Kind::Float => canonical
            .parse()
            .map(Decoded::Float)
            .map_err(|_| conversion(number.pos, &canonical, kind)),
        Kind::Decimal => Ok(Decoded::Decimal(number.value)),
        _ => Err(conversion(number.pos, &canonical, kind)),
    }
}

fn coerce_measurement(
    measurement: &Measurement,
    value: &Value,
    kind: &Kind,
    location: &dyn Location,
) -> Result<Decoded, UnmarshalError> {
    match kind {
        Kind::List(element) => {
            let unit = Value::Text(Text { pos: measurement.pos, value: measurement.unit.clone() });
            Ok(Decoded::List(vec![
                coerce(&Value::Number(measurement.value.clone()), element, location)?,
                coerce(&unit, element, location)?,
            ]))
        }
        Kind::String | Kind::Int | Kind::Uint | Kind::Float | Kind::Decimal => {
            coerce_number(&measurement.value, kind)
        }
        _ => Err(unsupported(value, kind)),
    }
}

fn coerce_capture(
    timestamp: &Timestamp,
    measurement: &Measurement,
    value: &Value,
    kind: &Kind,
    location: &dyn Location,
) -> Result<Decoded, UnmarshalError> {
    match kind {
        Kind::List(_) => coerce(&pair(value.position(), timestamp, measurement), kind, location),
        Kind::Time => resolve(timestamp, location),
        Kind::String | Kind::Int | Kind::Uint | Kind::Float | Kind::Decimal => {
            coerce_number(&measurement.value, kind)
        }
        _ => Err(unsupported(value, kind)),
    }
}

fn pair(pos: Position, timestamp: &Timestamp, measurement: &Measurement) -> Value {
    Value::List(List {
        pos,
        values: vec![
            ListValue::Timestamp(timestamp.clone()),
            ListValue::Measurement(measurement.clone()),
        ],
    })
}

fn resolve(timestamp: &Timestamp, location: &dyn Location) -> Result<Decoded, UnmarshalError> {
    location
        .resolve(timestamp)
        .map(Decoded::Time)
        .ok_or_else(|| conversion(timestamp.pos, timestamp, &Kind::Time))
}

fn number_to_json(number: &Number) -> serde_json::Value {
    number
        .to_string()
        .parse::<f64>()
        .map(serde_json::Value::from)
        .unwrap_or(serde_json::Value::Null)
}

/// Map a value onto JSON, numbers become floats.
pub fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Text(text) => Json::String(text.value.clone()),
        Value::Number(number) => number_to_json(number),
        Value::Measurement(measurement) => number_to_json(&measurement.value),
        Value::Timestamp(timestamp) => Json::String(timestamp.to_string()),
        Value::List(list) => Json::Array(
            list.values
                .iter()
                .map(|item| to_json(&item.clone().into_value()))
                .collect(),
        ),
        Value::LastCapture(capture) => Json::Array(vec![
            Json::String(capture.timestamp.to_string()),
            number_to_json(&capture.value.value),
        ]),
        Value::LegacyLastCapture(capture) => Json::Array(vec![
            Json::String(capture.timestamp.to_string()),
            number_to_json(&capture.value),
        ]),
        Value::EventLog(log) => Json::Array(
            log.events
                .iter()
                .map(|event| {
                    Json::Array(vec![
                        Json::String(event.timestamp.to_string()),
                        number_to_json(&event.value.value),
                    ])
                })
                .collect(),
        ),
    }
}

/// The value a default literal stands for: a timestamp when the literal is
/// one and the field wants a time, plain text otherwise.
pub fn default_value(literal: &str, kind: &Kind) -> Value {
    let pos = Position::default();
    if *kind.base() == Kind::Time {
        let mut tokens = Lexer::new(literal);
        if let (Some(Ok(token)), None) = (tokens.next(), tokens.next()) {
            if token.is(TokenKind::Timestamp) {
                let (digits, flag) = token.text.split_at(12);
                return Value::Timestamp(Timestamp {
                    pos,
                    value: digits.to_string(),
                    dst: flag.chars().next().and_then(Dst::from_flag),
                });
            }
        }
    }

    Value::Text(Text { pos, value: literal.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocationConfig;
    use crate::grammar::parse_str;

    fn value_of(line: &str) -> Value {
        let telegram = parse_str(&format!("/ISk5\\2MT382-1004\r\n{}\r\n!\r\n", line)).unwrap();
        telegram.objects[0].value.clone()
    }

    fn coerce_to(value: &Value, kind: Kind) -> Result<Decoded, UnmarshalError> {
        coerce(value, &kind, &LocationConfig::default())
    }

    fn list_of(kind: Kind) -> Kind {
        Kind::List(Box::new(kind))
    }

    #[test]
    fn test_text_to_numbers() {
        let value = value_of("0-0:96.14.0(0002)");
        assert_eq!(coerce_to(&value, Kind::String).unwrap(), Decoded::String("0002".to_string()));
        assert_eq!(coerce_to(&value, Kind::Int).unwrap(), Decoded::Int(2));
        assert_eq!(coerce_to(&value, Kind::Uint).unwrap(), Decoded::Uint(2));
        assert_eq!(coerce_to(&value, Kind::Float).unwrap(), Decoded::Float(2.0));

        let value = value_of("0-0:96.1.1(4B384547303034303436333935353037)");
        assert!(matches!(
            coerce_to(&value, Kind::Int),
            Err(UnmarshalError::Conversion { kind: Kind::Int, .. })
        ));
        assert!(matches!(
            coerce_to(&value, Kind::Time),
            Err(UnmarshalError::UnsupportedKind { variant: "text", .. })
        ));
    }

    #[test]
    fn test_measurement_to_scalars() {
        let value = value_of("1-0:1.8.1(012345.678*kWh)");
        assert_eq!(coerce_to(&value, Kind::Float).unwrap(), Decoded::Float(12345.678));
        assert_eq!(coerce_to(&value, Kind::String).unwrap(), Decoded::String("12345.678".to_string()));
        assert_eq!(
            coerce_to(&value, Kind::Decimal).unwrap(),
            Decoded::Decimal(Decimal::from_str("012345.678").unwrap())
        );
        assert!(matches!(
            coerce_to(&value, Kind::Int),
            Err(UnmarshalError::Conversion { .. })
        ));
    }

    #[test]
    fn test_measurement_as_list() {
        let value = value_of("1-0:1.8.1(012345.678*kWh)");
        assert_eq!(
            coerce_to(&value, list_of(Kind::Any)).unwrap(),
            Decoded::List(vec![
                Decoded::Json(serde_json::json!(12345.678)),
                Decoded::Json(serde_json::json!("kWh")),
            ])
        );
        assert_eq!(
            coerce_to(&value, list_of(Kind::String)).unwrap(),
            Decoded::List(vec![
                Decoded::String("12345.678".to_string()),
                Decoded::String("kWh".to_string()),
            ])
        );
    }

    #[test]
    fn test_integer_measurement() {
        let value = value_of("0-1:24.2.1(101209110000W)(00003*m3)");
        assert_eq!(coerce_to(&value, Kind::Uint).unwrap(), Decoded::Uint(3));
    }

    #[test]
    fn test_timestamp_to_time() {
        let value = value_of("0-0:1.0.0(101209113020W)");
        assert_eq!(coerce_to(&value, Kind::String).unwrap(), Decoded::String("101209113020W".to_string()));
        match coerce_to(&value, Kind::Time).unwrap() {
            Decoded::Time(t) => assert_eq!(t.to_rfc3339(), "2010-12-09T11:30:20+01:00"),
            other => panic!("unexpected {:?}", other),
        }

        let summer = value_of("0-0:1.0.0(170708123000S)");
        match coerce_to(&summer, Kind::Time).unwrap() {
            Decoded::Time(t) => assert_eq!(t.to_rfc3339(), "2017-07-08T12:30:00+02:00"),
            other => panic!("unexpected {:?}", other),
        }

        let invalid = value_of("0-0:1.0.0(101399113020W)");
        assert!(matches!(
            coerce_to(&invalid, Kind::Time),
            Err(UnmarshalError::Conversion { kind: Kind::Time, .. })
        ));
    }

    #[test]
    fn test_capture_as_any_list() {
        let value = value_of("0-1:24.3.0(161129200000W)(00981.443*m3)");
        assert_eq!(
            coerce_to(&value, list_of(Kind::Any)).unwrap(),
            Decoded::List(vec![
                Decoded::Json(serde_json::json!("161129200000W")),
                Decoded::Json(serde_json::json!(981.443)),
            ])
        );
    }

    #[test]
    fn test_list_rejects_scalars() {
        let value = value_of("0-0:96.13.0(abc)(0-1:24.2.1)");
        assert!(matches!(
            coerce_to(&value, Kind::String),
            Err(UnmarshalError::UnsupportedKind { variant: "list", .. })
        ));
        assert_eq!(
            coerce_to(&value, list_of(Kind::String)).unwrap(),
            Decoded::List(vec![
                Decoded::String("abc".to_string()),
                Decoded::String("0-1:24.2.1".to_string()),
            ])
        );
    }

    #[test]
    fn test_last_capture() {
        let value = value_of("0-1:24.2.1(101209110000W)(12785.123*m3)");
        assert_eq!(coerce_to(&value, Kind::Float).unwrap(), Decoded::Float(12785.123));
        assert_eq!(
            coerce_to(&value, list_of(Kind::String)).unwrap(),
            Decoded::List(vec![
                Decoded::String("101209110000W".to_string()),
                Decoded::String("12785.123".to_string()),
            ])
        );
        assert!(matches!(coerce_to(&value, Kind::Time).unwrap(), Decoded::Time(_)));
    }

    #[test]
    fn test_event_log() {
        let value = value_of(
            "1-0:99.97.0(2)(0-0:96.7.19)(101208152415W)(0000000240*s)(101208151004W)(0000000301*s)",
        );
        assert_eq!(coerce_to(&value, Kind::Uint).unwrap(), Decoded::Uint(2));
        assert_eq!(
            coerce_to(&value, list_of(list_of(Kind::String))).unwrap(),
            Decoded::List(vec![
                Decoded::List(vec![
                    Decoded::String("101208152415W".to_string()),
                    Decoded::String("240".to_string()),
                ]),
                Decoded::List(vec![
                    Decoded::String("101208151004W".to_string()),
                    Decoded::String("301".to_string()),
                ]),
            ])
        );
        assert!(matches!(
            coerce_to(&value, list_of(Kind::String)),
            Err(UnmarshalError::UnsupportedKind { variant: "event log", .. })
        ));
    }

    #[test]
    fn test_value_kind_keeps_ast() {
        let value = value_of("1-0:1.8.1(012345.678*kWh)");
        assert_eq!(coerce_to(&value, Kind::Value).unwrap(), Decoded::Value(value.clone()));
        assert_eq!(
            coerce_to(&value, Kind::Optional(Box::new(Kind::Value))).unwrap(),
            Decoded::Value(value)
        );
    }

    #[test]
    fn test_default_values() {
        assert!(matches!(default_value("3", &Kind::Int), Value::Text(_)));
        match default_value("101209113020S", &Kind::Optional(Box::new(Kind::Time))) {
            Value::Timestamp(ts) => assert_eq!(ts.to_string(), "101209113020S"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(default_value("1012091130", &Kind::Time), Value::Text(_)));
    }
}
