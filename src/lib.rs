//! DSMR smart meter telegram decoder
//!
//! This library parses P1 telegrams into a syntax tree, verifies their
//! CRC-16 checksum and maps the COSEM objects onto user defined records.

pub mod checksum;
pub mod config;
pub mod grammar;
pub mod obis_utils;
pub mod unmarshal;

use thiserror::Error;

// Re-export common types for easier access
pub use checksum::ChecksumError;
pub use config::{Config, ConfigError, LocationConfig};
pub use grammar::{GrammarError, Obis, Telegram, Value};
pub use unmarshal::{unmarshal, unmarshal_with, FieldGroup, Unmarshal, UnmarshalError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DsmrError {
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error(transparent)]
    Checksum(#[from] ChecksumError),
    #[error(transparent)]
    Unmarshal(#[from] UnmarshalError),
}

/// Lex and parse a telegram. The checksum is not looked at.
pub fn parse(data: &[u8]) -> Result<Telegram, DsmrError> {
    Ok(grammar::parse_bytes(data)?)
}

pub fn parse_and_verify(data: &[u8], verify_checksum: bool) -> Result<Telegram, DsmrError> {
    let telegram = grammar::parse_bytes(data)?;
    checksum::verify(data, &telegram.footer, verify_checksum)?;
    Ok(telegram)
}

pub fn parse_with_config(data: &[u8], config: &Config) -> Result<Telegram, DsmrError> {
    parse_and_verify(data, config.verify_checksum)
}

/// Parse, verify and unmarshal a telegram into a fresh `T`.
pub fn from_bytes<T: Unmarshal + Default>(data: &[u8]) -> Result<T, DsmrError> {
    from_bytes_with_config(data, &Config::default())
}

pub fn from_bytes_with_config<T: Unmarshal + Default>(data: &[u8], config: &Config) -> Result<T, DsmrError> {
    let telegram = parse_with_config(data, config)?;
    let mut target = T::default();
    unmarshal_with(&telegram.entries(), &mut target, &config.location)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TELEGRAM: &str = "/header\r\n0-0:0.0.0()\r\n!75B7\r\n";

    #[derive(Debug, Default)]
    struct Device {
        header: String,
        id: String,
    }

    impl Unmarshal for Device {
        fn describe(fields: &mut FieldGroup<Self>) {
            fields
                .field("header", |d: &mut Device| &mut d.header)
                .field("0-0:0.0.0", |d: &mut Device| &mut d.id);
        }
    }

    #[test]
    fn test_parse_skips_checksum() {
        let telegram = parse(TELEGRAM.as_bytes()).unwrap();
        assert_eq!(telegram.checksum(), Some("75B7"));
        assert!(telegram.get("0-0:0.0.0").is_some());

        let tampered = TELEGRAM.replace("75B7", "1234");
        let telegram = parse(tampered.as_bytes()).unwrap();
        assert_eq!(telegram.checksum(), Some("1234"));
    }

    #[test]
    fn test_parse_and_verify_checks_checksum() {
        let tampered = TELEGRAM.replace("75B7", "1234");
        assert_eq!(
            parse_and_verify(tampered.as_bytes(), true).unwrap_err(),
            DsmrError::Checksum(ChecksumError {
                expected: "1234".to_string(),
                actual: "75B7".to_string(),
            })
        );
        assert!(parse_and_verify(tampered.as_bytes(), false).is_ok());
    }

    #[test]
    fn test_parse_with_config() {
        let tampered = TELEGRAM.replace("75B7", "1234");
        let config = Config { verify_checksum: false, ..Config::default() };
        assert!(parse_with_config(tampered.as_bytes(), &config).is_ok());
        assert!(parse_with_config(tampered.as_bytes(), &Config::default()).is_err());
    }

    #[test]
    fn test_from_bytes() {
        let device: Device = from_bytes(TELEGRAM.as_bytes()).unwrap();
        assert_eq!(device.header, "header");
        assert_eq!(device.id, "");
    }

    #[test]
    fn test_errors_identify_the_stage() {
        assert!(matches!(parse(b"header\r\n!\r\n"), Err(DsmrError::Grammar(_))));
        assert!(matches!(
            from_bytes::<Device>(b"/header\r\n!\r\n"),
            Err(DsmrError::Unmarshal(UnmarshalError::MissingField { .. }))
        ));
    }
}
