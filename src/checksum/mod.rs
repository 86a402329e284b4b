use crate::grammar::Footer;
use crc16::{State, ARC};
use log::debug;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unexpected checksum \"{actual}\" (expected \"{expected}\")")]
pub struct ChecksumError {
    /// Checksum announced in the footer
    pub expected: String,
    /// Checksum computed over the raw telegram
    pub actual: String,
}

/* The CRC covers everything from the "/" up to and including the "!" */
pub fn calculate(raw: &[u8]) -> String {
    let end = raw
        .iter()
        .position(|&b| b == b'!')
        .map(|pos| pos + 1)
        .unwrap_or(raw.len());

    format!("{:04X}", State::<ARC>::calculate(&raw[..end]))
}

/// Compare the footer against the CRC-16/ARC of the raw telegram.
///
/// Always succeeds when disabled or when the telegram carries no checksum.
pub fn verify(raw: &[u8], footer: &Footer, enabled: bool) -> Result<(), ChecksumError> {
    let expected = match footer.value.as_deref() {
        Some(value) if enabled && !value.is_empty() => value,
        _ => {
            debug!("Skipping checksum validation (enabled={})", enabled);
            return Ok(());
        }
    };

    let actual = calculate(raw);
    debug!("DSMR checksum validation: expected={}, calculated={}", expected, actual);

    if actual != expected {
        return Err(ChecksumError {
            expected: expected.to_string(),
            actual,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Position;

    const RAW: &str = "/header\r\n0-0:0.0.0()\r\n!75B7\r\n";

    fn footer(value: Option<&str>) -> Footer {
        Footer {
            pos: Position::default(),
            value: value.map(str::to_string),
        }
    }

    #[test]
    fn test_crc16_arc_check_value() {
        assert_eq!(State::<ARC>::calculate(b"123456789"), 0xBB3D);
    }

    #[test]
    fn test_valid_checksum() {
        assert_eq!(calculate(RAW.as_bytes()), "75B7");
        assert!(verify(RAW.as_bytes(), &footer(Some("75B7")), true).is_ok());
    }

    #[test]
    fn test_invalid_checksum() {
        let raw = "/header\r\n0-0:0.0.0()\r\n!1234\r\n";
        let err = verify(raw.as_bytes(), &footer(Some("1234")), true).unwrap_err();
        assert_eq!(
            err,
            ChecksumError {
                expected: "1234".to_string(),
                actual: "75B7".to_string(),
            }
        );
        assert_eq!(err.to_string(), "unexpected checksum \"75B7\" (expected \"1234\")");
    }

    #[test]
    fn test_disabled_verification() {
        let raw = "/header\r\n0-0:0.0.0()\r\n!1234\r\n";
        assert!(verify(raw.as_bytes(), &footer(Some("1234")), false).is_ok());
    }

    #[test]
    fn test_missing_checksum() {
        let raw = "/header\r\n0-0:0.0.0()\r\n!\r\n";
        assert!(verify(raw.as_bytes(), &footer(None), true).is_ok());
        assert!(verify(raw.as_bytes(), &footer(Some("")), true).is_ok());
    }

    #[test]
    fn test_lowercase_checksum_is_rejected() {
        assert!(verify(RAW.as_bytes(), &footer(Some("75b7")), true).is_err());
    }

    #[test]
    fn test_bit_flips_change_checksum() {
        let raw = RAW.as_bytes();
        let end = raw.iter().position(|&b| b == b'!').unwrap();
        for i in 0..end {
            for bit in 0..8 {
                let mut tampered = raw.to_vec();
                tampered[i] ^= 1 << bit;
                if tampered[i] == b'!' {
                    continue;
                }
                assert_ne!(calculate(&tampered), "75B7", "flip of bit {} in byte {}", bit, i);
            }
        }
    }
}
