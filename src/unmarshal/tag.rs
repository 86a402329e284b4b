use super::UnmarshalError;
use crate::obis_utils::validate_obis_code;

/// A parsed field tag, `key[,optional]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub optional: bool,
}

/// Parse a field tag. `Ok(None)` means the field is excluded (`-`).
pub fn parse(tag: &str) -> Result<Option<Tag>, UnmarshalError> {
    let invalid = |reason: &str| UnmarshalError::InvalidTag {
        tag: tag.to_string(),
        reason: reason.to_string(),
    };

    let mut parts = tag.split(',');
    let key = parts.next().unwrap_or_default().trim();
    if key == "-" {
        return Ok(None);
    }
    if key.is_empty() {
        return Err(invalid("empty key"));
    }
    if key != "header" && key != "footer" && !validate_obis_code(key) {
        return Err(invalid("key must be \"header\", \"footer\" or an OBIS code"));
    }

    let mut optional = false;
    for option in parts {
        match option.trim() {
            "optional" | "omitempty" => optional = true,
            other => return Err(invalid(&format!("unknown option {:?}", other))),
        }
    }

    Ok(Some(Tag { key: key.to_string(), optional }))
}
