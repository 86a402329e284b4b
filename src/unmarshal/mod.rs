use crate::config::LocationConfig;
use crate::grammar::{Entry, Position, Timestamp, Value};
use chrono::{DateTime, FixedOffset};
use log::{debug, trace};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

pub mod coerce;
pub mod structs;
pub mod tag;

pub use structs::{Decoded, FieldDescriptor, FieldGroup, FieldType, Kind};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnmarshalError {
    #[error("missing required attribute {key:?}")]
    MissingField { key: String },
    #[error("{first}: duplicate field {key:?} at {second}")]
    DuplicateField {
        key: String,
        first: Position,
        second: Position,
    },
    #[error("{pos}: unable to unmarshal {variant} into {kind}")]
    UnsupportedKind {
        pos: Position,
        variant: &'static str,
        kind: Kind,
    },
    #[error("error parsing default value for {key:?}: error converting {literal:?} to {kind}")]
    InvalidDefault {
        key: String,
        literal: String,
        kind: Kind,
    },
    #[error("{pos}: error converting {value:?} to {kind}")]
    Conversion {
        pos: Position,
        value: String,
        kind: Kind,
    },
    #[error("invalid field tag {tag:?}: {reason}")]
    InvalidTag { tag: String, reason: String },
}

/// Turns meter local timestamps into absolute times.
pub trait Location {
    fn resolve(&self, timestamp: &Timestamp) -> Option<DateTime<FixedOffset>>;
}

/// A record that can be filled from telegram entries.
///
/// ```
/// use dsmr::unmarshal::{FieldGroup, Unmarshal};
///
/// #[derive(Default)]
/// struct Meter {
///     equipment_id: String,
///     delivered: f64,
///     tariff: Option<u8>,
/// }
///
/// impl Unmarshal for Meter {
///     fn describe(fields: &mut FieldGroup<Self>) {
///         fields
///             .field("0-0:96.1.1", |m: &mut Meter| &mut m.equipment_id)
///             .field("1-0:1.8.1", |m: &mut Meter| &mut m.delivered)
///             .field("0-0:96.14.0,optional", |m: &mut Meter| &mut m.tariff);
///     }
/// }
/// ```
pub trait Unmarshal: Sized + 'static {
    fn describe(fields: &mut FieldGroup<Self>);

    fn fields() -> Result<Vec<FieldDescriptor<Self>>, UnmarshalError> {
        let mut group = FieldGroup::new();
        Self::describe(&mut group);
        group.flatten()
    }
}

/// Unmarshal entries into `target`, meter time resolved with the default location.
pub fn unmarshal<T: Unmarshal>(entries: &[Entry<'_>], target: &mut T) -> Result<(), UnmarshalError> {
    unmarshal_with(entries, target, &LocationConfig::default())
}

pub fn unmarshal_with<T: Unmarshal>(
    entries: &[Entry<'_>],
    target: &mut T,
    location: &dyn Location,
) -> Result<(), UnmarshalError> {
    let fields = T::fields()?;
    decode(entries, &fields, target, location)
}

/// Apply entries to `target` following an ordered descriptor list.
///
/// Entries sharing a key are handed out in telegram order, one per
/// descriptor. Stops at the first failing field.
pub fn decode<T>(
    entries: &[Entry<'_>],
    fields: &[FieldDescriptor<T>],
    target: &mut T,
    location: &dyn Location,
) -> Result<(), UnmarshalError> {
    let mut index: HashMap<&str, VecDeque<&Entry<'_>>> = HashMap::with_capacity(entries.len());
    for entry in entries {
        index.entry(entry.key.as_str()).or_default().push_back(entry);
    }
    let mut consumed: HashSet<&str> = HashSet::new();

    for field in fields {
        let queue = index.get_mut(field.key.as_str());
        let entry = match queue.and_then(|queue| queue.pop_front().map(|entry| (entry, queue.front().copied()))) {
            Some((entry, next)) => {
                if let Some(second) = next {
                    if !field.kind.is_collection() {
                        return Err(UnmarshalError::DuplicateField {
                            key: field.key.clone(),
                            first: entry.pos,
                            second: second.pos,
                        });
                    }
                }
                entry
            }
            None => {
                apply_default(field, target, location, consumed.contains(field.key.as_str()))?;
                continue;
            }
        };
        consumed.insert(entry.key.as_str());

        let value: &Value = &entry.value;
        let decoded = coerce::coerce(value, &field.kind, location)?;
        let rendered = decoded.to_string();
        if !field.assign(target, decoded) {
            return Err(UnmarshalError::Conversion {
                pos: value.position(),
                value: rendered,
                kind: field.kind.clone(),
            });
        }
        trace!("Decoded {} into {}", field.key, field.kind);
    }

    for (key, queue) in index.iter().filter(|(_, queue)| !queue.is_empty()) {
        trace!("Ignoring {} unmapped entries for {}", queue.len(), key);
    }

    Ok(())
}

fn apply_default<T>(
    field: &FieldDescriptor<T>,
    target: &mut T,
    location: &dyn Location,
    consumed: bool,
) -> Result<(), UnmarshalError> {
    let literal = match &field.default {
        Some(literal) => literal,
        None if field.optional || consumed => {
            trace!("No entry for optional field {}", field.key);
            return Ok(());
        }
        None => {
            return Err(UnmarshalError::MissingField {
                key: field.key.clone(),
            })
        }
    };

    let invalid = || UnmarshalError::InvalidDefault {
        key: field.key.clone(),
        literal: literal.clone(),
        kind: field.kind.clone(),
    };

    debug!("Applying default {:?} to {}", literal, field.key);
    let value = coerce::default_value(literal, &field.kind);
    let decoded = coerce::coerce(&value, &field.kind, location).map_err(|_| invalid())?;
    if !field.assign(target, decoded) {
        return Err(invalid());
    }

    Ok(())
}
