use super::tag;
use super::{Unmarshal, UnmarshalError};
use crate::grammar::Value;
use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

/// Semantic kind of a target field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    String,
    Int,
    Uint,
    Float,
    Decimal,
    Time,
    Optional(Box<Kind>),
    List(Box<Kind>),
    /// Anything that maps onto `serde_json::Value`
    Any,
    /// The telegram value itself, unconverted
    Value,
}

impl Kind {
    /// Collection kinds may receive several entries for the same key.
    pub fn is_collection(&self) -> bool {
        match self {
            Kind::List(_) => true,
            Kind::Optional(inner) => inner.is_collection(),
            _ => false,
        }
    }

    /// The kind without any optional wrapper.
    pub fn base(&self) -> &Kind {
        match self {
            Kind::Optional(inner) => inner.base(),
            kind => kind,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::String => f.write_str("string"),
            Kind::Int => f.write_str("int"),
            Kind::Uint => f.write_str("uint"),
            Kind::Float => f.write_str("float"),
            Kind::Decimal => f.write_str("decimal"),
            Kind::Time => f.write_str("time"),
            Kind::Optional(inner) => write!(f, "optional<{}>", inner),
            Kind::List(inner) => write!(f, "list<{}>", inner),
            Kind::Any => f.write_str("any"),
            Kind::Value => f.write_str("value"),
        }
    }
}

/// A telegram value converted into the shape of a field kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    String(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Decimal(Decimal),
    Time(DateTime<FixedOffset>),
    Json(serde_json::Value),
    Value(Value),
    List(Vec<Decoded>),
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoded::String(s) => f.write_str(s),
            Decoded::Int(n) => write!(f, "{}", n),
            Decoded::Uint(n) => write!(f, "{}", n),
            Decoded::Float(n) => write!(f, "{}", n),
            Decoded::Decimal(n) => write!(f, "{}", n.normalize()),
            Decoded::Time(t) => f.write_str(&t.to_rfc3339()),
            Decoded::Json(v) => write!(f, "{}", v),
            Decoded::Value(v) => f.write_str(v.variant_name()),
            Decoded::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Rust types that can be the target of a field.
pub trait FieldType: Sized {
    fn kind() -> Kind;

    /// `None` when the decoded value does not fit, e.g. an integer out of range.
    fn from_decoded(decoded: Decoded) -> Option<Self>;
}

macro_rules! int_field_type {
    ($kind:ident, $variant:ident, $($t:ty),+) => {
        $(
            impl FieldType for $t {
                fn kind() -> Kind {
                    Kind::$kind
                }

                fn from_decoded(decoded: Decoded) -> Option<Self> {
                    match decoded {
                        Decoded::$variant(n) => <$t>::try_from(n).ok(),
                        _ => None,
                    }
                }
            }
        )+
    };
}

int_field_type!(Int, Int, i8, i16, i32, i64, isize);
int_field_type!(Uint, Uint, u8, u16, u32, u64, usize);

impl FieldType for String {
    fn kind() -> Kind {
        Kind::String
    }

    fn from_decoded(decoded: Decoded) -> Option<Self> {
        match decoded {
            Decoded::String(s) => Some(s),
            _ => None,
        }
    }
}

impl FieldType for f64 {
    fn kind() -> Kind {
        Kind::Float
    }

    fn from_decoded(decoded: Decoded) -> Option<Self> {
        match decoded {
            Decoded::Float(n) => Some(n),
            _ => None,
        }
    }
}

impl FieldType for f32 {
    fn kind() -> Kind {
        Kind::Float
    }

    fn from_decoded(decoded: Decoded) -> Option<Self> {
        match decoded {
            Decoded::Float(n) if n.is_finite() && n.abs() <= f32::MAX as f64 => Some(n as f32),
            _ => None,
        }
    }
}

impl FieldType for Decimal {
    fn kind() -> Kind {
        Kind::Decimal
    }

    fn from_decoded(decoded: Decoded) -> Option<Self> {
        match decoded {
            Decoded::Decimal(n) => Some(n),
            _ => None,
        }
    }
}

impl FieldType for DateTime<FixedOffset> {
    fn kind() -> Kind {
        Kind::Time
    }

    fn from_decoded(decoded: Decoded) -> Option<Self> {
        match decoded {
            Decoded::Time(t) => Some(t),
            _ => None,
        }
    }
}

impl FieldType for DateTime<Utc> {
    fn kind() -> Kind {
        Kind::Time
    }

    fn from_decoded(decoded: Decoded) -> Option<Self> {
        match decoded {
            Decoded::Time(t) => Some(t.with_timezone(&Utc)),
            _ => None,
        }
    }
}

impl FieldType for serde_json::Value {
    fn kind() -> Kind {
        Kind::Any
    }

    fn from_decoded(decoded: Decoded) -> Option<Self> {
        match decoded {
            Decoded::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl FieldType for Value {
    fn kind() -> Kind {
        Kind::Value
    }

    fn from_decoded(decoded: Decoded) -> Option<Self> {
        match decoded {
            Decoded::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl<T: FieldType> FieldType for Option<T> {
    fn kind() -> Kind {
        Kind::Optional(Box::new(T::kind()))
    }

    fn from_decoded(decoded: Decoded) -> Option<Self> {
        Some(Some(T::from_decoded(decoded)?))
    }
}

impl<T: FieldType> FieldType for Vec<T> {
    fn kind() -> Kind {
        Kind::List(Box::new(T::kind()))
    }

    fn from_decoded(decoded: Decoded) -> Option<Self> {
        match decoded {
            Decoded::List(items) => items.into_iter().map(T::from_decoded).collect(),
            _ => None,
        }
    }
}

/// Borrows a field out of its record.
pub type Accessor<T, V> = dyn for<'a> Fn(&'a mut T) -> &'a mut V + Send + Sync;

type Assign<T> = dyn Fn(&mut T, Decoded) -> bool + Send + Sync;

/// Everything the decoder needs to know about one field of a record.
pub struct FieldDescriptor<T> {
    /// OBIS code, `header` or `footer`
    pub key: String,
    pub optional: bool,
    /// Literal used when the telegram has no entry for the key
    pub default: Option<String>,
    pub kind: Kind,
    assign: Arc<Assign<T>>,
}

impl<T: 'static> FieldDescriptor<T> {
    pub fn new<V, F>(key: &str, optional: bool, default: Option<&str>, accessor: F) -> Self
    where
        V: FieldType + 'static,
        F: for<'a> Fn(&'a mut T) -> &'a mut V + Send + Sync + 'static,
    {
        let default = default.filter(|d| !d.is_empty()).map(str::to_string);
        FieldDescriptor {
            key: key.to_string(),
            optional: optional || default.is_some(),
            default,
            kind: V::kind(),
            assign: Arc::new(move |target: &mut T, decoded: Decoded| match V::from_decoded(decoded) {
                Some(value) => {
                    *accessor(target) = value;
                    true
                }
                None => false,
            }),
        }
    }

    /// Re-root the descriptor onto an outer record embedding `T`.
    pub fn project<P: 'static>(self, outer: Arc<Accessor<P, T>>) -> FieldDescriptor<P> {
        let inner = self.assign;
        FieldDescriptor {
            key: self.key,
            optional: self.optional,
            default: self.default,
            kind: self.kind,
            assign: Arc::new(move |target: &mut P, decoded: Decoded| inner(outer(target), decoded)),
        }
    }
}

impl<T> FieldDescriptor<T> {
    /// Store a decoded value, false when it does not fit the field.
    pub fn assign(&self, target: &mut T, decoded: Decoded) -> bool {
        (self.assign)(target, decoded)
    }
}

impl<T> Clone for FieldDescriptor<T> {
    fn clone(&self) -> Self {
        FieldDescriptor {
            key: self.key.clone(),
            optional: self.optional,
            default: self.default.clone(),
            kind: self.kind.clone(),
            assign: Arc::clone(&self.assign),
        }
    }
}

impl<T> fmt::Debug for FieldDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("key", &self.key)
            .field("optional", &self.optional)
            .field("default", &self.default)
            .field("kind", &self.kind)
            .finish()
    }
}

enum FieldSpec<T> {
    Field(FieldDescriptor<T>),
    Group(Vec<FieldSpec<T>>),
    Invalid(UnmarshalError),
}

impl<T: 'static> FieldSpec<T> {
    fn project<P: 'static>(self, outer: &Arc<Accessor<P, T>>) -> FieldSpec<P> {
        match self {
            FieldSpec::Field(field) => FieldSpec::Field(field.project(Arc::clone(outer))),
            FieldSpec::Group(specs) => {
                FieldSpec::Group(specs.into_iter().map(|spec| spec.project(outer)).collect())
            }
            FieldSpec::Invalid(err) => FieldSpec::Invalid(err),
        }
    }

    fn flatten_into(self, out: &mut Vec<FieldDescriptor<T>>) -> Result<(), UnmarshalError> {
        match self {
            FieldSpec::Field(field) => out.push(field),
            FieldSpec::Group(specs) => {
                for spec in specs {
                    spec.flatten_into(out)?;
                }
            }
            FieldSpec::Invalid(err) => return Err(err),
        }
        Ok(())
    }
}

/// Builder collecting the fields of a record in declaration order.
///
/// Tag errors are kept until [`FieldGroup::flatten`] so that `describe`
/// implementations stay infallible.
pub struct FieldGroup<T> {
    specs: Vec<FieldSpec<T>>,
}

impl<T: 'static> FieldGroup<T> {
    pub fn new() -> Self {
        FieldGroup { specs: Vec::new() }
    }

    /// Declare a field by tag, e.g. `"1-0:1.8.1"` or `"0-1:24.2.1,optional"`.
    pub fn field<V, F>(&mut self, tag: &str, accessor: F) -> &mut Self
    where
        V: FieldType + 'static,
        F: for<'a> Fn(&'a mut T) -> &'a mut V + Send + Sync + 'static,
    {
        self.field_with_default(tag, "", accessor)
    }

    /// Declare a field that falls back to `default` when the key is absent.
    pub fn field_with_default<V, F>(&mut self, tag: &str, default: &str, accessor: F) -> &mut Self
    where
        V: FieldType + 'static,
        F: for<'a> Fn(&'a mut T) -> &'a mut V + Send + Sync + 'static,
    {
        match tag::parse(tag) {
            Ok(Some(tag)) => self.specs.push(FieldSpec::Field(FieldDescriptor::new(
                &tag.key,
                tag.optional,
                Some(default),
                accessor,
            ))),
            Ok(None) => {}
            Err(err) => self.specs.push(FieldSpec::Invalid(err)),
        }
        self
    }

    /// Pull in all fields of an embedded record.
    pub fn embed<U, F>(&mut self, accessor: F) -> &mut Self
    where
        U: Unmarshal,
        F: for<'a> Fn(&'a mut T) -> &'a mut U + Send + Sync + 'static,
    {
        let accessor: Arc<Accessor<T, U>> = Arc::new(accessor);
        let mut inner = FieldGroup::<U>::new();
        U::describe(&mut inner);
        self.specs.push(FieldSpec::Group(
            inner.specs.into_iter().map(|spec| spec.project(&accessor)).collect(),
        ));
        self
    }

    /// Nested fields of `T` itself, declared through a closure.
    pub fn group(&mut self, describe: impl FnOnce(&mut FieldGroup<T>)) -> &mut Self {
        let mut inner = FieldGroup::new();
        describe(&mut inner);
        self.specs.push(FieldSpec::Group(inner.specs));
        self
    }

    /// The ordered descriptor list, embedded groups expanded in place.
    pub fn flatten(self) -> Result<Vec<FieldDescriptor<T>>, UnmarshalError> {
        let mut out = Vec::with_capacity(self.specs.len());
        for spec in self.specs {
            spec.flatten_into(&mut out)?;
        }
        Ok(out)
    }
}

impl<T: 'static> Default for FieldGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Inner {
        power: f64,
    }

    impl Unmarshal for Inner {
        fn describe(fields: &mut FieldGroup<Self>) {
            fields.field("1-0:1.7.0", |s: &mut Inner| &mut s.power);
        }
    }

    #[derive(Default)]
    struct Outer {
        header: String,
        inner: Inner,
        tariff: Option<u8>,
    }

    impl Unmarshal for Outer {
        fn describe(fields: &mut FieldGroup<Self>) {
            fields
                .field("header", |s: &mut Outer| &mut s.header)
                .embed(|s: &mut Outer| &mut s.inner)
                .field_with_default("0-0:96.14.0", "2", |s: &mut Outer| &mut s.tariff);
        }
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(Kind::Optional(Box::new(Kind::List(Box::new(Kind::Any)))).to_string(), "optional<list<any>>");
        assert_eq!(<Vec<Option<i32>>>::kind(), Kind::List(Box::new(Kind::Optional(Box::new(Kind::Int)))));
        assert!(<Option<Vec<String>>>::kind().is_collection());
        assert!(!<Option<String>>::kind().is_collection());
    }

    #[test]
    fn test_int_range_is_checked() {
        assert_eq!(u8::from_decoded(Decoded::Uint(255)), Some(255));
        assert_eq!(u8::from_decoded(Decoded::Uint(256)), None);
        assert_eq!(i8::from_decoded(Decoded::Int(-129)), None);
        assert_eq!(i64::from_decoded(Decoded::Uint(1)), None);
    }

    #[test]
    fn test_vec_from_decoded() {
        let decoded = Decoded::List(vec![Decoded::String("a".into()), Decoded::String("b".into())]);
        assert_eq!(<Vec<String>>::from_decoded(decoded), Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_decoded_display() {
        let decoded = Decoded::List(vec![Decoded::Float(12345.678), Decoded::String("kWh".into())]);
        assert_eq!(decoded.to_string(), "[12345.678, kWh]");
    }

    #[test]
    fn test_embedded_fields_are_flattened_in_order() {
        let fields = Outer::fields().unwrap();
        let keys: Vec<&str> = fields.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["header", "1-0:1.7.0", "0-0:96.14.0"]);
        assert!(fields[2].optional);
        assert_eq!(fields[2].default.as_deref(), Some("2"));
        assert_eq!(fields[2].kind, Kind::Optional(Box::new(Kind::Uint)));

        let mut outer = Outer::default();
        assert!(fields[1].assign(&mut outer, Decoded::Float(1.5)));
        assert_eq!(outer.inner.power, 1.5);
        assert!(!fields[1].assign(&mut outer, Decoded::String("x".into())));
    }

    #[test]
    fn test_excluded_and_invalid_tags() {
        let mut group = FieldGroup::<Outer>::new();
        group.field("-", |s: &mut Outer| &mut s.header);
        assert!(group.flatten().unwrap().is_empty());

        let mut group = FieldGroup::<Outer>::new();
        group
            .field("header", |s: &mut Outer| &mut s.header)
            .group(|g| {
                g.field("1-0:1.7.0,sometimes", |s: &mut Outer| &mut s.inner.power);
            });
        assert!(matches!(group.flatten(), Err(UnmarshalError::InvalidTag { .. })));
    }
}
